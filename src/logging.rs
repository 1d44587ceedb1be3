//! Tracing setup for the saltmine binary.
//!
//! Search progress and budget warnings are logged at `info`/`warn`, so the
//! default level is `info`. `-v` adds debug and trace detail, `-q` quiets
//! output, and `RUST_LOG` replaces both.

use std::{fs::File, io, path::PathBuf};

use clap::{ArgAction, Args};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Default, Args)]
pub(crate) struct LogArgs {
    /// More detail: -v for debug, -vv for trace.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Less output: -q for warnings only, -qq for errors, -qqq for nothing.
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::Count,
        global = true,
        conflicts_with = "verbose"
    )]
    pub(crate) quiet: u8,

    /// Appends logs to this file instead of stderr.
    #[arg(long = "log.file", visible_alias = "log-file", global = true)]
    pub(crate) log_file: Option<PathBuf>,

    /// Plain stderr output without ANSI colors.
    #[arg(long = "log.no-color", visible_alias = "log-no-color", global = true)]
    pub(crate) log_no_color: bool,
}

impl LogArgs {
    /// Level for saltmine's own targets.
    fn level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (0, 0) => LevelFilter::INFO,
            (0, 1) => LevelFilter::DEBUG,
            (0, _) => LevelFilter::TRACE,
            (1, _) => LevelFilter::WARN,
            (2, _) => LevelFilter::ERROR,
            _ => LevelFilter::OFF,
        }
    }

    fn filter(&self) -> EnvFilter {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
            _ => EnvFilter::new(format!("saltmine={}", self.level())),
        }
    }

    /// Installs the global subscriber. Fails only when the log file cannot be
    /// opened.
    pub(crate) fn init(&self) -> io::Result<()> {
        let builder = fmt()
            .with_env_filter(self.filter())
            .with_target(self.verbose > 0);

        match &self.log_file {
            Some(path) => {
                let file = File::options().create(true).append(true).open(path)?;
                builder.with_writer(file).with_ansi(false).init();
            }
            None => builder
                .with_writer(io::stderr)
                .with_ansi(!self.log_no_color)
                .init(),
        }
        Ok(())
    }
}
