mod cli;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use cli::Saltmine;

/// Entry point for the saltmine CLI.
///
/// Exits non-zero when arguments, inputs or configuration are invalid. An
/// exhausted search is a normal outcome and exits successfully.
fn main() -> ExitCode {
    let args = Saltmine::parse();
    if let Err(err) = args.log.init() {
        eprintln!("failed to set up logging: {err}");
        return ExitCode::FAILURE;
    }

    match args.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
