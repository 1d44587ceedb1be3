use std::path::PathBuf;

use alloy_primitives::{Address, keccak256};
use rand::Rng;
use saltmine::{
    address::{create2_address, derive},
    config::{FACTORY_ENV, resolve_factory},
    error::{ConfigError, DeriveError, InitCodeError, RecordError, SearchError},
    init_code::{InitCode, decode_hex},
    mine::{Create2Miner, DEFAULT_PROGRESS_EVERY, Execution, HexPrefix, SearchResult, SearchState},
    record::DeploymentRecord,
};
use tracing::{info, warn};

use crate::logging::LogArgs;

/// Command-line interface for saltmine.
///
/// Saltmine computes the addresses a CREATE2 factory deploys contracts to
/// and mines salts for vanity addresses.
#[derive(Debug, clap::Parser)]
#[command(
    name = "saltmine",
    about = "Saltmine derives CREATE2 factory addresses and mines vanity salts."
)]
pub(crate) struct Saltmine {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pub(crate) log: LogArgs,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Computes the address a salt deploys the init code to.
    Address {
        #[command(flatten)]
        target: FactoryArgs,

        /// 32-byte salt as hex.
        #[arg(long, required_unless_present = "salt_text", conflicts_with = "salt_text")]
        salt: Option<String>,

        /// Uses the Keccak-256 hash of this text as the salt.
        #[arg(long)]
        salt_text: Option<String>,

        #[command(flatten)]
        init_code: InitCodeArgs,
    },

    /// Mines a salt whose CREATE2 address starts with a hex prefix.
    ///
    /// Candidate `i` uses the salt keccak256("<i>"), so a search is
    /// reproducible from its starting counter.
    Mine {
        /// Hex prefix the address must start with, e.g. 0x333.
        prefix: String,

        #[command(flatten)]
        target: FactoryArgs,

        #[command(flatten)]
        init_code: InitCodeArgs,

        /// Number of candidates to try before giving up.
        #[arg(long, default_value_t = 1_000_000)]
        max_attempts: u64,

        /// Counter of the first candidate.
        #[arg(long, default_value_t = 0, conflicts_with = "random_start")]
        start: u64,

        /// Starts at a random counter. The counter is printed so the run can
        /// be repeated with --start.
        #[arg(long)]
        random_start: bool,

        /// Evaluates candidates on all cores.
        #[arg(long)]
        parallel: bool,

        /// Attempts between progress log lines; 0 disables them.
        #[arg(long, default_value_t = DEFAULT_PROGRESS_EVERY)]
        progress_every: u64,
    },

    /// Checks that a deployment record's address matches its factory, salt
    /// and the given init code.
    VerifyRecord {
        /// Path to the record JSON.
        record: PathBuf,

        #[command(flatten)]
        init_code: InitCodeArgs,
    },
}

#[derive(Debug, Clone, clap::Args)]
struct FactoryArgs {
    /// Address of the Factory contract.
    #[arg(long, env = FACTORY_ENV)]
    factory: Option<Address>,

    /// Network whose factory-<network>.json is read when --factory is absent.
    #[arg(long, default_value = "localhost")]
    network: String,

    /// Directory holding the factory-<network>.json files.
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,
}

impl FactoryArgs {
    fn resolve(&self) -> Result<Address, ConfigError> {
        resolve_factory(self.factory, &self.config_dir, &self.network)
    }
}

#[derive(Debug, Clone, clap::Args)]
struct InitCodeArgs {
    /// Creation bytecode as hex.
    #[arg(long, required_unless_present = "artifact", conflicts_with = "artifact")]
    bytecode: Option<String>,

    /// Compiler artifact JSON to take the creation bytecode from.
    #[arg(long)]
    artifact: Option<PathBuf>,

    /// ABI-encoded constructor arguments as hex.
    #[arg(long, conflicts_with = "address_args")]
    constructor_args: Option<String>,

    /// Address constructor argument; repeat in declaration order.
    #[arg(long = "address-arg")]
    address_args: Vec<Address>,
}

impl InitCodeArgs {
    fn load(&self) -> Result<InitCode, InitCodeError> {
        let bytecode = match (&self.bytecode, &self.artifact) {
            (Some(bytecode), _) => decode_hex(bytecode)?.into(),
            (None, Some(artifact)) => InitCode::artifact_bytecode(artifact)?,
            (None, None) => Default::default(),
        };

        let init_code = match &self.constructor_args {
            Some(args) => InitCode::with_encoded_args(bytecode, decode_hex(args)?),
            None if !self.address_args.is_empty() => {
                InitCode::with_address_args(bytecode, &self.address_args)
            }
            None => InitCode::new(bytecode),
        };
        info!(
            len = init_code.len(),
            args_len = init_code.constructor_args().len(),
            hash = %init_code.hash(),
            "loaded init code"
        );
        Ok(init_code)
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    InitCode(#[from] InitCodeError),

    #[error(transparent)]
    Derive(#[from] DeriveError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Record(#[from] RecordError),

    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("record address {recorded} does not match derived address {derived}")]
    RecordMismatch { recorded: Address, derived: Address },
}

impl Saltmine {
    pub(crate) fn run(self) -> Result<(), Error> {
        match self.command {
            Command::Address {
                target,
                salt,
                salt_text,
                init_code,
            } => {
                let factory = target.resolve()?;
                let salt = match (salt, salt_text) {
                    (_, Some(text)) => keccak256(text.as_bytes()).to_vec(),
                    (Some(salt), None) => decode_hex(&salt)?,
                    (None, None) => Vec::new(),
                };
                let init_code = init_code.load()?;

                let address = derive(factory.as_slice(), &salt, init_code.as_bytes())?;
                println!("{address}");
            }
            Command::Mine {
                prefix,
                target,
                init_code,
                max_attempts,
                start,
                random_start,
                parallel,
                progress_every,
            } => {
                let prefix = HexPrefix::parse(&prefix)?;
                let factory = target.resolve()?;
                let init_code = init_code.load()?;

                let start = if random_start {
                    let start = rand::rng().random::<u64>() >> 1;
                    println!("Starting at counter {start}");
                    start
                } else {
                    start
                };

                if (max_attempts as f64) < prefix.expected_attempts() {
                    warn!(
                        %prefix,
                        max_attempts,
                        expected = prefix.expected_attempts(),
                        "budget is below the expected attempts for this prefix"
                    );
                }

                let execution = if parallel {
                    Execution::Parallel
                } else {
                    Execution::Sequential
                };
                let miner = Create2Miner::new(factory, &init_code)
                    .with_execution(execution)
                    .with_progress_every(progress_every);

                let mut state = SearchState::starting_at(start, max_attempts)?;
                match miner.mine(&prefix, &mut state) {
                    SearchResult::Found {
                        salt,
                        address,
                        index,
                        attempts,
                    } => {
                        // Output the discovered salt and resulting contract address
                        println!(
                            "Found salt {salt} ==> {address} (counter {index}, {attempts} attempts)"
                        );
                    }
                    SearchResult::Exhausted { attempts_tried } => {
                        println!("No salt for {prefix} in {attempts_tried} attempts");
                    }
                }
            }
            Command::VerifyRecord { record, init_code } => {
                let record = DeploymentRecord::load(&record)?;
                let init_code = init_code.load()?;

                let derived = create2_address(record.factory, record.salt, init_code.as_bytes());
                if derived != record.address {
                    return Err(Error::RecordMismatch {
                        recorded: record.address,
                        derived,
                    });
                }
                println!(
                    "{} on {} matches factory {} and salt {}",
                    record.address, record.network, record.factory, record.salt
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use clap::{CommandFactory, Parser};

    const FACTORY: &str = "0x157fe708955dF00062fF332e8Bf2252Dfe184075";
    const BYTECODE: &str = "608060405234801561001057600080fd5b50603f8061001f6000396000f3fe6080604052600080fdfea2646970667358221220c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a47064736f6c63430008110033";
    const DEPLOYED: Address = address!("0x232a01b802493bbac20c03e3c9e4f6c544ed57d5");

    fn run(args: &[&str]) -> Result<(), Error> {
        Saltmine::try_parse_from(std::iter::once("saltmine").chain(args.iter().copied()))
            .unwrap()
            .run()
    }

    fn write_record(dir: &tempfile::TempDir, address: Address) -> PathBuf {
        let record = DeploymentRecord {
            network: "peaqTestnet".to_string(),
            factory: FACTORY.parse().unwrap(),
            address,
            salt: keccak256("test"),
            deployer: address!("0x9fC3dc011b461664c835F2527fffb1169b3C213e"),
            timestamp: chrono::Utc::now(),
        };
        let path = dir.path().join(record.file_name());
        std::fs::write(&path, serde_json::to_string_pretty(&record).unwrap()).unwrap();
        path
    }

    #[test]
    fn command_is_well_formed() {
        Saltmine::command().debug_assert();
    }

    #[test]
    fn parses_mine_arguments() {
        let cli = Saltmine::try_parse_from([
            "saltmine",
            "mine",
            "0x333",
            "--factory",
            "0x157fe708955dF00062fF332e8Bf2252Dfe184075",
            "--bytecode",
            "0x6080",
            "--address-arg",
            "0x9fC3dc011b461664c835F2527fffb1169b3C213e",
            "--max-attempts",
            "100",
            "--parallel",
        ])
        .unwrap();

        let Command::Mine {
            prefix,
            init_code,
            max_attempts,
            parallel,
            start,
            ..
        } = cli.command
        else {
            panic!("expected mine");
        };
        assert_eq!(prefix, "0x333");
        assert_eq!(max_attempts, 100);
        assert!(parallel);
        assert_eq!(start, 0);
        assert_eq!(init_code.load().unwrap().len(), 2 + 32);
    }

    #[test]
    fn init_code_source_is_required_and_exclusive() {
        assert!(Saltmine::try_parse_from(["saltmine", "address", "--salt-text", "test"]).is_err());
        assert!(
            Saltmine::try_parse_from([
                "saltmine",
                "address",
                "--salt-text",
                "test",
                "--bytecode",
                "0x00",
                "--artifact",
                "YOM.json",
            ])
            .is_err()
        );
    }

    #[test]
    fn short_salt_is_rejected() {
        let cli = Saltmine::try_parse_from([
            "saltmine",
            "address",
            "--factory",
            "0x157fe708955dF00062fF332e8Bf2252Dfe184075",
            "--salt",
            "0x1234",
            "--bytecode",
            "0x00",
        ])
        .unwrap();
        assert!(matches!(
            cli.run(),
            Err(Error::Derive(DeriveError::InvalidInputLength {
                field: "salt",
                expected: 32,
                actual: 2
            }))
        ));
    }

    #[test]
    fn verify_record_accepts_a_matching_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_record(&dir, DEPLOYED);

        run(&["verify-record", path.to_str().unwrap(), "--bytecode", BYTECODE]).unwrap();
    }

    #[test]
    fn verify_record_reports_a_tampered_address() {
        let dir = tempfile::tempdir().unwrap();
        let tampered = Address::with_last_byte(0x77);
        let path = write_record(&dir, tampered);

        let err = run(&["verify-record", path.to_str().unwrap(), "--bytecode", BYTECODE])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RecordMismatch { recorded, derived } if recorded == tampered && derived == DEPLOYED
        ));
    }

    #[test]
    fn verify_record_needs_the_same_init_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_record(&dir, DEPLOYED);

        let err = run(&["verify-record", path.to_str().unwrap(), "--bytecode", "0x6080"])
            .unwrap_err();
        assert!(matches!(err, Error::RecordMismatch { recorded, .. } if recorded == DEPLOYED));
    }

    #[test]
    fn mine_succeeds_whether_or_not_a_salt_is_found() {
        let base = ["--factory", FACTORY, "--bytecode", BYTECODE, "--max-attempts", "100"];

        run(&[&["mine", "8f"][..], &base[..]].concat()).unwrap();
        run(&[&["mine", "0xfffff"][..], &base[..]].concat()).unwrap();
        run(&[&["mine", "0xfffff", "--parallel"][..], &base[..]].concat()).unwrap();
    }

    #[test]
    fn mine_rejects_a_budget_past_the_counter_space() {
        let err = run(&[
            "mine",
            "8f",
            "--factory",
            FACTORY,
            "--bytecode",
            BYTECODE,
            "--start",
            "18446744073709551610",
            "--max-attempts",
            "100",
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Search(SearchError::RangeOverflow {
                start: 18446744073709551610,
                max_attempts: 100
            })
        ));
    }
}
