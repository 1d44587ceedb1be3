use std::path::PathBuf;

use alloy_primitives::{Address, TxHash};

use crate::record::DeploymentRecord;

/// Error returned by [`derive`](crate::address::derive) for malformed
/// fixed-width inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeriveError {
    /// A fixed-width input had the wrong number of bytes.
    #[error("invalid {field} length: expected {expected} bytes, got {actual}")]
    InvalidInputLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised while assembling init code.
#[derive(Debug, thiserror::Error)]
pub enum InitCodeError {
    /// Failed to read a compiler artifact
    #[error("failed to read artifact {path}: {source}")]
    ArtifactRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Artifact is not valid JSON or lacks a `bytecode` field
    #[error("malformed artifact {path}: {source}")]
    ArtifactFormat {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Artifact carries no creation bytecode (interfaces, abstract contracts)
    #[error("artifact {0} has no creation bytecode")]
    EmptyBytecode(PathBuf),

    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Errors raised while configuring a salt search.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// The requested prefix is not a hex string of at most 40 characters.
    #[error("invalid address prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: &'static str },

    /// `start + max_attempts` does not fit the candidate counter.
    #[error("search of {max_attempts} candidates from {start} overflows the u64 counter")]
    RangeOverflow { start: u64, max_attempts: u64 },
}

/// Failure reported by a chain or factory collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// RPC transport error
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The call or transaction reverted
    #[error("execution reverted: {0}")]
    Reverted(String),
}

/// Errors that end a deployment attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Code already lives at the deterministic address.
    #[error("contract already deployed at {address} ({code_len} bytes of code)")]
    AddressCollision { address: Address, code_len: usize },

    /// The factory's own address computation disagrees with the local one.
    #[error("factory computes {remote} but local derivation gives {expected}")]
    FactoryMismatch { expected: Address, remote: Address },

    /// The deployment transaction reverted.
    #[error("deployment reverted{}: {reason}", in_tx(.tx_hash))]
    SubmissionReverted {
        tx_hash: Option<TxHash>,
        reason: String,
    },

    /// Chain collaborator failure before anything was submitted, propagated
    /// without retry.
    #[error(transparent)]
    Chain(ChainError),

    /// The deploy transaction was sent but waiting for its receipt failed.
    /// It may still be mined: wait on `tx_hash` rather than submitting again.
    #[error("failed to confirm deploy transaction {tx_hash}: {source}")]
    ConfirmationFailed { tx_hash: TxHash, source: ChainError },

    /// The contract is deployed but its record could not be written. The
    /// record is handed back so the caller can store it elsewhere.
    #[error(
        "deployed {} in {tx_hash} but failed to persist its record: {source}",
        .record.address
    )]
    RecordNotPersisted {
        record: Box<DeploymentRecord>,
        tx_hash: TxHash,
        source: RecordError,
    },
}

fn in_tx(tx_hash: &Option<TxHash>) -> String {
    tx_hash.map(|hash| format!(" in {hash}")).unwrap_or_default()
}

impl From<ChainError> for DeployError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Reverted(reason) => Self::SubmissionReverted {
                tx_hash: None,
                reason,
            },
            transport @ ChainError::Transport(_) => Self::Chain(transport),
        }
    }
}

/// Errors reading or writing deployment records.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Failed to read or write a record file
    #[error("record I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Record is not valid JSON or has the wrong shape
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    /// Records are append-only.
    #[error("record {0} already exists")]
    AlreadyExists(PathBuf),
}

/// Errors resolving runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No factory given on the command line, in the environment or on disk
    #[error("no factory address: pass --factory, set SALTMINE_FACTORY or provide {0}")]
    MissingFactory(PathBuf),

    /// Failed to read the factory config file
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Factory config file is malformed
    #[error("malformed factory config {path}: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// The factory's event reported a different address than the local
/// derivation. Deployment still succeeded; the event address is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("factory event reported {reported} but expected {expected}")]
pub struct AddressMismatch {
    pub expected: Address,
    pub reported: Address,
}
