use std::{fs, path::Path};

use alloy_primitives::{Address, B256, Bytes, keccak256};
use alloy_sol_types::SolValue;
use serde::Deserialize;

use crate::error::InitCodeError;

/// Creation bytecode followed by its ABI-encoded constructor arguments.
///
/// This is the exact byte sequence the factory executes, and therefore the
/// value hashed into a CREATE2 address. Two different argument sets always
/// give two different `InitCode` values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitCode {
    code: Bytes,
    args_offset: usize,
}

/// Compiler artifact, as emitted by Hardhat (`"bytecode": "0x.."`) or Foundry
/// (`"bytecode": { "object": "0x.." }`).
#[derive(Deserialize)]
struct Artifact {
    bytecode: ArtifactBytecode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    Hex(String),
    Object { object: String },
}

impl InitCode {
    /// Init code for a contract without constructor arguments.
    pub fn new(bytecode: impl Into<Bytes>) -> Self {
        let code = bytecode.into();
        let args_offset = code.len();
        Self { code, args_offset }
    }

    /// Appends already ABI-encoded constructor arguments to `bytecode`.
    pub fn with_encoded_args(bytecode: impl AsRef<[u8]>, args: impl AsRef<[u8]>) -> Self {
        let (bytecode, args) = (bytecode.as_ref(), args.as_ref());
        let mut code = Vec::with_capacity(bytecode.len() + args.len());
        code.extend_from_slice(bytecode);
        code.extend_from_slice(args);
        Self {
            code: code.into(),
            args_offset: bytecode.len(),
        }
    }

    /// Appends a list of `address` constructor arguments, each encoded as one
    /// ABI word.
    pub fn with_address_args(bytecode: impl AsRef<[u8]>, args: &[Address]) -> Self {
        let encoded: Vec<u8> = args.iter().flat_map(|arg| arg.abi_encode()).collect();
        Self::with_encoded_args(bytecode, encoded)
    }

    /// Parses hex bytecode and optional hex constructor arguments. A `0x`
    /// prefix is accepted on both.
    pub fn from_hex(bytecode: &str, args: Option<&str>) -> Result<Self, InitCodeError> {
        let bytecode = decode_hex(bytecode)?;
        let args = args.map(decode_hex).transpose()?.unwrap_or_default();
        Ok(Self::with_encoded_args(bytecode, args))
    }

    /// Reads the creation bytecode out of a compiler artifact.
    pub fn artifact_bytecode(path: &Path) -> Result<Bytes, InitCodeError> {
        let raw = fs::read_to_string(path).map_err(|source| InitCodeError::ArtifactRead {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: Artifact =
            serde_json::from_str(&raw).map_err(|source| InitCodeError::ArtifactFormat {
                path: path.to_path_buf(),
                source,
            })?;

        let encoded = match artifact.bytecode {
            ArtifactBytecode::Hex(encoded) | ArtifactBytecode::Object { object: encoded } => {
                encoded
            }
        };
        let bytecode = decode_hex(&encoded)?;
        if bytecode.is_empty() {
            return Err(InitCodeError::EmptyBytecode(path.to_path_buf()));
        }
        Ok(bytecode.into())
    }

    /// The full init code: bytecode followed by constructor arguments.
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.code[..self.args_offset]
    }

    pub fn constructor_args(&self) -> &[u8] {
        &self.code[self.args_offset..]
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Keccak-256 of the full init code.
    pub fn hash(&self) -> B256 {
        keccak256(&self.code)
    }
}

impl AsRef<[u8]> for InitCode {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<InitCode> for Bytes {
    fn from(init_code: InitCode) -> Self {
        init_code.code
    }
}

/// Decodes a hex string with or without a `0x` prefix.
pub fn decode_hex(raw: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let raw = raw.trim();
    hex::decode(
        raw.strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw),
    )
}
