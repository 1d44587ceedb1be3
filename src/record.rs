use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RecordError;

/// Outcome of one confirmed deployment.
///
/// Records are written once, after confirmation, and never modified.
/// Addresses and salts are serialized as lowercase, `0x`-prefixed, fixed
/// width hex; the timestamp as RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub network: String,
    #[serde(with = "address_hex")]
    pub factory: Address,
    #[serde(with = "address_hex")]
    pub address: Address,
    #[serde(with = "salt_hex")]
    pub salt: B256,
    #[serde(with = "address_hex")]
    pub deployer: Address,
    pub timestamp: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Reads a record written by [`JsonFileSink`].
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let raw = fs::read_to_string(path).map_err(|source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// File name the record is stored under: `<network>-<address>.json`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.network, encode(self.address.as_slice()))
    }
}

/// Destination for confirmed deployment records.
pub trait RecordSink {
    fn persist(&mut self, record: &DeploymentRecord) -> Result<(), RecordError>;
}

/// Writes each record as pretty-printed JSON to its own file in a directory.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, record: &DeploymentRecord) -> PathBuf {
        self.dir.join(record.file_name())
    }
}

impl RecordSink for JsonFileSink {
    fn persist(&mut self, record: &DeploymentRecord) -> Result<(), RecordError> {
        let path = self.path_for(record);
        let io_err = |source| RecordError::Io {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(RecordError::AlreadyExists(path));
            }
            Err(err) => return Err(io_err(err)),
        };

        serde_json::to_writer_pretty(&mut file, record)?;
        file.write_all(b"\n").map_err(io_err)?;

        info!(path = %path.display(), address = %record.address, "wrote deployment record");
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn persist(&mut self, record: &DeploymentRecord) -> Result<(), RecordError> {
        (**self).persist(record)
    }
}

/// In-memory sink, handy for tests and dry runs.
impl RecordSink for Vec<DeploymentRecord> {
    fn persist(&mut self, record: &DeploymentRecord) -> Result<(), RecordError> {
        self.push(record.clone());
        Ok(())
    }
}

fn encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes a `0x`-prefixed hex string of exactly `N` bytes.
fn decode<const N: usize>(raw: &str) -> Result<[u8; N], String> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| format!("{raw:?} is missing the 0x prefix"))?;
    if digits.len() != N * 2 {
        return Err(format!(
            "{raw:?} has {} hex characters, expected {}",
            digits.len(),
            N * 2
        ));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|err| format!("{raw:?}: {err}"))?;
    Ok(out)
}

pub(crate) mod address_hex {
    use alloy_primitives::Address;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(crate) fn serialize<S: Serializer>(
        value: &Address,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(value.as_slice()))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Address, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::decode::<20>(&raw).map(Address::from).map_err(D::Error::custom)
    }
}

mod salt_hex {
    use alloy_primitives::B256;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(super) fn serialize<S: Serializer>(value: &B256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(value.as_slice()))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<B256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::decode::<32>(&raw).map(B256::from).map_err(D::Error::custom)
    }
}
