use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::Address;
use serde::Deserialize;
use tracing::debug;

use crate::{error::ConfigError, record::address_hex};

/// Environment variable holding the factory address.
pub const FACTORY_ENV: &str = "SALTMINE_FACTORY";

/// Per-network factory file written when the factory itself was deployed:
/// `factory-<network>.json` containing `{ "factory": "0x.." }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FactoryConfig {
    #[serde(with = "address_hex")]
    pub factory: Address,
}

impl FactoryConfig {
    pub fn path(config_dir: &Path, network: &str) -> PathBuf {
        config_dir.join(format!("factory-{network}.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolves the factory address from an explicit value (command line or
/// [`FACTORY_ENV`]) or, failing that, the network's factory file.
pub fn resolve_factory(
    explicit: Option<Address>,
    config_dir: &Path,
    network: &str,
) -> Result<Address, ConfigError> {
    if let Some(factory) = explicit {
        return Ok(factory);
    }

    let path = FactoryConfig::path(config_dir, network);
    if !path.exists() {
        return Err(ConfigError::MissingFactory(path));
    }
    let config = FactoryConfig::load(&path)?;
    debug!(path = %path.display(), factory = %config.factory, "loaded factory config");
    Ok(config.factory)
}
