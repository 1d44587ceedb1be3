//! Deterministic CREATE2 addresses for factory deployments.
//!
//! - [`address`] derives the address a factory deploys init code to.
//! - [`mine`] searches salts for vanity addresses.
//! - [`deploy`] submits a deployment through a factory and confirms it.
//! - [`record`] persists the outcome of confirmed deployments.

pub mod address;
pub mod config;
pub mod deploy;
pub mod error;
pub mod init_code;
pub mod mine;
pub mod record;

#[cfg(test)]
mod test_vectors;

pub use address::{create2_address, derive};
pub use init_code::InitCode;
pub use mine::{Create2Miner, HexPrefix, SearchResult, SearchState, search};
