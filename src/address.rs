use alloy_primitives::{Address, B256, keccak256};

use crate::error::DeriveError;

/// Leading byte of every CREATE2 preimage.
const CREATE2_PREFIX: u8 = 0xff;

const ADDRESS_LEN: usize = 20;
const SALT_LEN: usize = 32;

/// Length of the CREATE2 preimage: `0xff ‖ factory ‖ salt ‖ keccak256(init_code)`.
const PREIMAGE_LEN: usize = 1 + ADDRESS_LEN + SALT_LEN + 32;

/// Computes the address a factory deploys `init_code` to when called with
/// `salt`.
///
/// This is the address-derivation rule of EIP-1014:
/// `keccak256(0xff ‖ factory ‖ salt ‖ keccak256(init_code))[12..]`.
pub fn create2_address(factory: Address, salt: B256, init_code: &[u8]) -> Address {
    create2_address_from_hash(factory, salt, keccak256(init_code))
}

/// Same as [`create2_address`] for callers that already hold the init code
/// hash. The salt miner uses this to hash the init code only once.
pub fn create2_address_from_hash(factory: Address, salt: B256, init_code_hash: B256) -> Address {
    let mut preimage = [0u8; PREIMAGE_LEN];
    preimage[0] = CREATE2_PREFIX;
    preimage[1..21].copy_from_slice(factory.as_slice());
    preimage[21..53].copy_from_slice(salt.as_slice());
    preimage[53..85].copy_from_slice(init_code_hash.as_slice());

    Address::from_word(keccak256(preimage))
}

/// Byte-slice entry point for inputs that have not been validated yet, such as
/// decoded command-line arguments.
///
/// # Errors
///
/// Returns [`DeriveError::InvalidInputLength`] when `factory` is not exactly 20
/// bytes or `salt` is not exactly 32 bytes. Inputs are never padded or
/// truncated.
pub fn derive(factory: &[u8], salt: &[u8], init_code: &[u8]) -> Result<Address, DeriveError> {
    let factory: [u8; ADDRESS_LEN] = factory
        .try_into()
        .map_err(|_| DeriveError::InvalidInputLength {
            field: "factory",
            expected: ADDRESS_LEN,
            actual: factory.len(),
        })?;
    let salt: [u8; SALT_LEN] = salt
        .try_into()
        .map_err(|_| DeriveError::InvalidInputLength {
            field: "salt",
            expected: SALT_LEN,
            actual: salt.len(),
        })?;

    Ok(create2_address(Address::from(factory), B256::from(salt), init_code))
}
