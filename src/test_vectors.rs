use alloy_primitives::{Address, address, hex};

/// Factory the debug deployments ran against.
pub(crate) const TEST_FACTORY: Address = address!("0x157fe708955dF00062fF332e8Bf2252Dfe184075");

/// Minimal contract bytecode used for test deployments through the factory.
pub(crate) const TEST_BYTECODE: &[u8] = &hex!(
    "608060405234801561001057600080fd5b50603f8061001f6000396000f3fe6080604052600080fdfea2646970667358221220c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a47064736f6c63430008110033"
);
