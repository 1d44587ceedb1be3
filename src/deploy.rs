//! Deployment through a CREATE2 factory.
//!
//! [`Deployer`] drives one deployment attempt against external collaborators:
//! a [`Chain`] for reads and confirmations, a [`Factory`] for the deploy
//! entrypoint and a [`RecordSink`] for the resulting [`DeploymentRecord`].
//! Transport, signing and retries belong to the collaborators; the deployer
//! only sequences the steps and decides what counts as success.

use std::future::Future;

use alloy_primitives::{Address, B256, Bytes, TxHash};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    address::create2_address,
    error::{AddressMismatch, ChainError, DeployError},
    init_code::InitCode,
    record::{DeploymentRecord, RecordSink},
};

/// Gas limit used when estimation fails.
pub const DEFAULT_MANUAL_GAS_LIMIT: u64 = 5_000_000;

/// Headroom added on top of a successful gas estimate, in percent.
pub const DEFAULT_ESTIMATE_MARGIN_PERCENT: u64 = 20;

/// Call to the factory's deploy entrypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCall {
    pub factory: Address,
    pub salt: B256,
    pub init_code: Bytes,
}

/// Gas parameters attached to the deploy transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasParams {
    pub gas_limit: u64,
    /// Legacy gas price in wei; `None` leaves pricing to the collaborator.
    pub gas_price: Option<u128>,
}

/// How the deploy transaction's gas limit is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    /// Limit used when estimation fails.
    pub manual_gas_limit: u64,
    pub gas_price: Option<u128>,
    /// Percentage added to a successful estimate.
    pub estimate_margin_percent: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            manual_gas_limit: DEFAULT_MANUAL_GAS_LIMIT,
            gas_price: None,
            estimate_margin_percent: DEFAULT_ESTIMATE_MARGIN_PERCENT,
        }
    }
}

impl GasPolicy {
    /// The estimate plus the configured margin.
    pub fn padded(&self, estimate: u64) -> u64 {
        let padded = u128::from(estimate) * u128::from(100 + self.estimate_margin_percent) / 100;
        u64::try_from(padded).unwrap_or(u64::MAX)
    }
}

/// Where the gas limit of a deployment came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasSource {
    Estimated { estimate: u64 },
    /// Estimation failed; the manual limit was used.
    Manual { reason: String },
}

/// Handle to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: TxHash,
}

/// Decoded log of the factory. `new_contract` is set on deployment events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryEvent {
    pub new_contract: Option<Address>,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub gas_used: u64,
    pub events: Vec<FactoryEvent>,
}

impl Receipt {
    /// First contract address announced by the factory's events.
    pub fn new_contract(&self) -> Option<Address> {
        self.events.iter().find_map(|event| event.new_contract)
    }
}

/// Read and confirmation access to the chain.
pub trait Chain {
    /// Deployed code at `address`; empty when no contract lives there.
    fn get_code(&self, address: Address) -> impl Future<Output = Result<Bytes, ChainError>> + Send;

    fn estimate_gas(
        &self,
        call: &DeployCall,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Waits until `tx` is mined and returns its receipt.
    fn wait_for_receipt(
        &self,
        tx: &TxHandle,
    ) -> impl Future<Output = Result<Receipt, ChainError>> + Send;
}

/// The deployed factory contract.
pub trait Factory {
    /// The factory's own view of the CREATE2 address (`computeAddress`).
    fn compute_address(
        &self,
        call: &DeployCall,
    ) -> impl Future<Output = Result<Address, ChainError>> + Send;

    /// Submits `deploy(salt, initCode)` and returns without waiting for it to
    /// be mined.
    fn deploy(
        &self,
        call: &DeployCall,
        gas: &GasParams,
    ) -> impl Future<Output = Result<TxHandle, ChainError>> + Send;
}

/// Result of a confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutcome {
    /// The persisted record.
    pub record: DeploymentRecord,
    pub tx_hash: TxHash,
    pub gas: GasParams,
    pub gas_source: GasSource,
    pub gas_used: u64,
    /// Set when the factory's event disagreed with the local derivation.
    pub mismatch: Option<AddressMismatch>,
}

/// Sequences deployment attempts through a factory.
///
/// `deploy` takes `&mut self`, so a deployer runs at most one attempt at a
/// time.
#[derive(Debug)]
pub struct Deployer<C, F, S> {
    chain: C,
    factory: F,
    sink: S,
    network: String,
    deployer: Address,
    verify_remote: bool,
}

impl<C, F, S> Deployer<C, F, S>
where
    C: Chain,
    F: Factory,
    S: RecordSink,
{
    /// `deployer` is the account submitting transactions and is echoed into
    /// every record.
    pub fn new(
        network: impl Into<String>,
        deployer: Address,
        chain: C,
        factory: F,
        sink: S,
    ) -> Self {
        Self {
            chain,
            factory,
            sink,
            network: network.into(),
            deployer,
            verify_remote: false,
        }
    }

    /// Also asks the factory for its `computeAddress` result and refuses to
    /// deploy when it differs from the local derivation.
    pub fn with_remote_verification(mut self, enabled: bool) -> Self {
        self.verify_remote = enabled;
        self
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Derives the target address and checks that nothing is deployed there.
    ///
    /// Runs no transaction and can be repeated freely.
    pub async fn check_available(&self, call: &DeployCall) -> Result<Address, DeployError> {
        let expected = create2_address(call.factory, call.salt, &call.init_code);
        debug!(%expected, factory = %call.factory, salt = %call.salt, "derived deployment address");

        if self.verify_remote {
            let remote = self
                .factory
                .compute_address(call)
                .await
                .map_err(DeployError::Chain)?;
            if remote != expected {
                return Err(DeployError::FactoryMismatch { expected, remote });
            }
        }

        let code = self
            .chain
            .get_code(expected)
            .await
            .map_err(DeployError::Chain)?;
        if !code.is_empty() {
            return Err(DeployError::AddressCollision {
                address: expected,
                code_len: code.len(),
            });
        }

        Ok(expected)
    }

    /// Deploys `init_code` through `factory` at `salt`.
    ///
    /// Nothing is submitted when the target address already holds code.
    /// A failed gas estimate falls back to the policy's manual limit. Once
    /// submitted, the attempt waits for the receipt. The record uses the
    /// address from the factory's event when present, falling back to the
    /// local derivation; disagreement is reported in
    /// [`DeploymentOutcome::mismatch`].
    ///
    /// Failures after submission keep the transaction hash
    /// ([`DeployError::ConfirmationFailed`]), and a record the sink rejects is
    /// returned inside [`DeployError::RecordNotPersisted`].
    pub async fn deploy(
        &mut self,
        factory: Address,
        salt: B256,
        init_code: &InitCode,
        gas_policy: &GasPolicy,
    ) -> Result<DeploymentOutcome, DeployError> {
        let call = DeployCall {
            factory,
            salt,
            init_code: init_code.clone().into(),
        };

        let expected = self.check_available(&call).await?;
        info!(%expected, network = %self.network, "target address is free");

        let (gas_limit, gas_source) = match self.chain.estimate_gas(&call).await {
            Ok(estimate) => (
                gas_policy.padded(estimate),
                GasSource::Estimated { estimate },
            ),
            Err(err) => {
                warn!(
                    %err,
                    gas_limit = gas_policy.manual_gas_limit,
                    "gas estimation failed, using manual limit"
                );
                (
                    gas_policy.manual_gas_limit,
                    GasSource::Manual {
                        reason: err.to_string(),
                    },
                )
            }
        };
        let gas = GasParams {
            gas_limit,
            gas_price: gas_policy.gas_price,
        };

        let tx = self.factory.deploy(&call, &gas).await?;
        info!(tx_hash = %tx.hash, gas_limit, "deploy transaction sent");

        let receipt = self
            .chain
            .wait_for_receipt(&tx)
            .await
            .map_err(|err| match err {
                ChainError::Reverted(reason) => DeployError::SubmissionReverted {
                    tx_hash: Some(tx.hash),
                    reason,
                },
                source => {
                    warn!(tx_hash = %tx.hash, %source, "lost track of deploy transaction");
                    DeployError::ConfirmationFailed {
                        tx_hash: tx.hash,
                        source,
                    }
                }
            })?;
        if !receipt.success {
            return Err(DeployError::SubmissionReverted {
                tx_hash: Some(receipt.tx_hash),
                reason: "transaction failed".to_string(),
            });
        }
        debug!(
            gas_used = receipt.gas_used,
            events = receipt.events.len(),
            "deploy transaction mined"
        );

        let (address, mismatch) = resolve_address(expected, receipt.new_contract());

        let record = DeploymentRecord {
            network: self.network.clone(),
            factory,
            address,
            salt,
            deployer: self.deployer,
            timestamp: Utc::now(),
        };
        if let Err(source) = self.sink.persist(&record) {
            warn!(
                %address,
                tx_hash = %receipt.tx_hash,
                salt = %record.salt,
                %source,
                "deployed but failed to persist record"
            );
            return Err(DeployError::RecordNotPersisted {
                record: Box::new(record),
                tx_hash: receipt.tx_hash,
                source,
            });
        }
        info!(%address, tx_hash = %receipt.tx_hash, "deployment confirmed");

        Ok(DeploymentOutcome {
            record,
            tx_hash: receipt.tx_hash,
            gas,
            gas_source,
            gas_used: receipt.gas_used,
            mismatch,
        })
    }
}

/// Picks the address to record. The event address wins when present.
fn resolve_address(
    expected: Address,
    reported: Option<Address>,
) -> (Address, Option<AddressMismatch>) {
    match reported {
        Some(reported) if reported != expected => {
            let mismatch = AddressMismatch { expected, reported };
            warn!(%mismatch, "factory deployed to an unexpected address");
            (reported, Some(mismatch))
        }
        Some(reported) => (reported, None),
        None => {
            debug!(%expected, "no deployment event, using derived address");
            (expected, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn padded_estimate() {
        let policy = GasPolicy::default();
        assert_eq!(policy.padded(100_000), 120_000);
        assert_eq!(policy.padded(u64::MAX), u64::MAX);

        let exact = GasPolicy {
            estimate_margin_percent: 0,
            ..GasPolicy::default()
        };
        assert_eq!(exact.padded(21_000), 21_000);
    }

    #[test]
    fn event_address_is_authoritative() {
        let expected = address!("0x232a01b802493bbac20c03e3c9e4f6c544ed57d5");
        let other = Address::with_last_byte(0x42);

        assert_eq!(resolve_address(expected, None), (expected, None));
        assert_eq!(resolve_address(expected, Some(expected)), (expected, None));
        assert_eq!(
            resolve_address(expected, Some(other)),
            (
                other,
                Some(AddressMismatch {
                    expected,
                    reported: other
                })
            )
        );
    }

    #[test]
    fn receipt_uses_first_announced_contract() {
        let first = Address::with_last_byte(1);
        let receipt = Receipt {
            tx_hash: TxHash::ZERO,
            success: true,
            gas_used: 0,
            events: vec![
                FactoryEvent::default(),
                FactoryEvent {
                    new_contract: Some(first),
                },
                FactoryEvent {
                    new_contract: Some(Address::with_last_byte(2)),
                },
            ],
        };
        assert_eq!(receipt.new_contract(), Some(first));
    }
}
