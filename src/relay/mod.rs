//! Bundle relay interface

mod flashbots;

pub use flashbots::FlashbotsRelay;

use crate::builder::SignedBundle;
use crate::chain::ChainState;
use crate::error::RelayError;
use crate::types::{Resolution, SimulationOutcome};
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// A relay that accepts pre-formed bundles instead of the public mempool
#[async_trait]
pub trait Relay: Send + Sync {
    /// Dry-run the bundle on top of the latest state
    async fn simulate(&self, bundle: &SignedBundle) -> Result<SimulationOutcome, RelayError>;

    /// Submit the bundle for inclusion in exactly `target_block`
    async fn send_bundle(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> Result<BundleSubmission, RelayError>;

    /// Wait for the outcome of one submission
    async fn wait(&self, submission: &BundleSubmission) -> Result<Resolution, RelayError>;
}

/// Transaction as tracked for inclusion checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub signer: Address,
    pub nonce: U256,
    pub hash: H256,
}

/// Handle for one bundle submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSubmission {
    pub target_block: u64,
    pub bundle_hash: Option<H256>,
    /// Relay refused the bundle; no inclusion is possible
    pub rejection: Option<String>,
    pub transactions: Vec<SubmittedTx>,
}

impl BundleSubmission {
    pub fn new(bundle: &SignedBundle, target_block: u64) -> Self {
        Self {
            target_block,
            bundle_hash: None,
            rejection: None,
            transactions: bundle
                .entries()
                .iter()
                .map(|e| SubmittedTx {
                    signer: e.signer,
                    nonce: e.nonce,
                    hash: e.hash,
                })
                .collect(),
        }
    }
}

/// Decide the outcome of a submission from the chain once the target block exists.
///
/// Every bundle transaction in the target block means inclusion. Otherwise a
/// signer whose nonce at the target block has moved past its bundle nonce
/// means the bundle can never land.
pub async fn resolve_inclusion(
    chain: &dyn ChainState,
    submission: &BundleSubmission,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Resolution, RelayError> {
    if let Some(reason) = &submission.rejection {
        return Ok(Resolution::Failure(reason.clone()));
    }

    let target = submission.target_block;
    let deadline = Instant::now() + timeout;
    let block_transactions = loop {
        if chain.block_number().await? >= target {
            if let Some(txs) = chain.block_transactions(target).await? {
                break txs;
            }
        }
        if Instant::now() >= deadline {
            return Err(RelayError::ResolutionTimeout(target));
        }
        sleep(poll_interval).await;
    };

    let included = submission
        .transactions
        .iter()
        .all(|tx| block_transactions.contains(&tx.hash));
    if included {
        return Ok(Resolution::Included);
    }

    for tx in &submission.transactions {
        let nonce = chain.nonce(tx.signer, Some(target)).await?;
        if nonce > tx.nonce {
            debug!(signer = ?tx.signer, %nonce, bundle_nonce = %tx.nonce, "Signer nonce moved");
            return Ok(Resolution::SignerNonceTooHigh);
        }
    }

    Ok(Resolution::NotIncludedInBlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;

    fn submission(target_block: u64) -> BundleSubmission {
        BundleSubmission {
            target_block,
            bundle_hash: None,
            rejection: None,
            transactions: vec![
                SubmittedTx {
                    signer: Address::repeat_byte(1),
                    nonce: U256::from(4),
                    hash: H256::repeat_byte(0xa1),
                },
                SubmittedTx {
                    signer: Address::repeat_byte(2),
                    nonce: U256::from(0),
                    hash: H256::repeat_byte(0xa2),
                },
            ],
        }
    }

    const POLL: Duration = Duration::from_millis(1);
    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_included() {
        let chain = MockChain::new().with_head(12);
        chain.add_block(
            12,
            vec![H256::repeat_byte(0x01), H256::repeat_byte(0xa1), H256::repeat_byte(0xa2)],
        );
        let resolution = resolve_inclusion(&chain, &submission(12), POLL, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Included);
    }

    #[tokio::test]
    async fn test_not_included() {
        let chain = MockChain::new()
            .with_head(12)
            .with_nonce(Address::repeat_byte(1), 4);
        chain.add_block(12, vec![H256::repeat_byte(0x01)]);
        let resolution = resolve_inclusion(&chain, &submission(12), POLL, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::NotIncludedInBlock);
    }

    #[tokio::test]
    async fn test_nonce_too_high() {
        let chain = MockChain::new()
            .with_head(12)
            .with_nonce(Address::repeat_byte(1), 5);
        chain.add_block(12, vec![]);
        let resolution = resolve_inclusion(&chain, &submission(12), POLL, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::SignerNonceTooHigh);
    }

    #[tokio::test]
    async fn test_waits_for_target_block() {
        let chain = MockChain::new().with_heights(&[10, 11, 12]);
        chain.add_block(12, vec![H256::repeat_byte(0xa1), H256::repeat_byte(0xa2)]);
        let resolution = resolve_inclusion(&chain, &submission(12), POLL, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Included);
    }

    #[tokio::test]
    async fn test_times_out() {
        let chain = MockChain::new().with_head(3);
        let result =
            resolve_inclusion(&chain, &submission(12), POLL, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(RelayError::ResolutionTimeout(12))));
    }

    #[tokio::test]
    async fn test_rejected_submission_is_failure() {
        let chain = MockChain::new();
        let mut rejected = submission(12);
        rejected.rejection = Some("bundle too large".to_string());
        let resolution = resolve_inclusion(&chain, &rejected, POLL, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Failure("bundle too large".to_string()));
    }
}
