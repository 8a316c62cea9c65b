//! Transfer engines
//!
//! An engine turns a transfer intent into the zero-gas transactions signed by
//! the asset holder plus one donor transaction that pays the block producer
//! through the check-and-send contract, conditioned on the post-transfer state.

pub mod approval;
pub mod erc20;
pub mod erc721;

pub use approval::ApprovalGrant;
pub use erc20::FungibleTransfer;
pub use erc721::NonFungibleTransfer;

use crate::chain::ChainState;
use crate::error::EngineError;
use crate::settlement::SettlementVerifier;
use crate::types::{ProbeTriple, TransactionIntent};
use ethers::types::{Address, U256};
use tracing::info;

/// Which transfer to build, with its validated addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    FungibleTransfer { token: Address },
    NonFungibleTransfer { token: Address, token_ids: Vec<U256> },
    ApprovalGrant { contracts: Vec<Address> },
}

/// Transfer engine variants
#[derive(Debug, Clone)]
pub enum Engine {
    FungibleTransfer(FungibleTransfer),
    NonFungibleTransfer(NonFungibleTransfer),
    ApprovalGrant(ApprovalGrant),
}

impl Engine {
    /// Build the selected engine, reading whatever on-chain state it needs up front
    pub async fn build(
        kind: &EngineKind,
        chain: &dyn ChainState,
        sender: Address,
        recipient: Address,
        verifier: SettlementVerifier,
    ) -> Result<Self, EngineError> {
        let engine = match kind {
            EngineKind::FungibleTransfer { token } => Engine::FungibleTransfer(
                FungibleTransfer::new(chain, *token, sender, recipient, verifier).await?,
            ),
            EngineKind::NonFungibleTransfer { token, token_ids } => Engine::NonFungibleTransfer(
                NonFungibleTransfer::new(
                    chain,
                    *token,
                    sender,
                    recipient,
                    token_ids.clone(),
                    verifier,
                )
                .await?,
            ),
            EngineKind::ApprovalGrant { contracts } => Engine::ApprovalGrant(ApprovalGrant::new(
                sender,
                recipient,
                contracts.clone(),
                verifier,
            )?),
        };
        info!(engine = engine.name(), "Engine ready");
        Ok(engine)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::FungibleTransfer(_) => "erc20",
            Engine::NonFungibleTransfer(_) => "erc721",
            Engine::ApprovalGrant(_) => "approval721",
        }
    }

    /// Human-readable summary for the audit log
    pub fn describe(&self) -> String {
        match self {
            Engine::FungibleTransfer(e) => e.describe(),
            Engine::NonFungibleTransfer(e) => e.describe(),
            Engine::ApprovalGrant(e) => e.describe(),
        }
    }

    pub fn zero_gas_transactions(&self) -> Vec<TransactionIntent> {
        match self {
            Engine::FungibleTransfer(e) => e.zero_gas_transactions(),
            Engine::NonFungibleTransfer(e) => e.zero_gas_transactions(),
            Engine::ApprovalGrant(e) => e.zero_gas_transactions(),
        }
    }

    pub fn probes(&self) -> Vec<ProbeTriple> {
        match self {
            Engine::FungibleTransfer(e) => e.probes(),
            Engine::NonFungibleTransfer(e) => e.probes(),
            Engine::ApprovalGrant(e) => e.probes(),
        }
    }

    pub fn donor_transaction(&self, reward: U256) -> Result<TransactionIntent, EngineError> {
        match self {
            Engine::FungibleTransfer(e) => e.donor_transaction(reward),
            Engine::NonFungibleTransfer(e) => e.donor_transaction(reward),
            Engine::ApprovalGrant(e) => e.donor_transaction(reward),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::settlement::SettlementVerifier;

    #[tokio::test]
    async fn test_build_dispatch() {
        let token = Address::repeat_byte(1);
        let sender = Address::repeat_byte(2);
        let chain = MockChain::new()
            .with_token_balance(token, sender, U256::from(1))
            .with_owner(token, 7, sender);
        let verifier = SettlementVerifier::new(Address::repeat_byte(0xcc));

        let kinds = [
            EngineKind::FungibleTransfer { token },
            EngineKind::NonFungibleTransfer {
                token,
                token_ids: vec![U256::from(7)],
            },
            EngineKind::ApprovalGrant {
                contracts: vec![token],
            },
        ];
        let mut names = Vec::new();
        for kind in &kinds {
            let engine = Engine::build(kind, &chain, sender, Address::repeat_byte(3), verifier)
                .await
                .unwrap();
            assert_eq!(engine.zero_gas_transactions().len(), 1);
            assert_eq!(engine.probes().len(), 1);
            names.push(engine.name());
        }
        assert_eq!(names, vec!["erc20", "erc721", "approval721"]);
    }

    #[tokio::test]
    async fn test_donor_probe_counts() {
        let token = Address::repeat_byte(1);
        let sender = Address::repeat_byte(2);
        let chain = MockChain::new()
            .with_token_balance(token, sender, U256::from(1000))
            .with_owner(token, 1, sender)
            .with_owner(token, 2, sender);
        let verifier = SettlementVerifier::new(Address::repeat_byte(0xcc));
        let reward = U256::from(1_000_000u64);

        let fungible = Engine::build(
            &EngineKind::FungibleTransfer { token },
            &chain,
            sender,
            Address::repeat_byte(3),
            verifier,
        )
        .await
        .unwrap();
        let donor = fungible.donor_transaction(reward).unwrap();
        assert_eq!(SettlementVerifier::decode(&donor.data).unwrap().len(), 1);

        let nft = Engine::build(
            &EngineKind::NonFungibleTransfer {
                token,
                token_ids: vec![U256::from(1), U256::from(2)],
            },
            &chain,
            sender,
            Address::repeat_byte(3),
            verifier,
        )
        .await
        .unwrap();
        let donor = nft.donor_transaction(reward).unwrap();
        assert_eq!(
            SettlementVerifier::decode(&donor.data).unwrap().len(),
            nft.zero_gas_transactions().len()
        );
        assert_eq!(donor.value, reward);
    }
}
