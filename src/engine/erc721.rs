//! ERC-721 transfers by token id

use crate::chain::ChainState;
use crate::error::EngineError;
use crate::settlement::SettlementVerifier;
use crate::types::{ProbeTriple, TransactionIntent};
use ethers::{
    abi::AbiEncode,
    contract::abigen,
    types::{Address, U256},
};
use tracing::debug;

abigen!(
    Erc721Token,
    r#"[
        function ownerOf(uint256 tokenId) external view returns (address)
        function transferFrom(address from, address to, uint256 tokenId) external
        function setApprovalForAll(address operator, bool approved) external
        function isApprovedForAll(address owner, address operator) external view returns (bool)
    ]"#
);

pub const TRANSFER_GAS_LIMIT: u64 = 500_000;

/// One `transferFrom` per token id, one `ownerOf` probe per token id
#[derive(Debug, Clone)]
pub struct NonFungibleTransfer {
    token: Address,
    sender: Address,
    recipient: Address,
    token_ids: Vec<U256>,
    verifier: SettlementVerifier,
}

impl NonFungibleTransfer {
    /// Fails fast unless `sender` currently owns every token id.
    pub async fn new(
        chain: &dyn ChainState,
        token: Address,
        sender: Address,
        recipient: Address,
        token_ids: Vec<U256>,
        verifier: SettlementVerifier,
    ) -> Result<Self, EngineError> {
        if token_ids.is_empty() {
            return Err(EngineError::Empty("token ids"));
        }

        for &token_id in &token_ids {
            let owner = chain.token_owner(token, token_id).await?;
            if owner != sender {
                return Err(EngineError::OwnershipMismatch {
                    token_id,
                    owner,
                    sender,
                });
            }
            debug!(%token_id, "Ownership confirmed");
        }

        Ok(Self {
            token,
            sender,
            recipient,
            token_ids,
            verifier,
        })
    }

    pub fn describe(&self) -> String {
        let ids: Vec<String> = self.token_ids.iter().map(|id| id.to_string()).collect();
        format!(
            "Transfer ERC721 tokens {} @ {:?} from {:?} to {:?}",
            ids.join(","),
            self.token,
            self.sender,
            self.recipient
        )
    }

    pub fn zero_gas_transactions(&self) -> Vec<TransactionIntent> {
        self.token_ids
            .iter()
            .map(|&token_id| {
                let call = TransferFromCall {
                    from: self.sender,
                    to: self.recipient,
                    token_id,
                };
                TransactionIntent::zero_gas(self.token, call.encode(), TRANSFER_GAS_LIMIT)
            })
            .collect()
    }

    pub fn probes(&self) -> Vec<ProbeTriple> {
        self.token_ids
            .iter()
            .map(|&token_id| {
                ProbeTriple::new(
                    self.token,
                    OwnerOfCall { token_id }.encode(),
                    self.recipient.encode(),
                )
            })
            .collect()
    }

    pub fn donor_transaction(&self, reward: U256) -> Result<TransactionIntent, EngineError> {
        Ok(self.verifier.donor_transaction(&self.probes(), reward)?)
    }
}
