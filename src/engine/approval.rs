//! Operator approval over whole ERC-721 collections

use super::erc721::{IsApprovedForAllCall, SetApprovalForAllCall};
use crate::error::EngineError;
use crate::settlement::SettlementVerifier;
use crate::types::{ProbeTriple, TransactionIntent};
use ethers::{
    abi::AbiEncode,
    types::{Address, U256},
};

pub const APPROVAL_GAS_LIMIT: u64 = 100_000;

/// `setApprovalForAll(recipient, true)` on every listed contract.
///
/// Usually submitted on its own; when paired with a donor, each contract is
/// probed with `isApprovedForAll(sender, recipient)`.
#[derive(Debug, Clone)]
pub struct ApprovalGrant {
    sender: Address,
    recipient: Address,
    contracts: Vec<Address>,
    verifier: SettlementVerifier,
}

impl ApprovalGrant {
    pub fn new(
        sender: Address,
        recipient: Address,
        contracts: Vec<Address>,
        verifier: SettlementVerifier,
    ) -> Result<Self, EngineError> {
        if contracts.is_empty() {
            return Err(EngineError::Empty("approval contracts"));
        }
        Ok(Self {
            sender,
            recipient,
            contracts,
            verifier,
        })
    }

    pub fn describe(&self) -> String {
        let contracts: Vec<String> = self.contracts.iter().map(|c| format!("{:?}", c)).collect();
        format!(
            "Giving {:?} approval for: {}",
            self.recipient,
            contracts.join(", ")
        )
    }

    pub fn zero_gas_transactions(&self) -> Vec<TransactionIntent> {
        self.contracts
            .iter()
            .map(|&contract| {
                let call = SetApprovalForAllCall {
                    operator: self.recipient,
                    approved: true,
                };
                TransactionIntent::zero_gas(contract, call.encode(), APPROVAL_GAS_LIMIT)
            })
            .collect()
    }

    pub fn probes(&self) -> Vec<ProbeTriple> {
        self.contracts
            .iter()
            .map(|&contract| {
                let probe = IsApprovedForAllCall {
                    owner: self.sender,
                    operator: self.recipient,
                };
                ProbeTriple::new(contract, probe.encode(), true.encode())
            })
            .collect()
    }

    pub fn donor_transaction(&self, reward: U256) -> Result<TransactionIntent, EngineError> {
        Ok(self.verifier.donor_transaction(&self.probes(), reward)?)
    }
}
