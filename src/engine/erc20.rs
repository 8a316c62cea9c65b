//! Full-balance ERC-20 transfer

use crate::chain::ChainState;
use crate::error::EngineError;
use crate::settlement::SettlementVerifier;
use crate::types::{ProbeTriple, TransactionIntent};
use ethers::{
    abi::AbiEncode,
    contract::abigen,
    types::{Address, U256},
};

abigen!(
    Erc20Token,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function transfer(address recipient, uint256 amount) external returns (bool)
    ]"#
);

pub const TRANSFER_GAS_LIMIT: u64 = 100_000;

/// Moves the sender's entire token balance to the recipient.
///
/// The donor probe checks that the sender's balance is zero afterwards.
#[derive(Debug, Clone)]
pub struct FungibleTransfer {
    token: Address,
    sender: Address,
    recipient: Address,
    balance: U256,
    verifier: SettlementVerifier,
}

impl FungibleTransfer {
    /// Reads the sender's starting balance; an empty balance is rejected.
    pub async fn new(
        chain: &dyn ChainState,
        token: Address,
        sender: Address,
        recipient: Address,
        verifier: SettlementVerifier,
    ) -> Result<Self, EngineError> {
        let balance = chain.token_balance(token, sender).await?;
        if balance.is_zero() {
            return Err(EngineError::NothingToTransfer(sender));
        }

        Ok(Self {
            token,
            sender,
            recipient,
            balance,
            verifier,
        })
    }

    pub fn describe(&self) -> String {
        format!(
            "Transfer ERC20 balance {} @ {:?} from {:?} to {:?}",
            self.balance, self.token, self.sender, self.recipient
        )
    }

    pub fn zero_gas_transactions(&self) -> Vec<TransactionIntent> {
        let call = TransferCall {
            recipient: self.recipient,
            amount: self.balance,
        };
        vec![TransactionIntent::zero_gas(self.token, call.encode(), TRANSFER_GAS_LIMIT)]
    }

    pub fn probes(&self) -> Vec<ProbeTriple> {
        let probe = BalanceOfCall { owner: self.sender };
        vec![ProbeTriple::new(self.token, probe.encode(), U256::zero().encode())]
    }

    pub fn donor_transaction(&self, reward: U256) -> Result<TransactionIntent, EngineError> {
        Ok(self.verifier.donor_transaction(&self.probes(), reward)?)
    }
}
