//! Core types for bundle construction and submission

use ethers::types::{Address, Bytes, U256};
use ethers::utils::WEI_IN_ETHER;
use serde::{Deserialize, Serialize};

/// Wei per gwei
pub const GWEI: u64 = 1_000_000_000;

/// Wei per ether
pub fn ether() -> U256 {
    WEI_IN_ETHER
}

/// Unsigned transaction produced by an engine.
///
/// Every intent in a bundle is zero-priced; the donor intent is the only one
/// that carries value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub target: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
}

impl TransactionIntent {
    /// Zero-priced call with no value attached
    pub fn zero_gas(target: Address, data: impl Into<Bytes>, gas_limit: u64) -> Self {
        Self {
            target,
            data: data.into(),
            value: U256::zero(),
            gas_limit: U256::from(gas_limit),
            gas_price: U256::zero(),
        }
    }

    /// Attach value, keeping the zero gas price
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// "Calling `probe_call_data` on `target` must return `expected_result`"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTriple {
    pub target: Address,
    pub probe_call_data: Bytes,
    pub expected_result: Bytes,
}

impl ProbeTriple {
    pub fn new(
        target: Address,
        probe_call_data: impl Into<Bytes>,
        expected_result: impl Into<Bytes>,
    ) -> Self {
        Self {
            target,
            probe_call_data: probe_call_data.into(),
            expected_result: expected_result.into(),
        }
    }

    /// Whether the expected result fits the fixed 32-byte verifier entry points.
    pub fn is_word(&self) -> bool {
        self.expected_result.len() == 32
    }
}

/// Per-transaction result of a relay dry run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxSimulation {
    pub gas_used: u64,
    pub error: Option<String>,
    pub revert: Option<String>,
}

impl TxSimulation {
    pub fn succeeded(gas_used: u64) -> Self {
        Self {
            gas_used,
            ..Default::default()
        }
    }

    pub fn reverted(error: impl Into<String>, revert: Option<String>) -> Self {
        Self {
            error: Some(error.into()),
            revert,
            ..Default::default()
        }
    }

    /// Combined failure text, if the transaction did not execute cleanly.
    pub fn failure(&self) -> Option<String> {
        match (&self.error, &self.revert) {
            (None, None) => None,
            (Some(error), Some(revert)) => Some(format!("{} {}", error, revert)),
            (Some(error), None) => Some(error.clone()),
            (None, Some(revert)) => Some(revert.clone()),
        }
    }
}

/// Result of simulating a whole bundle.
///
/// `coinbase_delta` and the gas figures only mean something when no entry
/// reports a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub per_transaction: Vec<TxSimulation>,
    pub coinbase_delta: U256,
}

impl SimulationOutcome {
    pub fn total_gas_used(&self) -> U256 {
        self.per_transaction
            .iter()
            .fold(U256::zero(), |acc, tx| acc + U256::from(tx.gas_used))
    }
}

/// Terminal outcome of one submission for one target block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Included,
    NotIncludedInBlock,
    SignerNonceTooHigh,
    /// The relay refused the bundle outright.
    Failure(String),
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Included => "included",
            Resolution::NotIncludedInBlock => "not_included",
            Resolution::SignerNonceTooHigh => "nonce_too_high",
            Resolution::Failure(_) => "failure",
        }
    }
}

/// Gas price in gwei with two decimals, for logs
pub fn gas_price_to_gwei(gas_price: U256) -> f64 {
    let centi_gwei = gas_price.saturating_mul(U256::from(100)) / U256::from(GWEI);
    let centi_gwei = centi_gwei.min(U256::from(u128::MAX)).as_u128();
    centi_gwei as f64 / 100.0
}
