//! Error types for every stage of a rescue run

use ethers::types::{Address, U256};
use thiserror::Error;

/// Problems detected while loading or validating configuration.
///
/// All of these are raised before any network traffic happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required value: {0}")]
    Missing(&'static str),

    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid private key for {0}")]
    InvalidKey(&'static str),

    #[error("invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unknown engine selector: {0}")]
    UnknownEngine(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures talking to the execution node.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("contract call failed: {0}")]
    Contract(String),
}

/// Engine construction and transaction building failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sender {sender:?} does not own token {token_id} (owner is {owner:?})")]
    OwnershipMismatch {
        token_id: U256,
        owner: Address,
        sender: Address,
    },

    #[error("sender {0:?} holds no balance of the token")]
    NothingToTransfer(Address),

    #[error("no {0} configured")]
    Empty(&'static str),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Check-and-send payload encoding failures.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("at least one probe is required")]
    NoProbes,

    #[error("not a check-and-send call: {0}")]
    Decode(String),
}

/// Bundle composition and signing failures.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle needs at least one zero-gas transaction")]
    NoZeroGasTransactions,

    #[error("failed to sign TX #{index}: {reason}")]
    Signing { index: usize, reason: String },

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Relay transport and protocol failures.
///
/// None of these say anything about the bundle itself; they are retried at
/// the level of a single attempt.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay request failed: {0}")]
    Transport(String),

    #[error("relay returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed relay response: {0}")]
    Decode(String),

    #[error("no resolution for target block {0} before timeout")]
    ResolutionTimeout(u64),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Reasons a bundle simulation is not worth submitting.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("TX #{index} : {reason}")]
    Revert { index: usize, reason: String },

    #[error("bundle does not pay coinbase")]
    NoCoinbasePayment,

    #[error("bundle used no gas")]
    NoGasUsed,

    #[error("gas price too low: {effective} < {floor}")]
    BelowFeeFloor { effective: U256, floor: U256 },

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl SimulationError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SimulationError::Revert { .. } => "revert",
            SimulationError::NoCoinbasePayment => "no_coinbase_payment",
            SimulationError::NoGasUsed => "no_gas_used",
            SimulationError::BelowFeeFloor { .. } => "below_fee_floor",
            SimulationError::Relay(_) => "transport",
        }
    }
}

/// Terminal failures of the submission loop.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("initial simulation failed: {0}")]
    StartupSimulation(#[source] SimulationError),

    #[error("signer nonce too high for target block {target_block}, bailing")]
    SignerNonceTooHigh { target_block: u64 },

    #[error("block head stream ended before inclusion")]
    HeadStreamClosed,
}
