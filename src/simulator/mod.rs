//! Bundle simulation and pricing
//!
//! There is no gas auction for zero-priced transactions, so the only price
//! signal is what the bundle pays the block producer. The effective gas price
//! treats that coinbase payment as if it were priority fee spread over the
//! bundle's gas; it is a comparison value for deciding whether a bundle is
//! worth submitting, not a protocol-level fee.

use crate::builder::SignedBundle;
use crate::error::SimulationError;
use crate::relay::Relay;
use crate::types::{gas_price_to_gwei, SimulationOutcome};
use ethers::types::U256;
use std::sync::Arc;
use tracing::{debug, warn};

/// Priced simulation of a bundle that is worth submitting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub outcome: SimulationOutcome,
    pub total_gas_used: U256,
    pub effective_gas_price: U256,
}

/// Relay-backed bundle simulator with a fee floor
pub struct Simulator<R: Relay> {
    relay: Arc<R>,
    fee_floor: U256,
}

impl<R: Relay> Simulator<R> {
    pub fn new(relay: Arc<R>, fee_floor: U256) -> Self {
        Self { relay, fee_floor }
    }

    /// Dry-run the bundle and price it
    pub async fn simulate(&self, bundle: &SignedBundle) -> Result<SimulationReport, SimulationError> {
        metrics::counter!("rescue_simulations_total").increment(1);

        let result = match self.relay.simulate(bundle).await {
            Ok(outcome) => evaluate(outcome, self.fee_floor),
            Err(e) => Err(SimulationError::from(e)),
        };

        match &result {
            Ok(report) => {
                debug!(
                    gas_used = %report.total_gas_used,
                    gwei = gas_price_to_gwei(report.effective_gas_price),
                    "Simulation passed"
                );
                metrics::gauge!("rescue_effective_gas_price_gwei")
                    .set(gas_price_to_gwei(report.effective_gas_price));
            }
            Err(e) => {
                warn!(error = %e, "Simulation failed");
                metrics::counter!("rescue_simulation_failures_total", "reason" => e.kind())
                    .increment(1);
            }
        }
        result
    }
}

/// Validate an outcome and compute `coinbase_delta / total_gas_used`.
pub fn evaluate(outcome: SimulationOutcome, fee_floor: U256) -> Result<SimulationReport, SimulationError> {
    for (index, tx) in outcome.per_transaction.iter().enumerate() {
        if let Some(reason) = tx.failure() {
            return Err(SimulationError::Revert { index, reason });
        }
    }

    if outcome.coinbase_delta.is_zero() {
        return Err(SimulationError::NoCoinbasePayment);
    }

    let total_gas_used = outcome.total_gas_used();
    if total_gas_used.is_zero() {
        return Err(SimulationError::NoGasUsed);
    }

    let effective_gas_price = outcome.coinbase_delta / total_gas_used;
    if effective_gas_price < fee_floor {
        return Err(SimulationError::BelowFeeFloor {
            effective: effective_gas_price,
            floor: fee_floor,
        });
    }

    Ok(SimulationReport {
        outcome,
        total_gas_used,
        effective_gas_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ether, TxSimulation, GWEI};

    fn outcome(gas: &[u64], coinbase_delta: U256) -> SimulationOutcome {
        SimulationOutcome {
            per_transaction: gas.iter().map(|&g| TxSimulation::succeeded(g)).collect(),
            coinbase_delta,
        }
    }

    #[test]
    fn test_revert_identifies_index() {
        let mut sim = outcome(&[50_000, 40_000, 30_000], ether());
        sim.per_transaction[2] = TxSimulation::reverted("execution reverted", None);

        match evaluate(sim, U256::zero()) {
            Err(SimulationError::Revert { index, reason }) => {
                assert_eq!(index, 2);
                assert_eq!(reason, "execution reverted");
            }
            other => panic!("expected revert, got {:?}", other),
        }
    }

    #[test]
    fn test_first_revert_wins() {
        let mut sim = outcome(&[1, 1, 1], ether());
        sim.per_transaction[1] = TxSimulation::reverted("a", None);
        sim.per_transaction[2] = TxSimulation::reverted("b", None);
        assert!(matches!(
            evaluate(sim, U256::zero()),
            Err(SimulationError::Revert { index: 1, .. })
        ));
    }

    #[test]
    fn test_zero_coinbase_payment() {
        assert!(matches!(
            evaluate(outcome(&[21_000], U256::zero()), U256::zero()),
            Err(SimulationError::NoCoinbasePayment)
        ));
    }

    #[test]
    fn test_no_gas_used() {
        assert!(matches!(
            evaluate(outcome(&[], ether()), U256::zero()),
            Err(SimulationError::NoGasUsed)
        ));
    }

    #[test]
    fn test_below_floor() {
        // 0.001 ether over 100k gas = 10 gwei
        let sim = outcome(&[60_000, 40_000], ether() / 1000);
        let floor = U256::from(30 * GWEI);
        match evaluate(sim, floor) {
            Err(SimulationError::BelowFeeFloor { effective, floor: f }) => {
                assert_eq!(effective, U256::from(10 * GWEI));
                assert_eq!(f, floor);
            }
            other => panic!("expected below floor, got {:?}", other),
        }
    }

    #[test]
    fn test_effective_gas_price_integer_division() {
        let sim = outcome(&[21_000, 45_123], U256::from(12_000_000_000_000_000u64));
        let report = evaluate(sim, U256::from(GWEI)).unwrap();
        assert_eq!(report.total_gas_used, U256::from(66_123));
        assert_eq!(
            report.effective_gas_price,
            U256::from(12_000_000_000_000_000u64 / 66_123)
        );
    }

    #[test]
    fn test_exactly_at_floor_passes() {
        let sim = outcome(&[100_000], U256::from(100_000 * 30 * GWEI));
        let report = evaluate(sim, U256::from(30 * GWEI)).unwrap();
        assert_eq!(report.effective_gas_price, U256::from(30 * GWEI));
    }
}
