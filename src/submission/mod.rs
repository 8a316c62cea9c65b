//! Per-block submission loop
//!
//! Every new head re-simulates the signed bundle, targets
//! `head + blocks_in_future`, submits, and waits for that target's resolution
//! before the next head is looked at. Attempts never overlap; heads that
//! arrive during an attempt are skipped in favour of the latest one.

use crate::builder::SignedBundle;
use crate::error::SubmissionError;
use crate::relay::Relay;
use crate::simulator::{SimulationReport, Simulator};
use crate::types::{gas_price_to_gwei, Resolution};
use ethers::types::U256;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

/// Where the loop currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Simulating,
    Submitting,
    AwaitingResolution { target_block: u64 },
    Included { target_block: u64 },
    Aborted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Included { .. } | LoopState::Aborted)
    }
}

/// Result of handling one head
#[derive(Debug)]
pub enum Step {
    /// The bundle landed in `target_block`
    Included { target_block: u64 },
    /// Nothing terminal happened; wait for the next head
    Retry,
    /// Stale head, or the loop already finished
    Ignored,
    Fatal(SubmissionError),
}

/// How a rescue run ended without error
#[derive(Debug)]
pub enum RescueOutcome {
    /// Simulated once, nothing submitted
    DryRun(SimulationReport),
    Included { target_block: u64 },
}

/// One rescue run: a startup simulation gates the block loop.
pub struct Rescue<R: Relay> {
    pub relay: Arc<R>,
    pub simulator: Simulator<R>,
    pub bundle: SignedBundle,
    pub blocks_in_future: u64,
    pub dry_run: bool,
}

impl<R: Relay> Rescue<R> {
    /// Simulate once, then unless this is a dry run, submit on every head
    /// until inclusion. A failed startup simulation never reaches the loop.
    pub async fn launch<S>(self, summary: &str, heads: S) -> Result<RescueOutcome, SubmissionError>
    where
        S: Stream<Item = u64> + Unpin,
    {
        let report = self
            .simulator
            .simulate(&self.bundle)
            .await
            .map_err(SubmissionError::StartupSimulation)?;
        info!(
            "Simulation passed: gas used {}, gas price {} gwei",
            report.total_gas_used,
            gas_price_to_gwei(report.effective_gas_price)
        );
        info!("{}", summary);

        if self.dry_run {
            info!("Dry run, not submitting");
            return Ok(RescueOutcome::DryRun(report));
        }

        let mut submission_loop =
            SubmissionLoop::new(self.relay, self.simulator, self.bundle, self.blocks_in_future);
        let target_block = submission_loop.run(heads).await?;
        Ok(RescueOutcome::Included { target_block })
    }
}

/// Drives one signed bundle to inclusion
pub struct SubmissionLoop<R: Relay> {
    relay: Arc<R>,
    simulator: Simulator<R>,
    bundle: SignedBundle,
    blocks_in_future: u64,
    state: LoopState,
    last_height: Option<u64>,
    best_gas_price: Option<U256>,
    consecutive_failures: u64,
    submissions: u64,
}

impl<R: Relay> SubmissionLoop<R> {
    pub fn new(relay: Arc<R>, simulator: Simulator<R>, bundle: SignedBundle, blocks_in_future: u64) -> Self {
        Self {
            relay,
            simulator,
            bundle,
            blocks_in_future,
            state: LoopState::Idle,
            last_height: None,
            best_gas_price: None,
            consecutive_failures: 0,
            submissions: 0,
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    /// Highest effective gas price seen so far
    pub fn best_gas_price(&self) -> Option<U256> {
        self.best_gas_price
    }

    /// Consume heads until the bundle lands or the run must stop
    pub async fn run<S>(&mut self, mut heads: S) -> Result<u64, SubmissionError>
    where
        S: Stream<Item = u64> + Unpin,
    {
        while let Some(height) = heads.next().await {
            match self.on_block(height).await {
                Step::Included { target_block } => return Ok(target_block),
                Step::Fatal(e) => return Err(e),
                Step::Retry | Step::Ignored => {}
            }
        }
        Err(SubmissionError::HeadStreamClosed)
    }

    /// Run one attempt for a new head
    pub async fn on_block(&mut self, height: u64) -> Step {
        if self.state.is_terminal() {
            return Step::Ignored;
        }
        if self.last_height.map_or(false, |last| height <= last) {
            return Step::Ignored;
        }
        self.last_height = Some(height);

        self.state = LoopState::Simulating;
        let report = match self.simulator.simulate(&self.bundle).await {
            Ok(report) => report,
            Err(e) => {
                warn!(height, error = %e, "Skipping block");
                return self.fail();
            }
        };
        self.set_consecutive_failures(0);
        let gas_price = report.effective_gas_price;
        self.best_gas_price = Some(self.best_gas_price.map_or(gas_price, |best| best.max(gas_price)));

        let target_block = height + self.blocks_in_future;
        info!(
            best_gwei = self.best_gas_price.map(gas_price_to_gwei),
            "Current Block Number: {},   Target Block Number: {},   gasPrice: {} gwei",
            height,
            target_block,
            gas_price_to_gwei(gas_price)
        );

        self.state = LoopState::Submitting;
        let submission = match self.relay.send_bundle(&self.bundle, target_block).await {
            Ok(submission) => submission,
            Err(e) => {
                warn!(target_block, error = %e, "Bundle submission failed");
                metrics::counter!("rescue_submission_errors_total").increment(1);
                return self.fail();
            }
        };
        self.submissions += 1;
        metrics::counter!("rescue_bundle_submissions_total").increment(1);
        info!(target_block, bundle_hash = ?submission.bundle_hash, "Bundle submitted");

        self.state = LoopState::AwaitingResolution { target_block };
        let resolution = match self.relay.wait(&submission).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(target_block, error = %e, "No resolution for submission");
                return self.fail();
            }
        };
        metrics::counter!("rescue_resolutions_total", "resolution" => resolution.label()).increment(1);

        match resolution {
            Resolution::Included => {
                info!("Congrats, included in {}", target_block);
                self.state = LoopState::Included { target_block };
                Step::Included { target_block }
            }
            Resolution::NotIncludedInBlock => {
                info!("Not included in {}", target_block);
                self.retry()
            }
            Resolution::SignerNonceTooHigh => {
                warn!(target_block, "Nonce too high, bailing");
                self.state = LoopState::Aborted;
                Step::Fatal(SubmissionError::SignerNonceTooHigh { target_block })
            }
            Resolution::Failure(reason) => {
                warn!(target_block, %reason, "Relay did not accept bundle");
                self.retry()
            }
        }
    }

    /// Back to idle after an attempt that ran to a non-terminal resolution
    fn retry(&mut self) -> Step {
        self.state = LoopState::Idle;
        Step::Retry
    }

    /// Back to idle after an attempt that could not be simulated or delivered
    fn fail(&mut self) -> Step {
        self.set_consecutive_failures(self.consecutive_failures + 1);
        self.retry()
    }

    fn set_consecutive_failures(&mut self, count: u64) {
        self.consecutive_failures = count;
        metrics::gauge!("rescue_consecutive_failed_attempts").set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BundleComposer;
    use crate::chain::mock::MockChain;
    use crate::error::RelayError;
    use crate::relay::BundleSubmission;
    use crate::types::{ether, SimulationOutcome, TransactionIntent, TxSimulation};
    use async_trait::async_trait;
    use ethers::signers::LocalWallet;
    use ethers::types::Address;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Relay with scripted simulation outcomes and resolutions
    #[derive(Default)]
    struct ScriptedRelay {
        simulations: Mutex<VecDeque<Result<SimulationOutcome, RelayError>>>,
        resolutions: Mutex<VecDeque<Resolution>>,
        submitted: Mutex<Vec<u64>>,
    }

    impl ScriptedRelay {
        fn paying() -> SimulationOutcome {
            SimulationOutcome {
                per_transaction: vec![TxSimulation::succeeded(50_000), TxSimulation::succeeded(50_000)],
                coinbase_delta: ether() / 100,
            }
        }

        fn resolving(resolutions: &[Resolution]) -> Self {
            let relay = Self::default();
            *relay.resolutions.lock().unwrap() = resolutions.iter().cloned().collect();
            relay
        }

        fn submitted(&self) -> Vec<u64> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Relay for ScriptedRelay {
        async fn simulate(&self, _bundle: &SignedBundle) -> Result<SimulationOutcome, RelayError> {
            self.simulations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Self::paying()))
        }

        async fn send_bundle(
            &self,
            bundle: &SignedBundle,
            target_block: u64,
        ) -> Result<BundleSubmission, RelayError> {
            self.submitted.lock().unwrap().push(target_block);
            Ok(BundleSubmission::new(bundle, target_block))
        }

        async fn wait(&self, _submission: &BundleSubmission) -> Result<Resolution, RelayError> {
            Ok(self
                .resolutions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Resolution::NotIncludedInBlock))
        }
    }

    async fn bundle() -> SignedBundle {
        let zero_gas: LocalWallet = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap();
        let donor: LocalWallet = "8da4ef21b864d2cc526dbdb2a120bd2874c36c9d0a1fb7f8c63d7f7a8b41de8f"
            .parse()
            .unwrap();
        let composer = BundleComposer::new(1);
        let entries = composer
            .compose(
                vec![TransactionIntent::zero_gas(Address::repeat_byte(1), vec![1u8], 100_000)],
                TransactionIntent::zero_gas(Address::repeat_byte(2), vec![2u8], 400_000)
                    .with_value(ether() / 100),
                &zero_gas,
                &donor,
            )
            .unwrap();
        composer.sign(entries, &MockChain::new()).await.unwrap()
    }

    async fn submission_loop(relay: Arc<ScriptedRelay>) -> SubmissionLoop<ScriptedRelay> {
        let simulator = Simulator::new(relay.clone(), U256::from(1_000_000_000u64));
        SubmissionLoop::new(relay, simulator, bundle().await, 2)
    }

    #[tokio::test]
    async fn test_included_stops_submitting() {
        let relay = Arc::new(ScriptedRelay::resolving(&[Resolution::Included]));
        let mut submission_loop = submission_loop(relay.clone()).await;

        assert!(matches!(
            submission_loop.on_block(100).await,
            Step::Included { target_block: 102 }
        ));
        assert!(matches!(submission_loop.on_block(101).await, Step::Ignored));
        assert!(matches!(submission_loop.on_block(102).await, Step::Ignored));
        assert_eq!(relay.submitted(), vec![102]);
        assert_eq!(submission_loop.state(), &LoopState::Included { target_block: 102 });
    }

    #[tokio::test]
    async fn test_not_included_retries_next_block() {
        let relay = Arc::new(ScriptedRelay::resolving(&[
            Resolution::NotIncludedInBlock,
            Resolution::Included,
        ]));
        let mut submission_loop = submission_loop(relay.clone()).await;

        assert!(matches!(submission_loop.on_block(100).await, Step::Retry));
        assert_eq!(submission_loop.state(), &LoopState::Idle);
        assert!(matches!(
            submission_loop.on_block(101).await,
            Step::Included { target_block: 103 }
        ));
        assert_eq!(relay.submitted(), vec![102, 103]);
    }

    #[tokio::test]
    async fn test_nonce_too_high_is_fatal() {
        let relay = Arc::new(ScriptedRelay::resolving(&[Resolution::SignerNonceTooHigh]));
        let mut submission_loop = submission_loop(relay.clone()).await;

        let result = submission_loop
            .run(futures::stream::iter(vec![100, 101, 102]))
            .await;
        assert!(matches!(
            result,
            Err(SubmissionError::SignerNonceTooHigh { target_block: 102 })
        ));
        assert_eq!(relay.submitted(), vec![102]);
        assert_eq!(submission_loop.state(), &LoopState::Aborted);
    }

    #[tokio::test]
    async fn test_failed_simulation_skips_block() {
        let relay = Arc::new(ScriptedRelay::resolving(&[Resolution::Included]));
        relay.simulations.lock().unwrap().push_back(Ok(SimulationOutcome {
            per_transaction: vec![
                TxSimulation::succeeded(50_000),
                TxSimulation::reverted("execution reverted", None),
            ],
            coinbase_delta: U256::zero(),
        }));
        relay
            .simulations
            .lock()
            .unwrap()
            .push_back(Err(RelayError::Transport("connection refused".to_string())));
        let mut submission_loop = submission_loop(relay.clone()).await;

        assert!(matches!(submission_loop.on_block(100).await, Step::Retry));
        assert!(matches!(submission_loop.on_block(101).await, Step::Retry));
        assert_eq!(submission_loop.consecutive_failures(), 2);
        assert!(relay.submitted().is_empty());

        assert!(matches!(
            submission_loop.on_block(102).await,
            Step::Included { target_block: 104 }
        ));
        assert_eq!(relay.submitted(), vec![104]);
        assert_eq!(submission_loop.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_below_floor_skips_block() {
        let relay = Arc::new(ScriptedRelay::default());
        // 1000 wei over 100k gas prices at zero
        relay.simulations.lock().unwrap().push_back(Ok(SimulationOutcome {
            per_transaction: vec![TxSimulation::succeeded(50_000), TxSimulation::succeeded(50_000)],
            coinbase_delta: U256::from(1000),
        }));
        let mut submission_loop = submission_loop(relay.clone()).await;

        assert!(matches!(submission_loop.on_block(100).await, Step::Retry));
        assert!(relay.submitted().is_empty());
        assert_eq!(submission_loop.consecutive_failures(), 1);
        assert_eq!(submission_loop.best_gas_price(), None);

        assert!(matches!(submission_loop.on_block(101).await, Step::Retry));
        assert_eq!(relay.submitted(), vec![103]);
    }

    #[tokio::test]
    async fn test_non_inclusion_is_not_a_failure() {
        let relay = Arc::new(ScriptedRelay::default());
        relay
            .simulations
            .lock()
            .unwrap()
            .push_back(Err(RelayError::Transport("connection refused".to_string())));
        let mut submission_loop = submission_loop(relay.clone()).await;

        assert!(matches!(submission_loop.on_block(100).await, Step::Retry));
        assert_eq!(submission_loop.consecutive_failures(), 1);

        for height in 101..=103 {
            assert!(matches!(submission_loop.on_block(height).await, Step::Retry));
            assert_eq!(submission_loop.consecutive_failures(), 0);
        }
        assert_eq!(relay.submitted(), vec![103, 104, 105]);
    }

    #[tokio::test]
    async fn test_stale_heads_ignored() {
        let relay = Arc::new(ScriptedRelay::default());
        let mut submission_loop = submission_loop(relay.clone()).await;

        assert!(matches!(submission_loop.on_block(100).await, Step::Retry));
        assert!(matches!(submission_loop.on_block(100).await, Step::Ignored));
        assert!(matches!(submission_loop.on_block(99).await, Step::Ignored));
        assert_eq!(relay.submitted(), vec![102]);
    }

    #[tokio::test]
    async fn test_relay_failure_is_retried() {
        let relay = Arc::new(ScriptedRelay::resolving(&[
            Resolution::Failure("bundle rejected".to_string()),
            Resolution::Included,
        ]));
        let mut submission_loop = submission_loop(relay.clone()).await;

        let included = submission_loop
            .run(futures::stream::iter(vec![7, 8]))
            .await
            .unwrap();
        assert_eq!(included, 10);
        assert_eq!(submission_loop.submissions(), 2);
    }

    #[tokio::test]
    async fn test_stream_end_without_inclusion() {
        let relay = Arc::new(ScriptedRelay::default());
        let mut submission_loop = submission_loop(relay).await;

        let result = submission_loop.run(futures::stream::iter(vec![1, 2])).await;
        assert!(matches!(result, Err(SubmissionError::HeadStreamClosed)));
        assert_eq!(submission_loop.best_gas_price(), Some(U256::from(100_000_000_000u64)));
    }
}
