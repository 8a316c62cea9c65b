//! Sponsored-gas rescue CLI

use anyhow::Context;
use ethers::signers::Signer;
use rescue_core::chain::{new_heads, ChainState, RpcChain};
use rescue_core::submission::{Rescue, RescueOutcome};
use rescue_core::types::TransactionIntent;
use rescue_core::{BundleComposer, Config, Engine, FlashbotsRelay, SettlementVerifier, Simulator};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("failed to load configuration")?;
    rescue_core::init_tracing(&config.logging)?;
    rescue_core::init_metrics(&config.metrics)?;
    let settings = config.resolve().context("invalid configuration")?;

    let rpc = RpcChain::connect(&settings.rpc_url)?;
    let chain: Arc<dyn ChainState> = Arc::new(rpc);
    let chain_id = match settings.chain_id {
        Some(id) => id,
        None => chain.chain_id().await?,
    };

    let sender = settings.zero_gas_wallet.address();
    let donor = settings.donor_wallet.address();
    info!("Zero Gas Account: {:?}", sender);
    info!("Donor Account: {:?}", donor);
    info!("Recipient: {:?}", settings.recipient);
    info!("Miner Reward: {}", ethers::utils::format_ether(settings.miner_reward));
    info!("Chain ID: {}", chain_id);

    let verifier = SettlementVerifier::new(settings.check_and_send);
    let engine = Engine::build(
        &settings.engine,
        chain.as_ref(),
        sender,
        settings.recipient,
        verifier,
    )
    .await?;

    let zero_gas: Vec<TransactionIntent> = engine.zero_gas_transactions();
    let donor_tx = engine.donor_transaction(settings.miner_reward)?;

    let composer = BundleComposer::new(chain_id);
    let entries = composer.compose(
        zero_gas,
        donor_tx,
        &settings.zero_gas_wallet,
        &settings.donor_wallet,
    )?;
    let bundle = composer.sign(entries, chain.as_ref()).await?;
    bundle.log_transactions();

    let relay = Arc::new(FlashbotsRelay::new(
        settings.relay_url.clone(),
        settings.relay_signer.clone(),
        chain.clone(),
        settings.head_poll_interval,
        settings.resolution_timeout,
    )?);
    let rescue = Rescue {
        simulator: Simulator::new(relay.clone(), settings.gas_price_floor),
        relay,
        bundle,
        blocks_in_future: settings.blocks_in_future,
        dry_run: settings.dry_run,
    };
    let summary = engine.describe();
    let heads = new_heads(chain, settings.head_poll_interval);

    tokio::select! {
        result = rescue.launch(&summary, heads) => match result {
            Ok(RescueOutcome::DryRun(_)) => Ok(()),
            Ok(RescueOutcome::Included { target_block }) => {
                info!("Bundle included in block {}", target_block);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Rescue failed");
                Err(e.into())
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
