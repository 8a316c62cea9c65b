//! Burns any ether that reaches the compromised account

use anyhow::Context;
use ethers::signers::Signer;
use rescue_core::burner::Burner;
use rescue_core::chain::{ChainState, RpcChain};
use rescue_core::Config;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("failed to load configuration")?;
    rescue_core::init_tracing(&config.logging)?;
    let settings = config.resolve_burner().context("invalid configuration")?;

    let rpc = RpcChain::connect(&settings.rpc_url)?;
    let provider = rpc.provider();
    let chain: Arc<dyn ChainState> = Arc::new(rpc);
    let chain_id = chain.chain_id().await?;

    let wallet = settings.zero_gas_wallet.with_chain_id(chain_id);
    let burner = Burner::new(chain, provider, wallet);

    tokio::select! {
        _ = burner.run(settings.head_poll_interval) => {}
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }
    Ok(())
}
