//! Balance burner for the compromised account
//!
//! Anything that lands on the zero-gas account is spent on gas by a
//! self-transfer priced to consume the whole balance, so a sweeper watching
//! the account has nothing to take.

use crate::chain::{new_heads, ChainState};
use crate::error::ChainError;
use crate::types::{gas_price_to_gwei, GWEI};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{TransactionRequest, U256},
    utils::format_ether,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Gas of a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// What to do with the current balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurnPlan {
    Empty,
    TooLow { gas_price: U256 },
    Burn { gas_price: U256 },
}

/// Price a 21000-gas self-transfer so that it consumes `balance`.
pub fn burn_plan(balance: U256) -> BurnPlan {
    if balance.is_zero() {
        return BurnPlan::Empty;
    }
    let gas_price = (balance / U256::from(TRANSFER_GAS)).saturating_sub(U256::one());
    if gas_price < U256::from(GWEI) {
        BurnPlan::TooLow { gas_price }
    } else {
        BurnPlan::Burn { gas_price }
    }
}

pub struct Burner {
    chain: Arc<dyn ChainState>,
    client: SignerMiddleware<Arc<Provider<Http>>, LocalWallet>,
}

impl Burner {
    pub fn new(chain: Arc<dyn ChainState>, provider: Arc<Provider<Http>>, wallet: LocalWallet) -> Self {
        Self {
            chain,
            client: SignerMiddleware::new(provider, wallet),
        }
    }

    /// Burn on every new head until the head stream ends
    pub async fn run(&self, poll_interval: Duration) {
        info!(account = ?self.client.address(), "Burner watching account");
        let mut heads = new_heads(self.chain.clone(), poll_interval);
        while let Some(height) = heads.next().await {
            if let Err(e) = self.burn(height).await {
                warn!(height, error = %e, "Burn failed");
            }
        }
    }

    async fn burn(&self, height: u64) -> Result<(), ChainError> {
        let account = self.client.address();
        let balance = self.chain.balance(account).await?;

        let gas_price = match burn_plan(balance) {
            BurnPlan::Empty => {
                info!(height, "Balance is zero");
                return Ok(());
            }
            BurnPlan::TooLow { gas_price } => {
                info!(
                    height,
                    balance = %format_ether(balance),
                    gwei = gas_price_to_gwei(gas_price),
                    "Balance too low to burn"
                );
                return Ok(());
            }
            BurnPlan::Burn { gas_price } => gas_price,
        };

        info!(height, "Burning {} ETH", format_ether(balance));
        let tx = TransactionRequest::new()
            .to(account)
            .gas(TRANSFER_GAS)
            .gas_price(gas_price);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        info!(
            tx = ?pending.tx_hash(),
            gwei = gas_price_to_gwei(gas_price),
            "Sent burn transaction"
        );
        Ok(())
    }
}
