//! Read-only chain access and the new-head stream

use crate::engine::erc20::Erc20Token;
use crate::engine::erc721::Erc721Token;
use crate::error::ChainError;
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{Address, BlockId, BlockNumber, H256, U256},
};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Chain queries the rescue flow depends on
#[async_trait]
pub trait ChainState: Send + Sync {
    async fn block_number(&self) -> Result<u64, ChainError>;

    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Transaction count of `account`, at `block` or latest
    async fn nonce(&self, account: Address, block: Option<u64>) -> Result<U256, ChainError>;

    async fn balance(&self, account: Address) -> Result<U256, ChainError>;

    /// ERC-20 `balanceOf`
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    /// ERC-721 `ownerOf`
    async fn token_owner(&self, token: Address, token_id: U256) -> Result<Address, ChainError>;

    /// Hashes of the transactions in block `number`, `None` while it does not exist yet
    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<H256>>, ChainError>;
}

/// JSON-RPC backed chain state
#[derive(Debug, Clone)]
pub struct RpcChain {
    provider: Arc<Provider<Http>>,
}

impl RpcChain {
    pub fn new(provider: Arc<Provider<Http>>) -> Self {
        Self { provider }
    }

    pub fn connect(url: &str) -> Result<Self, ChainError> {
        let provider =
            Provider::<Http>::try_from(url).map_err(|e| ChainError::Provider(e.to_string()))?;
        Ok(Self::new(Arc::new(provider)))
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }
}

#[async_trait]
impl ChainState for RpcChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        Ok(number.as_u64())
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        Ok(id.as_u64())
    }

    async fn nonce(&self, account: Address, block: Option<u64>) -> Result<U256, ChainError> {
        let block = block.map(|n| BlockId::Number(BlockNumber::Number(n.into())));
        self.provider
            .get_transaction_count(account, block)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))
    }

    async fn balance(&self, account: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(account, None)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        Erc20Token::new(token, self.provider.clone())
            .balance_of(owner)
            .call()
            .await
            .map_err(|e| ChainError::Contract(e.to_string()))
    }

    async fn token_owner(&self, token: Address, token_id: U256) -> Result<Address, ChainError> {
        Erc721Token::new(token, self.provider.clone())
            .owner_of(token_id)
            .call()
            .await
            .map_err(|e| ChainError::Contract(e.to_string()))
    }

    async fn block_transactions(&self, number: u64) -> Result<Option<Vec<H256>>, ChainError> {
        let block = self
            .provider
            .get_block(number)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        Ok(block.map(|b| b.transactions))
    }
}

/// Stream of new chain heads, polled every `interval`.
///
/// Heights are strictly increasing. Heads produced while the consumer is busy
/// collapse into the latest one on its next poll.
pub fn new_heads(chain: Arc<dyn ChainState>, interval: Duration) -> BoxStream<'static, u64> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    stream::unfold((chain, ticker, None::<u64>), |(chain, mut ticker, last)| async move {
        loop {
            ticker.tick().await;
            match chain.block_number().await {
                Ok(height) if last.map_or(true, |l| height > l) => {
                    debug!(height, "New head");
                    return Some((height, (chain, ticker, Some(height))));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to poll block number"),
            }
        }
    })
    .boxed()
}
