//! Flashbots-style relay over authenticated JSON-RPC

use super::{resolve_inclusion, BundleSubmission, Relay};
use crate::builder::SignedBundle;
use crate::chain::ChainState;
use crate::error::RelayError;
use crate::types::{Resolution, SimulationOutcome, TxSimulation};
use async_trait::async_trait;
use ethers::{
    signers::{LocalWallet, Signer},
    types::{Bytes, H256, U256, U64},
    utils::keccak256,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SIGNATURE_HEADER: &str = "X-Flashbots-Signature";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallBundleParams {
    txs: Vec<Bytes>,
    block_number: U64,
    state_block_number: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallBundleResult {
    results: Vec<CallBundleTx>,
    coinbase_diff: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallBundleTx {
    #[serde(default)]
    gas_used: u64,
    error: Option<String>,
    revert: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBundleParams {
    txs: Vec<Bytes>,
    block_number: U64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendBundleResult {
    bundle_hash: Option<H256>,
}

/// Relay client. Requests are signed by a relay identity key that holds no funds.
pub struct FlashbotsRelay {
    client: reqwest::Client,
    url: String,
    auth: LocalWallet,
    chain: Arc<dyn ChainState>,
    poll_interval: Duration,
    resolution_timeout: Duration,
    request_id: AtomicU64,
}

impl FlashbotsRelay {
    pub fn new(
        url: impl Into<String>,
        auth: LocalWallet,
        chain: Arc<dyn ChainState>,
        poll_interval: Duration,
        resolution_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let url = url.into();
        info!(relay = %url, identity = ?auth.address(), "Relay client ready");

        Ok(Self {
            client,
            url,
            auth,
            chain,
            poll_interval,
            resolution_timeout,
            request_id: AtomicU64::new(1),
        })
    }

    /// `<identity>:<signature over the hex keccak256 of the body>`
    async fn auth_header(&self, body: &str) -> Result<String, RelayError> {
        let digest = format!("0x{}", hex::encode(keccak256(body.as_bytes())));
        let signature = self
            .auth
            .sign_message(digest)
            .await
            .map_err(|e| RelayError::Transport(format!("failed to sign request: {}", e)))?;
        Ok(format!("{:?}:0x{}", self.auth.address(), signature))
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RelayError>
    where
        P: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let body = serde_json::to_string(&request).map_err(|e| RelayError::Decode(e.to_string()))?;
        let header = self.auth_header(&body).await?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, header)
            .body(body)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        debug!(method, %status, "Relay responded");

        parse_response(&text)
    }
}

fn parse_response<R: DeserializeOwned>(text: &str) -> Result<R, RelayError> {
    let response: JsonRpcResponse<R> = serde_json::from_str(text)
        .map_err(|e| RelayError::Decode(format!("{}: {}", e, text)))?;
    match (response.result, response.error) {
        (_, Some(error)) => Err(RelayError::Rpc {
            code: error.code,
            message: error.message,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Err(RelayError::Decode("response has neither result nor error".to_string())),
    }
}

fn to_outcome(result: CallBundleResult) -> Result<SimulationOutcome, RelayError> {
    let coinbase_delta = U256::from_dec_str(&result.coinbase_diff)
        .map_err(|e| RelayError::Decode(format!("coinbaseDiff {}: {}", result.coinbase_diff, e)))?;

    let per_transaction = result
        .results
        .into_iter()
        .map(|tx| TxSimulation {
            gas_used: tx.gas_used,
            error: tx.error,
            revert: tx.revert,
        })
        .collect();

    Ok(SimulationOutcome {
        per_transaction,
        coinbase_delta,
    })
}

#[async_trait]
impl Relay for FlashbotsRelay {
    async fn simulate(&self, bundle: &SignedBundle) -> Result<SimulationOutcome, RelayError> {
        let head = self.chain.block_number().await?;
        let params = CallBundleParams {
            txs: bundle.raw_transactions(),
            block_number: U64::from(head + 1),
            state_block_number: "latest",
        };
        let result: CallBundleResult = self.call("eth_callBundle", [params]).await?;
        to_outcome(result)
    }

    async fn send_bundle(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> Result<BundleSubmission, RelayError> {
        let params = SendBundleParams {
            txs: bundle.raw_transactions(),
            block_number: U64::from(target_block),
        };
        let mut submission = BundleSubmission::new(bundle, target_block);

        match self
            .call::<_, SendBundleResult>("eth_sendBundle", [params])
            .await
        {
            Ok(result) => submission.bundle_hash = result.bundle_hash,
            Err(RelayError::Rpc { code, message }) => {
                warn!(code, %message, target_block, "Relay rejected bundle");
                submission.rejection = Some(message);
            }
            Err(e) => return Err(e),
        }
        Ok(submission)
    }

    async fn wait(&self, submission: &BundleSubmission) -> Result<Resolution, RelayError> {
        resolve_inclusion(
            self.chain.as_ref(),
            submission,
            self.poll_interval,
            self.resolution_timeout,
        )
        .await
    }
}
