//! Bundle composition and signing

use crate::chain::ChainState;
use crate::error::BundleError;
use crate::types::TransactionIntent;
use ethers::{
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, H256, U256},
    utils::keccak256,
};
use std::collections::HashMap;
use tracing::{debug, info};

/// Intent annotated with the wallet that must sign it
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub intent: TransactionIntent,
    pub signer: LocalWallet,
}

/// Signed transaction inside a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEntry {
    pub intent: TransactionIntent,
    pub signer: Address,
    pub nonce: U256,
    pub hash: H256,
    pub raw: Bytes,
}

/// Ordered, signed bundle. Built once per run and never reordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBundle {
    entries: Vec<SignedEntry>,
}

impl SignedBundle {
    pub fn entries(&self) -> &[SignedEntry] {
        &self.entries
    }

    pub fn raw_transactions(&self) -> Vec<Bytes> {
        self.entries.iter().map(|e| e.raw.clone()).collect()
    }

    pub fn hashes(&self) -> Vec<H256> {
        self.entries.iter().map(|e| e.hash).collect()
    }

    /// Audit log of every entry and its signed form
    pub fn log_transactions(&self) {
        info!("--------------------------------");
        for (index, entry) in self.entries.iter().enumerate() {
            info!(
                "TX #{}: {:?} => {:?} : {}",
                index, entry.signer, entry.intent.target, entry.intent.data
            );
        }
        info!("--------------------------------");
        for (index, entry) in self.entries.iter().enumerate() {
            info!("TX #{}: {}", index, entry.raw);
        }
        info!("--------------------------------");
    }
}

/// Orders engine output into a bundle and signs it
#[derive(Debug, Clone, Copy)]
pub struct BundleComposer {
    chain_id: u64,
}

impl BundleComposer {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    /// Zero-gas transactions first, in engine order, signed by the asset
    /// holder; the donor transaction last, signed by the donor.
    pub fn compose(
        &self,
        zero_gas: Vec<TransactionIntent>,
        donor: TransactionIntent,
        zero_gas_signer: &LocalWallet,
        donor_signer: &LocalWallet,
    ) -> Result<Vec<BundleEntry>, BundleError> {
        if zero_gas.is_empty() {
            return Err(BundleError::NoZeroGasTransactions);
        }

        let mut entries: Vec<BundleEntry> = zero_gas
            .into_iter()
            .map(|intent| BundleEntry {
                intent,
                signer: zero_gas_signer.clone(),
            })
            .collect();
        entries.push(BundleEntry {
            intent: donor,
            signer: donor_signer.clone(),
        });
        Ok(entries)
    }

    /// Sign composed entries as legacy transactions.
    ///
    /// Each signer starts at its current on-chain nonce and advances by one per
    /// further entry it signs.
    pub async fn sign(
        &self,
        entries: Vec<BundleEntry>,
        chain: &dyn ChainState,
    ) -> Result<SignedBundle, BundleError> {
        let mut next_nonce: HashMap<Address, U256> = HashMap::new();
        let mut signed = Vec::with_capacity(entries.len());

        for (index, entry) in entries.into_iter().enumerate() {
            let from = entry.signer.address();
            let cached = next_nonce.get(&from).copied();
            let nonce = match cached {
                Some(nonce) => nonce,
                None => chain.nonce(from, None).await?,
            };
            next_nonce.insert(from, nonce + 1);

            let tx: TypedTransaction = TransactionRequest::new()
                .from(from)
                .to(entry.intent.target)
                .data(entry.intent.data.clone())
                .value(entry.intent.value)
                .gas(entry.intent.gas_limit)
                .gas_price(entry.intent.gas_price)
                .nonce(nonce)
                .chain_id(self.chain_id)
                .into();

            let wallet = entry.signer.with_chain_id(self.chain_id);
            let signature = wallet
                .sign_transaction_sync(&tx)
                .map_err(|e| BundleError::Signing {
                    index,
                    reason: e.to_string(),
                })?;
            let raw = tx.rlp_signed(&signature);
            let hash = H256::from(keccak256(&raw));
            debug!(index, ?from, %nonce, ?hash, "Signed bundle transaction");

            signed.push(SignedEntry {
                intent: entry.intent,
                signer: from,
                nonce,
                hash,
                raw,
            });
        }

        Ok(SignedBundle { entries: signed })
    }
}
