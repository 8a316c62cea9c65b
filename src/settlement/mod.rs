//! Check-and-send payload encoding
//!
//! The verifier contract performs every probe as a read-only call and only
//! forwards `msg.value` to the block producer when each result matches
//! exactly; otherwise the whole call reverts. Sitting last in the bundle, a
//! revert there makes the relay drop the bundle, so the donor only pays when
//! the transfers before it left the expected post-state.

use crate::error::SettlementError;
use crate::types::{ProbeTriple, TransactionIntent};
use ethers::{
    abi::{AbiDecode, AbiEncode},
    contract::abigen,
    types::{Address, Bytes, U256},
};

/// Check-and-send contract interface
abigen!(
    CheckAndSend,
    r#"[
        function check32BytesAndSend(address target, bytes payload, bytes32 resultMatch) external payable
        function check32BytesAndSendMulti(address[] targets, bytes[] payloads, bytes32[] resultMatches) external payable
        function checkBytesAndSend(address target, bytes payload, bytes resultMatch) external payable
        function checkBytesAndSendMulti(address[] targets, bytes[] payloads, bytes[] resultMatches) external payable
    ]"#
);

/// Gas limit for the donor transaction
pub const DONOR_GAS_LIMIT: u64 = 400_000;

/// Encodes conditional payments against one deployed check-and-send contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementVerifier {
    address: Address,
}

impl SettlementVerifier {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Encode the verifier call for a set of probes.
    ///
    /// The fixed-width entry points are used when every expected result is
    /// exactly one word, the single-probe forms when there is one probe.
    pub fn encode(&self, probes: &[ProbeTriple]) -> Result<Bytes, SettlementError> {
        let encoded = match probes {
            [] => return Err(SettlementError::NoProbes),
            [probe] if probe.is_word() => Check32BytesAndSendCall {
                target: probe.target,
                payload: probe.probe_call_data.clone(),
                result_match: to_word(&probe.expected_result),
            }
            .encode(),
            [probe] => CheckBytesAndSendCall {
                target: probe.target,
                payload: probe.probe_call_data.clone(),
                result_match: probe.expected_result.clone(),
            }
            .encode(),
            _ if probes.iter().all(ProbeTriple::is_word) => Check32BytesAndSendMultiCall {
                targets: probes.iter().map(|p| p.target).collect(),
                payloads: probes.iter().map(|p| p.probe_call_data.clone()).collect(),
                result_matches: probes.iter().map(|p| to_word(&p.expected_result)).collect(),
            }
            .encode(),
            _ => CheckBytesAndSendMultiCall {
                targets: probes.iter().map(|p| p.target).collect(),
                payloads: probes.iter().map(|p| p.probe_call_data.clone()).collect(),
                result_matches: probes.iter().map(|p| p.expected_result.clone()).collect(),
            }
            .encode(),
        };
        Ok(encoded.into())
    }

    /// Zero-priced donor transaction paying `reward` through the verifier
    pub fn donor_transaction(
        &self,
        probes: &[ProbeTriple],
        reward: U256,
    ) -> Result<TransactionIntent, SettlementError> {
        let data = self.encode(probes)?;
        Ok(TransactionIntent::zero_gas(self.address, data, DONOR_GAS_LIMIT).with_value(reward))
    }

    /// Recover the probes from verifier calldata
    pub fn decode(data: &[u8]) -> Result<Vec<ProbeTriple>, SettlementError> {
        let call = CheckAndSendCalls::decode(data)
            .map_err(|e| SettlementError::Decode(e.to_string()))?;

        let probes = match call {
            CheckAndSendCalls::Check32BytesAndSend(c) => {
                vec![ProbeTriple::new(c.target, c.payload, c.result_match.to_vec())]
            }
            CheckAndSendCalls::CheckBytesAndSend(c) => {
                vec![ProbeTriple::new(c.target, c.payload, c.result_match)]
            }
            CheckAndSendCalls::Check32BytesAndSendMulti(c) => c
                .targets
                .into_iter()
                .zip(c.payloads)
                .zip(c.result_matches)
                .map(|((target, payload), result)| ProbeTriple::new(target, payload, result.to_vec()))
                .collect(),
            CheckAndSendCalls::CheckBytesAndSendMulti(c) => c
                .targets
                .into_iter()
                .zip(c.payloads)
                .zip(c.result_matches)
                .map(|((target, payload), result)| ProbeTriple::new(target, payload, result))
                .collect(),
        };
        Ok(probes)
    }
}

fn to_word(bytes: &Bytes) -> [u8; 32] {
    let mut word = [0u8; 32];
    word.copy_from_slice(&bytes[..32]);
    word
}
