//! Signing-oracle client and wire types
//!
//! The oracle is a remote quorum: it receives the prepared materials plus
//! the predicates' raw inputs, evaluates the decision logic independently
//! on every member, and returns zero, one or two signature shares. Its
//! internal consensus is opaque here. The evaluator build it runs is
//! referenced by an opaque content identifier.

pub mod evaluator;

use crate::chain::btc::Utxo;
use crate::error::{SwapError, SwapResult};
use crate::tx::evm::UnsignedTransfer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw signature share: 32-byte big-endian scalars as hex plus the
/// recovery id and the public key of the threshold key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureShare {
    pub r: String,
    pub s: String,
    pub recid: u8,
    pub public_key: String,
}

/// The partial signature set returned by one evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialSignatureSet {
    pub btc: Option<SignatureShare>,
    pub evm: Option<SignatureShare>,
}

/// Which signatures came back; settlement dispatches exhaustively on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePresence {
    Neither,
    BtcOnly,
    EvmOnly,
    Both,
}

impl PartialSignatureSet {
    pub fn presence(&self) -> SignaturePresence {
        match (&self.btc, &self.evm) {
            (None, None) => SignaturePresence::Neither,
            (Some(_), None) => SignaturePresence::BtcOnly,
            (None, Some(_)) => SignaturePresence::EvmOnly,
            (Some(_), Some(_)) => SignaturePresence::Both,
        }
    }
}

/// Echoed payload describing which candidates the shares apply to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleResponse {
    /// Condition report the quorum evaluated; absent in degraded mode
    pub conditions: Option<evaluator::ConditionReport>,
    /// Raw hex of the UTXO-chain success candidate, when signed
    pub btc_transaction: Option<String>,
    /// Raw hex of the UTXO-chain clawback candidate, when signed
    pub btc_clawback_transaction: Option<String>,
    /// Account-chain success candidate, when signed
    pub evm_transaction: Option<UnsignedTransfer>,
    /// Account-chain clawback candidate, when signed
    pub evm_clawback_transaction: Option<UnsignedTransfer>,
    /// "conditions not met" and friends
    pub error: Option<String>,
}

/// Result of one remote evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub signatures: PartialSignatureSet,
    pub response: OracleResponse,
}

/// Parameter record for one evaluation.
///
/// Everything the original system injected by templating the evaluator's
/// source, or left as ambient globals of the execution context, travels
/// here as named fields instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationParams {
    /// Uncompressed SEC public key of the threshold key, hex
    pub public_key: String,
    /// Account-chain address derived from `public_key`
    pub signer_evm_address: String,
    /// UTXO-chain funding address derived from `public_key`
    pub signer_btc_address: Option<String>,
    /// Explorer base URL; absent switches the evaluator to degraded mode
    pub btc_endpoint: Option<String>,
    /// Reference UTXO pinned at preparation time
    pub pinned_utxo: Option<Utxo>,
    /// Raw predicate inputs fixed at swap creation
    pub conditions: evaluator::SwapConditions,
    pub btc_success_digest: Option<String>,
    pub btc_clawback_digest: Option<String>,
    pub btc_success_tx: Option<String>,
    pub btc_clawback_tx: Option<String>,
    pub evm_success_tx: Option<UnsignedTransfer>,
    pub evm_clawback_tx: UnsignedTransfer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Content identifier of the published evaluator build; opaque handle
    pub evaluator_cid: String,
    pub params: EvaluationParams,
}

/// Client side of the signing oracle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// Submit materials for one evaluation and collect the partial
    /// signature set the quorum decided to produce.
    async fn evaluate(&self, request: &EvaluationRequest) -> SwapResult<EvaluationOutcome>;
}

/// HTTP client for the quorum's evaluation endpoint.
pub struct QuorumOracleClient {
    client: reqwest::Client,
    endpoint: String,
}

impl QuorumOracleClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl SigningOracle for QuorumOracleClient {
    async fn evaluate(&self, request: &EvaluationRequest) -> SwapResult<EvaluationOutcome> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| SwapError::transport(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::Oracle(format!(
                "evaluation rejected ({status}): {body}"
            )));
        }

        response
            .json::<EvaluationOutcome>()
            .await
            .map_err(|e| SwapError::Oracle(format!("malformed evaluation result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_share() -> SignatureShare {
        SignatureShare {
            r: "11".repeat(32),
            s: "22".repeat(32),
            recid: 0,
            public_key: "03".to_string(),
        }
    }

    #[test]
    fn test_presence_four_way() {
        let mut set = PartialSignatureSet::default();
        assert_eq!(set.presence(), SignaturePresence::Neither);

        set.btc = Some(dummy_share());
        assert_eq!(set.presence(), SignaturePresence::BtcOnly);

        set.evm = Some(dummy_share());
        assert_eq!(set.presence(), SignaturePresence::Both);

        set.btc = None;
        assert_eq!(set.presence(), SignaturePresence::EvmOnly);
    }

    #[test]
    fn test_outcome_wire_shape_round_trip() {
        let outcome = EvaluationOutcome {
            signatures: PartialSignatureSet {
                btc: Some(dummy_share()),
                evm: None,
            },
            response: OracleResponse {
                error: Some("Swap conditions not met".to_string()),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let parsed: EvaluationOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.signatures.btc, outcome.signatures.btc);
        assert_eq!(parsed.response.error.as_deref(), Some("Swap conditions not met"));
    }
}
