//! Swap orchestration engine
//!
//! The decision about which transactions get signed is made remotely, so
//! every candidate (success and clawback, both chains) is built and
//! digested locally up front and submitted together with the predicates'
//! raw parameters. The engine then settles on whichever partial signature
//! set the oracle returns, and keeps cycling while conditions are merely
//! unmet.

use crate::chain::btc::Utxo;
use crate::chain::{BtcExplorer, EvmRpc};
use crate::config::Settings;
use crate::coordination::intent::{BtcMaterials, EvmMaterials, SwapIntent, SwapMaterials};
use crate::error::{SwapError, SwapResult};
use crate::oracle::evaluator::{self, BtcLeg, EvmLeg};
use crate::oracle::{
    EvaluationOutcome, EvaluationParams, EvaluationRequest, OracleResponse, SignaturePresence,
    SigningOracle,
};
use crate::tx::evm::UnsignedTransfer;
use crate::tx::{btc, evm, signature};

use chrono::Utc;
use ethers::types::{TxHash, U256};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Which finalize/broadcast steps the returned signature set allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementPlan {
    pub btc_leg: Option<BtcLeg>,
    pub evm_leg: Option<EvmLeg>,
}

/// Broadcast receipts of one settled swap.
#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub swap_id: Uuid,
    /// Outcome the quorum reported, when it echoed its condition report
    pub outcome: Option<evaluator::Outcome>,
    pub btc_txid: Option<String>,
    pub evm_tx_hash: Option<TxHash>,
}

pub struct SwapEngine {
    explorer: Arc<BtcExplorer>,
    evm_rpc: Arc<EvmRpc>,
    oracle: Arc<dyn SigningOracle>,
    settings: Settings,
    /// Reference UTXO locked in by the first cycle that observed one;
    /// never replaced within a swap
    pinned: RwLock<Option<Utxo>>,
    shutdown: Arc<RwLock<bool>>,
}

impl SwapEngine {
    pub fn new(
        explorer: Arc<BtcExplorer>,
        evm_rpc: Arc<EvmRpc>,
        oracle: Arc<dyn SigningOracle>,
        settings: Settings,
    ) -> Self {
        Self {
            explorer,
            evm_rpc,
            oracle,
            settings,
            pinned: RwLock::new(None),
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Cycle prepare → submit → settle until the swap settles, a fatal
    /// error aborts it, or shutdown is requested. Returns `None` only on
    /// shutdown.
    pub async fn run(&self, intent: &SwapIntent) -> SwapResult<Option<SettlementReport>> {
        let mut cycle = interval(Duration::from_secs(
            self.settings.coordinator.poll_interval_secs,
        ));

        info!("Swap engine started for swap {}", intent.id);

        loop {
            if *self.shutdown.read().await {
                info!("Swap engine stopped before settlement");
                return Ok(None);
            }

            cycle.tick().await;

            match self.attempt(intent).await {
                Ok(report) => {
                    info!(
                        "Swap {} settled: btc={:?} evm={:?}",
                        intent.id, report.btc_txid, report.evm_tx_hash
                    );
                    crate::metrics::record_cycle("settled");
                    return Ok(Some(report));
                }
                Err(e) if e.is_retryable() => {
                    debug!("Cycle for swap {} did not settle: {}", intent.id, e);
                    crate::metrics::record_cycle("unsettled");
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        "Aborting swap {} without broadcast: {}",
                        intent.id, e
                    );
                    crate::metrics::record_cycle("aborted");
                    return Err(e);
                }
                Err(e) => {
                    error!("Aborting swap {}: {}", intent.id, e);
                    crate::metrics::record_cycle("aborted");
                    return Err(e);
                }
            }
        }
    }

    /// One full evaluation cycle.
    pub async fn attempt(&self, intent: &SwapIntent) -> SwapResult<SettlementReport> {
        let materials = self.prepare(intent).await?;
        let outcome = self.submit(&materials).await?;
        let plan = Self::classify(&materials, &outcome)?;
        self.settle(&materials, &outcome, plan).await
    }

    /// Build all candidate transactions and their digests before any
    /// signature decision is known.
    pub async fn prepare(&self, intent: &SwapIntent) -> SwapResult<SwapMaterials> {
        let public_key = &self.settings.oracle.public_key;
        let signer_evm_address = evm::evm_address(public_key)?;
        let signer_btc_address = btc::p2pkh_address(public_key, intent.btc_network)?;

        let nonce = self.evm_rpc.transaction_count(signer_evm_address).await?;
        let evm_materials = self.build_evm_materials(intent, nonce)?;

        let utxos = self.explorer.utxos(&signer_btc_address).await?;
        {
            let mut pinned = self.pinned.write().await;
            if pinned.is_none() {
                *pinned = utxos.first().cloned();
                if let Some(utxo) = pinned.as_ref() {
                    info!(
                        "Pinned funding UTXO {}:{} ({} sat) for swap {}",
                        utxo.txid, utxo.vout, utxo.value, intent.id
                    );
                }
            }
        }

        let btc_materials = match self.pinned.read().await.clone() {
            Some(pinned) => Some(
                self.build_btc_materials(intent, &signer_btc_address, pinned)
                    .await?,
            ),
            None => {
                info!(
                    "No funding UTXO observed for swap {}; running degraded evaluation",
                    intent.id
                );
                None
            }
        };

        self.preview_conditions(intent, &btc_materials, &utxos)
            .await?;

        Ok(SwapMaterials {
            intent: intent.clone(),
            btc: btc_materials,
            evm: evm_materials,
        })
    }

    /// Advisory local re-evaluation of the predicates, for operators. The
    /// authoritative evaluation runs inside the oracle against its own view
    /// of chain state.
    async fn preview_conditions(
        &self,
        intent: &SwapIntent,
        btc_materials: &Option<BtcMaterials>,
        observed_utxos: &[Utxo],
    ) -> SwapResult<()> {
        let signer = evm::evm_address(&self.settings.oracle.public_key)?;
        let balance = self.evm_rpc.balance(signer).await?;
        let evm_condition_pass = evaluator::evm_condition(balance, intent.evm_wei);

        let expected = match btc_materials {
            Some(built) => {
                let report = evaluator::ConditionReport {
                    evm_condition_pass,
                    btc_condition_pass: evaluator::btc_condition(
                        &built.pinned,
                        observed_utxos,
                        intent.btc_sats,
                    ),
                    deadline_passed: evaluator::deadline_passed(
                        intent.origin_time,
                        intent.deadline_days,
                        Utc::now(),
                    ),
                };
                debug!("Local condition preview for swap {}: {:?}", intent.id, report);
                evaluator::evaluate(&report)
            }
            None => evaluator::evaluate_degraded(evm_condition_pass),
        };

        info!("Swap {} local preview expects {:?}", intent.id, expected);
        Ok(())
    }

    fn build_evm_materials(&self, intent: &SwapIntent, nonce: U256) -> SwapResult<EvmMaterials> {
        let config = &self.settings.evm;
        let gwei = U256::exp10(9);
        let max_fee = (U256::from(config.max_fee_per_gas_gwei) * gwei).to_string();
        let priority_fee = (U256::from(config.max_priority_fee_per_gas_gwei) * gwei).to_string();

        let transfer = |to: &str| UnsignedTransfer {
            to: to.to_string(),
            value_wei: intent.evm_wei.to_string(),
            chain_id: intent.evm_chain_id,
            nonce: nonce.as_u64(),
            gas_limit: config.gas_limit,
            max_fee_per_gas_wei: max_fee.clone(),
            max_priority_fee_per_gas_wei: priority_fee.clone(),
        };

        let success = transfer(&intent.evm_recipient);
        let success_digest = evm::signing_digest(&success.to_typed()?);
        let clawback = transfer(&intent.evm_refund);
        let clawback_digest = evm::signing_digest(&clawback.to_typed()?);

        Ok(EvmMaterials {
            success,
            success_digest,
            clawback,
            clawback_digest,
        })
    }

    async fn build_btc_materials(
        &self,
        intent: &SwapIntent,
        signer_address: &bitcoin::Address,
        pinned: Utxo,
    ) -> SwapResult<BtcMaterials> {
        let prev_script = self.explorer.script_pubkey(&pinned.txid, pinned.vout).await?;
        let recipient = btc::parse_address(&intent.btc_counterparty, intent.btc_network)?;
        let refund = btc::parse_address(&intent.btc_funder, intent.btc_network)?;
        let fee_rate = self.settings.btc.fee_rate;

        let success_tx = btc::build_unsigned(
            &pinned,
            &recipient,
            signer_address,
            intent.btc_sats,
            fee_rate,
        )?;
        let success_digest = btc::legacy_sighash(&success_tx, 0, &prev_script)?;

        let clawback_tx =
            btc::build_unsigned(&pinned, &refund, signer_address, intent.btc_sats, fee_rate)?;
        let clawback_digest = btc::legacy_sighash(&clawback_tx, 0, &prev_script)?;

        Ok(BtcMaterials {
            pinned,
            prev_script,
            success_tx,
            success_digest,
            clawback_tx,
            clawback_digest,
        })
    }

    /// Submit all materials for one remote evaluation.
    pub async fn submit(&self, materials: &SwapMaterials) -> SwapResult<EvaluationOutcome> {
        let request = self.evaluation_request(materials)?;
        let mode = if materials.btc.is_some() { "full" } else { "degraded" };

        debug!(
            "Submitting swap {} for {} evaluation against {}",
            materials.intent.id, mode, request.evaluator_cid
        );

        let started = Instant::now();
        let outcome = self.oracle.evaluate(&request).await?;
        crate::metrics::observe_evaluation(mode, started.elapsed().as_secs_f64());

        if outcome.signatures.btc.is_some() {
            crate::metrics::record_signature_share("btc");
        }
        if outcome.signatures.evm.is_some() {
            crate::metrics::record_signature_share("evm");
        }

        Ok(outcome)
    }

    fn evaluation_request(&self, materials: &SwapMaterials) -> SwapResult<EvaluationRequest> {
        let intent = &materials.intent;
        let public_key = self.settings.oracle.public_key.clone();
        let signer_evm_address = format!("{:?}", evm::evm_address(&public_key)?);
        let signer_btc_address = match &materials.btc {
            Some(_) => Some(btc::p2pkh_address(&public_key, intent.btc_network)?.to_string()),
            None => None,
        };

        let params = EvaluationParams {
            public_key,
            signer_evm_address,
            signer_btc_address,
            btc_endpoint: materials
                .btc
                .as_ref()
                .map(|_| self.explorer.base_url().to_string()),
            pinned_utxo: materials.btc.as_ref().map(|b| b.pinned.clone()),
            conditions: intent.conditions(),
            btc_success_digest: materials.btc.as_ref().map(|b| hex::encode(b.success_digest)),
            btc_clawback_digest: materials
                .btc
                .as_ref()
                .map(|b| hex::encode(b.clawback_digest)),
            btc_success_tx: materials
                .btc
                .as_ref()
                .map(|b| hex::encode(btc::serialize(&b.success_tx))),
            btc_clawback_tx: materials
                .btc
                .as_ref()
                .map(|b| hex::encode(btc::serialize(&b.clawback_tx))),
            evm_success_tx: Some(materials.evm.success.clone()),
            evm_clawback_tx: materials.evm.clawback.clone(),
        };

        Ok(EvaluationRequest {
            evaluator_cid: self.settings.oracle.evaluator_cid.clone(),
            params,
        })
    }

    /// Map the oracle's result onto the locally prepared candidates.
    ///
    /// Every returned signature must correspond, via the echoed payload, to
    /// a byte-identical local candidate whose recomputed digest matches;
    /// anything else aborts before any broadcast.
    pub fn classify(
        materials: &SwapMaterials,
        outcome: &EvaluationOutcome,
    ) -> SwapResult<SettlementPlan> {
        if outcome.signatures.presence() == SignaturePresence::Neither {
            return Err(SwapError::PredicateUnmet);
        }

        let btc_leg = match &outcome.signatures.btc {
            Some(_) => Some(Self::match_btc_echo(materials, &outcome.response)?),
            None => None,
        };
        let evm_leg = match &outcome.signatures.evm {
            Some(_) => Some(Self::match_evm_echo(materials, &outcome.response)?),
            None => None,
        };

        // a quorum that echoes its condition report must have signed
        // exactly what that report authorizes
        if let Some(report) = &outcome.response.conditions {
            let expected = evaluator::evaluate(report).signatures();
            if expected.btc != btc_leg || expected.evm != evm_leg {
                return Err(SwapError::Oracle(format!(
                    "signature set btc={btc_leg:?} evm={evm_leg:?} inconsistent with echoed conditions {report:?}"
                )));
            }
        }

        Ok(SettlementPlan { btc_leg, evm_leg })
    }

    fn match_btc_echo(materials: &SwapMaterials, response: &OracleResponse) -> SwapResult<BtcLeg> {
        let built = materials.btc.as_ref().ok_or_else(|| SwapError::DigestMismatch {
            digest: "btc signature without prepared candidates".to_string(),
        })?;

        let echo = response
            .btc_transaction
            .as_ref()
            .or(response.btc_clawback_transaction.as_ref())
            .ok_or_else(|| {
                SwapError::Oracle("btc signature share without an echoed transaction".to_string())
            })?;

        let success_hex = hex::encode(btc::serialize(&built.success_tx));
        let clawback_hex = hex::encode(btc::serialize(&built.clawback_tx));

        if *echo == success_hex
            && btc::legacy_sighash(&built.success_tx, 0, &built.prev_script)? == built.success_digest
        {
            return Ok(BtcLeg::Success);
        }
        if *echo == clawback_hex
            && btc::legacy_sighash(&built.clawback_tx, 0, &built.prev_script)?
                == built.clawback_digest
        {
            return Ok(BtcLeg::Clawback);
        }

        Err(SwapError::DigestMismatch {
            digest: echoed_btc_digest(echo, built),
        })
    }

    fn match_evm_echo(materials: &SwapMaterials, response: &OracleResponse) -> SwapResult<EvmLeg> {
        let echo = response
            .evm_transaction
            .as_ref()
            .or(response.evm_clawback_transaction.as_ref())
            .ok_or_else(|| {
                SwapError::Oracle("evm signature share without an echoed transaction".to_string())
            })?;

        if *echo == materials.evm.success
            && evm::signing_digest(&echo.to_typed()?) == materials.evm.success_digest
        {
            return Ok(EvmLeg::Success);
        }
        if *echo == materials.evm.clawback
            && evm::signing_digest(&echo.to_typed()?) == materials.evm.clawback_digest
        {
            return Ok(EvmLeg::Clawback);
        }

        let digest = echo
            .to_typed()
            .map(|tx| hex::encode(evm::signing_digest(&tx)))
            .unwrap_or_else(|_| "unparseable echoed transaction".to_string());
        Err(SwapError::DigestMismatch { digest })
    }

    /// Finalize and broadcast per the plan. The four presence cases are
    /// dispatched exhaustively; both-chain settlement is order-independent
    /// and carries no cross-chain atomicity.
    pub async fn settle(
        &self,
        materials: &SwapMaterials,
        outcome: &EvaluationOutcome,
        plan: SettlementPlan,
    ) -> SwapResult<SettlementReport> {
        let mut report = SettlementReport {
            swap_id: materials.intent.id,
            outcome: outcome.response.conditions.as_ref().map(evaluator::evaluate),
            btc_txid: None,
            evm_tx_hash: None,
        };

        match outcome.signatures.presence() {
            SignaturePresence::Neither => return Err(SwapError::PredicateUnmet),
            SignaturePresence::BtcOnly => {
                report.btc_txid = Some(self.broadcast_btc(materials, outcome, plan).await?);
            }
            SignaturePresence::EvmOnly => {
                report.evm_tx_hash = Some(self.broadcast_evm(materials, outcome, plan).await?);
            }
            SignaturePresence::Both => {
                report.btc_txid = Some(self.broadcast_btc(materials, outcome, plan).await?);
                report.evm_tx_hash = Some(self.broadcast_evm(materials, outcome, plan).await?);
            }
        }

        Ok(report)
    }

    async fn broadcast_btc(
        &self,
        materials: &SwapMaterials,
        outcome: &EvaluationOutcome,
        plan: SettlementPlan,
    ) -> SwapResult<String> {
        let built = materials
            .btc
            .as_ref()
            .ok_or_else(|| SwapError::Internal("btc settlement without candidates".to_string()))?;
        let share = outcome
            .signatures
            .btc
            .as_ref()
            .ok_or_else(|| SwapError::Internal("btc settlement without a share".to_string()))?;
        let leg = plan
            .btc_leg
            .ok_or_else(|| SwapError::Internal("btc settlement without a leg".to_string()))?;

        let unsigned = match leg {
            BtcLeg::Success => &built.success_tx,
            BtcLeg::Clawback => &built.clawback_tx,
        };

        let finalized = signature::finalize(unsigned, share)?;
        let tx_hex = hex::encode(btc::serialize(&finalized));

        match self.explorer.broadcast(&tx_hex).await {
            Ok(txid) => {
                crate::metrics::record_broadcast("btc", true);
                info!("Broadcast {leg:?} transaction on btc: {txid}");
                Ok(txid)
            }
            Err(e) => {
                crate::metrics::record_broadcast("btc", false);
                Err(e)
            }
        }
    }

    async fn broadcast_evm(
        &self,
        materials: &SwapMaterials,
        outcome: &EvaluationOutcome,
        plan: SettlementPlan,
    ) -> SwapResult<TxHash> {
        let share = outcome
            .signatures
            .evm
            .as_ref()
            .ok_or_else(|| SwapError::Internal("evm settlement without a share".to_string()))?;
        let leg = plan
            .evm_leg
            .ok_or_else(|| SwapError::Internal("evm settlement without a leg".to_string()))?;

        let transfer = match leg {
            EvmLeg::Success => &materials.evm.success,
            EvmLeg::Clawback => &materials.evm.clawback,
        };

        let typed = transfer.to_typed()?;
        let raw = evm::finalize(&typed, share.recid, &share.r, &share.s)?;

        let hash = match self.evm_rpc.broadcast(raw).await {
            Ok(hash) => {
                crate::metrics::record_broadcast("evm", true);
                info!("Broadcast {leg:?} transaction on evm: {hash:?}");
                hash
            }
            Err(e) => {
                crate::metrics::record_broadcast("evm", false);
                return Err(e);
            }
        };

        let config = &self.settings.coordinator;
        match self
            .evm_rpc
            .wait_for_receipt(hash, config.receipt_poll_secs, config.receipt_poll_attempts)
            .await
        {
            Ok(receipt) => info!(
                "Transaction {hash:?} included in block {:?}",
                receipt.block_number
            ),
            Err(e) => warn!("No receipt observed for {hash:?}: {e}"),
        }

        Ok(hash)
    }

    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Swap engine shutdown initiated");
    }
}

fn echoed_btc_digest(echo: &str, built: &BtcMaterials) -> String {
    btc::deserialize_hex(echo)
        .and_then(|tx| btc::legacy_sighash(&tx, 0, &built.prev_script))
        .map(hex::encode)
        .unwrap_or_else(|_| "unparseable echoed transaction".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BtcConfig, CoordinatorConfig, EvmConfig, MetricsConfig, OracleConfig, SwapConfig,
    };
    use crate::oracle::evaluator::ConditionReport;
    use crate::oracle::{MockSigningOracle, PartialSignatureSet, SignatureShare};

    use bitcoin::Network;
    use chrono::{TimeZone, Utc};

    const GENERATOR_PUBKEY: &str = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

    fn settings() -> Settings {
        Settings {
            coordinator: CoordinatorConfig {
                poll_interval_secs: 60,
                receipt_poll_secs: 1,
                receipt_poll_attempts: 1,
            },
            btc: BtcConfig {
                explorer_url: "https://blockstream.info/testnet/api".to_string(),
                network: "testnet".to_string(),
                fee_rate: 28,
            },
            evm: EvmConfig {
                rpc_url: "http://localhost:8545".to_string(),
                chain_id: 175188,
                max_fee_per_gas_gwei: 2,
                max_priority_fee_per_gas_gwei: 1,
                gas_limit: 21_000,
            },
            oracle: OracleConfig {
                endpoint: "http://localhost:9999/evaluate".to_string(),
                evaluator_cid: "QmS4ghgMgfFvqPjB4WKXHaN15Zyw4cggsez1Ae4tZWFnLf".to_string(),
                public_key: GENERATOR_PUBKEY.to_string(),
            },
            swap: SwapConfig {
                btc_funder: "mmnxChcUSLdPGuvSmkpUr7ngrNjfTYKcRq".to_string(),
                btc_counterparty: "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn".to_string(),
                evm_recipient: "0x48e6a467852Fa29710AaaCDB275F85db4Fa420eB".to_string(),
                evm_refund: "0x7A4bC79cD10A2cd1daA71ff2da1af5a30b42e4d2".to_string(),
                btc_sats: 1_000,
                evm_wei: "10000000000000000".to_string(),
                deadline_days: 4,
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 9091,
            },
        }
    }

    fn intent() -> SwapIntent {
        let origin = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        SwapIntent::from_settings(&settings(), origin).unwrap()
    }

    fn materials() -> SwapMaterials {
        let intent = intent();
        let signer = btc::p2pkh_address(GENERATOR_PUBKEY, Network::Testnet).unwrap();
        let recipient = btc::parse_address(&intent.btc_counterparty, Network::Testnet).unwrap();
        let refund = btc::parse_address(&intent.btc_funder, Network::Testnet).unwrap();

        let pinned = Utxo {
            txid: "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b".to_string(),
            vout: 0,
            value: 20_000,
        };
        let prev_script = signer.script_pubkey();

        let success_tx = btc::build_unsigned(&pinned, &recipient, &signer, 1_000, 28).unwrap();
        let success_digest = btc::legacy_sighash(&success_tx, 0, &prev_script).unwrap();
        let clawback_tx = btc::build_unsigned(&pinned, &refund, &signer, 1_000, 28).unwrap();
        let clawback_digest = btc::legacy_sighash(&clawback_tx, 0, &prev_script).unwrap();

        let transfer = |to: &str| UnsignedTransfer {
            to: to.to_string(),
            value_wei: intent.evm_wei.to_string(),
            chain_id: intent.evm_chain_id,
            nonce: 7,
            gas_limit: 21_000,
            max_fee_per_gas_wei: "2000000000".to_string(),
            max_priority_fee_per_gas_wei: "1000000000".to_string(),
        };
        let success = transfer(&intent.evm_recipient);
        let success_evm_digest = evm::signing_digest(&success.to_typed().unwrap());
        let clawback = transfer(&intent.evm_refund);
        let clawback_evm_digest = evm::signing_digest(&clawback.to_typed().unwrap());

        SwapMaterials {
            intent,
            btc: Some(BtcMaterials {
                pinned,
                prev_script,
                success_tx,
                success_digest,
                clawback_tx,
                clawback_digest,
            }),
            evm: EvmMaterials {
                success,
                success_digest: success_evm_digest,
                clawback,
                clawback_digest: clawback_evm_digest,
            },
        }
    }

    fn share() -> SignatureShare {
        SignatureShare {
            r: "11".repeat(32),
            s: "22".repeat(32),
            recid: 0,
            public_key: "02".repeat(33),
        }
    }

    fn outcome(
        btc: Option<SignatureShare>,
        evm: Option<SignatureShare>,
        response: OracleResponse,
    ) -> EvaluationOutcome {
        EvaluationOutcome {
            signatures: PartialSignatureSet { btc, evm },
            response,
        }
    }

    #[test]
    fn test_classify_neither_is_predicate_unmet() {
        let result = SwapEngine::classify(
            &materials(),
            &outcome(
                None,
                None,
                OracleResponse {
                    error: Some("Swap conditions not met".to_string()),
                    ..Default::default()
                },
            ),
        );
        assert!(matches!(result.unwrap_err(), SwapError::PredicateUnmet));
    }

    #[test]
    fn test_classify_matches_btc_legs() {
        let m = materials();
        let built = m.btc.as_ref().unwrap();

        let success_echo = OracleResponse {
            btc_transaction: Some(hex::encode(btc::serialize(&built.success_tx))),
            ..Default::default()
        };
        let plan = SwapEngine::classify(&m, &outcome(Some(share()), None, success_echo)).unwrap();
        assert_eq!(plan.btc_leg, Some(BtcLeg::Success));
        assert_eq!(plan.evm_leg, None);

        let clawback_echo = OracleResponse {
            btc_clawback_transaction: Some(hex::encode(btc::serialize(&built.clawback_tx))),
            ..Default::default()
        };
        let plan = SwapEngine::classify(&m, &outcome(Some(share()), None, clawback_echo)).unwrap();
        assert_eq!(plan.btc_leg, Some(BtcLeg::Clawback));
    }

    #[test]
    fn test_classify_rejects_foreign_btc_echo() {
        let m = materials();
        let built = m.btc.as_ref().unwrap();

        // same shape, different fee rate: byte-different candidate
        let signer = btc::p2pkh_address(GENERATOR_PUBKEY, Network::Testnet).unwrap();
        let recipient =
            btc::parse_address("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn", Network::Testnet).unwrap();
        let foreign = btc::build_unsigned(&built.pinned, &recipient, &signer, 1_000, 30).unwrap();

        let response = OracleResponse {
            btc_transaction: Some(hex::encode(btc::serialize(&foreign))),
            ..Default::default()
        };
        let err = SwapEngine::classify(&m, &outcome(Some(share()), None, response)).unwrap_err();
        assert!(matches!(err, SwapError::DigestMismatch { .. }));
    }

    #[test]
    fn test_classify_rejects_share_without_echo() {
        let err = SwapEngine::classify(
            &materials(),
            &outcome(Some(share()), None, OracleResponse::default()),
        )
        .unwrap_err();
        assert!(matches!(err, SwapError::Oracle(_)));
    }

    #[test]
    fn test_classify_matches_evm_legs_and_rejects_foreign() {
        let m = materials();

        let clawback_echo = OracleResponse {
            evm_clawback_transaction: Some(m.evm.clawback.clone()),
            ..Default::default()
        };
        let plan = SwapEngine::classify(&m, &outcome(None, Some(share()), clawback_echo)).unwrap();
        assert_eq!(plan.evm_leg, Some(EvmLeg::Clawback));
        assert_eq!(plan.btc_leg, None);

        let mut foreign = m.evm.success.clone();
        foreign.nonce += 1;
        let response = OracleResponse {
            evm_transaction: Some(foreign),
            ..Default::default()
        };
        let err = SwapEngine::classify(&m, &outcome(None, Some(share()), response)).unwrap_err();
        assert!(matches!(err, SwapError::DigestMismatch { .. }));
    }

    #[test]
    fn test_classify_full_release_echo() {
        let m = materials();
        let built = m.btc.as_ref().unwrap();
        let response = OracleResponse {
            conditions: Some(ConditionReport {
                evm_condition_pass: true,
                btc_condition_pass: true,
                deadline_passed: false,
            }),
            btc_transaction: Some(hex::encode(btc::serialize(&built.success_tx))),
            evm_transaction: Some(m.evm.success.clone()),
            ..Default::default()
        };
        let plan =
            SwapEngine::classify(&m, &outcome(Some(share()), Some(share()), response)).unwrap();
        assert_eq!(plan.btc_leg, Some(BtcLeg::Success));
        assert_eq!(plan.evm_leg, Some(EvmLeg::Success));
    }

    #[test]
    fn test_classify_cross_checks_condition_echo() {
        let m = materials();
        let built = m.btc.as_ref().unwrap();

        // report says full release, but only a btc share came back
        let response = OracleResponse {
            conditions: Some(ConditionReport {
                evm_condition_pass: true,
                btc_condition_pass: true,
                deadline_passed: false,
            }),
            btc_transaction: Some(hex::encode(btc::serialize(&built.success_tx))),
            ..Default::default()
        };
        let err = SwapEngine::classify(&m, &outcome(Some(share()), None, response)).unwrap_err();
        assert!(matches!(err, SwapError::Oracle(_)));
    }

    #[tokio::test]
    async fn test_submit_carries_materials_to_oracle() {
        let m = materials();
        let expected_digest = hex::encode(m.btc.as_ref().unwrap().success_digest);

        let mut oracle = MockSigningOracle::new();
        oracle
            .expect_evaluate()
            .withf(move |request: &EvaluationRequest| {
                request.evaluator_cid == "QmS4ghgMgfFvqPjB4WKXHaN15Zyw4cggsez1Ae4tZWFnLf"
                    && request.params.pinned_utxo.is_some()
                    && request.params.btc_endpoint.is_some()
                    && request.params.btc_success_digest.as_deref() == Some(expected_digest.as_str())
                    && request.params.conditions.btc_swap_sats == 1_000
            })
            .times(1)
            .returning(|_| Ok(EvaluationOutcome::default()));

        let engine = SwapEngine::new(
            Arc::new(BtcExplorer::new("https://blockstream.info/testnet/api")),
            Arc::new(EvmRpc::new(&settings().evm).unwrap()),
            Arc::new(oracle),
            settings(),
        );

        let result = engine.submit(&m).await.unwrap();
        assert_eq!(result.signatures.presence(), SignaturePresence::Neither);
    }

    #[tokio::test]
    async fn test_degraded_request_omits_utxo_context() {
        let mut m = materials();
        m.btc = None;

        let mut oracle = MockSigningOracle::new();
        oracle
            .expect_evaluate()
            .withf(|request: &EvaluationRequest| {
                request.params.btc_endpoint.is_none()
                    && request.params.pinned_utxo.is_none()
                    && request.params.btc_success_tx.is_none()
                    && request.params.evm_clawback_tx.nonce == 7
            })
            .times(1)
            .returning(|_| Ok(EvaluationOutcome::default()));

        let engine = SwapEngine::new(
            Arc::new(BtcExplorer::new("https://blockstream.info/testnet/api")),
            Arc::new(EvmRpc::new(&settings().evm).unwrap()),
            Arc::new(oracle),
            settings(),
        );

        engine.submit(&m).await.unwrap();
    }
}
