//! Swap intent and prepared materials

use crate::chain::btc::Utxo;
use crate::config::Settings;
use crate::error::{SwapError, SwapResult};
use crate::oracle::evaluator::SwapConditions;
use crate::tx::evm::UnsignedTransfer;

use bitcoin::{Network, ScriptBuf, Transaction};
use chrono::{DateTime, Utc};
use ethers::types::U256;
use uuid::Uuid;

/// Immutable description of one swap: counterparties on both chains,
/// amounts, and the deadline. Created once, consumed by the engine to
/// derive every candidate transaction.
#[derive(Debug, Clone)]
pub struct SwapIntent {
    pub id: Uuid,
    /// Funder of the UTXO side; receives the BTC clawback
    pub btc_funder: String,
    /// Receives the UTXO side on success
    pub btc_counterparty: String,
    /// Receives the account side on success
    pub evm_recipient: String,
    /// Refunded on account-side clawback
    pub evm_refund: String,
    pub btc_network: Network,
    pub btc_sats: u64,
    pub evm_wei: U256,
    pub evm_chain_id: u64,
    pub origin_time: DateTime<Utc>,
    pub deadline_days: i64,
}

impl SwapIntent {
    pub fn from_settings(settings: &Settings, origin_time: DateTime<Utc>) -> SwapResult<Self> {
        let evm_wei = U256::from_dec_str(&settings.swap.evm_wei)
            .map_err(|e| SwapError::Config(format!("swap.evm_wei: {e}")))?;

        Ok(Self {
            id: Uuid::new_v4(),
            btc_funder: settings.swap.btc_funder.clone(),
            btc_counterparty: settings.swap.btc_counterparty.clone(),
            evm_recipient: settings.swap.evm_recipient.clone(),
            evm_refund: settings.swap.evm_refund.clone(),
            btc_network: settings.btc_network(),
            btc_sats: settings.swap.btc_sats,
            evm_wei,
            evm_chain_id: settings.evm.chain_id,
            origin_time,
            deadline_days: settings.swap.deadline_days,
        })
    }

    /// Raw predicate inputs handed to the evaluator.
    pub fn conditions(&self) -> SwapConditions {
        SwapConditions {
            evm_min_balance_wei: self.evm_wei.to_string(),
            evm_chain_id: self.evm_chain_id,
            btc_swap_sats: self.btc_sats,
            origin_time: self.origin_time,
            deadline_days: self.deadline_days,
        }
    }
}

/// UTXO-chain candidates, present unless preparation ran degraded.
#[derive(Debug, Clone)]
pub struct BtcMaterials {
    /// Reference UTXO locked in for this swap's lifetime
    pub pinned: Utxo,
    /// Locking script of the pinned previous output; the digests commit to it
    pub prev_script: ScriptBuf,
    pub success_tx: Transaction,
    pub success_digest: [u8; 32],
    pub clawback_tx: Transaction,
    pub clawback_digest: [u8; 32],
}

/// Account-chain candidates. Both share one nonce: at most one of them can
/// ever be included.
#[derive(Debug, Clone)]
pub struct EvmMaterials {
    pub success: UnsignedTransfer,
    pub success_digest: [u8; 32],
    pub clawback: UnsignedTransfer,
    pub clawback_digest: [u8; 32],
}

/// Everything prepared up front for one evaluation round.
#[derive(Debug, Clone)]
pub struct SwapMaterials {
    pub intent: SwapIntent,
    pub btc: Option<BtcMaterials>,
    pub evm: EvmMaterials,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BtcConfig, CoordinatorConfig, EvmConfig, MetricsConfig, OracleConfig, SwapConfig,
    };
    use chrono::TimeZone;

    fn settings() -> Settings {
        Settings {
            coordinator: CoordinatorConfig {
                poll_interval_secs: 60,
                receipt_poll_secs: 5,
                receipt_poll_attempts: 24,
            },
            btc: BtcConfig {
                explorer_url: "https://blockstream.info/testnet/api".to_string(),
                network: "testnet".to_string(),
                fee_rate: 28,
            },
            evm: EvmConfig {
                rpc_url: "https://yellowstone-rpc.litprotocol.com".to_string(),
                chain_id: 175188,
                max_fee_per_gas_gwei: 2,
                max_priority_fee_per_gas_gwei: 1,
                gas_limit: 21_000,
            },
            oracle: OracleConfig {
                endpoint: "https://oracle.example.com/evaluate".to_string(),
                evaluator_cid: "QmS4ghgMgfFvqPjB4WKXHaN15Zyw4cggsez1Ae4tZWFnLf".to_string(),
                public_key: "04".to_string(),
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

    #[test]
    fn test_intent_from_settings() {
        let origin = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let intent = SwapIntent::from_settings(&settings(), origin).unwrap();

        assert_eq!(intent.btc_network, Network::Testnet);
        assert_eq!(intent.btc_sats, 1_000);
        assert_eq!(intent.evm_wei, U256::from_dec_str("10000000000000000").unwrap());
        assert_eq!(intent.origin_time, origin);

        let conditions = intent.conditions();
        assert_eq!(conditions.evm_min_balance_wei, "10000000000000000");
        assert_eq!(conditions.btc_swap_sats, 1_000);
        assert_eq!(conditions.deadline_days, 4);
    }

    #[test]
    fn test_intent_rejects_bad_wei() {
        let mut bad = settings();
        bad.swap.evm_wei = "ten".to_string();
        let err = SwapIntent::from_settings(&bad, Utc::now()).unwrap_err();
        assert!(matches!(err, SwapError::Config(_)));
    }
}
