//! Configuration management for the swap coordinator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub coordinator: CoordinatorConfig,
    pub btc: BtcConfig,
    pub evm: EvmConfig,
    pub oracle: OracleConfig,
    pub swap: SwapConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Seconds between evaluation cycles while conditions are unmet
    pub poll_interval_secs: u64,
    /// Seconds between receipt polls after an EVM broadcast
    pub receipt_poll_secs: u64,
    /// Receipt polls before giving up on inclusion
    pub receipt_poll_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BtcConfig {
    /// Explorer API base, e.g. https://blockstream.info/testnet/api
    pub explorer_url: String,
    /// Network name: bitcoin, testnet, signet or regtest
    pub network: String,
    /// Fee rate in satoshis per vbyte
    pub fee_rate: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub max_fee_per_gas_gwei: u64,
    pub max_priority_fee_per_gas_gwei: u64,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Evaluation endpoint of the signing network
    pub endpoint: String,
    /// Content identifier of the published evaluator build; opaque here
    pub evaluator_cid: String,
    /// Uncompressed SEC public key of the threshold key, hex
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapConfig {
    /// BTC address of the party funding the UTXO side (clawback target)
    pub btc_funder: String,
    /// BTC address receiving the UTXO side on success
    pub btc_counterparty: String,
    /// EVM address receiving the account side on success
    pub evm_recipient: String,
    /// EVM address refunded on clawback
    pub evm_refund: String,
    /// Swap amount on the UTXO chain, satoshis
    pub btc_sats: u64,
    /// Swap amount on the account chain, wei (decimal string)
    pub evm_wei: String,
    /// Days from origin time until the deadline predicate flips
    pub deadline_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("CROSSLOCK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.btc.explorer_url.is_empty() {
            anyhow::bail!("btc.explorer_url must be set");
        }
        if self.evm.rpc_url.is_empty() {
            anyhow::bail!("evm.rpc_url must be set");
        }
        if self.oracle.endpoint.is_empty() || self.oracle.public_key.is_empty() {
            anyhow::bail!("oracle.endpoint and oracle.public_key must be set");
        }
        if bitcoin::Network::from_str(&self.btc.network).is_err() {
            anyhow::bail!("Unknown btc.network: {}", self.btc.network);
        }
        if self.btc.fee_rate == 0 {
            anyhow::bail!("btc.fee_rate must be positive");
        }
        if self.swap.btc_sats == 0 {
            anyhow::bail!("swap.btc_sats must be positive");
        }
        if ethers::types::U256::from_dec_str(&self.swap.evm_wei).is_err() {
            anyhow::bail!("swap.evm_wei is not a decimal wei amount");
        }
        if self.swap.deadline_days <= 0 {
            anyhow::bail!("swap.deadline_days must be positive");
        }
        Ok(())
    }

    /// Parsed UTXO-chain network
    pub fn btc_network(&self) -> bitcoin::Network {
        // validate() already rejected unknown names
        bitcoin::Network::from_str(&self.btc.network).expect("validated network")
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
