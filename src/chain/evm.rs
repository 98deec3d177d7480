//! Account-chain JSON-RPC wrapper
//!
//! Thin wrapper over a single HTTP provider: balance, nonce, raw broadcast
//! and receipt polling. No failover and no internal retry; failures map to
//! [`SwapError::Transport`] and surface unchanged.

use crate::config::EvmConfig;
use crate::error::{SwapError, SwapResult};

use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Bytes, TransactionReceipt, TxHash, U256};
use std::time::Duration;
use tracing::debug;

pub struct EvmRpc {
    provider: Provider<Http>,
    rpc_url: String,
}

impl EvmRpc {
    pub fn new(config: &EvmConfig) -> SwapResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| SwapError::Config(format!("Invalid RPC URL: {e}")))?;
        Ok(Self {
            provider,
            rpc_url: config.rpc_url.clone(),
        })
    }

    /// Native balance of `address` in wei.
    pub async fn balance(&self, address: Address) -> SwapResult<U256> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| SwapError::transport(&self.rpc_url, e))
    }

    /// Next nonce for `address`.
    pub async fn transaction_count(&self, address: Address) -> SwapResult<U256> {
        self.provider
            .get_transaction_count(address, None)
            .await
            .map_err(|e| SwapError::transport(&self.rpc_url, e))
    }

    /// Submit a signed raw transaction; returns its hash without waiting
    /// for inclusion.
    pub async fn broadcast(&self, raw: Bytes) -> SwapResult<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| SwapError::transport(&self.rpc_url, e))?;
        Ok(pending.tx_hash())
    }

    /// Poll for the receipt of `hash`, up to `attempts` polls spaced
    /// `poll_secs` apart.
    pub async fn wait_for_receipt(
        &self,
        hash: TxHash,
        poll_secs: u64,
        attempts: u32,
    ) -> SwapResult<TransactionReceipt> {
        for attempt in 0..attempts {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| SwapError::transport(&self.rpc_url, e))?
            {
                return Ok(receipt);
            }
            debug!(
                "Receipt for {hash:?} not yet available (attempt {}/{attempts})",
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(poll_secs)).await;
        }
        Err(SwapError::Timeout {
            operation: format!("receipt for {hash:?}"),
        })
    }
}
