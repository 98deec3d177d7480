//! Error types for the swap coordinator

use thiserror::Error;

/// Main error type for swap coordination
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Swap conditions not met")]
    PredicateUnmet,

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Oracle signed digest {digest} that matches no prepared candidate")]
    DigestMismatch { digest: String },

    #[error("Transport error against {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Pinned UTXO {txid}:{vout} no longer resolvable")]
    StaleUtxo { txid: String, vout: u32 },

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Invalid address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwapError {
    /// Errors the engine may retry on a later cycle: chain state and
    /// transport conditions change over time, signature material does not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwapError::PredicateUnmet
                | SwapError::Transport { .. }
                | SwapError::Timeout { .. }
                | SwapError::StaleUtxo { .. }
        )
    }

    /// Errors that must abort the swap without broadcasting anything.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SwapError::DigestMismatch { .. } | SwapError::Encoding(_) | SwapError::Config(_)
        )
    }

    /// Shorthand for transport failures carrying the endpoint that failed.
    pub fn transport(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        SwapError::Transport {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for coordinator operations
pub type SwapResult<T> = Result<T, SwapError>;
