//! Chain access module
//!
//! One client per ledger: an esplora-style explorer client for the UTXO
//! chain and a JSON-RPC wrapper for the account chain. Both are single
//! best-effort transports; timeouts and retries belong to the caller's
//! environment, not here.

pub mod btc;
pub mod evm;

pub use btc::{BtcExplorer, Utxo};
pub use evm::EvmRpc;
