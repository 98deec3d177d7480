//! Raw transaction engines for both chains
//!
//! Signing happens externally, one signature share at a time, so these
//! modules build unsigned transactions, expose the exact digests the oracle
//! is asked to sign, and re-assemble broadcastable bytes from raw signature
//! components.

pub mod btc;
pub mod evm;
pub mod signature;
