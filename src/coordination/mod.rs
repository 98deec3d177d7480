//! Swap orchestration module
//!
//! Owns the swap for its lifetime: candidate preparation on both chains,
//! submission to the signing oracle, and settlement of whichever partial
//! signature set comes back.

pub mod engine;
pub mod intent;

pub use engine::{SettlementPlan, SettlementReport, SwapEngine};
pub use intent::{SwapIntent, SwapMaterials};
