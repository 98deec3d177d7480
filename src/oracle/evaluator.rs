//! Condition evaluator and outcome state machine
//!
//! This is the decision core every quorum member runs: a pure function from
//! observed chain state to one of five mutually exclusive release/clawback
//! paths. Members see the same parameter record, so identical inputs must
//! reproduce identical outcomes; nothing here reads ambient state.
//!
//! The published build of this module lives in a content-addressed registry
//! and is referenced by its identifier in [`crate::oracle::EvaluationRequest`].

use crate::chain::btc::Utxo;

use chrono::{DateTime, Duration, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Raw predicate inputs, fixed when the swap is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConditions {
    /// Balance the counterparty must have funded, decimal wei
    pub evm_min_balance_wei: String,
    pub evm_chain_id: u64,
    /// Value the pinned UTXO must carry, satoshis
    pub btc_swap_sats: u64,
    pub origin_time: DateTime<Utc>,
    pub deadline_days: i64,
}

/// One evaluation's observed predicate results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionReport {
    pub evm_condition_pass: bool,
    pub btc_condition_pass: bool,
    pub deadline_passed: bool,
}

/// The five mutually exclusive paths. Never persisted; recomputed fresh on
/// each evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Both sides funded: release both success transactions
    FullRelease,
    /// UTXO funded, balance missing, deadline passed: refund both sides
    EvmClawbackAfterDeadline,
    /// UTXO funded, balance missing, still inside the deadline: refund the
    /// UTXO side only
    BtcClawbackOnly,
    /// Balance funded, UTXO missing: refund the account side only
    EvmClawbackOnly,
    /// Nothing to do; reported as "conditions not met"
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtcLeg {
    Success,
    Clawback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmLeg {
    Success,
    Clawback,
}

/// Signature set an outcome authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureSet {
    pub btc: Option<BtcLeg>,
    pub evm: Option<EvmLeg>,
}

impl Outcome {
    /// Which candidate each requested signature applies to.
    pub fn signatures(&self) -> SignatureSet {
        match self {
            Outcome::FullRelease => SignatureSet {
                btc: Some(BtcLeg::Success),
                evm: Some(EvmLeg::Success),
            },
            Outcome::EvmClawbackAfterDeadline => SignatureSet {
                btc: Some(BtcLeg::Clawback),
                evm: Some(EvmLeg::Clawback),
            },
            Outcome::BtcClawbackOnly => SignatureSet {
                btc: Some(BtcLeg::Clawback),
                evm: None,
            },
            Outcome::EvmClawbackOnly => SignatureSet {
                btc: None,
                evm: Some(EvmLeg::Clawback),
            },
            Outcome::NoOp => SignatureSet {
                btc: None,
                evm: None,
            },
        }
    }
}

/// Select the outcome for an observed condition triple. First matching row
/// wins; the rows are mutually exclusive by construction.
pub fn evaluate(report: &ConditionReport) -> Outcome {
    match (
        report.btc_condition_pass,
        report.evm_condition_pass,
        report.deadline_passed,
    ) {
        (true, true, _) => Outcome::FullRelease,
        (true, false, true) => Outcome::EvmClawbackAfterDeadline,
        (true, false, false) => Outcome::BtcClawbackOnly,
        (false, true, _) => Outcome::EvmClawbackOnly,
        (false, false, _) => Outcome::NoOp,
    }
}

/// Degraded evaluation for a context without UTXO-chain visibility.
///
/// Only the balance predicate is evaluated. A pass authorizes the account
/// clawback and nothing else: without UTXO visibility the evaluator cannot
/// confirm the counterparty's side, so the success leg stays unsignable and
/// the refund to the original funder is the standing default. Note this
/// signs the clawback on a bare balance pass without asking whether a
/// release was due; that asymmetry is intentional and kept as-is.
pub fn evaluate_degraded(evm_condition_pass: bool) -> Outcome {
    if evm_condition_pass {
        Outcome::EvmClawbackOnly
    } else {
        Outcome::NoOp
    }
}

/// Balance predicate: the funded balance meets or exceeds the swap amount.
pub fn evm_condition(balance_wei: U256, min_balance_wei: U256) -> bool {
    balance_wei >= min_balance_wei
}

/// UTXO predicate: an unspent output exists at the funding address, carries
/// at least the swap value, and is the pinned reference outpoint. Pinning
/// keeps a late-arriving different UTXO from silently changing which funds
/// are spent.
pub fn btc_condition(pinned: &Utxo, observed: &[Utxo], swap_sats: u64) -> bool {
    let Some(first) = observed.first() else {
        return false;
    };
    if first.value < swap_sats {
        return false;
    }
    first.txid == pinned.txid && first.vout == pinned.vout
}

/// Deadline predicate: strictly after origin time plus the deadline.
pub fn deadline_passed(origin_time: DateTime<Utc>, deadline_days: i64, now: DateTime<Utc>) -> bool {
    now > origin_time + Duration::days(deadline_days)
}
