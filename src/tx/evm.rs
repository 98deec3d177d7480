//! Account-chain transaction assembler
//!
//! Builds the unsigned type-2 (fee-market) native transfer, exposes its
//! signing digest, and re-serializes the same field set with an externally
//! supplied (v, r, s) into a broadcastable envelope. This layer does not
//! verify the signature; a sender mismatch is rejected by the chain at
//! validation.

use crate::error::{SwapError, SwapResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, Signature, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Unsigned native-value transfer in wire form.
///
/// This is the typed parameter record handed to the oracle; the oracle and
/// the coordinator both reduce it to the same canonical envelope, so the
/// digest each side computes is bit-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransfer {
    pub to: String,
    /// Decimal wei
    pub value_wei: String,
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    /// Decimal wei
    pub max_fee_per_gas_wei: String,
    /// Decimal wei
    pub max_priority_fee_per_gas_wei: String,
}

impl UnsignedTransfer {
    /// Reduce the wire form to the canonical typed envelope.
    pub fn to_typed(&self) -> SwapResult<TypedTransaction> {
        let to = Address::from_str(&self.to).map_err(|e| SwapError::InvalidAddress {
            address: self.to.clone(),
            message: e.to_string(),
        })?;
        let value = parse_wei(&self.value_wei, "value_wei")?;
        let max_fee = parse_wei(&self.max_fee_per_gas_wei, "max_fee_per_gas_wei")?;
        let priority_fee =
            parse_wei(&self.max_priority_fee_per_gas_wei, "max_priority_fee_per_gas_wei")?;

        let request = Eip1559TransactionRequest::new()
            .to(to)
            .value(value)
            .chain_id(self.chain_id)
            .nonce(self.nonce)
            .gas(self.gas_limit)
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(priority_fee);

        Ok(TypedTransaction::Eip1559(request))
    }
}

fn parse_wei(value: &str, name: &str) -> SwapResult<U256> {
    U256::from_dec_str(value).map_err(|e| SwapError::Encoding(format!("{name}: {e}")))
}

/// Keccak digest of the typed serialization over all fields except the
/// signature; this is the value the oracle signs.
pub fn signing_digest(tx: &TypedTransaction) -> [u8; 32] {
    tx.sighash().0
}

/// Re-serialize the unsigned transaction with the oracle's signature
/// appended per the canonical typed-envelope signature encoding.
pub fn finalize(tx: &TypedTransaction, recid: u8, r_hex: &str, s_hex: &str) -> SwapResult<Bytes> {
    let r = parse_scalar(r_hex, "r")?;
    let s = parse_scalar(s_hex, "s")?;
    let signature = Signature {
        r,
        s,
        v: recid as u64,
    };
    Ok(tx.rlp_signed(&signature))
}

fn parse_scalar(hex_str: &str, name: &str) -> SwapResult<U256> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| SwapError::Encoding(format!("{name} hex: {e}")))?;
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(SwapError::Encoding(format!(
            "{name} must be 1..=32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(U256::from_big_endian(&bytes))
}

/// Account-chain address of the threshold key: keccak-256 over the
/// uncompressed SEC body, low 20 bytes.
pub fn evm_address(public_key_hex: &str) -> SwapResult<Address> {
    let key_hex = public_key_hex.trim_start_matches("0x");
    let bytes = hex::decode(key_hex).map_err(|e| SwapError::InvalidAddress {
        address: key_hex.to_string(),
        message: e.to_string(),
    })?;
    if bytes.len() != 65 || bytes[0] != 0x04 {
        return Err(SwapError::InvalidAddress {
            address: key_hex.to_string(),
            message: "expected 65-byte uncompressed SEC key".to_string(),
        });
    }
    let hash = keccak256(&bytes[1..]);
    Ok(Address::from_slice(&hash[12..]))
}
