//! Signature normalizer and finalizer for the UTXO chain
//!
//! The oracle returns raw (r, s) scalars plus the public key; nothing on the
//! signing side encodes them. This module enforces low-S canonical form,
//! DER-encodes the pair, appends the sighash-type byte and injects the
//! resulting spending script into the unsigned transaction.

use crate::error::{SwapError, SwapResult};
use crate::oracle::SignatureShare;

use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::Transaction;

/// secp256k1 group order n, big-endian.
const CURVE_ORDER: [u8; 32] = bitcoin::secp256k1::constants::CURVE_ORDER;

/// n / 2, big-endian. Signatures with s above this are non-canonical and get
/// replaced with n - s before encoding.
const HALF_CURVE_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b,
    0x20, 0xa0,
];

/// Parse a hex scalar into a fixed 32-byte big-endian buffer.
fn parse_scalar(hex_str: &str, name: &str) -> SwapResult<[u8; 32]> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| SwapError::Encoding(format!("{name} hex: {e}")))?;
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(SwapError::Encoding(format!(
            "{name} must be 1..=32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

fn is_high_s(s: &[u8; 32]) -> bool {
    // big-endian byte comparison is numeric comparison
    s > &HALF_CURVE_ORDER
}

/// n - s, big-endian subtraction.
fn order_minus(s: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = CURVE_ORDER[i] as i16 - s[i] as i16 - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out[i] = diff as u8;
    }
    out
}

/// Substitute n - s for any s in the upper half of the curve order.
pub fn normalize_low_s(s: [u8; 32]) -> [u8; 32] {
    if is_high_s(&s) {
        order_minus(&s)
    } else {
        s
    }
}

/// Prefix a zero byte when the high bit is set so the DER integer stays
/// non-negative.
fn ensure_positive(buf: &[u8]) -> Vec<u8> {
    if buf[0] & 0x80 != 0 {
        let mut out = Vec::with_capacity(buf.len() + 1);
        out.push(0x00);
        out.extend_from_slice(buf);
        out
    } else {
        buf.to_vec()
    }
}

/// BIP-66 strict DER encoding of an (r, s) pair already passed through
/// [`ensure_positive`].
fn der_encode(r: &[u8], s: &[u8]) -> SwapResult<Vec<u8>> {
    for (name, v) in [("r", r), ("s", s)] {
        if v.is_empty() {
            return Err(SwapError::Encoding(format!("{name} length is zero")));
        }
        if v.len() > 33 {
            return Err(SwapError::Encoding(format!("{name} length is too long")));
        }
        if v[0] & 0x80 != 0 {
            return Err(SwapError::Encoding(format!("{name} value is negative")));
        }
        if v.len() > 1 && v[0] == 0x00 && v[1] & 0x80 == 0 {
            return Err(SwapError::Encoding(format!("{name} value excessively padded")));
        }
    }

    let mut sig = Vec::with_capacity(6 + r.len() + s.len());
    sig.push(0x30);
    sig.push((4 + r.len() + s.len()) as u8);
    sig.push(0x02);
    sig.push(r.len() as u8);
    sig.extend_from_slice(r);
    sig.push(0x02);
    sig.push(s.len() as u8);
    sig.extend_from_slice(s);
    Ok(sig)
}

/// Turn the unsigned transaction plus the oracle's raw signature into a
/// broadcast-ready transaction.
///
/// The spending script is `DER(r, s) ‖ SIGHASH_ALL ‖ publicKey`. Returns a
/// new transaction; the unsigned input is never partially mutated on
/// failure.
pub fn finalize(unsigned: &Transaction, share: &SignatureShare) -> SwapResult<Transaction> {
    if unsigned.input.is_empty() {
        return Err(SwapError::Encoding("transaction has no inputs".to_string()));
    }

    let r = parse_scalar(&share.r, "r")?;
    let s = normalize_low_s(parse_scalar(&share.s, "s")?);

    let der = der_encode(&ensure_positive(&r), &ensure_positive(&s))?;

    let mut sig_with_hashtype = der;
    sig_with_hashtype.push(EcdsaSighashType::All.to_u32() as u8);

    let public_key = hex::decode(share.public_key.trim_start_matches("0x"))
        .map_err(|e| SwapError::Encoding(format!("public key hex: {e}")))?;

    let sig_push = PushBytesBuf::try_from(sig_with_hashtype)
        .map_err(|e| SwapError::Encoding(format!("signature push: {e}")))?;
    let key_push = PushBytesBuf::try_from(public_key)
        .map_err(|e| SwapError::Encoding(format!("public key push: {e}")))?;

    let script_sig = Builder::new()
        .push_slice(sig_push)
        .push_slice(key_push)
        .into_script();

    let mut finalized = unsigned.clone();
    finalized.input[0].script_sig = script_sig;
    Ok(finalized)
}
