//! Legacy transaction codec for the UTXO chain
//!
//! Builds the unsigned single-input, up-to-two-output transaction that the
//! oracle's signature will later be injected into, and computes the legacy
//! signature digest over the *previous* output's locking script. The digest
//! is what the oracle signs blindly; any deviation here desynchronizes the
//! oracle and the coordinator.

use crate::chain::btc::Utxo;
use crate::error::{SwapError, SwapResult};

use bitcoin::absolute::LockTime;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, PublicKey, Script, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};
use std::str::FromStr;

/// Base transaction overhead: version, locktime, input/output counts
const BASE_SIZE: usize = 10;
/// P2PKH input size
const INPUT_SIZE: usize = 148;
/// P2PKH output size
const OUTPUT_SIZE: usize = 34;

/// Estimated serialized size of a P2PKH transaction in bytes.
///
/// This is a size-table estimate, not an encode-then-measure pass; the
/// resulting fee error margin is accepted.
pub fn estimate_size(num_inputs: usize, num_outputs: usize) -> usize {
    BASE_SIZE + num_inputs * INPUT_SIZE + num_outputs * OUTPUT_SIZE
}

/// Fee in satoshis for the estimated size at `fee_rate` sat/byte.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, fee_rate: u64) -> u64 {
    estimate_size(num_inputs, num_outputs) as u64 * fee_rate
}

/// Build the unsigned spend of `utxo`.
///
/// Reserves `swap_sats` for `recipient` and returns the remainder minus the
/// 1-in/2-out fee estimate to `change_to`. The change output is emitted only
/// when that remainder is positive; otherwise the transaction carries the
/// single recipient output.
pub fn build_unsigned(
    utxo: &Utxo,
    recipient: &Address,
    change_to: &Address,
    swap_sats: u64,
    fee_rate: u64,
) -> SwapResult<Transaction> {
    let txid = Txid::from_str(&utxo.txid)
        .map_err(|e| SwapError::Encoding(format!("funding txid: {e}")))?;

    let fee = estimate_fee(1, 2, fee_rate);
    let change = utxo.value as i128 - swap_sats as i128 - fee as i128;

    let input = TxIn {
        previous_output: OutPoint {
            txid,
            vout: utxo.vout,
        },
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::default(),
    };

    let mut output = vec![TxOut {
        value: Amount::from_sat(swap_sats),
        script_pubkey: recipient.script_pubkey(),
    }];
    if change > 0 {
        output.push(TxOut {
            value: Amount::from_sat(change as u64),
            script_pubkey: change_to.script_pubkey(),
        });
    }

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![input],
        output,
    })
}

/// Consensus-serialize a transaction to raw bytes.
pub fn serialize(tx: &Transaction) -> Vec<u8> {
    bitcoin::consensus::encode::serialize(tx)
}

/// Decode a transaction from raw hex.
pub fn deserialize_hex(tx_hex: &str) -> SwapResult<Transaction> {
    let bytes =
        hex::decode(tx_hex).map_err(|e| SwapError::Encoding(format!("transaction hex: {e}")))?;
    bitcoin::consensus::encode::deserialize(&bytes)
        .map_err(|e| SwapError::Encoding(format!("transaction bytes: {e}")))
}

/// Legacy SIGHASH_ALL digest for `input_index`, committed to the previous
/// output's locking script.
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    prev_script: &Script,
) -> SwapResult<[u8; 32]> {
    use bitcoin::hashes::Hash;

    let cache = SighashCache::new(tx);
    let sighash = cache
        .legacy_signature_hash(input_index, prev_script, EcdsaSighashType::All.to_u32())
        .map_err(|e| SwapError::Encoding(format!("sighash: {e}")))?;
    Ok(sighash.to_byte_array())
}

/// P2PKH funding address for the threshold public key.
pub fn p2pkh_address(public_key_hex: &str, network: Network) -> SwapResult<Address> {
    let key_hex = public_key_hex.trim_start_matches("0x");
    let public_key = PublicKey::from_str(key_hex).map_err(|e| SwapError::InvalidAddress {
        address: key_hex.to_string(),
        message: e.to_string(),
    })?;
    Ok(Address::p2pkh(&public_key, network))
}

/// Parse and network-check a UTXO-chain address.
pub fn parse_address(address: &str, network: Network) -> SwapResult<Address> {
    Address::from_str(address)
        .map_err(|e| SwapError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })?
        .require_network(network)
        .map_err(|e| SwapError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })
}
