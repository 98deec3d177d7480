//! UTXO-chain explorer client
//!
//! Speaks the esplora HTTP API: unspent outputs per address, transaction
//! lookup for previous-output scripts, and raw-hex broadcast.

use crate::error::{SwapError, SwapResult};

use bitcoin::{Address, ScriptBuf};
use serde::{Deserialize, Serialize};

/// An unspent output as the explorer reports it.
///
/// `txid` is the display (wire) form; the transaction codec reverses it
/// into internal byte order when referencing the outpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
}

#[derive(Debug, Deserialize)]
struct TxInfo {
    vout: Vec<PrevOut>,
}

#[derive(Debug, Deserialize)]
struct PrevOut {
    scriptpubkey: String,
}

/// Esplora-style explorer backend
pub struct BtcExplorer {
    client: reqwest::Client,
    base_url: String,
}

impl BtcExplorer {
    /// Creates a client for `base_url`, e.g. `https://blockstream.info/testnet/api`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Unspent outputs at `address`, in the explorer's listing order. The
    /// caller treats the first entry as canonical when pinning.
    pub async fn utxos(&self, address: &Address) -> SwapResult<Vec<Utxo>> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SwapError::transport(&url, e))?
            .error_for_status()
            .map_err(|e| SwapError::transport(&url, e))?;
        response
            .json::<Vec<Utxo>>()
            .await
            .map_err(|e| SwapError::transport(&url, e))
    }

    /// Locking script of output `vout` of transaction `txid`.
    pub async fn script_pubkey(&self, txid: &str, vout: u32) -> SwapResult<ScriptBuf> {
        let url = format!("{}/tx/{}", self.base_url, txid);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SwapError::transport(&url, e))?
            .error_for_status()
            .map_err(|e| SwapError::transport(&url, e))?;
        let info = response
            .json::<TxInfo>()
            .await
            .map_err(|e| SwapError::transport(&url, e))?;
        extract_script(&info, txid, vout)
    }

    /// Broadcast a raw transaction; returns the accepted txid.
    pub async fn broadcast(&self, tx_hex: &str) -> SwapResult<String> {
        let url = format!("{}/tx", self.base_url);
        let response = self
            .client
            .post(&url)
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(|e| SwapError::transport(&url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SwapError::transport(&url, e))?;
        if !status.is_success() {
            return Err(SwapError::Transport {
                endpoint: url,
                message: format!("broadcast rejected ({status}): {body}"),
            });
        }
        Ok(body.trim().to_string())
    }
}

fn extract_script(info: &TxInfo, txid: &str, vout: u32) -> SwapResult<ScriptBuf> {
    let output = info
        .vout
        .get(vout as usize)
        .ok_or_else(|| SwapError::StaleUtxo {
            txid: txid.to_string(),
            vout,
        })?;
    let bytes = hex::decode(&output.scriptpubkey)
        .map_err(|e| SwapError::Encoding(format!("scriptpubkey hex: {e}")))?;
    Ok(ScriptBuf::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utxo_listing_deserializes_explorer_shape() {
        let body = r#"[
            {"txid":"4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b","vout":0,"status":{"confirmed":true},"value":20000},
            {"txid":"9b0fc92260312ce44e74ef369f5c66bbb85848f2eddd5a7a1cde251e54ccfdd5","vout":1,"status":{"confirmed":false},"value":555}
        ]"#;
        let utxos: Vec<Utxo> = serde_json::from_str(body).unwrap();
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].vout, 0);
        assert_eq!(utxos[0].value, 20_000);
    }

    #[test]
    fn test_extract_script_and_stale_vout() {
        let info: TxInfo = serde_json::from_str(
            r#"{"vout":[{"scriptpubkey":"76a91412ab8dc588ca9d5787dde7eb29569da63c3a238c88ac"}]}"#,
        )
        .unwrap();

        let script = extract_script(&info, "aa", 0).unwrap();
        assert!(script.is_p2pkh());

        let err = extract_script(&info, "aa", 1).unwrap_err();
        assert!(matches!(err, SwapError::StaleUtxo { vout: 1, .. }));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let explorer = BtcExplorer::new("https://blockstream.info/testnet/api/");
        assert_eq!(explorer.base_url(), "https://blockstream.info/testnet/api");
    }
}
