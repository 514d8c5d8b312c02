use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BtcError;

/// Satoshis per coin.
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Per-input size estimate in bytes.
const INPUT_BYTES: u64 = 180;

/// Per-output size estimate in bytes.
const OUTPUT_BYTES: u64 = 34;

/// Fixed transaction overhead in bytes.
const TX_OVERHEAD_BYTES: u64 = 10;

/// Confirmation state as reported by the address index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoStatus {
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_time: Option<u64>,
}

/// A single unspent transaction output (UTXO).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Transaction ID as a hex string (display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub value: u64,
    #[serde(default)]
    pub status: UtxoStatus,
}

impl Utxo {
    /// `txid:vout`, the form used by spells.
    pub fn outpoint(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }
}

/// UTXOs keyed by owning address. Ordered so selection is deterministic.
pub type UtxoMap = BTreeMap<String, Vec<Utxo>>;

/// The funding source chosen for a transfer: one address and all of its
/// confirmed UTXOs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingSelection {
    pub address: String,
    pub utxos: Vec<Utxo>,
    /// Sum of `utxos` in satoshis.
    pub total: u64,
}

/// Estimate a fee as `(inputs*180 + outputs*34 + 10) * fee_rate`.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, fee_rate_sat_vbyte: u64) -> u64 {
    let size =
        num_inputs as u64 * INPUT_BYTES + num_outputs as u64 * OUTPUT_BYTES + TX_OVERHEAD_BYTES;
    size.saturating_mul(fee_rate_sat_vbyte)
}

/// Pick the address whose confirmed balance is the smallest one that still
/// covers `target + fee`.
///
/// Addresses are never mixed. Among equal balances the first address in map
/// order wins.
pub fn select_funding(
    target: u64,
    fee: u64,
    utxos: &UtxoMap,
) -> Result<FundingSelection, BtcError> {
    let required = target.saturating_add(fee);
    let mut best: Option<FundingSelection> = None;
    let mut available = 0u64;

    for (address, entries) in utxos {
        let confirmed: Vec<Utxo> = entries
            .iter()
            .filter(|u| u.status.confirmed)
            .cloned()
            .collect();
        let total = confirmed_balance(&confirmed)
            .ok_or_else(|| BtcError::BalanceOverflow(address.clone()))?;
        available = available.max(total);

        if total < required {
            continue;
        }
        let better = best.as_ref().map_or(true, |b| total < b.total);
        if better {
            best = Some(FundingSelection {
                address: address.clone(),
                utxos: confirmed,
                total,
            });
        }
    }

    match best {
        Some(selection) => {
            debug!(
                address = %selection.address,
                inputs = selection.utxos.len(),
                total = selection.total,
                required,
                "selected funding address"
            );
            Ok(selection)
        }
        None => Err(BtcError::InsufficientBalance {
            required,
            available,
            shortfall: required - available,
        }),
    }
}

/// Sum of confirmed UTXO values, or `None` if the sum does not fit in a `u64`.
pub fn confirmed_balance(utxos: &[Utxo]) -> Option<u64> {
    utxos
        .iter()
        .filter(|u| u.status.confirmed)
        .try_fold(0u64, |acc, u| acc.checked_add(u.value))
}

/// Render satoshis as a coin amount with 8 decimal places.
pub fn format_sats(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}
