use chain_btc::SignedTransaction;
use serde::{Deserialize, Serialize};

/// Unsigned commit and spell transactions from the spell composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTxPair {
    pub commit_tx: String,
    pub spell_tx: String,
}

/// Tapscript and control block revealed by the spell transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaprootData {
    pub script: String,
    pub control_block: String,
}

/// Spell composer response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedTransfer {
    pub transactions: RawTxPair,
    pub taproot_data: TaprootData,
}

/// Spell composer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProveSpellRequest {
    pub destination_address: String,
    pub transfer_amount: u64,
    pub spell_json: String,
    pub funding_utxo_id: String,
}

/// Both halves of a charm transfer, signed, in broadcast order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPair {
    pub signed_commit_tx: SignedTransaction,
    pub signed_spell_tx: SignedTransaction,
}

/// Broadcaster acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReceipt {
    pub txid: String,
    /// Equivalent `bitcoin-cli` invocation, when the broadcaster reports one.
    #[serde(default)]
    pub command: Option<String>,
}

/// Outcome of a plain value transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransfer {
    pub txid: String,
    pub funding_address: String,
    pub fee: u64,
    pub change: Option<u64>,
    pub explorer_link: String,
}

/// Outcome of a charm transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharmTransferReceipt {
    pub commit: BroadcastReceipt,
    pub spell: BroadcastReceipt,
    pub commit_link: String,
    pub spell_link: String,
}

/// The addresses a single key controls on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddresses {
    pub p2pkh: String,
    pub p2wpkh: String,
    pub p2tr: String,
}
