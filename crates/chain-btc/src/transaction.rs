use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::{parse_address, script_pubkey_for_address};
use crate::codec::{RawTransaction, TxInput, TxOutput};
use crate::error::BtcError;
use crate::keys::{ecdsa_sign, schnorr_sign, KeyPair, PrivateKey};
use crate::network::BtcNetwork;
use crate::sighash::{generic_digest, spell_digest, taproot_message};
use crate::utxo::{estimate_fee, select_funding, Utxo, UtxoMap};
use crate::witness::{apply_unlock, build_unlock, ensure_single_input, ScriptPathData, SpendPath};

/// Change at or below this many satoshis is added to the fee instead of
/// creating an output.
pub const DUST_THRESHOLD: u64 = 546;

/// Transaction version used for every transaction this crate builds.
pub const TX_VERSION: u32 = 2;

/// The commit output a spell transaction spends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTxInfo {
    /// Commit txid as produced by the commit signing step.
    pub txid: String,
    /// Always 0: the commit transaction creates a single spendable output.
    pub vout: u32,
    #[serde(with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
    /// Output value in satoshis.
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<ScriptPathData>,
}

/// What to sign and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub path: SpendPath,
    /// Inputs to sign. Only `[0]` is supported.
    pub input_indices: Vec<usize>,
    pub script_path: Option<ScriptPathData>,
    /// When present, the spell digest over this commit output is signed
    /// instead of the generic digest.
    pub commit: Option<CommitTxInfo>,
}

impl SignRequest {
    pub fn new(path: SpendPath) -> Self {
        Self {
            path,
            input_indices: vec![0],
            script_path: None,
            commit: None,
        }
    }

    pub fn with_inputs(mut self, input_indices: Vec<usize>) -> Self {
        self.input_indices = input_indices;
        self
    }

    pub fn with_script_path(mut self, script_path: ScriptPathData) -> Self {
        self.script_path = Some(script_path);
        self
    }

    pub fn with_commit(mut self, commit: CommitTxInfo) -> Self {
        self.commit = Some(commit);
        self
    }
}

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Final serialized transaction.
    pub hex: String,
    /// The digest that was signed.
    pub hash: String,
    /// Bare signature, without the sighash byte.
    pub signature: String,
    pub txid: String,
}

/// Sign input 0 of `tx_hex` along `request.path`.
pub fn sign_transaction(
    tx_hex: &str,
    private_key: &PrivateKey,
    request: &SignRequest,
) -> Result<SignedTransaction, BtcError> {
    ensure_single_input(&request.input_indices)?;

    let tx = RawTransaction::from_hex(tx_hex)?;
    let digest = match &request.commit {
        Some(commit) => spell_digest(&tx, commit)?,
        None => generic_digest(&tx),
    };
    debug!(path = ?request.path, digest = %hex::encode(digest), "computed pre-signature digest");

    let signature = if request.path.is_taproot() {
        let message = taproot_message(&digest, request.path);
        schnorr_sign(&message, private_key.as_bytes())?.to_vec()
    } else {
        ecdsa_sign(&digest, private_key)?
    };

    let key_pair = KeyPair::from_private_key(private_key.clone())?;
    let script_path = request
        .script_path
        .as_ref()
        .or_else(|| request.commit.as_ref().and_then(|c| c.script_path.as_ref()));
    let unlock = build_unlock(
        request.path,
        &signature,
        Some(key_pair.public_key().as_slice()),
        script_path,
    )?;

    let signed = apply_unlock(&tx, &unlock)?;
    let txid = signed.txid();
    info!(path = ?request.path, %txid, "signed transaction");

    Ok(SignedTransaction {
        hex: signed.to_hex(),
        hash: hex::encode(digest),
        signature: hex::encode(signature),
        txid,
    })
}

/// Sign a commit transaction along the Taproot key path.
pub fn sign_commit_transaction(
    tx_hex: &str,
    private_key: &PrivateKey,
) -> Result<SignedTransaction, BtcError> {
    sign_transaction(tx_hex, private_key, &SignRequest::new(SpendPath::TaprootKeyPath))
}

/// Sign a spell transaction along the Taproot script path, committing to
/// the commit output it spends.
pub fn sign_spell_transaction(
    tx_hex: &str,
    commit: &CommitTxInfo,
    private_key: &PrivateKey,
) -> Result<SignedTransaction, BtcError> {
    if commit.script_path.is_none() {
        return Err(BtcError::MissingScriptPathData(
            "a tapscript and control block",
        ));
    }
    let request = SignRequest::new(SpendPath::TaprootScriptPath).with_commit(commit.clone());
    sign_transaction(tx_hex, private_key, &request)
}

/// A plain value transfer to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub recipient: String,
    /// Amount in satoshis.
    pub amount: u64,
    pub fee_rate_sat_vbyte: u64,
    pub network: BtcNetwork,
}

/// An unsigned transfer and the funding decisions behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub tx: RawTransaction,
    pub funding_address: String,
    pub inputs: Vec<Utxo>,
    /// Fee in satoshis, including any folded-in dust change.
    pub fee: u64,
    /// Change returned to the funding address, if any.
    pub change: Option<u64>,
}

/// Build an unsigned transfer.
///
/// The funding address is chosen against a fee estimated for one input and
/// two outputs. The fee is then recomputed for the actual input count; change
/// above [`DUST_THRESHOLD`] goes back to the funding address, smaller change
/// is added to the fee.
pub fn build_transfer(
    request: &TransferRequest,
    utxos: &UtxoMap,
) -> Result<TransferPlan, BtcError> {
    parse_address(&request.recipient, request.network)?;
    if request.amount == 0 {
        return Err(BtcError::TransactionBuildError(
            "transfer amount must be positive".into(),
        ));
    }

    let initial_fee = estimate_fee(1, 2, request.fee_rate_sat_vbyte);
    let selection = select_funding(request.amount, initial_fee, utxos)?;

    let mut fee = estimate_fee(selection.utxos.len(), 2, request.fee_rate_sat_vbyte);
    let required = request.amount.saturating_add(fee);
    if selection.total < required {
        return Err(BtcError::InsufficientBalance {
            required,
            available: selection.total,
            shortfall: required - selection.total,
        });
    }
    let remainder = selection.total - required;

    let mut outputs = vec![TxOutput {
        value: request.amount,
        script_pubkey: script_pubkey_for_address(&request.recipient, request.network)?,
    }];

    let change = if remainder > DUST_THRESHOLD {
        outputs.push(TxOutput {
            value: remainder,
            script_pubkey: script_pubkey_for_address(&selection.address, request.network)?,
        });
        Some(remainder)
    } else {
        fee += remainder;
        None
    };

    let inputs = selection
        .utxos
        .iter()
        .map(|u| TxInput::new(&u.txid, u.vout))
        .collect::<Result<Vec<_>, BtcError>>()?;

    let tx = RawTransaction {
        version: TX_VERSION,
        segwit: false,
        inputs,
        outputs,
        lock_time: 0,
    };

    debug!(
        funding = %selection.address,
        inputs = tx.inputs.len(),
        fee,
        change = ?change,
        "built transfer"
    );

    Ok(TransferPlan {
        tx,
        funding_address: selection.address,
        inputs: selection.utxos,
        fee,
        change,
    })
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim()).map_err(serde::de::Error::custom)
    }
}
