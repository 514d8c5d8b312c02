//! Unlocking data for the four supported spend paths, and splicing it into
//! a transaction.

use serde::{Deserialize, Serialize};

use crate::codec::{write_witness, RawTransaction};
use crate::error::BtcError;

/// `SIGHASH_ALL`.
pub const SIGHASH_ALL: u8 = 0x01;

/// `SIGHASH_ALL | SIGHASH_ANYONECANPAY`, used for script-path spends.
pub const SIGHASH_ALL_ANYONECANPAY: u8 = 0x81;

/// Largest push that fits in a single direct-length opcode.
const MAX_DIRECT_PUSH: usize = 0x4b;
const OP_PUSHDATA1: u8 = 0x4c;

/// How an input is unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendPath {
    LegacyP2pkh,
    SegwitP2wpkh,
    TaprootKeyPath,
    TaprootScriptPath,
}

impl SpendPath {
    pub fn sighash_byte(self) -> u8 {
        match self {
            SpendPath::TaprootScriptPath => SIGHASH_ALL_ANYONECANPAY,
            _ => SIGHASH_ALL,
        }
    }

    /// Taproot paths use Schnorr signatures; the others use ECDSA.
    pub fn is_taproot(self) -> bool {
        matches!(self, SpendPath::TaprootKeyPath | SpendPath::TaprootScriptPath)
    }

    pub fn uses_witness(self) -> bool {
        !matches!(self, SpendPath::LegacyP2pkh)
    }
}

/// Revealed tapscript and control block, as hex from the spell composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptPathData {
    pub script: String,
    pub control_block: String,
}

impl ScriptPathData {
    pub fn new(script: impl Into<String>, control_block: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            control_block: control_block.into(),
        }
    }

    /// Decoded `(script, control_block)` bytes. Non-hex characters are
    /// stripped first.
    pub fn decode(&self) -> Result<(Vec<u8>, Vec<u8>), BtcError> {
        let script = sanitized_hex(&self.script, "a tapscript")?;
        let control_block = sanitized_hex(&self.control_block, "a control block")?;
        Ok((script, control_block))
    }
}

fn sanitized_hex(input: &str, what: &'static str) -> Result<Vec<u8>, BtcError> {
    let cleaned: String = input.chars().filter(char::is_ascii_hexdigit).collect();
    if cleaned.is_empty() {
        return Err(BtcError::MissingScriptPathData(what));
    }
    hex::decode(&cleaned).map_err(|e| BtcError::InvalidHex(format!("{what}: {e}")))
}

/// Unlocking data for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unlock {
    ScriptSig(Vec<u8>),
    Witness(Vec<Vec<u8>>),
}

impl Unlock {
    /// Serialized form: raw scriptSig bytes, or a witness stack with its item
    /// count and length-prefixed items.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Unlock::ScriptSig(script) => script.clone(),
            Unlock::Witness(stack) => {
                let mut buf = Vec::new();
                write_witness(&mut buf, stack);
                buf
            }
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

/// Build the unlocking data for `path`.
///
/// `signature` is the bare signature (DER for ECDSA paths, 64 bytes for
/// Schnorr); the sighash byte is appended here. `public_key` is required for
/// the ECDSA paths and `script_path` for script-path spends.
pub fn build_unlock(
    path: SpendPath,
    signature: &[u8],
    public_key: Option<&[u8]>,
    script_path: Option<&ScriptPathData>,
) -> Result<Unlock, BtcError> {
    let mut sig = Vec::with_capacity(signature.len() + 1);
    sig.extend_from_slice(signature);
    sig.push(path.sighash_byte());

    match path {
        SpendPath::LegacyP2pkh => {
            let pubkey = require_public_key(public_key)?;
            let mut script = Vec::with_capacity(sig.len() + pubkey.len() + 2);
            push_data(&mut script, &sig);
            push_data(&mut script, pubkey);
            Ok(Unlock::ScriptSig(script))
        }
        SpendPath::SegwitP2wpkh => {
            let pubkey = require_public_key(public_key)?;
            Ok(Unlock::Witness(vec![sig, pubkey.to_vec()]))
        }
        SpendPath::TaprootKeyPath => Ok(Unlock::Witness(vec![sig])),
        SpendPath::TaprootScriptPath => {
            let data = script_path.ok_or(BtcError::MissingScriptPathData(
                "a tapscript and control block",
            ))?;
            let (script, control_block) = data.decode()?;
            Ok(Unlock::Witness(vec![sig, script, control_block]))
        }
    }
}

fn require_public_key(public_key: Option<&[u8]>) -> Result<&[u8], BtcError> {
    match public_key {
        Some(pk) if pk.len() == 33 => Ok(pk),
        Some(pk) => Err(BtcError::InvalidPublicKey(format!(
            "expected 33-byte compressed key, got {} bytes",
            pk.len()
        ))),
        None => Err(BtcError::InvalidPublicKey("public key required".into())),
    }
}

/// Minimal data push for a scriptSig.
fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    if data.len() <= MAX_DIRECT_PUSH {
        script.push(data.len() as u8);
    } else {
        script.push(OP_PUSHDATA1);
        script.push(data.len() as u8);
    }
    script.extend_from_slice(data);
}

/// Check that only input 0 is being signed.
pub fn ensure_single_input(input_indices: &[usize]) -> Result<(), BtcError> {
    if input_indices == [0] {
        Ok(())
    } else {
        Err(BtcError::UnsupportedMultiInputSigning(format!(
            "only input 0 can be signed, requested {input_indices:?}"
        )))
    }
}

/// Splice `unlock` into input 0 of `tx`.
///
/// Every other input is left with an empty scriptSig and an empty witness.
/// Outputs and locktime are untouched. Witness unlocks switch the
/// transaction to the SegWit serialization; a scriptSig unlock switches it
/// back to legacy.
pub fn apply_unlock(tx: &RawTransaction, unlock: &Unlock) -> Result<RawTransaction, BtcError> {
    if tx.inputs.is_empty() {
        return Err(BtcError::TransactionBuildError(
            "transaction has no inputs to sign".into(),
        ));
    }

    let mut signed = tx.clone();
    for input in signed.inputs.iter_mut() {
        input.script_sig.clear();
        input.witness.clear();
    }

    match unlock {
        Unlock::ScriptSig(script) => {
            signed.segwit = false;
            signed.inputs[0].script_sig = script.clone();
        }
        Unlock::Witness(stack) => {
            signed.segwit = true;
            signed.inputs[0].witness = stack.clone();
        }
    }

    Ok(signed)
}
