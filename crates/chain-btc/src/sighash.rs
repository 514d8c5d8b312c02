//! Pre-signature digests.
//!
//! These are not BIP143 or BIP341 sighashes. The generic digest is a double
//! SHA-256 over the unsigned transaction bytes; the spell digest additionally
//! commits to the spent commit output.

use crypto_utils::hash::sha256d;

use crate::codec::RawTransaction;
use crate::error::BtcError;
use crate::transaction::CommitTxInfo;
use crate::witness::SpendPath;

/// `sha256d(unsigned tx bytes)`.
pub fn generic_digest(tx: &RawTransaction) -> [u8; 32] {
    sha256d(&tx.to_bytes())
}

/// `sha256d(tx bytes || commit txid || vout BE || commit scriptPubKey || value BE)`.
///
/// The commit txid is taken in the byte order of its hex string, not
/// reversed. Non-hex characters in it are ignored.
pub fn spell_digest(tx: &RawTransaction, commit: &CommitTxInfo) -> Result<[u8; 32], BtcError> {
    let txid_hex: String = commit.txid.chars().filter(char::is_ascii_hexdigit).collect();
    let txid = hex::decode(&txid_hex)
        .map_err(|e| BtcError::InvalidHex(format!("commit txid: {e}")))?;

    let mut preimage = tx.to_bytes();
    preimage.reserve(txid.len() + 4 + commit.script_pubkey.len() + 8);
    preimage.extend_from_slice(&txid);
    preimage.extend_from_slice(&commit.vout.to_be_bytes());
    preimage.extend_from_slice(&commit.script_pubkey);
    preimage.extend_from_slice(&commit.value.to_be_bytes());

    Ok(sha256d(&preimage))
}

/// Message handed to the Schnorr signer: `digest || sighash byte`.
pub fn taproot_message(digest: &[u8; 32], path: SpendPath) -> [u8; 33] {
    let mut message = [0u8; 33];
    message[..32].copy_from_slice(digest);
    message[32] = path.sighash_byte();
    message
}
