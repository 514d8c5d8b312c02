//! Two-phase signing of a charm transfer.
//!
//! The commit transaction is signed first along the Taproot key path. Its
//! first output, together with the txid produced by that signing step, is
//! what the spell transaction then spends along the Taproot script path.

use std::fmt;

use chain_btc::keys::PrivateKey;
use chain_btc::transaction::{sign_commit_transaction, sign_spell_transaction};
use chain_btc::witness::ScriptPathData;
use chain_btc::{CommitTxInfo, RawTransaction, SignedTransaction};
use tracing::{debug, info};

use crate::error::WalletError;
use crate::types::{ComposedTransfer, SignedPair};

/// Progress of a charm transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransferStage {
    Start,
    CommitSigned,
    CommitDecoded,
    SpellSigned,
    Done,
    /// Reported by the wallet service once the commit transaction is accepted.
    CommitBroadcast,
    /// Reported by the wallet service once the spell transaction is accepted.
    SpellBroadcast,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferStage::Start => "start",
            TransferStage::CommitSigned => "commit signed",
            TransferStage::CommitDecoded => "commit decoded",
            TransferStage::SpellSigned => "spell signed",
            TransferStage::Done => "done",
            TransferStage::CommitBroadcast => "commit broadcast",
            TransferStage::SpellBroadcast => "spell broadcast",
        };
        f.write_str(label)
    }
}

/// Receives progress messages as a transfer advances.
pub trait ProgressSink {
    fn report(&mut self, stage: TransferStage, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(TransferStage, &str),
{
    fn report(&mut self, stage: TransferStage, message: &str) {
        self(stage, message)
    }
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _stage: TransferStage, _message: &str) {}
}

/// Signs the two halves of a charm transfer.
pub trait TransactionSigner {
    fn sign_commit(&self, tx_hex: &str, key: &PrivateKey) -> Result<SignedTransaction, WalletError>;

    fn sign_spell(
        &self,
        tx_hex: &str,
        commit: &CommitTxInfo,
        key: &PrivateKey,
    ) -> Result<SignedTransaction, WalletError>;
}

/// Signs in-process with the chain-btc engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSigner;

impl TransactionSigner for LocalSigner {
    fn sign_commit(
        &self,
        tx_hex: &str,
        key: &PrivateKey,
    ) -> Result<SignedTransaction, WalletError> {
        Ok(sign_commit_transaction(tx_hex, key)?)
    }

    fn sign_spell(
        &self,
        tx_hex: &str,
        commit: &CommitTxInfo,
        key: &PrivateKey,
    ) -> Result<SignedTransaction, WalletError> {
        Ok(sign_spell_transaction(tx_hex, commit, key)?)
    }
}

/// Decode a transaction for display or inspection. `None` if it does not
/// parse.
pub fn decode_transaction(tx_hex: &str) -> Option<RawTransaction> {
    match RawTransaction::from_hex(tx_hex) {
        Ok(tx) => Some(tx),
        Err(e) => {
            debug!("transaction did not decode: {e}");
            None
        }
    }
}

/// Sign both transactions of `transfer` with the local signer.
pub fn sign_both_transactions(
    transfer: &ComposedTransfer,
    key: &PrivateKey,
    progress: &mut impl ProgressSink,
) -> Result<SignedPair, WalletError> {
    sign_both_with(&LocalSigner, transfer, key, progress)
}

/// Sign the commit transaction, then the spell transaction spending its
/// first output. Any failure aborts the sequence.
pub fn sign_both_with<S: TransactionSigner>(
    signer: &S,
    transfer: &ComposedTransfer,
    key: &PrivateKey,
    progress: &mut impl ProgressSink,
) -> Result<SignedPair, WalletError> {
    let txs = &transfer.transactions;
    progress.report(TransferStage::Start, "Signing commit transaction...");

    let signed_commit_tx = signer.sign_commit(&txs.commit_tx, key)?;
    progress.report(
        TransferStage::CommitSigned,
        &format!("Commit transaction signed: {}", signed_commit_tx.txid),
    );

    let commit_tx = RawTransaction::from_hex(&txs.commit_tx)
        .map_err(|e| WalletError::CommitDecodeFailed(e.to_string()))?;
    let first_output = commit_tx
        .outputs
        .first()
        .ok_or_else(|| {
            WalletError::CommitDecodeFailed("commit transaction has no outputs".into())
        })?;
    progress.report(TransferStage::CommitDecoded, "Decoded commit transaction");

    let commit_info = CommitTxInfo {
        txid: signed_commit_tx.txid.clone(),
        vout: 0,
        script_pubkey: first_output.script_pubkey.clone(),
        value: first_output.value,
        script_path: Some(ScriptPathData::new(
            transfer.taproot_data.script.clone(),
            transfer.taproot_data.control_block.clone(),
        )),
    };

    let signed_spell_tx = signer.sign_spell(&txs.spell_tx, &commit_info, key)?;
    progress.report(
        TransferStage::SpellSigned,
        &format!("Spell transaction signed: {}", signed_spell_tx.txid),
    );

    info!(
        commit = %signed_commit_tx.txid,
        spell = %signed_spell_tx.txid,
        "signed charm transfer"
    );
    progress.report(TransferStage::Done, "Both transactions signed");

    Ok(SignedPair {
        signed_commit_tx,
        signed_spell_tx,
    })
}
