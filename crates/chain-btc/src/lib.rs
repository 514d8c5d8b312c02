//! Bitcoin transaction codec and signing engine for the charms wallet.
//!
//! Parses and re-encodes raw transactions, normalizes imported keys, builds
//! unlocking data for the legacy, SegWit and Taproot spend paths, and selects
//! funding outputs under a linear fee model.

pub mod address;
pub mod codec;
pub mod error;
pub mod keys;
pub mod network;
pub mod sighash;
pub mod transaction;
pub mod utxo;
pub mod witness;

pub use codec::{RawTransaction, TxInput, TxOutput};
pub use error::BtcError;
pub use keys::{KeyPair, PrivateKey};
pub use transaction::{CommitTxInfo, SignRequest, SignedTransaction};
pub use witness::{SpendPath, Unlock};
