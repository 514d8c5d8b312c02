pub mod clients;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod service;
pub mod types;

use chain_btc::address::{pubkey_to_p2pkh_address, pubkey_to_p2wpkh_address, x_only_to_p2tr_address};
use chain_btc::keys::normalize_private_key;
use chain_btc::network::BtcNetwork;
use chain_btc::KeyPair;
use secrecy::{ExposeSecret, SecretString};

use error::WalletError;
use types::{ComposedTransfer, SignedPair, WalletAddresses};

pub use config::WalletConfig;
pub use orchestrator::{
    decode_transaction, sign_both_transactions, NoProgress, ProgressSink, TransferStage,
};
pub use service::{HttpWalletService, WalletService};

// ─── Exposed functions ───────────────────────────────────────────────
// Raw key text arrives as a SecretString and is normalized here, so the
// scalar only ever lives in zeroizing containers.

/// Sign a composed charm transfer with a raw hex or xprv/tprv key.
pub fn sign_transfer(
    transfer: &ComposedTransfer,
    private_key: &SecretString,
    progress: &mut impl ProgressSink,
) -> Result<SignedPair, WalletError> {
    let key = normalize_private_key(private_key.expose_secret())?;
    sign_both_transactions(transfer, &key, progress)
}

/// Derive the P2PKH, P2WPKH and P2TR addresses of a key.
pub fn derive_addresses(
    private_key: &SecretString,
    network: BtcNetwork,
) -> Result<WalletAddresses, WalletError> {
    let key = normalize_private_key(private_key.expose_secret())?;
    let key_pair = KeyPair::from_private_key(key)?;
    Ok(WalletAddresses {
        p2pkh: pubkey_to_p2pkh_address(key_pair.public_key(), network)?,
        p2wpkh: pubkey_to_p2wpkh_address(key_pair.public_key(), network)?,
        p2tr: x_only_to_p2tr_address(key_pair.x_only_public_key(), network)?,
    })
}

/// Generate a fresh key and its addresses. The key is returned as hex.
pub fn generate_key(network: BtcNetwork) -> Result<(SecretString, WalletAddresses), WalletError> {
    let key_pair = KeyPair::generate()?;
    let secret = SecretString::from(key_pair.private_key().to_hex());
    let addresses = derive_addresses(&secret, network)?;
    Ok((secret, addresses))
}
