use chain_btc::BtcError;
use charms::SpellError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(#[source] BtcError),

    #[error("Transaction failed: {0}")]
    Transaction(BtcError),

    #[error("Spell rejected: {0}")]
    Spell(SpellError),

    #[error("No confirmed UTXO available to fund the transfer")]
    NoFundingUtxo,

    #[error("Failed to decode commit transaction: {0}")]
    CommitDecodeFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Collaborator returned HTTP {status}: {body}")]
    Collaborator { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<BtcError> for WalletError {
    fn from(e: BtcError) -> Self {
        match e {
            BtcError::InvalidPrivateKeyFormat(_)
            | BtcError::InvalidPrivateKeyLength(_)
            | BtcError::InvalidPrivateKey(_) => WalletError::InvalidPrivateKey(e),
            other => WalletError::Transaction(other),
        }
    }
}

impl From<SpellError> for WalletError {
    fn from(e: SpellError) -> Self {
        WalletError::Spell(e)
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        WalletError::Network(e.to_string())
    }
}

impl From<toml::de::Error> for WalletError {
    fn from(e: toml::de::Error) -> Self {
        WalletError::Config(e.to_string())
    }
}
