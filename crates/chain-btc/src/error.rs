use thiserror::Error;

/// Bitcoin codec and signing errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("unsupported varint prefix 0x{0:02x}: only 1- and 3-byte forms are decoded")]
    UnsupportedVarInt(u8),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid private key format: {0}")]
    InvalidPrivateKeyFormat(String),

    #[error("invalid private key length: expected 32 bytes, got {0}")]
    InvalidPrivateKeyLength(usize),

    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("script path spend requires {0}")]
    MissingScriptPathData(&'static str),

    #[error("unsupported multi-input signing: {0}")]
    UnsupportedMultiInputSigning(String),

    #[error("insufficient balance: need {required} sat, best address has {available} sat (short {shortfall} sat)")]
    InsufficientBalance {
        required: u64,
        available: u64,
        shortfall: u64,
    },

    #[error("confirmed balance of {0} overflows")]
    BalanceOverflow(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}

impl From<crypto_utils::CryptoError> for BtcError {
    fn from(e: crypto_utils::CryptoError) -> Self {
        match e {
            crypto_utils::CryptoError::InvalidKeyLength { actual, .. } => {
                BtcError::InvalidKeyLength(actual)
            }
        }
    }
}
