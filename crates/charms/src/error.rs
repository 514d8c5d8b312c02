use thiserror::Error;

/// Spell construction and validation errors.
#[derive(Debug, Error)]
pub enum SpellError {
    #[error("unsupported spell version {0}")]
    UnsupportedVersion(u32),

    #[error("spell has no inputs")]
    EmptyInputs,

    #[error("spell has no outputs")]
    EmptyOutputs,

    #[error("charm key {0} is not declared in apps")]
    UndeclaredApp(String),

    #[error("malformed app {0:?}: expected tag/id/vk")]
    MalformedApp(String),

    #[error("malformed utxo id {0:?}: expected txid:vout")]
    MalformedUtxoId(String),

    #[error("charm {app} is not conserved: {inputs} in, {outputs} out")]
    Imbalanced { app: String, inputs: u64, outputs: u64 },

    #[error("charm {app} amounts overflow")]
    AmountOverflow { app: String },

    #[error("insufficient charm amount: holding {available}, requested {requested}")]
    InsufficientCharmAmount { available: u64, requested: u64 },

    #[error("transfer amount must be positive")]
    ZeroAmount,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("spell serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
