//! Error types for colored-coin wallets

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColoredCoinError {
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Lineage unresolved for coin {0}")]
    LineageUnresolved(String),

    #[error("Conservation violation: {0}")]
    ConservationViolation(String),

    #[error("Trade incomplete: {0}")]
    TradeIncomplete(String),

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    #[error("Invalid spend: {0}")]
    InvalidSpend(String),

    #[error("Unknown color: {0}")]
    UnknownColor(String),

    #[error("Unknown coin: {0}")]
    UnknownCoin(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl From<serde_json::Error> for ColoredCoinError {
    fn from(err: serde_json::Error) -> Self {
        ColoredCoinError::Serialization(err.to_string())
    }
}

impl From<hex::FromHexError> for ColoredCoinError {
    fn from(err: hex::FromHexError) -> Self {
        ColoredCoinError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ColoredCoinError {
    fn from(err: toml::de::Error) -> Self {
        ColoredCoinError::Config(err.to_string())
    }
}

impl From<secp256k1::Error> for ColoredCoinError {
    fn from(err: secp256k1::Error) -> Self {
        ColoredCoinError::Key(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ColoredCoinError>;
