//! Wallet error types.

use tft_core::error::{BackendError, CryptoError, TransactionError, UnlockHashError};
use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// A wallet with this name is already persisted.
    #[error("wallet already exists: {0}")]
    WalletExists(String),

    /// No wallet with this name is persisted.
    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    /// Arbitrary data payload exceeds the protocol maximum.
    #[error("arbitrary data too large: {size} bytes, max {max}")]
    ArbitraryDataTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        max: usize,
    },

    /// Unlocked outputs do not cover the outputs plus the miner fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Unlocked balance in base units.
        have: u64,
        /// Required amount in base units.
        need: u64,
    },

    /// Malformed transfer request (empty or mismatched outputs, zero amount).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// One or more backend calls failed. Lists every failure, one per line.
    #[error("backend: {0}")]
    Backend(String),

    /// Wallet state contradicts itself, e.g. an owned output with no key.
    #[error("internal consistency: {0}")]
    InternalConsistency(String),

    /// Producing a fulfillment for an input failed.
    #[error("signing failure: {0}")]
    SigningFailure(String),

    /// Currency arithmetic overflowed.
    #[error("amount overflow")]
    AmountOverflow,

    /// Key derivation failure.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// Encryption failure.
    #[error("encryption: {0}")]
    Encryption(String),

    /// Decryption failure.
    #[error("decryption: {0}")]
    Decryption(String),

    /// Wrong password for wallet file.
    #[error("invalid password")]
    InvalidPassword,

    /// Wallet file is corrupted or has invalid format.
    #[error("corrupted file: {0}")]
    CorruptedFile(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization error.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    UnlockHash(#[from] UnlockHashError),
}

impl From<BackendError> for WalletError {
    fn from(e: BackendError) -> Self {
        WalletError::Backend(e.to_string())
    }
}

impl From<std::io::Error> for WalletError {
    fn from(e: std::io::Error) -> Self {
        WalletError::Io(e.to_string())
    }
}
