//! Error types for the TFT protocol layer.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("unlock hash does not match expected")] UnlockHashMismatch,
    #[error("input index out of bounds: {index} >= {len}")] InputIndexOutOfBounds { index: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnlockHashError {
    #[error("invalid length: {0}")] InvalidLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
    #[error("unknown unlock type: {0}")] UnknownType(u8),
    #[error("invalid checksum")] InvalidChecksum,
}

/// Failures reported by a [`ChainBackend`](crate::traits::ChainBackend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached or returned a transport error.
    #[error("backend unavailable: {0}")] Unavailable(String),
    /// The backend answered but refused the request.
    #[error("backend rejected request: {0}")] Rejected(String),
    /// The backend answered with data that could not be decoded.
    #[error("backend response could not be decoded: {0}")] Decode(String),
}
