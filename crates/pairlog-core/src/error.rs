//! Error types for Pairlog

use thiserror::Error;

use crate::store::StoreError;
use crate::types::UserId;

/// Main error type for Pairlog operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// Local asymmetric key material has not been generated/published yet.
    ///
    /// Retryable: key publication is itself eventually consistent, so a
    /// later attempt may succeed without any local action.
    #[error("Local key pair is not available yet")]
    KeyUnavailable,

    /// The counterparty's public key or log cannot be fetched.
    ///
    /// A user-visible state rather than a fault; retried on every poll tick.
    #[error("Counterparty not connected: {0}")]
    CounterpartyNotConnected(UserId),

    /// Decryption failed (wrong key, corrupted blob, or tampering)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Decrypted bytes do not parse as the expected payload structure
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Transient remote store I/O failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),
}

/// Result type alias using ChatError
pub type ChatResult<T> = Result<T, ChatError>;
