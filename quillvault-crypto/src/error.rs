//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Malformed KDF inputs (bad salt length, zero-cost parameters).
    /// A wrong password never produces this; it derives a different but
    /// well-formed key, caught downstream as an unwrap failure.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// AEAD tag verification failed: tampered data or wrong key.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Wrapped key could not be opened. Wrong password and corrupted
    /// bundle are intentionally indistinguishable here.
    #[error("key unwrap failed: {0}")]
    Unwrap(String),

    /// Item is keyed to a different identity than the caller's.
    #[error("key mismatch: item is owned by {expected}, caller holds {actual}")]
    KeyMismatch { expected: String, actual: String },

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
