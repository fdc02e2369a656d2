//! Key management error types.

use thiserror::Error;

/// Result type for key management operations.
pub type KeysResult<T> = Result<T, KeysError>;

/// Errors that can occur in key management and sharing operations.
#[derive(Debug, Error)]
pub enum KeysError {
    /// No unlocked identity in the session.
    #[error("session is locked")]
    Locked,

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Unexpected 409 outside the setup reconciliation protocol.
    #[error("server conflict: {0}")]
    ServerConflict(String),

    /// Local and server key identities diverge and cannot be resolved
    /// automatically. The user must adopt the server identity or reset.
    #[error("key identity mismatch between local and server state")]
    MismatchDetected,

    /// Share aborted before any cryptographic work.
    #[error("recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("share grant has expired")]
    GrantExpired,

    #[error("share grant was revoked")]
    GrantRevoked,

    /// Single-use grant was already redeemed.
    #[error("share grant was already consumed")]
    GrantConsumed,

    #[error("API request failed: {0}")]
    Api(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] quillvault_crypto::CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
