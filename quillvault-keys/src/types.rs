//! Shared types for key management and sharing.

use crate::error::{KeysError, KeysResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use crypto_box::PublicKey;
use quillvault_crypto::{
    EncryptedData, IdentityKeyPair, KdfParams, PasswordProtectedKey, SealedItemKey,
};
use serde::{Deserialize, Serialize};

/// A user's published key identity: the public key plus the
/// password-wrapped private key and the KDF inputs needed to unwrap it.
///
/// Persisted on the server as the source of truth and cached locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyBundle {
    /// Base64-encoded raw 32-byte X25519 public key.
    pub public_key: String,
    /// Hex SHA-256 fingerprint of the public key, used as the identity token.
    pub public_key_id: String,
    /// Base64-encoded Argon2id salt.
    pub kdf_salt: String,
    pub kdf_params: KdfParams,
    /// Private key encrypted under the password-derived master secret.
    pub wrapped_private_key: EncryptedData,
}

impl KeyBundle {
    /// Builds the publishable bundle from a keypair and its wrapped
    /// private key.
    pub fn from_parts(keypair: &IdentityKeyPair, protected: &PasswordProtectedKey) -> Self {
        Self {
            public_key: STANDARD.encode(keypair.public_bytes()),
            public_key_id: keypair.fingerprint(),
            kdf_salt: STANDARD.encode(protected.kdf_salt),
            kdf_params: protected.kdf_params,
            wrapped_private_key: protected.encrypted.clone(),
        }
    }

    /// Decodes the public key.
    pub fn public_key(&self) -> KeysResult<PublicKey> {
        decode_public_key(&self.public_key)
    }

    /// Reassembles the wrapped private key for unwrapping.
    pub fn protected_key(&self) -> KeysResult<PasswordProtectedKey> {
        let salt_bytes = STANDARD
            .decode(&self.kdf_salt)
            .map_err(|e| KeysError::Api(format!("invalid kdf salt encoding: {e}")))?;
        if salt_bytes.len() != 16 {
            return Err(KeysError::Api(format!(
                "invalid kdf salt length: expected 16, got {}",
                salt_bytes.len()
            )));
        }
        let mut kdf_salt = [0u8; 16];
        kdf_salt.copy_from_slice(&salt_bytes);

        Ok(PasswordProtectedKey {
            kdf_salt,
            kdf_params: self.kdf_params,
            encrypted: self.wrapped_private_key.clone(),
        })
    }
}

/// Decodes a base64 public key, validating its length.
pub fn decode_public_key(encoded: &str) -> KeysResult<PublicKey> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| KeysError::Api(format!("invalid public key encoding: {e}")))?;

    if bytes.len() != 32 {
        return Err(KeysError::Api(format!(
            "invalid public key length: expected 32, got {}",
            bytes.len()
        )));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(PublicKey::from(key))
}

/// The server's view of a user's key identity.
///
/// The key endpoint returns a full bundle for the requesting user and a
/// public-key-only view for other users. Comparisons must match only on
/// `public_key_id` (the field every present variant carries) and never
/// infer divergence from absent optional fields.
#[derive(Clone, Debug)]
pub enum ServerKeyRecord {
    Full(KeyBundle),
    PublicKeyOnly {
        public_key: String,
        public_key_id: String,
    },
    Absent,
}

impl ServerKeyRecord {
    /// The identity fingerprint, if any identity is registered.
    pub fn public_key_id(&self) -> Option<&str> {
        match self {
            Self::Full(bundle) => Some(&bundle.public_key_id),
            Self::PublicKeyOnly { public_key_id, .. } => Some(public_key_id),
            Self::Absent => None,
        }
    }

    /// Decodes the public key, if any identity is registered.
    pub fn public_key(&self) -> KeysResult<Option<PublicKey>> {
        match self {
            Self::Full(bundle) => bundle.public_key().map(Some),
            Self::PublicKeyOnly { public_key, .. } => decode_public_key(public_key).map(Some),
            Self::Absent => Ok(None),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

/// Outcome of publishing a key bundle.
///
/// A 409 is a distinct, expected branch of the setup protocol: it is
/// neither success nor failure and callers must handle it explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetupOutcome {
    /// The bundle was registered; this device owns the identity.
    Created,
    /// An identity already exists for this user. The caller must discard
    /// its generated keys and adopt the server identity.
    Conflict,
}

/// Share permission level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    Read,
    Write,
}

/// Lifecycle state of a grant. `Revoked`, `Expired`, and `Consumed` are
/// terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantState {
    Active,
    Revoked,
    Expired,
    Consumed,
}

/// A share: the item's key re-sealed for one recipient, bounded in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShareGrant {
    pub share_id: String,
    pub item_id: String,
    pub recipient_user_id: i64,
    /// Item key sealed under the recipient's public key at grant time.
    pub wrapped_item_key_for_recipient: SealedItemKey,
    pub permissions: SharePermission,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl ShareGrant {
    /// Grant state at `now`. Revocation is checked before expiry so a
    /// revoked grant reports `Revoked` even after its window lapses.
    pub fn state(&self, now: DateTime<Utc>) -> GrantState {
        if self.revoked {
            GrantState::Revoked
        } else if now >= self.expires_at {
            GrantState::Expired
        } else {
            GrantState::Active
        }
    }
}

/// What the AI analysis consumer is permitted to do with decrypted
/// content. Advisory at this layer; use enforcement lives with the
/// analysis service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Sentiment,
    Themes,
    Summary,
}

/// A short-lived, single-use grant for the AI analysis service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiShareGrant {
    pub analysis_request_id: String,
    pub item_ids: Vec<String>,
    /// Item keys sealed under the analysis service's public key.
    pub wrapped_item_keys: Vec<SealedItemKey>,
    pub analysis_type: AnalysisType,
    pub single_use: bool,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl AiShareGrant {
    /// Grant state at `now`. A consumed grant is terminal even while its
    /// expiry window is still open.
    pub fn state(&self, now: DateTime<Utc>) -> GrantState {
        if self.revoked {
            GrantState::Revoked
        } else if now >= self.expires_at {
            GrantState::Expired
        } else if self.single_use && self.consumed {
            GrantState::Consumed
        } else {
            GrantState::Active
        }
    }
}

/// Request to create a share.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateShareRequest {
    pub item_id: String,
    pub recipient_user_id: i64,
    pub wrapped_item_key_for_recipient: SealedItemKey,
    pub permissions: SharePermission,
    pub expires_at: DateTime<Utc>,
}

/// Request to create an AI analysis grant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAiShareRequest {
    pub item_type: String,
    pub item_ids: Vec<String>,
    pub wrapped_item_keys: Vec<SealedItemKey>,
    pub analysis_type: AnalysisType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Authentication tokens from the identity service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(revoked: bool, expires_in: Duration) -> ShareGrant {
        let now = Utc::now();
        ShareGrant {
            share_id: "share-1".into(),
            item_id: "entry-1".into(),
            recipient_user_id: 7,
            wrapped_item_key_for_recipient: SealedItemKey {
                ephemeral_public_key: [0u8; 32],
                nonce: [0u8; 24],
                ciphertext: vec![],
            },
            permissions: SharePermission::Read,
            created_at: now,
            expires_at: now + expires_in,
            revoked,
        }
    }

    #[test]
    fn active_until_expiry_boundary() {
        let g = grant(false, Duration::hours(24));
        let now = Utc::now();
        assert_eq!(g.state(now + Duration::hours(23)), GrantState::Active);
        assert_eq!(g.state(now + Duration::hours(25)), GrantState::Expired);
    }

    #[test]
    fn revocation_wins_over_expiry() {
        let g = grant(true, Duration::hours(-1));
        assert_eq!(g.state(Utc::now()), GrantState::Revoked);
    }

    #[test]
    fn consumed_ai_grant_terminal_within_window() {
        let now = Utc::now();
        let g = AiShareGrant {
            analysis_request_id: "ar-1".into(),
            item_ids: vec!["entry-1".into()],
            wrapped_item_keys: vec![],
            analysis_type: AnalysisType::Sentiment,
            single_use: true,
            consumed: true,
            created_at: now,
            expires_at: now + Duration::minutes(20),
            revoked: false,
        };
        assert_eq!(g.state(now + Duration::minutes(1)), GrantState::Consumed);
    }
}
