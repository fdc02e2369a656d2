//! Identity keypair lifecycle: setup, unlock, lock.
//!
//! Setup treats the server's 409 as the serialization point for multi-device
//! races: the loser discards its generated keypair entirely and re-derives
//! from the winner's published bundle. Locally generated keys are never
//! re-pushed after a conflict.

use crate::api_client::ApiClient;
use crate::error::{KeysError, KeysResult};
use crate::password_cache::SecurePasswordCache;
use crate::session::CryptoSession;
use crate::types::{KeyBundle, ServerKeyRecord, SetupOutcome};
use quillvault_crypto::{generate_identity_keypair, wrap_private_key, KdfParams};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the asymmetric identity lifecycle for one user session.
pub struct IdentityKeyManager {
    api: Arc<ApiClient>,
    session: Arc<CryptoSession>,
}

impl IdentityKeyManager {
    pub fn new(api: Arc<ApiClient>, session: Arc<CryptoSession>) -> Self {
        Self { api, session }
    }

    /// Creates and publishes a fresh key identity, or adopts the server's
    /// if one already exists.
    ///
    /// Returns the bundle the session ended up unlocked under: the locally
    /// generated one on a clean setup, the server's on any conflict.
    pub async fn setup(&self, password: &str) -> KeysResult<KeyBundle> {
        // Check server state first: re-setup after partial failure must not
        // mint a second identity.
        if self.api.check_encryption().await? {
            debug!("identity already registered, adopting server bundle");
            return self.adopt_server_identity(password).await;
        }

        let keypair = generate_identity_keypair();
        let protected = wrap_private_key(&keypair.secret, password, &KdfParams::default())?;
        let bundle = KeyBundle::from_parts(&keypair, &protected);

        match self.api.setup_encryption(&bundle).await? {
            SetupOutcome::Created => {
                let fingerprint = self.session.install(keypair).await;
                info!("registered new key identity {fingerprint}");
                Ok(bundle)
            }
            SetupOutcome::Conflict => {
                // Another device won the race. The generated keypair is
                // dropped here and must never be pushed again.
                drop(keypair);
                warn!("setup conflict: another device registered first");
                self.adopt_server_identity(password).await
            }
        }
    }

    /// Fetches the authoritative server bundle and unlocks against it.
    ///
    /// The server identity always wins; if the password cannot unwrap it,
    /// the divergence needs a user decision and surfaces as
    /// [`KeysError::MismatchDetected`].
    async fn adopt_server_identity(&self, password: &str) -> KeysResult<KeyBundle> {
        let user_id = self.api.user_id().await.ok_or(KeysError::AuthRequired)?;

        match self.api.get_user_key_record(user_id).await? {
            ServerKeyRecord::Full(bundle) => {
                match self.session.unlock(&bundle, password).await {
                    Ok(fingerprint) => {
                        info!("adopted server identity {fingerprint}");
                        Ok(bundle)
                    }
                    Err(KeysError::Crypto(quillvault_crypto::CryptoError::Unwrap(_))) => {
                        Err(KeysError::MismatchDetected)
                    }
                    Err(e) => Err(e),
                }
            }
            ServerKeyRecord::PublicKeyOnly { .. } => Err(KeysError::Api(
                "server returned a partial key record for the current user".to_string(),
            )),
            ServerKeyRecord::Absent => Err(KeysError::Api(
                "server reported an identity that no longer exists".to_string(),
            )),
        }
    }

    /// Unlocks the session against a server bundle.
    ///
    /// Wrong password and corrupted bundle are indistinguishable by design.
    pub async fn unlock(&self, password: &str, bundle: &KeyBundle) -> KeysResult<String> {
        self.session.unlock(bundle, password).await
    }

    /// Unlocks using the locally cached password, if one is available.
    ///
    /// Returns `Ok(None)` when no usable cached password exists (absent,
    /// expired, or wrong after a password change); the caller must prompt.
    /// On success the cache expiry slides forward.
    pub async fn unlock_cached(
        &self,
        cache: &SecurePasswordCache,
        bundle: &KeyBundle,
    ) -> KeysResult<Option<String>> {
        let Some(password) = cache.retrieve()? else {
            return Ok(None);
        };

        match self.session.unlock(bundle, &password).await {
            Ok(fingerprint) => {
                // Sliding expiry: refreshed from last successful unlock.
                cache.refresh()?;
                Ok(Some(fingerprint))
            }
            Err(KeysError::Crypto(quillvault_crypto::CryptoError::Unwrap(_))) => {
                // Cached password no longer opens the bundle (password
                // changed elsewhere). Drop it and fall back to prompting.
                warn!("cached password no longer unlocks the identity, clearing");
                cache.clear()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Destroys the in-memory private key and master secret.
    pub async fn lock(&self) {
        self.session.lock().await;
    }
}
