//! Session-scoped custody of the unlocked private key.
//!
//! One canonical unlocked slot exists per session. The secret never leaves
//! the slot (callers borrow it through [`CryptoSession::with_secret`]) and
//! `lock()` is the single path that clears it. There is no global instance;
//! the session object is passed explicitly to every component that needs it.

use crate::error::{KeysError, KeysResult};
use crate::types::KeyBundle;
use crypto_box::{PublicKey, SecretKey};
use quillvault_crypto::{unwrap_private_key, IdentityKeyPair};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// The unlocked identity occupying the session slot.
struct UnlockedIdentity {
    keypair: IdentityKeyPair,
    public_key_id: String,
}

struct SessionState {
    unlocked: Option<UnlockedIdentity>,
    /// Bumped on every completed unlock. Lets concurrent unlock attempts
    /// detect that a racing derivation already finished.
    unlock_generation: u64,
}

/// Explicit session object holding the single unlocked-key slot.
#[derive(Clone)]
pub struct CryptoSession {
    state: Arc<RwLock<SessionState>>,
    /// Serializes key derivations so concurrent unlock attempts collapse to
    /// one in-flight derivation whose result all waiters share.
    unlock_lock: Arc<tokio::sync::Mutex<()>>,
}

impl CryptoSession {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState {
                unlocked: None,
                unlock_generation: 0,
            })),
            unlock_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub async fn is_unlocked(&self) -> bool {
        self.state.read().await.unlocked.is_some()
    }

    /// Fingerprint of the unlocked identity, if any.
    pub async fn public_key_id(&self) -> Option<String> {
        self.state
            .read()
            .await
            .unlocked
            .as_ref()
            .map(|u| u.public_key_id.clone())
    }

    /// Public half of the unlocked identity, if any.
    pub async fn public_key(&self) -> Option<PublicKey> {
        self.state
            .read()
            .await
            .unlocked
            .as_ref()
            .map(|u| u.keypair.public.clone())
    }

    /// Number of completed unlock derivations (observability for the
    /// collapse behavior).
    pub async fn unlock_generation(&self) -> u64 {
        self.state.read().await.unlock_generation
    }

    /// Derives the master secret from the bundle's KDF inputs, unwraps the
    /// private key, and installs it in the session slot.
    ///
    /// Concurrent calls for the same identity collapse: the first caller
    /// derives, later callers wait on the serialization lock and then join
    /// the installed result without re-deriving.
    pub async fn unlock(&self, bundle: &KeyBundle, password: &str) -> KeysResult<String> {
        let pre_gen = {
            let state = self.state.read().await;
            if let Some(unlocked) = &state.unlocked {
                if unlocked.public_key_id == bundle.public_key_id {
                    return Ok(unlocked.public_key_id.clone());
                }
            }
            state.unlock_generation
        };

        let _guard = self.unlock_lock.lock().await;

        // Double-check: a racing unlock may have completed while we waited.
        {
            let state = self.state.read().await;
            if state.unlock_generation > pre_gen {
                if let Some(unlocked) = &state.unlocked {
                    if unlocked.public_key_id == bundle.public_key_id {
                        debug!("joining concurrent unlock result");
                        return Ok(unlocked.public_key_id.clone());
                    }
                }
            }
        }

        let protected = bundle.protected_key()?;
        let secret = unwrap_private_key(&protected, password)?;
        let keypair = IdentityKeyPair::from_secret_bytes(secret.to_bytes());

        let fingerprint = keypair.fingerprint();
        if fingerprint != bundle.public_key_id {
            // The bundle's declared identity does not match the key it
            // wraps: corrupted custody data.
            return Err(quillvault_crypto::CryptoError::Unwrap(
                "unwrapped key does not match declared identity".to_string(),
            )
            .into());
        }

        let mut state = self.state.write().await;
        state.unlocked = Some(UnlockedIdentity {
            keypair,
            public_key_id: fingerprint.clone(),
        });
        state.unlock_generation += 1;
        info!("session unlocked");

        Ok(fingerprint)
    }

    /// Installs a freshly generated keypair (first-time setup, reset).
    pub(crate) async fn install(&self, keypair: IdentityKeyPair) -> String {
        let fingerprint = keypair.fingerprint();
        let mut state = self.state.write().await;
        state.unlocked = Some(UnlockedIdentity {
            keypair,
            public_key_id: fingerprint.clone(),
        });
        state.unlock_generation += 1;
        fingerprint
    }

    /// Borrows the unlocked secret for one operation. The secret cannot be
    /// cloned out through this interface.
    pub async fn with_secret<T, F>(&self, f: F) -> KeysResult<T>
    where
        F: FnOnce(&SecretKey) -> KeysResult<T>,
    {
        let state = self.state.read().await;
        let unlocked = state.unlocked.as_ref().ok_or(KeysError::Locked)?;
        f(&unlocked.keypair.secret)
    }

    /// Clears the unlocked slot. Called on lock, logout, and every error
    /// path that ends the session.
    pub async fn lock(&self) {
        let mut state = self.state.write().await;
        if state.unlocked.take().is_some() {
            info!("session locked");
        }
    }
}

impl Default for CryptoSession {
    fn default() -> Self {
        Self::new()
    }
}
