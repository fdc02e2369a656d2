//! Reconciliation between local and server-held key identity.
//!
//! Compares fingerprints only (the one field every server view carries) and
//! never infers divergence from fields a partial fetch omits. Server
//! state is authoritative: a mismatch is resolved by unlocking against the
//! server bundle or by an explicit, destructive user-initiated reset, never
//! by silently overwriting the server.

use crate::api_client::ApiClient;
use crate::error::{KeysError, KeysResult};
use crate::session::CryptoSession;
use crate::types::{KeyBundle, ServerKeyRecord, SetupOutcome};
use quillvault_crypto::{generate_identity_keypair, wrap_private_key, KdfParams};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Reconciliation state. `Revoked`-style terminal states do not exist
/// here; every check starts over from `Checking`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No comparison has run, or the server was unreachable. Transient
    /// network failure is never interpreted as a mismatch.
    Unknown,
    Checking,
    InSync,
    /// Local identity exists but the server has none: push the local
    /// bundle (first setup, or recovery from a server-side wipe).
    LocalStale,
    /// The server record is known-outdated: the user initiated a reset and
    /// the destructive push has not landed yet.
    ServerStale,
    /// Identities diverge. Requires a user decision: adopt the server
    /// identity or reset.
    Mismatched,
    Resolved,
}

/// Compares local and server key identity and drives recovery.
pub struct KeyReconciler {
    api: Arc<ApiClient>,
    session: Arc<CryptoSession>,
    state: RwLock<SyncState>,
}

/// Pure classification over the shared identity fingerprint.
fn classify(local: Option<&str>, server: Option<&str>) -> SyncState {
    match (local, server) {
        (None, None) => SyncState::Unknown,
        (Some(_), None) => SyncState::LocalStale,
        (None, Some(_)) => SyncState::Mismatched,
        (Some(l), Some(s)) if l == s => SyncState::InSync,
        (Some(_), Some(_)) => SyncState::Mismatched,
    }
}

impl KeyReconciler {
    pub fn new(api: Arc<ApiClient>, session: Arc<CryptoSession>) -> Self {
        Self {
            api,
            session,
            state: RwLock::new(SyncState::Unknown),
        }
    }

    pub async fn state(&self) -> SyncState {
        *self.state.read().await
    }

    async fn set_state(&self, state: SyncState) {
        *self.state.write().await = state;
    }

    /// Classifies the relationship between the locally cached bundle and
    /// the server's record.
    ///
    /// Runs opportunistically around setup, unlock, and before share
    /// operations. A partial server view that appears to diverge is
    /// refetched in full before `Mismatched` is declared.
    pub async fn check(&self, local: Option<&KeyBundle>) -> KeysResult<SyncState> {
        self.set_state(SyncState::Checking).await;
        let user_id = self.api.user_id().await.ok_or(KeysError::AuthRequired)?;

        let record = match self.fetch_record(user_id).await? {
            Some(record) => record,
            None => return Ok(SyncState::Unknown),
        };

        let local_id = local.map(|b| b.public_key_id.as_str());
        let mut result = classify(local_id, record.public_key_id());

        // False-positive guard: never raise a mismatch off a partial fetch
        // without confirming against the full record.
        if result == SyncState::Mismatched && local_id.is_some() && !record.is_full() {
            debug!("divergent partial record, refetching full bundle before classifying");
            let record = match self.fetch_record(user_id).await? {
                Some(record) => record,
                None => return Ok(SyncState::Unknown),
            };
            result = classify(local_id, record.public_key_id());
        }

        self.set_state(result).await;
        if result == SyncState::Mismatched {
            warn!("local and server key identities diverge");
        }
        Ok(result)
    }

    /// Fetches the record, mapping transport failure to `Unknown` (state
    /// recorded, `None` returned) rather than any divergence verdict.
    async fn fetch_record(&self, user_id: i64) -> KeysResult<Option<ServerKeyRecord>> {
        match self.api.get_user_key_record(user_id).await {
            Ok(record) => Ok(Some(record)),
            Err(KeysError::Http(e)) => {
                warn!("key state check unavailable: {e}");
                self.set_state(SyncState::Unknown).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolution for `LocalStale`: publishes the local bundle.
    ///
    /// Losing a concurrent push surfaces as a fresh check against the
    /// winner's record; local material is not pushed again.
    pub async fn push_local(&self, bundle: &KeyBundle) -> KeysResult<SyncState> {
        match self.api.setup_encryption(bundle).await? {
            SetupOutcome::Created => {
                info!("published local key identity {}", bundle.public_key_id);
                self.set_state(SyncState::Resolved).await;
                Ok(SyncState::Resolved)
            }
            SetupOutcome::Conflict => {
                warn!("local push lost a setup race, re-checking server state");
                self.check(Some(bundle)).await
            }
        }
    }

    /// Resolution (a) for `Mismatched`: adopt the server identity by
    /// unlocking its bundle with the user's password.
    pub async fn adopt_server(&self, password: &str) -> KeysResult<KeyBundle> {
        let user_id = self.api.user_id().await.ok_or(KeysError::AuthRequired)?;

        match self.api.get_user_key_record(user_id).await? {
            ServerKeyRecord::Full(bundle) => {
                match self.session.unlock(&bundle, password).await {
                    Ok(fingerprint) => {
                        info!("adopted server identity {fingerprint}");
                        self.set_state(SyncState::Resolved).await;
                        Ok(bundle)
                    }
                    Err(KeysError::Crypto(quillvault_crypto::CryptoError::Unwrap(_))) => {
                        self.set_state(SyncState::Mismatched).await;
                        Err(KeysError::MismatchDetected)
                    }
                    Err(e) => Err(e),
                }
            }
            ServerKeyRecord::PublicKeyOnly { .. } => Err(KeysError::Api(
                "server returned a partial key record for the current user".to_string(),
            )),
            ServerKeyRecord::Absent => {
                self.set_state(SyncState::Unknown).await;
                Err(KeysError::NotFound("server key record".to_string()))
            }
        }
    }

    /// Resolution (b) for `Mismatched`: explicit user-initiated reset.
    ///
    /// Generates a new identity and destructively replaces the server's.
    /// Every outstanding grant tied to the old identity is invalidated
    /// server-side, since their wrapped keys can never be recovered under the
    /// new keypair.
    pub async fn reset_identity(&self, password: &str) -> KeysResult<KeyBundle> {
        let keypair = generate_identity_keypair();
        let protected = wrap_private_key(&keypair.secret, password, &KdfParams::default())?;
        let bundle = KeyBundle::from_parts(&keypair, &protected);

        // The server record is now known-outdated until the push lands.
        self.set_state(SyncState::ServerStale).await;

        self.api.reset_encryption(&bundle).await?;
        let fingerprint = self.session.install(keypair).await;
        self.set_state(SyncState::Resolved).await;
        info!("reset key identity to {fingerprint}; prior grants invalidated");

        Ok(bundle)
    }
}
