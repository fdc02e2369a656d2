//! Share workflow: create, list, revoke, and read-time access checks.
//!
//! A share re-seals one item's key under the recipient's public key at
//! grant time. Revocation and expiry are checked on every read, not only
//! when the grant is issued.

use crate::api_client::ApiClient;
use crate::config::KeysConfig;
use crate::error::{KeysError, KeysResult};
use crate::session::CryptoSession;
use crate::types::{
    CreateShareRequest, GrantState, ShareGrant, SharePermission,
};
use chrono::{Duration, Utc};
use crypto_box::SecretKey;
use quillvault_crypto::{
    decrypt_shared_item, recover_item_key, seal_item_key, EncryptedItem,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Orchestrates item sharing for the unlocked session.
pub struct ShareManager {
    api: Arc<ApiClient>,
    session: Arc<CryptoSession>,
    config: KeysConfig,
}

impl ShareManager {
    pub fn new(api: Arc<ApiClient>, session: Arc<CryptoSession>, config: KeysConfig) -> Self {
        Self {
            api,
            session,
            config,
        }
    }

    /// Creates a time-bounded share of one item with another user.
    ///
    /// The recipient is resolved before any cryptographic work so an
    /// unknown email aborts cheaply. `ttl` is clamped to the configured
    /// maximum. Retries are deduplicated server-side by the idempotency
    /// key generated per logical grant.
    pub async fn create_share(
        &self,
        item: &EncryptedItem,
        recipient_email: &str,
        permissions: SharePermission,
        ttl: Duration,
    ) -> KeysResult<ShareGrant> {
        let recipient_user_id = self.api.resolve_user_by_email(recipient_email).await?;

        let record = self.api.get_user_key_record(recipient_user_id).await?;
        let recipient_pk = record.public_key()?.ok_or_else(|| {
            KeysError::RecipientNotFound(format!(
                "{recipient_email} has no encryption identity"
            ))
        })?;

        let max_ttl = Duration::seconds(self.config.max_share_ttl_secs);
        let ttl = if ttl > max_ttl {
            debug!("share ttl clamped to configured maximum");
            max_ttl
        } else {
            ttl
        };

        // Recover the item key under the session lock, re-seal for the
        // recipient's public key as of right now.
        let wrapped_for_recipient = self
            .session
            .with_secret(|secret| {
                let item_key = recover_item_key(item, secret)?;
                Ok(seal_item_key(item_key.as_bytes(), &recipient_pk)?)
            })
            .await?;

        let created_at = Utc::now();
        let expires_at = created_at + ttl;

        let request = CreateShareRequest {
            item_id: item.item_id.clone(),
            recipient_user_id,
            wrapped_item_key_for_recipient: wrapped_for_recipient.clone(),
            permissions,
            expires_at,
        };

        let idempotency_key = Uuid::new_v4().to_string();
        let share_id = self.api.create_share(&request, &idempotency_key).await?;
        info!("created share {share_id} for item {} with {recipient_email}", item.item_id);

        Ok(ShareGrant {
            share_id,
            item_id: item.item_id.clone(),
            recipient_user_id,
            wrapped_item_key_for_recipient: wrapped_for_recipient,
            permissions,
            created_at,
            expires_at,
            revoked: false,
        })
    }

    /// Lists grants issued by the current user, optionally filtered by
    /// item type. Other users' grants are never visible here.
    pub async fn list_shares(&self, item_type: Option<&str>) -> KeysResult<Vec<ShareGrant>> {
        self.api.list_shares(item_type).await
    }

    /// Revokes a grant. Takes effect on the next read even if the grant
    /// has not expired.
    pub async fn revoke_share(&self, share_id: &str) -> KeysResult<()> {
        self.api.revoke_share(share_id).await?;
        info!("revoked share {share_id}");
        Ok(())
    }

    /// Denies access unless the grant is active right now.
    pub fn check_grant(grant: &ShareGrant) -> KeysResult<()> {
        match grant.state(Utc::now()) {
            GrantState::Active => Ok(()),
            GrantState::Revoked => Err(KeysError::GrantRevoked),
            GrantState::Expired => Err(KeysError::GrantExpired),
            GrantState::Consumed => Err(KeysError::GrantConsumed),
        }
    }

    /// Recipient read path: validates the grant, then decrypts the item
    /// with the key sealed for this recipient.
    pub fn open_shared_item(
        item: &EncryptedItem,
        grant: &ShareGrant,
        recipient_secret: &SecretKey,
    ) -> KeysResult<Vec<u8>> {
        Self::check_grant(grant)?;
        Ok(decrypt_shared_item(
            item,
            &grant.wrapped_item_key_for_recipient,
            recipient_secret,
        )?)
    }
}
