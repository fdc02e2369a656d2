//! Time-boxed, single-use grants for the AI analysis service.
//!
//! Same mechanics as user sharing, with two tightenings: the lifetime is
//! clamped to a short fixed ceiling regardless of caller input, and the
//! first successful redemption consumes the grant permanently.

use crate::api_client::ApiClient;
use crate::config::KeysConfig;
use crate::error::{KeysError, KeysResult};
use crate::session::CryptoSession;
use crate::types::{AiShareGrant, AnalysisType, CreateAiShareRequest, GrantState};
use chrono::{Duration, Utc};
use quillvault_crypto::{recover_item_key, seal_item_key, EncryptedItem};
use std::sync::Arc;
use tracing::{debug, info};

/// Issues and redeems analysis-scoped grants.
pub struct AiShareManager {
    api: Arc<ApiClient>,
    session: Arc<CryptoSession>,
    config: KeysConfig,
}

impl AiShareManager {
    pub fn new(api: Arc<ApiClient>, session: Arc<CryptoSession>, config: KeysConfig) -> Self {
        Self {
            api,
            session,
            config,
        }
    }

    /// Creates a single-use grant over a batch of items for the analysis
    /// service.
    ///
    /// `ttl` is clamped to the configured ceiling (30 minutes by default)
    /// no matter what the caller asks for. Items that fail key recovery are
    /// skipped individually; they do not abort the rest of the batch.
    pub async fn create_analysis_grant(
        &self,
        items: &[EncryptedItem],
        item_type: &str,
        analysis_type: AnalysisType,
        context: Option<String>,
        ttl: Duration,
    ) -> KeysResult<AiShareGrant> {
        let ceiling = Duration::seconds(self.config.ai_share_ttl_ceiling_secs);
        let ttl = if ttl > ceiling {
            debug!("analysis grant ttl clamped to ceiling");
            ceiling
        } else {
            ttl
        };

        let service_record = self
            .api
            .get_user_key_record(self.config.analysis_service_user_id)
            .await?;
        let service_pk = service_record.public_key()?.ok_or_else(|| {
            KeysError::NotFound("analysis service has no published key".to_string())
        })?;

        let mut item_ids = Vec::with_capacity(items.len());
        let mut wrapped_item_keys = Vec::with_capacity(items.len());
        self.session
            .with_secret(|secret| {
                for item in items {
                    match recover_item_key(item, secret) {
                        Ok(item_key) => {
                            wrapped_item_keys
                                .push(seal_item_key(item_key.as_bytes(), &service_pk)?);
                            item_ids.push(item.item_id.clone());
                        }
                        Err(e) => {
                            // Per-item failure: surface in logs, keep the batch.
                            tracing::warn!("skipping item {}: {e}", item.item_id);
                        }
                    }
                }
                Ok(())
            })
            .await?;

        if item_ids.is_empty() {
            return Err(KeysError::NotFound(
                "no items could be prepared for analysis".to_string(),
            ));
        }

        let created_at = Utc::now();
        let expires_at = created_at + ttl;

        let request = CreateAiShareRequest {
            item_type: item_type.to_string(),
            item_ids: item_ids.clone(),
            wrapped_item_keys: wrapped_item_keys.clone(),
            analysis_type,
            context,
            expires_at,
        };

        let analysis_request_id = self.api.create_ai_share(&request).await?;
        info!(
            "created analysis grant {analysis_request_id} over {} items",
            item_ids.len()
        );

        Ok(AiShareGrant {
            analysis_request_id,
            item_ids,
            wrapped_item_keys,
            analysis_type,
            single_use: true,
            consumed: false,
            created_at,
            expires_at,
            revoked: false,
        })
    }

    /// Redeems a grant exactly once.
    ///
    /// Validates the grant's state, then flips it to consumed server-side.
    /// A second redemption fails with [`KeysError::GrantConsumed`] even
    /// inside the expiry window.
    pub async fn redeem(&self, analysis_request_id: &str) -> KeysResult<AiShareGrant> {
        let grant = self.api.get_ai_share(analysis_request_id).await?;

        match grant.state(Utc::now()) {
            GrantState::Active => {}
            GrantState::Revoked => return Err(KeysError::GrantRevoked),
            GrantState::Expired => return Err(KeysError::GrantExpired),
            GrantState::Consumed => return Err(KeysError::GrantConsumed),
        }

        // The server accepts exactly one consume; a concurrent redeemer
        // loses here with a 409.
        self.api.consume_ai_share(analysis_request_id).await?;
        info!("analysis grant {analysis_request_id} consumed");

        Ok(AiShareGrant {
            consumed: true,
            ..grant
        })
    }
}
