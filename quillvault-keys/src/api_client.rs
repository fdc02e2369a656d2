//! HTTP client for the Quillvault control plane API.
//!
//! Handles bearer-token authentication, token refresh on 401, and the
//! encryption/share endpoints. Uses reqwest with JSON serialization. Session
//! issuance itself belongs to the external identity service; this client
//! only carries and refreshes the tokens it is handed.

use crate::config::KeysConfig;
use crate::error::{KeysError, KeysResult};
use crate::types::*;
use quillvault_crypto::{EncryptedData, KdfParams};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// State shared across API client clones.
struct AuthState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user_id: Option<i64>,
    /// Monotonically increasing counter bumped on every successful refresh.
    /// Used to detect when a concurrent refresh has already updated tokens.
    refresh_generation: u64,
}

/// HTTP client for the Quillvault control plane.
pub struct ApiClient {
    client: Client,
    config: KeysConfig,
    auth: Arc<RwLock<AuthState>>,
    /// Serializes refresh operations to prevent rotation race conditions.
    /// Without this, concurrent 401s all read the same old refresh token;
    /// the server rotates on the first call, and subsequent calls fail.
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: TokenUser,
}

#[derive(Deserialize)]
struct TokenUser {
    id: i64,
}

/// Raw shape of `GET /encryption/user/{id}`; optional fields depend on
/// the caller's relationship to the user.
#[derive(Deserialize)]
struct UserKeyResponse {
    public_key: String,
    public_key_id: String,
    kdf_salt: Option<String>,
    kdf_params: Option<KdfParams>,
    wrapped_private_key: Option<EncryptedData>,
}

impl ApiClient {
    pub fn new(config: KeysConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            config,
            auth: Arc::new(RwLock::new(AuthState {
                access_token: None,
                refresh_token: None,
                user_id: None,
                refresh_generation: 0,
            })),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Sets auth tokens directly (for restoring a saved session).
    pub async fn set_tokens(&self, access_token: String, refresh_token: String, user_id: i64) {
        let mut auth = self.auth.write().await;
        auth.access_token = Some(access_token);
        auth.refresh_token = Some(refresh_token);
        auth.user_id = Some(user_id);
    }

    pub async fn is_authenticated(&self) -> bool {
        self.auth.read().await.access_token.is_some()
    }

    pub async fn user_id(&self) -> Option<i64> {
        self.auth.read().await.user_id
    }

    pub async fn logout(&self) {
        let mut auth = self.auth.write().await;
        auth.access_token = None;
        auth.refresh_token = None;
        auth.user_id = None;
    }

    /// Returns current auth tokens for persistence.
    pub async fn get_current_tokens(&self) -> Option<AuthTokens> {
        let auth = self.auth.read().await;
        Some(AuthTokens {
            access_token: auth.access_token.clone()?,
            refresh_token: auth.refresh_token.clone()?,
            user_id: auth.user_id?,
        })
    }

    pub async fn refresh_access_token(&self) -> KeysResult<String> {
        // Capture the generation before acquiring the lock so we can
        // detect if a concurrent refresh already completed.
        let pre_gen = self.auth.read().await.refresh_generation;

        // Serialize all refresh operations: only one HTTP refresh at a time.
        let _guard = self.refresh_lock.lock().await;

        // Double-check: if the generation advanced while we waited,
        // a concurrent refresh already succeeded. Use its token.
        {
            let auth = self.auth.read().await;
            if auth.refresh_generation > pre_gen {
                return auth.access_token.clone().ok_or(KeysError::AuthRequired);
            }
        }

        let refresh_token = {
            let auth = self.auth.read().await;
            auth.refresh_token.clone().ok_or(KeysError::AuthRequired)?
        };

        let url = format!("{}/auth/refresh", self.config.api_base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            // Refresh token is expired/revoked - clear stale session
            self.logout().await;
            return Err(KeysError::AuthFailed(
                "token refresh failed: session expired, re-authentication required".to_string(),
            ));
        }

        let resp: TokenResponse = resp
            .error_for_status()
            .map_err(|e| KeysError::AuthFailed(format!("token refresh failed: {e}")))?
            .json()
            .await?;

        let mut auth = self.auth.write().await;
        auth.access_token = Some(resp.access_token.clone());
        auth.refresh_token = Some(resp.refresh_token);
        auth.user_id = Some(resp.user.id);
        auth.refresh_generation += 1;

        Ok(resp.access_token)
    }

    /// Makes an authenticated GET request, retrying once on 401.
    async fn auth_get(&self, path: &str) -> KeysResult<reqwest::Response> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let token = self.get_token().await?;

        let resp = self.client.get(&url).bearer_auth(&token).send().await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("401 on GET {path}, refreshing token");
            let new_token = self.refresh_access_token().await?;
            return Ok(self.client.get(&url).bearer_auth(&new_token).send().await?);
        }

        Ok(resp)
    }

    /// Makes an authenticated POST request, retrying once on 401.
    async fn auth_post(&self, path: &str, body: &impl Serialize) -> KeysResult<reqwest::Response> {
        self.auth_post_with_headers(path, body, &[]).await
    }

    /// POST with extra headers (share creation carries an idempotency key).
    async fn auth_post_with_headers(
        &self,
        path: &str,
        body: &impl Serialize,
        headers: &[(&str, &str)],
    ) -> KeysResult<reqwest::Response> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let token = self.get_token().await?;

        let mut req = self.client.post(&url).bearer_auth(&token).json(body);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let resp = req.send().await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("401 on POST {path}, refreshing token");
            let new_token = self.refresh_access_token().await?;
            let mut retry = self.client.post(&url).bearer_auth(&new_token).json(body);
            for (name, value) in headers {
                retry = retry.header(*name, *value);
            }
            return Ok(retry.send().await?);
        }

        Ok(resp)
    }

    /// Makes an authenticated DELETE request, retrying once on 401.
    async fn auth_delete(&self, path: &str) -> KeysResult<reqwest::Response> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let token = self.get_token().await?;

        let resp = self.client.delete(&url).bearer_auth(&token).send().await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("401 on DELETE {path}, refreshing token");
            let new_token = self.refresh_access_token().await?;
            return Ok(self
                .client
                .delete(&url)
                .bearer_auth(&new_token)
                .send()
                .await?);
        }

        Ok(resp)
    }

    async fn get_token(&self) -> KeysResult<String> {
        self.auth
            .read()
            .await
            .access_token
            .clone()
            .ok_or(KeysError::AuthRequired)
    }

    // ── Encryption identity ──

    /// Whether the current user has a registered key identity.
    pub async fn check_encryption(&self) -> KeysResult<bool> {
        let resp = self
            .auth_get("/encryption/check")
            .await?
            .error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;

        #[derive(Deserialize)]
        struct Resp {
            has_encryption: bool,
        }
        let data: Resp = resp.json().await?;
        Ok(data.has_encryption)
    }

    /// Publishes a key bundle. A 409 means another device won the setup
    /// race; it is returned as data, never collapsed into success or error.
    pub async fn setup_encryption(&self, bundle: &KeyBundle) -> KeysResult<SetupOutcome> {
        let resp = self.auth_post("/encryption/setup", bundle).await?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            debug!("encryption setup returned 409: identity already registered");
            return Ok(SetupOutcome::Conflict);
        }

        resp.error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;
        Ok(SetupOutcome::Created)
    }

    /// Destroys the current server identity and replaces it with a new
    /// bundle. The server invalidates every outstanding grant tied to the
    /// old identity.
    pub async fn reset_encryption(&self, bundle: &KeyBundle) -> KeysResult<()> {
        self.auth_post("/encryption/reset", bundle)
            .await?
            .error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;
        Ok(())
    }

    /// Fetches a user's key record. The response may be partial
    /// (public-key-only) depending on the caller's relationship to the
    /// user; 404 means no identity is registered.
    pub async fn get_user_key_record(&self, user_id: i64) -> KeysResult<ServerKeyRecord> {
        let resp = self.auth_get(&format!("/encryption/user/{user_id}")).await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ServerKeyRecord::Absent);
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;
        let data: UserKeyResponse = resp.json().await?;

        match (data.kdf_salt, data.kdf_params, data.wrapped_private_key) {
            (Some(kdf_salt), Some(kdf_params), Some(wrapped_private_key)) => {
                Ok(ServerKeyRecord::Full(KeyBundle {
                    public_key: data.public_key,
                    public_key_id: data.public_key_id,
                    kdf_salt,
                    kdf_params,
                    wrapped_private_key,
                }))
            }
            _ => Ok(ServerKeyRecord::PublicKeyOnly {
                public_key: data.public_key,
                public_key_id: data.public_key_id,
            }),
        }
    }

    // ── Sharing ──

    /// Creates a share. The idempotency key deduplicates retried grants
    /// server-side.
    pub async fn create_share(
        &self,
        req: &CreateShareRequest,
        idempotency_key: &str,
    ) -> KeysResult<String> {
        let resp = self
            .auth_post_with_headers(
                "/encryption/shares",
                req,
                &[("Idempotency-Key", idempotency_key)],
            )
            .await?
            .error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;

        #[derive(Deserialize)]
        struct Resp {
            share_id: String,
        }
        let data: Resp = resp.json().await?;
        Ok(data.share_id)
    }

    /// Lists grants where the current user is the grantor.
    pub async fn list_shares(&self, item_type: Option<&str>) -> KeysResult<Vec<ShareGrant>> {
        let path = match item_type {
            Some(t) => format!("/encryption/shares?item_type={t}"),
            None => "/encryption/shares".to_string(),
        };
        let resp = self
            .auth_get(&path)
            .await?
            .error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;

        #[derive(Deserialize)]
        struct Resp {
            shares: Vec<ShareGrant>,
        }
        let data: Resp = resp.json().await?;
        Ok(data.shares)
    }

    pub async fn revoke_share(&self, share_id: &str) -> KeysResult<()> {
        let resp = self
            .auth_delete(&format!("/encryption/shares/{share_id}"))
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(KeysError::NotFound(format!("share {share_id}")));
        }
        resp.error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;
        Ok(())
    }

    // ── AI analysis grants ──

    pub async fn create_ai_share(&self, req: &CreateAiShareRequest) -> KeysResult<String> {
        let resp = self
            .auth_post("/encryption/ai-shares", req)
            .await?
            .error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;

        #[derive(Deserialize)]
        struct Resp {
            analysis_request_id: String,
        }
        let data: Resp = resp.json().await?;
        Ok(data.analysis_request_id)
    }

    pub async fn get_ai_share(&self, analysis_request_id: &str) -> KeysResult<AiShareGrant> {
        let resp = self
            .auth_get(&format!("/encryption/ai-shares/{analysis_request_id}"))
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(KeysError::NotFound(format!(
                "analysis request {analysis_request_id}"
            )));
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;
        Ok(resp.json().await?)
    }

    /// Marks a single-use grant consumed. The server accepts exactly one
    /// consume per grant; a 409 means it was already redeemed.
    pub async fn consume_ai_share(&self, analysis_request_id: &str) -> KeysResult<()> {
        let resp = self
            .auth_post(
                &format!("/encryption/ai-shares/{analysis_request_id}/consume"),
                &serde_json::json!({}),
            )
            .await?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(KeysError::GrantConsumed);
        }
        resp.error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;
        Ok(())
    }

    // ── Users ──

    /// Resolves a recipient's user id by email.
    pub async fn resolve_user_by_email(&self, email: &str) -> KeysResult<i64> {
        let resp = self.auth_get(&format!("/users/by-email/{email}")).await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(KeysError::RecipientNotFound(email.to_string()));
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| KeysError::Api(e.to_string()))?;

        #[derive(Deserialize)]
        struct Resp {
            user_id: i64,
        }
        let data: Resp = resp.json().await?;
        Ok(data.user_id)
    }
}
