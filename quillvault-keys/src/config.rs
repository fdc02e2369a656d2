//! Key management configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the key management layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeysConfig {
    /// Base URL for the Quillvault API (e.g., "https://api.quillvault.app").
    pub api_base_url: String,

    /// Upper bound on user share lifetimes in seconds (30 days).
    pub max_share_ttl_secs: i64,

    /// Hard ceiling on AI analysis grant lifetimes in seconds (30 minutes).
    pub ai_share_ttl_ceiling_secs: i64,

    /// Well-known user id of the AI analysis service whose public key
    /// AI grants are sealed under.
    pub analysis_service_user_id: i64,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.quillvault.app".to_string(),
            max_share_ttl_secs: 30 * 24 * 60 * 60,
            ai_share_ttl_ceiling_secs: 30 * 60,
            analysis_service_user_id: 1,
            request_timeout_secs: 30,
        }
    }
}

impl KeysConfig {
    /// Creates a config pointed at a local test server.
    pub fn test(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.to_string(),
            request_timeout_secs: 5,
            ..Self::default()
        }
    }
}
