//! Key management and selective sharing for Quillvault.
//!
//! Provides the client-side custody layer for end-to-end encrypted records:
//! - Identity setup and unlock with multi-device 409 reconciliation
//! - Session-scoped private key custody (single unlocked slot)
//! - Per-item share grants via envelope re-encryption
//! - Short-lived, single-use grants for AI analysis
//! - Device-bound local password caching
//! - Local/server key state reconciliation
//!
//! The server never holds material capable of decrypting content on its
//! own; everything here operates on the client against an unlocked,
//! in-memory private key.

pub mod ai_sharing;
pub mod api_client;
pub mod config;
pub mod error;
pub mod identity;
pub mod password_cache;
pub mod reconciler;
pub mod session;
pub mod sharing;
pub mod types;

pub use ai_sharing::AiShareManager;
pub use api_client::ApiClient;
pub use config::KeysConfig;
pub use error::{KeysError, KeysResult};
pub use identity::IdentityKeyManager;
pub use password_cache::{DeviceProfile, HostDeviceProfile, SecurePasswordCache};
pub use reconciler::{KeyReconciler, SyncState};
pub use session::CryptoSession;
pub use sharing::ShareManager;
pub use types::*;
