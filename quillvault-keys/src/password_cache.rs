//! Local, device-bound password caching.
//!
//! The cached password is encrypted under a key derived from stable device
//! characteristics plus a persisted random device id and salt. The device id
//! never leaves the machine, so a copied cache record does not decrypt
//! elsewhere. The record lives in local, non-synced storage and dies on
//! explicit clear, expiry, or logout-with-clear.

use crate::error::KeysResult;
use chrono::{DateTime, Duration, Utc};
use quillvault_crypto::{decrypt, derive_key, encrypt, EncryptedData, KdfParams, Salt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stable, non-PII device attributes feeding the device-bound key.
///
/// Isolated behind a trait so platforms can swap the source (browser
/// storage, OS keychain metadata) without touching the encryption logic.
pub trait DeviceProfile: Send + Sync {
    fn attributes(&self) -> Vec<String>;
}

/// Default profile: compile-target identity plus the machine hostname when
/// the environment exposes one.
pub struct HostDeviceProfile;

impl DeviceProfile for HostDeviceProfile {
    fn attributes(&self) -> Vec<String> {
        let mut attrs = vec![
            std::env::consts::OS.to_string(),
            std::env::consts::ARCH.to_string(),
        ];
        if let Ok(hostname) = std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")) {
            attrs.push(hostname);
        }
        attrs
    }
}

/// On-disk cache record. `device_id` is generated once and reused across
/// re-stores; the salt is fresh per store.
#[derive(Serialize, Deserialize)]
struct CachedPassword {
    device_id: String,
    salt: [u8; 16],
    ttl_secs: i64,
    encrypted_password: EncryptedData,
    expires_at: DateTime<Utc>,
}

/// Encrypted local cache of the unlock password.
pub struct SecurePasswordCache {
    path: PathBuf,
    profile: Box<dyn DeviceProfile>,
}

impl SecurePasswordCache {
    pub fn new(path: impl Into<PathBuf>, profile: Box<dyn DeviceProfile>) -> Self {
        Self {
            path: path.into(),
            profile,
        }
    }

    /// Cache with the default host profile.
    pub fn with_host_profile(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Box::new(HostDeviceProfile))
    }

    /// Key material is the device attributes plus the persisted random
    /// device id; the derived key cannot be rebuilt from the record alone
    /// on another device.
    fn device_key(&self, device_id: &str, salt: &Salt) -> KeysResult<quillvault_crypto::DerivedKey> {
        let mut material = self.profile.attributes();
        material.push(device_id.to_string());
        let material = material.join("\u{1f}");
        Ok(derive_key(&material, salt, &KdfParams::default())?)
    }

    fn read_record(&self) -> Option<CachedPassword> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("password cache record is malformed, ignoring: {e}");
                None
            }
        }
    }

    /// Encrypts and persists the password with the given lifetime.
    ///
    /// Keeps the existing device id if one was already persisted; the salt
    /// and IV are fresh per store.
    pub fn store(&self, password: &str, ttl: Duration) -> KeysResult<()> {
        let device_id = self
            .read_record()
            .map(|r| r.device_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let salt = Salt::random();
        let key = self.device_key(&device_id, &salt)?;
        let encrypted_password = encrypt(&key, password.as_bytes())?;

        let record = CachedPassword {
            device_id,
            salt: *salt.as_bytes(),
            ttl_secs: ttl.num_seconds(),
            encrypted_password,
            expires_at: Utc::now() + ttl,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(&record)?)?;
        debug!("cached unlock password");
        Ok(())
    }

    /// Returns the cached password, or `None` when the record is absent,
    /// malformed, expired, or bound to a different device.
    ///
    /// Callers should [`refresh`](Self::refresh) after a successful unlock
    /// so the expiry slides forward from last use.
    pub fn retrieve(&self) -> KeysResult<Option<String>> {
        let Some(record) = self.read_record() else {
            return Ok(None);
        };

        if Utc::now() >= record.expires_at {
            debug!("cached password expired, clearing");
            self.clear()?;
            return Ok(None);
        }

        let salt = Salt::from_bytes(record.salt);
        let key = self.device_key(&record.device_id, &salt)?;
        let plaintext = match decrypt(&key, &record.encrypted_password) {
            Ok(p) => p,
            Err(_) => {
                // Wrong device or corrupted record: treat as absent.
                warn!("cached password does not decrypt on this device");
                return Ok(None);
            }
        };

        match String::from_utf8(plaintext) {
            Ok(password) => Ok(Some(password)),
            Err(_) => {
                warn!("cached password is not valid UTF-8, ignoring");
                Ok(None)
            }
        }
    }

    /// Slides the expiry forward by the record's stored lifetime (called
    /// after each successful unlock).
    pub fn refresh(&self) -> KeysResult<()> {
        let Some(mut record) = self.read_record() else {
            return Ok(());
        };
        record.expires_at = Utc::now() + Duration::seconds(record.ttl_secs);
        std::fs::write(&self.path, serde_json::to_vec(&record)?)?;
        Ok(())
    }

    /// Deletes the stored record. Offered (not forced) on logout.
    pub fn clear(&self) -> KeysResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
