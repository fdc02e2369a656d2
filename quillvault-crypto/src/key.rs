//! Master key derivation and key material types.
//!
//! The master secret is derived from the user's password with Argon2id and
//! lives only in memory. It is used solely to wrap and unwrap the identity
//! private key; it never encrypts content directly and is never persisted.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::TryRngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Argon2id salt size in bytes.
pub const SALT_SIZE: usize = 16;

/// A random per-user KDF salt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generates a fresh random salt.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .expect("OS RNG failure");
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Validates and copies a salt from a slice.
    pub fn try_from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SALT_SIZE {
            return Err(CryptoError::KeyDerivation(format!(
                "invalid salt length: expected {SALT_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; SALT_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// Argon2id cost parameters.
///
/// Stored alongside the wrapped private key so unlock on a new device
/// derives the exact same master secret.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost_kib: u32,
    /// Iteration count.
    pub t_cost: u32,
    /// Parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP baseline for Argon2id: 19 MiB, 2 iterations, 1 lane
        Self {
            m_cost_kib: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// A 256-bit symmetric key, zeroized on drop.
///
/// Deliberately not serializable: derived keys exist in memory only.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Derives a master secret from a password and salt using Argon2id.
///
/// Pure function of its inputs. Fails only on malformed parameters; a wrong
/// password yields a different but well-formed key.
pub fn derive_key(password: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<DerivedKey> {
    let argon_params = Params::new(
        params.m_cost_kib,
        params.t_cost,
        params.p_cost,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("invalid KDF parameters: {e}")))?;

    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = [0u8; KEY_SIZE];
    argon
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey(out))
}

/// Generates a random 256-bit key (per-item content keys).
pub fn generate_random_key() -> DerivedKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure");
    DerivedKey(bytes)
}
