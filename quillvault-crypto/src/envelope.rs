//! Identity keypairs and key wrapping.
//!
//! Uses X25519 key exchange + XSalsa20-Poly1305 for sealing per-item content
//! keys to a recipient's public key. Each seal uses a fresh ephemeral
//! keypair, so a sealed key reveals nothing about the sender.
//!
//! The identity private key itself is wrapped under the password-derived
//! master secret (Argon2id -> ChaCha20-Poly1305) for server-side custody.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, KdfParams, Salt, KEY_SIZE};
use crate::{decrypt, encrypt, EncryptedData};
use crypto_box::aead::{Aead, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::TryRngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// X25519 identity keypair.
///
/// The secret key implements `ZeroizeOnDrop` automatically (from crypto_box).
pub struct IdentityKeyPair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl IdentityKeyPair {
    /// Returns the public key as a raw 32-byte array.
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// Returns the secret key as a raw 32-byte array.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Stable fingerprint of the public key, used as the identity token
    /// everywhere keys are compared.
    pub fn fingerprint(&self) -> String {
        public_key_fingerprint(&self.public)
    }
}

/// Hex SHA-256 of the raw public key bytes.
pub fn public_key_fingerprint(public: &PublicKey) -> String {
    hex::encode(Sha256::digest(public.as_bytes()))
}

/// A content key sealed to a recipient's X25519 public key.
///
/// The ephemeral public key is included so the recipient can reconstruct
/// the shared secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedItemKey {
    /// Ephemeral X25519 public key (sender side of DH).
    pub ephemeral_public_key: [u8; 32],
    /// XSalsa20 nonce (24 bytes).
    pub nonce: [u8; 24],
    /// Encrypted key material (XSalsa20-Poly1305 ciphertext + tag).
    pub ciphertext: Vec<u8>,
}

/// Identity private key wrapped under the password-derived master secret.
///
/// Bundles the Argon2id salt and cost parameters so the password is the
/// only input needed to unwrap.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PasswordProtectedKey {
    pub kdf_salt: [u8; 16],
    pub kdf_params: KdfParams,
    pub encrypted: EncryptedData,
}

/// Generates a new X25519 identity keypair.
pub fn generate_identity_keypair() -> IdentityKeyPair {
    let secret = SecretKey::generate(&mut OsRng);
    let public = secret.public_key();
    IdentityKeyPair { secret, public }
}

/// Seals key material for a recipient using anonymous envelope encryption.
///
/// A fresh ephemeral X25519 keypair is generated per seal operation.
pub fn seal_item_key(key_material: &[u8], recipient_pk: &PublicKey) -> CryptoResult<SealedItemKey> {
    let ephemeral = SecretKey::generate(&mut OsRng);
    let ephemeral_pk = ephemeral.public_key();

    let salsa_box = SalsaBox::new(recipient_pk, &ephemeral);

    let mut nonce_bytes = [0u8; 24];
    rand::rngs::OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .expect("OS RNG failure");

    let ciphertext = salsa_box
        .encrypt(crypto_box::Nonce::from_slice(&nonce_bytes), key_material)
        .map_err(|e| CryptoError::Encryption(format!("item key seal failed: {e}")))?;

    Ok(SealedItemKey {
        ephemeral_public_key: *ephemeral_pk.as_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Opens a sealed item key using the recipient's secret key.
pub fn open_item_key(sealed: &SealedItemKey, recipient_sk: &SecretKey) -> CryptoResult<Vec<u8>> {
    let ephemeral_pk = PublicKey::from(sealed.ephemeral_public_key);
    let salsa_box = SalsaBox::new(&ephemeral_pk, recipient_sk);

    salsa_box
        .decrypt(
            crypto_box::Nonce::from_slice(&sealed.nonce),
            sealed.ciphertext.as_ref(),
        )
        .map_err(|_| CryptoError::Unwrap("sealed key open failed (wrong key or tampered data)".to_string()))
}

/// Wraps an identity private key under a password-derived master secret.
///
/// Generates a fresh salt; the derived master secret is dropped (and
/// zeroized) before returning.
pub fn wrap_private_key(
    sk: &SecretKey,
    password: &str,
    params: &KdfParams,
) -> CryptoResult<PasswordProtectedKey> {
    let salt = Salt::random();
    let master = derive_key(password, &salt, params)?;
    let encrypted = encrypt(&master, &sk.to_bytes())?;

    Ok(PasswordProtectedKey {
        kdf_salt: *salt.as_bytes(),
        kdf_params: *params,
        encrypted,
    })
}

/// Unwraps a password-protected private key.
///
/// A wrong password and a corrupted wrap both surface as
/// [`CryptoError::Unwrap`], so callers cannot use this as a password-guess
/// oracle.
pub fn unwrap_private_key(
    protected: &PasswordProtectedKey,
    password: &str,
) -> CryptoResult<SecretKey> {
    let salt = Salt::from_bytes(protected.kdf_salt);
    let master = derive_key(password, &salt, &protected.kdf_params)?;

    let plaintext = decrypt(&master, &protected.encrypted)
        .map_err(|_| CryptoError::Unwrap("wrong password or corrupted key bundle".to_string()))?;

    if plaintext.len() != KEY_SIZE {
        return Err(CryptoError::Unwrap(
            "wrong password or corrupted key bundle".to_string(),
        ));
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&plaintext);
    Ok(SecretKey::from(bytes))
}
