//! Authenticated symmetric encryption (ChaCha20-Poly1305).

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::TryRngCore;
use serde::{Deserialize, Serialize};

/// ChaCha20-Poly1305 nonce size (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
pub const TAG_SIZE: usize = 16;

/// AEAD ciphertext with its nonce. The Poly1305 tag is appended to
/// `ciphertext`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypts plaintext with a fresh random nonce.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng
        .try_fill_bytes(&mut nonce)
        .expect("OS RNG failure");

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts and verifies the authentication tag.
pub fn decrypt(key: &DerivedKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption("tag verification failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_random_key;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_random_key();
        let plaintext = b"dear diary, nothing happened today";

        let encrypted = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn ciphertext_carries_tag_overhead() {
        let key = generate_random_key();
        let encrypted = encrypt(&key, b"short").unwrap();
        assert_eq!(encrypted.ciphertext.len(), 5 + TAG_SIZE);
    }

    #[test]
    fn wrong_key_fails() {
        let encrypted = encrypt(&generate_random_key(), b"secret entry").unwrap();
        let result = decrypt(&generate_random_key(), &encrypted);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = generate_random_key();
        let mut encrypted = encrypt(&key, b"secret entry").unwrap();
        encrypted.ciphertext[0] ^= 0xFF;

        let result = decrypt(&key, &encrypted);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn tampered_nonce_fails() {
        let key = generate_random_key();
        let mut encrypted = encrypt(&key, b"secret entry").unwrap();
        encrypted.nonce[0] ^= 0xFF;

        assert!(decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn each_encryption_uses_fresh_nonce() {
        let key = generate_random_key();
        let e1 = encrypt(&key, b"same plaintext").unwrap();
        let e2 = encrypt(&key, b"same plaintext").unwrap();

        assert_ne!(e1.nonce, e2.nonce);
        assert_ne!(e1.ciphertext, e2.ciphertext);
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = generate_random_key();
        let encrypted = encrypt(&key, b"").unwrap();
        assert_eq!(decrypt(&key, &encrypted).unwrap(), b"");
    }
}
