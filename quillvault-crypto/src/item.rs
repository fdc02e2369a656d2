//! Per-item content encryption.
//!
//! Every record gets its own random symmetric key, AEAD-encrypted content,
//! and the key sealed under the owner's public key. Sharing an item means
//! re-sealing that one key for another recipient; the content ciphertext
//! is never re-encrypted.

use crate::cipher::{decrypt, encrypt, EncryptedData};
use crate::envelope::{
    open_item_key, public_key_fingerprint, seal_item_key, SealedItemKey,
};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{generate_random_key, DerivedKey, KEY_SIZE};
use crypto_box::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};

/// An encrypted record: content ciphertext plus its sealed item key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedItem {
    pub item_id: String,
    pub ciphertext: EncryptedData,
    pub wrapped_item_key: SealedItemKey,
    /// Fingerprint of the public key the item key is sealed under.
    pub owner_public_key_id: String,
}

/// Encrypts content under a fresh random item key, sealing the key to the
/// owner's public key.
pub fn encrypt_item(
    item_id: &str,
    plaintext: &[u8],
    owner_pk: &PublicKey,
) -> CryptoResult<EncryptedItem> {
    let item_key = generate_random_key();
    let ciphertext = encrypt(&item_key, plaintext)?;
    let wrapped_item_key = seal_item_key(item_key.as_bytes(), owner_pk)?;

    Ok(EncryptedItem {
        item_id: item_id.to_string(),
        ciphertext,
        wrapped_item_key,
        owner_public_key_id: public_key_fingerprint(owner_pk),
    })
}

/// Decrypts an item with the owner's private key.
///
/// The owner fingerprint is checked before any unwrap is attempted, so a
/// foreign-keyed (orphaned) item fails fast with [`CryptoError::KeyMismatch`]
/// instead of a generic unwrap failure.
pub fn decrypt_item(item: &EncryptedItem, owner_sk: &SecretKey) -> CryptoResult<Vec<u8>> {
    let item_key = recover_item_key(item, owner_sk)?;
    decrypt(&item_key, &item.ciphertext)
}

/// Recovers the item's symmetric key using the owner's private key.
///
/// Used by the share path (the recovered key is re-sealed for a recipient)
/// and internally by [`decrypt_item`].
pub fn recover_item_key(item: &EncryptedItem, owner_sk: &SecretKey) -> CryptoResult<DerivedKey> {
    let caller_id = public_key_fingerprint(&owner_sk.public_key());
    if caller_id != item.owner_public_key_id {
        return Err(CryptoError::KeyMismatch {
            expected: item.owner_public_key_id.clone(),
            actual: caller_id,
        });
    }

    let key_bytes = open_item_key(&item.wrapped_item_key, owner_sk)?;
    item_key_from_bytes(key_bytes)
}

/// Re-seals an item's key under a new owner public key.
///
/// Recovery path for orphaned items: when the owner identity changed while
/// the old private key is still in hand, the next write re-wraps instead of
/// losing access. Content ciphertext is untouched.
pub fn rewrap_item_key(
    item: &EncryptedItem,
    old_owner_sk: &SecretKey,
    new_owner_pk: &PublicKey,
) -> CryptoResult<EncryptedItem> {
    let item_key = recover_item_key(item, old_owner_sk)?;
    let wrapped_item_key = seal_item_key(item_key.as_bytes(), new_owner_pk)?;

    Ok(EncryptedItem {
        item_id: item.item_id.clone(),
        ciphertext: item.ciphertext.clone(),
        wrapped_item_key,
        owner_public_key_id: public_key_fingerprint(new_owner_pk),
    })
}

/// Decrypts a shared item using a key sealed for the recipient.
///
/// The recipient is not the owner, so no owner-fingerprint check applies.
/// The grant's sealed key either opens under the recipient's secret or the
/// unwrap fails.
pub fn decrypt_shared_item(
    item: &EncryptedItem,
    grant_key: &SealedItemKey,
    recipient_sk: &SecretKey,
) -> CryptoResult<Vec<u8>> {
    let key_bytes = open_item_key(grant_key, recipient_sk)?;
    let item_key = item_key_from_bytes(key_bytes)?;
    decrypt(&item_key, &item.ciphertext)
}

fn item_key_from_bytes(bytes: Vec<u8>) -> CryptoResult<DerivedKey> {
    if bytes.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(DerivedKey::from_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::generate_identity_keypair;

    #[test]
    fn owner_roundtrip() {
        let owner = generate_identity_keypair();
        let item = encrypt_item("entry-1", b"today I planted tomatoes", &owner.public).unwrap();

        let plaintext = decrypt_item(&item, &owner.secret).unwrap();
        assert_eq!(plaintext, b"today I planted tomatoes");
    }

    #[test]
    fn foreign_key_fails_before_unwrap() {
        let owner = generate_identity_keypair();
        let stranger = generate_identity_keypair();
        let item = encrypt_item("entry-1", b"private", &owner.public).unwrap();

        let result = decrypt_item(&item, &stranger.secret);
        assert!(matches!(result, Err(CryptoError::KeyMismatch { .. })));
    }

    #[test]
    fn tampered_content_fails_tag_check() {
        let owner = generate_identity_keypair();
        let mut item = encrypt_item("entry-1", b"private", &owner.public).unwrap();
        item.ciphertext.ciphertext[0] ^= 0xFF;

        let result = decrypt_item(&item, &owner.secret);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn rewrap_transfers_ownership_without_touching_content() {
        let old_owner = generate_identity_keypair();
        let new_owner = generate_identity_keypair();
        let item = encrypt_item("entry-1", b"carried across identities", &old_owner.public).unwrap();

        let rewrapped = rewrap_item_key(&item, &old_owner.secret, &new_owner.public).unwrap();

        assert_eq!(rewrapped.ciphertext, item.ciphertext);
        assert_eq!(rewrapped.owner_public_key_id, new_owner.fingerprint());
        assert_eq!(
            decrypt_item(&rewrapped, &new_owner.secret).unwrap(),
            b"carried across identities"
        );
        // Old identity no longer matches
        assert!(matches!(
            decrypt_item(&rewrapped, &old_owner.secret),
            Err(CryptoError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn recipient_reads_via_resealed_key() {
        let owner = generate_identity_keypair();
        let recipient = generate_identity_keypair();
        let item = encrypt_item("entry-1", b"shared entry", &owner.public).unwrap();

        let item_key = recover_item_key(&item, &owner.secret).unwrap();
        let grant_key = seal_item_key(item_key.as_bytes(), &recipient.public).unwrap();

        let plaintext = decrypt_shared_item(&item, &grant_key, &recipient.secret).unwrap();
        assert_eq!(plaintext, b"shared entry");
    }
}
