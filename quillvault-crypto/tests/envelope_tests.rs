use quillvault_crypto::envelope::{
    generate_identity_keypair, open_item_key, seal_item_key, unwrap_private_key,
    wrap_private_key, IdentityKeyPair,
};
use quillvault_crypto::{CryptoError, KdfParams};

#[test]
fn keypair_generation_produces_valid_keys() {
    let kp = generate_identity_keypair();
    let pub_bytes = kp.public_bytes();
    let sec_bytes = kp.secret_bytes();
    assert_eq!(pub_bytes.len(), 32);
    assert_eq!(sec_bytes.len(), 32);
    // Public and secret keys must differ
    assert_ne!(pub_bytes, sec_bytes);
}

#[test]
fn keypair_roundtrip_from_secret_bytes() {
    let kp1 = generate_identity_keypair();
    let sec = kp1.secret_bytes();
    let kp2 = IdentityKeyPair::from_secret_bytes(sec);
    assert_eq!(kp1.public_bytes(), kp2.public_bytes());
    assert_eq!(kp1.fingerprint(), kp2.fingerprint());
}

#[test]
fn seal_open_roundtrip() {
    let recipient = generate_identity_keypair();
    let item_key = b"this-is-a-32-byte-item-key-mat!!";

    let sealed = seal_item_key(item_key, &recipient.public).unwrap();
    let recovered = open_item_key(&sealed, &recipient.secret).unwrap();

    assert_eq!(recovered, item_key);
}

#[test]
fn wrong_recipient_key_fails_to_open() {
    let intended = generate_identity_keypair();
    let wrong = generate_identity_keypair();
    let item_key = b"secret-item-key-material-123456!";

    let sealed = seal_item_key(item_key, &intended.public).unwrap();
    let result = open_item_key(&sealed, &wrong.secret);

    assert!(matches!(result, Err(CryptoError::Unwrap(_))));
}

#[test]
fn tampered_ciphertext_fails() {
    let recipient = generate_identity_keypair();
    let item_key = b"secret-item-key-material-123456!";

    let mut sealed = seal_item_key(item_key, &recipient.public).unwrap();
    // Flip a byte in the ciphertext
    if let Some(byte) = sealed.ciphertext.first_mut() {
        *byte ^= 0xFF;
    }

    assert!(open_item_key(&sealed, &recipient.secret).is_err());
}

#[test]
fn tampered_nonce_fails() {
    let recipient = generate_identity_keypair();
    let item_key = b"secret-item-key-material-123456!";

    let mut sealed = seal_item_key(item_key, &recipient.public).unwrap();
    sealed.nonce[0] ^= 0xFF;

    assert!(open_item_key(&sealed, &recipient.secret).is_err());
}

#[test]
fn each_seal_produces_different_ciphertext() {
    let recipient = generate_identity_keypair();
    let item_key = b"same-item-key-every-time-012345!";

    let s1 = seal_item_key(item_key, &recipient.public).unwrap();
    let s2 = seal_item_key(item_key, &recipient.public).unwrap();

    // Different ephemeral keys and nonces
    assert_ne!(s1.ephemeral_public_key, s2.ephemeral_public_key);
    assert_ne!(s1.nonce, s2.nonce);
    assert_ne!(s1.ciphertext, s2.ciphertext);

    // Both open to the same key
    assert_eq!(open_item_key(&s1, &recipient.secret).unwrap(), item_key);
    assert_eq!(open_item_key(&s2, &recipient.secret).unwrap(), item_key);
}

#[test]
fn password_wrap_unwrap_roundtrip() {
    let kp = generate_identity_keypair();
    let password = "correct-horse-battery-staple";

    let protected = wrap_private_key(&kp.secret, password, &KdfParams::default()).unwrap();
    let recovered = unwrap_private_key(&protected, password).unwrap();

    assert_eq!(recovered.to_bytes(), kp.secret.to_bytes());
}

#[test]
fn wrong_password_fails_as_unwrap() {
    let kp = generate_identity_keypair();
    let protected =
        wrap_private_key(&kp.secret, "correct-password", &KdfParams::default()).unwrap();

    let result = unwrap_private_key(&protected, "wrong-password");
    assert!(matches!(result, Err(CryptoError::Unwrap(_))));
}

#[test]
fn corrupted_wrap_is_indistinguishable_from_wrong_password() {
    let kp = generate_identity_keypair();
    let mut protected =
        wrap_private_key(&kp.secret, "correct-password", &KdfParams::default()).unwrap();
    protected.encrypted.ciphertext[0] ^= 0xFF;

    // Same variant as the wrong-password case: no password-guess oracle
    let result = unwrap_private_key(&protected, "correct-password");
    assert!(matches!(result, Err(CryptoError::Unwrap(_))));
}

#[test]
fn wrap_embeds_kdf_parameters() {
    let kp = generate_identity_keypair();
    let params = KdfParams {
        m_cost_kib: 8 * 1024,
        t_cost: 3,
        p_cost: 1,
    };

    let protected = wrap_private_key(&kp.secret, "some-password", &params).unwrap();
    assert_eq!(protected.kdf_params, params);

    // Unwrap uses the embedded params, not defaults
    let recovered = unwrap_private_key(&protected, "some-password").unwrap();
    assert_eq!(recovered.to_bytes(), kp.secret.to_bytes());
}

#[test]
fn sealed_key_serialization_roundtrip() {
    let recipient = generate_identity_keypair();
    let item_key = b"serialize-test-item-key-material";

    let sealed = seal_item_key(item_key, &recipient.public).unwrap();

    let json = serde_json::to_string(&sealed).unwrap();
    let deserialized: quillvault_crypto::SealedItemKey = serde_json::from_str(&json).unwrap();

    assert_eq!(sealed, deserialized);

    // Deserialized envelope can still be opened
    let recovered = open_item_key(&deserialized, &recipient.secret).unwrap();
    assert_eq!(recovered, item_key);
}

#[test]
fn protected_key_serialization_roundtrip() {
    let kp = generate_identity_keypair();
    let password = "serialize-test-password";

    let protected = wrap_private_key(&kp.secret, password, &KdfParams::default()).unwrap();
    let json = serde_json::to_string(&protected).unwrap();
    let deserialized: quillvault_crypto::PasswordProtectedKey =
        serde_json::from_str(&json).unwrap();

    let recovered = unwrap_private_key(&deserialized, password).unwrap();
    assert_eq!(recovered.to_bytes(), kp.secret.to_bytes());
}

// Property-based tests
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn seal_open_always_roundtrips(key_material in proptest::collection::vec(any::<u8>(), 0..256)) {
            let recipient = generate_identity_keypair();
            let sealed = seal_item_key(&key_material, &recipient.public).unwrap();
            let recovered = open_item_key(&sealed, &recipient.secret).unwrap();
            prop_assert_eq!(recovered, key_material);
        }
    }
}
