//! Encryption layer for Quillvault.
//!
//! Provides per-record encryption using:
//! - Argon2id for master key derivation from passwords
//! - ChaCha20-Poly1305 for authenticated content encryption
//! - X25519 + XSalsa20-Poly1305 for item key wrapping
//! - Secure key management with zeroization
//!
//! # Architecture
//!
//! The encryption uses a three-tier key system:
//!
//! 1. **Master secret**: Derived from the user's password using Argon2id.
//!    Never stored - derived each time the user unlocks, and used only to
//!    wrap the identity private key.
//!
//! 2. **Identity keypair**: A long-lived X25519 keypair. The public half is
//!    published; the private half travels only as a password-wrapped blob.
//!
//! 3. **Item key**: A random key generated per record, sealed under the
//!    owner's public key and stored alongside the ciphertext.
//!
//! This architecture allows:
//! - Changing the password without re-encrypting any content
//! - Sharing an individual record by re-sealing just its item key
//! - Containment (compromising one item key exposes one record)

mod cipher;
pub mod envelope;
mod error;
pub mod item;
mod key;

pub use cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use envelope::{
    generate_identity_keypair, open_item_key, public_key_fingerprint, seal_item_key,
    unwrap_private_key, wrap_private_key, IdentityKeyPair, PasswordProtectedKey, SealedItemKey,
};
pub use error::{CryptoError, CryptoResult};
pub use item::{
    decrypt_item, decrypt_shared_item, encrypt_item, recover_item_key, rewrap_item_key,
    EncryptedItem,
};
pub use key::{derive_key, generate_random_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
