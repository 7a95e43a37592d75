//! # purse-crypto
//! Cryptographic primitives shared by the coin and recovery paths.
//!
//! Everything in this crate is pure and deterministic given its inputs,
//! except the helpers that explicitly draw fresh randomness (nonces, salts,
//! master keys).
//!
//! # Modules
//!
//! - [`crockford`]: Crockford base32 text encoding of byte strings
//! - [`kdf`]: HMAC-SHA512/HMAC-SHA256 KDF, SHA-512 hash, Argon2id stretching
//! - [`canonical`]: canonical JSON serialization
//! - [`secrets`]: zeroizing newtypes for key material
//! - [`keys`]: user identifiers, account keys, coin planchet derivation
//! - [`answer`]: salted challenge answer hashing
//! - [`encryption`]: nonce-prefixed AEAD for truths, key shares and secrets
//! - [`forgettable`]: canonical hashing with redactable fields

pub mod answer;
pub mod canonical;
pub mod crockford;
pub mod encryption;
pub mod error;
pub mod forgettable;
pub mod kdf;
pub mod keys;
pub mod secrets;

pub use answer::{pin_answer_hash, secure_answer_hash};
pub use canonical::{canonical_json, to_canonical_json};
pub use encryption::{
    core_secret_encrypt, core_secret_recover, decrypt_key_share, decrypt_recovery_document, decrypt_truth,
    encrypt_key_share, encrypt_recovery_document, encrypt_truth, fresh_nonce, policy_key_derive,
    CoreSecretEncryption, NONCE_LEN,
};
pub use error::CryptoError;
pub use forgettable::{forget_all, hash_contract_terms, salt_forgettable, scrub, validate_forgettable};
pub use kdf::{hash, kdf};
pub use keys::{
    account_keypair_derive, derive_refresh_planchet, derive_transfer_secret,
    derive_withdraw_planchet, user_identifier_derive, verify_signature, AccountKeyPair,
    PlanchetSecrets, UserIdentifier,
};
pub use secrets::{BlindingKey, CoinSecret, KeyShare, MasterKey, PolicyKey, SessionSeed, TruthKey};
