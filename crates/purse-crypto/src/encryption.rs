//! Nonce-prefixed authenticated encryption for recovery data.
//!
//! Every ciphertext is `nonce (24 bytes) || XChaCha20-Poly1305 output`.
//! The symmetric key is derived per message with
//! `kdf(32, key_seed, nonce, purpose)`, where `purpose` is a short string
//! that separates the different kinds of payload:
//!
//! | purpose | payload            | key seed            |
//! |---------|--------------------|---------------------|
//! | `ect`   | truth              | truth key           |
//! | `eks`   | key share          | user identifier     |
//! | `erd`   | recovery document  | user identifier     |
//! | `cse`   | core secret        | master key          |
//! | `emk`   | master key         | policy key          |
//!
//! Key shares escrowed behind a security question use the answer itself
//! as the purpose string instead of `eks`.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use tracing::trace;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::kdf::kdf_array;
use crate::keys::UserIdentifier;
use crate::secrets::{KeyShare, MasterKey, PolicyKey, TruthKey};

/// Length of the nonce prefix on every ciphertext.
pub const NONCE_LEN: usize = 24;

const TRUTH_PURPOSE: &str = "ect";
const KEY_SHARE_PURPOSE: &str = "eks";
const RECOVERY_DOC_PURPOSE: &str = "erd";
const CORE_SECRET_PURPOSE: &str = "cse";
const MASTER_KEY_PURPOSE: &str = "emk";
const POLICY_KEY_INFO: &[u8] = b"anastasis-policy-key-derive";

/// A fresh random nonce.
pub fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

fn derive_key(key_seed: &[u8], nonce: &[u8], purpose: &str) -> Result<[u8; 32], CryptoError> {
    kdf_array(key_seed, nonce, purpose.as_bytes())
}

/// Encrypt `plaintext` under `key_seed` with an explicit nonce.
pub fn encrypt_with_nonce(
    nonce: &[u8; NONCE_LEN],
    key_seed: &[u8],
    plaintext: &[u8],
    purpose: &str,
) -> Result<Vec<u8>, CryptoError> {
    let mut key = derive_key(key_seed, nonce, purpose)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    key.zeroize();
    let ct = cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&ct);
    trace!(purpose, len = out.len(), "encrypted payload");
    Ok(out)
}

/// Encrypt `plaintext` under `key_seed` with a fresh nonce.
pub fn encrypt(key_seed: &[u8], plaintext: &[u8], purpose: &str) -> Result<Vec<u8>, CryptoError> {
    encrypt_with_nonce(&fresh_nonce(), key_seed, plaintext, purpose)
}

/// Reverse [`encrypt`]. Fails with [`CryptoError::CryptographicMismatch`]
/// on a wrong key, wrong purpose or tampered ciphertext.
pub fn decrypt(key_seed: &[u8], ciphertext: &[u8], purpose: &str) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(CryptoError::Truncated(ciphertext.len()));
    }
    let (nonce, body) = ciphertext.split_at(NONCE_LEN);
    let mut key = derive_key(key_seed, nonce, purpose)?;
    let cipher = XChaCha20Poly1305::new_from_slice(&key).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    key.zeroize();
    cipher
        .decrypt(XNonce::from_slice(nonce), body)
        .map_err(|_| CryptoError::CryptographicMismatch)
}

pub fn encrypt_truth(nonce: &[u8; NONCE_LEN], truth_key: &TruthKey, truth: &[u8]) -> Result<Vec<u8>, CryptoError> {
    encrypt_with_nonce(nonce, truth_key.as_bytes(), truth, TRUTH_PURPOSE)
}

pub fn decrypt_truth(truth_key: &TruthKey, encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
    decrypt(truth_key.as_bytes(), encrypted, TRUTH_PURPOSE)
}

/// Encrypt a key share for escrow. `answer` replaces the default purpose
/// string for question-based methods.
pub fn encrypt_key_share(share: &KeyShare, user_id: &UserIdentifier, answer: Option<&str>) -> Result<Vec<u8>, CryptoError> {
    encrypt(user_id.as_bytes(), share.as_bytes(), answer.unwrap_or(KEY_SHARE_PURPOSE))
}

pub fn decrypt_key_share(encrypted: &[u8], user_id: &UserIdentifier, answer: Option<&str>) -> Result<KeyShare, CryptoError> {
    let mut plain = decrypt(user_id.as_bytes(), encrypted, answer.unwrap_or(KEY_SHARE_PURPOSE))?;
    let share = KeyShare::from_slice(&plain);
    plain.zeroize();
    share
}

pub fn encrypt_recovery_document(user_id: &UserIdentifier, document: &[u8]) -> Result<Vec<u8>, CryptoError> {
    encrypt(user_id.as_bytes(), document, RECOVERY_DOC_PURPOSE)
}

pub fn decrypt_recovery_document(user_id: &UserIdentifier, encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
    decrypt(user_id.as_bytes(), encrypted, RECOVERY_DOC_PURPOSE)
}

/// Combine all key shares of a policy into the policy key.
pub fn policy_key_derive(shares: &[KeyShare], policy_salt: &[u8]) -> Result<PolicyKey, CryptoError> {
    let mut ikm: Vec<u8> = shares.iter().flat_map(|s| s.as_bytes().iter().copied()).collect();
    let key = kdf_array::<64>(&ikm, policy_salt, POLICY_KEY_INFO);
    ikm.zeroize();
    key.map(PolicyKey::from_bytes)
}

/// Output of [`core_secret_encrypt`].
#[derive(Debug, Clone)]
pub struct CoreSecretEncryption {
    pub encrypted_core_secret: Vec<u8>,
    /// One encrypted copy of the master key per policy, in policy order.
    pub encrypted_master_keys: Vec<Vec<u8>>,
}

/// Encrypt the core secret under a fresh master key, and the master key
/// under each policy key.
pub fn core_secret_encrypt(policy_keys: &[PolicyKey], core_secret: &[u8]) -> Result<CoreSecretEncryption, CryptoError> {
    let master = MasterKey::random();
    let encrypted_core_secret = encrypt(master.as_bytes(), core_secret, CORE_SECRET_PURPOSE)?;
    let encrypted_master_keys = policy_keys
        .iter()
        .map(|pk| encrypt(pk.as_bytes(), master.as_bytes(), MASTER_KEY_PURPOSE))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CoreSecretEncryption { encrypted_core_secret, encrypted_master_keys })
}

/// Recover the core secret through one policy.
pub fn core_secret_recover(
    encrypted_master_key: &[u8],
    policy_key: &PolicyKey,
    encrypted_core_secret: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut master = decrypt(policy_key.as_bytes(), encrypted_master_key, MASTER_KEY_PURPOSE)?;
    let secret = decrypt(&master, encrypted_core_secret, CORE_SECRET_PURPOSE);
    master.zeroize();
    secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crockford;

    #[test]
    fn policy_key_reference_vector() {
        let shares = [
            KeyShare::from_crockford("MJ1XCJNJKD0JVDBD2QSYZRE5MS93R9XCA6J10DV7DFYA8NQMT5Z0").unwrap(),
            KeyShare::from_crockford("QPRQRQTC015C80M8DS95Y6H1MKF5DG7ZW7HST6V9MKJHHH5VYX8G").unwrap(),
        ];
        let salt = crockford::decode(
            "EQFPNJVRCV1EABQMVFYSG7T45PW59QDXR7MYRY2Q90ZPB547WJ6C5DCR1B27VM69SXKF3T65EPCAP8KNP7AVMAH1Q5161TA8310RNR0",
        )
        .unwrap();
        let key = policy_key_derive(&shares, &salt).unwrap();
        assert_eq!(
            key.to_crockford(),
            "431NKRGWG43P4THPFQT7C1NPKJKM1FA8X6163CNMEGXN51Y2MCNEVN5154G8FM8TXMZ5FVSXAX26WV8M5HJYGZA0R8YFH3V8PKK9PX0"
        );
    }

    #[test]
    fn truth_round_trip() {
        let key = TruthKey::random();
        let nonce = fresh_nonce();
        let ct = encrypt_truth(&nonce, &key, b"+41 79 555 0000").unwrap();
        assert_eq!(&ct[..NONCE_LEN], &nonce);
        assert_eq!(decrypt_truth(&key, &ct).unwrap(), b"+41 79 555 0000");
    }

    #[test]
    fn wrong_purpose_fails() {
        let seed = [4u8; 64];
        let ct = encrypt(&seed, b"payload", "ect").unwrap();
        assert_eq!(decrypt(&seed, &ct, "eks"), Err(CryptoError::CryptographicMismatch));
    }

    #[test]
    fn tampering_is_detected() {
        let seed = [4u8; 64];
        let mut ct = encrypt(&seed, b"payload", "ect").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 1;
        assert_eq!(decrypt(&seed, &ct, "ect"), Err(CryptoError::CryptographicMismatch));
    }

    #[test]
    fn truncated_input_rejected() {
        assert_eq!(decrypt(&[0; 32], &[0; 10], "ect"), Err(CryptoError::Truncated(10)));
    }

    #[test]
    fn key_share_uses_answer_as_purpose() {
        let uid = UserIdentifier::from_bytes([8; 64]);
        let share = KeyShare::random();
        let ct = encrypt_key_share(&share, &uid, Some("blue")).unwrap();
        assert!(decrypt_key_share(&ct, &uid, None).is_err());
        assert!(decrypt_key_share(&ct, &uid, Some("green")).is_err());
        assert_eq!(decrypt_key_share(&ct, &uid, Some("blue")).unwrap(), share);
    }

    #[test]
    fn core_secret_recoverable_through_every_policy() {
        let keys = [PolicyKey::random(), PolicyKey::random(), PolicyKey::random()];
        let enc = core_secret_encrypt(&keys, b"wallet backup key").unwrap();
        assert_eq!(enc.encrypted_master_keys.len(), 3);
        for (pk, emk) in keys.iter().zip(&enc.encrypted_master_keys) {
            let secret = core_secret_recover(emk, pk, &enc.encrypted_core_secret).unwrap();
            assert_eq!(secret, b"wallet backup key");
        }
        let wrong = core_secret_recover(&enc.encrypted_master_keys[0], &keys[1], &enc.encrypted_core_secret);
        assert_eq!(wrong, Err(CryptoError::CryptographicMismatch));
    }

    #[test]
    fn recovery_document_round_trip() {
        let uid = UserIdentifier::from_bytes([2; 64]);
        let ct = encrypt_recovery_document(&uid, b"{\"policies\":[]}").unwrap();
        assert_eq!(decrypt_recovery_document(&uid, &ct).unwrap(), b"{\"policies\":[]}");
        let other = UserIdentifier::from_bytes([3; 64]);
        assert!(decrypt_recovery_document(&other, &ct).is_err());
    }
}
