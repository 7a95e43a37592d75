//! The recovery document.
//!
//! A recovery document lists every escrowed truth and every policy over
//! those truths. It holds the core secret only in encrypted form: the
//! secret is encrypted under a random master key, and the master key once
//! per policy under a key derived from that policy's key shares. The
//! document itself is stored encrypted under the user identifier at each
//! provider, signed with the matching account key.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use purse_crypto::{
    account_keypair_derive, core_secret_recover, crockford, decrypt_recovery_document, encrypt_recovery_document,
    hash, policy_key_derive, verify_signature, CryptoError, KeyShare, TruthKey, UserIdentifier,
};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::auth::AuthMethodType;
use crate::error::RecoveryError;

/// Signature purpose of a policy upload.
pub const POLICY_UPLOAD_PURPOSE: u32 = 1400;

/// Identifier of one escrowed truth at its provider.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TruthUuid([u8; 32]);

impl TruthUuid {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TruthUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crockford::encode(&self.0))
    }
}

impl fmt::Debug for TruthUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TruthUuid({self})")
    }
}

impl FromStr for TruthUuid {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crockford::decode_array::<32>(s).map(Self)
    }
}

impl Serialize for TruthUuid {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TruthUuid {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Where and how one truth is escrowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowMethod {
    pub uuid: TruthUuid,
    pub url: String,
    pub escrow_type: AuthMethodType,
    pub instructions: String,
    /// Key the provider needs to decrypt the truth when a challenge starts.
    pub truth_key: TruthKey,
    #[serde(with = "crockford::serde_array")]
    pub truth_salt: [u8; 16],
    #[serde(with = "crockford::serde_bytes")]
    pub provider_salt: Vec<u8>,
}

/// One way of decrypting the master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionPolicy {
    /// Truths whose key shares, in this order, form the policy key.
    pub uuids: Vec<TruthUuid>,
    #[serde(with = "crockford::serde_array")]
    pub salt: [u8; 64],
    /// Master key encrypted under the policy key.
    #[serde(with = "crockford::serde_bytes")]
    pub master_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(with = "crockford::serde_bytes")]
    pub encrypted_core_secret: Vec<u8>,
    pub escrow_methods: Vec<EscrowMethod>,
    pub policies: Vec<DecryptionPolicy>,
}

impl RecoveryDocument {
    /// Check internal consistency: at least one policy, no empty policy,
    /// unique escrow uuids, and every policy uuid listed as an escrow method.
    pub fn validate(&self) -> Result<(), RecoveryError> {
        if self.policies.is_empty() {
            return Err(RecoveryError::InvalidDocument("no policies".into()));
        }
        let mut seen = BTreeMap::new();
        for m in &self.escrow_methods {
            if seen.insert(m.uuid, m).is_some() {
                return Err(RecoveryError::InvalidDocument(format!("duplicate escrow method {}", m.uuid)));
            }
        }
        for (i, policy) in self.policies.iter().enumerate() {
            if policy.uuids.is_empty() {
                return Err(RecoveryError::InvalidDocument(format!("policy {i} has no truths")));
            }
            if let Some(missing) = policy.uuids.iter().find(|u| !seen.contains_key(*u)) {
                return Err(RecoveryError::InvalidDocument(format!("policy {i} refers to unknown truth {missing}")));
            }
        }
        Ok(())
    }

    pub fn escrow_method(&self, uuid: &TruthUuid) -> Option<&EscrowMethod> {
        self.escrow_methods.iter().find(|m| &m.uuid == uuid)
    }

    /// Decrypt the core secret through policy `index`, given its key
    /// shares in the policy's uuid order.
    ///
    /// # Errors
    ///
    /// [`RecoveryError::UnknownPolicy`] for a bad index, and
    /// [`CryptoError::CryptographicMismatch`] when a share is wrong.
    pub fn recover(&self, index: usize, shares: &[KeyShare]) -> Result<Vec<u8>, RecoveryError> {
        let policy = self.policies.get(index).ok_or(RecoveryError::UnknownPolicy(index))?;
        if shares.len() != policy.uuids.len() {
            return Err(RecoveryError::InvalidDocument(format!(
                "policy {index} needs {} key shares, got {}",
                policy.uuids.len(),
                shares.len()
            )));
        }
        let policy_key = policy_key_derive(shares, &policy.salt)?;
        Ok(core_secret_recover(&policy.master_key, &policy_key, &self.encrypted_core_secret)?)
    }

    /// Decrypt the core secret through the first policy whose key shares
    /// are all in `shares`. `Ok(None)` while no policy is complete.
    pub fn try_recover(&self, shares: &BTreeMap<TruthUuid, KeyShare>) -> Result<Option<Vec<u8>>, RecoveryError> {
        for (index, policy) in self.policies.iter().enumerate() {
            let found: Option<Vec<KeyShare>> = policy.uuids.iter().map(|u| shares.get(u).cloned()).collect();
            if let Some(found) = found {
                debug!(policy = index, "policy complete, decrypting core secret");
                return self.recover(index, &found).map(Some);
            }
        }
        Ok(None)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RecoveryError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecoveryError> {
        let doc: Self = serde_json::from_slice(bytes)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Encrypt for storage at the provider that knows the user as `user_id`.
    pub fn encrypt(&self, user_id: &UserIdentifier) -> Result<Vec<u8>, RecoveryError> {
        Ok(encrypt_recovery_document(user_id, &self.to_bytes()?)?)
    }

    pub fn decrypt(user_id: &UserIdentifier, encrypted: &[u8]) -> Result<Self, RecoveryError> {
        let plain = decrypt_recovery_document(user_id, encrypted)?;
        Self::from_bytes(&plain)
    }
}

/// A signed, encrypted recovery document ready for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpload {
    #[serde(with = "crockford::serde_array")]
    pub account_pub: [u8; 32],
    #[serde(with = "crockford::serde_bytes")]
    pub encrypted_document: Vec<u8>,
    /// SHA-512 of `encrypted_document`.
    #[serde(with = "crockford::serde_array")]
    pub body_hash: [u8; 64],
    #[serde(with = "crockford::serde_array")]
    pub signature: [u8; 64],
}

impl PolicyUpload {
    /// Encrypt `document` for `user_id` and sign it with the derived
    /// account key.
    pub fn new(document: &RecoveryDocument, user_id: &UserIdentifier) -> Result<Self, RecoveryError> {
        let account = account_keypair_derive(user_id)?;
        let encrypted_document = document.encrypt(user_id)?;
        let body_hash = hash(&encrypted_document);
        let signature = account.sign(&signed_purpose(POLICY_UPLOAD_PURPOSE, &body_hash));
        Ok(Self { account_pub: *account.public_bytes(), encrypted_document, body_hash, signature })
    }

    /// Check the body hash and the account signature.
    pub fn verify(&self) -> Result<(), RecoveryError> {
        if hash(&self.encrypted_document) != self.body_hash {
            return Err(CryptoError::CryptographicMismatch.into());
        }
        verify_signature(&self.account_pub, &signed_purpose(POLICY_UPLOAD_PURPOSE, &self.body_hash), &self.signature)?;
        Ok(())
    }
}

/// `size (u32 BE) || purpose (u32 BE) || body`, the message an account
/// key signs.
fn signed_purpose(purpose: u32, body: &[u8]) -> Vec<u8> {
    let size = (8 + body.len()) as u32;
    let mut msg = Vec::with_capacity(8 + body.len());
    msg.extend_from_slice(&size.to_be_bytes());
    msg.extend_from_slice(&purpose.to_be_bytes());
    msg.extend_from_slice(body);
    msg
}
