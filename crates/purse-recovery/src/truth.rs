//! Preparing truths and the recovery document for a backup.

use std::collections::HashMap;

use purse_crypto::{
    core_secret_encrypt, crockford, encrypt_key_share, encrypt_truth, fresh_nonce, policy_key_derive,
    secure_answer_hash, KeyShare, PolicyKey, TruthKey, UserIdentifier, NONCE_LEN,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{AuthMethod, AuthMethodType, ProviderInfo};
use crate::document::{DecryptionPolicy, EscrowMethod, RecoveryDocument, TruthUuid};
use crate::error::RecoveryError;
use crate::policy::Policy;

/// How long providers are asked to keep a truth.
pub const STORAGE_DURATION_YEARS: u32 = 5;

/// Secrets generated for one (method, provider) pair.
///
/// A truth is shared by every policy that places the same method at the
/// same provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruthMetadata {
    pub authentication_method: usize,
    pub provider: String,
    pub uuid: TruthUuid,
    pub key_share: KeyShare,
    #[serde(with = "crockford::serde_array")]
    pub nonce: [u8; NONCE_LEN],
    #[serde(with = "crockford::serde_array")]
    pub truth_salt: [u8; 16],
    pub truth_key: TruthKey,
    /// First policy using this truth, and the truth's position in it.
    pub policy_index: usize,
    pub pol_method_index: usize,
}

impl TruthMetadata {
    /// `"<method index>:<provider url>"`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.authentication_method, self.provider)
    }
}

/// Everything a backup uploads: the recovery document plus one truth per
/// (method, provider) pair, in first-use order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryData {
    pub recovery_document: RecoveryDocument,
    pub truth_metadata: Vec<TruthMetadata>,
}

/// Body of a truth upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruthUploadRequest {
    #[serde(with = "crockford::serde_bytes")]
    pub encrypted_truth: Vec<u8>,
    #[serde(with = "crockford::serde_bytes")]
    pub key_share_data: Vec<u8>,
    pub storage_duration_years: u32,
    #[serde(rename = "type")]
    pub method_type: AuthMethodType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_mime: Option<String>,
}

fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

/// Generate truths, policy keys and the recovery document for `policies`.
///
/// # Errors
///
/// [`RecoveryError::UnknownMethod`] / [`RecoveryError::UnknownProvider`]
/// when a policy refers to a method or provider not given.
pub fn prepare_recovery_data(
    secret_name: Option<&str>,
    core_secret: &[u8],
    methods: &[AuthMethod],
    policies: &[Policy],
    providers: &[ProviderInfo],
) -> Result<RecoveryData, RecoveryError> {
    if policies.is_empty() {
        return Err(RecoveryError::PolicyUnsatisfiable);
    }
    let mut truths: Vec<TruthMetadata> = Vec::new();
    let mut by_reference: HashMap<(usize, &str), usize> = HashMap::new();
    let mut policy_keys: Vec<PolicyKey> = Vec::with_capacity(policies.len());
    let mut policy_salts: Vec<[u8; 64]> = Vec::with_capacity(policies.len());
    let mut policy_uuids: Vec<Vec<TruthUuid>> = Vec::with_capacity(policies.len());

    for (policy_index, policy) in policies.iter().enumerate() {
        let salt: [u8; 64] = random_array();
        let mut shares = Vec::with_capacity(policy.methods.len());
        let mut uuids = Vec::with_capacity(policy.methods.len());
        for (pol_method_index, m) in policy.methods.iter().enumerate() {
            if m.authentication_method >= methods.len() {
                return Err(RecoveryError::UnknownMethod(m.authentication_method));
            }
            let slot = *by_reference.entry((m.authentication_method, m.provider.as_str())).or_insert_with(|| {
                truths.push(TruthMetadata {
                    authentication_method: m.authentication_method,
                    provider: m.provider.clone(),
                    uuid: TruthUuid::random(),
                    key_share: KeyShare::random(),
                    nonce: fresh_nonce(),
                    truth_salt: random_array(),
                    truth_key: TruthKey::random(),
                    policy_index,
                    pol_method_index,
                });
                truths.len() - 1
            });
            shares.push(truths[slot].key_share.clone());
            uuids.push(truths[slot].uuid);
        }
        policy_keys.push(policy_key_derive(&shares, &salt)?);
        policy_salts.push(salt);
        policy_uuids.push(uuids);
    }

    let encrypted = core_secret_encrypt(&policy_keys, core_secret)?;

    let mut escrow_methods = Vec::with_capacity(truths.len());
    for tm in &truths {
        let method = &methods[tm.authentication_method];
        let provider = find_provider(providers, &tm.provider)?;
        escrow_methods.push(EscrowMethod {
            uuid: tm.uuid,
            url: tm.provider.clone(),
            escrow_type: method.method_type,
            instructions: method.instructions.clone(),
            truth_key: tm.truth_key.clone(),
            truth_salt: tm.truth_salt,
            provider_salt: provider.salt.clone(),
        });
    }

    let recovery_document = RecoveryDocument {
        secret_name: secret_name.map(str::to_string),
        encrypted_core_secret: encrypted.encrypted_core_secret,
        escrow_methods,
        policies: policy_uuids
            .into_iter()
            .zip(policy_salts)
            .zip(encrypted.encrypted_master_keys)
            .map(|((uuids, salt), master_key)| DecryptionPolicy { uuids, salt, master_key })
            .collect(),
    };
    info!(policies = policies.len(), truths = truths.len(), "recovery data prepared");
    Ok(RecoveryData { recovery_document, truth_metadata: truths })
}

pub(crate) fn find_provider<'a>(providers: &'a [ProviderInfo], url: &str) -> Result<&'a ProviderInfo, RecoveryError> {
    providers
        .iter()
        .find(|p| p.url == url)
        .ok_or_else(|| RecoveryError::UnknownProvider(url.to_string()))
}

/// What the provider stores as the truth of `method`: the salted answer
/// hash for security questions, the raw challenge otherwise.
pub fn truth_value(method: &AuthMethod, uuid: &TruthUuid, truth_salt: &[u8]) -> Result<Vec<u8>, RecoveryError> {
    match method.method_type {
        AuthMethodType::Question => {
            let answer_hash = secure_answer_hash(method.challenge_text()?, uuid.as_bytes(), truth_salt)?;
            Ok(crockford::decode(&answer_hash)?)
        }
        AuthMethodType::Sms | AuthMethodType::Email | AuthMethodType::Totp | AuthMethodType::Iban => {
            Ok(method.challenge.clone())
        }
    }
}

/// Build the upload for one truth. `user_id` is the user's identifier at
/// the truth's provider.
pub fn truth_upload(
    method: &AuthMethod,
    truth: &TruthMetadata,
    user_id: &UserIdentifier,
) -> Result<TruthUploadRequest, RecoveryError> {
    let value = truth_value(method, &truth.uuid, &truth.truth_salt)?;
    let encrypted_truth = encrypt_truth(&truth.nonce, &truth.truth_key, &value)?;
    let answer = match method.method_type {
        AuthMethodType::Question => Some(method.challenge_text()?),
        _ => None,
    };
    let key_share_data = encrypt_key_share(&truth.key_share, user_id, answer)?;
    debug!(uuid = %truth.uuid, provider = %truth.provider, method = %method.method_type, "truth upload built");
    Ok(TruthUploadRequest {
        encrypted_truth,
        key_share_data,
        storage_duration_years: STORAGE_DURATION_YEARS,
        method_type: method.method_type,
        truth_mime: method.mime_type.clone(),
    })
}
