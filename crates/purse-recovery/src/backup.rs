//! Uploading a prepared backup.

use std::collections::{BTreeMap, HashMap};

use purse_crypto::{user_identifier_derive, UserIdentifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::auth::{AuthMethod, ProviderInfo};
use crate::document::PolicyUpload;
use crate::error::RecoveryError;
use crate::provider::{RecoveryProvider, UploadStatus};
use crate::truth::{find_provider, truth_upload, RecoveryData};

/// What happened to a backup upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOutcome {
    /// Truth uploads awaiting payment, as (provider url, pay URI). While
    /// any are outstanding no policy is uploaded.
    pub truth_payments: Vec<(String, String)>,
    /// Policy uploads awaiting payment, as (provider url, pay URI).
    pub policy_payments: Vec<(String, String)>,
    /// Stored document version per provider.
    pub policy_versions: BTreeMap<String, u64>,
}

impl BackupOutcome {
    pub fn is_complete(&self) -> bool {
        self.truth_payments.is_empty() && self.policy_payments.is_empty()
    }
}

/// User identifiers per provider salt, derived once each.
pub(crate) struct UserIds<'a> {
    identity: &'a Value,
    cache: HashMap<Vec<u8>, UserIdentifier>,
}

impl<'a> UserIds<'a> {
    pub(crate) fn new(identity: &'a Value) -> Self {
        Self { identity, cache: HashMap::new() }
    }

    pub(crate) fn get(&mut self, provider_salt: &[u8]) -> Result<UserIdentifier, RecoveryError> {
        if let Some(id) = self.cache.get(provider_salt) {
            return Ok(*id);
        }
        let id = user_identifier_derive(self.identity, provider_salt)?;
        self.cache.insert(provider_salt.to_vec(), id);
        Ok(id)
    }
}

/// Upload every truth of `data`, then the recovery document to each of
/// `policy_providers`.
///
/// `identity` holds the user's identity attributes. Payment requests are
/// collected, not paid; re-running after payment uploads again.
pub async fn upload_backup(
    api: &dyn RecoveryProvider,
    identity: &Value,
    methods: &[AuthMethod],
    providers: &[ProviderInfo],
    policy_providers: &[String],
    data: &RecoveryData,
) -> Result<BackupOutcome, RecoveryError> {
    let mut user_ids = UserIds::new(identity);
    let mut outcome = BackupOutcome::default();

    for tm in &data.truth_metadata {
        let method = methods
            .get(tm.authentication_method)
            .ok_or(RecoveryError::UnknownMethod(tm.authentication_method))?;
        let provider = find_provider(providers, &tm.provider)?;
        let user_id = user_ids.get(&provider.salt)?;
        let request = truth_upload(method, tm, &user_id)?;
        match api.upload_truth(&tm.provider, &tm.uuid, &request).await? {
            UploadStatus::Stored { .. } => {}
            UploadStatus::PaymentRequired { taler_pay_uri } => {
                warn!(provider = %tm.provider, uuid = %tm.uuid, "truth upload requires payment");
                outcome.truth_payments.push((tm.provider.clone(), taler_pay_uri));
            }
        }
    }
    if !outcome.truth_payments.is_empty() {
        return Ok(outcome);
    }

    for url in policy_providers {
        let provider = find_provider(providers, url)?;
        let user_id = user_ids.get(&provider.salt)?;
        let upload = PolicyUpload::new(&data.recovery_document, &user_id)?;
        match api.upload_policy(url, &upload).await? {
            UploadStatus::Stored { version } => {
                outcome.policy_versions.insert(url.clone(), version.unwrap_or(0));
            }
            UploadStatus::PaymentRequired { taler_pay_uri } => {
                warn!(provider = %url, "policy upload requires payment");
                outcome.policy_payments.push((url.clone(), taler_pay_uri));
            }
        }
    }
    info!(
        truths = data.truth_metadata.len(),
        stored = outcome.policy_versions.len(),
        pending_payments = outcome.policy_payments.len(),
        "backup uploaded"
    );
    Ok(outcome)
}
