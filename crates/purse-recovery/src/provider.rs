//! The network side of backup and recovery.
//!
//! [`RecoveryProvider`] is consumed, not implemented, by this crate: the
//! host supplies the HTTP client. Every call names the provider by its
//! base URL.

use async_trait::async_trait;
use purse_crypto::{crockford, TruthKey};
use serde::{Deserialize, Serialize};

use crate::challenge::ChallengeFeedback;
use crate::document::{PolicyUpload, TruthUuid};
use crate::error::RecoveryError;
use crate::truth::TruthUploadRequest;

/// Outcome of storing a truth or a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadStatus {
    /// Stored. Policy uploads report the document version.
    Stored {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
    },
    /// The provider wants to be paid first.
    PaymentRequired { taler_pay_uri: String },
}

/// An encrypted recovery document as downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPolicy {
    pub version: u64,
    #[serde(with = "crockford::serde_bytes")]
    pub encrypted_document: Vec<u8>,
}

/// Answer to a truth request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruthResponse {
    /// The encrypted key share, released after a solved challenge.
    KeyShare(#[serde(with = "crockford::serde_bytes")] Vec<u8>),
    /// The challenge is not solved (yet).
    Challenge(ChallengeFeedback),
}

#[async_trait]
pub trait RecoveryProvider: Send + Sync {
    async fn upload_truth(
        &self,
        url: &str,
        uuid: &TruthUuid,
        request: &TruthUploadRequest,
    ) -> Result<UploadStatus, RecoveryError>;

    async fn upload_policy(&self, url: &str, upload: &PolicyUpload) -> Result<UploadStatus, RecoveryError>;

    /// Latest recovery document stored for `account_pub`, if any.
    async fn fetch_policy(&self, url: &str, account_pub: &[u8; 32]) -> Result<Option<FetchedPolicy>, RecoveryError>;

    /// Start (`response = None`) or solve a challenge.
    async fn request_truth(
        &self,
        url: &str,
        uuid: &TruthUuid,
        truth_key: &TruthKey,
        response: Option<&str>,
    ) -> Result<TruthResponse, RecoveryError>;
}
