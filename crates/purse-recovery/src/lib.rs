//! # purse-recovery
//! Key backup and recovery for Purse wallets.
//!
//! The wallet's core secret is split across authentication methods
//! escrowed at independent providers. Any one policy's set of solved
//! challenges is enough to decrypt it again.
//!
//! # Modules
//!
//! - [`auth`]: authentication methods and provider offers
//! - [`policy`]: suggesting policies over methods and providers
//! - [`truth`]: truth generation, recovery data and truth uploads
//! - [`document`]: the recovery document, its encryption and signed upload
//! - [`challenge`]: challenge feedback states and answer hashing
//! - [`provider`]: the provider interface consumed by backup and recovery
//! - [`backup`]: uploading a prepared backup
//! - [`session`]: recovering the secret from providers

pub mod auth;
pub mod backup;
pub mod challenge;
pub mod document;
pub mod error;
pub mod policy;
pub mod provider;
pub mod session;
pub mod truth;

pub use auth::{AuthMethod, AuthMethodType, ProviderInfo};
pub use backup::{upload_backup, BackupOutcome};
pub use challenge::{challenge_response, ChallengeAnswer, ChallengeFeedback};
pub use document::{DecryptionPolicy, EscrowMethod, PolicyUpload, RecoveryDocument, TruthUuid};
pub use error::RecoveryError;
pub use policy::{suggest_policies, Policy, PolicyMethod, PolicySelection};
pub use provider::{FetchedPolicy, RecoveryProvider, TruthResponse, UploadStatus};
pub use session::RecoverySession;
pub use truth::{prepare_recovery_data, truth_upload, truth_value, RecoveryData, TruthMetadata, TruthUploadRequest};
