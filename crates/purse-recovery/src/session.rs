//! Recovering a secret: fetch the document, solve challenges, decrypt.

use std::collections::BTreeMap;

use purse_crypto::{account_keypair_derive, decrypt_key_share, KeyShare};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{AuthMethodType, ProviderInfo};
use crate::backup::UserIds;
use crate::challenge::{challenge_response, ChallengeAnswer, ChallengeFeedback};
use crate::document::{EscrowMethod, RecoveryDocument, TruthUuid};
use crate::error::RecoveryError;
use crate::provider::{RecoveryProvider, TruthResponse};

/// A recovery in progress.
pub struct RecoverySession {
    identity: Value,
    document: RecoveryDocument,
    provider: String,
    version: u64,
    key_shares: BTreeMap<TruthUuid, KeyShare>,
    feedback: BTreeMap<TruthUuid, ChallengeFeedback>,
}

impl RecoverySession {
    /// Download the recovery document from the first of `providers` that
    /// holds one for `identity`.
    pub async fn fetch(
        api: &dyn RecoveryProvider,
        identity: Value,
        providers: &[ProviderInfo],
    ) -> Result<Self, RecoveryError> {
        let mut user_ids = UserIds::new(&identity);
        let mut found = None;
        for provider in providers {
            let user_id = user_ids.get(&provider.salt)?;
            let account = account_keypair_derive(&user_id)?;
            match api.fetch_policy(&provider.url, account.public_bytes()).await {
                Ok(Some(fetched)) => {
                    let document = RecoveryDocument::decrypt(&user_id, &fetched.encrypted_document)?;
                    found = Some((document, provider.url.clone(), fetched.version));
                    break;
                }
                Ok(None) => debug!(provider = %provider.url, "no recovery document"),
                Err(e) => warn!(provider = %provider.url, error = %e, "fetching recovery document failed"),
            }
        }
        let (document, provider, version) = found.ok_or(RecoveryError::DocumentNotFound)?;
        info!(provider = %provider, version, policies = document.policies.len(), "recovery document fetched");
        Ok(Self::from_document(identity, document, provider, version))
    }

    /// Resume from a document obtained elsewhere.
    pub fn from_document(identity: Value, document: RecoveryDocument, provider: String, version: u64) -> Self {
        Self { identity, document, provider, version, key_shares: BTreeMap::new(), feedback: BTreeMap::new() }
    }

    pub fn document(&self) -> &RecoveryDocument {
        &self.document
    }

    /// Provider the document came from, and its version there.
    pub fn source(&self) -> (&str, u64) {
        (&self.provider, self.version)
    }

    pub fn feedback(&self, uuid: &TruthUuid) -> Option<&ChallengeFeedback> {
        self.feedback.get(uuid)
    }

    pub fn is_solved(&self, uuid: &TruthUuid) -> bool {
        self.key_shares.contains_key(uuid)
    }

    fn escrow(&self, uuid: &TruthUuid) -> Result<EscrowMethod, RecoveryError> {
        self.document.escrow_method(uuid).cloned().ok_or_else(|| RecoveryError::UnknownTruth(uuid.to_string()))
    }

    /// Ask the provider to send the challenge of `uuid` (e.g. the SMS code).
    /// Security questions need no start.
    pub async fn start_challenge(
        &mut self,
        api: &dyn RecoveryProvider,
        uuid: &TruthUuid,
    ) -> Result<ChallengeFeedback, RecoveryError> {
        let escrow = self.escrow(uuid)?;
        if escrow.escrow_type == AuthMethodType::Question {
            self.feedback.insert(*uuid, ChallengeFeedback::Pending);
            return Ok(ChallengeFeedback::Pending);
        }
        let response = api.request_truth(&escrow.url, uuid, &escrow.truth_key, None).await?;
        self.handle(&escrow, response, None)
    }

    /// Answer the challenge of `uuid`.
    pub async fn solve(
        &mut self,
        api: &dyn RecoveryProvider,
        uuid: &TruthUuid,
        answer: &ChallengeAnswer,
    ) -> Result<ChallengeFeedback, RecoveryError> {
        let escrow = self.escrow(uuid)?;
        let hash = challenge_response(&escrow, answer)?;
        let response = api.request_truth(&escrow.url, uuid, &escrow.truth_key, Some(&hash)).await?;
        let question_answer = match (escrow.escrow_type, answer) {
            (AuthMethodType::Question, ChallengeAnswer::Answer(text)) => Some(text.as_str()),
            _ => None,
        };
        self.handle(&escrow, response, question_answer)
    }

    /// Re-check challenges that can complete without user input, such as
    /// bank transfers.
    pub async fn poll(&mut self, api: &dyn RecoveryProvider) -> Result<(), RecoveryError> {
        let pollable: Vec<(TruthUuid, u64)> = self
            .feedback
            .iter()
            .filter_map(|(uuid, fb)| match fb {
                ChallengeFeedback::AuthIban { answer_code, .. } => Some((*uuid, *answer_code)),
                _ => None,
            })
            .collect();
        for (uuid, code) in pollable {
            if self.try_recover()?.is_some() {
                break;
            }
            self.solve(api, &uuid, &ChallengeAnswer::Pin(code)).await?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        escrow: &EscrowMethod,
        response: TruthResponse,
        question_answer: Option<&str>,
    ) -> Result<ChallengeFeedback, RecoveryError> {
        let feedback = match response {
            TruthResponse::KeyShare(encrypted) => {
                let user_id = UserIds::new(&self.identity).get(&escrow.provider_salt)?;
                let share = decrypt_key_share(&encrypted, &user_id, question_answer)?;
                self.key_shares.insert(escrow.uuid, share);
                info!(uuid = %escrow.uuid, provider = %escrow.url, "challenge solved");
                ChallengeFeedback::Solved
            }
            TruthResponse::Challenge(feedback) => {
                debug!(uuid = %escrow.uuid, provider = %escrow.url, state = feedback.state(), "challenge feedback");
                feedback
            }
        };
        self.feedback.insert(escrow.uuid, feedback.clone());
        Ok(feedback)
    }

    /// The core secret, once every truth of some policy is solved.
    pub fn try_recover(&self) -> Result<Option<Vec<u8>>, RecoveryError> {
        self.document.try_recover(&self.key_shares)
    }
}
