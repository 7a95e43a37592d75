//! Shared test helpers for E2E and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use purse_core::provider::{BlindSignature, MeltRequest, MeltResponse, ProviderKeys, WithdrawRequest};
use purse_core::{Amount, BlindingScheme, CoinPub, Denomination, DenominationId, DenominationSystem, ProviderApi, ProviderError};
use purse_crypto::{crockford, decrypt_truth, pin_answer_hash, verify_signature, BlindingKey, TruthKey};
use purse_recovery::{
    AuthMethodType, ChallengeFeedback, FetchedPolicy, PolicyUpload, RecoveryError, RecoveryProvider, TruthResponse,
    TruthUploadRequest, TruthUuid, UploadStatus,
};

pub const CURRENCY: &str = "KUDOS";

/// `KUDOS:<value>`.
pub fn kudos(value: u64) -> Amount {
    Amount::new(CURRENCY, value, 0).unwrap()
}

/// Parse an amount string such as `KUDOS:0.01`.
pub fn amount(s: &str) -> Amount {
    s.parse().unwrap()
}

/// Powers of two up to 8192, no fees.
pub fn free_system() -> DenominationSystem {
    DenominationSystem::powers_of_two(CURRENCY, 8192).unwrap()
}

/// Powers of two up to 8192 with a withdraw and a refresh fee of 0.01.
pub fn fee_system() -> DenominationSystem {
    let values: Vec<u64> = (0..14).map(|i| 1u64 << i).collect();
    let fee = amount("KUDOS:0.01");
    DenominationSystem::synthetic(CURRENCY, &values, &fee, &fee).unwrap()
}

fn denom_mask(denom: &Denomination) -> [u8; 32] {
    *blake3::hash(&denom.denom_pub).as_bytes()
}

fn xor32(a: &[u8], b: &[u8; 32]) -> Result<Vec<u8>, ProviderError> {
    if a.len() != 32 {
        return Err(ProviderError::Blinding(format!("expected 32 bytes, got {}", a.len())));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}

/// Blinding by XOR, with "signatures" that XOR in a per-denomination mask.
///
/// Blind, sign and unblind commute, which is all the wallet relies on.
/// Anyone can forge these signatures; they only exist for tests.
pub struct XorBlinding;

impl BlindingScheme for XorBlinding {
    fn blind(&self, _denom: &Denomination, coin_pub: &CoinPub, blinding_key: &BlindingKey) -> Result<Vec<u8>, ProviderError> {
        xor32(coin_pub.as_bytes(), blinding_key.as_bytes())
    }

    fn unblind(
        &self,
        _denom: &Denomination,
        _coin_pub: &CoinPub,
        signature: &BlindSignature,
        blinding_key: &BlindingKey,
    ) -> Result<Vec<u8>, ProviderError> {
        xor32(&signature.blind_sig, blinding_key.as_bytes())
    }

    fn verify(&self, denom: &Denomination, coin_pub: &CoinPub, sig: &[u8]) -> bool {
        xor32(coin_pub.as_bytes(), &denom_mask(denom)).is_ok_and(|expected| expected == sig)
    }
}

/// In-memory coin provider.
pub struct MockProvider {
    system: DenominationSystem,
    delay: Option<Duration>,
    withdraws: AtomicUsize,
    melts: Mutex<Vec<MeltRequest>>,
    failing: Mutex<HashSet<DenominationId>>,
    corrupt: Mutex<bool>,
}

impl MockProvider {
    pub fn new(system: DenominationSystem) -> Self {
        Self {
            system,
            delay: None,
            withdraws: AtomicUsize::new(0),
            melts: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            corrupt: Mutex::new(false),
        }
    }

    /// Every withdraw sleeps for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject withdraws of `denom` until [`heal`](Self::heal).
    pub fn fail_denomination(&self, denom: DenominationId) {
        self.failing.lock().insert(denom);
    }

    /// Return signatures that do not verify.
    pub fn corrupt_signatures(&self, on: bool) {
        *self.corrupt.lock() = on;
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
        *self.corrupt.lock() = false;
    }

    pub fn withdraw_count(&self) -> usize {
        self.withdraws.load(Ordering::SeqCst)
    }

    pub fn melts(&self) -> Vec<MeltRequest> {
        self.melts.lock().clone()
    }
}

#[async_trait]
impl ProviderApi for MockProvider {
    async fn keys(&self) -> Result<ProviderKeys, ProviderError> {
        Ok(ProviderKeys {
            base_url: "https://exchange.test/".into(),
            currency: self.system.currency().to_string(),
            denominations: self.system.largest_first().map(|d| (**d).clone()).collect(),
        })
    }

    async fn withdraw(&self, request: WithdrawRequest) -> Result<BlindSignature, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let denom = self
            .system
            .get(&request.denom_id)
            .ok_or_else(|| ProviderError::Rejected(format!("unknown denomination {}", request.denom_id)))?;
        if self.failing.lock().contains(&request.denom_id) {
            return Err(ProviderError::Unavailable("denomination temporarily unavailable".into()));
        }
        self.withdraws.fetch_add(1, Ordering::SeqCst);
        let mut blind_sig = xor32(&request.coin_ev, &denom_mask(denom))?;
        if *self.corrupt.lock() {
            blind_sig[0] ^= 1;
        }
        Ok(BlindSignature { blind_sig })
    }

    async fn melt(&self, request: MeltRequest) -> Result<MeltResponse, ProviderError> {
        let sig: [u8; 64] = request
            .coin_sig
            .as_slice()
            .try_into()
            .map_err(|_| ProviderError::Rejected("bad coin signature length".into()))?;
        verify_signature(request.coin_pub.as_bytes(), &request.session_commitment, &sig)
            .map_err(|_| ProviderError::Rejected("coin signature does not verify".into()))?;
        self.melts.lock().push(request);
        Ok(MeltResponse { noreveal_index: 0 })
    }
}

#[derive(Default)]
struct RecoveryState {
    truths: HashMap<(String, TruthUuid), TruthUploadRequest>,
    policies: HashMap<(String, [u8; 32]), Vec<Vec<u8>>>,
    paid: HashSet<String>,
}

/// In-memory recovery providers, keyed by URL.
///
/// Code-based challenges "send" the code from [`MockRecoveryProviders::code_for`];
/// IBAN challenges hand it out as the answer code right away.
#[derive(Default)]
pub struct MockRecoveryProviders {
    state: Mutex<RecoveryState>,
    payment_required: Mutex<HashSet<String>>,
    truth_requests: AtomicUsize,
}

impl MockRecoveryProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads to `url` answer with a payment request until [`pay`](Self::pay).
    pub fn require_payment(&self, url: &str) {
        self.payment_required.lock().insert(url.to_string());
    }

    pub fn pay(&self, url: &str) {
        self.state.lock().paid.insert(url.to_string());
    }

    /// Code sent for the challenge of `uuid`.
    pub fn code_for(uuid: &TruthUuid) -> u64 {
        let b = uuid.as_bytes();
        u64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) % 100_000_000)
    }

    pub fn truth_count(&self) -> usize {
        self.state.lock().truths.len()
    }

    pub fn policy_versions(&self, url: &str) -> usize {
        self.state.lock().policies.iter().filter(|((u, _), _)| u == url).map(|(_, v)| v.len()).sum()
    }

    pub fn truth_requests(&self) -> usize {
        self.truth_requests.load(Ordering::SeqCst)
    }

    fn needs_payment(&self, url: &str) -> bool {
        self.payment_required.lock().contains(url) && !self.state.lock().paid.contains(url)
    }
}

#[async_trait]
impl RecoveryProvider for MockRecoveryProviders {
    async fn upload_truth(
        &self,
        url: &str,
        uuid: &TruthUuid,
        request: &TruthUploadRequest,
    ) -> Result<UploadStatus, RecoveryError> {
        if self.needs_payment(url) {
            return Ok(UploadStatus::PaymentRequired { taler_pay_uri: format!("taler://pay/{url}truth") });
        }
        self.state.lock().truths.insert((url.to_string(), *uuid), request.clone());
        Ok(UploadStatus::Stored { version: None })
    }

    async fn upload_policy(&self, url: &str, upload: &PolicyUpload) -> Result<UploadStatus, RecoveryError> {
        upload.verify().map_err(|e| RecoveryError::Provider { url: url.to_string(), reason: e.to_string() })?;
        if self.needs_payment(url) {
            return Ok(UploadStatus::PaymentRequired { taler_pay_uri: format!("taler://pay/{url}policy") });
        }
        let mut state = self.state.lock();
        let versions = state.policies.entry((url.to_string(), upload.account_pub)).or_default();
        versions.push(upload.encrypted_document.clone());
        Ok(UploadStatus::Stored { version: Some(versions.len() as u64) })
    }

    async fn fetch_policy(&self, url: &str, account_pub: &[u8; 32]) -> Result<Option<FetchedPolicy>, RecoveryError> {
        let state = self.state.lock();
        Ok(state.policies.get(&(url.to_string(), *account_pub)).and_then(|versions| {
            versions.last().map(|doc| FetchedPolicy { version: versions.len() as u64, encrypted_document: doc.clone() })
        }))
    }

    async fn request_truth(
        &self,
        url: &str,
        uuid: &TruthUuid,
        truth_key: &TruthKey,
        response: Option<&str>,
    ) -> Result<TruthResponse, RecoveryError> {
        self.truth_requests.fetch_add(1, Ordering::SeqCst);
        let Some(truth) = self.state.lock().truths.get(&(url.to_string(), *uuid)).cloned() else {
            return Ok(TruthResponse::Challenge(ChallengeFeedback::TruthUnknown));
        };
        let value = decrypt_truth(truth_key, &truth.encrypted_truth)
            .map_err(|e| RecoveryError::Provider { url: url.to_string(), reason: e.to_string() })?;

        let expected = match truth.method_type {
            AuthMethodType::Question => crockford::encode(&value),
            _ => pin_answer_hash(Self::code_for(uuid)),
        };
        match response {
            Some(r) if r == expected => Ok(TruthResponse::KeyShare(truth.key_share_data)),
            Some(_) => Ok(TruthResponse::Challenge(ChallengeFeedback::Message { message: "wrong answer".into() })),
            None => Ok(TruthResponse::Challenge(match truth.method_type {
                AuthMethodType::Iban => ChallengeFeedback::AuthIban {
                    challenge_amount: amount("KUDOS:1"),
                    credit_iban: "DE89370400440532013000".into(),
                    business_name: "Escrow Provider".into(),
                    wire_transfer_subject: format!("Purse {}", Self::code_for(uuid)),
                    answer_code: Self::code_for(uuid),
                },
                _ => ChallengeFeedback::Pending,
            })),
        }
    }
}
