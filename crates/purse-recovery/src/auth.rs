//! Authentication methods and the providers that escrow them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use purse_core::Amount;
use purse_crypto::crockford;
use serde::{Deserialize, Serialize};

use crate::error::RecoveryError;

/// Kind of challenge a provider runs before releasing a key share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethodType {
    Question,
    Sms,
    Email,
    Totp,
    Iban,
}

impl AuthMethodType {
    pub const ALL: [AuthMethodType; 5] = [Self::Question, Self::Sms, Self::Email, Self::Totp, Self::Iban];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Sms => "sms",
            Self::Email => "email",
            Self::Totp => "totp",
            Self::Iban => "iban",
        }
    }
}

impl fmt::Display for AuthMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethodType {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RecoveryError::InvalidDocument(format!("unknown authentication method type {s:?}")))
    }
}

/// One way for the user to prove who they are.
///
/// `challenge` is the secret the provider checks against: the answer of a
/// security question, a phone number, an e-mail address, a TOTP secret or
/// an account number.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMethod {
    #[serde(rename = "type")]
    pub method_type: AuthMethodType,
    pub instructions: String,
    #[serde(with = "crockford::serde_bytes")]
    pub challenge: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl AuthMethod {
    pub fn new(method_type: AuthMethodType, instructions: &str, challenge: &[u8]) -> Self {
        Self { method_type, instructions: instructions.to_string(), challenge: challenge.to_vec(), mime_type: None }
    }

    /// Security question with its answer.
    pub fn question(question: &str, answer: &str) -> Self {
        Self::new(AuthMethodType::Question, question, answer.as_bytes())
    }

    /// The challenge as text, for methods whose challenge is a string.
    pub fn challenge_text(&self) -> Result<&str, RecoveryError> {
        std::str::from_utf8(&self.challenge)
            .map_err(|_| RecoveryError::InvalidAnswer(format!("{} challenge is not UTF-8", self.method_type)))
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthMethod")
            .field("type", &self.method_type)
            .field("instructions", &self.instructions)
            .field("challenge", &"[REDACTED]")
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// What a provider offers: supported method types with their cost, and
/// the salt users derive their identifier with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub url: String,
    /// Cost per method type. Types this crate does not know are kept so a
    /// provider listing can be stored and forwarded unchanged.
    pub method_cost: BTreeMap<String, Amount>,
    #[serde(with = "crockford::serde_bytes")]
    pub salt: Vec<u8>,
}

impl ProviderInfo {
    pub fn new(url: &str, salt: &[u8]) -> Self {
        Self { url: url.to_string(), method_cost: BTreeMap::new(), salt: salt.to_vec() }
    }

    pub fn with_method(mut self, method_type: AuthMethodType, cost: Amount) -> Self {
        self.method_cost.insert(method_type.to_string(), cost);
        self
    }

    pub fn supports(&self, method_type: AuthMethodType) -> bool {
        self.method_cost.contains_key(method_type.as_str())
    }
}
