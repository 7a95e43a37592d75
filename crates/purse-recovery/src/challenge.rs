//! Challenge feedback and answers.

use purse_core::Amount;
use purse_crypto::{pin_answer_hash, secure_answer_hash};
use serde::{Deserialize, Serialize};

use crate::auth::AuthMethodType;
use crate::document::EscrowMethod;
use crate::error::RecoveryError;

/// State of one challenge as last reported by its provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ChallengeFeedback {
    /// The key share was released.
    Solved,
    /// The provider does not offer this method.
    Unsupported { http_status: u16, unsupported_method: String },
    RateLimitExceeded,
    /// The user must wire `challenge_amount` with `wire_transfer_subject`
    /// to `credit_iban`. `answer_code` unlocks the truth once the transfer
    /// arrives.
    AuthIban {
        challenge_amount: Amount,
        credit_iban: String,
        business_name: String,
        wire_transfer_subject: String,
        answer_code: u64,
    },
    /// Challenge sent, answer not yet given.
    Pending,
    /// Free-form instructions from the provider.
    Message { message: String },
    ServerFailure {
        http_status: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_response: Option<serde_json::Value>,
    },
    TruthUnknown,
    Redirect { http_status: u16, redirect_url: String },
    Payment { taler_pay_uri: String, provider: String, payment_secret: String },
}

impl ChallengeFeedback {
    /// The `state` tag.
    pub fn state(&self) -> &'static str {
        match self {
            Self::Solved => "solved",
            Self::Unsupported { .. } => "unsupported",
            Self::RateLimitExceeded => "rate-limit-exceeded",
            Self::AuthIban { .. } => "auth-iban",
            Self::Pending => "pending",
            Self::Message { .. } => "message",
            Self::ServerFailure { .. } => "server-failure",
            Self::TruthUnknown => "truth-unknown",
            Self::Redirect { .. } => "redirect",
            Self::Payment { .. } => "payment",
        }
    }

    /// Whether polling may change the state without user input.
    pub fn is_pollable(&self) -> bool {
        matches!(self, Self::AuthIban { .. })
    }
}

/// What the user supplies to solve a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeAnswer {
    /// Free text: the answer of a question, or a code as typed.
    Answer(String),
    Pin(u64),
}

/// Hash sent to the provider to solve the challenge of `escrow`.
///
/// Question answers are hashed with the truth's uuid and salt. Code-based
/// challenges take a PIN, given directly or typed as text with an optional
/// `A-` prefix.
pub fn challenge_response(escrow: &EscrowMethod, answer: &ChallengeAnswer) -> Result<String, RecoveryError> {
    match (escrow.escrow_type, answer) {
        (AuthMethodType::Question, ChallengeAnswer::Answer(text)) => {
            Ok(secure_answer_hash(text, escrow.uuid.as_bytes(), &escrow.truth_salt)?)
        }
        (AuthMethodType::Question, ChallengeAnswer::Pin(_)) => {
            Err(RecoveryError::InvalidAnswer("security questions need a text answer".into()))
        }
        (_, ChallengeAnswer::Pin(pin)) => Ok(pin_answer_hash(*pin)),
        (_, ChallengeAnswer::Answer(text)) => {
            let code = text.trim();
            let code = code.strip_prefix("A-").unwrap_or(code);
            let pin: u64 = code
                .parse()
                .map_err(|_| RecoveryError::InvalidAnswer(format!("not a numeric code: {text:?}")))?;
            Ok(pin_answer_hash(pin))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TruthUuid;
    use purse_crypto::TruthKey;
    use serde_json::json;

    fn escrow(t: AuthMethodType) -> EscrowMethod {
        EscrowMethod {
            uuid: TruthUuid::from_bytes([4; 32]),
            url: "https://p1/".into(),
            escrow_type: t,
            instructions: String::new(),
            truth_key: TruthKey::from_bytes([1; 64]),
            truth_salt: [2; 16],
            provider_salt: Vec::new(),
        }
    }

    #[test]
    fn feedback_is_tagged_by_state() {
        assert_eq!(serde_json::to_value(ChallengeFeedback::Solved).unwrap(), json!({"state": "solved"}));
        assert_eq!(
            serde_json::to_value(ChallengeFeedback::RateLimitExceeded).unwrap(),
            json!({"state": "rate-limit-exceeded"})
        );
        let fb: ChallengeFeedback = serde_json::from_value(json!({
            "state": "auth-iban",
            "challenge_amount": "EUR:1",
            "credit_iban": "DE89370400440532013000",
            "business_name": "Provider",
            "wire_transfer_subject": "Anastasis 42",
            "answer_code": 42
        }))
        .unwrap();
        assert!(fb.is_pollable());
        let fb: ChallengeFeedback =
            serde_json::from_value(json!({"state": "server-failure", "http_status": 500})).unwrap();
        assert_eq!(fb, ChallengeFeedback::ServerFailure { http_status: 500, error_response: None });
        assert!(serde_json::from_value::<ChallengeFeedback>(json!({"state": "bogus"})).is_err());
        let redirect = ChallengeFeedback::Redirect { http_status: 303, redirect_url: "https://x/".into() };
        assert_eq!(serde_json::to_value(&redirect).unwrap()["state"], redirect.state());
    }

    #[test]
    fn code_answers_accept_prefix_and_whitespace() {
        let e = escrow(AuthMethodType::Sms);
        let expected = pin_answer_hash(1234);
        assert_eq!(challenge_response(&e, &ChallengeAnswer::Pin(1234)).unwrap(), expected);
        assert_eq!(challenge_response(&e, &ChallengeAnswer::Answer(" A-1234 ".into())).unwrap(), expected);
        assert_eq!(challenge_response(&e, &ChallengeAnswer::Answer("1234".into())).unwrap(), expected);
        assert!(challenge_response(&e, &ChallengeAnswer::Answer("12ab".into())).is_err());
    }

    #[test]
    fn question_answers_are_salted() {
        let e = escrow(AuthMethodType::Question);
        let a = challenge_response(&e, &ChallengeAnswer::Answer("blue".into())).unwrap();
        let mut other = e.clone();
        other.truth_salt = [3; 16];
        assert_ne!(a, challenge_response(&other, &ChallengeAnswer::Answer("blue".into())).unwrap());
        assert!(challenge_response(&e, &ChallengeAnswer::Pin(1)).is_err());
    }
}
