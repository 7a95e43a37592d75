//! Error types for backup and recovery.
use purse_crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    #[error("no authentication methods given")] NoMethods,
    #[error("no policy can be satisfied by the available providers")] PolicyUnsatisfiable,
    #[error("policy refers to unknown authentication method {0}")] UnknownMethod(usize),
    #[error("unknown provider: {0}")] UnknownProvider(String),
    #[error("unknown truth: {0}")] UnknownTruth(String),
    #[error("policy index {0} out of range")] UnknownPolicy(usize),
    #[error("missing key share for truth {0}")] MissingKeyShare(String),
    #[error("invalid recovery document: {0}")] InvalidDocument(String),
    #[error("invalid answer: {0}")] InvalidAnswer(String),
    #[error("provider {url} failed: {reason}")] Provider { url: String, reason: String },
    #[error("no provider holds a recovery document")] DocumentNotFound,
    #[error("serialization: {0}")] Serialization(String),
    #[error(transparent)] Crypto(#[from] CryptoError),
}

impl From<serde_json::Error> for RecoveryError {
    fn from(e: serde_json::Error) -> Self {
        RecoveryError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_errors_pass_through() {
        let e: RecoveryError = CryptoError::CryptographicMismatch.into();
        assert_eq!(e.to_string(), CryptoError::CryptographicMismatch.to_string());
    }

    #[test]
    fn provider_display() {
        let e = RecoveryError::Provider { url: "https://p1/".into(), reason: "http 500".into() };
        assert_eq!(e.to_string(), "provider https://p1/ failed: http 500");
    }
}
