//! Error types for cryptographic operations.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid base32 character: {0:?}")] InvalidEncoding(char),
    #[error("invalid length: expected {expected} bytes, got {got}")] InvalidLength { expected: usize, got: usize },
    #[error("key derivation: {0}")] Kdf(String),
    #[error("argon2: {0}")] Argon2(String),
    #[error("encryption: {0}")] Encryption(String),
    #[error("ciphertext too short: {0} bytes")] Truncated(usize),
    #[error("cryptographic mismatch: authentication tag or hash did not verify")] CryptographicMismatch,
    #[error("forgettable document: {0}")] Forgettable(String),
    #[error("canonical JSON: {0}")] Canonicalization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mismatch() {
        let e = CryptoError::CryptographicMismatch;
        assert!(e.to_string().starts_with("cryptographic mismatch"));
    }

    #[test]
    fn display_invalid_length() {
        let e = CryptoError::InvalidLength { expected: 32, got: 31 };
        assert_eq!(e.to_string(), "invalid length: expected 32 bytes, got 31");
    }
}
