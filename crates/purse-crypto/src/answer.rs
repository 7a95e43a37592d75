//! Hashing of challenge answers before they leave the device.

use crate::crockford;
use crate::error::CryptoError;
use crate::kdf::{hash, kdf, stretch};

const SECURE_ANSWER_INFO: &[u8] = b"anastasis-secure-question-hashing";

/// Hash a security question answer.
///
/// The answer is stretched with Argon2id under the truth salt, then bound
/// to the truth's uuid with the KDF. The result is the Crockford text the
/// provider compares against.
pub fn secure_answer_hash(answer: &str, truth_uuid: &[u8], truth_salt: &[u8]) -> Result<String, CryptoError> {
    let pow = stretch(answer.as_bytes(), truth_salt)?;
    let out = kdf(64, &pow, truth_uuid, SECURE_ANSWER_INFO)?;
    Ok(crockford::encode(&out))
}

/// Hash of a numeric PIN, as sent when solving code-based challenges.
pub fn pin_answer_hash(pin: u64) -> String {
    crockford::encode(&hash(pin.to_string().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_answer_reference_vector() {
        let uuid = crockford::decode("7PMDS95CVS1MGA29KN05SDJ6353TMYRW00P78D0WSQ16QTRQM090").unwrap();
        let salt = crockford::decode("71BYXM8VCEQ976FA2KXGJ096RW").unwrap();
        let h = secure_answer_hash("Blah", &uuid, &salt).unwrap();
        assert_eq!(
            h,
            "Z0CDC1ZYE15AZ7BR9F8PYTBHY5A0MEVNQEFPTEBKD31NSS4PAXTH7MZRT6HFX7H6F9KE8Y6A72ETSCWA1GCXGNAB1MVTV3R4XYCA908"
        );
    }

    #[test]
    fn answers_are_case_sensitive() {
        let uuid = [1u8; 32];
        let salt = [2u8; 16];
        assert_ne!(
            secure_answer_hash("blah", &uuid, &salt).unwrap(),
            secure_answer_hash("Blah", &uuid, &salt).unwrap()
        );
    }

    #[test]
    fn pin_hash_is_sha512_of_decimal() {
        assert_eq!(pin_answer_hash(1234), crockford::encode(&hash(b"1234")));
        assert_eq!(pin_answer_hash(1234).len(), 103);
    }
}
