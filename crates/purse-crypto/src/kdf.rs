//! Key derivation and hashing.
//!
//! The KDF extracts with HMAC-SHA512 and expands with HMAC-SHA256, the
//! HKDF construction with a different hash on each side. All derived keys
//! in the wallet (planchets, account keys, policy keys, encryption keys,
//! forgotten-field hashes) come from this one function.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};

use crate::error::CryptoError;

/// SHA-512 digest length.
pub const HASH_LEN: usize = 64;

/// Argon2id memory cost in KiB.
pub const ARGON2_MEMORY_KIB: u32 = 1024;
/// Argon2id iteration count.
pub const ARGON2_ITERATIONS: u32 = 3;
/// Argon2id lanes.
pub const ARGON2_PARALLELISM: u32 = 1;

/// Derive `out_len` bytes from `ikm` with the given `salt` and `info`.
pub fn kdf(out_len: usize, ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut okm = vec![0u8; out_len];
    kdf_into(&mut okm, ikm, salt, info)?;
    Ok(okm)
}

/// Fixed-size variant of [`kdf`].
pub fn kdf_array<const N: usize>(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; N], CryptoError> {
    let mut okm = [0u8; N];
    kdf_into(&mut okm, ikm, salt, info)?;
    Ok(okm)
}

fn kdf_into(okm: &mut [u8], ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<(), CryptoError> {
    let (prk, _) = Hkdf::<Sha512>::extract(Some(salt), ikm);
    let expander = Hkdf::<Sha256>::from_prk(&prk).map_err(|e| CryptoError::Kdf(e.to_string()))?;
    expander.expand(info, okm).map_err(|e| CryptoError::Kdf(e.to_string()))
}

/// SHA-512 of `data`.
pub fn hash(data: &[u8]) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&Sha512::digest(data));
    out
}

/// Argon2id (v1.3, 3 passes, 1 MiB, 1 lane) producing 64 bytes.
///
/// Used for user identifiers and security question answers, both of which
/// are low-entropy inputs that need to be expensive to brute force.
pub fn stretch(password: &[u8], salt: &[u8]) -> Result<[u8; 64], CryptoError> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, Some(64))
        .map_err(|e| CryptoError::Argon2(e.to_string()))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = [0u8; 64];
    argon
        .hash_password_into(password, salt, &mut out)
        .map_err(|e| CryptoError::Argon2(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdf_is_deterministic() {
        let a = kdf(64, b"ikm", b"salt", b"info").unwrap();
        let b = kdf(64, b"ikm", b"salt", b"info").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn kdf_prefix_stable_across_lengths() {
        let short = kdf(32, b"ikm", b"salt", b"info").unwrap();
        let long = kdf(64, b"ikm", b"salt", b"info").unwrap();
        assert_eq!(&long[..32], &short[..]);
    }

    #[test]
    fn kdf_domain_separation() {
        let a = kdf(32, b"ikm", b"salt", b"one").unwrap();
        let b = kdf(32, b"ikm", b"salt", b"two").unwrap();
        let c = kdf(32, b"ikm", b"other", b"one").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn kdf_array_matches_vec() {
        let arr: [u8; 32] = kdf_array(b"k", b"s", b"i").unwrap();
        assert_eq!(arr.to_vec(), kdf(32, b"k", b"s", b"i").unwrap());
    }

    #[test]
    fn kdf_rejects_oversized_output() {
        assert!(matches!(kdf(255 * 32 + 1, b"k", b"s", b"i"), Err(CryptoError::Kdf(_))));
    }

    #[test]
    fn hash_empty_input() {
        let h = hash(b"");
        assert_eq!(h[0], 0xcf);
        assert_eq!(h[63], 0x3e);
    }

    #[test]
    fn stretch_depends_on_salt() {
        let a = stretch(b"answer", b"0123456789abcdef").unwrap();
        let b = stretch(b"answer", b"fedcba9876543210").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn stretch_rejects_short_salt() {
        assert!(matches!(stretch(b"answer", b"abc"), Err(CryptoError::Argon2(_))));
    }
}
