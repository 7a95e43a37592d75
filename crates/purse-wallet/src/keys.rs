//! Wallet seed and deterministic coin key derivation.
//!
//! Every withdrawn coin's key pair and blinding factor derive from the
//! 32-byte wallet seed and the coin's withdraw index, so a wallet restored
//! from its seed (or mnemonic) can re-derive every planchet it ever
//! created.

use std::fmt;

use purse_crypto::{derive_withdraw_planchet, CoinSecret, CryptoError, PlanchetSecrets, SessionSeed};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// KDF info for refresh session seeds.
const SESSION_SEED_INFO: &[u8] = b"purse-refresh-session-seed";

/// A 32-byte master seed.
///
/// Zeroized on drop; `Debug` never prints the bytes.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 32],
}

impl Seed {
    /// Generate a random seed from the OS cryptographic RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Planchet secrets of withdraw number `index`.
    pub fn withdraw_planchet(&self, index: u32) -> Result<PlanchetSecrets, CryptoError> {
        derive_withdraw_planchet(&self.bytes, index)
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// Seed of a refresh session melting `coin`, salted with `salt`.
///
/// Recomputable from the melted coin's key, which is what lets an
/// interrupted refresh resume.
pub fn derive_session_seed(coin: &CoinSecret, salt: &[u8; 32]) -> Result<SessionSeed, CryptoError> {
    let okm = purse_crypto::kdf::kdf_array::<64>(coin.as_bytes(), salt, SESSION_SEED_INFO)?;
    Ok(SessionSeed::from_bytes(okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_generate_unique() {
        let s1 = Seed::generate();
        let s2 = Seed::generate();
        assert_ne!(s1.as_bytes(), s2.as_bytes());
    }

    #[test]
    fn seed_debug_hides_bytes() {
        let seed = Seed::from_bytes([0xAB; 32]);
        let debug = format!("{seed:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn planchets_deterministic_and_distinct() {
        let seed = Seed::from_bytes([1u8; 32]);
        let a = seed.withdraw_planchet(0).unwrap();
        let b = seed.clone().withdraw_planchet(0).unwrap();
        let c = seed.withdraw_planchet(1).unwrap();
        assert_eq!(a.coin_pub, b.coin_pub);
        assert_ne!(a.coin_pub, c.coin_pub);
        assert_ne!(a.blinding_key, c.blinding_key);
    }

    #[test]
    fn session_seed_depends_on_salt() {
        let seed = Seed::from_bytes([2u8; 32]);
        let coin = seed.withdraw_planchet(0).unwrap().coin_priv;
        let s1 = derive_session_seed(&coin, &[0; 32]).unwrap();
        let s2 = derive_session_seed(&coin, &[0; 32]).unwrap();
        let s3 = derive_session_seed(&coin, &[1; 32]).unwrap();
        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
    }
}
