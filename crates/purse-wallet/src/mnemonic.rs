//! BIP-39 mnemonic backup of the wallet seed.

use bip39::{Language, Mnemonic};

use crate::error::WalletError;
use crate::keys::Seed;

/// 24-word English phrase encoding the 32-byte seed.
pub fn seed_to_mnemonic(seed: &Seed) -> Result<String, WalletError> {
    let m = Mnemonic::from_entropy_in(Language::English, seed.as_bytes())
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    Ok(m.to_string())
}

/// Parse a phrase back into a seed.
///
/// Whitespace is normalized and case ignored.
pub fn mnemonic_to_seed(phrase: &str) -> Result<Seed, WalletError> {
    let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let m = Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    let entropy = m.to_entropy();
    let bytes: [u8; 32] = entropy.as_slice().try_into().map_err(|_| {
        WalletError::InvalidMnemonic(format!("expected 32 bytes of entropy, got {}", entropy.len()))
    })?;
    Ok(Seed::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_generate() {
        let seed = Seed::generate();
        let phrase = seed_to_mnemonic(&seed).unwrap();
        let restored = mnemonic_to_seed(&phrase).unwrap();
        assert_eq!(seed.as_bytes(), restored.as_bytes());
    }

    #[test]
    fn mnemonic_is_24_words() {
        let phrase = seed_to_mnemonic(&Seed::from_bytes([0xAB; 32])).unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
    }

    #[test]
    fn messy_input_accepted() {
        let seed = Seed::from_bytes([0x55; 32]);
        let phrase = seed_to_mnemonic(&seed).unwrap();
        let messy = phrase.split_whitespace().collect::<Vec<_>>().join("  \t ").to_uppercase();
        assert_eq!(mnemonic_to_seed(&messy).unwrap().as_bytes(), seed.as_bytes());
    }

    #[test]
    fn invalid_phrases_rejected() {
        let err = mnemonic_to_seed("abandon abandon abandon invalidword").unwrap_err();
        assert!(err.to_string().contains("invalid mnemonic"));
        let mut phrase = vec!["abandon"; 23].join(" ");
        phrase.push_str(" zoo");
        assert!(mnemonic_to_seed(&phrase).is_err());
    }

    #[test]
    fn short_entropy_rejected() {
        // valid 12-word phrase carries only 16 bytes
        let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        assert!(matches!(mnemonic_to_seed(phrase), Err(WalletError::InvalidMnemonic(_))));
    }
}
