//! Error types for the Purse core.
use purse_crypto::CryptoError;
use thiserror::Error;

use crate::types::CoinState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("currency mismatch: {left} vs {right}")] CurrencyMismatch { left: String, right: String },
    #[error("amount overflow")] Overflow,
    #[error("amount underflow")] Underflow,
    #[error("invalid amount: {0}")] InvalidFormat(String),
    #[error("fraction out of range: {0}")] FractionOutOfRange(u32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DenominationError {
    #[error("invalid denomination system: {0}")] InvalidDenominationSystem(String),
    #[error("unknown denomination: {0}")] UnknownDenomination(String),
    #[error(transparent)] Amount(#[from] AmountError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("invalid coin transition: {from} -> {to}")] InvalidTransition { from: CoinState, to: CoinState },
    #[error("unknown coin: {0}")] UnknownCoin(String),
    #[error("unknown refresh session: {0}")] UnknownSession(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not enough coins of {denom}: have {have}, need {need}")] NotEnoughCoins { denom: String, have: u64, need: u64 },
    #[error("duplicate coin: {0}")] DuplicateCoin(String),
    #[error("duplicate refresh session: {0}")] DuplicateSession(String),
    #[error("serialization: {0}")] Serialization(String),
    #[error(transparent)] Lifecycle(#[from] LifecycleError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider rejected request: {0}")] Rejected(String),
    #[error("provider unavailable: {0}")] Unavailable(String),
    #[error("blinding: {0}")] Blinding(String),
    #[error("invalid signature from provider")] InvalidSignature,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)] Amount(#[from] AmountError),
    #[error(transparent)] Denomination(#[from] DenominationError),
    #[error(transparent)] Lifecycle(#[from] LifecycleError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Provider(#[from] ProviderError),
    #[error(transparent)] Crypto(#[from] CryptoError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_enough_coins() {
        let e = StoreError::NotEnoughCoins { denom: "ABC".into(), have: 1, need: 2 };
        assert_eq!(e.to_string(), "not enough coins of ABC: have 1, need 2");
    }

    #[test]
    fn display_transition() {
        let e = LifecycleError::InvalidTransition { from: CoinState::Spent, to: CoinState::Withdrawn };
        assert_eq!(e.to_string(), "invalid coin transition: spent -> withdrawn");
    }

    #[test]
    fn umbrella_from() {
        let core: CoreError = AmountError::Overflow.into();
        assert_eq!(core, CoreError::Amount(AmountError::Overflow));
        let core: CoreError = CryptoError::CryptographicMismatch.into();
        assert!(matches!(core, CoreError::Crypto(_)));
    }
}
