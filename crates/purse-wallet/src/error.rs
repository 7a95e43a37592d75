//! Wallet error types.

use purse_core::{Amount, AmountError, DenominationError, LifecycleError, ProviderError, StoreError};
use purse_crypto::CryptoError;
use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The spendable balance does not cover the requested cost.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Spendable balance.
        have: Amount,
        /// Requested cost.
        need: Amount,
    },

    /// Invalid monetary amount for this operation.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Encryption failure.
    #[error("encryption: {0}")]
    Encryption(String),

    /// Decryption failure.
    #[error("decryption: {0}")]
    Decryption(String),

    /// Wrong password for wallet file.
    #[error("invalid password")]
    InvalidPassword,

    /// Wallet file is corrupted or has invalid format.
    #[error("corrupted file: {0}")]
    CorruptedFile(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization error.
    #[error("serialization: {0}")]
    Serialization(String),

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// A background refresh task stopped without a result.
    #[error("refresh task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Denomination(#[from] DenominationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
