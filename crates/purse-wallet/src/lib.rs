//! # purse-wallet: denomination selection and coin lifecycle.
//!
//! Plans withdraws and payments over a canonical denomination system,
//! commits them against a coin store in single transactions, executes
//! refresh sessions concurrently, and persists the purse as an encrypted
//! file.
//!
//! # Modules
//!
//! - [`error`]: `WalletError` enum
//! - [`coin_selection`]: greedy withdraw and strategy-driven spend planning
//! - [`lifecycle`]: withdraw/spend commits and refresh session recording
//! - [`refresh`]: async refresh executor with cancellation
//! - [`keys`]: wallet seed and session seed derivation
//! - [`mnemonic`]: BIP-39 seed backup
//! - [`encryption`]: AES-256-GCM wallet file encryption
//! - [`wallet`]: `Purse` composition and file persistence
//! - [`simulation`]: strategy comparison over random payments

pub mod coin_selection;
pub mod encryption;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod mnemonic;
pub mod refresh;
pub mod simulation;
pub mod wallet;

pub use coin_selection::{CoinSelector, DenominationCount, RefreshPlan, SpendPlan, SpendStrategy, WithdrawPlan};
pub use error::WalletError;
pub use keys::Seed;
pub use lifecycle::{commit_spend, commit_withdraw, record_withdrawn, SpendCommit, KAPPA};
pub use mnemonic::{mnemonic_to_seed, seed_to_mnemonic};
pub use refresh::{RefreshExecutor, RefreshOutcome};
pub use simulation::{SimConfig, SimStats, Simulation};
pub use wallet::{Purse, WithdrawOutcome};
