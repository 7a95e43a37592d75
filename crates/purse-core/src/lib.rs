//! # purse-core
//! Amounts, denomination systems, coin records and the coin store shared by
//! the Purse wallet crates.

pub mod amount;
pub mod denomination;
pub mod error;
pub mod inventory;
pub mod provider;
pub mod store;
pub mod traits;
pub mod types;

pub use amount::Amount;
pub use denomination::{Denomination, DenominationSystem};
pub use error::{AmountError, CoreError, DenominationError, LifecycleError, ProviderError, StoreError};
pub use inventory::Inventory;
pub use store::MemoryCoinStore;
pub use traits::{BlindingScheme, CoinStore, ProviderApi, StoreTransaction};
pub use types::{CoinPub, CoinRecord, CoinSource, CoinState, CoinSummary, DenominationId, RefreshSession, SessionId};
