//! Purse composition: seed, denomination system and coin store.
//!
//! [`Purse`] ties planning, lifecycle commits and the network collaborators
//! together, and persists itself as an encrypted wallet file.

use std::path::Path;
use std::sync::Arc;

use purse_core::{
    Amount, BlindingScheme, CoinPub, CoinSource, CoinState, CoinStore, Denomination, DenominationSystem, Inventory,
    MemoryCoinStore, ProviderApi,
};
use purse_crypto::crockford;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::coin_selection::{CoinSelector, SpendPlan, SpendStrategy, WithdrawPlan};
use crate::encryption;
use crate::error::WalletError;
use crate::keys::Seed;
use crate::lifecycle::{commit_spend, commit_withdraw, record_withdrawn, SpendCommit};
use crate::refresh::{sign_planchet, RefreshExecutor};

/// Magic bytes identifying a Purse wallet file.
pub const WALLET_MAGIC: &[u8; 4] = b"PRSW";

/// Current wallet file format version.
pub const WALLET_VERSION: u32 = 1;

/// Wallet file header serialized as JSON.
#[derive(Serialize, Deserialize)]
struct WalletFileHeader {
    magic: String,
    version: u32,
}

/// Encrypted part of the wallet file.
#[derive(Serialize, Deserialize)]
struct WalletPayload {
    #[serde(with = "crockford::serde_array")]
    seed: [u8; 32],
    denominations: Vec<Denomination>,
    store: serde_json::Value,
}

/// Coins withdrawn by [`Purse::withdraw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawOutcome {
    pub plan: WithdrawPlan,
    pub coins: Vec<CoinPub>,
}

/// An e-cash purse for one provider and currency.
pub struct Purse {
    seed: Seed,
    system: Arc<DenominationSystem>,
    store: Arc<MemoryCoinStore>,
}

impl Purse {
    /// New purse with a random seed and no coins.
    pub fn create(system: DenominationSystem) -> Self {
        Self::from_seed(Seed::generate(), system)
    }

    pub fn from_seed(seed: Seed, system: DenominationSystem) -> Self {
        Self { seed, system: Arc::new(system), store: Arc::new(MemoryCoinStore::new()) }
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    pub fn system(&self) -> &Arc<DenominationSystem> {
        &self.system
    }

    pub fn store(&self) -> &Arc<MemoryCoinStore> {
        &self.store
    }

    pub fn inventory(&self) -> Inventory {
        self.store.inventory()
    }

    /// Value of all `Withdrawn` coins.
    pub fn balance(&self) -> Result<Amount, WalletError> {
        Ok(self.inventory().balance(&self.system)?)
    }

    pub fn plan_withdraw(&self, amount: &Amount) -> Result<WithdrawPlan, WalletError> {
        CoinSelector::plan_withdraw(&self.system, amount)
    }

    pub fn plan_spend(&self, cost: &Amount, strategy: SpendStrategy) -> Result<SpendPlan, WalletError> {
        CoinSelector::plan_spend(&self.system, &self.inventory(), cost, strategy)
    }

    /// Plan, commit and sign a withdraw of `amount`.
    ///
    /// Coins are created `Derived` first; a coin whose signing fails stays
    /// `Derived` and is picked up by [`resume_withdrawals`](Self::resume_withdrawals).
    pub async fn withdraw(
        &self,
        amount: &Amount,
        provider: &dyn ProviderApi,
        blinding: &dyn BlindingScheme,
    ) -> Result<WithdrawOutcome, WalletError> {
        let plan = self.plan_withdraw(amount)?;
        let coins = commit_withdraw(self.store.as_ref(), &self.system, &self.seed, &plan)?;
        for coin in &coins {
            self.sign_withdrawn(coin, provider, blinding).await?;
        }
        info!(amount = %amount, coins = coins.len(), "withdraw finished");
        Ok(WithdrawOutcome { plan, coins })
    }

    /// Sign every withdraw coin still in `Derived`.
    pub async fn resume_withdrawals(
        &self,
        provider: &dyn ProviderApi,
        blinding: &dyn BlindingScheme,
    ) -> Result<Vec<CoinPub>, WalletError> {
        let derived: Vec<CoinPub> = self
            .store
            .coins_in_state(CoinState::Derived)
            .into_iter()
            .filter(|c| matches!(c.source, CoinSource::Withdraw { .. }))
            .map(|c| c.coin_pub)
            .collect();
        for coin in &derived {
            self.sign_withdrawn(coin, provider, blinding).await?;
        }
        Ok(derived)
    }

    async fn sign_withdrawn(
        &self,
        coin_pub: &CoinPub,
        provider: &dyn ProviderApi,
        blinding: &dyn BlindingScheme,
    ) -> Result<(), WalletError> {
        let summary = self
            .store
            .coin(coin_pub)
            .ok_or_else(|| purse_core::LifecycleError::UnknownCoin(coin_pub.to_string()))?;
        let CoinSource::Withdraw { index } = summary.source else {
            return Err(purse_core::LifecycleError::UnknownCoin(coin_pub.to_string()).into());
        };
        let denom = Arc::clone(self.system.require(&summary.denom_id)?);
        let planchet = self.seed.withdraw_planchet(index)?;
        let sig = sign_planchet(provider, blinding, &denom, coin_pub, &planchet.blinding_key).await?;
        record_withdrawn(self.store.as_ref(), coin_pub, sig)
    }

    /// Plan and commit a payment of `cost`.
    ///
    /// Refreshes are only recorded; run them with
    /// [`refresh_executor`](Self::refresh_executor).
    pub fn spend(&self, cost: &Amount, strategy: SpendStrategy) -> Result<(SpendPlan, SpendCommit), WalletError> {
        let plan = self.plan_spend(cost, strategy)?;
        let commit = commit_spend(self.store.as_ref(), &self.system, &plan)?;
        Ok((plan, commit))
    }

    pub fn refresh_executor(&self, provider: Arc<dyn ProviderApi>, blinding: Arc<dyn BlindingScheme>) -> RefreshExecutor {
        let store: Arc<dyn CoinStore> = self.store.clone();
        RefreshExecutor::new(store, Arc::clone(&self.system), provider, blinding)
    }

    /// Save the purse to an encrypted file.
    ///
    /// Format: `header_len (4 bytes LE) || header_json || encrypted_payload`.
    /// The header is unencrypted JSON holding magic bytes and version.
    pub fn save_to_file(&self, path: &Path, password: &[u8]) -> Result<(), WalletError> {
        let header = WalletFileHeader {
            magic: String::from_utf8_lossy(WALLET_MAGIC).to_string(),
            version: WALLET_VERSION,
        };
        let header_json = serde_json::to_vec(&header).map_err(|e| WalletError::Serialization(e.to_string()))?;

        let mut store_json = self.store.export_json()?;
        let store = serde_json::from_slice(&store_json).map_err(|e| WalletError::Serialization(e.to_string()));
        store_json.zeroize();
        let mut payload = WalletPayload {
            seed: *self.seed.as_bytes(),
            denominations: self.system.largest_first().map(|d| (**d).clone()).collect(),
            store: store?,
        };
        let payload_json = serde_json::to_vec(&payload).map_err(|e| WalletError::Serialization(e.to_string()));
        payload.seed.zeroize();
        let mut payload_json = payload_json?;
        let encrypted = encryption::encrypt(&payload_json, password);
        payload_json.zeroize();
        let encrypted = encrypted?;

        let header_len = header_json.len() as u32;
        let mut file_data = Vec::with_capacity(4 + header_json.len() + encrypted.len());
        file_data.extend_from_slice(&header_len.to_le_bytes());
        file_data.extend_from_slice(&header_json);
        file_data.extend_from_slice(&encrypted);

        std::fs::write(path, &file_data).map_err(|e| WalletError::IoError(e.to_string()))
    }

    /// Load a purse saved by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file(path: &Path, password: &[u8]) -> Result<Self, WalletError> {
        let file_data = std::fs::read(path).map_err(|e| WalletError::IoError(e.to_string()))?;

        let Some((len_bytes, rest)) = file_data.split_first_chunk::<4>() else {
            return Err(WalletError::CorruptedFile("file too short".into()));
        };
        let header_len = u32::from_le_bytes(*len_bytes) as usize;
        if rest.len() < header_len {
            return Err(WalletError::CorruptedFile("header truncated".into()));
        }
        let (header_json, encrypted) = rest.split_at(header_len);
        let header: WalletFileHeader = serde_json::from_slice(header_json)
            .map_err(|e| WalletError::CorruptedFile(format!("invalid header: {e}")))?;
        if header.magic.as_bytes() != WALLET_MAGIC {
            return Err(WalletError::CorruptedFile("invalid magic bytes".into()));
        }
        if header.version != WALLET_VERSION {
            return Err(WalletError::CorruptedFile(format!("unsupported version: {}", header.version)));
        }

        let mut payload_json = encryption::decrypt(encrypted, password)?;
        let payload: Result<WalletPayload, _> = serde_json::from_slice(&payload_json);
        payload_json.zeroize();
        let mut payload = payload.map_err(|e| WalletError::CorruptedFile(format!("invalid payload: {e}")))?;

        let seed = Seed::from_bytes(payload.seed);
        payload.seed.zeroize();
        let system = DenominationSystem::new(std::mem::take(&mut payload.denominations))?;
        let store_json =
            serde_json::to_vec(&payload.store).map_err(|e| WalletError::Serialization(e.to_string()))?;
        let store = MemoryCoinStore::import_json(&store_json)?;

        let derived = store.coins_in_state(CoinState::Derived).len();
        if derived > 0 {
            warn!(derived, "wallet has coins awaiting signatures");
        }
        Ok(Self { seed, system: Arc::new(system), store: Arc::new(store) })
    }
}

impl std::fmt::Debug for Purse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Purse")
            .field("currency", &self.system.currency())
            .field("coins", &self.store.coins().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kudos(s: &str) -> Amount {
        format!("KUDOS:{s}").parse().unwrap()
    }

    fn system() -> DenominationSystem {
        DenominationSystem::powers_of_two("KUDOS", 1024).unwrap()
    }

    /// A purse whose coins were committed and signed without a provider.
    fn funded(amount: &str) -> Purse {
        let purse = Purse::from_seed(Seed::from_bytes([4; 32]), system());
        let plan = purse.plan_withdraw(&kudos(amount)).unwrap();
        for coin in commit_withdraw(purse.store().as_ref(), purse.system(), purse.seed(), &plan).unwrap() {
            record_withdrawn(purse.store().as_ref(), &coin, vec![1, 2, 3]).unwrap();
        }
        purse
    }

    #[test]
    fn balance_follows_spends() {
        let purse = funded("100");
        assert_eq!(purse.balance().unwrap(), kudos("100"));
        let (plan, commit) = purse.spend(&kudos("30"), SpendStrategy::SmallestFirst).unwrap();
        assert!(!commit.spent.is_empty());
        // refresh children are Derived until the executor runs
        let expected = 100 - 30 - plan.refreshes.iter().map(|r| r.excess.value()).sum::<u64>();
        assert_eq!(purse.balance().unwrap(), kudos(&expected.to_string()));
    }

    #[test]
    fn insufficient_funds_surface() {
        let purse = funded("5");
        let err = purse.spend(&kudos("6"), SpendStrategy::Hybrid).unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: kudos("5"), need: kudos("6") });
    }

    #[test]
    fn save_and_load_roundtrip() {
        let purse = funded("77");
        purse.spend(&kudos("10"), SpendStrategy::Hybrid).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purse.wallet");
        purse.save_to_file(&path, b"hunter2").unwrap();

        let loaded = Purse::load_from_file(&path, b"hunter2").unwrap();
        assert_eq!(loaded.seed().as_bytes(), purse.seed().as_bytes());
        assert_eq!(loaded.inventory(), purse.inventory());
        assert_eq!(loaded.store().coins(), purse.store().coins());
        assert_eq!(loaded.store().refresh_sessions().len(), purse.store().refresh_sessions().len());
        assert_eq!(loaded.store().next_withdraw_index(), purse.store().next_withdraw_index());
        assert_eq!(loaded.system().len(), purse.system().len());
    }

    #[test]
    fn wrong_password_rejected() {
        let purse = funded("1");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("purse.wallet");
        purse.save_to_file(&path, b"right").unwrap();
        assert_eq!(Purse::load_from_file(&path, b"wrong").unwrap_err(), WalletError::InvalidPassword);
    }

    #[test]
    fn bad_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wallet");

        std::fs::write(&path, [1u8, 0]).unwrap();
        assert!(matches!(Purse::load_from_file(&path, b"pw"), Err(WalletError::CorruptedFile(_))));

        let header = br#"{"magic":"RIWL","version":1}"#;
        let mut data = (header.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(header);
        std::fs::write(&path, &data).unwrap();
        let err = Purse::load_from_file(&path, b"pw").unwrap_err();
        assert_eq!(err, WalletError::CorruptedFile("invalid magic bytes".into()));

        let header = br#"{"magic":"PRSW","version":9}"#;
        let mut data = (header.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(header);
        std::fs::write(&path, &data).unwrap();
        let err = Purse::load_from_file(&path, b"pw").unwrap_err();
        assert_eq!(err, WalletError::CorruptedFile("unsupported version: 9".into()));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Purse::load_from_file(Path::new("/nonexistent/purse.wallet"), b"pw").unwrap_err();
        assert!(matches!(err, WalletError::IoError(_)));
    }

    #[test]
    fn debug_hides_seed() {
        let purse = funded("3");
        let debug = format!("{purse:?}");
        assert!(debug.contains("KUDOS"));
        assert!(!debug.contains("seed"));
    }
}
