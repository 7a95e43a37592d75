//! In-memory coin store.
//!
//! [`MemoryCoinStore`] keeps every coin record and refresh session behind a
//! single mutex. A transaction holds the lock for its whole lifetime and
//! stages its writes, so concurrent transactions are serialized and an
//! abandoned transaction leaves no trace. The whole state can be exported
//! as JSON for the encrypted wallet file.

use std::collections::{BTreeMap, HashMap};

use parking_lot::{Mutex, MutexGuard};
use purse_crypto::CoinSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LifecycleError, StoreError};
use crate::inventory::Inventory;
use crate::traits::{CoinStore, StoreTransaction};
use crate::types::{CoinPub, CoinRecord, CoinState, CoinSummary, DenominationId, RefreshSession, SessionId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    coins: BTreeMap<CoinPub, CoinRecord>,
    sessions: BTreeMap<SessionId, RefreshSession>,
    next_withdraw_index: u32,
}

/// Coin store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryCoinStore {
    state: Mutex<StoreState>,
}

impl MemoryCoinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize every record, secrets included. Encrypt before storing.
    pub fn export_json(&self) -> Result<Vec<u8>, StoreError> {
        let state = self.state.lock();
        serde_json::to_vec(&*state).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Rebuild a store from [`export_json`](Self::export_json) output.
    pub fn import_json(bytes: &[u8]) -> Result<Self, StoreError> {
        let state: StoreState =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self { state: Mutex::new(state) })
    }

    /// Next unused withdraw derivation index.
    pub fn next_withdraw_index(&self) -> u32 {
        self.state.lock().next_withdraw_index
    }
}

fn withdrawn_inventory<'a>(coins: impl Iterator<Item = (&'a DenominationId, CoinState)>) -> Inventory {
    let mut inv = Inventory::new();
    for (denom, state) in coins {
        if state == CoinState::Withdrawn {
            inv.add(*denom, 1);
        }
    }
    inv
}

impl CoinStore for MemoryCoinStore {
    fn begin(&self) -> Box<dyn StoreTransaction + '_> {
        let state = self.state.lock();
        let next_index = state.next_withdraw_index;
        Box::new(MemoryTransaction {
            state,
            states: HashMap::new(),
            sigs: HashMap::new(),
            new_coins: BTreeMap::new(),
            new_sessions: Vec::new(),
            next_index,
        })
    }

    fn inventory(&self) -> Inventory {
        let state = self.state.lock();
        withdrawn_inventory(state.coins.values().map(|c| (&c.denom_id, c.state)))
    }

    fn coin(&self, coin_pub: &CoinPub) -> Option<CoinSummary> {
        self.state.lock().coins.get(coin_pub).map(CoinRecord::summary)
    }

    fn coins(&self) -> Vec<CoinSummary> {
        self.state.lock().coins.values().map(CoinRecord::summary).collect()
    }

    fn refresh_session(&self, id: &SessionId) -> Option<RefreshSession> {
        self.state.lock().sessions.get(id).cloned()
    }

    fn refresh_sessions(&self) -> Vec<RefreshSession> {
        self.state.lock().sessions.values().cloned().collect()
    }
}

/// Transaction over a locked [`MemoryCoinStore`].
///
/// Writes to existing coins are staged as state and signature overlays;
/// coins and sessions created in the transaction live in side tables until
/// commit.
struct MemoryTransaction<'a> {
    state: MutexGuard<'a, StoreState>,
    states: HashMap<CoinPub, CoinState>,
    sigs: HashMap<CoinPub, Vec<u8>>,
    new_coins: BTreeMap<CoinPub, CoinRecord>,
    new_sessions: Vec<RefreshSession>,
    next_index: u32,
}

impl MemoryTransaction<'_> {
    fn effective_state(&self, coin: &CoinRecord) -> CoinState {
        self.states.get(&coin.coin_pub).copied().unwrap_or(coin.state)
    }

    fn all_coins(&self) -> impl Iterator<Item = &CoinRecord> {
        self.state.coins.values().chain(self.new_coins.values())
    }

    fn exists(&self, coin_pub: &CoinPub) -> bool {
        self.state.coins.contains_key(coin_pub) || self.new_coins.contains_key(coin_pub)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn inventory(&self) -> Inventory {
        withdrawn_inventory(self.all_coins().map(|c| (&c.denom_id, self.effective_state(c))))
    }

    fn coin(&self, coin_pub: &CoinPub) -> Option<CoinSummary> {
        let coin = self.new_coins.get(coin_pub).or_else(|| self.state.coins.get(coin_pub))?;
        let mut summary = coin.summary();
        summary.state = self.effective_state(coin);
        Some(summary)
    }

    fn coin_secret(&self, coin_pub: &CoinPub) -> Option<&CoinSecret> {
        self.new_coins
            .get(coin_pub)
            .or_else(|| self.state.coins.get(coin_pub))
            .map(CoinRecord::secret)
    }

    fn denom_sig(&self, coin_pub: &CoinPub) -> Option<Vec<u8>> {
        if let Some(sig) = self.sigs.get(coin_pub) {
            return Some(sig.clone());
        }
        self.new_coins
            .get(coin_pub)
            .or_else(|| self.state.coins.get(coin_pub))
            .and_then(|c| c.denom_sig.clone())
    }

    fn spend_coins(&mut self, denom: &DenominationId, count: u64) -> Result<Vec<CoinPub>, StoreError> {
        let available: Vec<CoinPub> = self
            .all_coins()
            .filter(|c| c.denom_id == *denom && self.effective_state(c) == CoinState::Withdrawn)
            .map(|c| c.coin_pub)
            .collect();
        if (available.len() as u64) < count {
            return Err(StoreError::NotEnoughCoins {
                denom: denom.to_string(),
                have: available.len() as u64,
                need: count,
            });
        }
        let picked: Vec<CoinPub> = available.into_iter().take(count as usize).collect();
        for coin_pub in &picked {
            self.transition(coin_pub, CoinState::Spent)?;
        }
        Ok(picked)
    }

    fn transition(&mut self, coin_pub: &CoinPub, to: CoinState) -> Result<(), StoreError> {
        if let Some(coin) = self.new_coins.get_mut(coin_pub) {
            coin.transition(to)?;
            return Ok(());
        }
        let current = match self.state.coins.get(coin_pub) {
            Some(coin) => self.effective_state(coin),
            None => return Err(LifecycleError::UnknownCoin(coin_pub.to_string()).into()),
        };
        let next = current.transition(to)?;
        self.states.insert(*coin_pub, next);
        Ok(())
    }

    fn set_denom_sig(&mut self, coin_pub: &CoinPub, sig: Vec<u8>) -> Result<(), StoreError> {
        if let Some(coin) = self.new_coins.get_mut(coin_pub) {
            coin.denom_sig = Some(sig);
            return Ok(());
        }
        if !self.state.coins.contains_key(coin_pub) {
            return Err(LifecycleError::UnknownCoin(coin_pub.to_string()).into());
        }
        self.sigs.insert(*coin_pub, sig);
        Ok(())
    }

    fn insert_coin(&mut self, coin: CoinRecord) -> Result<(), StoreError> {
        if self.exists(&coin.coin_pub) {
            return Err(StoreError::DuplicateCoin(coin.coin_pub.to_string()));
        }
        self.new_coins.insert(coin.coin_pub, coin);
        Ok(())
    }

    fn insert_session(&mut self, session: RefreshSession) -> Result<(), StoreError> {
        let dup = self.state.sessions.contains_key(&session.session_id)
            || self.new_sessions.iter().any(|s| s.session_id == session.session_id);
        if dup {
            return Err(StoreError::DuplicateSession(session.session_id.to_string()));
        }
        self.new_sessions.push(session);
        Ok(())
    }

    fn reserve_withdraw_indices(&mut self, n: u32) -> u32 {
        let first = self.next_index;
        self.next_index = self.next_index.saturating_add(n);
        first
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut state, states, sigs, new_coins, new_sessions, next_index } = *self;
        let (changed, created, sessions) = (states.len() + sigs.len(), new_coins.len(), new_sessions.len());

        for (coin_pub, st) in states {
            if let Some(coin) = state.coins.get_mut(&coin_pub) {
                coin.state = st;
            }
        }
        for (coin_pub, sig) in sigs {
            if let Some(coin) = state.coins.get_mut(&coin_pub) {
                coin.denom_sig = Some(sig);
            }
        }
        state.coins.extend(new_coins);
        for session in new_sessions {
            state.sessions.insert(session.session_id, session);
        }
        state.next_withdraw_index = next_index;

        debug!(changed, created, sessions, "coin store transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::CoinSource;
    use purse_crypto::derive_withdraw_planchet;

    fn coin(index: u32, denom: DenominationId) -> CoinRecord {
        let planchet = derive_withdraw_planchet(&[42; 32], index).unwrap();
        CoinRecord::derived(planchet, denom, CoinSource::Withdraw { index })
    }

    /// Store with `n` withdrawn coins of one denomination.
    fn store_with(n: u32, denom: DenominationId) -> (MemoryCoinStore, Vec<CoinPub>) {
        let store = MemoryCoinStore::new();
        let mut pubs = Vec::new();
        let mut tx = store.begin();
        for i in 0..n {
            let c = coin(i, denom);
            pubs.push(c.coin_pub);
            tx.insert_coin(c).unwrap();
            tx.set_denom_sig(&pubs[i as usize], vec![1]).unwrap();
            tx.transition(&pubs[i as usize], CoinState::Withdrawn).unwrap();
        }
        tx.commit().unwrap();
        (store, pubs)
    }

    const D: DenominationId = DenominationId([1; 32]);

    #[test]
    fn commit_applies_changes() {
        let (store, pubs) = store_with(3, D);
        assert_eq!(store.inventory().count(&D), 3);
        let mut tx = store.begin();
        let spent = tx.spend_coins(&D, 2).unwrap();
        assert_eq!(tx.inventory().count(&D), 1);
        tx.commit().unwrap();
        assert_eq!(store.inventory().count(&D), 1);
        for p in spent {
            assert_eq!(store.coin(&p).unwrap().state, CoinState::Spent);
        }
        assert!(pubs.iter().any(|p| store.coin(p).unwrap().state == CoinState::Withdrawn));
    }

    #[test]
    fn drop_aborts() {
        let (store, _) = store_with(2, D);
        {
            let mut tx = store.begin();
            tx.spend_coins(&D, 2).unwrap();
            tx.insert_coin(coin(99, D)).unwrap();
        }
        assert_eq!(store.inventory().count(&D), 2);
        assert_eq!(store.coins().len(), 2);
    }

    #[test]
    fn not_enough_coins_marks_nothing() {
        let (store, _) = store_with(1, D);
        let mut tx = store.begin();
        let err = tx.spend_coins(&D, 2).unwrap_err();
        assert_eq!(err, StoreError::NotEnoughCoins { denom: D.to_string(), have: 1, need: 2 });
        assert_eq!(tx.inventory().count(&D), 1);
    }

    #[test]
    fn spent_coin_cannot_return() {
        let (store, pubs) = store_with(1, D);
        let mut tx = store.begin();
        tx.transition(&pubs[0], CoinState::Spent).unwrap();
        let err = tx.transition(&pubs[0], CoinState::Withdrawn).unwrap_err();
        assert!(matches!(err, StoreError::Lifecycle(LifecycleError::InvalidTransition { .. })));
    }

    #[test]
    fn duplicates_rejected() {
        let (store, _) = store_with(1, D);
        let mut tx = store.begin();
        assert!(matches!(tx.insert_coin(coin(0, D)), Err(StoreError::DuplicateCoin(_))));
    }

    #[test]
    fn withdraw_indices_advance_on_commit_only() {
        let store = MemoryCoinStore::new();
        {
            let mut tx = store.begin();
            assert_eq!(tx.reserve_withdraw_indices(5), 0);
        }
        assert_eq!(store.next_withdraw_index(), 0);
        let mut tx = store.begin();
        assert_eq!(tx.reserve_withdraw_indices(5), 0);
        assert_eq!(tx.reserve_withdraw_indices(2), 5);
        tx.commit().unwrap();
        assert_eq!(store.next_withdraw_index(), 7);
    }

    #[test]
    fn concurrent_spends_do_not_double_spend() {
        let (store, _) = store_with(1, D);
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut tx = store.begin();
                    let res = tx.spend_coins(&D, 1);
                    if res.is_ok() {
                        tx.commit().unwrap();
                    }
                    res.is_ok()
                })
            })
            .collect();
        let successes = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(successes, 1);
        assert_eq!(store.inventory().count(&D), 0);
    }

    #[test]
    fn export_import_round_trip() {
        let (store, pubs) = store_with(2, D);
        let bytes = store.export_json().unwrap();
        let restored = MemoryCoinStore::import_json(&bytes).unwrap();
        assert_eq!(restored.inventory(), store.inventory());
        let mut tx = restored.begin();
        assert_eq!(tx.denom_sig(&pubs[0]), Some(vec![1]));
        assert!(tx.coin_secret(&pubs[1]).is_some());
        tx.spend_coins(&D, 2).unwrap();
    }
}
