//! Committing plans against concrete coins.
//!
//! Each function here runs exactly one store transaction. A failure at any
//! step returns before `commit`, so the transaction is dropped and nothing
//! it staged becomes visible.

use purse_core::{
    CoinPub, CoinRecord, CoinSource, CoinState, CoinStore, DenominationId, DenominationSystem, LifecycleError,
    RefreshSession, SessionId, StoreError, StoreTransaction,
};
use purse_core::provider::MeltRequest;
use purse_crypto::{derive_refresh_planchet, derive_transfer_secret, CoinSecret, CryptoError, SessionSeed};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::coin_selection::{RefreshPlan, SpendPlan, WithdrawPlan};
use crate::error::WalletError;
use crate::keys::{derive_session_seed, Seed};

/// Cut-and-choose security parameter of a refresh.
pub const KAPPA: u8 = 3;

/// What a committed spend touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendCommit {
    /// Coins now `Spent`, melted ones included.
    pub spent: Vec<CoinPub>,
    /// Refresh sessions opened, one per melted coin.
    pub sessions: Vec<SessionId>,
}

/// Create the `Derived` coins of a withdraw plan.
///
/// Indices are reserved in the same transaction, so concurrent withdraws
/// never derive the same planchet.
pub fn commit_withdraw(
    store: &dyn CoinStore,
    system: &DenominationSystem,
    seed: &Seed,
    plan: &WithdrawPlan,
) -> Result<Vec<CoinPub>, WalletError> {
    let denoms = plan.expand();
    let n = u32::try_from(denoms.len())
        .map_err(|_| WalletError::InvalidAmount(format!("{} coins in one withdraw", denoms.len())))?;

    let mut tx = store.begin();
    let first = tx.reserve_withdraw_indices(n);
    let mut created = Vec::with_capacity(denoms.len());
    for (index, denom_id) in (first..).zip(denoms) {
        system.require(&denom_id)?;
        let coin = CoinRecord::derived(seed.withdraw_planchet(index)?, denom_id, CoinSource::Withdraw { index });
        created.push(coin.coin_pub);
        tx.insert_coin(coin)?;
    }
    tx.commit()?;

    info!(coins = created.len(), first_index = first, total = %plan.total_value, "withdraw committed");
    Ok(created)
}

/// Attach the provider signature to a `Derived` coin and make it spendable.
pub fn record_withdrawn(store: &dyn CoinStore, coin_pub: &CoinPub, denom_sig: Vec<u8>) -> Result<(), WalletError> {
    let mut tx = store.begin();
    tx.set_denom_sig(coin_pub, denom_sig)?;
    tx.transition(coin_pub, CoinState::Withdrawn)?;
    tx.commit()?;
    debug!(coin = %coin_pub, "coin withdrawn");
    Ok(())
}

/// Apply a spend plan atomically.
///
/// Marks the planned coins `Spent`, and for every refresh records a
/// [`RefreshSession`] and creates its children in `Derived`. If another
/// commit consumed the coins since the plan was made, fails with
/// [`WalletError::InsufficientFunds`] and changes nothing.
pub fn commit_spend(store: &dyn CoinStore, system: &DenominationSystem, plan: &SpendPlan) -> Result<SpendCommit, WalletError> {
    let mut tx = store.begin();

    let inventory = tx.inventory();
    if plan.consumed().iter().any(|(id, n)| inventory.count(id) < *n) {
        return Err(WalletError::InsufficientFunds { have: inventory.balance(system)?, need: plan.cost.clone() });
    }

    let mut by_denom: Vec<(DenominationId, Vec<CoinPub>)> = Vec::with_capacity(plan.spends.len());
    for s in &plan.spends {
        by_denom.push((s.denom_id, tx.spend_coins(&s.denom_id, s.count)?));
    }

    let mut sessions = Vec::with_capacity(plan.refreshes.len());
    let mut melted = Vec::with_capacity(plan.refreshes.len());
    for refresh in &plan.refreshes {
        let source = by_denom
            .iter_mut()
            .find(|(id, _)| *id == refresh.source)
            .and_then(|(_, coins)| coins.pop())
            .ok_or_else(|| StoreError::NotEnoughCoins { denom: refresh.source.to_string(), have: 0, need: 1 })?;
        sessions.push(open_refresh_session(&mut *tx, system, source, refresh)?);
        melted.push(source);
    }

    let spent: Vec<CoinPub> = by_denom.into_iter().flat_map(|(_, coins)| coins).chain(melted).collect();
    tx.commit()?;

    info!(cost = %plan.cost, spent = spent.len(), refreshes = sessions.len(), "spend committed");
    Ok(SpendCommit { spent, sessions })
}

fn open_refresh_session<'t>(
    tx: &mut (dyn StoreTransaction + 't),
    system: &DenominationSystem,
    source: CoinPub,
    refresh: &RefreshPlan,
) -> Result<SessionId, WalletError> {
    let mut salt = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let secret = tx
        .coin_secret(&source)
        .ok_or_else(|| LifecycleError::UnknownCoin(source.to_string()))?;
    let session_seed = derive_session_seed(secret, &salt)?;
    let session_id = session_id(&source, &salt);
    let new_denoms = refresh.output.expand();
    let commitment = session_commitment(&session_seed, KAPPA, &new_denoms)?;

    for (index, denom_id) in (0u32..).zip(&new_denoms) {
        system.require(denom_id)?;
        let planchet = derive_refresh_planchet(session_seed.as_bytes(), index)?;
        tx.insert_coin(CoinRecord::derived(planchet, *denom_id, CoinSource::Refresh { session_id, index }))?;
    }
    tx.insert_session(RefreshSession {
        session_id,
        source_coin: source,
        source_denom: refresh.source,
        salt,
        session_seed,
        kappa: KAPPA,
        commitment,
        new_denoms,
    })?;

    debug!(session = %session_id, source = %source, children = refresh.output.coin_count(), "refresh session recorded");
    Ok(session_id)
}

/// Identifier of the session melting `source` with `salt`.
pub fn session_id(source: &CoinPub, salt: &[u8; 32]) -> SessionId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source.as_bytes());
    hasher.update(salt);
    SessionId(*hasher.finalize().as_bytes())
}

/// Hash binding a session to its `kappa` transfer keys and child denominations.
pub fn session_commitment(seed: &SessionSeed, kappa: u8, new_denoms: &[DenominationId]) -> Result<Vec<u8>, CryptoError> {
    let mut data = Vec::with_capacity(32 * (kappa as usize + new_denoms.len()));
    for i in 0..kappa {
        let mut secret = derive_transfer_secret(seed.as_bytes(), u32::from(i))?;
        let transfer = CoinSecret::from_bytes(secret);
        secret.zeroize();
        data.extend_from_slice(&transfer.public_key());
    }
    for d in new_denoms {
        data.extend_from_slice(d.as_bytes());
    }
    Ok(purse_crypto::hash(&data).to_vec())
}

/// Child coins of a session as `(index, coin_pub)`, re-derived from its seed.
pub fn session_children(session: &RefreshSession) -> Result<Vec<(u32, CoinPub)>, CryptoError> {
    (0u32..)
        .zip(&session.new_denoms)
        .map(|(index, _)| {
            derive_refresh_planchet(session.session_seed.as_bytes(), index).map(|p| (index, CoinPub(p.coin_pub)))
        })
        .collect()
}

/// Build the melt request for a recorded session, signed by the melted coin.
pub fn melt_request(store: &dyn CoinStore, system: &DenominationSystem, session: &RefreshSession) -> Result<MeltRequest, WalletError> {
    let denom = system.require(&session.source_denom)?;
    let tx = store.begin();
    let unknown = || LifecycleError::UnknownCoin(session.source_coin.to_string());
    let secret = tx.coin_secret(&session.source_coin).ok_or_else(unknown)?;
    let denom_sig = tx.denom_sig(&session.source_coin).ok_or_else(unknown)?;
    let coin_sig = secret.sign(&session.commitment).to_vec();
    Ok(MeltRequest {
        coin_pub: session.source_coin,
        denom_id: session.source_denom,
        denom_sig,
        session_commitment: session.commitment.clone(),
        coin_sig,
        value_with_fee: denom.value.clone(),
    })
}
