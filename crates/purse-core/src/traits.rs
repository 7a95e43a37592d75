//! Trait interfaces at the edges of the core.
//!
//! - [`CoinStore`] / [`StoreTransaction`]: persistent coin bookkeeping
//!   with scoped atomic transactions ([`MemoryCoinStore`](crate::store::MemoryCoinStore) implements)
//! - [`ProviderApi`]: the network side of withdraw and melt (consumed)
//! - [`BlindingScheme`]: blinding of planchets for a denomination key

use async_trait::async_trait;
use purse_crypto::{BlindingKey, CoinSecret};

use crate::denomination::Denomination;
use crate::error::{ProviderError, StoreError};
use crate::inventory::Inventory;
use crate::provider::{BlindSignature, MeltRequest, MeltResponse, ProviderKeys, WithdrawRequest};
use crate::types::{CoinPub, CoinRecord, CoinState, CoinSummary, DenominationId, RefreshSession, SessionId};

/// Coin storage with atomic multi-coin updates.
///
/// All mutation goes through [`begin`](CoinStore::begin). Implementations
/// must serialize transactions: while one is open, no other may observe or
/// change the coins it touches.
pub trait CoinStore: Send + Sync {
    /// Open a transaction. Dropping it without calling
    /// [`commit`](StoreTransaction::commit) discards every change.
    fn begin(&self) -> Box<dyn StoreTransaction + '_>;

    /// Spendable (`Withdrawn`) coins per denomination.
    fn inventory(&self) -> Inventory;

    fn coin(&self, coin_pub: &CoinPub) -> Option<CoinSummary>;

    fn coins(&self) -> Vec<CoinSummary>;

    fn refresh_session(&self, id: &SessionId) -> Option<RefreshSession>;

    fn refresh_sessions(&self) -> Vec<RefreshSession>;

    /// Coins in a given state.
    ///
    /// Default implementation filters [`coins`](Self::coins).
    fn coins_in_state(&self, state: CoinState) -> Vec<CoinSummary> {
        self.coins().into_iter().filter(|c| c.state == state).collect()
    }
}

/// One open store transaction.
pub trait StoreTransaction {
    /// Spendable coins as seen inside this transaction.
    fn inventory(&self) -> Inventory;

    fn coin(&self, coin_pub: &CoinPub) -> Option<CoinSummary>;

    /// Private key of a stored coin.
    fn coin_secret(&self, coin_pub: &CoinPub) -> Option<&CoinSecret>;

    /// Provider signature of a stored coin.
    fn denom_sig(&self, coin_pub: &CoinPub) -> Option<Vec<u8>>;

    /// Pick `count` withdrawn coins of `denom` and mark them spent.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotEnoughCoins`] if fewer than `count` are available;
    /// nothing is marked in that case.
    fn spend_coins(&mut self, denom: &DenominationId, count: u64) -> Result<Vec<CoinPub>, StoreError>;

    /// Apply a lifecycle transition to one coin.
    fn transition(&mut self, coin_pub: &CoinPub, to: CoinState) -> Result<(), StoreError>;

    /// Attach the unblinded provider signature to a coin.
    fn set_denom_sig(&mut self, coin_pub: &CoinPub, sig: Vec<u8>) -> Result<(), StoreError>;

    fn insert_coin(&mut self, coin: CoinRecord) -> Result<(), StoreError>;

    fn insert_session(&mut self, session: RefreshSession) -> Result<(), StoreError>;

    /// Reserve `n` consecutive withdraw derivation indices and return the first.
    fn reserve_withdraw_indices(&mut self, n: u32) -> u32;

    /// Apply all changes atomically.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Network operations against a coin provider.
///
/// Implemented by the HTTP layer outside this workspace; tests use mocks.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Current denominations and fees.
    async fn keys(&self) -> Result<ProviderKeys, ProviderError>;

    /// Blind-sign one planchet.
    async fn withdraw(&self, request: WithdrawRequest) -> Result<BlindSignature, ProviderError>;

    /// Melt a coin into a refresh session.
    async fn melt(&self, request: MeltRequest) -> Result<MeltResponse, ProviderError>;
}

/// Blind signature scheme for one kind of denomination key.
pub trait BlindingScheme: Send + Sync {
    /// Blind a coin public key so the signer cannot see it.
    fn blind(&self, denom: &Denomination, coin_pub: &CoinPub, blinding_key: &BlindingKey) -> Result<Vec<u8>, ProviderError>;

    /// Remove the blinding from a signature over a blinded planchet.
    fn unblind(
        &self,
        denom: &Denomination,
        coin_pub: &CoinPub,
        signature: &BlindSignature,
        blinding_key: &BlindingKey,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Check an unblinded signature.
    fn verify(&self, denom: &Denomination, coin_pub: &CoinPub, sig: &[u8]) -> bool;
}
