//! Executing recorded refresh sessions.
//!
//! A session is recorded by [`commit_spend`](crate::lifecycle::commit_spend)
//! before any network traffic happens. The executor melts the source coin,
//! then withdraws every child as its own tokio task. Cancelling aborts the
//! outstanding tasks: children that finished are `Withdrawn`, the rest stay
//! `Derived` and are re-derived from the session seed on the next run.

use std::sync::Arc;

use purse_core::provider::WithdrawRequest;
use purse_core::{
    BlindingScheme, CoinPub, CoinState, CoinStore, Denomination, DenominationSystem, LifecycleError, ProviderApi,
    ProviderError, SessionId,
};
use purse_crypto::{derive_refresh_planchet, BlindingKey};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::WalletError;
use crate::lifecycle::{melt_request, record_withdrawn, session_children};

/// Blind, sign and unblind one planchet.
pub async fn sign_planchet(
    provider: &dyn ProviderApi,
    blinding: &dyn BlindingScheme,
    denom: &Denomination,
    coin_pub: &CoinPub,
    blinding_key: &BlindingKey,
) -> Result<Vec<u8>, WalletError> {
    let coin_ev = blinding.blind(denom, coin_pub, blinding_key)?;
    let blind_sig = provider.withdraw(WithdrawRequest { denom_id: denom.id, coin_ev }).await?;
    let sig = blinding.unblind(denom, coin_pub, &blind_sig, blinding_key)?;
    if !blinding.verify(denom, coin_pub, &sig) {
        return Err(ProviderError::InvalidSignature.into());
    }
    Ok(sig)
}

/// Result of one executor run over a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub session_id: SessionId,
    /// Children that are `Withdrawn`, including ones finished by earlier runs.
    pub withdrawn: Vec<CoinPub>,
    /// Children still `Derived`.
    pub pending: Vec<CoinPub>,
    /// Children whose withdraw failed in this run.
    pub failed: Vec<(CoinPub, WalletError)>,
    pub cancelled: bool,
}

impl RefreshOutcome {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Runs refresh sessions against a provider.
#[derive(Clone)]
pub struct RefreshExecutor {
    store: Arc<dyn CoinStore>,
    system: Arc<DenominationSystem>,
    provider: Arc<dyn ProviderApi>,
    blinding: Arc<dyn BlindingScheme>,
}

impl RefreshExecutor {
    pub fn new(
        store: Arc<dyn CoinStore>,
        system: Arc<DenominationSystem>,
        provider: Arc<dyn ProviderApi>,
        blinding: Arc<dyn BlindingScheme>,
    ) -> Self {
        Self { store, system, provider, blinding }
    }

    /// Melt the source coin of `session_id` and withdraw its `Derived` children.
    ///
    /// Setting `cancel` to `true` stops the run; the outcome then reports
    /// `cancelled`. A dropped sender is treated as "never cancel".
    pub async fn execute(
        &self,
        session_id: &SessionId,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RefreshOutcome, WalletError> {
        let session = self
            .store
            .refresh_session(session_id)
            .ok_or_else(|| LifecycleError::UnknownSession(session_id.to_string()))?;

        let mut outcome = RefreshOutcome {
            session_id: *session_id,
            withdrawn: Vec::new(),
            pending: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        };
        if *cancel.borrow_and_update() {
            outcome.cancelled = true;
            outcome.pending = self.children_in(&session_children(&session)?, CoinState::Derived);
            return Ok(outcome);
        }

        let melt = self.provider.melt(melt_request(self.store.as_ref(), &self.system, &session)?).await?;
        debug!(session = %session_id, noreveal_index = melt.noreveal_index, "coin melted");

        let mut tasks = JoinSet::new();
        for (index, denom_id) in (0u32..).zip(&session.new_denoms) {
            let planchet = derive_refresh_planchet(session.session_seed.as_bytes(), index)?;
            let coin_pub = CoinPub(planchet.coin_pub);
            match self.store.coin(&coin_pub).map(|c| c.state) {
                Some(CoinState::Derived) => {}
                Some(_) => {
                    outcome.withdrawn.push(coin_pub);
                    continue;
                }
                None => return Err(LifecycleError::UnknownCoin(coin_pub.to_string()).into()),
            }
            let denom = Arc::clone(self.system.require(denom_id)?);
            let provider = Arc::clone(&self.provider);
            let blinding = Arc::clone(&self.blinding);
            tasks.spawn(async move {
                let sig =
                    sign_planchet(provider.as_ref(), blinding.as_ref(), &denom, &coin_pub, &planchet.blinding_key).await;
                (coin_pub, sig)
            });
        }

        let mut watching = true;
        loop {
            tokio::select! {
                changed = cancel.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                    } else if *cancel.borrow_and_update() {
                        tasks.abort_all();
                        outcome.cancelled = true;
                        break;
                    }
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((coin_pub, Ok(sig)))) => match record_withdrawn(self.store.as_ref(), &coin_pub, sig) {
                        Ok(()) => outcome.withdrawn.push(coin_pub),
                        // a concurrent run on the same session got there first
                        Err(_) if self.store.coin(&coin_pub).is_some_and(|c| c.state == CoinState::Withdrawn) => {
                            debug!(session = %session_id, coin = %coin_pub, "refresh child already withdrawn");
                            outcome.withdrawn.push(coin_pub);
                        }
                        Err(e) => {
                            warn!(session = %session_id, coin = %coin_pub, error = %e, "recording refresh child failed");
                            outcome.failed.push((coin_pub, e));
                        }
                    },
                    Some(Ok((coin_pub, Err(e)))) => {
                        warn!(session = %session_id, coin = %coin_pub, error = %e, "refresh child withdraw failed");
                        outcome.failed.push((coin_pub, e));
                    }
                    Some(Err(e)) => warn!(session = %session_id, error = %e, "refresh task stopped"),
                },
            }
        }

        outcome.pending = self.children_in(&session_children(&session)?, CoinState::Derived);
        info!(
            session = %session_id,
            withdrawn = outcome.withdrawn.len(),
            pending = outcome.pending.len(),
            cancelled = outcome.cancelled,
            "refresh run finished"
        );
        Ok(outcome)
    }

    /// Sessions that still have `Derived` children.
    pub fn unfinished_sessions(&self) -> Result<Vec<SessionId>, WalletError> {
        let mut ids = Vec::new();
        for session in self.store.refresh_sessions() {
            if !self.children_in(&session_children(&session)?, CoinState::Derived).is_empty() {
                ids.push(session.session_id);
            }
        }
        Ok(ids)
    }

    /// Run every unfinished session, one after another.
    pub async fn resume_all(&self, cancel: watch::Receiver<bool>) -> Result<Vec<RefreshOutcome>, WalletError> {
        let mut outcomes = Vec::new();
        for id in self.unfinished_sessions()? {
            let outcome = self.execute(&id, cancel.clone()).await?;
            let stop = outcome.cancelled;
            outcomes.push(outcome);
            if stop {
                break;
            }
        }
        Ok(outcomes)
    }

    fn children_in(&self, children: &[(u32, CoinPub)], state: CoinState) -> Vec<CoinPub> {
        children
            .iter()
            .filter(|(_, c)| self.store.coin(c).is_some_and(|s| s.state == state))
            .map(|(_, c)| *c)
            .collect()
    }
}
