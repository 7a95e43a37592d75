//! Denomination selection.
//!
//! Plans which denominations to withdraw for a target amount and which to
//! spend (and refresh) for a payment. Planning is pure: it reads a
//! [`DenominationSystem`] and an [`Inventory`] and returns serializable
//! plans. Committing a plan against real coins is the job of
//! [`lifecycle`](crate::lifecycle).
//!
//! All arithmetic runs on integer fraction units, so the accounting
//! identity
//!
//! ```text
//! balance(after) = balance(before) - cost - refresh_fees - unrecovered
//! ```
//!
//! holds exactly for every plan.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use purse_core::{Amount, AmountError, Denomination, DenominationId, DenominationSystem, Inventory, StoreError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WalletError;

/// Order in which spendable denominations are consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpendStrategy {
    /// Least valuable coins first; the first coin larger than the
    /// remaining cost is refreshed.
    SmallestFirst,
    /// Most valuable coins first.
    LargestFirst,
    /// One coin that covers the whole cost if there is one, otherwise
    /// smallest first.
    #[default]
    Hybrid,
}

impl SpendStrategy {
    pub const ALL: [SpendStrategy; 3] = [SpendStrategy::SmallestFirst, SpendStrategy::LargestFirst, SpendStrategy::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpendStrategy::SmallestFirst => "smallest-first",
            SpendStrategy::LargestFirst => "largest-first",
            SpendStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SpendStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpendStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown strategy {s:?} (expected smallest-first, largest-first or hybrid)"))
    }
}

/// A number of coins of one denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenominationCount {
    pub denom_id: DenominationId,
    pub value: Amount,
    pub count: u64,
}

/// Coins to withdraw for a target amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawPlan {
    /// Largest denomination first.
    pub coins: Vec<DenominationCount>,
    /// Sum of the face values.
    pub total_value: Amount,
    /// Sum of the withdraw fees.
    pub total_fees: Amount,
    /// Part of the target that no denomination can represent.
    pub remainder: Amount,
}

impl WithdrawPlan {
    pub fn coin_count(&self) -> u64 {
        self.coins.iter().map(|c| c.count).sum()
    }

    /// Denomination of every coin in plan order, one entry per coin.
    pub fn expand(&self) -> Vec<DenominationId> {
        self.coins
            .iter()
            .flat_map(|c| std::iter::repeat_n(c.denom_id, c.count as usize))
            .collect()
    }
}

/// Melting one partially spent coin into fresh change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPlan {
    /// Denomination of the coin being melted.
    pub source: DenominationId,
    pub source_value: Amount,
    /// Face value left over after paying the cost.
    pub excess: Amount,
    pub melt_fee: Amount,
    /// Fresh coins bought with `excess - melt_fee`.
    pub output: WithdrawPlan,
}

impl RefreshPlan {
    /// Melt fee, output withdraw fees, and the output remainder that no
    /// denomination can carry.
    pub fn fees_units(&self) -> u128 {
        self.melt_fee.units() + self.output.total_fees.units() + self.output.remainder.units()
    }
}

/// Coins to spend, and refreshes to run, for one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendPlan {
    pub cost: Amount,
    pub strategy: SpendStrategy,
    /// Coins spent in full, including the ones later melted.
    pub spends: Vec<DenominationCount>,
    pub refreshes: Vec<RefreshPlan>,
    /// Excess too small to pay for its own refresh.
    pub unrecovered: Amount,
}

impl SpendPlan {
    /// Total fees paid for refreshing.
    pub fn refresh_fees(&self) -> Result<Amount, AmountError> {
        let units = self.refreshes.iter().map(RefreshPlan::fees_units).sum();
        Amount::from_units(self.cost.currency(), units)
    }

    /// Coins removed from the inventory by this plan.
    pub fn consumed(&self) -> Inventory {
        let mut inv = Inventory::new();
        for s in &self.spends {
            inv.add(s.denom_id, s.count);
        }
        inv
    }

    /// Coins added to the inventory by the refreshes.
    pub fn produced(&self) -> Inventory {
        let mut inv = Inventory::new();
        for r in &self.refreshes {
            for c in &r.output.coins {
                inv.add(c.denom_id, c.count);
            }
        }
        inv
    }

    pub fn spend_ops(&self) -> u64 {
        self.spends.iter().map(|s| s.count).sum()
    }

    pub fn refresh_outputs(&self) -> u64 {
        self.refreshes.iter().map(|r| r.output.coin_count()).sum()
    }

    /// Inventory after committing this plan and completing its refreshes.
    pub fn apply(&self, inventory: &Inventory) -> Result<Inventory, StoreError> {
        let mut after = inventory.clone();
        for (id, n) in self.consumed().iter() {
            after.remove(id, *n)?;
        }
        for (id, n) in self.produced().iter() {
            after.add(*id, *n);
        }
        Ok(after)
    }
}

/// Stateless planner over a denomination system.
pub struct CoinSelector;

impl CoinSelector {
    /// Greedy withdraw decomposition, largest denomination first.
    ///
    /// Each coin costs its face value plus withdraw fee. The result is the
    /// minimum coin count whenever the system is canonical, which
    /// [`DenominationSystem`] guarantees.
    pub fn plan_withdraw(system: &DenominationSystem, amount: &Amount) -> Result<WithdrawPlan, WalletError> {
        check_currency(system, amount)?;
        let currency = system.currency();
        let mut remaining = amount.units();
        let mut coins = Vec::new();
        let (mut value, mut fees) = (0u128, 0u128);

        for d in system.largest_first() {
            let cost = d.withdraw_cost();
            let n = remaining / cost;
            if n == 0 {
                continue;
            }
            remaining -= n * cost;
            value += n * d.value.units();
            fees += n * d.fee_withdraw.units();
            let count = u64::try_from(n).map_err(|_| AmountError::Overflow)?;
            coins.push(DenominationCount { denom_id: d.id, value: d.value.clone(), count });
        }

        Ok(WithdrawPlan {
            coins,
            total_value: Amount::from_units(currency, value)?,
            total_fees: Amount::from_units(currency, fees)?,
            remainder: Amount::from_units(currency, remaining)?,
        })
    }

    /// Plan a payment of `cost` from `inventory`.
    ///
    /// Fails with [`WalletError::InsufficientFunds`] when the inventory is
    /// worth less than `cost`; withdrawing is left to the caller.
    pub fn plan_spend(
        system: &DenominationSystem,
        inventory: &Inventory,
        cost: &Amount,
        strategy: SpendStrategy,
    ) -> Result<SpendPlan, WalletError> {
        check_currency(system, cost)?;
        let balance = inventory.balance(system)?;
        if cost.units() > balance.units() {
            return Err(WalletError::InsufficientFunds { have: balance, need: cost.clone() });
        }

        let mut walk = Walk { available: inventory.clone(), remaining: cost.units(), spends: Vec::new(), melt: None };
        let ascending: Vec<&Arc<Denomination>> = system.smallest_first().collect();
        match strategy {
            SpendStrategy::SmallestFirst => walk.scan(&ascending)?,
            SpendStrategy::LargestFirst => {
                let descending: Vec<&Arc<Denomination>> = system.largest_first().collect();
                walk.scan(&descending)?
            }
            SpendStrategy::Hybrid if walk.remaining > 0 => {
                let remaining = walk.remaining;
                let cover = ascending
                    .iter()
                    .find(|d| walk.available.count(&d.id) > 0 && d.value.units() >= remaining);
                match cover {
                    Some(d) => walk.take(d)?,
                    None => walk.scan(&ascending)?,
                }
            }
            SpendStrategy::Hybrid => {}
        }
        if walk.remaining > 0 {
            return Err(WalletError::InsufficientFunds { have: balance, need: cost.clone() });
        }

        let currency = system.currency();
        let mut refreshes = Vec::new();
        let mut unrecovered = 0u128;
        if let Some((d, excess)) = walk.melt {
            if excess <= d.fee_refresh.units() {
                unrecovered = excess;
            } else {
                let available = Amount::from_units(currency, excess - d.fee_refresh.units())?;
                refreshes.push(RefreshPlan {
                    source: d.id,
                    source_value: d.value.clone(),
                    excess: Amount::from_units(currency, excess)?,
                    melt_fee: d.fee_refresh.clone(),
                    output: Self::plan_withdraw(system, &available)?,
                });
            }
        }

        let plan = SpendPlan {
            cost: cost.clone(),
            strategy,
            spends: walk.spends,
            refreshes,
            unrecovered: Amount::from_units(currency, unrecovered)?,
        };
        debug!(
            cost = %plan.cost,
            %strategy,
            spend_ops = plan.spend_ops(),
            refreshes = plan.refreshes.len(),
            unrecovered = %plan.unrecovered,
            "spend planned"
        );
        Ok(plan)
    }
}

fn check_currency(system: &DenominationSystem, amount: &Amount) -> Result<(), AmountError> {
    if amount.currency() != system.currency() {
        return Err(AmountError::CurrencyMismatch {
            left: amount.currency().to_string(),
            right: system.currency().to_string(),
        });
    }
    Ok(())
}

/// Mutable state of one spend planning run.
struct Walk {
    available: Inventory,
    remaining: u128,
    spends: Vec<DenominationCount>,
    /// Coin that overpaid, with its excess.
    melt: Option<(Arc<Denomination>, u128)>,
}

impl Walk {
    /// Spend one coin of `d` against the remaining cost.
    fn take(&mut self, d: &Arc<Denomination>) -> Result<(), StoreError> {
        self.available.remove(&d.id, 1)?;
        match self.spends.iter_mut().find(|s| s.denom_id == d.id) {
            Some(s) => s.count += 1,
            None => self.spends.push(DenominationCount { denom_id: d.id, value: d.value.clone(), count: 1 }),
        }
        let value = d.value.units();
        if value <= self.remaining {
            self.remaining -= value;
        } else {
            self.melt = Some((Arc::clone(d), value - self.remaining));
            self.remaining = 0;
        }
        Ok(())
    }

    /// Repeatedly spend the first available denomination in `order`.
    fn scan(&mut self, order: &[&Arc<Denomination>]) -> Result<(), StoreError> {
        while self.remaining > 0 {
            let Some(d) = order.iter().find(|d| self.available.count(&d.id) > 0) else {
                break;
            };
            self.take(d)?;
        }
        Ok(())
    }
}
