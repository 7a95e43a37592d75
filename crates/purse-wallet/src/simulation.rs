//! Coin selection simulator.
//!
//! Replays a stream of random payments against an inventory-only wallet to
//! compare spend strategies by the number of coin operations they cause.
//! No keys or stores are involved; plans are applied directly to an
//! [`Inventory`].

use purse_core::{Amount, DenominationSystem, Inventory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::coin_selection::{CoinSelector, SpendPlan, SpendStrategy};
use crate::error::WalletError;

/// Simulation parameters. Amounts are whole currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    pub transactions: u64,
    pub cost_min: u64,
    pub cost_max: u64,
    pub withdraw_max: u64,
    /// Largest power-of-two denomination.
    pub largest_denomination: u64,
    pub currency: String,
    pub strategy: SpendStrategy,
    /// RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            transactions: 1000,
            cost_min: 4,
            cost_max: 5000,
            withdraw_max: 10_000,
            largest_denomination: 8192,
            currency: "KUDOS".to_string(),
            strategy: SpendStrategy::Hybrid,
            seed: None,
        }
    }
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    pub transactions: u64,
    pub spend_ops: u64,
    pub withdraw_ops: u64,
    pub refresh_ops: u64,
    pub refresh_outputs: u64,
    /// Withdraw amounts no coin could absorb, in amount units.
    pub withdraw_remainder: u128,
}

impl SimStats {
    /// Every coin spent, withdrawn or produced by a refresh.
    pub fn total_ops(&self) -> u64 {
        self.spend_ops + self.withdraw_ops + self.refresh_outputs
    }

    /// `count` averaged over transactions.
    pub fn per_transaction(&self, count: u64) -> f64 {
        if self.transactions == 0 {
            return 0.0;
        }
        count as f64 / self.transactions as f64
    }

    pub fn outputs_per_refresh(&self) -> f64 {
        if self.refresh_ops == 0 {
            return 0.0;
        }
        self.refresh_outputs as f64 / self.refresh_ops as f64
    }
}

pub struct Simulation {
    system: DenominationSystem,
    inventory: Inventory,
    strategy: SpendStrategy,
    withdraw_max: u64,
    rng: StdRng,
    stats: SimStats,
}

impl Simulation {
    /// Simulation over powers of two up to `config.largest_denomination`.
    pub fn new(config: &SimConfig) -> Result<Self, WalletError> {
        let system = DenominationSystem::powers_of_two(&config.currency, config.largest_denomination)?;
        Ok(Self::with_system(system, config.strategy, config.withdraw_max, config.seed))
    }

    pub fn with_system(system: DenominationSystem, strategy: SpendStrategy, withdraw_max: u64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { system, inventory: Inventory::new(), strategy, withdraw_max, rng, stats: SimStats::default() }
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn system(&self) -> &DenominationSystem {
        &self.system
    }

    pub fn balance(&self) -> Result<Amount, WalletError> {
        Ok(self.inventory.balance(&self.system)?)
    }

    /// Pay `cost`, withdrawing a random amount first if the balance is short.
    pub fn step(&mut self, cost: &Amount) -> Result<SpendPlan, WalletError> {
        let currency = self.system.currency().to_string();
        loop {
            let balance = self.inventory.balance_units(&self.system)?;
            if balance >= cost.units() {
                break;
            }
            // always ask for at least the cheapest coin
            let cheapest = self.system.largest_first().map(|d| d.withdraw_cost()).min().unwrap_or(0);
            let shortfall = Amount::from_units(&currency, (cost.units() - balance).max(cheapest))?;
            // round up to whole units
            let low = shortfall.value() + u64::from(shortfall.fraction() > 0);
            let amount = self.rng.gen_range(low..=self.withdraw_max.max(low));
            let plan = CoinSelector::plan_withdraw(&self.system, &Amount::new(&currency, amount, 0)?)?;
            if plan.coin_count() == 0 {
                return Err(WalletError::InsufficientFunds { have: self.balance()?, need: cost.clone() });
            }
            for c in &plan.coins {
                self.inventory.add(c.denom_id, c.count);
            }
            self.stats.withdraw_ops += plan.coin_count();
            self.stats.withdraw_remainder += plan.remainder.units();
            trace!(amount, coins = plan.coin_count(), remainder = %plan.remainder, "simulated withdraw");
        }

        let plan = CoinSelector::plan_spend(&self.system, &self.inventory, cost, self.strategy)?;
        self.inventory = plan.apply(&self.inventory)?;
        self.stats.transactions += 1;
        self.stats.spend_ops += plan.spend_ops();
        self.stats.refresh_ops += plan.refreshes.len() as u64;
        self.stats.refresh_outputs += plan.refresh_outputs();
        Ok(plan)
    }

    /// Run `config.transactions` random payments in `[cost_min, cost_max]`.
    pub fn run(&mut self, config: &SimConfig) -> Result<SimStats, WalletError> {
        if config.cost_min > config.cost_max {
            return Err(WalletError::InvalidAmount(format!(
                "cost range [{}, {}] is empty",
                config.cost_min, config.cost_max
            )));
        }
        for _ in 0..config.transactions {
            let cost = self.rng.gen_range(config.cost_min..=config.cost_max);
            self.step(&Amount::new(&config.currency, cost, 0)?)?;
        }
        debug!(strategy = %self.strategy, transactions = self.stats.transactions, total_ops = self.stats.total_ops(), "simulation finished");
        Ok(self.stats)
    }
}
