//! Per-denomination coin counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::denomination::DenominationSystem;
use crate::error::{DenominationError, StoreError};
use crate::types::DenominationId;

/// Multiset of spendable coins: denomination → count.
///
/// Zero counts are never stored, so two inventories holding the same coins
/// compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    counts: BTreeMap<DenominationId, u64>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, id: &DenominationId) -> u64 {
        self.counts.get(id).copied().unwrap_or(0)
    }

    pub fn add(&mut self, id: DenominationId, n: u64) {
        if n > 0 {
            *self.counts.entry(id).or_insert(0) += n;
        }
    }

    /// Remove `n` coins of `id`. Fails without change if fewer are held.
    pub fn remove(&mut self, id: &DenominationId, n: u64) -> Result<(), StoreError> {
        let have = self.count(id);
        if have < n {
            return Err(StoreError::NotEnoughCoins { denom: id.to_string(), have, need: n });
        }
        if have == n {
            self.counts.remove(id);
        } else {
            self.counts.insert(*id, have - n);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total_coins(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DenominationId, &u64)> {
        self.counts.iter()
    }

    /// Total balance in fraction units, valued against `system`.
    pub fn balance_units(&self, system: &DenominationSystem) -> Result<u128, DenominationError> {
        self.counts.iter().try_fold(0u128, |acc, (id, n)| -> Result<u128, DenominationError> {
            let d = system.require(id)?;
            Ok(acc + d.value.units() * *n as u128)
        })
    }

    /// Total balance as an amount in the system's currency.
    pub fn balance(&self, system: &DenominationSystem) -> Result<Amount, DenominationError> {
        let units = self.balance_units(system)?;
        Ok(Amount::from_units(system.currency(), units)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> DenominationSystem {
        DenominationSystem::powers_of_two("KUDOS", 8).unwrap()
    }

    #[test]
    fn balance_is_weighted_sum() {
        let sys = system();
        let mut inv = Inventory::new();
        inv.add(sys.by_value(8).unwrap().id, 2);
        inv.add(sys.by_value(1).unwrap().id, 3);
        assert_eq!(inv.balance(&sys).unwrap(), "KUDOS:19".parse().unwrap());
        assert_eq!(inv.total_coins(), 5);
    }

    #[test]
    fn remove_never_goes_negative() {
        let sys = system();
        let two = sys.by_value(2).unwrap().id;
        let mut inv = Inventory::new();
        inv.add(two, 1);
        let err = inv.remove(&two, 2).unwrap_err();
        assert!(matches!(err, StoreError::NotEnoughCoins { have: 1, need: 2, .. }));
        assert_eq!(inv.count(&two), 1);
        inv.remove(&two, 1).unwrap();
        assert!(inv.is_empty());
    }

    #[test]
    fn unknown_denomination_has_no_value() {
        let mut inv = Inventory::new();
        inv.add(DenominationId([7; 32]), 1);
        assert!(matches!(inv.balance(&system()), Err(DenominationError::UnknownDenomination(_))));
    }

    #[test]
    fn zero_adds_are_ignored() {
        let mut inv = Inventory::new();
        inv.add(DenominationId([7; 32]), 0);
        assert_eq!(inv, Inventory::new());
    }
}
