//! Denominations and canonical denomination systems.
//!
//! A [`DenominationSystem`] is the set of coin values one provider issues
//! for one currency. Greedy decomposition is only optimal for canonical
//! systems, so construction rejects anything where a face value is not an
//! integer multiple of the next smaller one.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::DenominationError;
use crate::types::DenominationId;

/// One coin value class published by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denomination {
    pub id: DenominationId,
    pub value: Amount,
    pub fee_withdraw: Amount,
    pub fee_refresh: Amount,
    #[serde(with = "purse_crypto::crockford::serde_bytes")]
    pub denom_pub: Vec<u8>,
}

impl Denomination {
    pub fn new(value: Amount, fee_withdraw: Amount, fee_refresh: Amount, denom_pub: Vec<u8>) -> Self {
        Self { id: denomination_id(&denom_pub), value, fee_withdraw, fee_refresh, denom_pub }
    }

    /// Price of withdrawing one coin: face value plus withdraw fee.
    pub fn withdraw_cost(&self) -> u128 {
        self.value.units() + self.fee_withdraw.units()
    }
}

/// Identifier of the denomination with public key `denom_pub`.
pub fn denomination_id(denom_pub: &[u8]) -> DenominationId {
    DenominationId(*blake3::hash(denom_pub).as_bytes())
}

/// A validated, canonical set of denominations, ordered largest first.
#[derive(Debug, Clone)]
pub struct DenominationSystem {
    currency: String,
    denoms: Vec<Arc<Denomination>>,
}

impl DenominationSystem {
    /// Validate and sort `denoms`.
    ///
    /// Rejects empty sets, mixed currencies, zero or duplicate face values,
    /// and any face value that is not an integer multiple of the next
    /// smaller one.
    pub fn new(denoms: Vec<Denomination>) -> Result<Self, DenominationError> {
        let invalid = |msg: String| DenominationError::InvalidDenominationSystem(msg);
        let currency = denoms
            .first()
            .map(|d| d.value.currency().to_string())
            .ok_or_else(|| invalid("no denominations".into()))?;

        let mut seen = HashSet::new();
        for d in &denoms {
            for a in [&d.value, &d.fee_withdraw, &d.fee_refresh] {
                if a.currency() != currency {
                    return Err(invalid(format!("mixed currencies: {currency} and {}", a.currency())));
                }
            }
            if d.value.is_zero() {
                return Err(invalid("zero face value".into()));
            }
            if !seen.insert(d.value.units()) {
                return Err(invalid(format!("duplicate face value {}", d.value)));
            }
        }

        let mut denoms: Vec<Arc<Denomination>> = denoms.into_iter().map(Arc::new).collect();
        denoms.sort_by(|a, b| b.value.units().cmp(&a.value.units()));

        for pair in denoms.windows(2) {
            let (larger, smaller) = (pair[0].value.units(), pair[1].value.units());
            if larger % smaller != 0 {
                return Err(invalid(format!(
                    "{} is not a multiple of {}",
                    pair[0].value, pair[1].value
                )));
            }
        }

        Ok(Self { currency, denoms })
    }

    /// A system of whole-unit face values with uniform fees, for tests and
    /// simulations. The public key of each denomination is its text value.
    pub fn synthetic(
        currency: &str,
        values: &[u64],
        fee_withdraw: &Amount,
        fee_refresh: &Amount,
    ) -> Result<Self, DenominationError> {
        let denoms = values
            .iter()
            .map(|&v| -> Result<Denomination, DenominationError> {
                let value = Amount::new(currency, v, 0)?;
                let denom_pub = format!("synthetic:{value}").into_bytes();
                Ok(Denomination::new(value, fee_withdraw.clone(), fee_refresh.clone(), denom_pub))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(denoms)
    }

    /// Powers of two from `1` to `largest` with no fees.
    pub fn powers_of_two(currency: &str, largest: u64) -> Result<Self, DenominationError> {
        let values: Vec<u64> = std::iter::successors(Some(1u64), |v| v.checked_mul(2))
            .take_while(|v| *v <= largest)
            .collect();
        let zero = Amount::zero(currency)?;
        Self::synthetic(currency, &values, &zero, &zero)
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn len(&self) -> usize {
        self.denoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.denoms.is_empty()
    }

    pub fn largest_first(&self) -> impl DoubleEndedIterator<Item = &Arc<Denomination>> {
        self.denoms.iter()
    }

    pub fn smallest_first(&self) -> impl DoubleEndedIterator<Item = &Arc<Denomination>> {
        self.denoms.iter().rev()
    }

    pub fn get(&self, id: &DenominationId) -> Option<&Arc<Denomination>> {
        self.denoms.iter().find(|d| d.id == *id)
    }

    /// Look up a denomination or fail with `UnknownDenomination`.
    pub fn require(&self, id: &DenominationId) -> Result<&Arc<Denomination>, DenominationError> {
        self.get(id)
            .ok_or_else(|| DenominationError::UnknownDenomination(id.to_string()))
    }

    /// Rank of a denomination: 0 for the smallest face value.
    pub fn rank(&self, id: &DenominationId) -> Option<usize> {
        self.denoms
            .iter()
            .position(|d| d.id == *id)
            .map(|pos| self.denoms.len() - 1 - pos)
    }

    /// Denomination with the given whole-unit face value, if any.
    pub fn by_value(&self, value: u64) -> Option<&Arc<Denomination>> {
        self.denoms
            .iter()
            .find(|d| d.value.fraction() == 0 && d.value.value() == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero() -> Amount {
        Amount::zero("KUDOS").unwrap()
    }

    #[test]
    fn sorted_largest_first() {
        let sys = DenominationSystem::synthetic("KUDOS", &[1, 4, 2, 8], &zero(), &zero()).unwrap();
        let values: Vec<u64> = sys.largest_first().map(|d| d.value.value()).collect();
        assert_eq!(values, vec![8, 4, 2, 1]);
        let ranks: Vec<usize> = sys.largest_first().map(|d| sys.rank(&d.id).unwrap()).collect();
        assert_eq!(ranks, vec![3, 2, 1, 0]);
    }

    #[test]
    fn powers_of_two_up_to_8192() {
        let sys = DenominationSystem::powers_of_two("KUDOS", 8192).unwrap();
        assert_eq!(sys.len(), 14);
        assert_eq!(sys.largest_first().next().unwrap().value.value(), 8192);
    }

    #[test]
    fn non_canonical_rejected() {
        // 8096 is not a multiple of 4096
        let err = DenominationSystem::synthetic("KUDOS", &[8096, 4096, 2048, 1], &zero(), &zero()).unwrap_err();
        assert!(matches!(err, DenominationError::InvalidDenominationSystem(_)));
        assert!(DenominationSystem::synthetic("KUDOS", &[1, 3, 5], &zero(), &zero()).is_err());
    }

    #[test]
    fn empty_and_duplicates_rejected() {
        assert!(DenominationSystem::new(Vec::new()).is_err());
        assert!(DenominationSystem::synthetic("KUDOS", &[2, 2, 1], &zero(), &zero()).is_err());
        assert!(DenominationSystem::synthetic("KUDOS", &[0, 1], &zero(), &zero()).is_err());
    }

    #[test]
    fn mixed_currency_rejected() {
        let fee = Amount::zero("EUR").unwrap();
        let err = DenominationSystem::synthetic("KUDOS", &[1, 2], &fee, &fee).unwrap_err();
        assert!(matches!(err, DenominationError::InvalidDenominationSystem(_)));
    }

    #[test]
    fn ids_follow_public_keys() {
        let a = Denomination::new("KUDOS:1".parse().unwrap(), zero(), zero(), b"key-a".to_vec());
        let b = Denomination::new("KUDOS:1".parse().unwrap(), zero(), zero(), b"key-b".to_vec());
        assert_ne!(a.id, b.id);
        assert_eq!(a.id, denomination_id(b"key-a"));
    }

    #[test]
    fn lookup_helpers() {
        let sys = DenominationSystem::powers_of_two("KUDOS", 16).unwrap();
        let four = sys.by_value(4).unwrap();
        assert_eq!(sys.get(&four.id).unwrap().value.value(), 4);
        assert!(sys.require(&DenominationId([0; 32])).is_err());
        assert!(sys.by_value(3).is_none());
    }
}
