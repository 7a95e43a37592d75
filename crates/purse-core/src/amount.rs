//! Exact monetary amounts.
//!
//! An amount is a currency code plus an integer value and a fraction in
//! units of `10^-8`. Text form is `CUR:VALUE[.FRACTION]`. All arithmetic is
//! checked and refuses to mix currencies.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AmountError;

/// Fraction units per unit of value.
pub const FRACTIONAL_BASE: u32 = 100_000_000;

/// Number of decimal digits in the fraction.
pub const FRACTIONAL_DIGITS: usize = 8;

/// Largest representable integer value.
pub const MAX_VALUE: u64 = 1 << 52;

const MAX_CURRENCY_LEN: usize = 11;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Amount {
    currency: String,
    value: u64,
    fraction: u32,
}

impl Amount {
    pub fn new(currency: &str, value: u64, fraction: u32) -> Result<Self, AmountError> {
        check_currency(currency)?;
        if fraction >= FRACTIONAL_BASE {
            return Err(AmountError::FractionOutOfRange(fraction));
        }
        if value > MAX_VALUE {
            return Err(AmountError::Overflow);
        }
        Ok(Self { currency: currency.to_string(), value, fraction })
    }

    pub fn zero(currency: &str) -> Result<Self, AmountError> {
        Self::new(currency, 0, 0)
    }

    /// Build an amount from its total number of fraction units.
    pub fn from_units(currency: &str, units: u128) -> Result<Self, AmountError> {
        let value = units / FRACTIONAL_BASE as u128;
        let fraction = (units % FRACTIONAL_BASE as u128) as u32;
        let value = u64::try_from(value).map_err(|_| AmountError::Overflow)?;
        Self::new(currency, value, fraction)
    }

    /// Total number of fraction units.
    pub fn units(&self) -> u128 {
        self.value as u128 * FRACTIONAL_BASE as u128 + self.fraction as u128
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn fraction(&self) -> u32 {
        self.fraction
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0 && self.fraction == 0
    }

    fn same_currency(&self, other: &Self) -> Result<(), AmountError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(AmountError::CurrencyMismatch { left: self.currency.clone(), right: other.currency.clone() })
        }
    }

    pub fn checked_add(&self, other: &Self) -> Result<Self, AmountError> {
        self.same_currency(other)?;
        let sum = self.units().checked_add(other.units()).ok_or(AmountError::Overflow)?;
        Self::from_units(&self.currency, sum)
    }

    pub fn checked_sub(&self, other: &Self) -> Result<Self, AmountError> {
        self.same_currency(other)?;
        let diff = self.units().checked_sub(other.units()).ok_or(AmountError::Underflow)?;
        Self::from_units(&self.currency, diff)
    }

    pub fn checked_mul(&self, factor: u64) -> Result<Self, AmountError> {
        let product = self.units().checked_mul(factor as u128).ok_or(AmountError::Overflow)?;
        Self::from_units(&self.currency, product)
    }

    /// Compare two amounts of the same currency.
    pub fn cmp_checked(&self, other: &Self) -> Result<Ordering, AmountError> {
        self.same_currency(other)?;
        Ok(self.units().cmp(&other.units()))
    }
}

impl PartialOrd for Amount {
    /// Amounts in different currencies are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.cmp_checked(other).ok()
    }
}

fn check_currency(currency: &str) -> Result<(), AmountError> {
    if currency.is_empty()
        || currency.len() > MAX_CURRENCY_LEN
        || !currency.bytes().all(|b| b.is_ascii_alphabetic())
    {
        return Err(AmountError::InvalidFormat(format!("bad currency {currency:?}")));
    }
    Ok(())
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.currency, self.value)?;
        if self.fraction != 0 {
            let digits = format!("{:0width$}", self.fraction, width = FRACTIONAL_DIGITS);
            write!(f, ".{}", digits.trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({self})")
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (currency, number) = s
            .split_once(':')
            .ok_or_else(|| AmountError::InvalidFormat(s.to_string()))?;
        let (int_part, frac_part) = match number.split_once('.') {
            Some((i, f)) => (i, f),
            None => (number, ""),
        };
        let bad = || AmountError::InvalidFormat(s.to_string());
        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        if frac_part.len() > FRACTIONAL_DIGITS || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        if number.contains('.') && frac_part.is_empty() {
            return Err(bad());
        }
        let value: u64 = int_part.parse().map_err(|_| AmountError::Overflow)?;
        let fraction = if frac_part.is_empty() {
            0
        } else {
            let padded = format!("{frac_part:0<width$}", width = FRACTIONAL_DIGITS);
            padded.parse::<u32>().map_err(|_| bad())?
        };
        Self::new(currency, value, fraction)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
