//! Amount type for handling non-negative monetary values.
//!
//! This module provides the `Amount` type which wraps `Decimal`. Amounts are parsed from strings
//! that may carry a dollar sign and thousands separators, and are stored on the wire as plain JSON
//! numbers (which is how the ledger has always stored them). Amounts are whole cents no larger than
//! `Amount::MAX`, which keeps every amount exact as a JSON number and keeps totals from
//! overflowing.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{Error as _, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use std::str::FromStr;

/// Represents a dollar amount. Amounts are never negative; direction is carried by the collection
/// a record lives in (expense vs. income) or by a petty-cash entry's kind.
///
/// # Examples
///
/// ```
/// # use ledger_sync::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("$1,250.5").unwrap();
/// assert_eq!(amount.to_string(), "$1,250.50");
/// assert!(Amount::from_str("-4.50").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

/// The largest amount in cents: 15 significant digits, which an f64 holds exactly.
const MAX_CENTS: i64 = 999_999_999_999_999;

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// The largest amount, `9,999,999,999,999.99`.
    pub fn max() -> Amount {
        Amount(Decimal::new(MAX_CENTS, 2))
    }

    /// Creates a new `Amount`, failing if `value` is negative, has fractions of a cent, or is
    /// larger than `Amount::max()`.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value));
        }
        let value = value.normalize();
        if value.scale() > 2 {
            return Err(AmountError::FractionalCents(value));
        }
        if value > Amount::max().0 {
            return Err(AmountError::TooLarge(value));
        }
        Ok(Self(value))
    }

    /// Like `new`, but rounds fractions of a cent (half away from zero) instead of failing.
    pub fn from_decimal_rounded(value: Decimal) -> Result<Self, AmountError> {
        Amount::new(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

/// An error that can occur when parsing strings into `Amount` values.
#[derive(Debug, Clone, PartialEq)]
pub enum AmountError {
    Parse(rust_decimal::Error),
    Negative(Decimal),
    FractionalCents(Decimal),
    TooLarge(Decimal),
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Parse(e) => write!(f, "invalid amount: {e}"),
            AmountError::Negative(d) => write!(f, "amounts cannot be negative, got {d}"),
            AmountError::FractionalCents(d) => {
                write!(f, "amounts cannot have fractions of a cent, got {d}")
            }
            AmountError::TooLarge(d) => {
                write!(f, "amounts cannot be larger than {}, got {d}", Amount::max())
            }
        }
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AmountError::Parse(e) => Some(e),
            AmountError::Negative(_)
            | AmountError::FractionalCents(_)
            | AmountError::TooLarge(_) => None,
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Amount::ZERO);
        }
        let without_dollar = trimmed.strip_prefix('$').unwrap_or(trimmed);
        let without_commas = without_dollar.replace(',', "");
        let value = Decimal::from_str(&without_commas).map_err(AmountError::Parse)?;
        Amount::new(value)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}",
            format_num::format_num!(",.2", self.0.to_f64().unwrap_or_default())
        )
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Parsing the decimal text gives the nearest f64, whose shortest form is the same text.
        let value = self
            .0
            .to_string()
            .parse::<f64>()
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_f64(value)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Accepts JSON numbers (the stored form) as well as strings like `"$4.50"`.
struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative number or a dollar amount string")
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Amount, E> {
        Amount::new(Decimal::from(v)).map_err(E::custom)
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Amount, E> {
        Amount::new(Decimal::from(v)).map_err(E::custom)
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Amount, E> {
        // f64 Display is the shortest representation that round-trips, so 4.5 stays 4.5. Older
        // writers summed floats, so stray binary noise is rounded off to the cent.
        let value = Decimal::from_str(&v.to_string())
            .or_else(|_| Decimal::from_scientific(&format!("{v:e}")))
            .map_err(E::custom)?;
        Amount::from_decimal_rounded(value).map_err(E::custom)
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::from_str(v).map_err(E::custom)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0)
    }
}

/// Subtracting amounts can go below zero, so the result is a plain `Decimal`.
impl Sub for Amount {
    type Output = Decimal;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |a, b| a + b)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}
