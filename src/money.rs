//! Money - arbitrary-precision decimal amounts
//!
//! All prices, quantities and balances flow through [`Money`], a thin wrapper
//! over `bigdecimal::BigDecimal`. Construction goes through audited paths
//! (string parse or the arithmetic below); binary floating point never
//! touches a financial value.
//!
//! ## Representation
//! - Arbitrary-precision decimal, stored in PostgreSQL as `NUMERIC(30, 10)`:
//!   the full 30 significant digits of the schema (20 integer + 10
//!   fractional) are representable exactly, with headroom for intermediate
//!   products
//! - At most [`Money::SCALE`] fractional digits are accepted on parse
//! - Serialises to/from the canonical decimal string form

use bigdecimal::{BigDecimal, Zero};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Neg;
use std::str::FromStr;
use thiserror::Error;

/// A signed decimal monetary amount.
///
/// Ordering and equality are numeric (scale-insensitive), so `1.50 == 1.5`.
/// Addition, subtraction and multiplication are exact and total; division
/// exists only for derived figures and truncates at [`Money::SCALE`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, sqlx::Type)]
#[sqlx(transparent)]
pub struct Money(BigDecimal);

/// Money parse/arithmetic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("invalid decimal format: {0}")]
    InvalidFormat(String),

    #[error("precision overflow: {provided} fractional digits, max {max}")]
    PrecisionOverflow { provided: i64, max: i64 },

    #[error("division by zero")]
    DivisionByZero,
}

impl Money {
    /// Fractional digits carried by the persistence schema.
    pub const SCALE: i64 = 10;

    pub fn zero() -> Self {
        Money(BigDecimal::zero())
    }

    pub fn from_decimal(value: BigDecimal) -> Self {
        Money(value)
    }

    pub fn into_decimal(self) -> BigDecimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.sign() == bigdecimal::num_bigint::Sign::Minus
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.sign() == bigdecimal::num_bigint::Sign::Plus
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Exact sum.
    pub fn add(&self, other: &Self) -> Self {
        Money(&self.0 + &other.0)
    }

    /// Exact difference.
    pub fn sub(&self, other: &Self) -> Self {
        Money(&self.0 - &other.0)
    }

    /// Exact product. The result may carry more than [`Money::SCALE`]
    /// fractional digits; amounts headed for the ledger must go through
    /// [`Money::quantize_down`] first.
    pub fn mul(&self, other: &Self) -> Self {
        Money(&self.0 * &other.0)
    }

    /// Quotient truncated toward zero at [`Money::SCALE`] digits.
    ///
    /// Division exists only for derived figures (average fill price); ledger
    /// amounts are never produced by division.
    pub fn checked_div(&self, other: &Self) -> Result<Self, MoneyError> {
        if other.0.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        Ok(Money(&self.0 / &other.0).quantize_down())
    }

    /// Truncate toward zero to the persisted scale.
    pub fn quantize_down(&self) -> Self {
        Money(
            self.0
                .with_scale_round(Self::SCALE, bigdecimal::RoundingMode::Down),
        )
    }

    /// Smaller of two amounts.
    pub fn min(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    /// Parse the canonical decimal string form.
    ///
    /// Rejects scientific notation, thousands separators and anything with
    /// more than [`Money::SCALE`] fractional digits (no silent truncation).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MoneyError::InvalidFormat("empty string".into()));
        }
        if s.contains(['e', 'E']) {
            return Err(MoneyError::InvalidFormat(s.to_string()));
        }
        let value =
            BigDecimal::from_str(s).map_err(|_| MoneyError::InvalidFormat(s.to_string()))?;
        let scale = value.fractional_digit_count();
        if scale > Self::SCALE {
            return Err(MoneyError::PrecisionOverflow {
                provided: scale,
                max: Self::SCALE,
            });
        }
        Ok(Money(value))
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| Money(acc.0 + m.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<BigDecimal> for Money {
    fn from(value: BigDecimal) -> Self {
        Money(value)
    }
}

// Wire form is always the decimal string, never a JSON number
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
