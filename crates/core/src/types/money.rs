//! Integer money amounts.
//!
//! The backend prices everything in whole som. Product prices and order
//! totals arrive as decimal strings (`"150.00"`) or plain numbers, so
//! [`Money`] parses both through [`rust_decimal::Decimal`] and rejects
//! anything negative or fractional at the boundary.
//!
//! Arithmetic saturates: a total can never wrap around or drop below zero.

use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors produced when converting external amounts into [`Money`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// The amount could not be parsed as a decimal number.
    #[error("invalid amount: {0}")]
    Invalid(String),

    /// The amount is below zero.
    #[error("amount must not be negative: {0}")]
    Negative(Decimal),

    /// The amount has a fractional part.
    #[error("amount must be a whole number: {0}")]
    Fractional(Decimal),

    /// The amount does not fit into the supported range.
    #[error("amount out of range: {0}")]
    OutOfRange(Decimal),
}

/// A non-negative amount in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Create an amount from whole currency units.
    #[must_use]
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// Get the amount in whole currency units.
    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.0
    }

    /// Returns `true` if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Add two amounts, clamping at the maximum representable value.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtract two amounts, clamping at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiply by a quantity, clamping at the maximum representable value.
    #[must_use]
    pub fn saturating_mul(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(u64::from(quantity)))
    }

    /// Convert a decimal amount into whole currency units.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError` if the amount is negative, has a fractional part,
    /// or does not fit into `u64`.
    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MoneyError::Negative(value));
        }
        if !value.fract().is_zero() {
            return Err(MoneyError::Fractional(value));
        }
        value
            .trunc()
            .to_u64()
            .map(Self)
            .ok_or(MoneyError::OutOfRange(value))
    }

    /// Convert the amount into a decimal value.
    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} som", self.0)
    }
}

impl From<u64> for Money {
    fn from(amount: u64) -> Self {
        Self(amount)
    }
}

impl From<Money> for u64 {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s.trim()).map_err(|_| MoneyError::Invalid(s.to_string()))?;
        Self::from_decimal(value)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

/// Wire representations the backend uses for amounts.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireAmount {
    Whole(u64),
    Text(String),
    Float(f64),
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parsed = match WireAmount::deserialize(deserializer)? {
            WireAmount::Whole(amount) => Ok(Self(amount)),
            WireAmount::Text(text) => text.parse(),
            WireAmount::Float(value) => Decimal::try_from(value)
                .map_err(|_| MoneyError::Invalid(value.to_string()))
                .and_then(Self::from_decimal),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}
