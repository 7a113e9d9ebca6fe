//! Fixed-point money in minor currency units (pence).
//!
//! Every amount in the ledger is a non-negative integer number of pence. There
//! is no floating point anywhere in allocation, splitting or eligibility; pound
//! formatting belongs to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from money arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount must not be negative: {0}")]
    Negative(i64),
    #[error("subtracting {rhs} from {lhs} would go below zero")]
    Underflow { lhs: i64, rhs: i64 },
    #[error("amount overflow")]
    Overflow,
    #[error("fraction denominator must be non-zero")]
    ZeroDenominator,
}

/// Rounding policy for fractional multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Truncate toward zero.
    Down,
    /// Round to nearest, halves away from zero.
    HalfUp,
}

/// Non-negative amount of pence.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Build from a signed pence value, rejecting negatives.
    pub fn try_new(pence: i64) -> Result<Self, MoneyError> {
        if pence < 0 {
            return Err(MoneyError::Negative(pence));
        }
        Ok(Money(pence))
    }

    /// Build from a pence value that cannot be negative.
    pub const fn from_pence(pence: u32) -> Self {
        Money(pence as i64)
    }

    pub fn pence(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn add(self, rhs: Money) -> Result<Money, MoneyError> {
        self.0.checked_add(rhs.0).map(Money).ok_or(MoneyError::Overflow)
    }

    /// Subtract, failing with `Underflow` when the result would be negative.
    pub fn subtract(self, rhs: Money) -> Result<Money, MoneyError> {
        if rhs.0 > self.0 {
            return Err(MoneyError::Underflow {
                lhs: self.0,
                rhs: rhs.0,
            });
        }
        Ok(Money(self.0 - rhs.0))
    }

    /// `max(0, self - rhs)`.
    pub fn shortfall_from(self, rhs: Money) -> Money {
        Money((self.0 - rhs.0).max(0))
    }

    /// `self * numerator / denominator` in integer arithmetic.
    pub fn multiply_by_fraction(
        self,
        numerator: u64,
        denominator: u64,
        rounding: Rounding,
    ) -> Result<Money, MoneyError> {
        if denominator == 0 {
            return Err(MoneyError::ZeroDenominator);
        }
        let product = (self.0 as u128) * (numerator as u128);
        let den = denominator as u128;
        let quotient = product / den;
        let remainder = product % den;
        let rounded = match rounding {
            Rounding::Down => quotient,
            Rounding::HalfUp if remainder * 2 >= den => quotient + 1,
            Rounding::HalfUp => quotient,
        };
        i64::try_from(rounded)
            .map(Money)
            .map_err(|_| MoneyError::Overflow)
    }

    /// Sum an iterator of amounts, failing on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, MoneyError> {
        amounts.into_iter().try_fold(Money::ZERO, Money::add)
    }
}

impl TryFrom<i64> for Money {
    type Error = MoneyError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Money::try_new(value)
    }
}

impl From<Money> for i64 {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.0)
    }
}
