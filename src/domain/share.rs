//! Ownership share fraction backed by rust_decimal.
//!
//! Shares are exact decimal fractions (`0.6`, `0.333`), never floats. Before
//! splitting money they are rescaled to integer weights so the split itself is
//! pure integer arithmetic.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fraction of a media item owned by one party.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Share(#[serde(with = "rust_decimal::serde::float")] RustDecimal);

impl Share {
    pub fn new(value: RustDecimal) -> Self {
        Share(value)
    }

    /// Parse a Share from a string losslessly.
    ///
    /// # Errors
    /// Returns an error if the string is not a valid decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Share)
    }

    /// Format without exponent notation or trailing zeros.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Share(RustDecimal::ZERO)
    }

    pub fn one() -> Self {
        Share(RustDecimal::ONE)
    }

    pub fn is_negative(&self) -> bool {
        !self.0.is_zero() && self.0.is_sign_negative()
    }

    /// Number of decimal places in the normalized value.
    pub fn scale(&self) -> u32 {
        self.0.normalize().scale()
    }

    /// Integer weight of this share at `scale` decimal places.
    ///
    /// `0.6` at scale 3 is `600`. Returns `None` for negative shares or when
    /// the rescaled value does not fit.
    pub fn scaled_weight(&self, scale: u32) -> Option<u128> {
        if self.is_negative() {
            return None;
        }
        let normalized = self.0.normalize();
        let own_scale = normalized.scale();
        if own_scale > scale {
            return None;
        }
        let mantissa = u128::try_from(normalized.mantissa()).ok()?;
        let factor = 10u128.checked_pow(scale - own_scale)?;
        mantissa.checked_mul(factor)
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Share {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Share {
    fn from(value: RustDecimal) -> Self {
        Share(value)
    }
}

impl std::ops::Add for Share {
    type Output = Share;

    fn add(self, rhs: Share) -> Share {
        Share(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Share {
    type Output = Share;

    fn sub(self, rhs: Share) -> Share {
        Share(self.0 - rhs.0)
    }
}
