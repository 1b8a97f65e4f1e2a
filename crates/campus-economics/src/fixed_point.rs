//! FIXED-POINT AMOUNTS
//!
//! Every token and currency quantity in the Campus economy is an unsigned
//! integer count of the asset's smallest unit, interpreted at a declared
//! decimal scale. Balances, quotes and reserve checks never touch floating
//! point.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

/// Largest supported scale (10^36 still fits in a u128)
pub const MAX_DECIMALS: u8 = 36;

/// Decimal scale of an asset or figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Scale(u8);

impl Scale {
    /// 6-decimal stable asset (first staking track)
    pub const STABLE: Scale = Scale(6);
    /// 18-decimal assets (base currency, utility token, second staking track)
    pub const STANDARD: Scale = Scale(18);
    /// APY figures: hundredths of a percent
    pub const APY: Scale = Scale(2);

    pub fn new(decimals: u8) -> Result<Self, FixedPointError> {
        if decimals > MAX_DECIMALS {
            return Err(FixedPointError::UnsupportedScale(decimals));
        }
        Ok(Scale(decimals))
    }

    pub fn decimals(&self) -> u8 {
        self.0
    }

    /// Raw units in one whole unit (10^decimals)
    pub fn one(&self) -> u128 {
        10u128.pow(self.0 as u32)
    }
}

impl TryFrom<u8> for Scale {
    type Error = FixedPointError;

    fn try_from(decimals: u8) -> Result<Self, Self::Error> {
        Scale::new(decimals)
    }
}

impl From<Scale> for u8 {
    fn from(scale: Scale) -> u8 {
        scale.0
    }
}

/// An exact quantity at a declared scale.
///
/// Ordering is not derived. Amounts at different scales do not compare;
/// callers go through [`FixedPointAmount::expect_scale`]
/// and compare raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedPointAmount {
    raw: u128,
    scale: Scale,
}

impl FixedPointAmount {
    pub fn new(raw: u128, scale: Scale) -> Self {
        FixedPointAmount { raw, scale }
    }

    pub fn zero(scale: Scale) -> Self {
        FixedPointAmount { raw: 0, scale }
    }

    /// Whole units, e.g. `from_units(4000, Scale::STANDARD)` is 4000 tokens
    pub fn from_units(units: u128, scale: Scale) -> Result<Self, FixedPointError> {
        let raw = units
            .checked_mul(scale.one())
            .ok_or(FixedPointError::Overflow)?;
        Ok(FixedPointAmount { raw, scale })
    }

    pub fn raw(&self) -> u128 {
        self.raw
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Parse a decimal literal such as `"1.5"` or `".000001"` into an exact amount.
    pub fn parse(literal: &str, scale: Scale) -> Result<Self, FixedPointError> {
        let trimmed = literal.trim();
        let invalid = || FixedPointError::InvalidLiteral(literal.to_string());

        let (int_part, frac_part) = match trimmed.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (trimmed, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac_part.len() > scale.decimals() as usize {
            return Err(FixedPointError::ExcessPrecision {
                literal: literal.to_string(),
                decimals: scale.decimals(),
            });
        }

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| FixedPointError::Overflow)?
        };

        let fraction: u128 = if frac_part.is_empty() {
            0
        } else {
            let digits: u128 = frac_part.parse().map_err(|_| invalid())?;
            let padding = scale.decimals() as u32 - frac_part.len() as u32;
            digits * 10u128.pow(padding)
        };

        let raw = whole
            .checked_mul(scale.one())
            .and_then(|v| v.checked_add(fraction))
            .ok_or(FixedPointError::Overflow)?;

        Ok(FixedPointAmount { raw, scale })
    }

    /// Shortest exact decimal rendering ("1.5", "0", "4000")
    pub fn format(&self) -> String {
        let one = self.scale.one();
        let whole = self.raw / one;
        let fraction = self.raw % one;

        if fraction == 0 {
            return whole.to_string();
        }

        let width = self.scale.decimals() as usize;
        let digits = format!("{:0width$}", fraction, width = width);
        format!("{}.{}", whole, digits.trim_end_matches('0'))
    }

    /// Fail unless this amount is declared at `scale`.
    pub fn expect_scale(self, scale: Scale) -> Result<Self, FixedPointError> {
        if self.scale != scale {
            return Err(FixedPointError::ScaleMismatch {
                expected: scale.decimals(),
                actual: self.scale.decimals(),
            });
        }
        Ok(self)
    }

    pub fn checked_add(self, other: FixedPointAmount) -> Result<Self, FixedPointError> {
        let other = other.expect_scale(self.scale)?;
        let raw = self
            .raw
            .checked_add(other.raw)
            .ok_or(FixedPointError::Overflow)?;
        Ok(FixedPointAmount { raw, scale: self.scale })
    }

    pub fn checked_sub(self, other: FixedPointAmount) -> Result<Self, FixedPointError> {
        let other = other.expect_scale(self.scale)?;
        let raw = self
            .raw
            .checked_sub(other.raw)
            .ok_or(FixedPointError::Underflow)?;
        Ok(FixedPointAmount { raw, scale: self.scale })
    }
}

impl fmt::Display for FixedPointAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// `floor(a * b / c)` without intermediate overflow.
pub fn mul_div_floor(a: u128, b: u128, c: u128) -> Result<u128, FixedPointError> {
    if c == 0 {
        return Err(FixedPointError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / c);
    }
    let wide = BigUint::from(a) * BigUint::from(b) / BigUint::from(c);
    u128::try_from(&wide).map_err(|_| FixedPointError::Overflow)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FixedPointError {
    #[error("Unsupported decimal scale: {0}")]
    UnsupportedScale(u8),
    #[error("Invalid amount literal: {0:?}")]
    InvalidLiteral(String),
    #[error("Amount {literal:?} has more than {decimals} fractional digits")]
    ExcessPrecision { literal: String, decimals: u8 },
    #[error("Scale mismatch: expected {expected} decimals, got {actual}")]
    ScaleMismatch { expected: u8, actual: u8 },
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Arithmetic underflow")]
    Underflow,
    #[error("Division by zero")]
    DivisionByZero,
}
