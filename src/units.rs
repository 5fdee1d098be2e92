use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::consts::RATE_DENOMINATOR;

/// Smallest-unit scale of the native currency (18 decimals).
pub const WEI_PER_NATIVE: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("empty amount")]
    Empty,
    #[error("amount is not a decimal number")]
    Invalid,
    #[error("more than 18 fractional digits")]
    Precision,
    #[error("amount out of range")]
    Overflow,
    #[error("invalid hex quantity")]
    Hex,
}

/// Native-currency amount in wei. All money math happens here, in integers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Wei(u128);

impl Wei {
    pub const fn new(raw: u128) -> Self {
        Wei(raw)
    }

    pub const fn zero() -> Self {
        Wei(0)
    }

    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Parse a decimal native-unit string ("1", "0.702") into wei, exactly.
    pub fn from_native_str(s: &str) -> Result<Self, UnitsError> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(UnitsError::Empty);
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(UnitsError::Invalid);
        }
        if frac_part.len() > 18 {
            return Err(UnitsError::Precision);
        }

        let int_val: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| UnitsError::Overflow)?
        };
        let frac_val: u128 = if frac_part.is_empty() {
            0
        } else {
            let digits: u128 = frac_part.parse().map_err(|_| UnitsError::Overflow)?;
            digits * 10u128.pow((18 - frac_part.len()) as u32)
        };

        int_val
            .checked_mul(WEI_PER_NATIVE)
            .and_then(|v| v.checked_add(frac_val))
            .map(Wei)
            .ok_or(UnitsError::Overflow)
    }

    /// Format as a native-unit decimal string with at least one fractional
    /// digit and trailing zeros trimmed ("1.0", "0.018").
    pub fn to_native_string(self) -> String {
        let int = self.0 / WEI_PER_NATIVE;
        let frac = self.0 % WEI_PER_NATIVE;
        let frac_str = format!("{frac:018}");
        let trimmed = frac_str.trim_end_matches('0');
        if trimmed.is_empty() {
            format!("{int}.0")
        } else {
            format!("{int}.{trimmed}")
        }
    }

    /// Parse a JSON-RPC "0x…" quantity.
    pub fn from_hex_str(s: &str) -> Result<Self, UnitsError> {
        let hex = s.strip_prefix("0x").ok_or(UnitsError::Hex)?;
        if hex.is_empty() {
            return Err(UnitsError::Hex);
        }
        u128::from_str_radix(hex, 16).map(Wei).map_err(|_| UnitsError::Hex)
    }

    pub fn to_hex(self) -> String {
        format!("0x{:x}", self.0)
    }

    /// Take `tenths` tenths-of-a-percent of this amount, flooring like the
    /// chain itself would.
    pub fn apply_permille(self, tenths: u32) -> Wei {
        Wei(self.0 * tenths as u128 / RATE_DENOMINATOR as u128)
    }
}

impl Add for Wei {
    type Output = Wei;

    fn add(self, rhs: Wei) -> Wei {
        Wei(self.0 + rhs.0)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_native_string())
    }
}

/// Payee share of a payment, stored in tenths of a percent so 70.2% and 1.8%
/// stay exact. Serialized as the plain percentage number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Percent(u32);

impl Percent {
    pub const fn from_tenths(tenths: u32) -> Self {
        Percent(tenths)
    }

    pub const fn tenths(self) -> u32 {
        self.0
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / 10.0
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 10 == 0 {
            write!(f, "{}", self.0 / 10)
        } else {
            write!(f, "{}.{}", self.0 / 10, self.0 % 10)
        }
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        if !(0.0..=100.0).contains(&value) {
            return Err(serde::de::Error::custom("percentage out of range"));
        }
        Ok(Percent((value * 10.0).round() as u32))
    }
}
