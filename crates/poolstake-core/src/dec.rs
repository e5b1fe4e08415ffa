//! Non-negative fixed-point decimal with 18 fractional digits.
//!
//! All products and quotients go through a 256-bit intermediate, so `a * b / d` is exact
//! before the final rounding step. The `_truncate` operations floor; the unsuffixed
//! `mul`/`quo` round half up.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{PoolstakeError, Result};

pub const PRECISION: u32 = 18;
const ONE_RAW: u128 = 1_000_000_000_000_000_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dec(u128);

impl Dec {
    pub const ZERO: Dec = Dec(0);
    pub const ONE: Dec = Dec(ONE_RAW);
    /// Smallest representable positive value (`1e-18`).
    pub const SMALLEST: Dec = Dec(1);

    pub const fn from_raw(raw: u128) -> Dec {
        Dec(raw)
    }

    pub fn raw(self) -> u128 {
        self.0
    }

    pub fn from_int(n: u128) -> Result<Dec> {
        n.checked_mul(ONE_RAW)
            .map(Dec)
            .ok_or_else(|| PoolstakeError::BoundedValueExceeded("decimal overflow".into()))
    }

    /// `num / den`, truncated. Useful for writing rates such as `Dec::from_ratio(1, 10)`.
    pub fn from_ratio(num: u128, den: u128) -> Result<Dec> {
        mul_div_floor(num, ONE_RAW, den).map(Dec)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Dec) -> Result<Dec> {
        self.0
            .checked_add(other.0)
            .map(Dec)
            .ok_or_else(|| PoolstakeError::BoundedValueExceeded("decimal overflow in add".into()))
    }

    /// Returns `None` when the result would be negative.
    pub fn checked_sub(self, other: Dec) -> Option<Dec> {
        self.0.checked_sub(other.0).map(Dec)
    }

    pub fn saturating_sub(self, other: Dec) -> Dec {
        Dec(self.0.saturating_sub(other.0))
    }

    pub fn mul(self, other: Dec) -> Result<Dec> {
        mul_div_round(self.0, other.0, ONE_RAW).map(Dec)
    }

    pub fn mul_truncate(self, other: Dec) -> Result<Dec> {
        mul_div_floor(self.0, other.0, ONE_RAW).map(Dec)
    }

    pub fn quo(self, other: Dec) -> Result<Dec> {
        mul_div_round(self.0, ONE_RAW, other.0).map(Dec)
    }

    pub fn quo_truncate(self, other: Dec) -> Result<Dec> {
        mul_div_floor(self.0, ONE_RAW, other.0).map(Dec)
    }

    pub fn mul_int(self, n: u128) -> Result<Dec> {
        self.0
            .checked_mul(n)
            .map(Dec)
            .ok_or_else(|| PoolstakeError::BoundedValueExceeded("decimal overflow in mul".into()))
    }

    pub fn quo_int_truncate(self, n: u128) -> Result<Dec> {
        if n == 0 {
            return Err(PoolstakeError::InvalidInput("division by zero".into()));
        }
        Ok(Dec(self.0 / n))
    }

    /// `self * num / den` with a single floor at the end.
    pub fn mul_ratio_truncate(self, num: Dec, den: Dec) -> Result<Dec> {
        mul_div_floor(self.0, num.0, den.0).map(Dec)
    }

    /// `self * num / den` with a single half-up rounding at the end.
    pub fn mul_ratio(self, num: Dec, den: Dec) -> Result<Dec> {
        mul_div_round(self.0, num.0, den.0).map(Dec)
    }

    /// Integer part (floor).
    pub fn truncate_int(self) -> u128 {
        self.0 / ONE_RAW
    }

    /// Drops the fractional digits.
    pub fn truncate(self) -> Dec {
        Dec(self.0 - self.0 % ONE_RAW)
    }

    pub fn min(self, other: Dec) -> Dec {
        if self <= other {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:018}", self.0 / ONE_RAW, self.0 % ONE_RAW)
    }
}

impl FromStr for Dec {
    type Err = PoolstakeError;

    fn from_str(s: &str) -> Result<Dec> {
        let bad = || PoolstakeError::InvalidInput(format!("invalid decimal: {s:?}"));
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() || frac_part.len() > PRECISION as usize {
            return Err(bad());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(bad());
        }
        if s.contains('.') && frac_part.is_empty() {
            return Err(bad());
        }
        let int: u128 = int_part.parse().map_err(|_| bad())?;
        let mut frac: u128 = 0;
        if !frac_part.is_empty() {
            frac = frac_part.parse().map_err(|_| bad())?;
            frac *= 10u128.pow(PRECISION - frac_part.len() as u32);
        }
        Dec::from_int(int)?.checked_add(Dec(frac))
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Dec, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Full 128x128 -> 256 bit product as `(hi, lo)`.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    let mask = u64::MAX as u128;
    let (a_lo, a_hi) = (a & mask, a >> 64);
    let (b_lo, b_hi) = (b & mask, b >> 64);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & mask) + (hl & mask);
    let lo = (ll & mask) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

/// `(hi, lo) / d` as `(quotient, remainder)`, or `None` if the quotient exceeds 128 bits.
fn div_wide(hi: u128, lo: u128, d: u128) -> Option<(u128, u128)> {
    if hi >= d {
        return None;
    }
    if hi == 0 {
        return Some((lo / d, lo % d));
    }
    let mut rem = hi;
    let mut q: u128 = 0;
    for i in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> i) & 1);
        q <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            q |= 1;
        }
    }
    Some((q, rem))
}

fn mul_div(a: u128, b: u128, denom: u128) -> Result<(u128, u128)> {
    if denom == 0 {
        return Err(PoolstakeError::InvalidInput("division by zero".into()));
    }
    let (hi, lo) = mul_wide(a, b);
    div_wide(hi, lo, denom)
        .ok_or_else(|| PoolstakeError::BoundedValueExceeded("u128 overflow in mul_div".into()))
}

pub(crate) fn mul_div_floor(a: u128, b: u128, denom: u128) -> Result<u128> {
    mul_div(a, b, denom).map(|(q, _)| q)
}

pub(crate) fn mul_div_round(a: u128, b: u128, denom: u128) -> Result<u128> {
    let (q, rem) = mul_div(a, b, denom)?;
    if rem >= denom - rem {
        q.checked_add(1)
            .ok_or_else(|| PoolstakeError::BoundedValueExceeded("u128 overflow in round".into()))
    } else {
        Ok(q)
    }
}
