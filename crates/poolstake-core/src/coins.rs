//! Integral and decimal multi-denomination amounts.
//!
//! Both collections are normalized: denominations are kept sorted and zero amounts are
//! never stored, so structural equality is value equality.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dec::Dec;
use crate::{PoolstakeError, Result};

/// Validates a denomination: `[a-zA-Z][a-zA-Z0-9/:._-]{2,127}`.
pub fn validate_denom(denom: &str) -> Result<()> {
    let bytes = denom.as_bytes();
    let ok = (3..=128).contains(&bytes.len())
        && bytes[0].is_ascii_alphabetic()
        && bytes[1..]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'/' | b':' | b'.' | b'_' | b'-'));
    if ok {
        Ok(())
    } else {
        Err(PoolstakeError::InvalidInput(format!("invalid denom: {denom:?}")))
    }
}

/// A single integral amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Coin {
        Coin {
            denom: denom.into(),
            amount,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_denom(&self.denom)
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u128>", into = "BTreeMap<String, u128>")]
pub struct Coins(BTreeMap<String, u128>);

impl TryFrom<BTreeMap<String, u128>> for Coins {
    type Error = PoolstakeError;

    fn try_from(map: BTreeMap<String, u128>) -> Result<Coins> {
        for (denom, amount) in &map {
            validate_denom(denom)?;
            if *amount == 0 {
                return Err(PoolstakeError::InvalidInput(format!(
                    "zero amount for {denom}"
                )));
            }
        }
        Ok(Coins(map))
    }
}

impl From<Coins> for BTreeMap<String, u128> {
    fn from(coins: Coins) -> Self {
        coins.0
    }
}

impl Coins {
    pub fn new() -> Coins {
        Coins::default()
    }

    pub fn single(denom: impl Into<String>, amount: u128) -> Coins {
        let mut c = Coins::new();
        if amount > 0 {
            c.0.insert(denom.into(), amount);
        }
        c
    }

    pub fn from_coin(coin: &Coin) -> Coins {
        Coins::single(coin.denom.clone(), coin.amount)
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0.get(denom).copied().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u128)> {
        self.0.iter().map(|(d, a)| (d.as_str(), *a))
    }

    pub fn add(&self, other: &Coins) -> Result<Coins> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            if amount == 0 {
                continue;
            }
            let cur = out.amount_of(denom);
            let sum = cur.checked_add(amount).ok_or_else(|| {
                PoolstakeError::BoundedValueExceeded(format!("coin overflow for {denom}"))
            })?;
            out.0.insert(denom.to_string(), sum);
        }
        Ok(out)
    }

    /// `self - other`, or `None` if any denomination would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            let rest = out.amount_of(denom).checked_sub(amount)?;
            if rest == 0 {
                out.0.remove(denom);
            } else {
                out.0.insert(denom.to_string(), rest);
            }
        }
        Some(out)
    }

    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other.iter().all(|(d, a)| self.amount_of(d) >= a)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(d, a)| format!("{a}{d}")).collect();
        f.write_str(&parts.join(","))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Dec>", into = "BTreeMap<String, Dec>")]
pub struct DecCoins(BTreeMap<String, Dec>);

impl TryFrom<BTreeMap<String, Dec>> for DecCoins {
    type Error = PoolstakeError;

    fn try_from(map: BTreeMap<String, Dec>) -> Result<DecCoins> {
        for (denom, amount) in &map {
            validate_denom(denom)?;
            if amount.is_zero() {
                return Err(PoolstakeError::InvalidInput(format!(
                    "zero amount for {denom}"
                )));
            }
        }
        Ok(DecCoins(map))
    }
}

impl From<DecCoins> for BTreeMap<String, Dec> {
    fn from(coins: DecCoins) -> Self {
        coins.0
    }
}

impl DecCoins {
    pub fn new() -> DecCoins {
        DecCoins::default()
    }

    pub fn single(denom: impl Into<String>, amount: Dec) -> DecCoins {
        let mut c = DecCoins::new();
        if !amount.is_zero() {
            c.0.insert(denom.into(), amount);
        }
        c
    }

    pub fn from_coins(coins: &Coins) -> Result<DecCoins> {
        let mut out = DecCoins::new();
        for (denom, amount) in coins.iter() {
            if amount > 0 {
                out.0.insert(denom.to_string(), Dec::from_int(amount)?);
            }
        }
        Ok(out)
    }

    pub fn amount_of(&self, denom: &str) -> Dec {
        self.0.get(denom).copied().unwrap_or(Dec::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Dec)> {
        self.0.iter().map(|(d, a)| (d.as_str(), *a))
    }

    pub fn add(&self, other: &DecCoins) -> Result<DecCoins> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            let sum = out.amount_of(denom).checked_add(amount)?;
            if !sum.is_zero() {
                out.0.insert(denom.to_string(), sum);
            }
        }
        Ok(out)
    }

    /// `self - other`, or `None` if any denomination would go negative.
    pub fn checked_sub(&self, other: &DecCoins) -> Option<DecCoins> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            let rest = out.amount_of(denom).checked_sub(amount)?;
            if rest.is_zero() {
                out.0.remove(denom);
            } else {
                out.0.insert(denom.to_string(), rest);
            }
        }
        Some(out)
    }

    fn map_amounts(&self, f: impl Fn(Dec) -> Result<Dec>) -> Result<DecCoins> {
        let mut out = DecCoins::new();
        for (denom, amount) in self.iter() {
            let v = f(amount)?;
            if !v.is_zero() {
                out.0.insert(denom.to_string(), v);
            }
        }
        Ok(out)
    }

    pub fn mul_dec(&self, d: Dec) -> Result<DecCoins> {
        self.map_amounts(|a| a.mul(d))
    }

    pub fn mul_dec_truncate(&self, d: Dec) -> Result<DecCoins> {
        self.map_amounts(|a| a.mul_truncate(d))
    }

    pub fn quo_dec_truncate(&self, d: Dec) -> Result<DecCoins> {
        if d.is_zero() {
            return Err(PoolstakeError::InvalidInput("division by zero".into()));
        }
        self.map_amounts(|a| a.quo_truncate(d))
    }

    /// Splits into whole units and the fractional change.
    pub fn truncate_decimal(&self) -> (Coins, DecCoins) {
        let mut coins = Coins::new();
        let mut change = DecCoins::new();
        for (denom, amount) in self.iter() {
            let whole = amount.truncate_int();
            if whole > 0 {
                coins.0.insert(denom.to_string(), whole);
            }
            let frac = amount.saturating_sub(amount.truncate());
            if !frac.is_zero() {
                change.0.insert(denom.to_string(), frac);
            }
        }
        (coins, change)
    }

    /// Per-denomination minimum over the denominations present in both.
    pub fn intersect(&self, other: &DecCoins) -> DecCoins {
        let mut out = DecCoins::new();
        for (denom, amount) in self.iter() {
            let m = amount.min(other.amount_of(denom));
            if !m.is_zero() {
                out.0.insert(denom.to_string(), m);
            }
        }
        out
    }

    pub fn is_all_gte(&self, other: &DecCoins) -> bool {
        other.iter().all(|(d, a)| self.amount_of(d) >= a)
    }
}

impl fmt::Display for DecCoins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(d, a)| format!("{a}{d}")).collect();
        f.write_str(&parts.join(","))
    }
}
