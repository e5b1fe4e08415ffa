use serde::{Deserialize, Serialize};

use crate::coins::{validate_denom, Coin};
use crate::dec::Dec;
use crate::{PoolstakeError, Result};

pub const DEFAULT_BOND_DENOM: &str = "stake";
/// Three weeks.
pub const DEFAULT_UNBONDING_TIME: u64 = 60 * 60 * 24 * 7 * 3;
pub const DEFAULT_MAX_POOLS: u32 = 2;
pub const DEFAULT_MAX_ENTRIES: u32 = 7;
pub const DEFAULT_HISTORICAL_ENTRIES: u32 = 10_000;

/// Global engine parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// Denomination accepted for bonding.
    pub bond_denom: String,
    /// Amount minted per `mint_rewards` call.
    pub mint_inflation: Coin,
    /// Share of minted rewards routed to the community pool.
    pub community_tax: Dec,
    /// Share of pool rewards kept as operator commission.
    pub commission_rate: Dec,
    /// Upper bound on the share of minted rewards paid to a market recipient.
    pub market_rate: Dec,
    /// Seconds between unbonding and maturity.
    pub unbonding_time: u64,
    /// Size of the bonded pool set.
    pub max_pools: u32,
    /// Maximum simultaneous unbonding entries per `(delegator, pool)`.
    pub max_entries: u32,
    /// Number of historical-info records kept; 0 disables tracking.
    pub historical_entries: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            bond_denom: DEFAULT_BOND_DENOM.into(),
            mint_inflation: Coin::new(DEFAULT_BOND_DENOM, 0),
            community_tax: Dec::from_raw(20_000_000_000_000_000), // 2%
            commission_rate: Dec::from_raw(900_000_000_000_000_000), // 90%
            market_rate: Dec::from_raw(50_000_000_000_000_000), // 5%
            unbonding_time: DEFAULT_UNBONDING_TIME,
            max_pools: DEFAULT_MAX_POOLS,
            max_entries: DEFAULT_MAX_ENTRIES,
            historical_entries: DEFAULT_HISTORICAL_ENTRIES,
        }
    }
}

fn validate_rate(name: &str, v: Dec) -> Result<()> {
    if v > Dec::ONE {
        return Err(PoolstakeError::InvalidInput(format!("{name} too large: {v}")));
    }
    Ok(())
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        if self.bond_denom.trim().is_empty() {
            return Err(PoolstakeError::InvalidInput("bond denom cannot be blank".into()));
        }
        validate_denom(&self.bond_denom)?;
        self.mint_inflation.validate()?;
        validate_rate("community tax", self.community_tax)?;
        validate_rate("commission rate", self.commission_rate)?;
        validate_rate("market rate", self.market_rate)?;
        if self.community_tax.checked_add(self.market_rate)? > Dec::ONE {
            return Err(PoolstakeError::InvalidInput(
                "community tax plus market rate exceeds one".into(),
            ));
        }
        if self.unbonding_time == 0 {
            return Err(PoolstakeError::InvalidInput("unbonding time must be positive".into()));
        }
        if self.max_pools == 0 {
            return Err(PoolstakeError::InvalidInput("max pools must be positive".into()));
        }
        if self.max_entries == 0 {
            return Err(PoolstakeError::InvalidInput("max entries must be positive".into()));
        }
        Ok(())
    }
}
