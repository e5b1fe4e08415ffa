//! Ledger records.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::coins::DecCoins;
use crate::dec::Dec;
use crate::invariants::{fatal, InvariantId};
use crate::{PoolstakeError, Result};

pub const MAX_MONIKER_LENGTH: usize = 70;
pub const MAX_IDENTITY_LENGTH: usize = 3000;
pub const MAX_WEBSITE_LENGTH: usize = 140;
pub const MAX_SECURITY_CONTACT_LENGTH: usize = 140;
pub const MAX_DETAILS_LENGTH: usize = 280;

/// Sentinel for edit commands: keep the stored field.
pub const DO_NOT_MODIFY: &str = "[do-not-modify]";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Unbonded,
    Unbonding,
    Bonded,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub moniker: String,
    pub identity: String,
    pub website: String,
    pub security_contact: String,
    pub details: String,
}

impl Description {
    pub fn new(moniker: impl Into<String>) -> Description {
        Description {
            moniker: moniker.into(),
            ..Description::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Description::default()
    }

    pub fn ensure_length(&self) -> Result<()> {
        let fields = [
            ("moniker", &self.moniker, MAX_MONIKER_LENGTH),
            ("identity", &self.identity, MAX_IDENTITY_LENGTH),
            ("website", &self.website, MAX_WEBSITE_LENGTH),
            ("security contact", &self.security_contact, MAX_SECURITY_CONTACT_LENGTH),
            ("details", &self.details, MAX_DETAILS_LENGTH),
        ];
        for (name, value, max) in fields {
            if value.len() > max {
                return Err(PoolstakeError::InvalidDescription(format!(
                    "invalid {name} length; got: {}, max: {max}",
                    value.len()
                )));
            }
        }
        Ok(())
    }

    /// Applies an edit, keeping every field set to [`DO_NOT_MODIFY`].
    pub fn update(&self, edit: &Description) -> Result<Description> {
        let pick = |new: &String, old: &String| {
            if new == DO_NOT_MODIFY {
                old.clone()
            } else {
                new.clone()
            }
        };
        let d = Description {
            moniker: pick(&edit.moniker, &self.moniker),
            identity: pick(&edit.identity, &self.identity),
            website: pick(&edit.website, &self.website),
            security_contact: pick(&edit.security_contact, &self.security_contact),
            details: pick(&edit.details, &self.details),
        };
        d.ensure_length()?;
        Ok(d)
    }
}

/// An operator entity that receives delegated stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePool {
    pub operator: Address,
    pub status: PoolStatus,
    pub tokens: u128,
    pub delegator_shares: Dec,
    pub description: Description,
    pub min_self_delegation: u128,
    /// Unix seconds at which an `Unbonding` pool matures.
    pub unbonding_time: u64,
    pub unbonding_height: u64,
}

impl StakePool {
    pub fn new(operator: Address, description: Description) -> StakePool {
        StakePool {
            operator,
            status: PoolStatus::Unbonded,
            tokens: 0,
            delegator_shares: Dec::ZERO,
            description,
            min_self_delegation: 1,
            unbonding_time: 0,
            unbonding_height: 0,
        }
    }

    pub fn is_bonded(&self) -> bool {
        self.status == PoolStatus::Bonded
    }

    pub fn is_unbonding(&self) -> bool {
        self.status == PoolStatus::Unbonding
    }

    pub fn is_unbonded(&self) -> bool {
        self.status == PoolStatus::Unbonded
    }

    /// Zero tokens backing a positive share count.
    pub fn invalid_ex_rate(&self) -> bool {
        self.tokens == 0 && self.delegator_shares.is_positive()
    }

    pub fn tokens_dec(&self) -> Result<Dec> {
        Dec::from_int(self.tokens)
    }

    /// `shares * tokens / delegator_shares`, rounded half up.
    pub fn tokens_from_shares(&self, shares: Dec) -> Result<Dec> {
        shares.mul_ratio(self.tokens_dec()?, self.delegator_shares)
    }

    /// `shares * tokens / delegator_shares`, floored.
    pub fn tokens_from_shares_truncated(&self, shares: Dec) -> Result<Dec> {
        shares.mul_ratio_truncate(self.tokens_dec()?, self.delegator_shares)
    }

    /// `delegator_shares * amount / tokens`, rounded half up.
    pub fn shares_from_tokens(&self, amount: u128) -> Result<Dec> {
        if self.tokens == 0 {
            return Err(PoolstakeError::InsufficientShares);
        }
        self.delegator_shares
            .mul_ratio(Dec::from_int(amount)?, self.tokens_dec()?)
    }

    /// `delegator_shares * amount / tokens`, floored.
    pub fn shares_from_tokens_truncated(&self, amount: u128) -> Result<Dec> {
        if self.tokens == 0 {
            return Err(PoolstakeError::InsufficientShares);
        }
        self.delegator_shares
            .mul_ratio_truncate(Dec::from_int(amount)?, self.tokens_dec()?)
    }

    /// Adds delegated tokens and returns the issued shares.
    ///
    /// The first delegation into a share-less pool issues shares 1:1.
    pub fn add_tokens_from_del(&mut self, amount: u128) -> Result<Dec> {
        let issued = if self.delegator_shares.is_zero() {
            Dec::from_int(amount)?
        } else {
            self.shares_from_tokens_truncated(amount)?
        };
        let tokens = self.tokens.checked_add(amount).ok_or_else(|| {
            PoolstakeError::BoundedValueExceeded("pool token overflow".into())
        })?;
        let shares = self.delegator_shares.checked_add(issued)?;
        self.tokens = tokens;
        self.delegator_shares = shares;
        Ok(issued)
    }

    /// Removes shares and returns the tokens they were worth (floored).
    ///
    /// Removing the last shares releases every remaining token, so rounding dust never
    /// stays behind in a share-less pool.
    pub fn remove_del_shares(&mut self, shares: Dec) -> Result<u128> {
        let remaining = self.delegator_shares.checked_sub(shares).ok_or_else(|| {
            fatal(
                InvariantId::Accounting,
                format!("pool {} shares would go negative", self.operator),
            )
        })?;
        let issued = if remaining.is_zero() {
            self.tokens
        } else {
            self.tokens_from_shares_truncated(shares)?.truncate_int()
        };
        let tokens = self.tokens.checked_sub(issued).ok_or_else(|| {
            fatal(
                InvariantId::Accounting,
                format!("pool {} tokens would go negative", self.operator),
            )
        })?;
        self.tokens = tokens;
        self.delegator_shares = remaining;
        Ok(issued)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub operator: Address,
    pub shares: Dec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegationEntry {
    pub creation_height: u64,
    /// Unix seconds.
    pub completion_time: u64,
    pub balance: u128,
}

impl UnbondingDelegationEntry {
    pub fn is_mature(&self, now: u64) -> bool {
        self.completion_time <= now
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: Address,
    pub operator: Address,
    pub entries: Vec<UnbondingDelegationEntry>,
}

impl UnbondingDelegation {
    pub fn new(delegator: Address, operator: Address) -> UnbondingDelegation {
        UnbondingDelegation {
            delegator,
            operator,
            entries: Vec::new(),
        }
    }

    pub fn add_entry(&mut self, creation_height: u64, completion_time: u64, balance: u128) {
        self.entries.push(UnbondingDelegationEntry {
            creation_height,
            completion_time,
            balance,
        });
    }
}

/// `(delegator, operator)` reference stored in the delegator maturity queue.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DvPair {
    pub delegator: Address,
    pub operator: Address,
}

/// Cumulative reward ratio at the end of a period.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRewards {
    pub cumulative_reward_ratio: DecCoins,
    pub reference_count: u8,
}

/// Rewards accumulated in the still-open period.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRewards {
    pub rewards: DecCoins,
    pub period: u64,
}

/// Snapshot taken when a delegation's shares settle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorStartingInfo {
    pub previous_period: u64,
    pub stake: Dec,
    pub height: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePool {
    pub community_pool: DecCoins,
}

/// Block header plus the bonded pool set, recorded at begin-block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalInfo {
    pub height: u64,
    pub time: u64,
    pub pools: Vec<StakePool>,
}
