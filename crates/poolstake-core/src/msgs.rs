//! Commands accepted by the engine.
//!
//! Every command is checked structurally by [`Msg::validate_basic`] before the handler touches
//! the store. Checks that need ledger state (pool existence, balances, denomination against
//! the bond denom) happen in the handler.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::coins::{validate_denom, Coin, Coins};
use crate::types::Description;
use crate::{PoolstakeError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    /// Registers a pool and self-delegates `value` to it.
    CreatePool {
        delegator: Address,
        operator: Address,
        description: Description,
        min_self_delegation: u128,
        value: Coin,
    },
    /// Updates the description, optionally raising the minimum self delegation.
    EditPool {
        operator: Address,
        description: Description,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_self_delegation: Option<u128>,
    },
    Delegate {
        delegator: Address,
        operator: Address,
        amount: Coin,
    },
    /// Undelegates a token amount; it is converted to shares at the current rate.
    Undelegate {
        delegator: Address,
        operator: Address,
        amount: Coin,
    },
    SetWithdrawAddress {
        delegator: Address,
        withdraw_address: Address,
    },
    WithdrawDelegatorReward {
        delegator: Address,
        operator: Address,
    },
    WithdrawPoolCommission {
        operator: Address,
    },
    FundCommunityPool {
        depositor: Address,
        amount: Coins,
    },
}

fn require(addr: &Address, err: PoolstakeError) -> Result<()> {
    if addr.is_empty() {
        Err(err)
    } else {
        Ok(())
    }
}

fn require_amount(coin: &Coin) -> Result<()> {
    coin.validate()?;
    if !coin.is_positive() {
        return Err(PoolstakeError::BadDelegationAmount);
    }
    Ok(())
}

impl Msg {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::CreatePool { .. } => "create_pool",
            Msg::EditPool { .. } => "edit_pool",
            Msg::Delegate { .. } => "delegate",
            Msg::Undelegate { .. } => "undelegate",
            Msg::SetWithdrawAddress { .. } => "set_withdraw_address",
            Msg::WithdrawDelegatorReward { .. } => "withdraw_delegator_reward",
            Msg::WithdrawPoolCommission { .. } => "withdraw_pool_commission",
            Msg::FundCommunityPool { .. } => "fund_community_pool",
        }
    }

    /// The account that authorizes the command.
    pub fn signer(&self) -> Address {
        match self {
            Msg::CreatePool { delegator, .. }
            | Msg::Delegate { delegator, .. }
            | Msg::Undelegate { delegator, .. }
            | Msg::SetWithdrawAddress { delegator, .. }
            | Msg::WithdrawDelegatorReward { delegator, .. } => *delegator,
            Msg::EditPool { operator, .. } | Msg::WithdrawPoolCommission { operator } => *operator,
            Msg::FundCommunityPool { depositor, .. } => *depositor,
        }
    }

    /// Stateless checks.
    pub fn validate_basic(&self) -> Result<()> {
        match self {
            Msg::CreatePool {
                delegator,
                operator,
                description,
                min_self_delegation,
                value,
            } => {
                require(delegator, PoolstakeError::EmptyDelegatorAddr)?;
                require(operator, PoolstakeError::EmptyOperatorAddr)?;
                if delegator != operator {
                    return Err(PoolstakeError::BadOperatorAddr);
                }
                require_amount(value)?;
                if description.is_empty() {
                    return Err(PoolstakeError::InvalidDescription("empty description".into()));
                }
                description.ensure_length()?;
                if *min_self_delegation == 0 {
                    return Err(PoolstakeError::MinSelfDelegationInvalid);
                }
                if value.amount < *min_self_delegation {
                    return Err(PoolstakeError::SelfDelegationBelowMinimum);
                }
                Ok(())
            }
            Msg::EditPool {
                operator,
                description,
                min_self_delegation,
            } => {
                require(operator, PoolstakeError::EmptyOperatorAddr)?;
                if description.is_empty() {
                    return Err(PoolstakeError::InvalidDescription("empty description".into()));
                }
                if *min_self_delegation == Some(0) {
                    return Err(PoolstakeError::MinSelfDelegationInvalid);
                }
                Ok(())
            }
            Msg::Delegate {
                delegator,
                operator,
                amount,
            }
            | Msg::Undelegate {
                delegator,
                operator,
                amount,
            } => {
                require(delegator, PoolstakeError::EmptyDelegatorAddr)?;
                require(operator, PoolstakeError::EmptyOperatorAddr)?;
                require_amount(amount)
            }
            Msg::SetWithdrawAddress {
                delegator,
                withdraw_address,
            } => {
                require(delegator, PoolstakeError::EmptyDelegatorAddr)?;
                require(withdraw_address, PoolstakeError::EmptyWithdrawAddr)
            }
            Msg::WithdrawDelegatorReward {
                delegator,
                operator,
            } => {
                require(delegator, PoolstakeError::EmptyDelegatorAddr)?;
                require(operator, PoolstakeError::EmptyOperatorAddr)
            }
            Msg::WithdrawPoolCommission { operator } => {
                require(operator, PoolstakeError::EmptyOperatorAddr)
            }
            Msg::FundCommunityPool { depositor, amount } => {
                if depositor.is_empty() {
                    return Err(PoolstakeError::InvalidInput("empty depositor address".into()));
                }
                if amount.is_zero() {
                    return Err(PoolstakeError::InvalidInput(
                        "community pool deposit must be positive".into(),
                    ));
                }
                for (denom, value) in amount.iter() {
                    validate_denom(denom)?;
                    if value == 0 {
                        return Err(PoolstakeError::InvalidInput(format!(
                            "zero deposit amount for {denom}"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}
