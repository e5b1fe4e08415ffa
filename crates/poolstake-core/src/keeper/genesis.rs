//! Genesis import and export.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::address::Address;
use crate::bank::{module_address, TokenTransfer, BONDED_POOL, DISTRIBUTION, NOT_BONDED_POOL};
use crate::coins::{Coins, DecCoins};
use crate::context::Context;
use crate::keys;
use crate::params::Params;
use crate::types::{
    CurrentRewards, Delegation, DelegatorStartingInfo, FeePool, HistoricalRewards, StakePool,
    UnbondingDelegation,
};
use crate::{PoolstakeError, Result};

use super::{prefix_json, Keeper};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawAddressRecord {
    pub delegator: Address,
    pub withdraw_address: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingRewardsRecord {
    pub operator: Address,
    pub outstanding_rewards: DecCoins,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatedCommissionRecord {
    pub operator: Address,
    pub accumulated: DecCoins,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRewardsRecord {
    pub operator: Address,
    pub period: u64,
    pub rewards: HistoricalRewards,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRewardsRecord {
    pub operator: Address,
    pub rewards: CurrentRewards,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingInfoRecord {
    pub delegator: Address,
    pub operator: Address,
    pub starting_info: DelegatorStartingInfo,
}

/// Spendable balance of a non-module account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub address: Address,
    pub coins: Coins,
}

/// Full engine snapshot.
///
/// `exported` marks a snapshot taken from a running engine: its reward ledger is imported
/// verbatim. A hand-written genesis (`exported = false`) lists pools and delegations only,
/// and the reward ledger is initialized for them on import.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    pub params: Params,
    pub fee_pool: FeePool,
    pub pools: Vec<StakePool>,
    pub delegations: Vec<Delegation>,
    pub unbonding_delegations: Vec<UnbondingDelegation>,
    pub withdraw_addresses: Vec<WithdrawAddressRecord>,
    pub outstanding_rewards: Vec<OutstandingRewardsRecord>,
    pub accumulated_commissions: Vec<AccumulatedCommissionRecord>,
    pub historical_rewards: Vec<HistoricalRewardsRecord>,
    pub current_rewards: Vec<CurrentRewardsRecord>,
    pub starting_infos: Vec<StartingInfoRecord>,
    pub balances: Vec<AccountBalance>,
    pub exported: bool,
}

fn invalid(msg: impl Into<String>) -> PoolstakeError {
    PoolstakeError::InvalidGenesis(msg.into())
}

/// Structural checks that need no store.
pub fn validate_genesis(state: &GenesisState) -> Result<()> {
    state
        .params
        .validate()
        .map_err(|e| invalid(format!("params: {e}")))?;

    let mut operators = BTreeSet::new();
    for pool in &state.pools {
        if !operators.insert(pool.operator) {
            return Err(invalid(format!("duplicate stake pool {}", pool.operator)));
        }
        if pool.delegator_shares.is_zero() && pool.tokens > 0 {
            return Err(invalid(format!(
                "stake pool {} holds tokens without delegator shares",
                pool.operator
            )));
        }
        if pool.min_self_delegation == 0 {
            return Err(invalid(format!(
                "stake pool {} has zero minimum self delegation",
                pool.operator
            )));
        }
        pool.description
            .ensure_length()
            .map_err(|e| invalid(e.to_string()))?;
    }

    let mut pairs = BTreeSet::new();
    for d in &state.delegations {
        if !operators.contains(&d.operator) {
            return Err(invalid(format!("delegation to unknown pool {}", d.operator)));
        }
        if d.shares.is_zero() {
            return Err(invalid(format!(
                "delegation ({}, {}) has zero shares",
                d.delegator, d.operator
            )));
        }
        if !pairs.insert((d.delegator, d.operator)) {
            return Err(invalid(format!(
                "duplicate delegation ({}, {})",
                d.delegator, d.operator
            )));
        }
    }

    for ubd in &state.unbonding_delegations {
        if ubd.entries.is_empty() {
            return Err(invalid(format!(
                "unbonding delegation ({}, {}) has no entries",
                ubd.delegator, ubd.operator
            )));
        }
    }

    let modules: Vec<Address> = [BONDED_POOL, NOT_BONDED_POOL, DISTRIBUTION]
        .iter()
        .map(|m| module_address(m))
        .collect();
    for b in &state.balances {
        if b.coins.is_zero() {
            return Err(invalid(format!("account {} has an empty balance", b.address)));
        }
        if modules.contains(&b.address) {
            return Err(invalid(format!(
                "module account {} balance is derived, not imported",
                b.address
            )));
        }
    }
    Ok(())
}

impl<B: TokenTransfer> Keeper<B> {
    /// Imports `state` atomically.
    pub fn init_genesis(&self, ctx: &mut Context<'_>, state: &GenesisState) -> Result<()> {
        validate_genesis(state)?;
        ctx.cached(|c| self.import(c, state))
    }

    fn import(&self, ctx: &mut Context<'_>, state: &GenesisState) -> Result<()> {
        self.set_params(ctx, &state.params)?;
        self.set_fee_pool(ctx, &state.fee_pool)?;
        let denom = state.params.bond_denom.clone();

        let mut bonded: u128 = 0;
        let mut not_bonded: u128 = 0;
        for pool in &state.pools {
            self.set_pool(ctx, pool)?;
            if !state.exported {
                self.after_pool_created(ctx, &pool.operator)?;
            }
            if pool.is_unbonding() {
                self.insert_pool_queue(ctx, pool)?;
            }
            let slot = if pool.is_bonded() {
                &mut bonded
            } else {
                &mut not_bonded
            };
            *slot = slot
                .checked_add(pool.tokens)
                .ok_or_else(|| invalid("pool tokens overflow"))?;
        }

        for d in &state.delegations {
            if !state.exported {
                self.before_delegation_created(ctx, &d.operator)?;
            }
            self.set_delegation(ctx, d)?;
            if !state.exported {
                self.after_delegation_modified(ctx, &d.delegator, &d.operator)?;
            }
        }

        for ubd in &state.unbonding_delegations {
            self.set_unbonding_delegation(ctx, ubd)?;
            for entry in &ubd.entries {
                self.insert_ubd_queue(ctx, ubd, entry.completion_time)?;
                not_bonded = not_bonded
                    .checked_add(entry.balance)
                    .ok_or_else(|| invalid("unbonding balance overflow"))?;
            }
        }

        for w in &state.withdraw_addresses {
            self.set_withdraw_address(ctx, &w.delegator, &w.withdraw_address)?;
        }

        let mut held = state.fee_pool.community_pool.clone();
        for r in &state.outstanding_rewards {
            self.set_outstanding_rewards(ctx, &r.operator, &r.outstanding_rewards)?;
            held = held.add(&r.outstanding_rewards)?;
        }
        for r in &state.accumulated_commissions {
            self.set_accumulated_commission(ctx, &r.operator, &r.accumulated)?;
        }
        for r in &state.historical_rewards {
            self.set_historical_rewards(ctx, &r.operator, r.period, &r.rewards)?;
        }
        for r in &state.current_rewards {
            self.set_current_rewards(ctx, &r.operator, &r.rewards)?;
        }
        for r in &state.starting_infos {
            self.set_starting_info(ctx, &r.operator, &r.delegator, &r.starting_info)?;
        }

        let bank = &self.bank;
        bank.set_balances(
            ctx,
            &module_address(BONDED_POOL),
            &Coins::single(denom.clone(), bonded),
        )?;
        bank.set_balances(
            ctx,
            &module_address(NOT_BONDED_POOL),
            &Coins::single(denom, not_bonded),
        )?;
        let (distribution, _) = held.truncate_decimal();
        bank.set_balances(ctx, &module_address(DISTRIBUTION), &distribution)?;
        for b in &state.balances {
            bank.set_balances(ctx, &b.address, &b.coins)?;
        }

        info!(
            pools = state.pools.len(),
            delegations = state.delegations.len(),
            exported = state.exported,
            "genesis imported"
        );
        Ok(())
    }

    pub fn export_genesis(&self, ctx: &Context<'_>) -> Result<GenesisState> {
        let modules: Vec<Address> = [BONDED_POOL, NOT_BONDED_POOL, DISTRIBUTION]
            .iter()
            .map(|m| module_address(m))
            .collect();

        let outstanding_rewards = self
            .outstanding_operators(ctx)?
            .into_iter()
            .map(|operator| {
                Ok(OutstandingRewardsRecord {
                    operator,
                    outstanding_rewards: self.outstanding_rewards(ctx, &operator)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let accumulated_commissions = prefix_json::<DecCoins>(ctx, &[keys::COMMISSION_PREFIX])?
            .into_iter()
            .map(|(k, accumulated)| {
                Ok(AccumulatedCommissionRecord {
                    operator: keys::address_at(&k, 1)?,
                    accumulated,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let current_rewards = prefix_json::<CurrentRewards>(ctx, &[keys::CURRENT_REWARDS_PREFIX])?
            .into_iter()
            .map(|(k, rewards)| {
                Ok(CurrentRewardsRecord {
                    operator: keys::address_at(&k, 1)?,
                    rewards,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GenesisState {
            params: self.params(ctx)?,
            fee_pool: self.fee_pool(ctx)?,
            pools: self.all_pools(ctx)?,
            delegations: self.all_delegations(ctx)?,
            unbonding_delegations: self.all_unbonding_delegations(ctx)?,
            withdraw_addresses: self
                .all_withdraw_addresses(ctx)?
                .into_iter()
                .map(|(delegator, withdraw_address)| WithdrawAddressRecord {
                    delegator,
                    withdraw_address,
                })
                .collect(),
            outstanding_rewards,
            accumulated_commissions,
            historical_rewards: self
                .all_historical_rewards(ctx)?
                .into_iter()
                .map(|(operator, period, rewards)| HistoricalRewardsRecord {
                    operator,
                    period,
                    rewards,
                })
                .collect(),
            current_rewards,
            starting_infos: self
                .all_starting_infos(ctx)?
                .into_iter()
                .map(|(operator, delegator, starting_info)| StartingInfoRecord {
                    delegator,
                    operator,
                    starting_info,
                })
                .collect(),
            balances: self
                .bank
                .accounts(ctx)?
                .into_iter()
                .filter(|(address, _)| !modules.contains(address))
                .map(|(address, coins)| AccountBalance { address, coins })
                .collect(),
            exported: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::context::BlockHeader;
    use crate::dec::Dec;
    use crate::store::MemStore;
    use crate::types::{Description, PoolStatus};

    fn fresh_pool(label: &str, tokens: u128) -> StakePool {
        let mut pool = StakePool::new(addr(label), Description::new(label));
        pool.tokens = tokens;
        pool.delegator_shares = Dec::from_int(tokens).unwrap();
        pool
    }

    #[test]
    fn hand_written_genesis_initializes_rewards() {
        let state = GenesisState {
            params: test_params(),
            pools: vec![fresh_pool("a", 100)],
            delegations: vec![Delegation {
                delegator: addr("a"),
                operator: addr("a"),
                shares: Dec::from_int(100).unwrap(),
            }],
            balances: vec![AccountBalance {
                address: addr("b"),
                coins: Coins::single("stake", 7),
            }],
            ..GenesisState::default()
        };

        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = Keeper::default();
        k.init_genesis(&mut ctx, &state).unwrap();

        assert!(k.get_starting_info(&ctx, &addr("a"), &addr("a")).unwrap().is_some());
        assert_eq!(
            k.bank().module_balance(&ctx, NOT_BONDED_POOL, "stake").unwrap(),
            100
        );
        assert_eq!(k.bank().balance(&ctx, &addr("b"), "stake").unwrap(), 7);
        k.assert_invariants(&mut ctx).unwrap();
    }

    #[test]
    fn export_then_import_round_trips() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = setup(&mut ctx);
        let (a, b, w) = (addr("a"), addr("b"), addr("w"));
        create_pool(&k, &mut ctx, &a, 100);
        fund(&k, &mut ctx, &b, 50);
        k.delegate(&mut ctx, &b, &a, 50, PoolStatus::Unbonded, true)
            .unwrap();
        k.set_withdraw_address(&mut ctx, &b, &w).unwrap();
        k.end_block(&mut ctx).unwrap();
        advance(&mut ctx, 1, 5);
        k.bank()
            .mint(&mut ctx, DISTRIBUTION, &Coins::single("stake", 31))
            .unwrap();
        let pool = k.get_pool(&ctx, &a).unwrap().unwrap();
        k.allocate_tokens_to_pool(
            &mut ctx,
            &pool,
            &DecCoins::from_coins(&Coins::single("stake", 31)).unwrap(),
        )
        .unwrap();
        k.undelegate(&mut ctx, &b, &a, Dec::from_int(20).unwrap())
            .unwrap();

        let exported = k.export_genesis(&ctx).unwrap();
        let json = serde_json::to_string(&exported).unwrap();
        let decoded: GenesisState = serde_json::from_str(&json).unwrap();

        let mut store2 = MemStore::new();
        let mut ctx2 = Context::new(&mut store2, ctx.header());
        let k2 = Keeper::default();
        k2.init_genesis(&mut ctx2, &decoded).unwrap();
        assert_eq!(k2.export_genesis(&ctx2).unwrap(), exported);
        k2.assert_invariants(&mut ctx2).unwrap();
        assert_eq!(k2.ubd_queue_slice(&ctx2, 1_005 + 21 * DAY).unwrap().len(), 1);
    }

    #[test]
    fn rejects_malformed_state() {
        let mut state = GenesisState {
            params: test_params(),
            pools: vec![fresh_pool("a", 100), fresh_pool("a", 5)],
            ..GenesisState::default()
        };
        assert!(matches!(
            validate_genesis(&state),
            Err(PoolstakeError::InvalidGenesis(_))
        ));

        state.pools.pop();
        state.delegations.push(Delegation {
            delegator: addr("b"),
            operator: addr("nowhere"),
            shares: Dec::ONE,
        });
        assert!(validate_genesis(&state).is_err());

        state.delegations.clear();
        state.balances.push(AccountBalance {
            address: module_address(BONDED_POOL),
            coins: Coins::single("stake", 1),
        });
        assert!(validate_genesis(&state).is_err());

        state.balances.clear();
        assert!(validate_genesis(&state).is_ok());
    }

    #[test]
    fn rejects_zero_balances() {
        let mut state = GenesisState {
            params: test_params(),
            ..GenesisState::default()
        };
        state.balances.push(AccountBalance {
            address: addr("b"),
            coins: Coins::new(),
        });
        assert!(matches!(
            validate_genesis(&state),
            Err(PoolstakeError::InvalidGenesis(_))
        ));

        let json = format!(
            r#"{{"balances":[{{"address":"{}","coins":{{"stake":0}}}}]}}"#,
            addr("b")
        );
        assert!(serde_json::from_str::<GenesisState>(&json).is_err());

        let json = r#"{"fee_pool":{"community_pool":{"stake":"0.000000000000000000"}}}"#;
        assert!(serde_json::from_str::<GenesisState>(json).is_err());
    }
}
