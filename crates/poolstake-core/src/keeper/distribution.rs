//! Reward distribution (F1).
//!
//! Each pool advances through numbered periods. Ending a period folds the period's shared
//! rewards, divided by the pool's tokens, into a cumulative per-token ratio stored under
//! that period number. A delegation remembers the period it started after and its stake,
//! so its rewards are `stake * (ratio[end] - ratio[start])` regardless of how many other
//! delegations came and went in between.
//!
//! Historical records are reference counted: the pool's own chain holds one reference on
//! its latest ended period and every delegation holds one on its starting period. A record
//! is deleted when its count reaches zero, so the count never exceeds two.

use tracing::{debug, warn};

use crate::address::Address;
use crate::bank::{TokenTransfer, DISTRIBUTION};
use crate::coins::{Coins, DecCoins};
use crate::context::Context;
use crate::dec::Dec;
use crate::invariants::{fatal, InvariantId};
use crate::keys;
use crate::types::{
    CurrentRewards, Delegation, DelegatorStartingInfo, HistoricalRewards, StakePool,
};
use crate::{PoolstakeError, Result};

use super::{get_json, prefix_json, set_json, Keeper};

const MAX_REFERENCE_COUNT: u8 = 2;

impl<B: TokenTransfer> Keeper<B> {
    // Records.

    pub fn get_historical_rewards(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
        period: u64,
    ) -> Result<Option<HistoricalRewards>> {
        get_json(ctx, &keys::historical_rewards_key(operator, period))
    }

    pub fn set_historical_rewards(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        period: u64,
        rewards: &HistoricalRewards,
    ) -> Result<()> {
        set_json(ctx, keys::historical_rewards_key(operator, period), rewards)
    }

    /// Every historical record as `(operator, period, record)`.
    pub fn all_historical_rewards(
        &self,
        ctx: &Context<'_>,
    ) -> Result<Vec<(Address, u64, HistoricalRewards)>> {
        prefix_json::<HistoricalRewards>(ctx, &[keys::HISTORICAL_REWARDS_PREFIX])?
            .into_iter()
            .map(|(k, r)| {
                let (operator, period) = keys::parse_historical_rewards_key(&k)?;
                Ok((operator, period, r))
            })
            .collect()
    }

    pub fn get_current_rewards(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
    ) -> Result<Option<CurrentRewards>> {
        get_json(ctx, &keys::current_rewards_key(operator))
    }

    pub fn set_current_rewards(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        rewards: &CurrentRewards,
    ) -> Result<()> {
        set_json(ctx, keys::current_rewards_key(operator), rewards)
    }

    pub fn outstanding_rewards(&self, ctx: &Context<'_>, operator: &Address) -> Result<DecCoins> {
        Ok(get_json(ctx, &keys::outstanding_key(operator))?.unwrap_or_default())
    }

    pub fn set_outstanding_rewards(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        rewards: &DecCoins,
    ) -> Result<()> {
        set_json(ctx, keys::outstanding_key(operator), rewards)
    }

    pub fn accumulated_commission(&self, ctx: &Context<'_>, operator: &Address) -> Result<DecCoins> {
        Ok(get_json(ctx, &keys::commission_key(operator))?.unwrap_or_default())
    }

    pub fn set_accumulated_commission(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        commission: &DecCoins,
    ) -> Result<()> {
        set_json(ctx, keys::commission_key(operator), commission)
    }

    pub fn get_starting_info(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
        delegator: &Address,
    ) -> Result<Option<DelegatorStartingInfo>> {
        get_json(ctx, &keys::starting_info_key(operator, delegator))
    }

    pub fn set_starting_info(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        delegator: &Address,
        info: &DelegatorStartingInfo,
    ) -> Result<()> {
        set_json(ctx, keys::starting_info_key(operator, delegator), info)
    }

    /// Every starting info as `(operator, delegator, info)`.
    pub fn all_starting_infos(
        &self,
        ctx: &Context<'_>,
    ) -> Result<Vec<(Address, Address, DelegatorStartingInfo)>> {
        prefix_json::<DelegatorStartingInfo>(ctx, &[keys::STARTING_INFO_PREFIX])?
            .into_iter()
            .map(|(k, info)| {
                let operator = keys::address_at(&k, 1)?;
                let delegator = keys::address_at(&k, 1 + Address::LEN)?;
                Ok((operator, delegator, info))
            })
            .collect()
    }

    /// Operators with an outstanding-rewards record.
    pub fn outstanding_operators(&self, ctx: &Context<'_>) -> Result<Vec<Address>> {
        ctx.store()
            .prefix(&[keys::OUTSTANDING_PREFIX])
            .into_iter()
            .map(|(k, _)| keys::address_at(&k, 1))
            .collect()
    }

    /// Where `delegator`'s rewards are paid; defaults to the delegator itself.
    pub fn withdraw_address(&self, ctx: &Context<'_>, delegator: &Address) -> Result<Address> {
        Ok(get_json(ctx, &keys::withdraw_addr_key(delegator))?.unwrap_or(*delegator))
    }

    pub fn set_withdraw_address(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        withdraw: &Address,
    ) -> Result<()> {
        if self.bank.is_blocked(withdraw) {
            return Err(PoolstakeError::BlockedWithdrawAddr(*withdraw));
        }
        if withdraw == delegator {
            ctx.store_mut().delete(&keys::withdraw_addr_key(delegator));
            return Ok(());
        }
        set_json(ctx, keys::withdraw_addr_key(delegator), withdraw)
    }

    /// Every non-default withdraw address as `(delegator, withdraw)`.
    pub fn all_withdraw_addresses(&self, ctx: &Context<'_>) -> Result<Vec<(Address, Address)>> {
        prefix_json::<Address>(ctx, &[keys::WITHDRAW_ADDR_PREFIX])?
            .into_iter()
            .map(|(k, w)| Ok((keys::address_at(&k, 1)?, w)))
            .collect()
    }

    // Periods and reference counts.

    /// Creates the reward records of a new pool.
    pub fn initialize_pool(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<()> {
        self.set_historical_rewards(
            ctx,
            operator,
            0,
            &HistoricalRewards {
                cumulative_reward_ratio: DecCoins::new(),
                reference_count: 1,
            },
        )?;
        self.set_current_rewards(
            ctx,
            operator,
            &CurrentRewards {
                rewards: DecCoins::new(),
                period: 1,
            },
        )?;
        self.set_accumulated_commission(ctx, operator, &DecCoins::new())?;
        self.set_outstanding_rewards(ctx, operator, &DecCoins::new())
    }

    /// Ends the pool's current period and returns its number.
    pub fn increment_pool_period(&self, ctx: &mut Context<'_>, pool: &StakePool) -> Result<u64> {
        let operator = &pool.operator;
        let current = self.get_current_rewards(ctx, operator)?.ok_or_else(|| {
            fatal(
                InvariantId::MissingRecord,
                format!("current rewards missing for {operator}"),
            )
        })?;

        let ratio_delta = if pool.tokens == 0 {
            // Nobody can claim these; they go to the community pool.
            let outstanding = self.outstanding_rewards(ctx, operator)?;
            let rest = outstanding.checked_sub(&current.rewards).ok_or_else(|| {
                fatal(
                    InvariantId::NonNegativeOutstanding,
                    format!("outstanding rewards of {operator} would go negative"),
                )
            })?;
            self.add_to_community_pool(ctx, &current.rewards)?;
            self.set_outstanding_rewards(ctx, operator, &rest)?;
            DecCoins::new()
        } else {
            current.rewards.quo_dec_truncate(pool.tokens_dec()?)?
        };

        let previous = current.period - 1;
        let historical = self
            .get_historical_rewards(ctx, operator, previous)?
            .ok_or_else(|| {
                fatal(
                    InvariantId::MissingRecord,
                    format!("historical rewards {operator}/{previous} missing"),
                )
            })?;
        self.decrement_reference_count(ctx, operator, previous)?;

        self.set_historical_rewards(
            ctx,
            operator,
            current.period,
            &HistoricalRewards {
                cumulative_reward_ratio: historical.cumulative_reward_ratio.add(&ratio_delta)?,
                reference_count: 1,
            },
        )?;
        self.set_current_rewards(
            ctx,
            operator,
            &CurrentRewards {
                rewards: DecCoins::new(),
                period: current.period + 1,
            },
        )?;
        Ok(current.period)
    }

    fn increment_reference_count(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        period: u64,
    ) -> Result<()> {
        let mut historical = self
            .get_historical_rewards(ctx, operator, period)?
            .ok_or_else(|| {
                fatal(
                    InvariantId::MissingRecord,
                    format!("historical rewards {operator}/{period} missing"),
                )
            })?;
        if historical.reference_count >= MAX_REFERENCE_COUNT {
            return Err(fatal(
                InvariantId::ReferenceCount,
                format!("reference count of {operator}/{period} would exceed {MAX_REFERENCE_COUNT}"),
            ));
        }
        historical.reference_count += 1;
        self.set_historical_rewards(ctx, operator, period, &historical)
    }

    fn decrement_reference_count(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        period: u64,
    ) -> Result<()> {
        let key = keys::historical_rewards_key(operator, period);
        let mut historical: HistoricalRewards = get_json(ctx, &key)?.ok_or_else(|| {
            fatal(
                InvariantId::MissingRecord,
                format!("historical rewards {operator}/{period} missing"),
            )
        })?;
        if historical.reference_count == 0 {
            return Err(fatal(
                InvariantId::ReferenceCount,
                format!("reference count of {operator}/{period} would go negative"),
            ));
        }
        historical.reference_count -= 1;
        if historical.reference_count == 0 {
            ctx.store_mut().delete(&key);
            Ok(())
        } else {
            set_json(ctx, key, &historical)
        }
    }

    /// Snapshots a delegation's stake at the pool's latest ended period.
    pub fn initialize_delegation(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        delegator: &Address,
    ) -> Result<()> {
        let pool = self.must_get_pool(ctx, operator)?;
        let delegation = self.get_delegation(ctx, delegator, operator)?.ok_or_else(|| {
            fatal(
                InvariantId::MissingRecord,
                format!("delegation ({delegator}, {operator}) missing"),
            )
        })?;
        let current = self.get_current_rewards(ctx, operator)?.ok_or_else(|| {
            fatal(
                InvariantId::MissingRecord,
                format!("current rewards missing for {operator}"),
            )
        })?;
        let previous_period = current.period - 1;
        self.increment_reference_count(ctx, operator, previous_period)?;

        let stake = pool.tokens_from_shares_truncated(delegation.shares)?;
        self.set_starting_info(
            ctx,
            operator,
            delegator,
            &DelegatorStartingInfo {
                previous_period,
                stake,
                height: ctx.height(),
            },
        )
    }

    // Reward calculation.

    fn calculate_rewards_between(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
        starting_period: u64,
        ending_period: u64,
        stake: Dec,
    ) -> Result<DecCoins> {
        if starting_period > ending_period {
            return Err(fatal(
                InvariantId::NegativeRewards,
                format!("starting period {starting_period} after ending period {ending_period}"),
            ));
        }
        let ratio = |period: u64| -> Result<DecCoins> {
            Ok(self
                .get_historical_rewards(ctx, operator, period)?
                .ok_or_else(|| {
                    fatal(
                        InvariantId::MissingRecord,
                        format!("historical rewards {operator}/{period} missing"),
                    )
                })?
                .cumulative_reward_ratio)
        };
        let starting = ratio(starting_period)?;
        let ending = ratio(ending_period)?;
        let difference = ending.checked_sub(&starting).ok_or_else(|| {
            fatal(
                InvariantId::NegativeRewards,
                format!("cumulative reward ratio of {operator} decreased"),
            )
        })?;
        difference.mul_dec_truncate(stake)
    }

    /// Rewards accrued by `delegation` up to `ending_period`.
    pub fn calculate_delegation_rewards(
        &self,
        ctx: &Context<'_>,
        pool: &StakePool,
        delegation: &Delegation,
        ending_period: u64,
    ) -> Result<DecCoins> {
        let info = self
            .get_starting_info(ctx, &pool.operator, &delegation.delegator)?
            .ok_or(PoolstakeError::EmptyDelegationDistInfo)?;
        if info.height == ctx.height() {
            return Ok(DecCoins::new());
        }

        let mut stake = info.stake;
        let current_stake = pool.tokens_from_shares(delegation.shares)?;
        if stake > current_stake {
            // Rounding across several share changes may drift by a few units.
            let margin = Dec::SMALLEST.mul_int(3)?;
            if stake <= current_stake.checked_add(margin)? {
                debug!(%stake, %current_stake, "clamping drifted delegation stake");
                stake = current_stake;
            } else {
                return Err(fatal(
                    InvariantId::StakeDrift,
                    format!(
                        "delegation ({}, {}) stake {stake} exceeds current stake {current_stake}",
                        delegation.delegator, pool.operator
                    ),
                ));
            }
        }

        self.calculate_rewards_between(
            ctx,
            &pool.operator,
            info.previous_period,
            ending_period,
            stake,
        )
    }

    /// Pays accrued rewards and drops the starting info. The caller re-initializes the
    /// delegation if it survives.
    fn withdraw_rewards_inner(
        &self,
        ctx: &mut Context<'_>,
        pool: &StakePool,
        delegation: &Delegation,
    ) -> Result<Coins> {
        let (operator, delegator) = (&pool.operator, &delegation.delegator);
        let info = self
            .get_starting_info(ctx, operator, delegator)?
            .ok_or(PoolstakeError::EmptyDelegationDistInfo)?;

        let ending_period = self.increment_pool_period(ctx, pool)?;
        let computed = self.calculate_delegation_rewards(ctx, pool, delegation, ending_period)?;
        let outstanding = self.outstanding_rewards(ctx, operator)?;

        let rewards = computed.intersect(&outstanding);
        if rewards != computed {
            warn!(
                %delegator,
                %operator,
                computed = %computed,
                outstanding = %outstanding,
                "rounding error withdrawing rewards"
            );
        }

        let (coins, remainder) = rewards.truncate_decimal();
        if !coins.is_zero() {
            let to = self.withdraw_address(ctx, delegator)?;
            self.bank
                .send_module_to_account(ctx, DISTRIBUTION, &to, &coins)?;
        }

        let rest = outstanding.checked_sub(&rewards).ok_or_else(|| {
            fatal(
                InvariantId::NonNegativeOutstanding,
                format!("outstanding rewards of {operator} would go negative"),
            )
        })?;
        self.set_outstanding_rewards(ctx, operator, &rest)?;
        self.add_to_community_pool(ctx, &remainder)?;

        self.decrement_reference_count(ctx, operator, info.previous_period)?;
        ctx.store_mut()
            .delete(&keys::starting_info_key(operator, delegator));

        debug!(%delegator, %operator, paid = %coins, "rewards withdrawn");
        Ok(coins)
    }

    /// Pays `delegator`'s accrued rewards from `operator` and starts a new accrual window.
    pub fn withdraw_delegation_rewards(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<Coins> {
        let pool = self
            .get_pool(ctx, operator)?
            .ok_or(PoolstakeError::NoPoolDistInfo(*operator))?;
        let delegation = self
            .get_delegation(ctx, delegator, operator)?
            .ok_or(PoolstakeError::EmptyDelegationDistInfo)?;

        let coins = self.withdraw_rewards_inner(ctx, &pool, &delegation)?;
        self.initialize_delegation(ctx, operator, delegator)?;
        Ok(coins)
    }

    /// Pays the integral part of the accumulated commission to the operator.
    pub fn withdraw_pool_commission(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
    ) -> Result<Coins> {
        let commission = self.accumulated_commission(ctx, operator)?;
        if commission.is_zero() {
            return Err(PoolstakeError::NoPoolCommission);
        }

        let (coins, remainder) = commission.truncate_decimal();
        self.set_accumulated_commission(ctx, operator, &remainder)?;

        let outstanding = self.outstanding_rewards(ctx, operator)?;
        let rest = outstanding
            .checked_sub(&DecCoins::from_coins(&coins)?)
            .ok_or_else(|| {
                fatal(
                    InvariantId::NonNegativeOutstanding,
                    format!("outstanding rewards of {operator} would go negative"),
                )
            })?;
        self.set_outstanding_rewards(ctx, operator, &rest)?;

        if !coins.is_zero() {
            let to = self.withdraw_address(ctx, operator)?;
            self.bank
                .send_module_to_account(ctx, DISTRIBUTION, &to, &coins)?;
        }
        debug!(%operator, paid = %coins, "commission withdrawn");
        Ok(coins)
    }

    /// Credits `tokens` (already held by the distribution account) to a pool.
    pub fn allocate_tokens_to_pool(
        &self,
        ctx: &mut Context<'_>,
        pool: &StakePool,
        tokens: &DecCoins,
    ) -> Result<()> {
        let operator = &pool.operator;
        let rate = self.params(ctx)?.commission_rate;
        let commission = tokens.mul_dec_truncate(rate)?;
        let shared = tokens.checked_sub(&commission).ok_or_else(|| {
            fatal(InvariantId::Accounting, "commission exceeds allocated tokens")
        })?;

        let accumulated = self.accumulated_commission(ctx, operator)?.add(&commission)?;
        self.set_accumulated_commission(ctx, operator, &accumulated)?;

        let mut current = self.get_current_rewards(ctx, operator)?.ok_or_else(|| {
            fatal(
                InvariantId::MissingRecord,
                format!("current rewards missing for {operator}"),
            )
        })?;
        current.rewards = current.rewards.add(&shared)?;
        self.set_current_rewards(ctx, operator, &current)?;

        let outstanding = self.outstanding_rewards(ctx, operator)?.add(tokens)?;
        self.set_outstanding_rewards(ctx, operator, &outstanding)?;
        debug!(%operator, %tokens, %commission, "tokens allocated");
        Ok(())
    }

    // Hooks called by the registry and the delegation ledger.

    pub(crate) fn after_pool_created(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<()> {
        self.initialize_pool(ctx, operator)
    }

    pub(crate) fn before_delegation_created(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
    ) -> Result<()> {
        let pool = self.must_get_pool(ctx, operator)?;
        self.increment_pool_period(ctx, &pool)?;
        Ok(())
    }

    pub(crate) fn before_delegation_shares_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<()> {
        let pool = self.must_get_pool(ctx, operator)?;
        let delegation = self.get_delegation(ctx, delegator, operator)?.ok_or_else(|| {
            fatal(
                InvariantId::MissingRecord,
                format!("delegation ({delegator}, {operator}) missing"),
            )
        })?;
        self.withdraw_rewards_inner(ctx, &pool, &delegation)?;
        Ok(())
    }

    pub(crate) fn after_delegation_modified(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<()> {
        self.initialize_delegation(ctx, operator, delegator)
    }

    /// Settles and deletes every reward record of a removed pool.
    pub(crate) fn after_pool_removed(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<()> {
        let mut outstanding = self.outstanding_rewards(ctx, operator)?;
        let commission = self.accumulated_commission(ctx, operator)?;

        if !commission.is_zero() {
            outstanding = outstanding.checked_sub(&commission).ok_or_else(|| {
                fatal(
                    InvariantId::NonNegativeOutstanding,
                    format!("commission of {operator} exceeds outstanding rewards"),
                )
            })?;
            let (coins, remainder) = commission.truncate_decimal();
            self.add_to_community_pool(ctx, &remainder)?;
            if !coins.is_zero() {
                let to = self.withdraw_address(ctx, operator)?;
                self.bank
                    .send_module_to_account(ctx, DISTRIBUTION, &to, &coins)?;
            }
        }
        self.add_to_community_pool(ctx, &outstanding)?;

        let store = ctx.store_mut();
        store.delete(&keys::outstanding_key(operator));
        store.delete(&keys::commission_key(operator));
        store.delete(&keys::current_rewards_key(operator));
        for (key, _) in store.prefix(&keys::historical_rewards_prefix(operator)) {
            store.delete(&key);
        }
        debug!(%operator, "pool reward records deleted");
        Ok(())
    }
}
