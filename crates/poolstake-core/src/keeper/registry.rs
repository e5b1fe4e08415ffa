//! Stake pool registry: pool records, the bonding state machine and the pool
//! maturity queue.

use tracing::{debug, info};

use crate::address::Address;
use crate::bank::{TokenTransfer, BONDED_POOL, NOT_BONDED_POOL};
use crate::coins::Coins;
use crate::context::Context;
use crate::invariants::{fatal, InvariantId};
use crate::keys;
use crate::types::{Description, PoolStatus, StakePool};
use crate::{PoolstakeError, Result};

use super::{get_json, prefix_json, set_json, Keeper};

impl<B: TokenTransfer> Keeper<B> {
    pub fn get_pool(&self, ctx: &Context<'_>, operator: &Address) -> Result<Option<StakePool>> {
        get_json(ctx, &keys::pool_key(operator))
    }

    /// Loads a pool the caller already knows exists.
    pub(crate) fn must_get_pool(&self, ctx: &Context<'_>, operator: &Address) -> Result<StakePool> {
        self.get_pool(ctx, operator)?.ok_or_else(|| {
            fatal(
                InvariantId::MissingRecord,
                format!("stake pool {operator} record not found"),
            )
        })
    }

    pub fn set_pool(&self, ctx: &mut Context<'_>, pool: &StakePool) -> Result<()> {
        set_json(ctx, keys::pool_key(&pool.operator), pool)
    }

    /// Every pool, ordered by operator address.
    pub fn all_pools(&self, ctx: &Context<'_>) -> Result<Vec<StakePool>> {
        Ok(prefix_json(ctx, &[keys::POOL_PREFIX])?
            .into_iter()
            .map(|(_, p)| p)
            .collect())
    }

    /// Registers a new pool and self-delegates `amount` from the operator's account.
    ///
    /// Preconditions:
    /// - `amount` is in the bond denomination (checked by the message layer).
    pub fn create_pool(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        description: Description,
        min_self_delegation: u128,
        amount: u128,
    ) -> Result<()> {
        if self.get_pool(ctx, operator)?.is_some() {
            return Err(PoolstakeError::PoolExists(*operator));
        }
        if min_self_delegation == 0 {
            return Err(PoolstakeError::MinSelfDelegationInvalid);
        }
        if amount < min_self_delegation {
            return Err(PoolstakeError::SelfDelegationBelowMinimum);
        }
        description.ensure_length()?;

        let mut pool = StakePool::new(*operator, description);
        pool.min_self_delegation = min_self_delegation;
        self.set_pool(ctx, &pool)?;
        self.after_pool_created(ctx, operator)?;

        self.delegate(ctx, operator, operator, amount, PoolStatus::Unbonded, true)?;
        info!(%operator, amount, "stake pool created");
        Ok(())
    }

    /// Updates description fields and optionally raises the minimum self-delegation.
    pub fn edit_pool(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        edit: &Description,
        min_self_delegation: Option<u128>,
    ) -> Result<()> {
        let mut pool = self
            .get_pool(ctx, operator)?
            .ok_or(PoolstakeError::PoolNotFound(*operator))?;
        pool.description = pool.description.update(edit)?;

        if let Some(min) = min_self_delegation {
            if min <= pool.min_self_delegation {
                return Err(PoolstakeError::MinSelfDelegationDecreased);
            }
            if min > pool.tokens {
                return Err(PoolstakeError::SelfDelegationBelowMinimum);
            }
            pool.min_self_delegation = min;
        }

        self.set_pool(ctx, &pool)?;
        debug!(%operator, "stake pool edited");
        Ok(())
    }

    /// Deletes a pool record.
    ///
    /// Preconditions:
    /// - the pool is `Unbonded` and holds no tokens.
    pub fn remove_pool(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<()> {
        let pool = self.must_get_pool(ctx, operator)?;
        if !pool.is_unbonded() {
            return Err(fatal(
                InvariantId::PoolRemoval,
                format!("cannot remove pool {operator} in status {:?}", pool.status),
            ));
        }
        if pool.tokens > 0 {
            return Err(fatal(
                InvariantId::PoolRemoval,
                format!("cannot remove pool {operator} holding {} tokens", pool.tokens),
            ));
        }

        ctx.store_mut().delete(&keys::pool_key(operator));
        self.after_pool_removed(ctx, operator)?;
        info!(%operator, "stake pool removed");
        Ok(())
    }

    /// `Unbonded`/`Unbonding` -> `Bonded`. Moves the pool's tokens into the bonded account.
    pub fn bond(&self, ctx: &mut Context<'_>, mut pool: StakePool) -> Result<StakePool> {
        if pool.is_bonded() {
            return Err(fatal(
                InvariantId::StateTransition,
                format!("bond: pool {} is already bonded", pool.operator),
            ));
        }
        self.delete_pool_queue_entry(ctx, &pool)?;

        pool.status = PoolStatus::Bonded;
        self.set_pool(ctx, &pool)?;
        let denom = self.bond_denom(ctx)?;
        self.bank.send_module_to_module(
            ctx,
            NOT_BONDED_POOL,
            BONDED_POOL,
            &Coins::single(denom, pool.tokens),
        )?;
        debug!(operator = %pool.operator, tokens = pool.tokens, "pool bonded");
        Ok(pool)
    }

    /// `Bonded` -> `Unbonding`. Moves the pool's tokens out of the bonded account and
    /// schedules maturity at `now + unbonding_time`.
    pub fn begin_unbonding(&self, ctx: &mut Context<'_>, mut pool: StakePool) -> Result<StakePool> {
        if !pool.is_bonded() {
            return Err(fatal(
                InvariantId::StateTransition,
                format!(
                    "begin_unbonding: pool {} is {:?}, expected bonded",
                    pool.operator, pool.status
                ),
            ));
        }
        let params = self.params(ctx)?;

        pool.status = PoolStatus::Unbonding;
        pool.unbonding_time = ctx.time().saturating_add(params.unbonding_time);
        pool.unbonding_height = ctx.height();
        self.set_pool(ctx, &pool)?;
        self.insert_pool_queue(ctx, &pool)?;
        self.bank.send_module_to_module(
            ctx,
            BONDED_POOL,
            NOT_BONDED_POOL,
            &Coins::single(params.bond_denom, pool.tokens),
        )?;
        info!(
            operator = %pool.operator,
            unbonding_time = pool.unbonding_time,
            "pool began unbonding"
        );
        Ok(pool)
    }

    /// `Unbonding` -> `Unbonded`; removes the pool when no shares remain.
    pub fn complete_pool_unbonding(
        &self,
        ctx: &mut Context<'_>,
        mut pool: StakePool,
    ) -> Result<StakePool> {
        if !pool.is_unbonding() {
            return Err(fatal(
                InvariantId::StateTransition,
                format!(
                    "complete_unbonding: pool {} is {:?}, expected unbonding",
                    pool.operator, pool.status
                ),
            ));
        }
        pool.status = PoolStatus::Unbonded;
        self.set_pool(ctx, &pool)?;
        debug!(operator = %pool.operator, "pool unbonded");

        if pool.delegator_shares.is_zero() {
            self.remove_pool(ctx, &pool.operator)?;
        }
        Ok(pool)
    }

    // Pool maturity queue.

    pub fn pool_queue_entry(
        &self,
        ctx: &Context<'_>,
        time: u64,
        height: u64,
    ) -> Result<Vec<Address>> {
        Ok(get_json(ctx, &keys::pool_queue_key(time, height))?.unwrap_or_default())
    }

    fn set_pool_queue_entry(
        &self,
        ctx: &mut Context<'_>,
        time: u64,
        height: u64,
        addrs: &[Address],
    ) -> Result<()> {
        let key = keys::pool_queue_key(time, height);
        if addrs.is_empty() {
            ctx.store_mut().delete(&key);
            Ok(())
        } else {
            set_json(ctx, key, &addrs)
        }
    }

    pub(crate) fn insert_pool_queue(&self, ctx: &mut Context<'_>, pool: &StakePool) -> Result<()> {
        let mut addrs = self.pool_queue_entry(ctx, pool.unbonding_time, pool.unbonding_height)?;
        if !addrs.contains(&pool.operator) {
            addrs.push(pool.operator);
        }
        self.set_pool_queue_entry(ctx, pool.unbonding_time, pool.unbonding_height, &addrs)
    }

    fn delete_pool_queue_entry(&self, ctx: &mut Context<'_>, pool: &StakePool) -> Result<()> {
        let mut addrs = self.pool_queue_entry(ctx, pool.unbonding_time, pool.unbonding_height)?;
        addrs.retain(|a| *a != pool.operator);
        self.set_pool_queue_entry(ctx, pool.unbonding_time, pool.unbonding_height, &addrs)
    }

    /// Completes unbonding for every queued pool with `time <= now` and `height <= height`.
    pub fn unbond_all_mature_pools(&self, ctx: &mut Context<'_>) -> Result<()> {
        let (now, height) = (ctx.time(), ctx.height());
        let end = keys::inclusive_end(&keys::pool_queue_key(now, u64::MAX));
        let entries = ctx
            .store()
            .range(&[keys::POOL_QUEUE_PREFIX], Some(&end));

        for (key, value) in entries {
            let (time, key_height) = keys::parse_pool_queue_key(&key)?;
            if time > now || key_height > height {
                continue;
            }
            let addrs: Vec<Address> = serde_json::from_slice(&value)?;
            for operator in addrs {
                let pool = self.get_pool(ctx, &operator)?.ok_or_else(|| {
                    fatal(
                        InvariantId::PoolQueue,
                        format!("queued pool {operator} not found"),
                    )
                })?;
                if !pool.is_unbonding() {
                    return Err(fatal(
                        InvariantId::PoolQueue,
                        format!("queued pool {operator} is {:?}", pool.status),
                    ));
                }
                self.complete_pool_unbonding(ctx, pool)?;
            }
            ctx.store_mut().delete(&key);
        }
        Ok(())
    }

    /// Unbonding pools that have not matured yet, ordered by maturity.
    pub fn pool_queue(&self, ctx: &Context<'_>) -> Result<Vec<(u64, u64, Vec<Address>)>> {
        prefix_json::<Vec<Address>>(ctx, &[keys::POOL_QUEUE_PREFIX])?
            .into_iter()
            .map(|(k, addrs)| {
                let (time, height) = keys::parse_pool_queue_key(&k)?;
                Ok((time, height, addrs))
            })
            .collect()
    }
}
