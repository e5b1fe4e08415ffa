//! Delegation ledger: share balances, unbonding entries and the delegator maturity queue.

use tracing::{debug, info};

use crate::address::Address;
use crate::bank::{TokenTransfer, BONDED_POOL, NOT_BONDED_POOL};
use crate::coins::Coins;
use crate::context::Context;
use crate::dec::Dec;
use crate::invariants::{fatal, InvariantId};
use crate::keys;
use crate::types::{Delegation, DvPair, PoolStatus, UnbondingDelegation};
use crate::{PoolstakeError, Result};

use super::{get_json, prefix_json, set_json, Keeper};

/// When a new unbonding entry matures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeginInfo {
    pub completion_time: u64,
    pub height: u64,
}

impl<B: TokenTransfer> Keeper<B> {
    pub fn get_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<Option<Delegation>> {
        get_json(ctx, &keys::delegation_key(delegator, operator))
    }

    pub fn set_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> Result<()> {
        set_json(
            ctx,
            keys::delegation_key(&delegation.delegator, &delegation.operator),
            delegation,
        )
    }

    pub fn remove_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) {
        ctx.store_mut()
            .delete(&keys::delegation_key(&delegation.delegator, &delegation.operator));
    }

    pub fn all_delegations(&self, ctx: &Context<'_>) -> Result<Vec<Delegation>> {
        Ok(prefix_json(ctx, &[keys::DELEGATION_PREFIX])?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn delegator_delegations(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<Delegation>> {
        Ok(
            prefix_json(ctx, &keys::delegations_by_delegator_prefix(delegator))?
                .into_iter()
                .map(|(_, d)| d)
                .collect(),
        )
    }

    /// Delegations into one pool. Scans every delegation.
    pub fn pool_delegations(&self, ctx: &Context<'_>, operator: &Address) -> Result<Vec<Delegation>> {
        Ok(self
            .all_delegations(ctx)?
            .into_iter()
            .filter(|d| d.operator == *operator)
            .collect())
    }

    /// Adds `amount` tokens to a pool on behalf of `delegator` and returns the issued shares.
    ///
    /// `token_src` is where the tokens currently sit: a delegator account (`Unbonded` with
    /// `subtract_account`) or one of the module accounts for internal moves.
    pub fn delegate(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
        amount: u128,
        token_src: PoolStatus,
        subtract_account: bool,
    ) -> Result<Dec> {
        let mut pool = self
            .get_pool(ctx, operator)?
            .ok_or(PoolstakeError::PoolNotFound(*operator))?;
        if pool.invalid_ex_rate() {
            return Err(PoolstakeError::InvalidExchangeRate);
        }

        let mut delegation = match self.get_delegation(ctx, delegator, operator)? {
            Some(d) => {
                self.before_delegation_shares_modified(ctx, delegator, operator)?;
                d
            }
            None => {
                self.before_delegation_created(ctx, operator)?;
                Delegation {
                    delegator: *delegator,
                    operator: *operator,
                    shares: Dec::ZERO,
                }
            }
        };

        let denom = self.bond_denom(ctx)?;
        let coins = Coins::single(denom, amount);
        if subtract_account {
            if token_src == PoolStatus::Bonded {
                return Err(fatal(
                    InvariantId::StateTransition,
                    "delegation token source cannot be bonded",
                ));
            }
            let target = if pool.is_bonded() {
                BONDED_POOL
            } else {
                NOT_BONDED_POOL
            };
            self.bank
                .send_account_to_module(ctx, delegator, target, &coins)?;
        } else {
            match (token_src == PoolStatus::Bonded, pool.is_bonded()) {
                (true, false) => {
                    self.bank
                        .send_module_to_module(ctx, BONDED_POOL, NOT_BONDED_POOL, &coins)?
                }
                (false, true) => {
                    self.bank
                        .send_module_to_module(ctx, NOT_BONDED_POOL, BONDED_POOL, &coins)?
                }
                _ => {}
            }
        }

        let issued = pool.add_tokens_from_del(amount)?;
        self.set_pool(ctx, &pool)?;

        delegation.shares = delegation.shares.checked_add(issued)?;
        self.set_delegation(ctx, &delegation)?;
        self.after_delegation_modified(ctx, delegator, operator)?;

        debug!(%delegator, %operator, amount, shares = %issued, "delegated");
        Ok(issued)
    }

    /// Removes `shares` from a delegation and returns the tokens they were worth.
    ///
    /// An operator whose self-delegation drops below `min_self_delegation` has its bonded
    /// pool forced into `Unbonding`.
    pub fn unbond(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
        shares: Dec,
    ) -> Result<u128> {
        let mut delegation = self.get_delegation(ctx, delegator, operator)?.ok_or(
            PoolstakeError::NoDelegation {
                delegator: *delegator,
                operator: *operator,
            },
        )?;
        self.before_delegation_shares_modified(ctx, delegator, operator)?;

        if delegation.shares < shares {
            return Err(PoolstakeError::NotEnoughDelegationShares {
                have: delegation.shares,
            });
        }
        let mut pool = self
            .get_pool(ctx, operator)?
            .ok_or(PoolstakeError::PoolNotFound(*operator))?;

        delegation.shares = delegation.shares.checked_sub(shares).ok_or_else(|| {
            fatal(InvariantId::Accounting, "delegation shares would go negative")
        })?;

        if delegator == operator && pool.is_bonded() {
            let self_stake = pool.tokens_from_shares(delegation.shares)?.truncate_int();
            if self_stake < pool.min_self_delegation {
                info!(%operator, self_stake, "self-delegation below minimum, unbonding pool");
                pool = self.begin_unbonding(ctx, pool)?;
            }
        }

        if delegation.shares.is_zero() {
            self.remove_delegation(ctx, &delegation);
        } else {
            self.set_delegation(ctx, &delegation)?;
            self.after_delegation_modified(ctx, delegator, operator)?;
        }

        let amount = pool.remove_del_shares(shares)?;
        self.set_pool(ctx, &pool)?;

        if pool.delegator_shares.is_zero() && pool.is_unbonded() {
            self.remove_pool(ctx, operator)?;
        }
        Ok(amount)
    }

    /// Maturity for a new unbonding entry against `operator`'s current status.
    pub fn begin_info(&self, ctx: &Context<'_>, operator: &Address) -> Result<BeginInfo> {
        let now = BeginInfo {
            completion_time: ctx.time(),
            height: ctx.height(),
        };
        match self.get_pool(ctx, operator)? {
            Some(pool) if pool.is_unbonded() => Ok(now),
            Some(pool) if pool.is_unbonding() => Ok(BeginInfo {
                completion_time: pool.unbonding_time,
                height: pool.unbonding_height,
            }),
            _ => {
                let params = self.params(ctx)?;
                Ok(BeginInfo {
                    completion_time: ctx.time().saturating_add(params.unbonding_time),
                    height: ctx.height(),
                })
            }
        }
    }

    /// Unbonds `shares` and queues the returned tokens; returns the completion time.
    pub fn undelegate(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
        shares: Dec,
    ) -> Result<u64> {
        if self.get_pool(ctx, operator)?.is_none() {
            return Err(PoolstakeError::PoolNotFound(*operator));
        }
        if self.has_max_unbonding_entries(ctx, delegator, operator)? {
            return Err(PoolstakeError::MaxUnbondingEntries);
        }

        let info = self.begin_info(ctx, operator)?;
        let amount = self.unbond(ctx, delegator, operator, shares)?;

        // A pool forced into unbonding above has already moved all of its tokens.
        if let Some(pool) = self.get_pool(ctx, operator)? {
            if pool.is_bonded() {
                let denom = self.bond_denom(ctx)?;
                self.bank.send_module_to_module(
                    ctx,
                    BONDED_POOL,
                    NOT_BONDED_POOL,
                    &Coins::single(denom, amount),
                )?;
            }
        }

        let ubd = self.set_unbonding_entry(
            ctx,
            delegator,
            operator,
            info.height,
            info.completion_time,
            amount,
        )?;
        self.insert_ubd_queue(ctx, &ubd, info.completion_time)?;
        info!(
            %delegator,
            %operator,
            amount,
            completion_time = info.completion_time,
            "undelegated"
        );
        Ok(info.completion_time)
    }

    /// Pays out every mature entry of one unbonding delegation.
    pub fn complete_unbonding(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<Coins> {
        let mut ubd = self
            .get_unbonding_delegation(ctx, delegator, operator)?
            .ok_or(PoolstakeError::NoUnbondingDelegation)?;
        let denom = self.bond_denom(ctx)?;
        let now = ctx.time();

        let mut paid = Coins::new();
        let mut remaining = Vec::with_capacity(ubd.entries.len());
        for entry in std::mem::take(&mut ubd.entries) {
            if !entry.is_mature(now) {
                remaining.push(entry);
                continue;
            }
            if entry.balance > 0 {
                let amount = Coins::single(denom.clone(), entry.balance);
                self.bank
                    .send_module_to_account(ctx, NOT_BONDED_POOL, delegator, &amount)?;
                paid = paid.add(&amount)?;
            }
        }
        ubd.entries = remaining;

        if ubd.entries.is_empty() {
            self.remove_unbonding_delegation(ctx, &ubd);
        } else {
            self.set_unbonding_delegation(ctx, &ubd)?;
        }
        Ok(paid)
    }

    /// Converts a token amount into the shares to undelegate, capped at the delegation.
    pub fn unbond_amount_to_shares(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        operator: &Address,
        amount: u128,
    ) -> Result<Dec> {
        let pool = self
            .get_pool(ctx, operator)?
            .ok_or(PoolstakeError::PoolNotFound(*operator))?;
        let delegation = self.get_delegation(ctx, delegator, operator)?.ok_or(
            PoolstakeError::NoDelegation {
                delegator: *delegator,
                operator: *operator,
            },
        )?;

        let shares = pool.shares_from_tokens(amount)?;
        if pool.shares_from_tokens_truncated(amount)? > delegation.shares {
            return Err(PoolstakeError::BadSharesAmount);
        }
        Ok(shares.min(delegation.shares))
    }

    // Unbonding delegations.

    pub fn get_unbonding_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<Option<UnbondingDelegation>> {
        get_json(ctx, &keys::ubd_key(delegator, operator))
    }

    pub fn set_unbonding_delegation(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
    ) -> Result<()> {
        set_json(ctx, keys::ubd_key(&ubd.delegator, &ubd.operator), ubd)?;
        ctx.store_mut().set(
            keys::ubd_by_pool_key(&ubd.operator, &ubd.delegator),
            Vec::new(),
        );
        Ok(())
    }

    pub fn remove_unbonding_delegation(&self, ctx: &mut Context<'_>, ubd: &UnbondingDelegation) {
        ctx.store_mut()
            .delete(&keys::ubd_key(&ubd.delegator, &ubd.operator));
        ctx.store_mut()
            .delete(&keys::ubd_by_pool_key(&ubd.operator, &ubd.delegator));
    }

    pub fn all_unbonding_delegations(&self, ctx: &Context<'_>) -> Result<Vec<UnbondingDelegation>> {
        Ok(prefix_json(ctx, &[keys::UBD_PREFIX])?
            .into_iter()
            .map(|(_, u)| u)
            .collect())
    }

    pub fn delegator_unbonding_delegations(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<UnbondingDelegation>> {
        Ok(prefix_json(ctx, &keys::ubds_by_delegator_prefix(delegator))?
            .into_iter()
            .map(|(_, u)| u)
            .collect())
    }

    /// Unbonding delegations out of one pool, via the by-pool index.
    pub fn pool_unbonding_delegations(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
    ) -> Result<Vec<UnbondingDelegation>> {
        let prefix = keys::ubds_by_pool_prefix(operator);
        let mut out = Vec::new();
        for (key, _) in ctx.store().prefix(&prefix) {
            let delegator = keys::address_at(&key, prefix.len())?;
            let ubd = self
                .get_unbonding_delegation(ctx, &delegator, operator)?
                .ok_or_else(|| {
                    fatal(
                        InvariantId::MissingRecord,
                        format!("dangling unbonding index ({delegator}, {operator})"),
                    )
                })?;
            out.push(ubd);
        }
        Ok(out)
    }

    pub fn has_max_unbonding_entries(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<bool> {
        let max = self.params(ctx)?.max_entries as usize;
        Ok(self
            .get_unbonding_delegation(ctx, delegator, operator)?
            .map_or(false, |ubd| ubd.entries.len() >= max))
    }

    /// Appends an entry, creating the unbonding delegation if needed.
    pub fn set_unbonding_entry(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
        creation_height: u64,
        completion_time: u64,
        balance: u128,
    ) -> Result<UnbondingDelegation> {
        let mut ubd = self
            .get_unbonding_delegation(ctx, delegator, operator)?
            .unwrap_or_else(|| UnbondingDelegation::new(*delegator, *operator));
        ubd.add_entry(creation_height, completion_time, balance);
        self.set_unbonding_delegation(ctx, &ubd)?;
        Ok(ubd)
    }

    // Delegator maturity queue.

    pub fn ubd_queue_slice(&self, ctx: &Context<'_>, time: u64) -> Result<Vec<DvPair>> {
        Ok(get_json(ctx, &keys::ubd_queue_key(time))?.unwrap_or_default())
    }

    pub(crate) fn insert_ubd_queue(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
        completion_time: u64,
    ) -> Result<()> {
        let pair = DvPair {
            delegator: ubd.delegator,
            operator: ubd.operator,
        };
        let mut slice = self.ubd_queue_slice(ctx, completion_time)?;
        slice.push(pair);
        set_json(ctx, keys::ubd_queue_key(completion_time), &slice)
    }

    /// Removes and returns every queued pair with completion time `<= now`.
    ///
    /// A pair appears once per queued entry; completing it the first time pays all of its
    /// mature entries, so later duplicates find nothing left to pay.
    pub fn dequeue_all_mature_ubd_queue(
        &self,
        ctx: &mut Context<'_>,
        now: u64,
    ) -> Result<Vec<DvPair>> {
        let end = keys::inclusive_end(&keys::ubd_queue_key(now));
        let mut out = Vec::new();
        for (key, value) in ctx.store().range(&[keys::UBD_QUEUE_PREFIX], Some(&end)) {
            let slice: Vec<DvPair> = serde_json::from_slice(&value)?;
            out.extend(slice);
            ctx.store_mut().delete(&key);
        }
        Ok(out)
    }
}
