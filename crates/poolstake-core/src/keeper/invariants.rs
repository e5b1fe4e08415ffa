//! Invariant registry.
//!
//! Each check returns `Err(PoolstakeError::Invariant(..))` when the state breaks the
//! property it guards. Checks never write.

use std::collections::BTreeMap;

use tracing::error;

use crate::address::Address;
use crate::bank::{module_address, TokenTransfer, BONDED_POOL, DISTRIBUTION, NOT_BONDED_POOL};
use crate::context::Context;
use crate::dec::Dec;
use crate::invariants::{fatal, InvariantId};
use crate::{PoolstakeError, Result};

use super::Keeper;

type Check<B> = fn(&Keeper<B>, &mut Context<'_>) -> Result<()>;

impl<B: TokenTransfer> Keeper<B> {
    /// Every registered check, by id.
    fn registered_invariants() -> [(InvariantId, Check<B>); 6] {
        [
            (InvariantId::ModuleAccounts, Self::check_module_accounts),
            (InvariantId::PositiveDelegation, Self::check_positive_delegations),
            (InvariantId::DelegatorShares, Self::check_delegator_shares),
            (InvariantId::NonNegativeOutstanding, Self::check_non_negative_outstanding),
            (InvariantId::ReferenceCount, Self::check_reference_counts),
            (InvariantId::CanWithdraw, Self::check_can_withdraw),
        ]
    }

    /// Runs every check, stopping at the first violation.
    pub fn assert_invariants(&self, ctx: &mut Context<'_>) -> Result<()> {
        for (id, check) in Self::registered_invariants() {
            if let Err(e) = check(self, ctx) {
                error!(invariant = ?id, error = %e, "invariant broken");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Bonded, not-bonded and distribution balances match the records they back.
    pub fn check_module_accounts(&self, ctx: &mut Context<'_>) -> Result<()> {
        let denom = self.bond_denom(ctx)?;
        let mut bonded: u128 = 0;
        let mut not_bonded: u128 = 0;
        for pool in self.all_pools(ctx)? {
            let slot = if pool.is_bonded() {
                &mut bonded
            } else {
                &mut not_bonded
            };
            *slot = slot.saturating_add(pool.tokens);
        }
        for ubd in self.all_unbonding_delegations(ctx)? {
            for entry in &ubd.entries {
                not_bonded = not_bonded.saturating_add(entry.balance);
            }
        }

        let bank = &self.bank;
        let have_bonded = bank.balance(ctx, &module_address(BONDED_POOL), &denom)?;
        let have_not_bonded = bank.balance(ctx, &module_address(NOT_BONDED_POOL), &denom)?;
        if have_bonded != bonded || have_not_bonded != not_bonded {
            return Err(fatal(
                InvariantId::ModuleAccounts,
                format!(
                    "bonded pool {have_bonded} (expected {bonded}), \
                     not-bonded pool {have_not_bonded} (expected {not_bonded})"
                ),
            ));
        }

        let mut held = self.fee_pool(ctx)?.community_pool;
        for operator in self.outstanding_operators(ctx)? {
            held = held.add(&self.outstanding_rewards(ctx, &operator)?)?;
        }
        let (expected, _) = held.truncate_decimal();
        let have = bank.balances(ctx, &module_address(DISTRIBUTION))?;
        if have != expected {
            return Err(fatal(
                InvariantId::ModuleAccounts,
                format!("distribution account holds {have}, records account for {expected}"),
            ));
        }
        Ok(())
    }

    pub fn check_positive_delegations(&self, ctx: &mut Context<'_>) -> Result<()> {
        for d in self.all_delegations(ctx)? {
            if d.shares.is_zero() {
                return Err(fatal(
                    InvariantId::PositiveDelegation,
                    format!("delegation ({}, {}) has zero shares", d.delegator, d.operator),
                ));
            }
        }
        Ok(())
    }

    /// Each pool's delegator shares equal the sum of its delegations' shares.
    pub fn check_delegator_shares(&self, ctx: &mut Context<'_>) -> Result<()> {
        let mut sums: BTreeMap<Address, Dec> = BTreeMap::new();
        for d in self.all_delegations(ctx)? {
            let sum = sums.entry(d.operator).or_insert(Dec::ZERO);
            *sum = sum.checked_add(d.shares)?;
        }
        for pool in self.all_pools(ctx)? {
            let sum = sums.remove(&pool.operator).unwrap_or(Dec::ZERO);
            if sum != pool.delegator_shares {
                return Err(fatal(
                    InvariantId::DelegatorShares,
                    format!(
                        "pool {} has {} shares, delegations sum to {sum}",
                        pool.operator, pool.delegator_shares
                    ),
                ));
            }
        }
        if let Some((operator, _)) = sums.into_iter().next() {
            return Err(fatal(
                InvariantId::DelegatorShares,
                format!("delegations reference missing pool {operator}"),
            ));
        }
        Ok(())
    }

    /// Outstanding rewards always cover the accumulated commission they include.
    pub fn check_non_negative_outstanding(&self, ctx: &mut Context<'_>) -> Result<()> {
        for operator in self.outstanding_operators(ctx)? {
            let outstanding = self.outstanding_rewards(ctx, &operator)?;
            let commission = self.accumulated_commission(ctx, &operator)?;
            if !outstanding.is_all_gte(&commission) {
                return Err(fatal(
                    InvariantId::NonNegativeOutstanding,
                    format!("pool {operator} outstanding {outstanding} below commission {commission}"),
                ));
            }
        }
        Ok(())
    }

    /// Total historical reference count equals pools plus delegations.
    pub fn check_reference_counts(&self, ctx: &mut Context<'_>) -> Result<()> {
        let pools = self.all_pools(ctx)?.len() as u64;
        let delegations = self.all_delegations(ctx)?.len() as u64;
        let total: u64 = self
            .all_historical_rewards(ctx)?
            .iter()
            .map(|(_, _, h)| u64::from(h.reference_count))
            .sum();
        if total != pools + delegations {
            return Err(fatal(
                InvariantId::ReferenceCount,
                format!(
                    "reference counts sum to {total}, expected {pools} pools + {delegations} delegations"
                ),
            ));
        }
        Ok(())
    }

    /// Force-withdraws every commission and delegation reward against a discarded view.
    pub fn check_can_withdraw(&self, ctx: &mut Context<'_>) -> Result<()> {
        let res = ctx.discarded(|c| {
            for pool in self.all_pools(c)? {
                match self.withdraw_pool_commission(c, &pool.operator) {
                    Ok(_) | Err(PoolstakeError::NoPoolCommission) => {}
                    Err(e) => return Err(e),
                }
                for d in self.pool_delegations(c, &pool.operator)? {
                    self.withdraw_delegation_rewards(c, &d.delegator, &d.operator)?;
                }
            }
            Ok(())
        });
        res.map_err(|e| {
            fatal(
                InvariantId::CanWithdraw,
                format!("force-withdrawing all rewards failed: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::coins::{Coins, DecCoins};
    use crate::context::BlockHeader;
    use crate::keys;
    use crate::store::MemStore;
    use crate::types::PoolStatus;

    fn populated(ctx: &mut Context<'_>) -> Keeper {
        let k = setup(ctx);
        let (a, b) = (addr("a"), addr("b"));
        create_pool(&k, ctx, &a, 100);
        fund(&k, ctx, &b, 50);
        k.delegate(ctx, &b, &a, 50, PoolStatus::Unbonded, true).unwrap();
        k.end_block(ctx).unwrap();
        advance(ctx, 1, 5);
        k.bank()
            .mint(ctx, DISTRIBUTION, &Coins::single("stake", 31))
            .unwrap();
        let pool = k.get_pool(ctx, &a).unwrap().unwrap();
        k.allocate_tokens_to_pool(
            ctx,
            &pool,
            &DecCoins::from_coins(&Coins::single("stake", 31)).unwrap(),
        )
        .unwrap();
        k.undelegate(ctx, &b, &a, Dec::from_int(20).unwrap()).unwrap();
        k
    }

    #[test]
    fn healthy_state_passes_every_check() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = populated(&mut ctx);
        k.assert_invariants(&mut ctx).unwrap();
    }

    #[test]
    fn detects_module_account_drift() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = populated(&mut ctx);
        k.bank()
            .fund_account(&mut ctx, &module_address(BONDED_POOL), &Coins::single("stake", 1))
            .unwrap();
        let err = k.assert_invariants(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            PoolstakeError::Invariant(ref v) if v.id == InvariantId::ModuleAccounts
        ));
    }

    #[test]
    fn detects_share_mismatch() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = populated(&mut ctx);
        let mut pool = k.get_pool(&ctx, &addr("a")).unwrap().unwrap();
        pool.delegator_shares = pool.delegator_shares.checked_add(Dec::ONE).unwrap();
        k.set_pool(&mut ctx, &pool).unwrap();
        let err = k.check_delegator_shares(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            PoolstakeError::Invariant(ref v) if v.id == InvariantId::DelegatorShares
        ));
    }

    #[test]
    fn detects_leaked_reference() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = populated(&mut ctx);
        let a = addr("a");
        ctx.store_mut()
            .delete(&keys::starting_info_key(&a, &addr("b")));
        ctx.store_mut()
            .delete(&keys::delegation_key(&addr("b"), &a));
        assert!(k.check_reference_counts(&mut ctx).unwrap_err().is_fatal());
    }

    #[test]
    fn detects_unpayable_rewards() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = populated(&mut ctx);
        advance(&mut ctx, 1, 5);
        k.set_outstanding_rewards(&mut ctx, &addr("a"), &DecCoins::new())
            .unwrap();
        let err = k.check_can_withdraw(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            PoolstakeError::Invariant(ref v) if v.id == InvariantId::CanWithdraw
        ));
    }
}
