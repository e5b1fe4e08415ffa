//! Read-only views that need computation beyond a single record lookup.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::bank::TokenTransfer;
use crate::coins::DecCoins;
use crate::context::Context;
use crate::dec::Dec;
use crate::types::Delegation;
use crate::{PoolstakeError, Result};

use super::Keeper;

/// A delegation together with its current token value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationResponse {
    pub delegation: Delegation,
    pub balance: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorRewards {
    pub operator: Address,
    pub reward: DecCoins,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatorTotalRewards {
    pub rewards: Vec<DelegatorRewards>,
    pub total: DecCoins,
}

impl<B: TokenTransfer> Keeper<B> {
    /// Rewards `delegator` would receive if it withdrew from `operator` now.
    ///
    /// Runs the period increment against a discarded view, so nothing is written.
    pub fn pending_rewards(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<DecCoins> {
        ctx.discarded(|c| {
            let pool = self
                .get_pool(c, operator)?
                .ok_or(PoolstakeError::NoPoolDistInfo(*operator))?;
            let delegation = self.get_delegation(c, delegator, operator)?.ok_or(
                PoolstakeError::NoDelegation {
                    delegator: *delegator,
                    operator: *operator,
                },
            )?;
            let ending_period = self.increment_pool_period(c, &pool)?;
            self.calculate_delegation_rewards(c, &pool, &delegation, ending_period)
        })
    }

    pub fn delegator_total_rewards(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
    ) -> Result<DelegatorTotalRewards> {
        let mut out = DelegatorTotalRewards::default();
        for delegation in self.delegator_delegations(ctx, delegator)? {
            let reward = self.pending_rewards(ctx, delegator, &delegation.operator)?;
            out.total = out.total.add(&reward)?;
            out.rewards.push(DelegatorRewards {
                operator: delegation.operator,
                reward,
            });
        }
        Ok(out)
    }

    pub fn delegation_response(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<DelegationResponse> {
        let delegation = self.get_delegation(ctx, delegator, operator)?.ok_or(
            PoolstakeError::NoDelegation {
                delegator: *delegator,
                operator: *operator,
            },
        )?;
        let pool = self
            .get_pool(ctx, operator)?
            .ok_or(PoolstakeError::PoolNotFound(*operator))?;
        let balance = pool.tokens_from_shares_truncated(delegation.shares)?.truncate_int();
        Ok(DelegationResponse {
            delegation,
            balance,
        })
    }

    /// Tokens `delegator` has bonded across all pools, floored per delegation.
    pub fn delegator_bonded_tokens(&self, ctx: &Context<'_>, delegator: &Address) -> Result<u128> {
        let mut total: u128 = 0;
        for d in self.delegator_delegations(ctx, delegator)? {
            total = total.saturating_add(self.delegation_response(ctx, delegator, &d.operator)?.balance);
        }
        Ok(total)
    }

    /// Sum of delegator shares over every pool.
    pub fn total_delegator_shares(&self, ctx: &Context<'_>) -> Result<Dec> {
        self.all_pools(ctx)?
            .iter()
            .try_fold(Dec::ZERO, |acc, p| acc.checked_add(p.delegator_shares))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::bank::DISTRIBUTION;
    use crate::coins::Coins;
    use crate::context::BlockHeader;
    use crate::store::MemStore;
    use crate::types::PoolStatus;

    #[test]
    fn pending_rewards_do_not_write() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = setup(&mut ctx);
        let (a, b) = (addr("a"), addr("b"));
        create_pool(&k, &mut ctx, &a, 100);
        fund(&k, &mut ctx, &b, 50);
        k.delegate(&mut ctx, &b, &a, 50, PoolStatus::Unbonded, true)
            .unwrap();

        advance(&mut ctx, 1, 5);
        k.bank()
            .mint(&mut ctx, DISTRIBUTION, &Coins::single("stake", 30))
            .unwrap();
        let pool = k.get_pool(&ctx, &a).unwrap().unwrap();
        k.allocate_tokens_to_pool(
            &mut ctx,
            &pool,
            &DecCoins::from_coins(&Coins::single("stake", 30)).unwrap(),
        )
        .unwrap();

        let period_before = k.get_current_rewards(&ctx, &a).unwrap().unwrap().period;
        let pending = k.pending_rewards(&mut ctx, &b, &a).unwrap();
        assert_eq!(pending, DecCoins::single("stake", Dec::from_int(9).unwrap()));
        assert_eq!(
            k.get_current_rewards(&ctx, &a).unwrap().unwrap().period,
            period_before
        );

        let total = k.delegator_total_rewards(&mut ctx, &b).unwrap();
        assert_eq!(total.rewards.len(), 1);
        assert_eq!(total.total, pending);

        let resp = k.delegation_response(&ctx, &b, &a).unwrap();
        assert_eq!(resp.balance, 50);
        assert_eq!(k.delegator_bonded_tokens(&ctx, &b).unwrap(), 50);
        assert_eq!(k.total_delegator_shares(&ctx).unwrap(), Dec::from_int(150).unwrap());
    }
}
