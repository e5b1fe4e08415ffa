//! Community pool and reward minting.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::address::Address;
use crate::bank::{TokenTransfer, DISTRIBUTION};
use crate::coins::{Coins, DecCoins};
use crate::context::Context;
use crate::dec::Dec;
use crate::invariants::{fatal, InvariantId};
use crate::keys;
use crate::types::FeePool;
use crate::{PoolstakeError, Result};

use super::{get_json, set_json, Keeper};

/// Where one `mint_rewards` call sent its tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintOutcome {
    pub minted: Coins,
    pub market: Coins,
    pub pool_rewards: DecCoins,
    pub community: DecCoins,
}

impl<B: TokenTransfer> Keeper<B> {
    pub fn fee_pool(&self, ctx: &Context<'_>) -> Result<FeePool> {
        Ok(get_json(ctx, keys::FEE_POOL_KEY)?.unwrap_or_default())
    }

    pub fn set_fee_pool(&self, ctx: &mut Context<'_>, fee_pool: &FeePool) -> Result<()> {
        set_json(ctx, keys::FEE_POOL_KEY.to_vec(), fee_pool)
    }

    pub(crate) fn add_to_community_pool(
        &self,
        ctx: &mut Context<'_>,
        amount: &DecCoins,
    ) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let mut fee_pool = self.fee_pool(ctx)?;
        fee_pool.community_pool = fee_pool.community_pool.add(amount)?;
        self.set_fee_pool(ctx, &fee_pool)
    }

    /// Moves `amount` from `depositor` into the community pool.
    pub fn fund_community_pool(
        &self,
        ctx: &mut Context<'_>,
        amount: &Coins,
        depositor: &Address,
    ) -> Result<()> {
        self.bank
            .send_account_to_module(ctx, depositor, DISTRIBUTION, amount)?;
        self.add_to_community_pool(ctx, &DecCoins::from_coins(amount)?)?;
        info!(%depositor, %amount, "community pool funded");
        Ok(())
    }

    /// Mints `mint_inflation` and splits it between a market recipient, the pool's
    /// delegators and the community pool.
    ///
    /// The market share is `min(market_rate, params.market_rate)` of the minted amount,
    /// floored to whole units. The pool receives `1 - market_rate - community_tax`; the
    /// community pool receives whatever is left, including rounding dust.
    pub fn mint_rewards(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        market_recipient: &Address,
        market_rate: Dec,
    ) -> Result<MintOutcome> {
        let params = self.params(ctx)?;
        let minted = Coins::from_coin(&params.mint_inflation);
        if minted.is_zero() {
            return Ok(MintOutcome::default());
        }
        let pool = self
            .get_pool(ctx, operator)?
            .ok_or(PoolstakeError::PoolNotFound(*operator))?;

        self.bank.mint(ctx, DISTRIBUTION, &minted)?;
        let minted_dec = DecCoins::from_coins(&minted)?;

        let market_rate = market_rate.min(params.market_rate);
        let (market, _) = minted_dec.mul_dec_truncate(market_rate)?.truncate_decimal();
        if !market.is_zero() {
            self.bank
                .send_module_to_account(ctx, DISTRIBUTION, market_recipient, &market)?;
        }

        let pool_share = Dec::ONE
            .checked_sub(market_rate)
            .and_then(|r| r.checked_sub(params.community_tax))
            .ok_or_else(|| {
                fatal(
                    InvariantId::Accounting,
                    "market rate plus community tax exceeds one",
                )
            })?;
        let pool_rewards = minted_dec.mul_dec_truncate(pool_share)?;
        self.allocate_tokens_to_pool(ctx, &pool, &pool_rewards)?;

        let community = minted_dec
            .checked_sub(&DecCoins::from_coins(&market)?)
            .and_then(|rest| rest.checked_sub(&pool_rewards))
            .ok_or_else(|| fatal(InvariantId::Accounting, "mint split exceeds minted amount"))?;
        self.add_to_community_pool(ctx, &community)?;

        info!(
            %operator,
            minted = %minted,
            market = %market,
            pool = %pool_rewards,
            community = %community,
            "rewards minted"
        );
        Ok(MintOutcome {
            minted,
            market,
            pool_rewards,
            community,
        })
    }
}
