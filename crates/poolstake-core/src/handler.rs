//! Command dispatch.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::address::Address;
use crate::bank::TokenTransfer;
use crate::coins::{Coin, Coins};
use crate::context::Context;
use crate::dec::Dec;
use crate::keeper::Keeper;
use crate::msgs::Msg;
use crate::types::PoolStatus;
use crate::{PoolstakeError, Result};

/// Result of a successfully applied command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MsgResponse {
    PoolCreated { operator: Address },
    PoolEdited,
    Delegated { shares: Dec },
    Undelegated { completion_time: u64 },
    WithdrawAddressSet,
    RewardsWithdrawn { amount: Coins },
    CommissionWithdrawn { amount: Coins },
    CommunityPoolFunded,
}

impl<B: TokenTransfer> Keeper<B> {
    /// Applies one command atomically: on error nothing it wrote survives.
    pub fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<MsgResponse> {
        msg.validate_basic()?;
        let res = ctx.cached(|c| self.dispatch(c, msg));
        match &res {
            Ok(_) => debug!(kind = msg.kind(), signer = %msg.signer(), "command applied"),
            Err(e) if e.is_fatal() => {
                error!(kind = msg.kind(), error = %e, "command hit a broken invariant")
            }
            Err(e) => debug!(kind = msg.kind(), error = %e, "command rejected"),
        }
        res
    }

    fn check_bond_denom(&self, ctx: &Context<'_>, coin: &Coin) -> Result<()> {
        let expected = self.bond_denom(ctx)?;
        if coin.denom != expected {
            return Err(PoolstakeError::BadDenom {
                got: coin.denom.clone(),
                expected,
            });
        }
        Ok(())
    }

    fn dispatch(&self, ctx: &mut Context<'_>, msg: &Msg) -> Result<MsgResponse> {
        match msg {
            Msg::CreatePool {
                operator,
                description,
                min_self_delegation,
                value,
                ..
            } => {
                self.check_bond_denom(ctx, value)?;
                self.create_pool(
                    ctx,
                    operator,
                    description.clone(),
                    *min_self_delegation,
                    value.amount,
                )?;
                Ok(MsgResponse::PoolCreated {
                    operator: *operator,
                })
            }
            Msg::EditPool {
                operator,
                description,
                min_self_delegation,
            } => {
                self.edit_pool(ctx, operator, description, *min_self_delegation)?;
                Ok(MsgResponse::PoolEdited)
            }
            Msg::Delegate {
                delegator,
                operator,
                amount,
            } => {
                self.check_bond_denom(ctx, amount)?;
                let shares = self.delegate(
                    ctx,
                    delegator,
                    operator,
                    amount.amount,
                    PoolStatus::Unbonded,
                    true,
                )?;
                Ok(MsgResponse::Delegated { shares })
            }
            Msg::Undelegate {
                delegator,
                operator,
                amount,
            } => {
                self.check_bond_denom(ctx, amount)?;
                let shares = self.unbond_amount_to_shares(ctx, delegator, operator, amount.amount)?;
                let completion_time = self.undelegate(ctx, delegator, operator, shares)?;
                Ok(MsgResponse::Undelegated { completion_time })
            }
            Msg::SetWithdrawAddress {
                delegator,
                withdraw_address,
            } => {
                self.set_withdraw_address(ctx, delegator, withdraw_address)?;
                Ok(MsgResponse::WithdrawAddressSet)
            }
            Msg::WithdrawDelegatorReward {
                delegator,
                operator,
            } => {
                let amount = self.withdraw_delegation_rewards(ctx, delegator, operator)?;
                Ok(MsgResponse::RewardsWithdrawn { amount })
            }
            Msg::WithdrawPoolCommission { operator } => {
                let amount = self.withdraw_pool_commission(ctx, operator)?;
                Ok(MsgResponse::CommissionWithdrawn { amount })
            }
            Msg::FundCommunityPool { depositor, amount } => {
                self.fund_community_pool(ctx, amount, depositor)?;
                Ok(MsgResponse::CommunityPoolFunded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::StoreBank;
    use crate::context::BlockHeader;
    use crate::params::Params;
    use crate::store::MemStore;
    use crate::types::Description;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn keeper(ctx: &mut Context<'_>) -> Keeper {
        let k = Keeper::default();
        k.set_params(ctx, &Params::default()).unwrap();
        let bank = StoreBank::new();
        for who in ["a", "b"] {
            bank.fund_account(ctx, &addr(who), &Coins::single("stake", 1_000))
                .unwrap();
        }
        k
    }

    fn create(op: &Address, amount: u128) -> Msg {
        Msg::CreatePool {
            delegator: *op,
            operator: *op,
            description: Description::new("pool"),
            min_self_delegation: 1,
            value: Coin::new("stake", amount),
        }
    }

    #[test]
    fn wrong_denom_is_rejected_without_writes() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = keeper(&mut ctx);
        let a = addr("a");
        k.handle(&mut ctx, &create(&a, 100)).unwrap();

        let msg = Msg::Delegate {
            delegator: addr("b"),
            operator: a,
            amount: Coin::new("atom", 10),
        };
        assert!(matches!(
            k.handle(&mut ctx, &msg),
            Err(PoolstakeError::BadDenom { .. })
        ));
        assert!(k.get_delegation(&ctx, &addr("b"), &a).unwrap().is_none());
    }

    #[test]
    fn failed_command_rolls_back() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = keeper(&mut ctx);
        let a = addr("a");

        // Self delegation exceeds the operator's balance after the pool record is written.
        let err = k.handle(&mut ctx, &create(&a, 5_000)).unwrap_err();
        assert!(matches!(err, PoolstakeError::InsufficientFunds(_)));
        assert!(k.get_pool(&ctx, &a).unwrap().is_none());
        assert!(k.get_current_rewards(&ctx, &a).unwrap().is_none());
    }

    #[test]
    fn undelegate_converts_amount_to_shares() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = keeper(&mut ctx);
        let (a, b) = (addr("a"), addr("b"));
        k.handle(&mut ctx, &create(&a, 100)).unwrap();
        let resp = k
            .handle(
                &mut ctx,
                &Msg::Delegate {
                    delegator: b,
                    operator: a,
                    amount: Coin::new("stake", 50),
                },
            )
            .unwrap();
        assert_eq!(
            resp,
            MsgResponse::Delegated {
                shares: Dec::from_int(50).unwrap()
            }
        );

        let resp = k
            .handle(
                &mut ctx,
                &Msg::Undelegate {
                    delegator: b,
                    operator: a,
                    amount: Coin::new("stake", 20),
                },
            )
            .unwrap();
        // Unbonded pool: the entry matures immediately.
        assert_eq!(resp, MsgResponse::Undelegated { completion_time: 1_000 });
        let d = k.get_delegation(&ctx, &b, &a).unwrap().unwrap();
        assert_eq!(d.shares, Dec::from_int(30).unwrap());

        let err = k
            .handle(
                &mut ctx,
                &Msg::Undelegate {
                    delegator: b,
                    operator: a,
                    amount: Coin::new("stake", 31),
                },
            )
            .unwrap_err();
        assert!(matches!(err, PoolstakeError::BadSharesAmount));
    }

    #[test]
    fn zero_community_deposit_is_rejected() {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let k = keeper(&mut ctx);
        let a = addr("a");

        let json = format!(
            r#"{{"type":"fund_community_pool","depositor":"{a}","amount":{{"stake":0}}}}"#
        );
        assert!(serde_json::from_str::<Msg>(&json).is_err());

        let msg = Msg::FundCommunityPool {
            depositor: a,
            amount: Coins::new(),
        };
        assert!(matches!(
            k.handle(&mut ctx, &msg),
            Err(PoolstakeError::InvalidInput(_))
        ));
        assert!(k.fee_pool(&ctx).unwrap().community_pool.is_zero());
        assert_eq!(k.bank().balance(&ctx, &a, "stake").unwrap(), 1_000);
    }
}
