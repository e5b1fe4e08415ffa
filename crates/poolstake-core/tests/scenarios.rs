//! End-to-end ledger scenarios
//!
//! Each test imports a hand-written genesis, drives the engine through commands and block
//! hooks only, and checks the invariant registry at the end.

use poolstake_core::bank::{module_address, BONDED_POOL, NOT_BONDED_POOL};
use poolstake_core::keeper::genesis::AccountBalance;
use poolstake_core::{
    Address, BlockHeader, Coin, Coins, Context, Dec, DecCoins, Description, GenesisState, Keeper,
    MemStore, Msg, MsgResponse, Params, PoolStatus, TokenTransfer,
};

// =============================================================================
// Fixtures
// =============================================================================

const START: u64 = 1_700_000_000;
const UNBONDING: u64 = 21 * 24 * 60 * 60;

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

fn params() -> Params {
    Params {
        commission_rate: "0.1".parse().unwrap(),
        unbonding_time: UNBONDING,
        ..Params::default()
    }
}

fn genesis(accounts: &[(&str, u128)]) -> GenesisState {
    GenesisState {
        params: params(),
        balances: accounts
            .iter()
            .map(|(label, amount)| AccountBalance {
                address: addr(label),
                coins: Coins::single("stake", *amount),
            })
            .collect(),
        ..GenesisState::default()
    }
}

fn create(operator: &Address, amount: u128, min_self_delegation: u128) -> Msg {
    Msg::CreatePool {
        delegator: *operator,
        operator: *operator,
        description: Description::new("pool A"),
        min_self_delegation,
        value: Coin::new("stake", amount),
    }
}

fn delegate(delegator: &Address, operator: &Address, amount: u128) -> Msg {
    Msg::Delegate {
        delegator: *delegator,
        operator: *operator,
        amount: Coin::new("stake", amount),
    }
}

fn undelegate(delegator: &Address, operator: &Address, amount: u128) -> Msg {
    Msg::Undelegate {
        delegator: *delegator,
        operator: *operator,
        amount: Coin::new("stake", amount),
    }
}

fn next_block(keeper: &Keeper, ctx: &mut Context<'_>, secs: u64) {
    keeper.end_block(ctx).unwrap();
    let h = ctx.header();
    ctx.set_header(BlockHeader::new(h.height + 1, h.time + secs));
    keeper.begin_block(ctx).unwrap();
}

fn balance(keeper: &Keeper, ctx: &Context<'_>, who: &Address) -> u128 {
    keeper.bank().balance(ctx, who, "stake").unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn rewards_split_between_commission_and_delegators() {
    let mut store = MemStore::new();
    let mut ctx = Context::new(&mut store, BlockHeader::new(1, START));
    let keeper = Keeper::default();
    keeper
        .init_genesis(&mut ctx, &genesis(&[("A", 100), ("B", 50)]))
        .unwrap();
    let (a, b) = (addr("A"), addr("B"));

    keeper.handle(&mut ctx, &create(&a, 100, 1)).unwrap();
    keeper.handle(&mut ctx, &delegate(&b, &a, 50)).unwrap();
    next_block(&keeper, &mut ctx, 5);

    // Rewards arrive from outside the ledger: mint into distribution, then allocate.
    let reward = Coins::single("stake", 30);
    keeper
        .bank()
        .mint(&mut ctx, poolstake_core::bank::DISTRIBUTION, &reward)
        .unwrap();
    let pool = keeper.get_pool(&ctx, &a).unwrap().unwrap();
    keeper
        .allocate_tokens_to_pool(&mut ctx, &pool, &DecCoins::from_coins(&reward).unwrap())
        .unwrap();

    assert_eq!(
        keeper.accumulated_commission(&ctx, &a).unwrap(),
        DecCoins::single("stake", Dec::from_int(3).unwrap())
    );
    assert_eq!(
        keeper.pending_rewards(&mut ctx, &a, &a).unwrap(),
        DecCoins::single("stake", Dec::from_int(18).unwrap())
    );

    let before = keeper.get_starting_info(&ctx, &a, &b).unwrap().unwrap();
    next_block(&keeper, &mut ctx, 5);
    let resp = keeper
        .handle(
            &mut ctx,
            &Msg::WithdrawDelegatorReward {
                delegator: b,
                operator: a,
            },
        )
        .unwrap();
    assert_eq!(
        resp,
        MsgResponse::RewardsWithdrawn {
            amount: Coins::single("stake", 9)
        }
    );
    assert_eq!(balance(&keeper, &ctx, &b), 9);

    let after = keeper.get_starting_info(&ctx, &a, &b).unwrap().unwrap();
    assert!(after.previous_period > before.previous_period);
    assert_eq!(after.height, ctx.height());

    let resp = keeper
        .handle(&mut ctx, &Msg::WithdrawPoolCommission { operator: a })
        .unwrap();
    assert_eq!(
        resp,
        MsgResponse::CommissionWithdrawn {
            amount: Coins::single("stake", 3)
        }
    );
    keeper.assert_invariants(&mut ctx).unwrap();
}

#[test]
fn undelegating_from_bonded_pool_waits_for_maturity() {
    let mut store = MemStore::new();
    let mut ctx = Context::new(&mut store, BlockHeader::new(1, START));
    let keeper = Keeper::default();
    keeper
        .init_genesis(&mut ctx, &genesis(&[("A", 100), ("B", 50)]))
        .unwrap();
    let (a, b) = (addr("A"), addr("B"));

    keeper.handle(&mut ctx, &create(&a, 100, 1)).unwrap();
    keeper.handle(&mut ctx, &delegate(&b, &a, 50)).unwrap();
    next_block(&keeper, &mut ctx, 5);
    assert_eq!(
        keeper.get_pool(&ctx, &a).unwrap().unwrap().status,
        PoolStatus::Bonded
    );

    let now = ctx.time();
    let resp = keeper.handle(&mut ctx, &undelegate(&b, &a, 50)).unwrap();
    assert_eq!(
        resp,
        MsgResponse::Undelegated {
            completion_time: now + UNBONDING
        }
    );
    let ubd = keeper.get_unbonding_delegation(&ctx, &b, &a).unwrap().unwrap();
    assert_eq!(ubd.entries.len(), 1);
    assert_eq!(ubd.entries[0].balance, 50);
    assert!(keeper.get_delegation(&ctx, &b, &a).unwrap().is_none());
    assert_eq!(
        keeper.bank().balance(&ctx, &module_address(NOT_BONDED_POOL), "stake").unwrap(),
        50
    );

    next_block(&keeper, &mut ctx, UNBONDING - 1);
    next_block(&keeper, &mut ctx, 1);
    assert_eq!(balance(&keeper, &ctx, &b), 0);
    assert!(keeper.get_unbonding_delegation(&ctx, &b, &a).unwrap().is_some());

    next_block(&keeper, &mut ctx, 5);
    assert_eq!(balance(&keeper, &ctx, &b), 50);
    assert!(keeper.get_unbonding_delegation(&ctx, &b, &a).unwrap().is_none());
    keeper.assert_invariants(&mut ctx).unwrap();
}

#[test]
fn self_stake_below_minimum_forces_unbonding() {
    let mut store = MemStore::new();
    let mut ctx = Context::new(&mut store, BlockHeader::new(1, START));
    let keeper = Keeper::default();
    keeper
        .init_genesis(&mut ctx, &genesis(&[("A", 100), ("B", 50)]))
        .unwrap();
    let (a, b) = (addr("A"), addr("B"));

    keeper.handle(&mut ctx, &create(&a, 100, 100)).unwrap();
    keeper.handle(&mut ctx, &delegate(&b, &a, 50)).unwrap();
    next_block(&keeper, &mut ctx, 5);

    let now = ctx.time();
    keeper.handle(&mut ctx, &undelegate(&a, &a, 1)).unwrap();

    let pool = keeper.get_pool(&ctx, &a).unwrap().unwrap();
    assert_eq!(pool.status, PoolStatus::Unbonding);
    assert_eq!(pool.unbonding_time, now + UNBONDING);
    assert_eq!(pool.tokens, 149);
    assert_eq!(
        keeper.bank().balance(&ctx, &module_address(BONDED_POOL), "stake").unwrap(),
        0
    );
    keeper.assert_invariants(&mut ctx).unwrap();

    // The bonded-set update leaves an unbonding pool alone.
    let updates = keeper.end_block(&mut ctx).unwrap();
    assert!(updates.is_empty());
}
