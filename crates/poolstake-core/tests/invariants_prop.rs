//! Property tests: ledger-wide invariants hold under random command sequences.

use proptest::prelude::*;

use poolstake_core::bank::DISTRIBUTION;
use poolstake_core::keeper::genesis::AccountBalance;
use poolstake_core::{
    Address, BlockHeader, Coin, Coins, Context, DecCoins, Description, GenesisState, Keeper,
    MemStore, Msg, Params, TokenTransfer,
};

const ACCOUNTS: [&str; 4] = ["p0", "p1", "d0", "d1"];
const POOLS: [&str; 2] = ["p0", "p1"];

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

#[derive(Clone, Debug)]
enum Op {
    Create { pool: usize, amount: u128 },
    Delegate { who: usize, pool: usize, amount: u128 },
    Undelegate { who: usize, pool: usize, amount: u128 },
    WithdrawRewards { who: usize, pool: usize },
    WithdrawCommission { pool: usize },
    Allocate { pool: usize, amount: u128 },
    Mint { pool: usize, recipient: usize },
    FundCommunity { who: usize, amount: u128 },
    EndBlock { secs: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let who = 0..ACCOUNTS.len();
    let pool = 0..POOLS.len();
    prop_oneof![
        (pool.clone(), 1u128..2_000).prop_map(|(pool, amount)| Op::Create { pool, amount }),
        (who.clone(), pool.clone(), 1u128..3_000)
            .prop_map(|(who, pool, amount)| Op::Delegate { who, pool, amount }),
        (who.clone(), pool.clone(), 1u128..3_000)
            .prop_map(|(who, pool, amount)| Op::Undelegate { who, pool, amount }),
        (who.clone(), pool.clone()).prop_map(|(who, pool)| Op::WithdrawRewards { who, pool }),
        pool.clone().prop_map(|pool| Op::WithdrawCommission { pool }),
        (pool.clone(), 1u128..500).prop_map(|(pool, amount)| Op::Allocate { pool, amount }),
        (pool, who.clone()).prop_map(|(pool, recipient)| Op::Mint { pool, recipient }),
        (who, 1u128..100).prop_map(|(who, amount)| Op::FundCommunity { who, amount }),
        (0u64..(30 * 24 * 60 * 60)).prop_map(|secs| Op::EndBlock { secs }),
    ]
}

fn genesis() -> GenesisState {
    let mut params = Params::default();
    params.commission_rate = "0.1".parse().unwrap();
    params.max_pools = 1;
    params.max_entries = 3;
    params.unbonding_time = 7 * 24 * 60 * 60;
    params.mint_inflation = Coin::new("stake", 997);
    GenesisState {
        params,
        balances: ACCOUNTS
            .iter()
            .map(|l| AccountBalance {
                address: addr(l),
                coins: Coins::single("stake", 50_000),
            })
            .collect(),
        ..GenesisState::default()
    }
}

/// Applies one op. Rejected commands are fine; a broken invariant is not.
fn apply(keeper: &Keeper, ctx: &mut Context<'_>, op: &Op) -> Result<(), String> {
    let res = match op {
        Op::Create { pool, amount } => keeper
            .handle(
                ctx,
                &Msg::CreatePool {
                    delegator: addr(POOLS[*pool]),
                    operator: addr(POOLS[*pool]),
                    description: Description::new(POOLS[*pool]),
                    min_self_delegation: 1,
                    value: Coin::new("stake", *amount),
                },
            )
            .map(|_| ()),
        Op::Delegate { who, pool, amount } => keeper
            .handle(
                ctx,
                &Msg::Delegate {
                    delegator: addr(ACCOUNTS[*who]),
                    operator: addr(POOLS[*pool]),
                    amount: Coin::new("stake", *amount),
                },
            )
            .map(|_| ()),
        Op::Undelegate { who, pool, amount } => keeper
            .handle(
                ctx,
                &Msg::Undelegate {
                    delegator: addr(ACCOUNTS[*who]),
                    operator: addr(POOLS[*pool]),
                    amount: Coin::new("stake", *amount),
                },
            )
            .map(|_| ()),
        Op::WithdrawRewards { who, pool } => keeper
            .handle(
                ctx,
                &Msg::WithdrawDelegatorReward {
                    delegator: addr(ACCOUNTS[*who]),
                    operator: addr(POOLS[*pool]),
                },
            )
            .map(|_| ()),
        Op::WithdrawCommission { pool } => keeper
            .handle(
                ctx,
                &Msg::WithdrawPoolCommission {
                    operator: addr(POOLS[*pool]),
                },
            )
            .map(|_| ()),
        Op::Allocate { pool, amount } => ctx.cached(|c| {
            let Some(p) = keeper.get_pool(c, &addr(POOLS[*pool]))? else {
                return Ok(());
            };
            let coins = Coins::single("stake", *amount);
            keeper.bank().mint(c, DISTRIBUTION, &coins)?;
            keeper.allocate_tokens_to_pool(c, &p, &DecCoins::from_coins(&coins)?)
        }),
        Op::Mint { pool, recipient } => ctx.cached(|c| {
            keeper
                .mint_rewards(
                    c,
                    &addr(POOLS[*pool]),
                    &addr(ACCOUNTS[*recipient]),
                    "0.03".parse()?,
                )
                .map(|_| ())
        }),
        Op::FundCommunity { who, amount } => keeper
            .handle(
                ctx,
                &Msg::FundCommunityPool {
                    depositor: addr(ACCOUNTS[*who]),
                    amount: Coins::single("stake", *amount),
                },
            )
            .map(|_| ()),
        Op::EndBlock { secs } => {
            let res = keeper.end_block(ctx).map(|_| ());
            let h = ctx.header();
            ctx.set_header(BlockHeader::new(h.height + 1, h.time + secs));
            res.and_then(|_| keeper.begin_block(ctx))
        }
    };
    match res {
        Err(e) if e.is_fatal() => Err(format!("{op:?}: {e}")),
        _ => Ok(()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_under_random_ops(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut store = MemStore::new();
        let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
        let keeper = Keeper::default();
        keeper.init_genesis(&mut ctx, &genesis()).unwrap();

        for op in &ops {
            if let Err(msg) = apply(&keeper, &mut ctx, op) {
                prop_assert!(false, "fatal error: {}", msg);
            }
            if let Err(e) = keeper.assert_invariants(&mut ctx) {
                prop_assert!(false, "after {:?}: {}", op, e);
            }
        }

        let exported = keeper.export_genesis(&ctx).unwrap();
        let mut store2 = MemStore::new();
        let mut ctx2 = Context::new(&mut store2, ctx.header());
        let keeper2 = Keeper::default();
        keeper2.init_genesis(&mut ctx2, &exported).unwrap();
        prop_assert_eq!(keeper2.export_genesis(&ctx2).unwrap(), exported);
    }
}
