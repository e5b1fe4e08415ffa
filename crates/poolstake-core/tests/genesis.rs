//! Genesis export / import tests

use poolstake_core::bank::DISTRIBUTION;
use poolstake_core::keeper::genesis::AccountBalance;
use poolstake_core::keeper::validate_genesis;
use poolstake_core::{
    Address, BlockHeader, Coin, Coins, Context, DecCoins, Description, GenesisState, Keeper,
    MemStore, Msg, Params, PoolStatus, TokenTransfer,
};

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

fn create(label: &str, amount: u128) -> Msg {
    Msg::CreatePool {
        delegator: addr(label),
        operator: addr(label),
        description: Description::new(label),
        min_self_delegation: 10,
        value: Coin::new("stake", amount),
    }
}

fn next_block(keeper: &Keeper, ctx: &mut Context<'_>, secs: u64) {
    keeper.end_block(ctx).unwrap();
    let h = ctx.header();
    ctx.set_header(BlockHeader::new(h.height + 1, h.time + secs));
    keeper.begin_block(ctx).unwrap();
}

/// A ledger with a bonded pool, an unbonding pool, pending rewards, an unbonding
/// delegation and a withdraw-address override.
fn busy_ledger(keeper: &Keeper, ctx: &mut Context<'_>) {
    let mut params = Params::default();
    params.max_pools = 1;
    params.mint_inflation = Coin::new("stake", 1_000);
    let genesis = GenesisState {
        params,
        balances: ["a", "b", "c", "d"]
            .iter()
            .map(|l| AccountBalance {
                address: addr(l),
                coins: Coins::single("stake", 10_000),
            })
            .collect(),
        ..GenesisState::default()
    };
    keeper.init_genesis(ctx, &genesis).unwrap();

    keeper.handle(ctx, &create("a", 500)).unwrap();
    keeper.handle(ctx, &create("b", 300)).unwrap();
    keeper
        .handle(
            ctx,
            &Msg::Delegate {
                delegator: addr("c"),
                operator: addr("a"),
                amount: Coin::new("stake", 250),
            },
        )
        .unwrap();
    next_block(keeper, ctx, 6);

    // "b" overtakes "a" and "a" starts unbonding.
    keeper
        .handle(
            ctx,
            &Msg::Delegate {
                delegator: addr("d"),
                operator: addr("b"),
                amount: Coin::new("stake", 700),
            },
        )
        .unwrap();
    keeper
        .mint_rewards(ctx, &addr("a"), &addr("d"), "0.03".parse().unwrap())
        .unwrap();
    next_block(keeper, ctx, 6);

    keeper
        .handle(
            ctx,
            &Msg::SetWithdrawAddress {
                delegator: addr("c"),
                withdraw_address: addr("d"),
            },
        )
        .unwrap();
    keeper
        .handle(
            ctx,
            &Msg::Undelegate {
                delegator: addr("d"),
                operator: addr("b"),
                amount: Coin::new("stake", 100),
            },
        )
        .unwrap();
    keeper
        .handle(
            ctx,
            &Msg::FundCommunityPool {
                depositor: addr("c"),
                amount: Coins::single("stake", 17),
            },
        )
        .unwrap();
    keeper.bank().mint(ctx, DISTRIBUTION, &Coins::single("stake", 11)).unwrap();
    let pool = keeper.get_pool(ctx, &addr("b")).unwrap().unwrap();
    keeper
        .allocate_tokens_to_pool(ctx, &pool, &DecCoins::from_coins(&Coins::single("stake", 11)).unwrap())
        .unwrap();
    next_block(keeper, ctx, 6);
}

#[test]
fn export_import_export_is_identity() {
    let mut store = MemStore::new();
    let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
    let keeper = Keeper::default();
    busy_ledger(&keeper, &mut ctx);
    keeper.assert_invariants(&mut ctx).unwrap();

    let exported = keeper.export_genesis(&ctx).unwrap();
    assert!(exported.exported);
    assert_eq!(
        exported
            .pools
            .iter()
            .find(|p| p.operator == addr("a"))
            .map(|p| p.status),
        Some(PoolStatus::Unbonding)
    );
    assert_eq!(exported.withdraw_addresses.len(), 1);
    assert_eq!(exported.unbonding_delegations.len(), 1);
    validate_genesis(&exported).unwrap();

    let json = serde_json::to_string_pretty(&exported).unwrap();
    let decoded: GenesisState = serde_json::from_str(&json).unwrap();

    let mut store2 = MemStore::new();
    let mut ctx2 = Context::new(&mut store2, ctx.header());
    let keeper2 = Keeper::default();
    keeper2.init_genesis(&mut ctx2, &decoded).unwrap();
    keeper2.assert_invariants(&mut ctx2).unwrap();
    assert_eq!(keeper2.export_genesis(&ctx2).unwrap(), exported);
}

#[test]
fn imported_queues_still_mature() {
    let mut store = MemStore::new();
    let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
    let keeper = Keeper::default();
    busy_ledger(&keeper, &mut ctx);
    let exported = keeper.export_genesis(&ctx).unwrap();

    let mut store2 = MemStore::new();
    let mut ctx2 = Context::new(&mut store2, ctx.header());
    let keeper2 = Keeper::default();
    keeper2.init_genesis(&mut ctx2, &exported).unwrap();

    let unbonding_time = Params::default().unbonding_time;
    next_block(&keeper2, &mut ctx2, unbonding_time);
    next_block(&keeper2, &mut ctx2, 1);

    let a = keeper2.get_pool(&ctx2, &addr("a")).unwrap().unwrap();
    assert_eq!(a.status, PoolStatus::Unbonded);
    assert!(keeper2
        .get_unbonding_delegation(&ctx2, &addr("d"), &addr("b"))
        .unwrap()
        .is_none());
    keeper2.assert_invariants(&mut ctx2).unwrap();
}

#[test]
fn hand_written_genesis_from_json() {
    let a = addr("a");
    let json = format!(
        r#"{{
            "params": {params},
            "pools": [{{
                "operator": "{a}",
                "status": "unbonded",
                "tokens": 100,
                "delegator_shares": "100.000000000000000000",
                "description": {{"moniker": "a", "identity": "", "website": "", "security_contact": "", "details": ""}},
                "min_self_delegation": 1,
                "unbonding_time": 0,
                "unbonding_height": 0
            }}],
            "delegations": [{{"delegator": "{a}", "operator": "{a}", "shares": "100.000000000000000000"}}]
        }}"#,
        params = serde_json::to_string(&Params::default()).unwrap(),
    );
    let state: GenesisState = serde_json::from_str(&json).unwrap();
    assert!(!state.exported);

    let mut store = MemStore::new();
    let mut ctx = Context::new(&mut store, BlockHeader::new(1, 1_000));
    let keeper = Keeper::default();
    keeper.init_genesis(&mut ctx, &state).unwrap();
    keeper.assert_invariants(&mut ctx).unwrap();

    let updates = keeper.end_block(&mut ctx).unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].power, 100);
}
