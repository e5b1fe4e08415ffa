//! `poolstake run` command implementation

use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use poolstake_core::config::PoolstakeConfig;
use poolstake_core::{Address, BlockHeader, Coins, Context, Dec, Keeper, MemStore, Msg, StoreBank};

use super::read_genesis;

/// A replay script: a starting header and the steps to apply from it.
#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default = "default_start_height")]
    start_height: u64,
    #[serde(default)]
    start_time: u64,
    steps: Vec<Step>,
}

fn default_start_height() -> u64 {
    1
}

fn default_blocks() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    Msg(Msg),
    EndBlock {
        #[serde(default)]
        advance_secs: u64,
        #[serde(default = "default_blocks")]
        advance_blocks: u64,
    },
    Mint {
        operator: Address,
        market_recipient: Address,
        #[serde(default)]
        market_rate: Dec,
    },
    Fund {
        address: Address,
        coins: Coins,
    },
}

pub fn run(
    config: &PoolstakeConfig,
    genesis_path: PathBuf,
    script_path: PathBuf,
    out: Option<PathBuf>,
) -> Result<()> {
    let genesis = read_genesis(&genesis_path)?;
    let raw = fs::read_to_string(&script_path)
        .with_context(|| format!("Failed to read script file: {}", script_path.display()))?;
    let script: Script = serde_json::from_str(&raw).context("Failed to parse script JSON")?;

    let mut store = MemStore::new();
    let mut ctx = Context::new(
        &mut store,
        BlockHeader::new(script.start_height, script.start_time),
    );
    let keeper = Keeper::default();
    keeper
        .init_genesis(&mut ctx, &genesis)
        .context("Failed to import genesis")?;
    keeper.begin_block(&mut ctx)?;

    let check_period = config.invariants.check_period;
    let mut rejected = 0usize;
    for (i, step) in script.steps.iter().enumerate() {
        apply(&keeper, &mut ctx, step, &mut rejected)
            .with_context(|| format!("Step {i} failed"))?;
        if check_period > 0 && (i as u64 + 1) % check_period == 0 {
            keeper
                .assert_invariants(&mut ctx)
                .with_context(|| format!("Invariant broken after step {i}"))?;
        }
    }
    if check_period > 0 {
        keeper
            .assert_invariants(&mut ctx)
            .context("Invariant broken at end of script")?;
    }

    let exported = keeper.export_genesis(&ctx)?;
    let json = serde_json::to_string_pretty(&exported)?;
    match out {
        Some(path) => {
            fs::write(&path, json)
                .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
            eprintln!("✅ Wrote snapshot to {}", path.display());
        }
        None => println!("{json}"),
    }
    eprintln!(
        "   steps: {}, rejected commands: {}, final height: {}",
        script.steps.len(),
        rejected,
        ctx.height()
    );
    Ok(())
}

fn apply(
    keeper: &Keeper,
    ctx: &mut Context<'_>,
    step: &Step,
    rejected: &mut usize,
) -> Result<()> {
    match step {
        Step::Msg(msg) => match keeper.handle(ctx, msg) {
            Ok(resp) => info!(kind = msg.kind(), ?resp, "applied"),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                *rejected += 1;
                warn!(kind = msg.kind(), error = %e, "command rejected");
            }
        },
        Step::EndBlock {
            advance_secs,
            advance_blocks,
        } => {
            let updates = keeper.end_block(ctx)?;
            for u in &updates {
                info!(operator = %u.operator, power = u.power, "bonded set change");
            }
            let header = ctx.header();
            ctx.set_header(BlockHeader::new(
                header.height + advance_blocks,
                header.time + advance_secs,
            ));
            keeper.begin_block(ctx)?;
        }
        Step::Mint {
            operator,
            market_recipient,
            market_rate,
        } => {
            let outcome = keeper.mint_rewards(ctx, operator, market_recipient, *market_rate)?;
            info!(
                %operator,
                minted = %outcome.minted,
                market = %outcome.market,
                "rewards minted"
            );
        }
        Step::Fund { address, coins } => {
            StoreBank::new().fund_account(ctx, address, coins)?;
        }
    }
    Ok(())
}
