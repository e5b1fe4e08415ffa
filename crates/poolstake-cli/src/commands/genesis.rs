//! `poolstake init-genesis` and `poolstake validate-genesis`

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use poolstake_core::config::PoolstakeConfig;
use poolstake_core::keeper::validate_genesis;
use poolstake_core::GenesisState;

use super::read_genesis;

pub fn init(config: &PoolstakeConfig, out: PathBuf) -> Result<()> {
    let state = GenesisState {
        params: config.params.clone(),
        ..GenesisState::default()
    };
    let json = serde_json::to_string_pretty(&state)?;
    fs::write(&out, json)
        .with_context(|| format!("Failed to write genesis file: {}", out.display()))?;

    println!("✅ Wrote genesis to {}", out.display());
    println!("   bond denom:     {}", state.params.bond_denom);
    println!("   unbonding time: {}s", state.params.unbonding_time);
    println!("   max pools:      {}", state.params.max_pools);
    Ok(())
}

pub fn validate(file: PathBuf) -> Result<()> {
    let state = read_genesis(&file)?;
    validate_genesis(&state).context("Genesis is invalid")?;

    println!("✅ {} is valid", file.display());
    println!("   pools:                  {}", state.pools.len());
    println!("   delegations:            {}", state.delegations.len());
    println!("   unbonding delegations:  {}", state.unbonding_delegations.len());
    println!("   exported:               {}", state.exported);
    Ok(())
}
