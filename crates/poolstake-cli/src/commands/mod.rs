//! CLI command implementations

pub mod genesis;
pub mod run;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use poolstake_core::config::PoolstakeConfig;
use poolstake_core::GenesisState;

/// Loads the config file if one is given, otherwise reads `POOLSTAKE_*` variables.
pub fn load_config(path: Option<&Path>) -> Result<PoolstakeConfig> {
    let Some(path) = path else {
        return PoolstakeConfig::from_env().context("Invalid configuration in environment");
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: PoolstakeConfig =
        serde_json::from_str(&raw).context("Failed to parse config JSON")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn read_genesis(path: &Path) -> Result<GenesisState> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read genesis file: {}", path.display()))?;
    serde_json::from_str(&raw).context("Failed to parse genesis JSON")
}
