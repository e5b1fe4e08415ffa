//! Engine configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (prefixed with `POOLSTAKE_`)
//! - JSON files (the CLI's `--config`)
//! - Programmatic defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use poolstake_core::config::PoolstakeConfig;
//!
//! let config = PoolstakeConfig::builder()
//!     .bond_denom("ustake")
//!     .max_pools(10)
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::dec::Dec;
use crate::params::Params;
use crate::{PoolstakeError, Result};

/// Complete engine configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolstakeConfig {
    /// Parameters written at genesis when the genesis file carries none.
    pub params: Params,

    /// Invariant checking while replaying scripts.
    pub invariants: InvariantsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl PoolstakeConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PoolstakeConfigBuilder {
        PoolstakeConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Looks for variables prefixed with `POOLSTAKE_`:
    /// - `POOLSTAKE_BOND_DENOM` - Bonding denomination
    /// - `POOLSTAKE_UNBONDING_TIME_SECS` - Unbonding period in seconds
    /// - `POOLSTAKE_MAX_ENTRIES` - Unbonding entries per (delegator, pool)
    /// - `POOLSTAKE_MAX_POOLS` - Size of the bonded set
    /// - `POOLSTAKE_COMMISSION_RATE` - Decimal commission rate, e.g. `0.1`
    /// - `POOLSTAKE_COMMUNITY_TAX` - Decimal community tax
    /// - `POOLSTAKE_INVARIANT_CHECK_PERIOD` - Steps between invariant runs (0 disables)
    /// - `POOLSTAKE_LOG_LEVEL` - Logging level (trace, debug, info, warn, error)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(denom) = std::env::var("POOLSTAKE_BOND_DENOM") {
            config.params.bond_denom = denom.clone();
            config.params.mint_inflation.denom = denom;
        }

        if let Ok(secs) = std::env::var("POOLSTAKE_UNBONDING_TIME_SECS") {
            config.params.unbonding_time = parse_env("POOLSTAKE_UNBONDING_TIME_SECS", &secs)?;
        }

        if let Ok(max) = std::env::var("POOLSTAKE_MAX_ENTRIES") {
            config.params.max_entries = parse_env("POOLSTAKE_MAX_ENTRIES", &max)?;
        }

        if let Ok(max) = std::env::var("POOLSTAKE_MAX_POOLS") {
            config.params.max_pools = parse_env("POOLSTAKE_MAX_POOLS", &max)?;
        }

        if let Ok(rate) = std::env::var("POOLSTAKE_COMMISSION_RATE") {
            config.params.commission_rate = parse_env("POOLSTAKE_COMMISSION_RATE", &rate)?;
        }

        if let Ok(tax) = std::env::var("POOLSTAKE_COMMUNITY_TAX") {
            config.params.community_tax = parse_env("POOLSTAKE_COMMUNITY_TAX", &tax)?;
        }

        if let Ok(period) = std::env::var("POOLSTAKE_INVARIANT_CHECK_PERIOD") {
            config.invariants.check_period =
                parse_env("POOLSTAKE_INVARIANT_CHECK_PERIOD", &period)?;
        }

        if let Ok(level) = std::env::var("POOLSTAKE_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.params
            .validate()
            .map_err(|e| PoolstakeError::ConfigError(format!("params: {e}")))?;

        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(PoolstakeError::ConfigError(format!(
                "unknown log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| PoolstakeError::ConfigError(format!("Invalid {name}: {e}")))
}

/// Invariant checking configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvariantsConfig {
    /// Run the invariant registry after every `check_period` steps; 0 disables.
    pub check_period: u64,
}

impl Default for InvariantsConfig {
    fn default() -> Self {
        Self { check_period: 1 }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// JSON output format.
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_output: false,
        }
    }
}

/// Builder for PoolstakeConfig.
#[derive(Default)]
pub struct PoolstakeConfigBuilder {
    config: PoolstakeConfig,
}

impl PoolstakeConfigBuilder {
    /// Set the bonding denomination (also used for minting).
    pub fn bond_denom(mut self, denom: impl Into<String>) -> Self {
        let denom = denom.into();
        self.config.params.mint_inflation.denom = denom.clone();
        self.config.params.bond_denom = denom;
        self
    }

    /// Set the unbonding period in seconds.
    pub fn unbonding_time(mut self, secs: u64) -> Self {
        self.config.params.unbonding_time = secs;
        self
    }

    /// Set the bonded set size.
    pub fn max_pools(mut self, max: u32) -> Self {
        self.config.params.max_pools = max;
        self
    }

    /// Set the unbonding entry cap.
    pub fn max_entries(mut self, max: u32) -> Self {
        self.config.params.max_entries = max;
        self
    }

    pub fn commission_rate(mut self, rate: Dec) -> Self {
        self.config.params.commission_rate = rate;
        self
    }

    pub fn community_tax(mut self, tax: Dec) -> Self {
        self.config.params.community_tax = tax;
        self
    }

    /// Set the amount minted per `mint_rewards` call.
    pub fn mint_inflation(mut self, amount: u128) -> Self {
        self.config.params.mint_inflation.amount = amount;
        self
    }

    pub fn invariant_check_period(mut self, period: u64) -> Self {
        self.config.invariants.check_period = period;
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Enable JSON log output.
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.config.logging.json_output = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<PoolstakeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
