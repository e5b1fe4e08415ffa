//! poolstake CLI
//!
//! Imports a genesis snapshot, replays a script of commands and blocks against an in-memory
//! store, checks the ledger invariants and exports the result.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "poolstake")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (JSON). Without it the configuration is read from the environment.
    #[arg(short, long, global = true, env = "POOLSTAKE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a genesis snapshot with the configured parameters and no pools
    InitGenesis {
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Check a genesis snapshot without importing it
    ValidateGenesis {
        /// Genesis file (JSON)
        file: PathBuf,
    },

    /// Import a genesis snapshot and replay a script against it
    Run {
        /// Genesis file (JSON)
        #[arg(short, long)]
        genesis: PathBuf,

        /// Script file (JSON)
        #[arg(short, long)]
        script: PathBuf,

        /// Where to write the exported snapshot (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    // Initialize logging
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if config.logging.json_output {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::InitGenesis { out } => commands::genesis::init(&config, out),
        Commands::ValidateGenesis { file } => commands::genesis::validate(file),
        Commands::Run {
            genesis,
            script,
            out,
        } => commands::run::run(&config, genesis, script, out),
    }
}
