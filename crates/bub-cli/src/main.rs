//! bub - a command-line companion for day-to-day infrastructure chores.
//!
//! Currently ships the Vault commands: reading and writing secrets through
//! an SSH tunnel with a cached, self-renewing session token.

mod commands;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bub_core::Config;
use commands::{Cli, Commands};

/// Initialize the tracing subscriber for logging
fn init_tracing(verbose: bool) {
    // RUST_LOG wins over --verbose
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    info!("bub starting");

    match cli.command {
        Commands::Vault(args) => commands::vault::run(args, &config).await,
        Commands::Config { command } => commands::config::run(command, &config),
    }
}
