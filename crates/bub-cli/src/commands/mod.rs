pub mod config;
pub mod vault;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bub", version, about = "A command-line companion for day-to-day infrastructure chores")]
pub struct Cli {
    /// Log progress to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read and write Vault secrets through a tunnel
    Vault(vault::VaultArgs),

    /// Inspect the configuration file
    Config {
        #[command(subcommand)]
        command: config::ConfigCommand,
    },
}
