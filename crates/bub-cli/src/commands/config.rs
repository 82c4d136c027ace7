use anyhow::Result;
use clap::Subcommand;

use bub_core::Config;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
}

pub fn run(command: ConfigCommand, config: &Config) -> Result<()> {
    match command {
        ConfigCommand::Show => println!("{}", serde_json::to_string_pretty(config)?),
        ConfigCommand::Path => println!("{}", Config::config_path()?.display()),
    }
    Ok(())
}
