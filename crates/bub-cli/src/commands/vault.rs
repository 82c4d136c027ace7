use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde_json::{Map, Value};
use tracing::debug;

use bub_core::auth::KeyringCredentials;
use bub_core::vault::{ErrorKind, Secret};
use bub_core::{Config, SecretClient, TokenStore, TunnelEndpoint, VaultConfig, VaultError};

#[derive(Args)]
pub struct VaultArgs {
    /// Environment domain; Vault is reached at vault.<domain>
    #[arg(long, env = "BUB_VAULT_DOMAIN", global = true)]
    pub domain: Option<String>,

    /// Local port of the tunnel forwarding to Vault
    #[arg(long, env = "BUB_VAULT_PORT", global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: VaultCommand,
}

#[derive(Subcommand)]
pub enum VaultCommand {
    /// Read a secret and print its data as JSON
    Read {
        path: String,
        /// Print a single field instead of the whole payload
        #[arg(long)]
        field: Option<String>,
    },

    /// Write KEY=VALUE pairs to a path
    Write {
        path: String,
        #[arg(required = true, value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },

    /// Log in again and cache a fresh token
    Login,

    /// Remove the stored Vault username and password from the keychain
    Forget,

    /// Print where the token for this environment is cached
    TokenPath,
}

pub async fn run(args: VaultArgs, config: &Config) -> Result<()> {
    let settings = &config.vault;
    let VaultArgs { domain, port, command } = args;

    match command {
        VaultCommand::Forget => {
            KeyringCredentials::forget(settings.auth_method())?;
            eprintln!("Removed stored {} credentials.", settings.auth_method());
        }
        VaultCommand::TokenPath => {
            let tunnel = TunnelEndpoint::for_domain(&resolve_domain(domain, settings)?, 0);
            let store = TokenStore::default_location()?;
            println!("{}", store.token_path(tunnel.host_identity()).display());
        }
        VaultCommand::Login => {
            let tunnel = resolve_tunnel(domain, port, settings)?;
            let store = TokenStore::default_location()?;
            let token_path = store.token_path(tunnel.host_identity());
            SecretClient::connect_fresh(settings, &tunnel, store, credentials(settings))
                .await
                .map_err(|e| with_tunnel_hint(e, &tunnel))?;
            eprintln!("Token cached at {}", token_path.display());
        }
        VaultCommand::Read { path, field } => {
            let tunnel = resolve_tunnel(domain, port, settings)?;
            let mut client = connect(settings, &tunnel).await?;
            let secret = client.read(&path).await.map_err(|e| with_tunnel_hint(e, &tunnel))?;
            println!("{}", render_secret(&secret, field.as_deref())?);
        }
        VaultCommand::Write { path, pairs } => {
            let data: Map<String, Value> = pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
            let tunnel = resolve_tunnel(domain, port, settings)?;
            let mut client = connect(settings, &tunnel).await?;
            let ack = client
                .write(&path, &data)
                .await
                .map_err(|e| with_tunnel_hint(e, &tunnel))?;
            if let Some(ack) = ack.filter(|ack| !ack.data.is_empty()) {
                println!("{}", render_secret(&ack, None)?);
            }
        }
    }
    Ok(())
}

fn resolve_domain(domain: Option<String>, settings: &VaultConfig) -> Result<String> {
    domain
        .or_else(|| settings.domain.clone())
        .context("No Vault domain configured. Pass --domain or set vault.domain in the config file.")
}

fn resolve_tunnel(domain: Option<String>, port: Option<u16>, settings: &VaultConfig) -> Result<TunnelEndpoint> {
    let domain = resolve_domain(domain, settings)?;
    let port = port
        .or(settings.local_port)
        .context("No tunnel port given. Pass --port or set vault.localPort in the config file.")?;
    let tunnel = TunnelEndpoint::for_domain(&domain, port).with_remote_port(settings.remote_port);
    debug!(forward = %tunnel.ssh_forward_spec(), "Expecting Vault tunnel");
    Ok(tunnel)
}

fn credentials(settings: &VaultConfig) -> Box<KeyringCredentials> {
    Box::new(KeyringCredentials::from_env(settings.username.clone()))
}

async fn connect(settings: &VaultConfig, tunnel: &TunnelEndpoint) -> Result<SecretClient> {
    let store = TokenStore::default_location()?;
    SecretClient::connect(settings, tunnel, store, credentials(settings))
        .await
        .map_err(|e| with_tunnel_hint(e, tunnel))
}

fn with_tunnel_hint(e: VaultError, tunnel: &TunnelEndpoint) -> anyhow::Error {
    if e.kind() == ErrorKind::Connectivity {
        let hint = format!(
            "Vault is unreachable. Is a tunnel open, e.g. 'ssh -L {} <jumphost>'?",
            tunnel.ssh_forward_spec()
        );
        anyhow::Error::new(e).context(hint)
    } else {
        e.into()
    }
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn render_secret(secret: &Secret, field: Option<&str>) -> Result<String> {
    match field {
        Some(field) => match secret.get(field) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(value) => Ok(value.to_string()),
            None => bail!("Field '{}' not found at '{}'", field, secret.path),
        },
        None => Ok(serde_json::to_string_pretty(&secret.data)?),
    }
}
