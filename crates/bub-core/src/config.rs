//! Application configuration management.
//!
//! Configuration is stored at `~/.config/bub/config.json` (or the platform
//! equivalent). Vault tokens are cached in the same directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tunnel::VAULT_REMOTE_PORT;
use crate::vault::api::REQUEST_TIMEOUT_SECS;

/// Application name used for config directory paths
const APP_NAME: &str = "bub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Auth method used when none is configured
pub const DEFAULT_AUTH_METHOD: &str = "Okta";

const DEFAULT_VAULT_SERVER: &str = "http://127.0.0.1";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub vault: VaultConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VaultConfig {
    /// Scheme and host of the local end of the tunnel, without port.
    pub server: String,
    pub auth_method: String,
    /// Environment domain; the remote host is `vault.<domain>`.
    pub domain: Option<String>,
    pub remote_port: u16,
    /// Local port of an already established tunnel.
    pub local_port: Option<u16>,
    pub username: Option<String>,
    /// Per-request timeout for Vault calls.
    pub request_timeout_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_VAULT_SERVER.to_string(),
            auth_method: DEFAULT_AUTH_METHOD.to_string(),
            domain: None,
            remote_port: VAULT_REMOTE_PORT,
            local_port: None,
            username: None,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

impl VaultConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn auth_method(&self) -> &str {
        if self.auth_method.trim().is_empty() {
            DEFAULT_AUTH_METHOD
        } else {
            &self.auth_method
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            debug!(path = %path.display(), "Loaded configuration");
            Ok(config)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }
}
