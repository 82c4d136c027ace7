use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use tracing::debug;

use super::CredentialStore;
use crate::vault::Credential;

/// Environment flag forcing stored usernames/passwords to be prompted again.
pub const RESET_CREDENTIALS_ENV: &str = "BUB_UPDATE_CREDENTIALS";

/// Placeholder prefix used in sample configs for values left unset.
const PLACEHOLDER_PREFIX: &str = "<optional-";

/// Supplies a credential whenever a login is about to happen.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self, auth_method: &str) -> Result<Credential>;
}

/// Always hands out the same credential.
pub struct StaticCredentials {
    credential: Credential,
}

impl StaticCredentials {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self, _auth_method: &str) -> Result<Credential> {
        Ok(self.credential.clone())
    }
}

/// Resolves each item from, in order: the environment, the config file,
/// the OS keychain, and finally an interactive prompt whose answer is
/// stored in the keychain.
pub struct KeyringCredentials {
    username: Option<String>,
    reset: AtomicBool,
}

impl KeyringCredentials {
    pub fn new(configured_username: Option<String>, reset: bool) -> Self {
        Self {
            username: configured_username,
            reset: AtomicBool::new(reset),
        }
    }

    pub fn from_env(configured_username: Option<String>) -> Self {
        Self::new(configured_username, reset_requested())
    }

    fn item(auth_method: &str, field: &str) -> String {
        format!("Vault/{} {}", auth_method, field)
    }

    /// Remove stored username and password for an auth method.
    pub fn forget(auth_method: &str) -> Result<()> {
        CredentialStore::delete(&Self::item(auth_method, "Username"))?;
        CredentialStore::delete(&Self::item(auth_method, "Password"))
    }

    fn resolve(&self, item: &str, configured: Option<&str>, reset: bool) -> Result<String> {
        if reset {
            return prompt_and_store(item);
        }

        if let Ok(value) = std::env::var(env_var_name(item)) {
            if !value.is_empty() {
                debug!(item = item, "Using credential from environment");
                return Ok(value);
            }
        }

        if let Some(value) = configured.filter(|v| !v.is_empty() && !v.starts_with(PLACEHOLDER_PREFIX)) {
            return Ok(value.to_string());
        }

        match CredentialStore::get(item)? {
            Some(value) => Ok(value),
            None => prompt_and_store(item),
        }
    }
}

impl CredentialProvider for KeyringCredentials {
    fn credential(&self, auth_method: &str) -> Result<Credential> {
        // Only the first login of a run re-prompts.
        let reset = self.reset.swap(false, Ordering::SeqCst);
        let username = self.resolve(
            &Self::item(auth_method, "Username"),
            self.username.as_deref(),
            reset,
        )?;
        let password = self.resolve(&Self::item(auth_method, "Password"), None, reset)?;
        Ok(Credential::new(auth_method, username, password))
    }
}

/// Whether `BUB_UPDATE_CREDENTIALS` asks for fresh credentials.
pub fn reset_requested() -> bool {
    std::env::var(RESET_CREDENTIALS_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Environment variable overriding an item, e.g.
/// `Vault/Okta Username` -> `VAULT_OKTA_USERNAME`.
pub fn env_var_name(item: &str) -> String {
    item.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn prompt_and_store(item: &str) -> Result<String> {
    let value = prompt(item)?;
    CredentialStore::store(item, &value)?;
    Ok(value)
}

fn prompt(item: &str) -> Result<String> {
    let label = format!("Enter {}: ", item);
    let value = if item.to_lowercase().ends_with("password") {
        rpassword::prompt_password(&label).context("Failed to read password")?
    } else {
        let mut stderr = io::stderr();
        stderr.write_all(label.as_bytes())?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        line.trim().to_string()
    };

    if value.is_empty() {
        bail!("{} cannot be empty", item);
    }
    Ok(value)
}
