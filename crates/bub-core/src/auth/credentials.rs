use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "bub";

/// Items such as `Vault/Okta Password`, kept in the OS keychain.
pub struct CredentialStore;

impl CredentialStore {
    pub fn store(item: &str, value: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, item).context("Failed to create keyring entry")?;
        entry
            .set_password(value)
            .with_context(|| format!("Failed to store '{}' in keychain", item))?;
        Ok(())
    }

    /// Look up an item; a missing entry is `None` rather than an error.
    pub fn get(item: &str) -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, item).context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to retrieve '{}' from keychain", item)),
        }
    }

    pub fn delete(item: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, item).context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete '{}' from keychain", item)),
        }
    }
}
