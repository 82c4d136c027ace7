//! Credential resolution for services bub logs into.
//!
//! This module provides:
//! - `CredentialStore`: OS-level secret storage via keyring
//! - `CredentialProvider`: source of a username/password when a login is needed
//!
//! Setting `BUB_UPDATE_CREDENTIALS=1` discards stored values and prompts again.

pub mod credentials;
pub mod provider;

pub use credentials::CredentialStore;
pub use provider::{
    env_var_name, reset_requested, CredentialProvider, KeyringCredentials, StaticCredentials,
    RESET_CREDENTIALS_ENV,
};
