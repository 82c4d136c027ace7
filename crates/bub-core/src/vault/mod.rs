//! Vault session client.
//!
//! This module provides:
//! - `TokenStore`: plain-text token cache, one file per Vault host
//! - `AuthenticationFlow`: username/password login for a fresh token
//! - `SecretClient`: read/write with re-authentication when a token is denied
//!
//! Vault is reached through an SSH tunnel, so the HTTP address is always a
//! local port while tokens are keyed by the remote host name.

pub(crate) mod api;
pub mod client;
pub mod error;
pub mod login;
pub mod models;
pub mod token_store;

pub use api::VaultApi;
pub use client::{ClientSession, SecretClient, SessionState, DEFAULT_RETRIES};
pub use error::{ErrorKind, VaultError};
pub use login::AuthenticationFlow;
pub use models::{Credential, Secret, SessionToken};
pub use token_store::TokenStore;
