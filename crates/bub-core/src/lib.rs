//! Core library for bub.
//!
//! Houses the Vault session client along with the credential, configuration
//! and tunnel plumbing it depends on. The `bub` binary wires these together.

pub mod auth;
pub mod config;
pub mod tunnel;
pub mod vault;

pub use config::{Config, VaultConfig};
pub use tunnel::TunnelEndpoint;
pub use vault::{SecretClient, TokenStore, VaultError};
