//! Addressing for Vault behind an SSH tunnel.
//!
//! bub does not open tunnels itself; it is handed the local port of one
//! forwarding to `vault.<domain>`.

/// Port Vault listens on at the remote end.
pub const VAULT_REMOTE_PORT: u16 = 8200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelEndpoint {
    pub remote_host: String,
    pub remote_port: u16,
    pub local_port: u16,
}

impl TunnelEndpoint {
    pub fn new(remote_host: impl Into<String>, remote_port: u16, local_port: u16) -> Self {
        Self {
            remote_host: remote_host.into(),
            remote_port,
            local_port,
        }
    }

    /// Tunnel to the Vault host of an environment domain.
    pub fn for_domain(domain: &str, local_port: u16) -> Self {
        let domain = domain.trim().trim_start_matches('.');
        Self::new(format!("vault.{}", domain), VAULT_REMOTE_PORT, local_port)
    }

    pub fn with_remote_port(mut self, remote_port: u16) -> Self {
        self.remote_port = remote_port;
        self
    }

    /// Identity used to key cached tokens.
    pub fn host_identity(&self) -> &str {
        &self.remote_host
    }

    /// Base address for HTTP calls, e.g. `http://127.0.0.1:18200`.
    pub fn local_address(&self, server: &str) -> String {
        format!("{}:{}", server.trim().trim_end_matches('/'), self.local_port)
    }

    /// `-L` argument for `ssh` that would establish this tunnel.
    pub fn ssh_forward_spec(&self) -> String {
        format!("{}:{}:{}", self.local_port, self.remote_host, self.remote_port)
    }
}

/// Ask the OS for a currently unused local port, giving tests an address
/// nothing listens on.
#[cfg(test)]
pub(crate) fn free_local_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
