use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Could not reach Vault at {address}")]
    Connectivity {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Could not resolve Vault credentials: {0}")]
    Credentials(String),

    #[error("Permission denied: {0}")]
    Authorization(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Invalid request (status {status}): {body}")]
    Request { status: u16, body: String },

    #[error("Server error (status {status}): {body}")]
    Server { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist token to {}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No session token attached to the client")]
    MissingToken,

    #[error("Vault session is no longer usable after a failed re-authentication")]
    SessionFailed,

    #[error("Invalid Vault configuration: {0}")]
    Config(String),
}

/// Coarse classification used to decide whether a failure is recoverable
/// through re-authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The presented token was denied.
    Authorization,
    /// Credentials were rejected or produced no token.
    Authentication,
    Connectivity,
    NotFound,
    Request,
    Other,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl VaultError {
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success HTTP status from Vault to an error.
    pub fn from_status(status: reqwest::StatusCode, body: &str, path: &str) -> Self {
        let truncated = Self::truncate_body(body.trim());
        match status.as_u16() {
            401 | 403 => VaultError::Authorization(truncated),
            404 => VaultError::NotFound(path.to_string()),
            code @ 400..=499 => VaultError::Request {
                status: code,
                body: truncated,
            },
            code @ 500..=599 => VaultError::Server {
                status: code,
                body: truncated,
            },
            _ => VaultError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Authorization(_) => ErrorKind::Authorization,
            VaultError::Authentication(_) | VaultError::Credentials(_) => ErrorKind::Authentication,
            VaultError::Connectivity { .. } => ErrorKind::Connectivity,
            VaultError::NotFound(_) => ErrorKind::NotFound,
            VaultError::Request { .. } => ErrorKind::Request,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_authorization(&self) -> bool {
        self.kind() == ErrorKind::Authorization
    }
}
