use serde_json::json;
use tracing::{error, info, warn};

use super::api::VaultApi;
use super::{Credential, SessionToken, TokenStore, VaultError};
use crate::auth::RESET_CREDENTIALS_ENV;

/// One-shot exchange of a username/password for a Vault token.
///
/// Never retries on its own; recovering from an expired token is the
/// caller's business.
#[derive(Debug, Clone)]
pub struct AuthenticationFlow {
    store: TokenStore,
}

impl AuthenticationFlow {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Log in with `credential` and cache the resulting token for `host_identity`.
    ///
    /// The credential is consumed and dropped once the login call returns.
    pub async fn authenticate(
        &self,
        credential: Credential,
        api: &VaultApi,
        host_identity: &str,
    ) -> Result<SessionToken, VaultError> {
        let path = credential.login_path();
        info!(path = %path, address = api.address(), "Authenticating with Vault");

        let body = json!({ "password": credential.password });

        let response = match api.login(&path, &body).await {
            Ok(response) => response,
            Err(e @ VaultError::Connectivity { .. }) => {
                error!(error = %e, "Vault is unreachable, is the tunnel up?");
                return Err(e);
            }
            Err(VaultError::Authorization(reason)) | Err(VaultError::Request { body: reason, .. }) => {
                return Err(authentication_failure(&format!("credentials rejected: {}", reason)));
            }
            Err(VaultError::InvalidResponse(reason)) => {
                return Err(authentication_failure(&format!("malformed login response: {}", reason)));
            }
            Err(VaultError::NotFound(_)) => {
                return Err(authentication_failure(&format!("auth method is not enabled at '{}'", path)));
            }
            Err(e) => return Err(e),
        };

        let value = match response.as_ref().and_then(|r| r.token_id()) {
            Some(value) => value.to_string(),
            None => return Err(authentication_failure("login response did not contain a token")),
        };

        let token = SessionToken::new(value, host_identity);
        if let Err(e) = self.store.save(&token) {
            // The in-memory token still works for this process.
            warn!(error = %e, "Could not cache Vault token; the next run will log in again");
        }
        Ok(token)
    }
}

fn authentication_failure(reason: &str) -> VaultError {
    let hint = reset_hint();
    warn!("Authentication Failure.");
    warn!("{}", hint);
    VaultError::Authentication(format!("{}. {}", reason, hint))
}

/// Guidance for resetting stored credentials, using the current command line.
pub fn reset_hint() -> String {
    let args: Vec<String> = std::env::args().collect();
    format!(
        "Run '{}=1 {}' to change your credentials.",
        RESET_CREDENTIALS_ENV,
        args.join(" ")
    )
}
