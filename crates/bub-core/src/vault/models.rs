use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Username/password pair for a Vault auth method.
///
/// Held in memory only for the duration of an authentication attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub auth_method: String,
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(
        auth_method: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            auth_method: auth_method.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Login path, e.g. `auth/okta/login/alice`.
    pub fn login_path(&self) -> String {
        format!("auth/{}/login/{}", self.auth_method, self.username).to_lowercase()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("auth_method", &self.auth_method)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A Vault client token and the remote host it was issued for.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub value: String,
    pub owner_host_identity: String,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, owner_host_identity: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            owner_host_identity: owner_host_identity.into(),
        }
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("owner_host_identity", &self.owner_host_identity)
            .finish()
    }
}

/// A secret payload returned by a read or write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub path: String,
    pub data: Map<String, Value>,
}

impl Secret {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Generic Vault response envelope.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SecretResponse {
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub auth: Option<AuthInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthInfo {
    #[serde(default)]
    pub client_token: String,
}

impl SecretResponse {
    /// Token carried by a login response, falling back to the `id` field of
    /// a token lookup response.
    pub fn token_id(&self) -> Option<&str> {
        if let Some(auth) = &self.auth {
            if !auth.client_token.is_empty() {
                return Some(auth.client_token.as_str());
            }
        }
        self.data
            .as_ref()
            .and_then(|data| data.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn into_secret(self, path: &str) -> Secret {
        Secret {
            path: path.to_string(),
            data: self.data.unwrap_or_default(),
        }
    }
}
