//! Thin HTTP binding to the Vault v1 API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use tracing::debug;

use super::models::SecretResponse;
use super::VaultError;

/// Default HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const TOKEN_HEADER: &str = "X-Vault-Token";

const API_VERSION: &str = "v1";

const LOOKUP_SELF_PATH: &str = "auth/token/lookup-self";

/// Clone is cheap - reqwest::Client uses Arc internally.
#[derive(Debug, Clone)]
pub struct VaultApi {
    client: Client,
    address: String,
}

impl VaultApi {
    pub fn new(address: &str) -> Result<Self, VaultError> {
        Self::with_timeout(address, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Requests exceeding `timeout` fail as connectivity errors.
    pub fn with_timeout(address: &str, timeout: Duration) -> Result<Self, VaultError> {
        let address = address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(VaultError::Config("Vault address cannot be empty".to_string()));
        }
        Url::parse(address)
            .map_err(|e| VaultError::Config(format!("invalid Vault address '{}': {}", address, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.address, API_VERSION, path.trim_start_matches('/'))
    }

    fn require_token(token: &str) -> Result<&str, VaultError> {
        if token.is_empty() {
            Err(VaultError::MissingToken)
        } else {
            Ok(token)
        }
    }

    pub(crate) async fn read(&self, token: &str, path: &str) -> Result<Option<SecretResponse>, VaultError> {
        let token = Self::require_token(token)?;
        let request = self.client.get(self.url(path)).header(TOKEN_HEADER, token);
        self.send(request, path).await
    }

    pub(crate) async fn write<B: Serialize + ?Sized>(
        &self,
        token: &str,
        path: &str,
        body: &B,
    ) -> Result<Option<SecretResponse>, VaultError> {
        let token = Self::require_token(token)?;
        let request = self
            .client
            .put(self.url(path))
            .header(TOKEN_HEADER, token)
            .json(body);
        self.send(request, path).await
    }

    /// Unauthenticated write used by login endpoints.
    pub(crate) async fn login<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<SecretResponse>, VaultError> {
        let request = self.client.post(self.url(path)).json(body);
        self.send(request, path).await
    }

    /// Introspect the token itself. Denial here means the token is no good.
    pub(crate) async fn lookup_self(&self, token: &str) -> Result<Option<SecretResponse>, VaultError> {
        self.read(token, LOOKUP_SELF_PATH).await
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Option<SecretResponse>, VaultError> {
        let response = request.send().await.map_err(|source| VaultError::Connectivity {
            address: self.address.clone(),
            source,
        })?;

        let status = response.status();
        debug!(path = path, status = status.as_u16(), "Vault response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::from_status(status, &body, path));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = response.text().await.map_err(|source| VaultError::Connectivity {
            address: self.address.clone(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| VaultError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }
}
