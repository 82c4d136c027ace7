//! Vault session client with transparent re-authentication.
//!
//! The client optimistically uses a cached token. When a call fails it asks
//! Vault whether the token itself is still valid; only an explicit denial
//! triggers a fresh login. Every logical operation gets a fixed number of
//! attempts.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::api::VaultApi;
use super::models::SecretResponse;
use super::{AuthenticationFlow, ErrorKind, Secret, SessionToken, TokenStore, VaultError};
use crate::auth::CredentialProvider;
use crate::config::VaultConfig;
use crate::tunnel::TunnelEndpoint;

/// Extra attempts after the first one, per read or write.
pub const DEFAULT_RETRIES: u32 = 2;

/// Lifecycle of a connected client. Initial authentication happens inside
/// `connect`, so a constructed client starts out `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Reauthenticating,
    /// A fresh login failed; the client refuses further calls.
    Failed,
}

#[derive(Debug, Clone)]
pub struct ClientSession {
    pub base_address: String,
    pub token: SessionToken,
    pub auth_method: String,
}

enum Operation<'a> {
    Read(&'a str),
    Write(&'a str, &'a Map<String, Value>),
}

impl Operation<'_> {
    fn path(&self) -> &str {
        match self {
            Operation::Read(path) | Operation::Write(path, _) => *path,
        }
    }
}

pub struct SecretClient {
    api: VaultApi,
    flow: AuthenticationFlow,
    credentials: Box<dyn CredentialProvider>,
    session: ClientSession,
    state: SessionState,
    retries: u32,
}

impl SecretClient {
    /// Open a session, reusing the cached token for the tunnel's host when present.
    pub async fn connect(
        config: &VaultConfig,
        tunnel: &TunnelEndpoint,
        store: TokenStore,
        credentials: Box<dyn CredentialProvider>,
    ) -> Result<Self, VaultError> {
        Self::open(config, tunnel, store, credentials, true).await
    }

    /// Open a session with a fresh login, ignoring any cached token.
    pub async fn connect_fresh(
        config: &VaultConfig,
        tunnel: &TunnelEndpoint,
        store: TokenStore,
        credentials: Box<dyn CredentialProvider>,
    ) -> Result<Self, VaultError> {
        Self::open(config, tunnel, store, credentials, false).await
    }

    async fn open(
        config: &VaultConfig,
        tunnel: &TunnelEndpoint,
        store: TokenStore,
        credentials: Box<dyn CredentialProvider>,
        use_cache: bool,
    ) -> Result<Self, VaultError> {
        let api = VaultApi::with_timeout(&tunnel.local_address(&config.server), config.request_timeout())?;
        let auth_method = config.auth_method().to_string();
        let host_identity = tunnel.host_identity();
        let flow = AuthenticationFlow::new(store);

        let cached = if use_cache {
            match flow.store().load(host_identity) {
                Ok(token) => token,
                Err(e) => {
                    warn!(error = %e, "Could not read cached Vault token, logging in again");
                    None
                }
            }
        } else {
            None
        };

        let token = match cached {
            Some(token) => {
                debug!(host = host_identity, "Using cached Vault token");
                token
            }
            None => {
                let credential = credentials
                    .credential(&auth_method)
                    .map_err(|e| VaultError::Credentials(format!("{:#}", e)))?;
                flow.authenticate(credential, &api, host_identity).await?
            }
        };

        Ok(Self {
            session: ClientSession {
                base_address: api.address().to_string(),
                token,
                auth_method,
            },
            api,
            flow,
            credentials,
            state: SessionState::Ready,
            retries: DEFAULT_RETRIES,
        })
    }

    /// Override the number of extra attempts per operation.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn address(&self) -> &str {
        self.api.address()
    }

    pub async fn read(&mut self, path: &str) -> Result<Secret, VaultError> {
        info!("Reading from '{}' on '{}'", path, self.address());
        match self.run(Operation::Read(path)).await? {
            Some(response) => Ok(response.into_secret(path)),
            None => Err(VaultError::NotFound(path.to_string())),
        }
    }

    /// Write `data` to `path`. Vault often acknowledges with an empty body.
    pub async fn write(
        &mut self,
        path: &str,
        data: &Map<String, Value>,
    ) -> Result<Option<Secret>, VaultError> {
        info!("Writing to '{}' on '{}'", path, self.address());
        let response = self.run(Operation::Write(path, data)).await?;
        Ok(response.map(|r| r.into_secret(path)))
    }

    /// Log in again unconditionally and replace the cached token.
    pub async fn login(&mut self) -> Result<&SessionToken, VaultError> {
        self.reauthenticate().await?;
        Ok(&self.session.token)
    }

    async fn issue(&self, operation: &Operation<'_>) -> Result<Option<SecretResponse>, VaultError> {
        let token = self.session.token.value.as_str();
        match operation {
            Operation::Read(path) => self.api.read(token, path).await,
            Operation::Write(path, data) => self.api.write(token, path, data).await,
        }
    }

    async fn run(&mut self, operation: Operation<'_>) -> Result<Option<SecretResponse>, VaultError> {
        if self.state == SessionState::Failed {
            return Err(VaultError::SessionFailed);
        }

        let mut remaining = self.retries;
        loop {
            let err = match self.issue(&operation).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            if remaining == 0 {
                return Err(err);
            }
            remaining -= 1;
            debug!(path = operation.path(), error = %err, remaining, "Vault call failed");

            match self.maybe_reauthenticate().await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Authentication => return Err(e),
                Err(e) => warn!(error = %e, "Could not verify Vault token"),
            }
        }
    }

    /// Re-authenticate only if Vault denies the current token outright.
    async fn maybe_reauthenticate(&mut self) -> Result<(), VaultError> {
        match self.api.lookup_self(&self.session.token.value).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_authorization() => self.reauthenticate().await,
            Err(e) => Err(e),
        }
    }

    async fn reauthenticate(&mut self) -> Result<(), VaultError> {
        info!("Trying to renew token...");
        self.state = SessionState::Reauthenticating;

        let result = match self.credentials.credential(&self.session.auth_method) {
            Ok(credential) => {
                self.flow
                    .authenticate(credential, &self.api, &self.session.token.owner_host_identity)
                    .await
            }
            Err(e) => Err(VaultError::Credentials(format!("{:#}", e))),
        };

        match result {
            Ok(token) => {
                self.session.token = token;
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = if e.kind() == ErrorKind::Authentication {
                    SessionState::Failed
                } else {
                    SessionState::Ready
                };
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::StaticCredentials;
    use crate::vault::Credential;

    const HOST: &str = "vault.stg";
    const TOKEN_HEADER: &str = "X-Vault-Token";

    struct Fixture {
        _dir: TempDir,
        store: TokenStore,
        config: VaultConfig,
        tunnel: TunnelEndpoint,
        prompts: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new(server: &MockServer) -> Self {
            let dir = TempDir::new().expect("temp dir");
            let store = TokenStore::new(dir.path());
            let config = VaultConfig {
                server: "http://127.0.0.1".to_string(),
                ..VaultConfig::default()
            };
            let tunnel = TunnelEndpoint::for_domain("stg", server.address().port());
            Self {
                _dir: dir,
                store,
                config,
                tunnel,
                prompts: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn cache(&self, value: &str) {
            self.store.save(&SessionToken::new(value, HOST)).expect("seed token");
        }

        fn cached(&self) -> Option<String> {
            self.store.load(HOST).expect("load token").map(|t| t.value)
        }

        async fn connect(&self) -> Result<SecretClient, VaultError> {
            let credentials = CountingCredentials {
                inner: StaticCredentials::new(Credential::new("Okta", "alice", "p")),
                calls: Arc::clone(&self.prompts),
            };
            SecretClient::connect(&self.config, &self.tunnel, self.store.clone(), Box::new(credentials)).await
        }
    }

    struct CountingCredentials {
        inner: StaticCredentials,
        calls: Arc<AtomicUsize>,
    }

    impl CredentialProvider for CountingCredentials {
        fn credential(&self, auth_method: &str) -> anyhow::Result<Credential> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.credential(auth_method)
        }
    }

    fn denied() -> ResponseTemplate {
        ResponseTemplate::new(403).set_body_json(json!({ "errors": ["permission denied"] }))
    }

    fn login_returns(token: &str) -> Mock {
        Mock::given(method("POST"))
            .and(path("/v1/auth/okta/login/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth": { "client_token": token } })))
    }

    fn secret_db() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "data": { "username": "db", "password": "s3cret" } }))
    }

    #[tokio::test]
    async fn test_cached_token_is_used_without_login() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("abc");

        Mock::given(method("GET"))
            .and(path("/v1/secret/db"))
            .and(header(TOKEN_HEADER, "abc"))
            .respond_with(secret_db())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/secret/app"))
            .and(header(TOKEN_HEADER, "abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        login_returns("unused").expect(0).mount(&server).await;

        let mut client = fixture.connect().await.expect("connect");
        assert_eq!(client.state(), SessionState::Ready);

        let secret = client.read("secret/db").await.expect("read");
        assert_eq!(secret.path, "secret/db");
        assert_eq!(secret.get("password"), Some(&json!("s3cret")));

        let mut data = Map::new();
        data.insert("key".to_string(), json!("value"));
        let ack = client.write("secret/app", &data).await.expect("write");
        assert_eq!(ack, None);

        assert_eq!(fixture.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_logs_in_on_connect() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        login_returns("fresh").expect(1).mount(&server).await;

        let client = fixture.connect().await.expect("connect");
        assert_eq!(client.session().token.value, "fresh");
        assert_eq!(client.session().auth_method, "Okta");
        assert_eq!(fixture.cached().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_denied_token_is_renewed_once() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("abc");

        Mock::given(method("GET"))
            .and(path("/v1/secret/db"))
            .and(header(TOKEN_HEADER, "abc"))
            .respond_with(denied())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .and(header(TOKEN_HEADER, "abc"))
            .respond_with(denied())
            .expect(1)
            .mount(&server)
            .await;
        login_returns("xyz").expect(1).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/db"))
            .and(header(TOKEN_HEADER, "xyz"))
            .respond_with(secret_db())
            .expect(1)
            .mount(&server)
            .await;

        let mut client = fixture.connect().await.expect("connect");
        let secret = client.read("secret/db").await.expect("read after renewal");

        assert_eq!(secret.get("username"), Some(&json!("db")));
        assert_eq!(client.session().token.value, "xyz");
        assert_eq!(client.state(), SessionState::Ready);
        assert_eq!(fixture.cached().as_deref(), Some("xyz"));
        assert_eq!(fixture.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded_when_every_token_is_denied() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("abc");

        Mock::given(method("GET"))
            .and(path("/v1/secret/db"))
            .respond_with(denied())
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .respond_with(denied())
            .expect(2)
            .mount(&server)
            .await;
        login_returns("new").expect(2).mount(&server).await;

        let mut client = fixture.connect().await.expect("connect");
        let err = client.read("secret/db").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(client.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_not_found_never_triggers_login() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("abc");

        Mock::given(method("GET"))
            .and(path("/v1/secret/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": "abc" } })))
            .expect(2)
            .mount(&server)
            .await;
        login_returns("unused").expect(0).mount(&server).await;

        let mut client = fixture.connect().await.expect("connect");
        let err = client.read("secret/missing").await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(ref p) if p == "secret/missing"));
        assert_eq!(fixture.cached().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_policy_denial_with_valid_token_is_surfaced() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("abc");

        Mock::given(method("PUT"))
            .and(path("/v1/secret/forbidden"))
            .respond_with(denied())
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": "abc" } })))
            .expect(1)
            .mount(&server)
            .await;
        login_returns("unused").expect(0).mount(&server).await;

        let mut client = fixture.connect().await.expect("connect").with_retries(1);
        let err = client.write("secret/forbidden", &Map::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn test_failed_reauthentication_is_terminal() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("abc");

        Mock::given(method("GET"))
            .and(path("/v1/secret/db"))
            .respond_with(denied())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .respond_with(denied())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/okta/login/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "auth": null })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = fixture.connect().await.expect("connect");
        let err = client.read("secret/db").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(client.state(), SessionState::Failed);

        let err = client.read("secret/db").await.unwrap_err();
        assert!(matches!(err, VaultError::SessionFailed));
        assert_eq!(fixture.cached().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_malformed_login_response_is_terminal() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("abc");

        Mock::given(method("GET"))
            .and(path("/v1/secret/db"))
            .respond_with(denied())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .respond_with(denied())
            .expect(1)
            .mount(&server)
            .await;
        // An intercepting proxy answering in place of Vault.
        Mock::given(method("POST"))
            .and(path("/v1/auth/okta/login/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = fixture.connect().await.expect("connect");
        let err = client.read("secret/db").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(client.state(), SessionState::Failed);
        assert_eq!(fixture.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.cached().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_login_timeout_keeps_original_error() {
        let server = MockServer::start().await;
        let mut fixture = Fixture::new(&server);
        fixture.config.request_timeout_secs = 1;
        fixture.cache("abc");

        Mock::given(method("GET"))
            .and(path("/v1/secret/db"))
            .respond_with(denied())
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .respond_with(denied())
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/okta/login/alice"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "auth": { "client_token": "late" } }))
                    .set_delay(Duration::from_secs(5)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let mut client = fixture.connect().await.expect("connect");
        let err = client.read("secret/db").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(client.state(), SessionState::Ready);
        assert_eq!(client.session().token.value, "abc");
        assert_eq!(fixture.cached().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_unreachable_vault_surfaces_connectivity_error() {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path());
        store.save(&SessionToken::new("abc", HOST)).unwrap();
        let port = crate::tunnel::free_local_port().unwrap();
        let tunnel = TunnelEndpoint::for_domain("stg", port);
        let credentials = StaticCredentials::new(Credential::new("Okta", "alice", "p"));

        let mut client = SecretClient::connect(&VaultConfig::default(), &tunnel, store, Box::new(credentials))
            .await
            .expect("cached token needs no network");
        let err = client.read("secret/db").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert_eq!(client.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_login_replaces_cached_token() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("abc");
        login_returns("xyz").expect(1).mount(&server).await;

        let mut client = fixture.connect().await.expect("connect");
        let token = client.login().await.expect("login");
        assert_eq!(token.value, "xyz");
        assert_eq!(fixture.cached().as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn test_connect_fresh_ignores_cache() {
        let server = MockServer::start().await;
        let fixture = Fixture::new(&server);
        fixture.cache("stale");
        login_returns("xyz").expect(1).mount(&server).await;

        let client = SecretClient::connect_fresh(
            &fixture.config,
            &fixture.tunnel,
            fixture.store.clone(),
            Box::new(StaticCredentials::new(Credential::new("Okta", "alice", "p"))),
        )
        .await
        .expect("connect");
        assert_eq!(client.session().token.value, "xyz");
        assert_eq!(fixture.cached().as_deref(), Some("xyz"));
    }
}
