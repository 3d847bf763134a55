//! Authorization orchestrator: cached token → refresh → interactive PKCE.

use std::time::Duration;

use {
    tokio::sync::Mutex,
    tracing::{info, warn},
};

use crate::{
    callback_server::CallbackServer,
    error::AuthError,
    exchange::{TokenClient, now_epoch},
    launcher::{BrowserLauncher, SystemBrowser},
    pkce,
    storage::TokenStore,
    types::{OAuthConfig, PkceSession, TokenRecord},
};

const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(180);

/// Everything a caller needs to drive one interactive authorization: the URL
/// to present and the PKCE material bound to it.
pub struct AuthRequest {
    pub url: String,
    pub session: PkceSession,
}

/// Owns the one live [`TokenRecord`] and decides, per call, whether a cached
/// token suffices, a refresh does, or a full interactive round-trip is
/// needed.
///
/// The in-memory slot sits behind a mutex that is held across the whole
/// decision ladder, so a second concurrent `get_user_token` waits for the
/// first instead of racing into a duplicate browser flow (and a duplicate
/// bind of the callback port).
pub struct OAuthFlow {
    client: TokenClient,
    store: TokenStore,
    key: String,
    cached: Mutex<Option<TokenRecord>>,
    launcher: Box<dyn BrowserLauncher>,
    callback_timeout: Duration,
}

impl OAuthFlow {
    pub fn new(key: impl Into<String>, config: OAuthConfig, store: TokenStore) -> Self {
        let key = key.into();
        Self {
            client: TokenClient::new(key.clone(), config, store.clone()),
            store,
            key,
            cached: Mutex::new(None),
            launcher: Box::new(SystemBrowser),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }

    pub fn with_launcher(mut self, launcher: Box<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Fresh PKCE session plus the authorization URL carrying its challenge.
    pub fn start(&self) -> Result<AuthRequest, AuthError> {
        let session = pkce::new_session()?;
        let url = self.authorization_url(&session);
        Ok(AuthRequest { url, session })
    }

    /// The caller contract: a currently valid bearer token, by whatever means
    /// are cheapest.
    ///
    /// In order: the in-memory record, the persisted record, a refresh-token
    /// renewal, and finally one interactive browser round-trip. A failed
    /// refresh is never surfaced; it falls through to the interactive path.
    pub async fn get_user_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        let now = now_epoch();

        if let Some(record) = cached.as_ref() {
            if record.is_valid_at(now) {
                return Ok(record.access_token.clone());
            }
        }

        if cached.is_none() {
            *cached = self.store.load(&self.key)?;
        }
        if let Some(record) = cached.as_ref() {
            if record.is_valid_at(now) {
                return Ok(record.access_token.clone());
            }
        }

        if let Some(refresh_token) = cached.as_ref().and_then(|r| r.refresh_token.clone()) {
            match self.client.refresh(&refresh_token).await {
                Ok(record) => {
                    let token = record.access_token.clone();
                    *cached = Some(record);
                    return Ok(token);
                },
                Err(err) => {
                    warn!(error = %err, "token refresh failed; falling back to interactive authorization");
                },
            }
        }

        let record = self.interactive().await?;
        let token = record.access_token.clone();
        *cached = Some(record);
        Ok(token)
    }

    /// Force one interactive round-trip regardless of cached state.
    pub async fn authorize(&self) -> Result<TokenRecord, AuthError> {
        let mut cached = self.cached.lock().await;
        let record = self.interactive().await?;
        *cached = Some(record.clone());
        Ok(record)
    }

    async fn interactive(&self) -> Result<TokenRecord, AuthError> {
        let config = self.client.config();
        if config.client_id.is_empty() {
            return Err(AuthError::Configuration(
                "client_id is required for interactive authorization",
            ));
        }
        if config.redirect_uri.is_empty() {
            return Err(AuthError::Configuration(
                "redirect_uri is required for interactive authorization",
            ));
        }
        let port = config.callback_port()?;

        let request = self.start()?;
        if let Err(err) = self.launcher.open(&request.url) {
            info!(error = %err, url = %request.url, "could not launch a browser; open the authorization URL manually");
        }

        info!(port, "waiting for the authorization callback");
        let code = CallbackServer::wait_for_code(
            port,
            request.session.state.clone(),
            self.callback_timeout,
        )
        .await?;

        self.client.exchange(&code, &request.session.verifier).await
    }

    fn authorization_url(&self, session: &PkceSession) -> String {
        let config = self.client.config();
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&code_challenge_method=S256&code_challenge={}&scope={}&state={}",
            config.auth_url,
            pkce::percent_encode(&config.client_id),
            pkce::percent_encode(&config.redirect_uri),
            pkce::percent_encode(&session.challenge),
            pkce::percent_encode(&config.scope_string()),
            pkce::percent_encode(&session.state),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex as StdMutex},
    };

    use {
        tokio::io::{AsyncReadExt, AsyncWriteExt},
        tokio::net::TcpStream,
    };

    use super::*;

    /// Launcher double that records the presented URL instead of opening it.
    #[derive(Clone, Default)]
    struct CapturingLauncher(Arc<StdMutex<Option<String>>>);

    impl BrowserLauncher for CapturingLauncher {
        fn open(&self, url: &str) -> io::Result<()> {
            *self.0.lock().unwrap() = Some(url.to_string());
            Ok(())
        }
    }

    fn config(client_id: &str, token_url: &str, redirect_uri: &str) -> OAuthConfig {
        OAuthConfig {
            client_id: client_id.into(),
            auth_url: "https://accounts.example.com/authorize".into(),
            token_url: token_url.into(),
            redirect_uri: redirect_uri.into(),
            scopes: vec!["user-read-playback-state".into()],
        }
    }

    fn record(access: &str, refresh: Option<&str>, expires_at: u64) -> TokenRecord {
        TokenRecord {
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_valid_stored_token_is_returned_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_base_dir(dir.path());
        store
            .save("spotify", &record("at-cached", None, now_epoch() + 1000))
            .unwrap();

        // The token endpoint is unreachable; any network call would fail.
        let flow = OAuthFlow::new(
            "spotify",
            config("cid", "http://127.0.0.1:9/api/token", "http://localhost:18491/callback"),
            store,
        );

        assert_eq!(flow.get_user_token().await.unwrap(), "at-cached");
        // Second call serves from the in-memory slot.
        assert_eq!(flow.get_user_token().await.unwrap(), "at-cached");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_exactly_once_and_persisted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token":"at-fresh","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_base_dir(dir.path());
        store
            .save("spotify", &record("at-stale", Some("rt-1"), 1))
            .unwrap();

        let flow = OAuthFlow::new(
            "spotify",
            config(
                "cid",
                &format!("{}/api/token", server.url()),
                "http://localhost:18492/callback",
            ),
            store.clone(),
        );

        assert_eq!(flow.get_user_token().await.unwrap(), "at-fresh");
        mock.assert_async().await;

        let persisted = store.load("spotify").unwrap().unwrap();
        assert_eq!(persisted.access_token, "at-fresh");
        assert_eq!(persisted.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_through_to_interactive() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_base_dir(dir.path());
        store
            .save("spotify", &record("at-stale", Some("rt-revoked"), 1))
            .unwrap();

        // client_id is empty, so the interactive branch fails fast with a
        // Configuration error, proving the refresh error was swallowed and
        // the ladder moved on.
        let flow = OAuthFlow::new(
            "spotify",
            config(
                "",
                &format!("{}/api/token", server.url()),
                "http://localhost:18493/callback",
            ),
            store,
        );

        let err = flow.get_user_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_authorization_url_carries_required_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let flow = OAuthFlow::new(
            "spotify",
            config("cid", "https://accounts.example.com/api/token", "http://localhost:8888/callback"),
            TokenStore::with_base_dir(dir.path()),
        );

        let request = flow.start().unwrap();
        assert!(request.url.starts_with("https://accounts.example.com/authorize?"));
        assert!(request.url.contains("response_type=code"));
        assert!(request.url.contains("client_id=cid"));
        assert!(request.url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8888%2Fcallback"));
        assert!(request.url.contains("code_challenge_method=S256"));
        assert!(request.url.contains(&format!("code_challenge={}", request.session.challenge)));
        assert!(request.url.contains("scope=user-read-playback-state"));
        assert!(request.url.contains(&format!("state={}", request.session.state)));
    }

    #[tokio::test]
    async fn test_full_interactive_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                mockito::Matcher::UrlEncoded("code".into(), "CODE-1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"at-int","refresh_token":"rt-int","expires_in":3600}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::with_base_dir(dir.path());
        let launcher = CapturingLauncher::default();
        let port = 18494;

        let flow = Arc::new(
            OAuthFlow::new(
                "spotify",
                config(
                    "cid",
                    &format!("{}/api/token", server.url()),
                    &format!("http://localhost:{port}/callback"),
                ),
                store.clone(),
            )
            .with_launcher(Box::new(launcher.clone()))
            .with_callback_timeout(Duration::from_secs(5)),
        );

        let task = tokio::spawn({
            let flow = Arc::clone(&flow);
            async move { flow.get_user_token().await }
        });

        // Wait until the flow presents the authorization URL, then play the
        // provider: redirect the "browser" to the callback with the session
        // state.
        let url = loop {
            let presented = launcher.0.lock().unwrap().clone();
            if let Some(url) = presented {
                break url;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        let parsed = url::Url::parse(&url).unwrap();
        let state = parsed
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap();

        let mut stream = loop {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        };
        let get = format!("GET /callback?code=CODE-1&state={state} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(get.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200"));

        assert_eq!(task.await.unwrap().unwrap(), "at-int");
        let persisted = store.load("spotify").unwrap().unwrap();
        assert_eq!(persisted.access_token, "at-int");
        assert_eq!(persisted.refresh_token.as_deref(), Some("rt-int"));
    }
}
