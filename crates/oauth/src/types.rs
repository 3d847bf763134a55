use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Fallback callback port when the redirect URI does not carry one.
pub const DEFAULT_CALLBACK_PORT: u16 = 8888;

/// OAuth 2.0 provider configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Port of the loopback callback listener, parsed from the redirect URI.
    ///
    /// Only `http://localhost:<port>/<path>` and `http://127.0.0.1:<port>/<path>`
    /// forms are accepted.
    pub fn callback_port(&self) -> Result<u16, AuthError> {
        let url = url::Url::parse(&self.redirect_uri)
            .map_err(|_| AuthError::Configuration("redirect_uri is not a valid URL"))?;
        match url.host_str() {
            Some("localhost") | Some("127.0.0.1") => {},
            _ => return Err(AuthError::Configuration("redirect_uri must point at loopback")),
        }
        Ok(url.port().unwrap_or(DEFAULT_CALLBACK_PORT))
    }

    /// Space-delimited scope string as it appears on the wire.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Stored OAuth tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp after which the access token must not be trusted.
    pub expires_at: u64,
}

impl TokenRecord {
    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// PKCE material for one authorization round-trip. Never persisted.
#[derive(Debug, Clone)]
pub struct PkceSession {
    pub verifier: String,
    pub challenge: String,
    /// CSRF-binding nonce echoed back on the callback; independent of the verifier.
    pub state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(redirect_uri: &str) -> OAuthConfig {
        OAuthConfig {
            client_id: "cid".into(),
            auth_url: "https://accounts.example.com/authorize".into(),
            token_url: "https://accounts.example.com/api/token".into(),
            redirect_uri: redirect_uri.into(),
            scopes: vec!["user-read-playback-state".into(), "user-modify-playback-state".into()],
        }
    }

    #[test]
    fn test_callback_port_from_redirect_uri() {
        assert_eq!(config("http://localhost:8888/callback").callback_port().unwrap(), 8888);
        assert_eq!(config("http://127.0.0.1:1455/auth/callback").callback_port().unwrap(), 1455);
    }

    #[test]
    fn test_callback_port_defaults_when_absent() {
        assert_eq!(
            config("http://localhost/callback").callback_port().unwrap(),
            DEFAULT_CALLBACK_PORT
        );
    }

    #[test]
    fn test_callback_port_rejects_non_loopback() {
        assert!(config("https://example.com/callback").callback_port().is_err());
        assert!(config("not a url").callback_port().is_err());
    }

    #[test]
    fn test_scope_string_is_space_delimited() {
        assert_eq!(
            config("http://localhost:8888/callback").scope_string(),
            "user-read-playback-state user-modify-playback-state"
        );
    }

    #[test]
    fn test_token_record_validity_boundary() {
        let record = TokenRecord {
            access_token: "tok".into(),
            refresh_token: None,
            expires_at: 100,
        };
        assert!(record.is_valid_at(99));
        assert!(!record.is_valid_at(100));
        assert!(!record.is_valid_at(101));
    }
}
