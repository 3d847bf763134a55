//! Token-endpoint calls: authorization-code exchange and refresh.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use {serde::Deserialize, tracing::debug};

use crate::{
    error::AuthError,
    pkce::percent_encode,
    storage::TokenStore,
    types::{OAuthConfig, TokenRecord},
};

/// Subtracted from the provider-reported TTL so in-flight calls never ride an
/// access token over the expiry edge.
pub(crate) const EXPIRY_SAFETY_MARGIN_SECS: u64 = 30;
/// A token is trusted for at least this long regardless of the reported TTL.
pub(crate) const MIN_TOKEN_TTL_SECS: u64 = 60;
/// Assumed TTL when the provider omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Client for the two token-bearing calls against the authorization server.
///
/// Both calls persist their result through the [`TokenStore`] before
/// returning, so a reported success is already durable.
pub struct TokenClient {
    http: reqwest::Client,
    config: OAuthConfig,
    store: TokenStore,
    key: String,
}

impl TokenClient {
    pub fn new(key: impl Into<String>, config: OAuthConfig, store: TokenStore) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            config,
            store,
            key: key.into(),
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Exchange an authorization code (plus its PKCE verifier) for tokens.
    pub async fn exchange(&self, code: &str, verifier: &str) -> Result<TokenRecord, AuthError> {
        let body = exchange_request_body(code, verifier, &self.config);
        let (status, response) = self.post_form(body).await?;
        if status != 200 {
            return Err(AuthError::TokenExchange {
                status,
                body: response,
            });
        }
        let parsed: TokenResponse = match serde_json::from_str(&response) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Err(AuthError::TokenExchange {
                    status,
                    body: response,
                });
            },
        };

        let record = TokenRecord {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_at: expires_at_from(now_epoch(), parsed.expires_in),
        };
        self.store.save(&self.key, &record)?;
        debug!(expires_at = record.expires_at, "authorization code exchanged");
        Ok(record)
    }

    /// Trade a refresh token for a fresh record.
    ///
    /// Providers frequently do not rotate the refresh token; the one we
    /// presented is carried forward when the response omits a replacement.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord, AuthError> {
        let body = refresh_request_body(refresh_token, &self.config);
        let (status, response) = self.post_form(body).await?;
        if status != 200 {
            return Err(AuthError::Refresh {
                status,
                body: response,
            });
        }
        let parsed: TokenResponse = match serde_json::from_str(&response) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Err(AuthError::Refresh {
                    status,
                    body: response,
                });
            },
        };

        let record = TokenRecord {
            access_token: parsed.access_token,
            refresh_token: parsed
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expires_at_from(now_epoch(), parsed.expires_in),
        };
        self.store.save(&self.key, &record)?;
        debug!(expires_at = record.expires_at, "access token refreshed");
        Ok(record)
    }

    /// POST a form body to the token endpoint; returns status and a
    /// size-capped body for diagnostics.
    async fn post_form(&self, body: String) -> Result<(u16, String), AuthError> {
        let mut response = self
            .http
            .post(&self.config.token_url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = MAX_RESPONSE_BODY_BYTES - bytes.len();
            if chunk.len() >= room {
                bytes.extend_from_slice(&chunk[..room]);
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
    }
}

/// Form body for the authorization-code grant: exactly five fields, every
/// value percent-encoded.
pub(crate) fn exchange_request_body(code: &str, verifier: &str, config: &OAuthConfig) -> String {
    format!(
        "grant_type=authorization_code&code={}&redirect_uri={}&client_id={}&code_verifier={}",
        percent_encode(code),
        percent_encode(&config.redirect_uri),
        percent_encode(&config.client_id),
        percent_encode(verifier),
    )
}

/// Form body for the refresh grant.
pub(crate) fn refresh_request_body(refresh_token: &str, config: &OAuthConfig) -> String {
    format!(
        "grant_type=refresh_token&refresh_token={}&client_id={}",
        percent_encode(refresh_token),
        percent_encode(&config.client_id),
    )
}

/// `expires_at` policy: issue time plus the reported TTL less the safety
/// margin, floored at [`MIN_TOKEN_TTL_SECS`].
pub(crate) fn expires_at_from(issue_time: u64, expires_in: Option<u64>) -> u64 {
    let ttl = expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    issue_time + ttl.saturating_sub(EXPIRY_SAFETY_MARGIN_SECS).max(MIN_TOKEN_TTL_SECS)
}

pub(crate) fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
