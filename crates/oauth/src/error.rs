use std::time::Duration;

use thiserror::Error;

/// Failures of the persisted token store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not determine a home directory for the token store")]
    NoHomeDir,
    #[error("token store I/O at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("token record at {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything that can go wrong while obtaining a user token.
///
/// `Refresh` is recovered inside [`crate::OAuthFlow`] (a failed refresh falls
/// through to interactive authorization); every other variant surfaces to the
/// caller verbatim.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("entropy source unavailable: {0}")]
    EntropySource(String),

    #[error("could not bind the callback listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("no authorization callback arrived within {0:?}")]
    Timeout(Duration),

    #[error("authorization callback did not include a code ({detail})")]
    NoCode { detail: String },

    #[error("authorization callback state did not match this session")]
    StateMismatch,

    #[error("token exchange rejected: HTTP {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("token refresh rejected: HTTP {status}: {body}")]
    Refresh { status: u16, body: String },

    #[error("missing or invalid configuration: {0}")]
    Configuration(&'static str),

    #[error("token store: {0}")]
    Storage(#[from] StorageError),

    #[error("token endpoint unreachable: {0}")]
    Http(#[from] reqwest::Error),
}
