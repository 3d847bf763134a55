//! One-shot loopback listener for the authorization redirect.

use std::time::Duration;

use {
    tokio::io::{AsyncReadExt, AsyncWriteExt},
    tokio::net::{TcpListener, TcpStream},
    tracing::{debug, warn},
};

use crate::error::AuthError;

/// Request heads larger than this are cut off; the redirect we care about is
/// a short GET with a query string.
const MAX_REQUEST_HEAD_BYTES: usize = 8 * 1024;

const SUCCESS_BODY: &str = "<html><body><p>Authentication complete &mdash; you can close this tab \
                            and return to tunedeck.</p></body></html>";
const FAILURE_BODY: &str = "<html><body><p>Authentication failed &mdash; close this tab and retry \
                            from tunedeck.</p></body></html>";

/// Captures a single authorization redirect on a loopback port.
pub struct CallbackServer;

impl CallbackServer {
    /// Wait for one redirect on `port` and return its `code` parameter.
    ///
    /// The listener exists only for the duration of this call: it accepts one
    /// connection (or times out), answers it, and is released on every exit
    /// path. `expected_state` is compared to the callback's `state` parameter
    /// by exact equality before the code is accepted.
    pub async fn wait_for_code(
        port: u16,
        expected_state: String,
        timeout: Duration,
    ) -> Result<String, AuthError> {
        let listener = bind_loopback(port).await?;
        debug!(port, "callback listener bound");
        tokio::time::timeout(timeout, handle_one(&listener, &expected_state))
            .await
            .map_err(|_| AuthError::Timeout(timeout))?
    }
}

/// Bind the numeric loopback address first; some environments resolve the
/// hostname to a different loopback form, so fall back to `localhost`.
async fn bind_loopback(port: u16) -> Result<TcpListener, AuthError> {
    let first = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => return Ok(listener),
        Err(err) => err,
    };
    match TcpListener::bind(("localhost", port)).await {
        Ok(listener) => Ok(listener),
        Err(_) => Err(AuthError::Bind {
            port,
            source: first,
        }),
    }
}

async fn handle_one(listener: &TcpListener, expected_state: &str) -> Result<String, AuthError> {
    let (mut stream, peer) = listener.accept().await.map_err(|err| AuthError::NoCode {
        detail: format!("callback connection failed: {err}"),
    })?;
    debug!(%peer, "authorization callback connected");

    let head = read_request_head(&mut stream).await?;
    let query = Query::from_request_head(&head);

    if query.state.as_deref() != Some(expected_state) {
        respond(&mut stream, "400 Bad Request", FAILURE_BODY).await;
        return Err(AuthError::StateMismatch);
    }

    let Some(code) = query.code else {
        respond(&mut stream, "400 Bad Request", FAILURE_BODY).await;
        let detail = match query.error {
            Some(error) => format!("provider error: {error}"),
            None => "no code parameter in the redirect".to_string(),
        };
        return Err(AuthError::NoCode { detail });
    };

    respond(&mut stream, "200 OK", SUCCESS_BODY).await;
    Ok(code)
}

/// Read up to the blank line that ends the request head; any body is ignored.
async fn read_request_head(stream: &mut TcpStream) -> Result<String, AuthError> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|err| AuthError::NoCode {
                detail: format!("callback read failed: {err}"),
            })?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") || head.len() >= MAX_REQUEST_HEAD_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

#[derive(Debug, Default)]
struct Query {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl Query {
    /// Best-effort extraction of the interesting query parameters from a raw
    /// request head. Anything malformed just yields absent fields.
    fn from_request_head(head: &str) -> Self {
        let mut query = Self::default();
        let Some(request_line) = head.lines().next() else {
            return query;
        };
        let Some(target) = request_line.split_whitespace().nth(1) else {
            return query;
        };
        let Ok(url) = url::Url::parse(&format!("http://localhost{target}")) else {
            return query;
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => query.code = Some(value.into_owned()),
                "state" => query.state = Some(value.into_owned()),
                "error" => query.error = Some(value.into_owned()),
                _ => {},
            }
        }
        query
    }
}

/// Best effort: a browser tab that disconnects before the acknowledgement
/// lands must not fail the flow.
async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        warn!(error = %err, "failed to write callback acknowledgement");
    }
    let _ = stream.flush().await;
}
