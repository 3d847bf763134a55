//! Authenticated search/playback calls against the web API.
//!
//! Every call obtains a bearer token through
//! [`OAuthFlow::get_user_token`](tunedeck_oauth::OAuthFlow::get_user_token),
//! so a stale grant is refreshed (or re-authorized) transparently.

use std::{sync::Arc, time::Duration};

use {serde::Deserialize, tracing::debug};

use tunedeck_oauth::OAuthFlow;

const DEFAULT_API_BASE: &str = "https://api.spotify.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A track as the rest of the app cares about it.
#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub artists: Vec<String>,
    pub uri: String,
}

impl Track {
    /// "Artist, Artist - Name" display form.
    pub fn display(&self) -> String {
        format!("{} - {}", self.artists.join(", "), self.name)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    name: String,
    uri: String,
    artists: Vec<ArtistItem>,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
}

impl From<TrackItem> for Track {
    fn from(item: TrackItem) -> Self {
        Self {
            name: item.name,
            artists: item.artists.into_iter().map(|artist| artist.name).collect(),
            uri: item.uri,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NowPlayingResponse {
    item: Option<TrackItem>,
}

/// Thin client over the protected API.
pub struct PlayerClient {
    auth: Arc<OAuthFlow>,
    base_url: String,
    http: reqwest::Client,
}

impl PlayerClient {
    pub fn new(auth: Arc<OAuthFlow>) -> Self {
        Self::with_base_url(auth, DEFAULT_API_BASE)
    }

    pub fn with_base_url(auth: Arc<OAuthFlow>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Track search, best matches first.
    pub async fn search_tracks(&self, query: &str, limit: u8) -> anyhow::Result<Vec<Track>> {
        let token = self.auth.get_user_token().await?;
        let response = self
            .http
            .get(format!("{}/v1/search", self.base_url))
            .query(&[("q", query), ("type", "track"), ("limit", &limit.to_string())])
            .bearer_auth(&token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("search failed: HTTP {status}: {body}");
        }

        let parsed: SearchResponse = response.json().await?;
        debug!(query, hits = parsed.tracks.items.len(), "search completed");
        Ok(parsed.tracks.items.into_iter().map(Track::from).collect())
    }

    /// Start playback of `uri` on the user's active device.
    pub async fn play(&self, uri: &str) -> anyhow::Result<()> {
        let token = self.auth.get_user_token().await?;
        let response = self
            .http
            .put(format!("{}/v1/me/player/play", self.base_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "uris": [uri] }))
            .send()
            .await?;
        Self::check_player_response(response, "start playback").await
    }

    /// Pause playback on the user's active device.
    pub async fn pause(&self) -> anyhow::Result<()> {
        let token = self.auth.get_user_token().await?;
        let response = self
            .http
            .put(format!("{}/v1/me/player/pause", self.base_url))
            .bearer_auth(&token)
            .send()
            .await?;
        Self::check_player_response(response, "pause playback").await
    }

    /// The track currently playing, if any.
    pub async fn currently_playing(&self) -> anyhow::Result<Option<Track>> {
        let token = self.auth.get_user_token().await?;
        let response = self
            .http
            .get(format!("{}/v1/me/player/currently-playing", self.base_url))
            .bearer_auth(&token)
            .send()
            .await?;

        if response.status().as_u16() == 204 {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("now-playing lookup failed: HTTP {status}: {body}");
        }

        let parsed: NowPlayingResponse = response.json().await?;
        Ok(parsed.item.map(Track::from))
    }

    async fn check_player_response(
        response: reqwest::Response,
        action: &str,
    ) -> anyhow::Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        // The player endpoints answer 404 when no device is active.
        if status.as_u16() == 404 {
            anyhow::bail!("could not {action}: no active playback device");
        }
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("could not {action}: HTTP {status}: {body}");
    }
}
