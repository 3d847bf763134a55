//! User-supplied configuration: a TOML file under the home directory with
//! `TUNEDECK_*` environment overrides on top.

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

/// Top-level settings, deserialized from `~/.tunedeck/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// OAuth application client id. There is no usable default; interactive
    /// authorization fails until this is supplied.
    pub client_id: String,
    /// Loopback redirect the provider sends the browser back to.
    pub redirect_uri: String,
    /// Space-delimited capability list sent with the authorization request.
    pub scopes: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: "http://localhost:8888/callback".to_string(),
            scopes: "user-read-playback-state user-modify-playback-state \
                     user-read-currently-playing"
                .to_string(),
        }
    }
}

impl Settings {
    /// Load from the default path, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from an explicit path; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("could not read config at {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("invalid config at {}", path.display()))?
        } else {
            debug!(path = %path.display(), "no config file; using defaults");
            Self::default()
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        let home = directories::BaseDirs::new().context("could not determine home directory")?;
        Ok(home.home_dir().join(".tunedeck/config.toml"))
    }

    /// Scopes as the list the authorization request wants.
    pub fn scope_list(&self) -> Vec<String> {
        self.auth
            .scopes
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        for (key, slot) in [
            ("TUNEDECK_CLIENT_ID", &mut self.auth.client_id),
            ("TUNEDECK_REDIRECT_URI", &mut self.auth.redirect_uri),
            ("TUNEDECK_SCOPES", &mut self.auth.scopes),
        ] {
            if let Some(value) = get(key) {
                if !value.is_empty() {
                    *slot = value;
                }
            }
        }
    }
}
