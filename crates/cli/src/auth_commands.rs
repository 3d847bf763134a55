use {
    anyhow::Result,
    clap::Subcommand,
    tunedeck_config::Settings,
    tunedeck_oauth::{OAuthConfig, OAuthFlow, TokenStore},
};

const PROVIDER: &str = "spotify";
const AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

#[derive(Subcommand)]
pub enum AuthAction {
    /// Log in via the browser OAuth flow.
    Login,
    /// Show authentication status.
    Status,
    /// Forget the stored tokens.
    Logout,
}

pub async fn handle_auth(action: AuthAction) -> Result<()> {
    match action {
        AuthAction::Login => login().await,
        AuthAction::Status => status(),
        AuthAction::Logout => logout(),
    }
}

fn oauth_config() -> Result<OAuthConfig> {
    let settings = Settings::load()?;
    Ok(OAuthConfig {
        client_id: settings.auth.client_id.clone(),
        auth_url: AUTH_URL.to_string(),
        token_url: TOKEN_URL.to_string(),
        redirect_uri: settings.auth.redirect_uri.clone(),
        scopes: settings.scope_list(),
    })
}

/// Flow over the default token store, as the player commands consume it.
pub fn oauth_flow() -> Result<OAuthFlow> {
    Ok(OAuthFlow::new(PROVIDER, oauth_config()?, TokenStore::new()?))
}

async fn login() -> Result<()> {
    let flow = oauth_flow()?;

    println!("Opening browser for authentication...");
    let record = flow.authorize().await?;

    if record.refresh_token.is_some() {
        println!("Successfully logged in to {PROVIDER}");
    } else {
        println!(
            "Successfully logged in to {PROVIDER} \
             (no refresh token issued; you will be re-prompted when it expires)"
        );
    }
    Ok(())
}

fn status() -> Result<()> {
    let store = TokenStore::new()?;
    let Some(record) = store.load(PROVIDER)? else {
        println!("Not logged in. Run `tunedeck auth login`.");
        return Ok(());
    };

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    if record.expires_at > now {
        let remaining = record.expires_at - now;
        let hours = remaining / 3600;
        let mins = (remaining % 3600) / 60;
        println!("{PROVIDER} [valid ({hours}h {mins}m remaining)]");
    } else if record.refresh_token.is_some() {
        println!("{PROVIDER} [expired; will refresh on next use]");
    } else {
        println!("{PROVIDER} [expired; log in again]");
    }
    Ok(())
}

fn logout() -> Result<()> {
    let store = TokenStore::new()?;
    store.delete(PROVIDER)?;
    println!("Logged out from {PROVIDER}");
    Ok(())
}
