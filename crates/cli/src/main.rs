mod auth_commands;

use std::sync::Arc;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
    tunedeck_player::PlayerClient,
};

#[derive(Parser)]
#[command(name = "tunedeck", about = "Tunedeck: Spotify search and playback from your terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authentication management for the Spotify account.
    Auth {
        #[command(subcommand)]
        action: auth_commands::AuthAction,
    },
    /// Search for tracks.
    Search {
        /// Free-text query.
        query: String,
        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: u8,
    },
    /// Play a track by URI, or search and play the top hit.
    Play {
        /// Track URI (spotify:track:...) or a free-text query.
        target: String,
    },
    /// Pause playback.
    Pause,
    /// Show the currently playing track.
    Now,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "tunedeck starting");

    match cli.command {
        Commands::Auth { action } => auth_commands::handle_auth(action).await,
        Commands::Search { query, limit } => search(&query, limit).await,
        Commands::Play { target } => play(&target).await,
        Commands::Pause => pause().await,
        Commands::Now => now().await,
    }
}

fn player() -> anyhow::Result<PlayerClient> {
    Ok(PlayerClient::new(Arc::new(auth_commands::oauth_flow()?)))
}

async fn search(query: &str, limit: u8) -> anyhow::Result<()> {
    let tracks = player()?.search_tracks(query, limit).await?;
    if tracks.is_empty() {
        println!("No tracks found for '{query}'.");
        return Ok(());
    }
    for track in &tracks {
        println!("  {}  {}", track.uri, track.display());
    }
    Ok(())
}

async fn play(target: &str) -> anyhow::Result<()> {
    let player = player()?;
    let uri = if target.starts_with("spotify:") {
        target.to_string()
    } else {
        let tracks = player.search_tracks(target, 1).await?;
        let Some(track) = tracks.into_iter().next() else {
            anyhow::bail!("no track found for '{target}'");
        };
        println!("Playing {}", track.display());
        track.uri
    };
    player.play(&uri).await
}

async fn pause() -> anyhow::Result<()> {
    player()?.pause().await?;
    println!("Paused.");
    Ok(())
}

async fn now() -> anyhow::Result<()> {
    match player()?.currently_playing().await? {
        Some(track) => println!("Now playing: {}", track.display()),
        None => println!("Nothing is playing."),
    }
    Ok(())
}
