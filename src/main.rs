mod config;
mod database;
mod entities;
mod http_server;
mod logging;
mod ports;
mod services;
mod spotify_rs;
#[cfg(test)]
mod test_utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};

use crate::{
    config::{Config, Overrides},
    database::Database,
    services::{
        ranking::{Provider, ranked_candidates},
        session::{SessionConfig, SessionManager},
        sync::{PlaylistSyncService, preview},
        token_store::TokenStore,
    },
    spotify_rs::auth::SpotifyOAuth,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "PLAYLIST_SYNC_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "ranked_playlist_sync=debug"
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Export spans to this OTLP (gRPC) endpoint
    #[arg(long, global = true, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Item database URL (mysql://… or sqlite://…)
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Spotify application client id
    #[arg(long, global = true, env = "SPOTIFY_ID")]
    spotify_id: Option<String>,

    /// Spotify application client secret
    #[arg(long, global = true, env = "SPOTIFY_SECRET", hide_env_values = true)]
    spotify_secret: Option<String>,

    /// Playlist to append ranked tracks to
    #[arg(long, global = true, env = "SPOTIFY_PLAYLIST")]
    spotify_playlist: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append the ranked tracks to the Spotify playlist
    Sync {
        /// Only log what would be added
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the browser login and store the session token
    Login,
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let args = Args::parse();
    let tracer_provider =
        logging::init_tracing(args.otlp_endpoint.as_deref(), &args.log_level)?;

    let result = run(args).await;

    logging::shutdown_tracing(tracer_provider);
    result
}

async fn run(args: Args) -> Result<()> {
    let overrides = Overrides {
        database_url: args.database_url,
        client_id: args.spotify_id,
        client_secret: args.spotify_secret,
        playlist_id: args.spotify_playlist,
    };

    match args.command {
        Commands::Sync { dry_run: true } => {
            let config = load_config(args.config.as_deref(), overrides)?;
            let database = Database::connect(&config.database_url()?).await?;
            let candidates = ranked_candidates(&database.conn, Provider::Spotify).await?;
            let previewed = preview(candidates).await?;
            tracing::info!("Dry run: {} tracks would be added", previewed.len());
        }
        Commands::Sync { dry_run: false } => {
            let config = load_config(args.config.as_deref(), overrides)?;
            let sessions = session_manager(&config).await?;
            let database = Database::connect(&config.database_url()?).await?;

            let session = sessions.ensure_session().await?;
            let credentials = config.spotify_credentials()?;
            let service = PlaylistSyncService::new(
                session.client.as_ref(),
                credentials.playlist_id,
                config.sync.on_error,
            );

            let candidates = ranked_candidates(&database.conn, Provider::Spotify).await?;
            let report = service.sync(candidates).await?;
            tracing::info!(
                "Added {} tracks to {} as {}",
                report.added.len(),
                report.playlist_name,
                session.user.id
            );
            for failed in &report.failed {
                tracing::warn!(
                    "Not added: item {} ({}): {}",
                    failed.candidate.item_id,
                    failed.candidate.external_id,
                    failed.reason
                );
            }
        }
        Commands::Login => {
            let config = load_config(args.config.as_deref(), overrides)?;
            let session = session_manager(&config).await?.login().await?;
            tracing::info!("Stored session for {}", session.user.id);
        }
        Commands::Config(ConfigCommands::CreateDefault) => {
            let path = Config::create_default()?;
            tracing::info!("Default config at {}", path.display());
        }
        Commands::Config(ConfigCommands::Path) => match Config::config_path() {
            Some(path) => println!("{}", path.display()),
            None => println!("No default config path found"),
        },
    }

    Ok(())
}

fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .wrap_err("Failed to load ranked-playlist-sync config")?;
    config.apply(overrides);
    Ok(config)
}

async fn session_manager(config: &Config) -> Result<SessionManager> {
    let credentials = config.spotify_credentials()?;
    let store_db = Database::open_sqlite(&config.token_store_path()).await?;
    let store = TokenStore::open(Arc::new(store_db)).await?;

    let auth = SpotifyOAuth::new(
        credentials.client_id,
        credentials.client_secret,
        credentials.redirect_uri,
    );
    Ok(SessionManager::new(
        Arc::new(auth),
        store,
        SessionConfig {
            listen_addr: config.callback.listen_addr,
            login_timeout: config.login_timeout()?,
        },
    ))
}
