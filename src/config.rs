use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};

use crate::services::sync::OnError;

const APP_DIR: &str = "ranked-playlist-sync";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection URL of the item/comment database
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_token_store")]
    token_store: String,
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default)]
    pub playlist_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// e.g. "5m"; unset waits for the browser login forever
    #[serde(default)]
    pub login_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub on_error: OnError,
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub playlist_id: Option<String>,
}

/// Credentials needed to talk to Spotify, all present.
#[derive(Debug, Clone)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub playlist_id: String,
}

fn default_token_store() -> String {
    format!("~/.local/share/{}/tokens.db", APP_DIR)
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/callback".to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            playlist_id: None,
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            login_timeout: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            token_store: default_token_store(),
            spotify: SpotifyConfig::default(),
            callback: CallbackConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err(format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .wrap_err(format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join(APP_DIR).join("config.toml"))
    }

    /// Load the default config file, or built-in defaults when there is none
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or(eyre!("No config directory available"))?;

        if !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        Self::from_file(&config_path)
    }

    /// Write a template config file, if it doesn't exist
    pub fn create_default() -> Result<PathBuf> {
        let config_path = Self::config_path().ok_or(eyre!("No config directory available"))?;
        Self::write_default(&config_path)?;
        Ok(config_path)
    }

    fn write_default(path: &Path) -> Result<()> {
        if path.exists() {
            tracing::info!("Config file already exists at {}", path.display());
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err(format!("Failed to create {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(&Self::default())?;
        std::fs::write(path, contents)
            .wrap_err(format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.spotify.redirect_uri).wrap_err(format!(
            "Invalid spotify.redirect_uri: {}",
            self.spotify.redirect_uri
        ))?;
        self.login_timeout()?;
        Ok(())
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if overrides.database_url.is_some() {
            self.database_url = overrides.database_url;
        }
        if overrides.client_id.is_some() {
            self.spotify.client_id = overrides.client_id;
        }
        if overrides.client_secret.is_some() {
            self.spotify.client_secret = overrides.client_secret;
        }
        if overrides.playlist_id.is_some() {
            self.spotify.playlist_id = overrides.playlist_id;
        }
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    pub fn token_store_path(&self) -> PathBuf {
        self.expand_path(&self.token_store)
    }

    pub fn login_timeout(&self) -> Result<Option<Duration>> {
        self.callback
            .login_timeout
            .as_deref()
            .map(|value| {
                humantime::parse_duration(value)
                    .wrap_err(format!("Invalid callback.login_timeout: {}", value))
            })
            .transpose()
    }

    /// The configured URL, else one assembled from the MYSQL_* variables.
    pub fn database_url(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        mysql_url_from(|key| std::env::var(key).ok()).ok_or(eyre!(
            "No database configured: set database_url, DATABASE_URL or MYSQL_USER/MYSQL_PASSWORD/MYSQL_HOST/MYSQL_DATABASE"
        ))
    }

    pub fn spotify_credentials(&self) -> Result<SpotifyCredentials> {
        let spotify = &self.spotify;
        Ok(SpotifyCredentials {
            client_id: spotify
                .client_id
                .clone()
                .ok_or(eyre!("Missing spotify.client_id (or SPOTIFY_ID)"))?,
            client_secret: spotify
                .client_secret
                .clone()
                .ok_or(eyre!("Missing spotify.client_secret (or SPOTIFY_SECRET)"))?,
            redirect_uri: spotify.redirect_uri.clone(),
            playlist_id: spotify
                .playlist_id
                .clone()
                .ok_or(eyre!("Missing spotify.playlist_id (or SPOTIFY_PLAYLIST)"))?,
        })
    }
}

fn mysql_url_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let user = lookup("MYSQL_USER")?;
    let password = lookup("MYSQL_PASSWORD").unwrap_or_default();
    let host = lookup("MYSQL_HOST")?;
    let database = lookup("MYSQL_DATABASE")?;
    Some(format!(
        "mysql://{}:{}@{}/{}",
        urlencoding::encode(&user),
        urlencoding::encode(&password),
        host,
        database
    ))
}
