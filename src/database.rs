use color_eyre::{Result, eyre::Context};
use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection};
use std::path::Path;
use std::time::Duration;

pub struct Database {
    pub conn: DatabaseConnection,
}

impl Database {
    /// Connect to the ranked item database (MySQL or SQLite url)
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::debug!("Connecting to item database");

        let mut opt = ConnectOptions::new(url.to_owned());
        opt.max_connections(1)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt)
            .await
            .context("Could not open connection to item database")?;

        Ok(Database { conn })
    }

    /// Open or create a SQLite file at the given path
    pub async fn open_sqlite(path: &Path) -> Result<Self> {
        tracing::debug!("Opening database at: {}", path.display());

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create database directory: {}",
                parent.display()
            ))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(1)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt)
            .await
            .context(format!("Failed to open database: {}", path.display()))?;

        tracing::info!("Database ready at: {}", path.display());
        Ok(Database { conn })
    }
}
