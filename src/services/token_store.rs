use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, EntityTrait, Set, TransactionTrait};

use crate::database::Database;
use crate::entities::token_entry;
use crate::spotify_rs::types::SessionToken;

pub const ACCESS_TOKEN_KEY: &str = "tok_access";
pub const TOKEN_TYPE_KEY: &str = "tok_type";
pub const REFRESH_TOKEN_KEY: &str = "tok_refresh";
pub const EXPIRY_KEY: &str = "tok_expire";

/// A stored access token at most this long is treated as a placeholder.
const MIN_ACCESS_TOKEN_LEN: usize = 3;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS token_store (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
)";

pub fn format_expiry(expires_at: &DateTime<Utc>) -> String {
    expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_expiry(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .wrap_err_with(|| format!("Invalid token expiry timestamp: {}", value))
}

/// Durable key/value store for OAuth credentials, backed by its own SQLite file.
#[derive(Clone)]
pub struct TokenStore {
    db: Arc<Database>,
}

impl TokenStore {
    /// Wrap an opened database, creating the backing table if needed.
    pub async fn open(db: Arc<Database>) -> Result<Self> {
        db.conn
            .execute_unprepared(CREATE_TABLE)
            .await
            .wrap_err("Failed to create token store table")?;
        Ok(Self { db })
    }

    /// `None` means the key was never written.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let entry = token_entry::Entity::find_by_id(key.to_owned())
            .one(&self.db.conn)
            .await
            .wrap_err_with(|| format!("Failed to read token store key {}", key))?;
        Ok(entry.map(|entry| entry.value))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        upsert(&self.db.conn, key, value).await
    }

    pub async fn token_exists(&self) -> Result<bool> {
        Ok(self
            .get(ACCESS_TOKEN_KEY)
            .await?
            .is_some_and(|access| access.len() > MIN_ACCESS_TOKEN_LEN))
    }

    /// Write all four credential fields, or none of them.
    pub async fn save_token(&self, token: &SessionToken) -> Result<()> {
        let txn = self
            .db
            .conn
            .begin()
            .await
            .wrap_err("Failed to begin transaction")?;

        upsert(&txn, TOKEN_TYPE_KEY, &token.token_type).await?;
        upsert(&txn, ACCESS_TOKEN_KEY, &token.access_token).await?;
        upsert(&txn, EXPIRY_KEY, &format_expiry(&token.expires_at)).await?;
        upsert(&txn, REFRESH_TOKEN_KEY, &token.refresh_token).await?;

        txn.commit()
            .await
            .wrap_err("Failed to commit transaction")?;

        tracing::debug!("Persisted session token, expires at {}", token.expires_at);
        Ok(())
    }

    /// Restore the persisted token. `None` when no access token was ever stored.
    pub async fn load_token(&self) -> Result<Option<SessionToken>> {
        let Some(access_token) = self.get(ACCESS_TOKEN_KEY).await? else {
            return Ok(None);
        };

        let token_type = self
            .get(TOKEN_TYPE_KEY)
            .await?
            .unwrap_or_else(|| "Bearer".to_string());
        let refresh_token = self.get(REFRESH_TOKEN_KEY).await?.unwrap_or_default();
        let expires_at = match self.get(EXPIRY_KEY).await? {
            Some(value) => parse_expiry(&value)?,
            None => {
                tracing::warn!("No token expiry stored, treating token as expired");
                DateTime::<Utc>::UNIX_EPOCH
            }
        };

        Ok(Some(SessionToken {
            access_token,
            token_type,
            refresh_token,
            expires_at,
        }))
    }
}

async fn upsert(conn: &impl ConnectionTrait, key: &str, value: &str) -> Result<()> {
    let model = token_entry::ActiveModel {
        key: Set(key.to_owned()),
        value: Set(value.to_owned()),
        updated_at: Set(Utc::now().timestamp()),
    };

    token_entry::Entity::insert(model)
        .on_conflict(
            OnConflict::column(token_entry::Column::Key)
                .update_columns([token_entry::Column::Value, token_entry::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .wrap_err_with(|| format!("Failed to write token store key {}", key))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_token_store;
    use chrono::TimeZone;

    fn sample_token() -> SessionToken {
        SessionToken {
            access_token: "BQD-access-token".into(),
            token_type: "Bearer".into(),
            refresh_token: "AQA-refresh-token".into(),
            expires_at: Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = test_token_store().await;

        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
        assert!(!store.token_exists().await.unwrap());
        assert!(store.load_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = test_token_store().await;
        store.set("tok_type", "Bearer").await.unwrap();
        store.set("tok_type", "MAC").await.unwrap();

        assert_eq!(store.get("tok_type").await.unwrap().as_deref(), Some("MAC"));
    }

    #[tokio::test]
    async fn test_token_exists_ignores_placeholder() {
        let store = test_token_store().await;
        store.set(ACCESS_TOKEN_KEY, "abc").await.unwrap();
        assert!(!store.token_exists().await.unwrap());

        store.set(ACCESS_TOKEN_KEY, "abcd").await.unwrap();
        assert!(store.token_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = test_token_store().await;
        let token = sample_token();

        store.save_token(&token).await.unwrap();

        assert_eq!(
            store.get(EXPIRY_KEY).await.unwrap().as_deref(),
            Some("2025-03-14T15:09:26Z")
        );
        assert_eq!(store.load_token().await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_login() {
        let store = test_token_store().await;
        store.save_token(&sample_token()).await.unwrap();

        let newer = SessionToken {
            access_token: "BQD-newer".into(),
            ..sample_token()
        };
        store.save_token(&newer).await.unwrap();

        assert_eq!(store.load_token().await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_expiry() {
        let store = test_token_store().await;
        store.set(ACCESS_TOKEN_KEY, "BQD-access-token").await.unwrap();
        store.set(EXPIRY_KEY, "14 Mar 25 15:09 UTC").await.unwrap();

        assert!(store.load_token().await.is_err());
    }

    #[tokio::test]
    async fn test_load_without_expiry_is_expired() {
        let store = test_token_store().await;
        store.set(ACCESS_TOKEN_KEY, "BQD-access-token").await.unwrap();

        let token = store.load_token().await.unwrap().unwrap();
        assert!(token.is_expired(Utc::now()));
        assert_eq!(token.token_type, "Bearer");
        assert!(!token.has_refresh_token());
    }

    #[tokio::test]
    async fn test_token_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens").join("data.db");
        let token = sample_token();

        {
            let db = Arc::new(Database::open_sqlite(&path).await.unwrap());
            let store = TokenStore::open(db).await.unwrap();
            store.save_token(&token).await.unwrap();
        }

        let db = Arc::new(Database::open_sqlite(&path).await.unwrap());
        let store = TokenStore::open(db).await.unwrap();
        assert!(store.token_exists().await.unwrap());
        assert_eq!(store.load_token().await.unwrap(), Some(token));
    }
}
