use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// A ranked item. The provider columns mirror the embedded metadata block
/// (one url + id pair per streaming provider).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub item_id: i64,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub url: String,
    pub acr_id: String,
    pub deezer_url: String,
    pub deezer_id: String,
    pub soundcloud_url: String,
    pub soundcloud_id: String,
    pub spotify_url: String,
    /// Composite id, e.g. `spotify::4uLU6hMCjMI75M1A2tKUQC`
    pub spotify_id: String,
    pub youtube_url: String,
    pub youtube_id: String,
    pub tidal_url: String,
    pub tidal_id: String,
    pub applemusic_url: String,
    pub applemusic_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[sea_orm(has_many)]
    pub comments: HasMany<super::comment::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
