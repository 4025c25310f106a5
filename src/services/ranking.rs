use color_eyre::eyre::{Result, WrapErr};
use futures::{Stream, TryStreamExt};
use sea_orm::sea_query::{Alias, Expr, ExprTrait, Func};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, StreamTrait,
};

use crate::entities::{comment, item};

/// Provider ids of this length or shorter are placeholders.
pub const MIN_PROVIDER_ID_LEN: i32 = 5;

/// Separator between the provider prefix and the provider's own track id.
pub const COMPOSITE_ID_DELIMITER: &str = "::";

/// Streaming providers present in an item's metadata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Deezer,
    Soundcloud,
    Spotify,
    Youtube,
    Tidal,
    AppleMusic,
}

impl Provider {
    fn id_column(self) -> item::Column {
        match self {
            Provider::Deezer => item::Column::DeezerId,
            Provider::Soundcloud => item::Column::SoundcloudId,
            Provider::Spotify => item::Column::SpotifyId,
            Provider::Youtube => item::Column::YoutubeId,
            Provider::Tidal => item::Column::TidalId,
            Provider::AppleMusic => item::Column::ApplemusicId,
        }
    }
}

/// A ranked row eligible for playlist insertion.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct CandidateTrack {
    pub item_id: i64,
    /// Composite external id, `<provider>::<track id>`
    pub external_id: String,
    /// Summed up-votes minus summed down-votes
    pub score: i64,
}

impl CandidateTrack {
    /// The provider's own track id: the second `::` separated segment.
    pub fn track_id(&self) -> Option<&str> {
        track_id_from_composite(&self.external_id)
    }
}

pub fn track_id_from_composite(composite: &str) -> Option<&str> {
    composite
        .split(COMPOSITE_ID_DELIMITER)
        .nth(1)
        .filter(|id| !id.is_empty())
}

/// Stream candidates for `provider`, best score first.
///
/// Items without comments score 0. Ties are ordered by item row id. The
/// stream holds the connection's cursor until it is dropped.
pub async fn ranked_candidates<'a, C>(
    conn: &'a C,
    provider: Provider,
) -> Result<impl Stream<Item = Result<CandidateTrack>> + Send + 'a>
where
    C: ConnectionTrait + StreamTrait + Send,
{
    // SUM over an integer column decodes as DECIMAL on MySQL
    let integer_type = match ConnectionTrait::get_database_backend(conn) {
        DbBackend::MySql => "SIGNED",
        _ => "INTEGER",
    };

    let total = |column: comment::Column| {
        Func::coalesce::<[Expr; 2], Expr>([
            Func::sum(Expr::col((comment::Entity, column))).into(),
            Expr::val(0).into(),
        ])
    };
    let score = Expr::expr(total(comment::Column::Up))
        .sub(total(comment::Column::Down))
        .cast_as(Alias::new(integer_type));

    let id_column = Expr::col((item::Entity, provider.id_column()));

    let stream = item::Entity::find()
        .select_only()
        .column(item::Column::ItemId)
        .column_as(id_column.clone(), "external_id")
        .column_as(score.clone(), "score")
        .left_join(comment::Entity)
        .filter(item::Column::DeletedAt.is_null())
        .filter(Expr::expr(Func::char_length(id_column)).gt(MIN_PROVIDER_ID_LEN))
        .group_by(item::Column::Id)
        .group_by(item::Column::ItemId)
        .group_by(provider.id_column())
        .order_by_desc(score)
        .order_by_asc(item::Column::Id)
        .into_model::<CandidateTrack>()
        .stream(conn)
        .await
        .wrap_err("Failed to query ranked candidates")?;

    Ok(stream.map_err(|error| {
        color_eyre::eyre::Report::new(error).wrap_err("Failed to read ranked candidate")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{insert_comment, insert_item, test_db};

    async fn collect(db: &crate::database::Database, provider: Provider) -> Vec<CandidateTrack> {
        ranked_candidates(&db.conn, provider)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[test]
    fn test_track_id_from_composite() {
        assert_eq!(track_id_from_composite("provider::TRACK123"), Some("TRACK123"));
        assert_eq!(
            track_id_from_composite("spotify::4uLU6hMCjMI75M1A2tKUQC::extra"),
            Some("4uLU6hMCjMI75M1A2tKUQC")
        );
        assert_eq!(track_id_from_composite("4uLU6hMCjMI75M1A2tKUQC"), None);
        assert_eq!(track_id_from_composite("spotify::"), None);
    }

    #[tokio::test]
    async fn test_orders_by_score_descending() {
        let db = test_db().await;
        insert_item(&db, 3, "spotify::TRACKC").await;
        insert_item(&db, 1, "spotify::TRACKA").await;
        insert_item(&db, 2, "spotify::TRACKB").await;
        insert_comment(&db, 1, 10, 2).await;
        insert_comment(&db, 2, 3, 1).await;
        insert_comment(&db, 3, 0, 5).await;

        let candidates = collect(&db, Provider::Spotify).await;

        let ranked: Vec<(&str, i64)> = candidates
            .iter()
            .map(|c| (c.external_id.as_str(), c.score))
            .collect();
        assert_eq!(
            ranked,
            vec![
                ("spotify::TRACKA", 8),
                ("spotify::TRACKB", 2),
                ("spotify::TRACKC", -5)
            ]
        );
    }

    #[tokio::test]
    async fn test_skips_short_provider_ids() {
        let db = test_db().await;
        insert_item(&db, 1, "").await;
        insert_item(&db, 2, "sp::1").await;
        insert_item(&db, 3, "sp::12").await;
        insert_comment(&db, 1, 50, 0).await;
        insert_comment(&db, 2, 40, 0).await;
        insert_comment(&db, 3, 1, 0).await;

        let candidates = collect(&db, Provider::Spotify).await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].item_id, 3);
        assert!(
            candidates
                .iter()
                .all(|c| c.external_id.chars().count() > MIN_PROVIDER_ID_LEN as usize)
        );
    }

    #[tokio::test]
    async fn test_sums_multiple_comments_and_scores_uncommented_as_zero() {
        let db = test_db().await;
        insert_item(&db, 1, "spotify::TRACKA").await;
        insert_item(&db, 2, "spotify::TRACKB").await;
        insert_comment(&db, 1, 2, 5).await;
        insert_comment(&db, 1, 1, 0).await;

        let candidates = collect(&db, Provider::Spotify).await;

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].external_id, "spotify::TRACKB");
        assert_eq!(candidates[0].score, 0);
        assert_eq!(candidates[1].external_id, "spotify::TRACKA");
        assert_eq!(candidates[1].score, -2);
    }

    #[tokio::test]
    async fn test_excludes_soft_deleted_items() {
        let db = test_db().await;
        insert_item(&db, 1, "spotify::TRACKA").await;
        insert_item(&db, 2, "spotify::TRACKB").await;
        crate::test_utils::soft_delete_item(&db, 2).await;

        let candidates = collect(&db, Provider::Spotify).await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].item_id, 1);
    }

    #[tokio::test]
    async fn test_other_provider_column() {
        let db = test_db().await;
        insert_item(&db, 1, "spotify::TRACKA").await;

        // Inserted items carry no deezer id
        assert!(collect(&db, Provider::Deezer).await.is_empty());
        assert_eq!(collect(&db, Provider::Spotify).await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_database() {
        let db = test_db().await;
        assert!(collect(&db, Provider::Spotify).await.is_empty());
    }
}
