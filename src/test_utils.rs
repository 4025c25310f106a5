use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelBehavior, ColumnTrait, ConnectionTrait, Database as SeaDatabase, EntityTrait,
    QueryFilter, Set,
};

use crate::database::Database;
use crate::entities::{comment, item};
use crate::services::token_store::TokenStore;

pub async fn test_db() -> Arc<Database> {
    let conn = SeaDatabase::connect("sqlite::memory:?mode=rwc")
        .await
        .unwrap();

    // Enable foreign keys
    conn.execute_unprepared("PRAGMA foreign_keys = ON")
        .await
        .unwrap();

    for stmt in schema_statements(include_str!("../schema.sql")) {
        conn.execute_unprepared(&stmt)
            .await
            .unwrap_or_else(|e| panic!("Failed to execute SQL: {}\nStatement: {}", e, stmt));
    }

    Arc::new(Database { conn })
}

/// Comment lines are dropped before splitting so a `;` inside them is harmless.
fn schema_statements(schema: &str) -> Vec<String> {
    let without_comments = schema
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    without_comments
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn test_token_store() -> TokenStore {
    let conn = SeaDatabase::connect("sqlite::memory:?mode=rwc")
        .await
        .unwrap();
    TokenStore::open(Arc::new(Database { conn })).await.unwrap()
}

pub async fn insert_item(db: &Database, item_id: i64, spotify_id: &str) {
    let model = item::ActiveModel {
        item_id: Set(item_id),
        title: Set(format!("Item {}", item_id)),
        spotify_id: Set(spotify_id.to_string()),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        deleted_at: Set(None),
        ..item::ActiveModel::new()
    };
    item::Entity::insert(model)
        .exec_without_returning(&db.conn)
        .await
        .unwrap();
}

pub async fn insert_comment(db: &Database, item_id: i64, up: i32, down: i32) {
    let model = comment::ActiveModel {
        item_id: Set(item_id),
        up: Set(up),
        down: Set(down),
        content: Set("nice".into()),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        deleted_at: Set(None),
        ..comment::ActiveModel::new()
    };
    comment::Entity::insert(model)
        .exec_without_returning(&db.conn)
        .await
        .unwrap();
}

pub async fn soft_delete_item(db: &Database, item_id: i64) {
    item::Entity::update_many()
        .col_expr(
            item::Column::DeletedAt,
            sea_orm::sea_query::Expr::value(Some(Utc::now())),
        )
        .filter(item::Column::ItemId.eq(item_id))
        .exec(&db.conn)
        .await
        .unwrap();
}

mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_ignore_semicolons_in_comments() {
        let statements = schema_statements(
            "-- header; with a semicolon\nCREATE TABLE a (id INTEGER);\n  -- note; here\nCREATE INDEX i ON a(id);\n",
        );
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id INTEGER)", "CREATE INDEX i ON a(id)"]
        );
    }

    #[tokio::test]
    async fn test_db_loads_item_schema() {
        let db = test_db().await;
        insert_item(&db, 42, "spotify::4uLU6hMCjMI75M1A2tKUQC").await;
        insert_comment(&db, 42, 3, 1).await;

        assert_eq!(item::Entity::find().all(&db.conn).await.unwrap().len(), 1);
        assert_eq!(comment::Entity::find().all(&db.conn).await.unwrap().len(), 1);
    }
}
