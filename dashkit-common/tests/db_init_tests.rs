//! Tests for database initialization

use dashkit_common::db::{create_schema, init_database};
use sqlx::Row;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("dashkit.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("dashkit.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("dashkit.db");
    let pool = init_database(&db_path).await.unwrap();

    create_schema(&pool).await.unwrap();
    create_schema(&pool).await.unwrap();

    let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(&pool)
        .await
        .unwrap();
    let tables: Vec<String> = rows.iter().map(|r| r.get("name")).collect();

    for expected in ["layout_by_report", "layouts", "tiles"] {
        assert!(
            tables.iter().any(|t| t == expected),
            "missing table {}",
            expected
        );
    }
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("dashkit.db")).await.unwrap();

    let row = sqlx::query("PRAGMA journal_mode").fetch_one(&pool).await.unwrap();
    let mode: String = row.get(0);
    assert_eq!(mode.to_lowercase(), "wal");
}
