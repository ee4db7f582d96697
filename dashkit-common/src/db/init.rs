//! Database initialization
//!
//! Creates the SQLite database on first run and the tables used by the
//! tile and layout stores. All statements are idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets readers proceed while a layout commit holds the write lock
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every dashkit table (safe to call multiple times)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_tiles_table(pool).await?;
    create_layouts_table(pool).await?;
    create_layout_by_report_table(pool).await?;
    Ok(())
}

/// Tiles are immutable rows; `tile_options` is a JSON document
pub async fn create_tiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tiles (
            dashboard_id TEXT NOT NULL,
            tile_id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            tile_options TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (dashboard_id, tile_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One versioned layout per (owner, dashboard)
pub async fn create_layouts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS layouts (
            owner_id TEXT NOT NULL,
            dashboard_id TEXT NOT NULL,
            layout_id TEXT NOT NULL,
            layout_def TEXT NOT NULL,
            layout_props TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (owner_id, dashboard_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Index of layouts that may need processing for a report
pub async fn create_layout_by_report_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS layout_by_report (
            owner_id TEXT NOT NULL,
            report_id TEXT NOT NULL,
            tags TEXT NOT NULL,
            label TEXT NOT NULL,
            dashboard_id TEXT NOT NULL,
            layout_id TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (owner_id, report_id, tags, label, dashboard_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
