//! SQLite implementation of the tile and layout stores

use super::{LayoutByReportRow, LayoutStore, TileStore};
use crate::error::Result;
use crate::layout::{Layout, TileProps, VisualOptions};
use crate::tile::{Tile, TileOptions};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Tile and layout store over a dashkit database pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn tile_from_row(row: &SqliteRow) -> Result<Tile> {
    let dashboard_id: String = row.get("dashboard_id");
    let tile_id: String = row.get("tile_id");
    let tile_options: String = row.get("tile_options");

    Ok(Tile {
        dashboard_id: Uuid::parse_str(&dashboard_id)?,
        tile_id: Uuid::parse_str(&tile_id)?,
        options: serde_json::from_str(&tile_options)?,
    })
}

fn layout_by_report_from_row(row: &SqliteRow) -> Result<LayoutByReportRow> {
    let owner_id: String = row.get("owner_id");
    let report_id: String = row.get("report_id");
    let tags: String = row.get("tags");
    let dashboard_id: String = row.get("dashboard_id");
    let layout_id: String = row.get("layout_id");

    Ok(LayoutByReportRow {
        owner_id: Uuid::parse_str(&owner_id)?,
        report_id: Uuid::parse_str(&report_id)?,
        tags: serde_json::from_str(&tags)?,
        label: row.get("label"),
        dashboard_id: Uuid::parse_str(&dashboard_id)?,
        layout_id: Uuid::parse_str(&layout_id)?,
    })
}

/// Tags column value; rows are keyed by the sorted tag list
fn tags_key(tags: &[String]) -> Result<String> {
    let mut tags = tags.to_vec();
    tags.sort();
    tags.dedup();
    Ok(serde_json::to_string(&tags)?)
}

async fn insert_tile_rows(conn: &mut SqliteConnection, tiles: &[Tile]) -> Result<()> {
    for tile in tiles {
        sqlx::query(
            r#"
            INSERT INTO tiles (dashboard_id, tile_id, owner_id, tile_options)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(tile.dashboard_id.to_string())
        .bind(tile.tile_id.to_string())
        .bind(tile.owner_id().to_string())
        .bind(serde_json::to_string(&tile.options)?)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl TileStore for SqliteStore {
    async fn select_tile(&self, dashboard_id: Uuid, tile_id: Uuid) -> Result<Option<Tile>> {
        let row = sqlx::query(
            r#"
            SELECT dashboard_id, tile_id, tile_options
            FROM tiles
            WHERE dashboard_id = ? AND tile_id = ?
            "#,
        )
        .bind(dashboard_id.to_string())
        .bind(tile_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(tile_from_row).transpose()
    }

    async fn select_tiles_multi(
        &self,
        dashboard_id: Uuid,
        tile_ids: &[Uuid],
    ) -> Result<BTreeMap<Uuid, Tile>> {
        if tile_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let placeholders = vec!["?"; tile_ids.len()].join(", ");
        let sql = format!(
            "SELECT dashboard_id, tile_id, tile_options FROM tiles \
             WHERE dashboard_id = ? AND tile_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(dashboard_id.to_string());
        for tile_id in tile_ids {
            query = query.bind(tile_id.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut res = BTreeMap::new();
        for row in &rows {
            let tile = tile_from_row(row)?;
            res.insert(tile.tile_id, tile);
        }
        Ok(res)
    }

    async fn insert_tiles_with_options_multi(
        &self,
        dashboard_id: Uuid,
        options: Vec<TileOptions>,
    ) -> Result<Vec<Tile>> {
        if options.is_empty() {
            return Ok(Vec::new());
        }

        let tiles: Vec<Tile> = options
            .into_iter()
            .map(|opts| Tile::create(dashboard_id, opts))
            .collect();

        let mut tx = self.pool.begin().await?;
        insert_tile_rows(&mut *tx, &tiles).await?;
        tx.commit().await?;

        debug!(
            dashboard_id = %dashboard_id,
            count = tiles.len(),
            "Inserted tiles"
        );
        Ok(tiles)
    }
}

#[async_trait]
impl LayoutStore for SqliteStore {
    async fn select_layout(&self, owner_id: Uuid, dashboard_id: Uuid) -> Result<Layout> {
        let row = sqlx::query(
            r#"
            SELECT layout_id, layout_def, layout_props
            FROM layouts
            WHERE owner_id = ? AND dashboard_id = ?
            "#,
        )
        .bind(owner_id.to_string())
        .bind(dashboard_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(Layout::empty(owner_id, dashboard_id));
        };

        let layout_id: String = row.get("layout_id");
        let layout_def: String = row.get("layout_def");
        let layout_props: String = row.get("layout_props");

        let layout_dict: BTreeMap<Uuid, VisualOptions> = serde_json::from_str(&layout_def)?;
        let layout_props: BTreeMap<Uuid, TileProps> = serde_json::from_str(&layout_props)?;

        Ok(Layout {
            owner_id,
            dashboard_id,
            layout_id: Some(Uuid::parse_str(&layout_id)?),
            layout_dict,
            layout_props,
        })
    }

    async fn commit_layout(
        &self,
        layout: &Layout,
        expected_layout_id: Option<Uuid>,
        staged_tiles: &[Tile],
    ) -> Result<Option<Uuid>> {
        let new_layout_id = Uuid::new_v4();
        let layout_def = serde_json::to_string(&layout.layout_dict)?;
        let layout_props = serde_json::to_string(&layout.layout_props)?;

        let mut tx = self.pool.begin().await?;

        let result = match expected_layout_id {
            Some(expected) => {
                sqlx::query(
                    r#"
                    UPDATE layouts
                    SET layout_id = ?, layout_def = ?, layout_props = ?,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE owner_id = ? AND dashboard_id = ? AND layout_id = ?
                    "#,
                )
                .bind(new_layout_id.to_string())
                .bind(&layout_def)
                .bind(&layout_props)
                .bind(layout.owner_id.to_string())
                .bind(layout.dashboard_id.to_string())
                .bind(expected.to_string())
                .execute(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO layouts (owner_id, dashboard_id, layout_id, layout_def, layout_props)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(owner_id, dashboard_id) DO NOTHING
                    "#,
                )
                .bind(layout.owner_id.to_string())
                .bind(layout.dashboard_id.to_string())
                .bind(new_layout_id.to_string())
                .bind(&layout_def)
                .bind(&layout_props)
                .execute(&mut *tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(
                owner_id = %layout.owner_id,
                dashboard_id = %layout.dashboard_id,
                expected_layout_id = ?expected_layout_id,
                "Layout version changed concurrently"
            );
            return Ok(None);
        }

        insert_tile_rows(&mut *tx, staged_tiles).await?;
        tx.commit().await?;

        Ok(Some(new_layout_id))
    }

    async fn select_layout_by_report_multi(
        &self,
        owner_id: Uuid,
        report_id: Uuid,
        filter_tags: &[String],
        label: &str,
        limit: usize,
    ) -> Result<Vec<LayoutByReportRow>> {
        let rows = sqlx::query(
            r#"
            SELECT owner_id, report_id, tags, label, dashboard_id, layout_id
            FROM layout_by_report
            WHERE owner_id = ? AND report_id = ? AND tags = ? AND label = ?
            ORDER BY created_at, dashboard_id
            LIMIT ?
            "#,
        )
        .bind(owner_id.to_string())
        .bind(report_id.to_string())
        .bind(tags_key(filter_tags)?)
        .bind(label)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(layout_by_report_from_row).collect()
    }

    async fn insert_layout_by_report(&self, row: &LayoutByReportRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO layout_by_report (owner_id, report_id, tags, label, dashboard_id, layout_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, report_id, tags, label, dashboard_id)
            DO UPDATE SET layout_id = excluded.layout_id
            "#,
        )
        .bind(row.owner_id.to_string())
        .bind(row.report_id.to_string())
        .bind(tags_key(&row.tags)?)
        .bind(&row.label)
        .bind(row.dashboard_id.to_string())
        .bind(row.layout_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_layout_by_report(&self, row: &LayoutByReportRow) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM layout_by_report
            WHERE owner_id = ? AND report_id = ? AND tags = ? AND label = ?
              AND dashboard_id = ? AND layout_id = ?
            "#,
        )
        .bind(row.owner_id.to_string())
        .bind(row.report_id.to_string())
        .bind(tags_key(&row.tags)?)
        .bind(&row.label)
        .bind(row.dashboard_id.to_string())
        .bind(row.layout_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileRole;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        dashkit_common::db::create_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn options(owner_id: Uuid) -> TileOptions {
        TileOptions {
            tw_type: Default::default(),
            owner_id,
            report_id: Uuid::new_v4(),
            tags: vec!["b".to_string(), "a".to_string()],
            series_configs: vec![],
            tile_title: None,
            role: TileRole::Plain,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_tiles_roundtrip_through_db() {
        let store = store().await;
        let dashboard_id = Uuid::new_v4();
        let owner_id = Uuid::new_v4();

        let inserted = store
            .insert_tiles_with_options_multi(dashboard_id, vec![options(owner_id), options(owner_id)])
            .await
            .unwrap();
        assert_eq!(inserted.len(), 2);
        assert_eq!(inserted[0].tags(), &["a".to_string(), "b".to_string()]);

        let selected = store
            .select_tile(dashboard_id, inserted[0].tile_id)
            .await
            .unwrap();
        assert_eq!(selected.as_ref(), Some(&inserted[0]));

        let ids: Vec<Uuid> = inserted.iter().map(|t| t.tile_id).chain([Uuid::new_v4()]).collect();
        let multi = store.select_tiles_multi(dashboard_id, &ids).await.unwrap();
        assert_eq!(multi.len(), 2);

        assert!(store
            .select_tile(Uuid::new_v4(), inserted[0].tile_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_commit_layout_compare_and_set() {
        let store = store().await;
        let owner_id = Uuid::new_v4();
        let dashboard_id = Uuid::new_v4();

        let layout = store.select_layout(owner_id, dashboard_id).await.unwrap();
        assert_eq!(layout.layout_id, None);

        let staged = Tile::create(dashboard_id, options(owner_id));
        let mut next = layout.clone();
        next.insert_tile(&staged, VisualOptions::new(0, 0, 4, 4));

        let v1 = store
            .commit_layout(&next, None, std::slice::from_ref(&staged))
            .await
            .unwrap()
            .unwrap();
        assert!(store.select_tile(dashboard_id, staged.tile_id).await.unwrap().is_some());

        // a second first-version commit loses
        assert_eq!(store.commit_layout(&next, None, &[]).await.unwrap(), None);

        let loaded = store.select_layout(owner_id, dashboard_id).await.unwrap();
        assert_eq!(loaded.layout_id, Some(v1));
        assert!(loaded.same_content(&next));

        // stale expected version loses and does not insert staged tiles
        let lost = Tile::create(dashboard_id, options(owner_id));
        assert_eq!(
            store
                .commit_layout(&next, Some(Uuid::new_v4()), std::slice::from_ref(&lost))
                .await
                .unwrap(),
            None
        );
        assert!(store.select_tile(dashboard_id, lost.tile_id).await.unwrap().is_none());

        let v2 = store.commit_layout(&next, Some(v1), &[]).await.unwrap();
        assert!(v2.is_some());
        assert_ne!(v2, Some(v1));
    }

    #[tokio::test]
    async fn test_layout_by_report_upsert_and_delete() {
        let store = store().await;
        let owner_id = Uuid::new_v4();
        let report_id = Uuid::new_v4();
        let dashboard_id = Uuid::new_v4();

        let row = LayoutByReportRow::tpcreator(owner_id, report_id, dashboard_id, Uuid::new_v4());
        store.insert_layout_by_report(&row).await.unwrap();

        let refreshed = LayoutByReportRow {
            layout_id: Uuid::new_v4(),
            ..row.clone()
        };
        store.insert_layout_by_report(&refreshed).await.unwrap();

        let rows = store
            .select_layout_by_report_multi(owner_id, report_id, &[], "tpcreator", 10)
            .await
            .unwrap();
        assert_eq!(rows, vec![refreshed.clone()]);

        // outdated layout id does not match
        store.delete_layout_by_report(&row).await.unwrap();
        let rows = store
            .select_layout_by_report_multi(owner_id, report_id, &[], "tpcreator", 10)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        store.delete_layout_by_report(&refreshed).await.unwrap();
        let rows = store
            .select_layout_by_report_multi(owner_id, report_id, &[], "tpcreator", 10)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
