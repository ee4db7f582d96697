//! Shared fixtures for dashkit-tpc integration tests

#![allow(dead_code)]

use dashkit_common::config::TpcConfig;
use dashkit_common::events::EventBus;
use dashkit_tpc::layout::{self, Layout};
use dashkit_tpc::series::{FilteringExpr, SeriesSpec};
use dashkit_tpc::{
    Backend, LayoutModificationResult, ReportInstance, Tile, TileConfig, TileStore, Tpcreator,
    UiSpecEntry,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

/// In-memory database with the dashkit schema
///
/// A single connection that never expires: every connection to
/// `sqlite::memory:` is a separate database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    dashkit_common::db::create_schema(&pool)
        .await
        .expect("Failed to create schema");
    pool
}

pub fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// One owner, report and dashboard on a fresh database
pub struct Fixture {
    pub pool: SqlitePool,
    pub backend: Backend,
    pub events: EventBus,
    pub tpcreator: Tpcreator,
    pub owner_id: Uuid,
    pub report_id: Uuid,
    pub dashboard_id: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(TpcConfig::default()).await
    }

    pub async fn with_config(config: TpcConfig) -> Self {
        let pool = test_pool().await;
        let backend = Backend::sqlite(pool.clone());
        let events = EventBus::new(100);
        let tpcreator = Tpcreator::new(backend.clone(), events.clone(), config);
        Self {
            pool,
            backend,
            events,
            tpcreator,
            owner_id: Uuid::new_v4(),
            report_id: Uuid::new_v4(),
            dashboard_id: Uuid::new_v4(),
        }
    }

    /// Another dashboard of the same owner on the same database
    pub fn other_dashboard(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            backend: self.backend.clone(),
            events: self.events.clone(),
            tpcreator: self.tpcreator.clone(),
            owner_id: self.owner_id,
            report_id: self.report_id,
            dashboard_id: Uuid::new_v4(),
        }
    }

    /// Master config with one series and the given UISpec
    pub fn master_config(&self, tile_tags: &[&str], uispec: &[(&str, &str)]) -> TileConfig {
        TileConfig {
            tags: tags(tile_tags),
            series_spec_list: vec![SeriesSpec::new(0, -1, Some(FilteringExpr::eq("0")))],
            tpcreator_uispec: Some(
                uispec
                    .iter()
                    .map(|(tag, prefix)| UiSpecEntry::new(*tag, *prefix))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// Insert and place a tile built from `config` for `report_id`
    pub async fn insert_tile_for(&self, report_id: Uuid, config: TileConfig) -> Tile {
        let options = config
            .into_options(self.owner_id, report_id)
            .expect("invalid tile config");
        let tile = self
            .backend
            .tiles
            .insert_tile_with_options(self.dashboard_id, options)
            .await
            .expect("tile insert failed");
        layout::place_tile(&self.backend, &tile, None, None)
            .await
            .expect("place_tile failed")
            .expect("tile not placed");
        tile
    }

    pub async fn insert_master(&self, tile_tags: &[&str], uispec: &[(&str, &str)]) -> Tile {
        let config = self.master_config(tile_tags, uispec);
        self.insert_tile_for(self.report_id, config).await
    }

    pub async fn process(&self, instance_tags: &[&str]) -> Vec<LayoutModificationResult> {
        self.process_with(self.report_id, instance_tags, false).await
    }

    pub async fn process_with(
        &self,
        report_id: Uuid,
        instance_tags: &[&str],
        make_first_master: bool,
    ) -> Vec<LayoutModificationResult> {
        let instance = ReportInstance::new(self.owner_id, report_id, tags(instance_tags));
        self.tpcreator
            .handle_tpcreator(self.owner_id, report_id, &instance, make_first_master)
            .await
            .expect("handle_tpcreator failed")
    }

    pub async fn layout(&self) -> Layout {
        self.backend
            .layouts
            .select_layout(self.owner_id, self.dashboard_id)
            .await
            .expect("select_layout failed")
    }

    /// Placed tiles, top to bottom and left to right
    pub async fn tiles_by_position(&self) -> Vec<Tile> {
        let layout = self.layout().await;
        let ids = layout.tile_ids_by_position();
        let mut tiles = self
            .backend
            .tiles
            .select_tiles_multi(self.dashboard_id, &ids)
            .await
            .expect("select_tiles_multi failed");
        ids.iter().filter_map(|id| tiles.remove(id)).collect()
    }

    pub async fn tags_by_position(&self) -> Vec<Vec<String>> {
        self.tiles_by_position()
            .await
            .into_iter()
            .map(|t| t.options.tags)
            .collect()
    }

    pub async fn tile_row_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM tiles")
            .fetch_one(&self.pool)
            .await
            .expect("count failed")
    }
}
