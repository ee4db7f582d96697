//! Storage interfaces for tiles and layouts
//!
//! The TPCreator core only talks to [`TileStore`] and [`LayoutStore`].
//! [`SqliteStore`] implements both on top of the dashkit SQLite schema.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::{Result, TpcError};
use crate::layout::Layout;
use crate::tile::{Tile, TileOptions};
use crate::title::{TagPostfixTitles, TitleGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Label of the layout_by_report rows maintained for master tiles
pub const TPCREATOR_LABEL: &str = "tpcreator";

/// Index row telling that a dashboard layout may react to a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutByReportRow {
    pub owner_id: Uuid,
    pub report_id: Uuid,
    pub tags: Vec<String>,
    pub label: String,
    pub dashboard_id: Uuid,
    pub layout_id: Uuid,
}

impl LayoutByReportRow {
    /// Row registered for a master tile of `report_id`
    pub fn tpcreator(owner_id: Uuid, report_id: Uuid, dashboard_id: Uuid, layout_id: Uuid) -> Self {
        Self {
            owner_id,
            report_id,
            tags: Vec::new(),
            label: TPCREATOR_LABEL.to_string(),
            dashboard_id,
            layout_id,
        }
    }
}

/// Tile persistence
#[async_trait]
pub trait TileStore: Send + Sync {
    async fn select_tile(&self, dashboard_id: Uuid, tile_id: Uuid) -> Result<Option<Tile>>;

    /// Tiles found among `tile_ids`; missing ids are absent from the map
    async fn select_tiles_multi(
        &self,
        dashboard_id: Uuid,
        tile_ids: &[Uuid],
    ) -> Result<BTreeMap<Uuid, Tile>>;

    async fn insert_tile_with_options(
        &self,
        dashboard_id: Uuid,
        options: TileOptions,
    ) -> Result<Tile> {
        let mut tiles = self
            .insert_tiles_with_options_multi(dashboard_id, vec![options])
            .await?;
        tiles.pop().ok_or_else(|| {
            TpcError::Common(dashkit_common::Error::Internal(
                "Tile insert returned no tile".to_string(),
            ))
        })
    }

    /// Insert one new tile per options entry, in order
    async fn insert_tiles_with_options_multi(
        &self,
        dashboard_id: Uuid,
        options: Vec<TileOptions>,
    ) -> Result<Vec<Tile>>;
}

/// Versioned layout persistence and the layout_by_report index
#[async_trait]
pub trait LayoutStore: Send + Sync {
    /// Latest layout; an empty unversioned layout when none was committed
    async fn select_layout(&self, owner_id: Uuid, dashboard_id: Uuid) -> Result<Layout>;

    /// Compare-and-set commit
    ///
    /// Writes `layout` as a new version only if the stored version is still
    /// `expected_layout_id` (`None`: no layout stored yet). `staged_tiles` are
    /// inserted in the same transaction. Returns the new layout id, or `None`
    /// when another writer got there first.
    async fn commit_layout(
        &self,
        layout: &Layout,
        expected_layout_id: Option<Uuid>,
        staged_tiles: &[Tile],
    ) -> Result<Option<Uuid>>;

    async fn select_layout_by_report_multi(
        &self,
        owner_id: Uuid,
        report_id: Uuid,
        filter_tags: &[String],
        label: &str,
        limit: usize,
    ) -> Result<Vec<LayoutByReportRow>>;

    /// Insert or refresh the layout id of a row
    async fn insert_layout_by_report(&self, row: &LayoutByReportRow) -> Result<()>;

    async fn delete_layout_by_report(&self, row: &LayoutByReportRow) -> Result<()>;
}

/// Collaborators of the TPCreator core
#[derive(Clone)]
pub struct Backend {
    pub layouts: Arc<dyn LayoutStore>,
    pub tiles: Arc<dyn TileStore>,
    pub titles: Arc<dyn TitleGenerator>,
}

impl Backend {
    pub fn new(
        layouts: Arc<dyn LayoutStore>,
        tiles: Arc<dyn TileStore>,
        titles: Arc<dyn TitleGenerator>,
    ) -> Self {
        Self {
            layouts,
            tiles,
            titles,
        }
    }

    /// SQLite-backed stores with tag postfix titles
    pub fn sqlite(pool: SqlitePool) -> Self {
        let store = Arc::new(SqliteStore::new(pool));
        Self {
            layouts: store.clone(),
            tiles: store,
            titles: Arc::new(TagPostfixTitles),
        }
    }
}
