//! Layout modifications
//!
//! A [`Mod`] mutates an in-memory copy of the latest layout through a
//! [`LayoutMod`] context. [`apply_mods`] runs a list of mods and commits the
//! result with compare-and-set on the layout version. When another writer
//! committed in between, the whole list is recomputed against the fresh
//! layout.
//!
//! Tiles created by mods are staged in the context and only written together
//! with the layout, so a lost race leaves no tile rows behind.

use super::packing;
use super::{Layout, VisualOptions};
use crate::error::{Result, TpcError};
use crate::report::ReportInstance;
use crate::store::{Backend, LayoutByReportRow, LayoutStore, TileStore};
use crate::tile::{Tile, TileOptions};
use crate::title::TitleGenerator;
use crate::tpcreator;
use async_trait::async_trait;
use dashkit_common::events::DashEvent;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempts made by layout operations that don't set their own limit
pub const DEFAULT_MAX_TRIES: usize = 10;

/// Guard of a conditional mod, evaluated against the earlier mods' effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// An earlier mod placed new tiles
    NewTiles,
    /// An earlier mod replaced or detached tiles
    TileReplacement,
}

/// A single layout modification
#[derive(Debug, Clone)]
pub enum Mod {
    /// Derive tiles from the masters of a layout_by_report row's layout
    Tpcreator {
        report_instance: ReportInstance,
        layout_row: LayoutByReportRow,
        max_tpcreated: usize,
    },
    /// Place a tile at the first free spot
    PlaceTile { tile: Tile, size_of: Option<Uuid> },
    /// Swap tiles keeping their visual options; `None` detaches
    ReplaceTiles {
        replacement: BTreeMap<Uuid, Option<Tile>>,
        sync_tpcreated: bool,
    },
    Repack { put_master_first: bool },
    PackUpwards,
    /// Make the first tile of every family (by tag order) its master
    PromoteFirstAsMaster,
    /// Force derived tiles to the size of their master
    SyncDerivedSizes { master_tile_id: Uuid },
    If { condition: Condition, inner: Box<Mod> },
}

impl Mod {
    pub fn if_new_tiles(inner: Mod) -> Mod {
        Mod::If {
            condition: Condition::NewTiles,
            inner: Box::new(inner),
        }
    }

    pub fn if_tile_replacement(inner: Mod) -> Mod {
        Mod::If {
            condition: Condition::TileReplacement,
            inner: Box::new(inner),
        }
    }

    async fn apply(&self, ctx: &mut LayoutMod) -> Result<()> {
        let mut current = self;
        while let Mod::If { condition, inner } = current {
            if !ctx.holds(*condition) {
                return Ok(());
            }
            current = inner.as_ref();
        }

        match current {
            Mod::Tpcreator {
                report_instance,
                layout_row,
                max_tpcreated,
            } => {
                tpcreator::run_tpcreator_mod(ctx, report_instance, layout_row, *max_tpcreated)
                    .await
            }
            Mod::PlaceTile { tile, size_of } => ctx.place_tile(tile, *size_of).map(|_| ()),
            Mod::ReplaceTiles {
                replacement,
                sync_tpcreated,
            } => ctx.replace_tiles(replacement.clone(), *sync_tpcreated).await,
            Mod::Repack { put_master_first } => {
                ctx.repack(*put_master_first);
                Ok(())
            }
            Mod::PackUpwards => {
                ctx.pack_upwards();
                Ok(())
            }
            Mod::PromoteFirstAsMaster => tpcreator::promote::promote_first_as_master(ctx).await,
            Mod::SyncDerivedSizes { master_tile_id } => {
                tpcreator::promote::sync_derived_sizes(ctx, *master_tile_id)
            }
            // guards were unwrapped by the loop above
            Mod::If { .. } => Ok(()),
        }
    }
}

/// Tile store overlay holding tiles created during a mod run
pub struct StagingTiles {
    inner: Arc<dyn TileStore>,
    staged: Mutex<Vec<Tile>>,
}

impl StagingTiles {
    pub fn new(inner: Arc<dyn TileStore>) -> Self {
        Self {
            inner,
            staged: Mutex::new(Vec::new()),
        }
    }

    async fn take_staged(&self) -> Vec<Tile> {
        std::mem::take(&mut *self.staged.lock().await)
    }
}

#[async_trait]
impl TileStore for StagingTiles {
    async fn select_tile(&self, dashboard_id: Uuid, tile_id: Uuid) -> Result<Option<Tile>> {
        let staged = self
            .staged
            .lock()
            .await
            .iter()
            .find(|t| t.dashboard_id == dashboard_id && t.tile_id == tile_id)
            .cloned();
        match staged {
            Some(tile) => Ok(Some(tile)),
            None => self.inner.select_tile(dashboard_id, tile_id).await,
        }
    }

    async fn select_tiles_multi(
        &self,
        dashboard_id: Uuid,
        tile_ids: &[Uuid],
    ) -> Result<BTreeMap<Uuid, Tile>> {
        let mut res = BTreeMap::new();
        {
            let staged = self.staged.lock().await;
            for tile in staged.iter() {
                if tile.dashboard_id == dashboard_id && tile_ids.contains(&tile.tile_id) {
                    res.insert(tile.tile_id, tile.clone());
                }
            }
        }

        let rest: Vec<Uuid> = tile_ids
            .iter()
            .filter(|id| !res.contains_key(id))
            .copied()
            .collect();
        res.extend(self.inner.select_tiles_multi(dashboard_id, &rest).await?);
        Ok(res)
    }

    async fn insert_tiles_with_options_multi(
        &self,
        dashboard_id: Uuid,
        options: Vec<TileOptions>,
    ) -> Result<Vec<Tile>> {
        let tiles: Vec<Tile> = options
            .into_iter()
            .map(|opts| Tile::create(dashboard_id, opts))
            .collect();
        self.staged.lock().await.extend(tiles.iter().cloned());
        Ok(tiles)
    }
}

/// Mutation context shared by the mods of one attempt
pub struct LayoutMod {
    pub layout: Layout,
    /// Tiles placed by earlier mods, in placement order
    pub new_tiles: Vec<Tile>,
    /// Replaced tile id to its replacement (`None`: detached)
    pub tile_replacement: BTreeMap<Uuid, Option<Tile>>,
    pub tiles: StagingTiles,
    pub titles: Arc<dyn TitleGenerator>,
    pub layouts: Arc<dyn LayoutStore>,
}

impl LayoutMod {
    pub fn new(layout: Layout, backend: &Backend) -> Self {
        Self {
            layout,
            new_tiles: Vec::new(),
            tile_replacement: BTreeMap::new(),
            tiles: StagingTiles::new(backend.tiles.clone()),
            titles: backend.titles.clone(),
            layouts: backend.layouts.clone(),
        }
    }

    pub fn holds(&self, condition: Condition) -> bool {
        match condition {
            Condition::NewTiles => !self.new_tiles.is_empty(),
            Condition::TileReplacement => !self.tile_replacement.is_empty(),
        }
    }

    /// Place a tile not yet in the layout
    pub fn place_tile(&mut self, tile: &Tile, size_of: Option<Uuid>) -> Result<VisualOptions> {
        if self.layout.contains(&tile.tile_id) {
            debug!(tile_id = %tile.tile_id, "Tile already placed");
            return Err(TpcError::ModificationImpossible);
        }

        let (width, height) = size_of
            .and_then(|id| self.layout.layout_dict.get(&id))
            .map(|vo| (vo.width, vo.height))
            .unwrap_or((packing::DEFAULT_TILE_WIDTH, packing::DEFAULT_TILE_HEIGHT));

        let vo = packing::place(&mut self.layout.layout_dict, tile.tile_id, width, height);
        self.layout
            .layout_props
            .insert(tile.tile_id, super::TileProps::of(tile));
        self.new_tiles.push(tile.clone());
        Ok(vo)
    }

    /// Swap tiles in place; a master replaced by a master takes its family along
    pub async fn replace_tiles(
        &mut self,
        mut replacement: BTreeMap<Uuid, Option<Tile>>,
        sync_tpcreated: bool,
    ) -> Result<()> {
        if let Some(missing) = replacement.keys().find(|id| !self.layout.contains(id)) {
            debug!(tile_id = %missing, "Replaced tile is not placed");
            return Err(TpcError::ModificationImpossible);
        }

        if sync_tpcreated {
            let skip: BTreeSet<Uuid> = replacement.keys().copied().collect();
            let mut family_replacement = BTreeMap::new();

            for (old_id, new_tile) in &replacement {
                let Some(new_master) = new_tile.as_ref().filter(|t| t.is_master()) else {
                    continue;
                };
                let old_is_master = self
                    .layout
                    .get_tile_props(old_id)
                    .is_some_and(|p| p.is_master);
                if !old_is_master {
                    continue;
                }

                let Some(old_master) = self
                    .tiles
                    .select_tile(self.layout.dashboard_id, *old_id)
                    .await?
                else {
                    warn!(tile_id = %old_id, "Replaced master tile not found");
                    continue;
                };

                let replaced = tpcreator::promote::replace_derived(
                    &self.layout,
                    &old_master,
                    new_master,
                    true,
                    &skip,
                    self.titles.as_ref(),
                    &self.tiles,
                )
                .await?;
                family_replacement.extend(replaced);
            }

            for (old_id, tile) in family_replacement {
                replacement.entry(old_id).or_insert(Some(tile));
            }
        }

        for (old_id, new_tile) in replacement {
            let Some(vo) = self.layout.remove_tile(&old_id) else {
                continue;
            };
            if let Some(tile) = &new_tile {
                self.layout.insert_tile(tile, vo);
            }
            self.tile_replacement.insert(old_id, new_tile);
        }
        Ok(())
    }

    pub fn repack(&mut self, put_master_first: bool) {
        packing::repack(&mut self.layout, put_master_first);
    }

    pub fn pack_upwards(&mut self) {
        packing::pack_upwards(&mut self.layout.layout_dict);
    }
}

/// Outcome of [`apply_mods`]
#[derive(Debug, Clone)]
pub struct LayoutModificationResult {
    pub old_layout: Layout,
    /// Equal to `old_layout` when the mods changed nothing
    pub new_layout: Layout,
    pub new_tiles: Vec<Tile>,
    pub tile_replacement: BTreeMap<Uuid, Option<Tile>>,
}

impl LayoutModificationResult {
    /// Whether a new layout version was committed
    pub fn layout_changed(&self) -> bool {
        self.old_layout.layout_id != self.new_layout.layout_id
    }

    pub fn to_event(&self, reason: &str) -> DashEvent {
        DashEvent::LayoutModified {
            reason: reason.to_string(),
            owner_id: self.new_layout.owner_id,
            dashboard_id: self.new_layout.dashboard_id,
            old_layout_id: self.old_layout.layout_id,
            new_layout_id: self.new_layout.layout_id,
            new_tile_ids: self.new_tiles.iter().map(|t| t.tile_id).collect(),
            tile_replacement: self
                .tile_replacement
                .iter()
                .map(|(old_id, new_tile)| (*old_id, new_tile.as_ref().map(|t| t.tile_id)))
                .collect(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Register the layout under every report one of its masters shows
async fn register_layout_by_report(layouts: &dyn LayoutStore, layout: &Layout) -> Result<()> {
    let Some(layout_id) = layout.layout_id else {
        return Ok(());
    };

    let report_ids: BTreeSet<Uuid> = layout
        .layout_props
        .values()
        .filter(|p| p.is_master)
        .map(|p| p.report_id)
        .collect();

    for report_id in report_ids {
        let row = LayoutByReportRow::tpcreator(
            layout.owner_id,
            report_id,
            layout.dashboard_id,
            layout_id,
        );
        layouts.insert_layout_by_report(&row).await?;
    }
    Ok(())
}

/// Apply `mods` in order to the latest layout and commit the result
///
/// Returns `None` when `for_layout_id` is not the latest version, when a mod
/// reports [`TpcError::ModificationImpossible`], or when a pinned call loses
/// the commit race. Unpinned calls retry up to `max_tries` times and then
/// fail with [`TpcError::RetryExhausted`].
pub async fn apply_mods(
    backend: &Backend,
    mods: &[Mod],
    owner_id: Uuid,
    dashboard_id: Uuid,
    for_layout_id: Option<Uuid>,
    max_tries: usize,
) -> Result<Option<LayoutModificationResult>> {
    let attempts = if for_layout_id.is_some() {
        1
    } else {
        max_tries.max(1)
    };

    for attempt in 1..=attempts {
        let old_layout = backend.layouts.select_layout(owner_id, dashboard_id).await?;

        if let Some(expected) = for_layout_id {
            if old_layout.layout_id != Some(expected) {
                debug!(
                    owner_id = %owner_id,
                    dashboard_id = %dashboard_id,
                    for_layout_id = %expected,
                    "Layout version is not the latest"
                );
                return Ok(None);
            }
        }

        let mut ctx = LayoutMod::new(old_layout.clone(), backend);
        for m in mods {
            match m.apply(&mut ctx).await {
                Ok(()) => {}
                Err(TpcError::ModificationImpossible) => {
                    debug!(
                        owner_id = %owner_id,
                        dashboard_id = %dashboard_id,
                        "Layout modification impossible"
                    );
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        let staged = ctx.tiles.take_staged().await;
        if staged.is_empty() && ctx.layout.same_content(&old_layout) {
            debug!(
                owner_id = %owner_id,
                dashboard_id = %dashboard_id,
                "Layout unchanged, nothing to commit"
            );
            return Ok(Some(LayoutModificationResult {
                new_layout: old_layout.clone(),
                old_layout,
                new_tiles: ctx.new_tiles,
                tile_replacement: ctx.tile_replacement,
            }));
        }

        let committed = backend
            .layouts
            .commit_layout(&ctx.layout, old_layout.layout_id, &staged)
            .await?;

        let Some(new_layout_id) = committed else {
            debug!(
                owner_id = %owner_id,
                dashboard_id = %dashboard_id,
                attempt,
                "Layout commit conflict, recomputing"
            );
            continue;
        };

        let mut new_layout = ctx.layout;
        new_layout.layout_id = Some(new_layout_id);
        // the version is committed: a failed index refresh must not hide it
        if let Err(e) = register_layout_by_report(backend.layouts.as_ref(), &new_layout).await {
            warn!(
                owner_id = %owner_id,
                dashboard_id = %dashboard_id,
                new_layout_id = %new_layout_id,
                error = %e,
                "Failed to register layout_by_report rows"
            );
        }

        info!(
            owner_id = %owner_id,
            dashboard_id = %dashboard_id,
            new_layout_id = %new_layout_id,
            new_tiles = ctx.new_tiles.len(),
            replaced_tiles = ctx.tile_replacement.len(),
            attempt,
            "Committed layout"
        );

        return Ok(Some(LayoutModificationResult {
            old_layout,
            new_layout,
            new_tiles: ctx.new_tiles,
            tile_replacement: ctx.tile_replacement,
        }));
    }

    if for_layout_id.is_some() {
        return Ok(None);
    }

    warn!(
        owner_id = %owner_id,
        dashboard_id = %dashboard_id,
        attempts,
        "Layout modification retries exhausted"
    );
    Err(TpcError::RetryExhausted {
        attempts,
        owner_id,
        dashboard_id,
    })
}
