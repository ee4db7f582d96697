//! Dashboard layouts
//!
//! A layout maps each placed tile to its position and size
//! ([`VisualOptions`]) and keeps a snapshot of the tile properties the
//! TPCreator needs ([`TileProps`]), so that a layout can be scanned without
//! loading every tile. Layouts are versioned by `layout_id` and mutated only
//! through [`mods::apply_mods`].

pub mod mods;
pub mod packing;

use crate::error::Result;
use crate::store::Backend;
use crate::tags::MatchSpec;
use crate::tile::{Tile, TileRole};
use mods::{apply_mods, LayoutModificationResult, Mod, DEFAULT_MAX_TRIES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Position and size of a tile on the dashboard grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualOptions {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl VisualOptions {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-to-bottom, left-to-right ordering key
    pub fn position(&self) -> (u32, u32) {
        (self.y, self.x)
    }

    pub fn overlaps(&self, other: &VisualOptions) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Snapshot of tile properties stored with the layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileProps {
    pub report_id: Uuid,
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_master: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_id: Option<Uuid>,
    /// Compiled UISpec of a master tile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpcreator_spec: Option<MatchSpec>,
}

impl TileProps {
    pub fn of(tile: &Tile) -> Self {
        let (is_master, master_id, tpcreator_spec) = match &tile.options.role {
            TileRole::Plain => (false, None, None),
            TileRole::Master { tpcreator_uispec } => {
                (true, None, Some(MatchSpec::compile(tpcreator_uispec)))
            }
            TileRole::Derived(data) => (false, Some(data.master_tile_id), None),
        };
        Self {
            report_id: tile.report_id(),
            tags: tile.options.tags.clone(),
            is_master,
            master_id,
            tpcreator_spec,
        }
    }
}

/// A version of a dashboard layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub owner_id: Uuid,
    pub dashboard_id: Uuid,
    /// `None` until the first commit
    pub layout_id: Option<Uuid>,
    pub layout_dict: BTreeMap<Uuid, VisualOptions>,
    pub layout_props: BTreeMap<Uuid, TileProps>,
}

impl Layout {
    pub fn empty(owner_id: Uuid, dashboard_id: Uuid) -> Self {
        Self {
            owner_id,
            dashboard_id,
            layout_id: None,
            layout_dict: BTreeMap::new(),
            layout_props: BTreeMap::new(),
        }
    }

    pub fn contains(&self, tile_id: &Uuid) -> bool {
        self.layout_dict.contains_key(tile_id)
    }

    pub fn get_tile_props(&self, tile_id: &Uuid) -> Option<&TileProps> {
        self.layout_props.get(tile_id)
    }

    /// Placed tile ids ordered top to bottom, left to right
    pub fn tile_ids_by_position(&self) -> Vec<Uuid> {
        let mut ids: Vec<(u32, u32, Uuid)> = self
            .layout_dict
            .iter()
            .map(|(id, vo)| (vo.y, vo.x, *id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Ids of placed master tiles, by position
    pub fn master_tile_ids(&self) -> Vec<Uuid> {
        self.tile_ids_by_position()
            .into_iter()
            .filter(|id| self.get_tile_props(id).is_some_and(|p| p.is_master))
            .collect()
    }

    /// Ids of the placed tiles derived from `master_id`, by position
    pub fn get_tpcreated_tile_ids(&self, master_id: Uuid) -> Vec<Uuid> {
        self.tile_ids_by_position()
            .into_iter()
            .filter(|id| {
                *id != master_id
                    && self
                        .get_tile_props(id)
                        .is_some_and(|p| p.master_id == Some(master_id))
            })
            .collect()
    }

    /// Same placement and props, ignoring the version
    pub fn same_content(&self, other: &Layout) -> bool {
        self.layout_dict == other.layout_dict && self.layout_props == other.layout_props
    }

    pub fn insert_tile(&mut self, tile: &Tile, vo: VisualOptions) {
        self.layout_dict.insert(tile.tile_id, vo);
        self.layout_props.insert(tile.tile_id, TileProps::of(tile));
    }

    /// Remove a tile, returning its visual options
    pub fn remove_tile(&mut self, tile_id: &Uuid) -> Option<VisualOptions> {
        self.layout_props.remove(tile_id);
        self.layout_dict.remove(tile_id)
    }
}

/// Place a tile on its dashboard, sized like `size_of` when given
pub async fn place_tile(
    backend: &Backend,
    tile: &Tile,
    size_of: Option<Uuid>,
    for_layout_id: Option<Uuid>,
) -> Result<Option<LayoutModificationResult>> {
    apply_mods(
        backend,
        &[Mod::PlaceTile {
            tile: tile.clone(),
            size_of,
        }],
        tile.owner_id(),
        tile.dashboard_id,
        for_layout_id,
        DEFAULT_MAX_TRIES,
    )
    .await
}

/// Swap tiles in the layout, keeping their visual options
///
/// A `None` replacement detaches the tile. Replacing a master with a master
/// re-derives the family of the old master under the new one.
pub async fn replace_tiles(
    backend: &Backend,
    owner_id: Uuid,
    dashboard_id: Uuid,
    replacement: BTreeMap<Uuid, Option<Tile>>,
    for_layout_id: Option<Uuid>,
) -> Result<Option<LayoutModificationResult>> {
    apply_mods(
        backend,
        &[Mod::ReplaceTiles {
            replacement,
            sync_tpcreated: true,
        }],
        owner_id,
        dashboard_id,
        for_layout_id,
        DEFAULT_MAX_TRIES,
    )
    .await
}

/// Remove a tile from its dashboard's layout
pub async fn detach_tile(
    backend: &Backend,
    tile: &Tile,
    for_layout_id: Option<Uuid>,
) -> Result<Option<LayoutModificationResult>> {
    let replacement = BTreeMap::from([(tile.tile_id, None)]);
    apply_mods(
        backend,
        &[Mod::ReplaceTiles {
            replacement,
            sync_tpcreated: false,
        }],
        tile.owner_id(),
        tile.dashboard_id,
        for_layout_id,
        DEFAULT_MAX_TRIES,
    )
    .await
}

/// Repack a dashboard with master tiles first in their families
pub async fn repack(
    backend: &Backend,
    owner_id: Uuid,
    dashboard_id: Uuid,
    for_layout_id: Option<Uuid>,
) -> Result<Option<LayoutModificationResult>> {
    apply_mods(
        backend,
        &[Mod::Repack {
            put_master_first: true,
        }],
        owner_id,
        dashboard_id,
        for_layout_id,
        DEFAULT_MAX_TRIES,
    )
    .await
}
