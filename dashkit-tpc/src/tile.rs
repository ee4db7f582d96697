//! Tile model
//!
//! A tile is an immutable row identified by `(dashboard_id, tile_id)`.
//! Changing a tile means inserting a new one with new options and swapping it
//! into the layout.

use crate::error::{Result, TpcError};
use crate::series::{SeriesConfig, SeriesSpec};
use crate::tags::{MatchSpec, UiSpec};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of tags a tile may carry
pub const MAX_TAGS: usize = 32;

/// Keys owned by [`TileOptions`] and [`TileConfig`]; never accepted as widget options
const RESERVED_OPTION_KEYS: &[&str] = &[
    "tw_type",
    "owner_id",
    "report_id",
    "tags",
    "series_configs",
    "series_spec_list",
    "tile_title",
    "tpcreator_uispec",
    "role",
];

/// Widget kind rendering the tile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileWidgetType {
    #[default]
    Range,
    Single,
}

/// Linkage of a derived tile to its master
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpcreatorData {
    pub master_tile_id: Uuid,
    /// Copy of the master's UISpec at derivation time
    pub master_tpcreator_uispec: UiSpec,
    /// MatchSpec the tile was matched with
    pub master_tpcreator_spec: MatchSpec,
    /// Master title with the master's generated postfix removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_title_base: Option<String>,
}

/// Part a tile plays in template-tile propagation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TileRole {
    #[default]
    Plain,
    Master {
        tpcreator_uispec: UiSpec,
    },
    Derived(TpcreatorData),
}

/// Full options of a tile as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileOptions {
    #[serde(default)]
    pub tw_type: TileWidgetType,
    pub owner_id: Uuid,
    pub report_id: Uuid,
    /// Sorted and deduplicated
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub series_configs: Vec<SeriesConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_title: Option<String>,
    #[serde(default)]
    pub role: TileRole,
    /// Widget options not interpreted here (`seconds_back`, colors, ...)
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TileOptions {
    pub fn is_master(&self) -> bool {
        matches!(self.role, TileRole::Master { .. })
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.role, TileRole::Derived(_))
    }

    pub fn master_tile_id(&self) -> Option<Uuid> {
        match &self.role {
            TileRole::Derived(data) => Some(data.master_tile_id),
            _ => None,
        }
    }

    pub fn tpcreator_uispec(&self) -> Option<&UiSpec> {
        match &self.role {
            TileRole::Master { tpcreator_uispec } => Some(tpcreator_uispec),
            _ => None,
        }
    }

    pub fn tpcreator_data(&self) -> Option<&TpcreatorData> {
        match &self.role {
            TileRole::Derived(data) => Some(data),
            _ => None,
        }
    }

    pub fn series_specs(&self) -> Vec<SeriesSpec> {
        self.series_configs
            .iter()
            .map(|sc| sc.series_spec.clone())
            .collect()
    }

    /// Sort and deduplicate tags
    pub fn normalize_tags(&mut self) {
        self.tags.sort();
        self.tags.dedup();
    }
}

/// A stored tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub dashboard_id: Uuid,
    pub tile_id: Uuid,
    pub options: TileOptions,
}

impl Tile {
    /// New tile with a fresh id; not persisted
    pub fn create(dashboard_id: Uuid, mut options: TileOptions) -> Self {
        options.normalize_tags();
        Self {
            dashboard_id,
            tile_id: Uuid::new_v4(),
            options,
        }
    }

    /// Validate a config and build an unpersisted tile from it
    pub fn from_config(
        dashboard_id: Uuid,
        owner_id: Uuid,
        report_id: Uuid,
        config: TileConfig,
    ) -> Result<Self> {
        let options = config.into_options(owner_id, report_id)?;
        Ok(Self::create(dashboard_id, options))
    }

    pub fn owner_id(&self) -> Uuid {
        self.options.owner_id
    }

    pub fn report_id(&self) -> Uuid {
        self.options.report_id
    }

    pub fn tags(&self) -> &[String] {
        &self.options.tags
    }

    pub fn is_master(&self) -> bool {
        self.options.is_master()
    }

    pub fn is_derived(&self) -> bool {
        self.options.is_derived()
    }

    pub fn master_tile_id(&self) -> Option<Uuid> {
        self.options.master_tile_id()
    }

    /// Config from which an equivalent tile can be created
    pub fn to_config(&self) -> TileConfig {
        TileConfig {
            tw_type: self.options.tw_type,
            tags: self.options.tags.clone(),
            series_spec_list: self.options.series_specs(),
            tile_title: self.options.tile_title.clone(),
            tpcreator_uispec: self.options.tpcreator_uispec().cloned(),
            extra: self.options.extra.clone(),
        }
    }
}

/// User-supplied description of a new tile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileConfig {
    #[serde(default)]
    pub tw_type: TileWidgetType,
    #[serde(default)]
    pub tags: Vec<String>,
    pub series_spec_list: Vec<SeriesSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_title: Option<String>,
    /// Present and non-empty for master tiles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpcreator_uispec: Option<UiSpec>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TileConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tags.len() > MAX_TAGS {
            return Err(TpcError::InvalidTileConfig(format!(
                "Too many tags specified: {} (max {})",
                self.tags.len(),
                MAX_TAGS
            )));
        }

        if let Some(key) = self
            .extra
            .keys()
            .find(|key| RESERVED_OPTION_KEYS.contains(&key.as_str()))
        {
            return Err(TpcError::InvalidTileConfig(format!(
                "option {:?} is reserved",
                key
            )));
        }

        for entry in self.tpcreator_uispec.iter().flatten() {
            if !entry.tag.starts_with(entry.prefix.as_str()) {
                return Err(TpcError::InvalidTileConfig(format!(
                    "tpcreator_uispec tag {:?} doesn't start with prefix {:?}",
                    entry.tag, entry.prefix
                )));
            }
        }

        Ok(())
    }

    /// Validate and turn into full tile options
    pub fn into_options(self, owner_id: Uuid, report_id: Uuid) -> Result<TileOptions> {
        self.validate()?;

        let mut specs: Vec<SeriesSpec> = Vec::with_capacity(self.series_spec_list.len());
        for spec in self.series_spec_list {
            if !specs.contains(&spec) {
                specs.push(spec);
            }
        }

        let role = match self.tpcreator_uispec {
            Some(uispec) if !uispec.is_empty() => TileRole::Master {
                tpcreator_uispec: uispec,
            },
            _ => TileRole::Plain,
        };

        let mut options = TileOptions {
            tw_type: self.tw_type,
            owner_id,
            report_id,
            tags: self.tags,
            series_configs: specs.into_iter().map(SeriesConfig::new).collect(),
            tile_title: self.tile_title,
            role,
            extra: self.extra,
        };
        options.normalize_tags();
        Ok(options)
    }
}
