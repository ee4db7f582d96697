//! dashkit-tpc library - template-tile propagation (TPCreator)
//!
//! A master tile declares a tag-matching rule. For every distinct set of
//! matching tags seen in incoming report instances, a derived tile is created
//! and placed next to the master. The layout holding the tiles is versioned
//! and only ever mutated through [`layout::mods::apply_mods`], which retries
//! the whole mod pipeline against the latest version on conflict.
//!
//! Module map:
//! - [`tags`]: UISpec / MatchSpec compilation and matching
//! - [`tile`], [`series`]: tile configuration model
//! - [`layout`]: layout model, packing and the mod executor
//! - [`tpcreator`]: orchestrator, tile derivation, promotion and sync
//! - [`store`]: storage traits and the SQLite implementation

pub mod error;
pub mod layout;
pub mod report;
pub mod series;
pub mod store;
pub mod tags;
pub mod tile;
pub mod title;
pub mod tpcreator;

pub use error::{Result, TpcError};
pub use layout::mods::{apply_mods, Condition, LayoutModificationResult, Mod};
pub use layout::{Layout, TileProps, VisualOptions};
pub use report::ReportInstance;
pub use store::{Backend, LayoutByReportRow, LayoutStore, SqliteStore, TileStore};
pub use tags::{MatchSpec, UiSpec, UiSpecEntry};
pub use tile::{Tile, TileConfig, TileOptions, TileRole, TpcreatorData};
pub use tpcreator::Tpcreator;
