//! Tile title generation

use crate::tile::TileOptions;

/// Produces the generated part of tile titles
pub trait TitleGenerator: Send + Sync {
    /// Postfix identifying the tile among tiles of the same report
    fn generate_postfix(&self, options: &TileOptions) -> String;

    /// Title shown for a tile: its own title, or the base inherited from a
    /// master followed by the tile's postfix
    fn display_title(&self, options: &TileOptions) -> Option<String> {
        if let Some(title) = &options.tile_title {
            return Some(title.clone());
        }
        let base = options.tpcreator_data()?.tile_title_base.as_deref()?;
        let postfix = self.generate_postfix(options);
        if postfix.is_empty() {
            Some(base.to_string())
        } else {
            Some(format!("{} {}", base, postfix))
        }
    }
}

/// `[tag1][tag2]` postfix built from the tile's tags
#[derive(Debug, Clone, Copy, Default)]
pub struct TagPostfixTitles;

impl TitleGenerator for TagPostfixTitles {
    fn generate_postfix(&self, options: &TileOptions) -> String {
        options.tags.iter().map(|tag| format!("[{}]", tag)).collect()
    }
}
