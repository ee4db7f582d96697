//! Computing the options of derived tiles

use crate::error::{Result, TpcError};
use crate::series::{unique_series_specs, SeriesConfig};
use crate::tags::{MatchSpec, UiSpec};
use crate::tile::{Tile, TileOptions, TileRole, TpcreatorData};
use crate::title::TitleGenerator;

fn master_uispec(master: &Tile) -> Result<&UiSpec> {
    master.options.tpcreator_uispec().ok_or_else(|| {
        TpcError::RoleViolation(format!("tile {} is not a master tile", master.tile_id))
    })
}

/// Options of the tile derived from `master` for `matched_tags`
///
/// With `existing_derived`, its series are kept next to the master's. The
/// result is not persisted.
pub fn derive_tile_options(
    master: &Tile,
    match_spec: &MatchSpec,
    matched_tags: &[String],
    existing_derived: Option<&Tile>,
    titles: &dyn TitleGenerator,
) -> Result<TileOptions> {
    let uispec = master_uispec(master)?.clone();

    let series_specs = match existing_derived {
        Some(existing) => unique_series_specs(
            master
                .options
                .series_specs()
                .into_iter()
                .chain(existing.options.series_specs()),
        ),
        None => master.options.series_specs(),
    };

    let tile_title_base = master
        .options
        .tile_title
        .as_deref()
        .filter(|title| !title.is_empty())
        .map(|title| {
            let postfix = titles.generate_postfix(&master.options);
            if postfix.is_empty() {
                title.to_string()
            } else {
                title.replace(&postfix, "").trim().to_string()
            }
        });

    let mut options = TileOptions {
        tags: matched_tags.to_vec(),
        series_configs: series_specs.into_iter().map(SeriesConfig::new).collect(),
        tile_title: None,
        role: TileRole::Derived(TpcreatorData {
            master_tile_id: master.tile_id,
            master_tpcreator_uispec: uispec,
            master_tpcreator_spec: match_spec.clone(),
            tile_title_base,
        }),
        ..master.options.clone()
    };
    options.normalize_tags();
    Ok(options)
}

/// Options of `derived` relinked to `master`, otherwise unchanged
pub fn resync_tpcreator_data(
    master: &Tile,
    derived: &Tile,
    match_spec: &MatchSpec,
) -> Result<TileOptions> {
    let uispec = master_uispec(master)?.clone();
    let tile_title_base = derived
        .options
        .tpcreator_data()
        .and_then(|data| data.tile_title_base.clone());

    Ok(TileOptions {
        role: TileRole::Derived(TpcreatorData {
            master_tile_id: master.tile_id,
            master_tpcreator_uispec: uispec,
            master_tpcreator_spec: match_spec.clone(),
            tile_title_base,
        }),
        ..derived.options.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{FilteringExpr, SeriesSpec};
    use crate::tags::UiSpecEntry;
    use crate::tile::TileConfig;
    use crate::title::TagPostfixTitles;
    use uuid::Uuid;

    fn master() -> Tile {
        let mut config = TileConfig {
            tags: vec!["p1:10".to_string()],
            series_spec_list: vec![SeriesSpec::new(0, -1, Some(FilteringExpr::eq("0")))],
            tile_title: Some("Latency [p1:10]".to_string()),
            tpcreator_uispec: Some(vec![UiSpecEntry::new("p1:10", "p1:")]),
            ..Default::default()
        };
        config
            .extra
            .insert("seconds_back".to_string(), serde_json::json!(86400));
        Tile::from_config(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), config).unwrap()
    }

    fn spec_of(tile: &Tile) -> MatchSpec {
        MatchSpec::compile(tile.options.tpcreator_uispec().unwrap())
    }

    #[test]
    fn test_derive_copies_master_options() {
        let master = master();
        let spec = spec_of(&master);
        let tags = vec!["p1:8".to_string()];

        let options = derive_tile_options(&master, &spec, &tags, None, &TagPostfixTitles).unwrap();

        assert_eq!(options.tags, tags);
        assert_eq!(options.owner_id, master.owner_id());
        assert_eq!(options.report_id, master.report_id());
        assert_eq!(options.extra["seconds_back"], 86400);
        assert_eq!(options.tile_title, None);
        assert_eq!(options.series_specs(), master.options.series_specs());
        assert_ne!(
            options.series_configs[0].series_id,
            master.options.series_configs[0].series_id
        );

        let data = options.tpcreator_data().unwrap();
        assert_eq!(data.master_tile_id, master.tile_id);
        assert_eq!(&data.master_tpcreator_uispec, master.options.tpcreator_uispec().unwrap());
        assert_eq!(data.master_tpcreator_spec, spec);
        assert_eq!(data.tile_title_base.as_deref(), Some("Latency"));
        assert!(!options.is_master());
    }

    #[test]
    fn test_derive_merges_existing_series() {
        let master = master();
        let spec = spec_of(&master);
        let tags = vec!["p1:8".to_string()];

        let mut existing = Tile::create(
            master.dashboard_id,
            derive_tile_options(&master, &spec, &tags, None, &TagPostfixTitles).unwrap(),
        );
        existing
            .options
            .series_configs
            .push(SeriesConfig::new(SeriesSpec::new(1, -1, None)));

        let options =
            derive_tile_options(&master, &spec, &tags, Some(&existing), &TagPostfixTitles).unwrap();
        assert_eq!(
            options.series_specs(),
            vec![
                SeriesSpec::new(0, -1, Some(FilteringExpr::eq("0"))),
                SeriesSpec::new(1, -1, None),
            ]
        );
    }

    #[test]
    fn test_derive_from_non_master_fails() {
        let master = master();
        let spec = spec_of(&master);
        let derived = Tile::create(
            master.dashboard_id,
            derive_tile_options(&master, &spec, &["p1:8".to_string()], None, &TagPostfixTitles)
                .unwrap(),
        );

        let res = derive_tile_options(&derived, &spec, &["p1:9".to_string()], None, &TagPostfixTitles);
        assert!(matches!(res, Err(TpcError::RoleViolation(_))));
    }

    #[test]
    fn test_resync_keeps_options_and_title_base() {
        let master = master();
        let spec = spec_of(&master);
        let derived = Tile::create(
            master.dashboard_id,
            derive_tile_options(&master, &spec, &["p1:8".to_string()], None, &TagPostfixTitles)
                .unwrap(),
        );
        let other_master = Tile::create(master.dashboard_id, master.options.clone());

        let options = resync_tpcreator_data(&other_master, &derived, &spec).unwrap();
        assert_eq!(options.series_configs, derived.options.series_configs);
        assert_eq!(options.tags, derived.options.tags);
        let data = options.tpcreator_data().unwrap();
        assert_eq!(data.master_tile_id, other_master.tile_id);
        assert_eq!(data.tile_title_base.as_deref(), Some("Latency"));
    }
}
