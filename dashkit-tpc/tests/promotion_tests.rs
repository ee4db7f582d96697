//! Integration tests for master promotion, demotion and re-parenting

mod helpers;

use dashkit_tpc::layout;
use dashkit_tpc::series::SeriesSpec;
use dashkit_tpc::title::TitleGenerator;
use dashkit_tpc::tpcreator::promote::{
    demote_master_to_derived, promote_derived_to_master, replace_derived,
};
use dashkit_tpc::{Tile, TileConfig, TileStore, TpcError};
use helpers::{tags, Fixture};
use std::collections::{BTreeMap, BTreeSet};

/// Master `p1:10` titled "Latency [p1:10]" with derived tiles for `derived_tags`
async fn family(fx: &Fixture, derived_tags: &[&str]) -> (Tile, Vec<Tile>) {
    let mut config = fx.master_config(&["p1:10"], &[("p1:10", "p1:")]);
    config.tile_title = Some("Latency [p1:10]".to_string());
    let master = fx.insert_tile_for(fx.report_id, config).await;

    for tag in derived_tags {
        fx.process(&[tag]).await;
    }

    let layout = fx.layout().await;
    let ids = layout.get_tpcreated_tile_ids(master.tile_id);
    let mut by_id = fx
        .backend
        .tiles
        .select_tiles_multi(fx.dashboard_id, &ids)
        .await
        .unwrap();
    let derived = ids.iter().filter_map(|id| by_id.remove(id)).collect();
    (master, derived)
}

async fn unplaced(fx: &Fixture, config: TileConfig) -> Tile {
    let options = config.into_options(fx.owner_id, fx.report_id).unwrap();
    fx.backend
        .tiles
        .insert_tile_with_options(fx.dashboard_id, options)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_derived_title_follows_tags() {
    let fx = Fixture::new().await;
    let (_, derived) = family(&fx, &["p1:8"]).await;

    let data = derived[0].options.tpcreator_data().unwrap();
    assert_eq!(data.tile_title_base.as_deref(), Some("Latency"));
    assert_eq!(
        fx.backend.titles.display_title(&derived[0].options).as_deref(),
        Some("Latency [p1:8]")
    );
}

#[tokio::test]
async fn test_replace_derived_relinks_family() {
    let fx = Fixture::new().await;
    let (master, derived) = family(&fx, &["p1:8", "p1:12"]).await;
    let new_master = unplaced(&fx, fx.master_config(&["p1:10"], &[("p1:10", "p1:")])).await;
    let layout = fx.layout().await;

    let replaced = replace_derived(
        &layout,
        &master,
        &new_master,
        false,
        &BTreeSet::new(),
        fx.backend.titles.as_ref(),
        fx.backend.tiles.as_ref(),
    )
    .await
    .unwrap();
    assert_eq!(replaced.len(), 2);

    for old in &derived {
        let new = &replaced[&old.tile_id];
        assert_ne!(new.tile_id, old.tile_id);
        assert_eq!(new.tags(), old.tags());
        assert_eq!(new.master_tile_id(), Some(new_master.tile_id));

        let stored = fx
            .backend
            .tiles
            .select_tile(fx.dashboard_id, new.tile_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&stored, new);
    }

    // skipped tiles are left alone
    let skip = BTreeSet::from([derived[0].tile_id]);
    let replaced = replace_derived(
        &layout,
        &master,
        &new_master,
        false,
        &skip,
        fx.backend.titles.as_ref(),
        fx.backend.tiles.as_ref(),
    )
    .await
    .unwrap();
    assert_eq!(replaced.len(), 1);
    assert!(replaced.contains_key(&derived[1].tile_id));
}

#[tokio::test]
async fn test_promote_then_demote() {
    let fx = Fixture::new().await;
    let (master, derived) = family(&fx, &["p1:8"]).await;
    let titles = fx.backend.titles.as_ref();
    let tiles = fx.backend.tiles.as_ref();

    let new_master = promote_derived_to_master(&master, &derived[0], titles, tiles)
        .await
        .unwrap();
    assert!(new_master.is_master());
    assert_eq!(new_master.tags(), derived[0].tags());
    assert_eq!(
        new_master.options.tpcreator_uispec(),
        master.options.tpcreator_uispec()
    );
    assert_eq!(new_master.options.tile_title.as_deref(), Some("Latency [p1:8]"));

    let demoted = demote_master_to_derived(&master, &new_master, titles, tiles)
        .await
        .unwrap();
    assert!(demoted.is_derived());
    assert_eq!(demoted.tags(), master.tags());
    assert_eq!(demoted.master_tile_id(), Some(new_master.tile_id));
    assert_eq!(demoted.options.tile_title, None);
    assert_eq!(
        titles.display_title(&demoted.options).as_deref(),
        Some("Latency [p1:10]")
    );
}

#[tokio::test]
async fn test_role_violations_are_errors() {
    let fx = Fixture::new().await;
    let (master, derived) = family(&fx, &["p1:8"]).await;
    let plain = unplaced(
        &fx,
        TileConfig {
            tags: tags(&["p1:10"]),
            series_spec_list: vec![SeriesSpec::new(0, -1, None)],
            ..Default::default()
        },
    )
    .await;
    let titles = fx.backend.titles.as_ref();
    let tiles = fx.backend.tiles.as_ref();
    let rows_before = fx.tile_row_count().await;

    let res = promote_derived_to_master(&derived[0], &derived[0], titles, tiles).await;
    assert!(matches!(res, Err(TpcError::RoleViolation(_))));

    let res = promote_derived_to_master(&master, &master, titles, tiles).await;
    assert!(matches!(res, Err(TpcError::RoleViolation(_))));

    let res = demote_master_to_derived(&derived[0], &master, titles, tiles).await;
    assert!(matches!(res, Err(TpcError::RoleViolation(_))));

    let res = demote_master_to_derived(&master, &plain, titles, tiles).await;
    assert!(matches!(res, Err(TpcError::RoleViolation(_))));

    let layout = fx.layout().await;
    let res = replace_derived(&layout, &master, &plain, true, &BTreeSet::new(), titles, tiles).await;
    assert!(matches!(res, Err(TpcError::RoleViolation(_))));

    assert_eq!(fx.tile_row_count().await, rows_before);
}

#[tokio::test]
async fn test_replacing_master_rederives_family() {
    let fx = Fixture::new().await;
    let (master, derived) = family(&fx, &["p1:8"]).await;
    let derived_vo = fx.layout().await.layout_dict[&derived[0].tile_id];

    let mut config = fx.master_config(&["p1:10"], &[("p1:10", "p1:")]);
    config.series_spec_list = vec![SeriesSpec::new(2, -1, None)];
    let new_master = unplaced(&fx, config).await;

    let replacement = BTreeMap::from([(master.tile_id, Some(new_master.clone()))]);
    let lmr = layout::replace_tiles(&fx.backend, fx.owner_id, fx.dashboard_id, replacement, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lmr.tile_replacement.len(), 2);

    let layout = fx.layout().await;
    assert!(!layout.contains(&master.tile_id));
    assert!(!layout.contains(&derived[0].tile_id));

    let family = layout.get_tpcreated_tile_ids(new_master.tile_id);
    assert_eq!(family.len(), 1);
    assert_eq!(layout.layout_dict[&family[0]], derived_vo);

    let rederived = fx
        .backend
        .tiles
        .select_tile(fx.dashboard_id, family[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rederived.tags(), derived[0].tags());
    let specs = rederived.options.series_specs();
    assert_eq!(specs[0], SeriesSpec::new(2, -1, None));
    assert!(specs.contains(&derived[0].options.series_specs()[0]));
}
