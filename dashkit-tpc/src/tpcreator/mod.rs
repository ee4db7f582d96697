//! TPCreator: derives tiles from master tiles as report instances arrive
//!
//! For a report instance, every layout registered under the report with the
//! `tpcreator` label is visited. In each layout, every master tile showing
//! the report matches its MatchSpec against the instance's tags; a match that
//! has no tile yet gets a new derived tile, placed next to its family.
//!
//! **Pipeline per layout:**
//! 1. derive new tiles ([`Mod::Tpcreator`])
//! 2. if tiles were created, repack (master first unless promoting)
//! 3. optionally promote the first tile of each family to master and repack
//!
//! The pipeline runs through [`apply_mods`], so it is recomputed from the
//! latest layout when a concurrent writer wins the commit.

pub mod derive;
pub mod promote;

use crate::error::Result;
use crate::layout::mods::{apply_mods, LayoutMod, LayoutModificationResult, Mod};
use crate::layout::Layout;
use crate::report::ReportInstance;
use crate::store::{Backend, LayoutByReportRow, TileStore, TPCREATOR_LABEL};
use crate::tags::{MatchSpec, TagsSortKey};
use crate::tile::Tile;
use dashkit_common::config::TpcConfig;
use dashkit_common::events::EventBus;
use derive::derive_tile_options;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Event reason of layouts modified by the TPCreator
pub const TPCREATOR_REASON: &str = "tpcreator";

/// Event reason of derived size synchronization
pub const SYNC_SIZES_REASON: &str = "sync_sizes";

/// Template-tile propagation service
#[derive(Clone)]
pub struct Tpcreator {
    backend: Backend,
    events: EventBus,
    config: TpcConfig,
}

impl Tpcreator {
    pub fn new(backend: Backend, events: EventBus, config: TpcConfig) -> Self {
        Self {
            backend,
            events,
            config,
        }
    }

    /// Run the TPCreator for a new report instance
    ///
    /// With `make_first_master`, the first tile of every family (by tag
    /// order) becomes the master once new tiles were created. Returns the
    /// committed modifications; a `LayoutModified` event is emitted for each.
    pub async fn handle_tpcreator(
        &self,
        owner_id: Uuid,
        report_id: Uuid,
        report_instance: &ReportInstance,
        make_first_master: bool,
    ) -> Result<Vec<LayoutModificationResult>> {
        let rows = self
            .backend
            .layouts
            .select_layout_by_report_multi(
                owner_id,
                report_id,
                &[],
                TPCREATOR_LABEL,
                self.config.max_tpcreators_per_report,
            )
            .await?;

        if rows.is_empty() {
            debug!(report_id = %report_id, "No layout_by_report tpcreator rows");
            return Ok(Vec::new());
        }

        info!(
            owner_id = %owner_id,
            report_id = %report_id,
            report_instance_id = %report_instance.report_instance_id,
            rows = rows.len(),
            "TPCreator processing rows"
        );

        let mut results = Vec::new();
        for row in rows {
            let mods = tpcreator_mods(
                report_instance,
                &row,
                self.config.max_tpcreated,
                make_first_master,
            );

            let lmr = apply_mods(
                &self.backend,
                &mods,
                owner_id,
                row.dashboard_id,
                None,
                self.config.max_tpcreate_tries,
            )
            .await?;

            if let Some(lmr) = lmr.filter(|lmr| lmr.layout_changed()) {
                self.events.emit_lossy(lmr.to_event(TPCREATOR_REASON));
                results.push(lmr);
            }
        }

        Ok(results)
    }

    /// Resize the derived tiles of `master` to the master's size
    ///
    /// Returns `None` when nothing needed to change or `for_layout_id` is
    /// stale.
    pub async fn sync_derived_sizes(
        &self,
        master: &Tile,
        for_layout_id: Option<Uuid>,
    ) -> Result<Option<LayoutModificationResult>> {
        let lmr = apply_mods(
            &self.backend,
            &[Mod::SyncDerivedSizes {
                master_tile_id: master.tile_id,
            }],
            master.owner_id(),
            master.dashboard_id,
            for_layout_id,
            self.config.max_tpcreate_tries,
        )
        .await?;

        if let Some(lmr) = lmr.as_ref().filter(|lmr| lmr.layout_changed()) {
            self.events.emit_lossy(lmr.to_event(SYNC_SIZES_REASON));
        }
        Ok(lmr)
    }

    /// Ids of the tiles derived from `master` in the latest layout
    ///
    /// With `sort`, ids follow the visual order of a repacked family.
    /// Returns `None` when `for_layout_id` is not the latest layout.
    pub async fn select_tpcreated_tile_ids(
        &self,
        master: &Tile,
        for_layout_id: Option<Uuid>,
        sort: bool,
    ) -> Result<Option<Vec<Uuid>>> {
        let layout = self
            .backend
            .layouts
            .select_layout(master.owner_id(), master.dashboard_id)
            .await?;
        if for_layout_id.is_some() && layout.layout_id != for_layout_id {
            return Ok(None);
        }

        let mut tile_ids = layout.get_tpcreated_tile_ids(master.tile_id);
        if sort {
            tile_ids.sort_by_cached_key(|id| {
                let tags = layout
                    .get_tile_props(id)
                    .map(|p| p.tags.clone())
                    .unwrap_or_default();
                TagsSortKey::new(&tags)
            });
        }
        Ok(Some(tile_ids))
    }
}

/// Mod pipeline run for one layout_by_report row
pub fn tpcreator_mods(
    report_instance: &ReportInstance,
    layout_row: &LayoutByReportRow,
    max_tpcreated: usize,
    make_first_master: bool,
) -> Vec<Mod> {
    let mut mods = vec![
        Mod::Tpcreator {
            report_instance: report_instance.clone(),
            layout_row: layout_row.clone(),
            max_tpcreated,
        },
        Mod::if_new_tiles(Mod::Repack {
            put_master_first: !make_first_master,
        }),
    ];
    if make_first_master {
        mods.push(Mod::if_new_tiles(Mod::PromoteFirstAsMaster));
        // promotion does not keep the family order
        mods.push(Mod::if_tile_replacement(Mod::Repack {
            put_master_first: true,
        }));
    }
    mods
}

/// Derivation state of one master tile in a layout
#[derive(Debug)]
struct MasterState {
    master_id: Uuid,
    match_spec: MatchSpec,
    /// Sorted tag lists already having a tile (master included)
    materialized: BTreeSet<Vec<String>>,
    derived_count: usize,
}

fn sorted(tags: &[String]) -> Vec<String> {
    let mut tags = tags.to_vec();
    tags.sort();
    tags
}

/// Masters of `report_id` in the layout, by position, with their families
fn collect_master_states(layout: &Layout, report_id: Uuid) -> Vec<MasterState> {
    let mut states: Vec<MasterState> = Vec::new();
    for master_id in layout.master_tile_ids() {
        let Some(props) = layout.get_tile_props(&master_id) else {
            continue;
        };
        if props.report_id != report_id {
            continue;
        }
        let Some(match_spec) = props.tpcreator_spec.clone() else {
            continue;
        };
        states.push(MasterState {
            master_id,
            match_spec,
            materialized: BTreeSet::from([sorted(&props.tags)]),
            derived_count: 0,
        });
    }

    for props in layout.layout_props.values() {
        if props.report_id != report_id || props.is_master {
            continue;
        }
        let Some(master_id) = props.master_id else {
            continue;
        };
        if let Some(state) = states.iter_mut().find(|s| s.master_id == master_id) {
            state.materialized.insert(sorted(&props.tags));
            state.derived_count += 1;
        }
    }
    states
}

/// Body of [`Mod::Tpcreator`]
pub(crate) async fn run_tpcreator_mod(
    ctx: &mut LayoutMod,
    report_instance: &ReportInstance,
    layout_row: &LayoutByReportRow,
    max_tpcreated: usize,
) -> Result<()> {
    let states = collect_master_states(&ctx.layout, report_instance.report_id);

    if states.is_empty() {
        info!(
            report_id = %layout_row.report_id,
            dashboard_id = %layout_row.dashboard_id,
            "Deleting obsoleted layout_by_report tpcreator row"
        );
        ctx.layouts.delete_layout_by_report(layout_row).await?;
        return Ok(());
    }

    for state in states {
        if state.derived_count >= max_tpcreated {
            warn!(
                master_id = %state.master_id,
                derived = state.derived_count,
                max_tpcreated,
                "Too many tpcreated tiles for master"
            );
            continue;
        }

        let Some(matched) = state.match_spec.matching_tags(&report_instance.all_tags) else {
            debug!(master_id = %state.master_id, "No tags match the tpcreator spec");
            continue;
        };
        if state.materialized.contains(&matched) {
            debug!(
                master_id = %state.master_id,
                tags = ?matched,
                "A tpcreated tile already exists for the matched tags"
            );
            continue;
        }

        let Some(master) = ctx
            .tiles
            .select_tile(ctx.layout.dashboard_id, state.master_id)
            .await?
        else {
            warn!(master_id = %state.master_id, "Master tile not found");
            continue;
        };

        let options = derive_tile_options(
            &master,
            &state.match_spec,
            &matched,
            None,
            ctx.titles.as_ref(),
        )?;
        let tile = ctx
            .tiles
            .insert_tile_with_options(master.dashboard_id, options)
            .await?;

        info!(
            master_id = %state.master_id,
            tile_id = %tile.tile_id,
            tags = ?matched,
            report_id = %layout_row.report_id,
            "tpcreator created new tile"
        );
        ctx.place_tile(&tile, Some(state.master_id))?;
    }

    Ok(())
}
