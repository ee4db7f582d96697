//! Master/derived promotion, re-parenting and size synchronization

use super::derive::{derive_tile_options, resync_tpcreator_data};
use crate::error::{Result, TpcError};
use crate::layout::mods::LayoutMod;
use crate::layout::Layout;
use crate::store::TileStore;
use crate::tags::{MatchSpec, TagsSortKey};
use crate::tile::{Tile, TileRole};
use crate::title::TitleGenerator;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

fn require_master(tile: &Tile, what: &str) -> Result<()> {
    if tile.is_master() {
        Ok(())
    } else {
        Err(TpcError::RoleViolation(format!(
            "{} {} is not a master tile",
            what, tile.tile_id
        )))
    }
}

/// Re-create every derived tile of `old_master` under `new_master`
///
/// `sync` re-derives the full options from `new_master`, otherwise only the
/// master linkage changes. Tiles in `skip` are left alone. The new tiles are
/// inserted into `tiles`; returns old tile id to replacement.
pub async fn replace_derived(
    layout: &Layout,
    old_master: &Tile,
    new_master: &Tile,
    sync: bool,
    skip: &BTreeSet<Uuid>,
    titles: &dyn TitleGenerator,
    tiles: &dyn TileStore,
) -> Result<BTreeMap<Uuid, Tile>> {
    require_master(new_master, "new master")?;

    let match_spec = layout
        .get_tile_props(&old_master.tile_id)
        .and_then(|props| props.tpcreator_spec.clone())
        .or_else(|| old_master.options.tpcreator_uispec().map(|u| MatchSpec::compile(u)))
        .ok_or_else(|| {
            TpcError::RoleViolation(format!(
                "old master {} has no tag specification",
                old_master.tile_id
            ))
        })?;

    let derived_ids: Vec<Uuid> = layout
        .get_tpcreated_tile_ids(old_master.tile_id)
        .into_iter()
        .filter(|id| !skip.contains(id))
        .collect();
    if derived_ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let derived_tiles = tiles
        .select_tiles_multi(old_master.dashboard_id, &derived_ids)
        .await?;

    let mut old_ids = Vec::with_capacity(derived_tiles.len());
    let mut new_options = Vec::with_capacity(derived_tiles.len());
    for (tile_id, tile) in &derived_tiles {
        let options = if sync {
            derive_tile_options(new_master, &match_spec, tile.tags(), Some(tile), titles)?
        } else {
            resync_tpcreator_data(new_master, tile, &match_spec)?
        };
        old_ids.push(*tile_id);
        new_options.push(options);
    }

    let inserted = tiles
        .insert_tiles_with_options_multi(old_master.dashboard_id, new_options)
        .await?;

    debug!(
        old_master_id = %old_master.tile_id,
        new_master_id = %new_master.tile_id,
        count = inserted.len(),
        sync,
        "Replaced derived tiles"
    );
    Ok(old_ids.into_iter().zip(inserted).collect())
}

/// New master tile made from `derived`, taking over `old_master`'s UISpec
pub async fn promote_derived_to_master(
    old_master: &Tile,
    derived: &Tile,
    titles: &dyn TitleGenerator,
    tiles: &dyn TileStore,
) -> Result<Tile> {
    require_master(old_master, "old master")?;
    if !derived.is_derived() {
        return Err(TpcError::RoleViolation(format!(
            "tile {} is not a derived tile",
            derived.tile_id
        )));
    }

    let mut options = derived.options.clone();
    options.role = TileRole::Master {
        tpcreator_uispec: old_master
            .options
            .tpcreator_uispec()
            .cloned()
            .unwrap_or_default(),
    };

    let has_own_title = options.tile_title.as_deref().is_some_and(|t| !t.is_empty());
    if !has_own_title {
        if let Some(old_title) = old_master.options.tile_title.as_deref().filter(|t| !t.is_empty()) {
            let old_postfix = titles.generate_postfix(&old_master.options);
            let title = if !old_postfix.is_empty() && old_title.contains(&old_postfix) {
                old_title.replace(&old_postfix, &titles.generate_postfix(&derived.options))
            } else {
                old_title.to_string()
            };
            options.tile_title = Some(title);
        }
    }

    tiles
        .insert_tile_with_options(old_master.dashboard_id, options)
        .await
}

/// Re-derive the master `old_master` as a derived tile of `new_master`
pub async fn demote_master_to_derived(
    old_master: &Tile,
    new_master: &Tile,
    titles: &dyn TitleGenerator,
    tiles: &dyn TileStore,
) -> Result<Tile> {
    require_master(old_master, "old master")?;
    require_master(new_master, "new master")?;

    let uispec = new_master.options.tpcreator_uispec().cloned().unwrap_or_default();
    let match_spec = MatchSpec::compile(&uispec);
    let options = derive_tile_options(
        new_master,
        &match_spec,
        old_master.tags(),
        Some(old_master),
        titles,
    )?;

    tiles
        .insert_tile_with_options(old_master.dashboard_id, options)
        .await
}

/// Make the first member of every family (by [`TagsSortKey`]) its master
pub async fn promote_first_as_master(ctx: &mut LayoutMod) -> Result<()> {
    let dashboard_id = ctx.layout.dashboard_id;

    for master_id in ctx.layout.master_tile_ids() {
        let mut family = vec![master_id];
        family.extend(ctx.layout.get_tpcreated_tile_ids(master_id));
        if family.len() < 2 {
            continue;
        }

        let first_id = family
            .iter()
            .copied()
            .min_by_key(|id| {
                let tags = ctx
                    .layout
                    .get_tile_props(id)
                    .map(|p| p.tags.clone())
                    .unwrap_or_default();
                let position = ctx.layout.layout_dict.get(id).map(|vo| vo.position());
                (TagsSortKey::new(&tags), position)
            })
            .unwrap_or(master_id);
        if first_id == master_id {
            continue;
        }

        let loaded = ctx
            .tiles
            .select_tiles_multi(dashboard_id, &[master_id, first_id])
            .await?;
        let (Some(old_master), Some(first)) = (loaded.get(&master_id), loaded.get(&first_id))
        else {
            warn!(
                master_id = %master_id,
                first_id = %first_id,
                "Tiles of family not found, not promoting"
            );
            continue;
        };

        let titles = ctx.titles.clone();
        let new_master =
            promote_derived_to_master(old_master, first, titles.as_ref(), &ctx.tiles).await?;
        let demoted =
            demote_master_to_derived(old_master, &new_master, titles.as_ref(), &ctx.tiles).await?;
        let skip = BTreeSet::from([first_id]);
        let others = replace_derived(
            &ctx.layout,
            old_master,
            &new_master,
            false,
            &skip,
            titles.as_ref(),
            &ctx.tiles,
        )
        .await?;

        info!(
            old_master_id = %master_id,
            new_master_id = %new_master.tile_id,
            tags = ?new_master.tags(),
            "Promoted first tile of family to master"
        );

        let mut replacement: BTreeMap<Uuid, Option<Tile>> = others
            .into_iter()
            .map(|(old_id, tile)| (old_id, Some(tile)))
            .collect();
        replacement.insert(master_id, Some(demoted));
        replacement.insert(first_id, Some(new_master));

        ctx.replace_tiles(replacement, false).await?;
    }
    Ok(())
}

/// Give every derived tile of a master the master's width and height
///
/// Fails with `ModificationImpossible` when the master is not placed or all
/// sizes already match.
pub fn sync_derived_sizes(ctx: &mut LayoutMod, master_tile_id: Uuid) -> Result<()> {
    let Some(master_vo) = ctx.layout.layout_dict.get(&master_tile_id).copied() else {
        warn!(master_tile_id = %master_tile_id, "Master tile not placed in layout");
        return Err(TpcError::ModificationImpossible);
    };

    let mut changed = false;
    for tile_id in ctx.layout.get_tpcreated_tile_ids(master_tile_id) {
        if let Some(vo) = ctx.layout.layout_dict.get_mut(&tile_id) {
            if vo.width != master_vo.width || vo.height != master_vo.height {
                vo.width = master_vo.width;
                vo.height = master_vo.height;
                changed = true;
            }
        }
    }

    if !changed {
        return Err(TpcError::ModificationImpossible);
    }

    ctx.repack(true);
    ctx.pack_upwards();
    Ok(())
}
