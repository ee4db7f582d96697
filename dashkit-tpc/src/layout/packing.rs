//! Grid packing of dashboard tiles
//!
//! The dashboard is a grid [`GRID_WIDTH`] columns wide and unbounded
//! downwards. Tiles never overlap.

use super::{Layout, VisualOptions};
use crate::tags::TagsSortKey;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const GRID_WIDTH: u32 = 12;
pub const DEFAULT_TILE_WIDTH: u32 = 4;
pub const DEFAULT_TILE_HEIGHT: u32 = 4;

fn fits(layout_dict: &BTreeMap<Uuid, VisualOptions>, vo: &VisualOptions, skip: Option<Uuid>) -> bool {
    layout_dict
        .iter()
        .filter(|(id, _)| Some(**id) != skip)
        .all(|(_, other)| !vo.overlaps(other))
}

/// First free spot for a `width` x `height` rectangle
///
/// Rows are scanned top to bottom, columns left to right.
pub fn find_free_position(
    layout_dict: &BTreeMap<Uuid, VisualOptions>,
    width: u32,
    height: u32,
) -> VisualOptions {
    let width = width.clamp(1, GRID_WIDTH);
    let height = height.max(1);
    let bottom = layout_dict
        .values()
        .map(|vo| vo.y + vo.height)
        .max()
        .unwrap_or(0);

    for y in 0..=bottom {
        for x in 0..=(GRID_WIDTH - width) {
            let vo = VisualOptions::new(x, y, width, height);
            if fits(layout_dict, &vo, None) {
                return vo;
            }
        }
    }
    // below every tile the row is always free
    VisualOptions::new(0, bottom, width, height)
}

/// Insert `tile_id` at the first free spot and return its position
pub fn place(
    layout_dict: &mut BTreeMap<Uuid, VisualOptions>,
    tile_id: Uuid,
    width: u32,
    height: u32,
) -> VisualOptions {
    let vo = find_free_position(layout_dict, width, height);
    layout_dict.insert(tile_id, vo);
    vo
}

/// Move every tile up as far as it goes, processing tiles by position
pub fn pack_upwards(layout_dict: &mut BTreeMap<Uuid, VisualOptions>) {
    let mut ids: Vec<(u32, u32, Uuid)> = layout_dict
        .iter()
        .map(|(id, vo)| (vo.y, vo.x, *id))
        .collect();
    ids.sort();

    for (_, _, id) in ids {
        let Some(mut vo) = layout_dict.get(&id).copied() else {
            continue;
        };
        while vo.y > 0 {
            let candidate = VisualOptions { y: vo.y - 1, ..vo };
            if !fits(layout_dict, &candidate, Some(id)) {
                break;
            }
            vo = candidate;
        }
        layout_dict.insert(id, vo);
    }
}

/// Order in which a repack lays out the tiles
///
/// Tiles are grouped into families (a master with its derived tiles). A
/// family is positioned where its top-left member currently is. Inside a
/// family, derived tiles follow [`TagsSortKey`]; the master either leads the
/// family or is sorted among its derived tiles.
pub fn visual_order(layout: &Layout, put_master_first: bool) -> Vec<Uuid> {
    let mut groups: Vec<(Option<Uuid>, Vec<Uuid>)> = Vec::new();
    let mut group_index: BTreeMap<Uuid, usize> = BTreeMap::new();

    for tile_id in layout.tile_ids_by_position() {
        let family = layout.get_tile_props(&tile_id).and_then(|props| {
            if props.is_master {
                Some(tile_id)
            } else {
                props.master_id
            }
        });

        match family {
            Some(master_id) => match group_index.get(&master_id) {
                Some(idx) => groups[*idx].1.push(tile_id),
                None => {
                    group_index.insert(master_id, groups.len());
                    groups.push((Some(master_id), vec![tile_id]));
                }
            },
            None => groups.push((None, vec![tile_id])),
        }
    }

    let sort_key = |id: &Uuid| {
        let tags = layout
            .get_tile_props(id)
            .map(|p| p.tags.clone())
            .unwrap_or_default();
        let position = layout.layout_dict.get(id).map(|vo| vo.position());
        (TagsSortKey::new(&tags), position)
    };

    let mut res = Vec::with_capacity(layout.layout_dict.len());
    for (master_id, mut members) in groups {
        if members.len() > 1 {
            members.sort_by_cached_key(sort_key);
            if put_master_first {
                if let Some(master_id) = master_id {
                    if let Some(pos) = members.iter().position(|id| *id == master_id) {
                        let master = members.remove(pos);
                        members.insert(0, master);
                    }
                }
            }
        }
        res.extend(members);
    }
    res
}

/// Re-place all tiles in visual order, keeping their sizes
pub fn repack(layout: &mut Layout, put_master_first: bool) {
    let order = visual_order(layout, put_master_first);
    let mut packed = BTreeMap::new();
    for tile_id in order {
        if let Some(vo) = layout.layout_dict.get(&tile_id) {
            place(&mut packed, tile_id, vo.width, vo.height);
        }
    }
    layout.layout_dict = packed;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(u128, VisualOptions)]) -> BTreeMap<Uuid, VisualOptions> {
        entries
            .iter()
            .map(|(id, vo)| (Uuid::from_u128(*id), *vo))
            .collect()
    }

    fn base() -> BTreeMap<Uuid, VisualOptions> {
        dict(&[
            (1, VisualOptions::new(0, 0, 4, 2)),
            (2, VisualOptions::new(8, 0, 4, 4)),
            (3, VisualOptions::new(0, 2, 1, 3)),
            (4, VisualOptions::new(0, 5, 1, 3)),
        ])
    }

    #[test]
    fn test_place_fills_rows() {
        let mut d = BTreeMap::new();
        let positions: Vec<(u32, u32)> = (0..4)
            .map(|i| {
                let vo = place(&mut d, Uuid::from_u128(i), 4, 4);
                (vo.x, vo.y)
            })
            .collect();
        assert_eq!(positions, vec![(0, 0), (4, 0), (8, 0), (0, 4)]);
    }

    #[test]
    fn test_place_uses_gaps() {
        let mut d = base();
        let vo = place(&mut d, Uuid::from_u128(9), 4, 4);
        assert_eq!(vo, VisualOptions::new(4, 0, 4, 4));

        let vo = place(&mut d, Uuid::from_u128(10), 3, 2);
        assert_eq!(vo, VisualOptions::new(1, 2, 3, 2));
    }

    #[test]
    fn test_pack_upwards_packed_is_noop() {
        let mut d = base();
        pack_upwards(&mut d);
        assert_eq!(d, base());
    }

    #[test]
    fn test_pack_upwards_shifted() {
        let mut d = base();
        for vo in d.values_mut() {
            vo.y += 3;
        }
        pack_upwards(&mut d);
        assert_eq!(d, base());
    }

    #[test]
    fn test_pack_upwards_floating() {
        let mut d = base();
        d.insert(Uuid::from_u128(5), VisualOptions::new(0, 10, 3, 5));
        d.insert(Uuid::from_u128(6), VisualOptions::new(5, 12, 2, 8));
        pack_upwards(&mut d);

        assert_eq!(d[&Uuid::from_u128(5)], VisualOptions::new(0, 8, 3, 5));
        assert_eq!(d[&Uuid::from_u128(6)], VisualOptions::new(5, 0, 2, 8));
    }

    #[test]
    fn test_wide_tile_is_clamped() {
        let d = BTreeMap::new();
        assert_eq!(find_free_position(&d, 20, 2), VisualOptions::new(0, 0, 12, 2));
    }
}
