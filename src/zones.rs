//! Zone calculator, per spec.md §4.6.
//!
//! Computes `zones[0..3]`: the boundaries of the three logical regions the
//! volume is divided into. Iterates to a fixpoint since an unmovable file's
//! zone attribution depends on the boundaries, which in turn depend on
//! where unmovable fragments lie.

use crate::item::ItemId;
use crate::tree::ItemTree;
use crate::types::{Lcn, Zone};

const MAX_ITERATIONS: u32 = 10;

/// `zones[0]` is always 0; `zones[3]` is always `total_clusters`; `zones[1]`
/// and `zones[2]` are the directories/regular and regular/space-hogs
/// boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneBoundaries {
    pub zones: [u64; 4],
}

impl ZoneBoundaries {
    pub fn start_of(&self, zone: Zone) -> u64 {
        self.zones[zone.index()]
    }

    pub fn end_of(&self, zone: Zone) -> u64 {
        self.zones[zone.index() + 1]
    }

    pub fn is_monotone(&self) -> bool {
        self.zones.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Computes zone boundaries for the current item tree, iterating until the
/// boundaries stabilize or `MAX_ITERATIONS` is reached.
pub fn calculate_zones(tree: &ItemTree, total_clusters: u64, free_space_percent: u64, mft_excludes: &[(Lcn, Lcn)]) -> ZoneBoundaries {
    let reserve = total_clusters * free_space_percent / 100;
    let mut zones = ZoneBoundaries { zones: [0, 0, 0, total_clusters] };

    for _ in 0..MAX_ITERATIONS {
        let mut movable = [0u64; 3];
        let mut unmovable = [0u64; 3];

        for idx in 0..tree.len() {
            let item = tree.get(ItemId(idx));
            if item.clusters == 0 {
                continue;
            }
            let preferred = item.preferred_zone().index();
            if item.is_movable() {
                movable[preferred] += item.clusters;
            } else {
                let lcn = item.item_lcn().as_u64();
                let zone = zone_of_lcn(&zones, lcn).map(Zone::index).unwrap_or(preferred);
                unmovable[zone] += item.clusters;
            }
        }

        // MFT exclusion ranges are always treated as unmovable, attributed
        // to whichever zone currently covers them.
        for (start, end) in mft_excludes {
            let len = end.as_u64().saturating_sub(start.as_u64());
            if len == 0 {
                continue;
            }
            if let Some(z) = zone_of_lcn(&zones, start.as_u64()) {
                unmovable[z.index()] += len;
            }
        }

        let mut next = [0u64; 4];
        next[1] = (movable[0] + unmovable[0] + reserve).min(total_clusters);
        next[2] = (next[1] + movable[1] + unmovable[1] + reserve).clamp(next[1], total_clusters);
        next[3] = total_clusters;

        let next_zones = ZoneBoundaries { zones: next };
        if next_zones == zones {
            break;
        }
        zones = next_zones;
    }

    zones
}

fn zone_of_lcn(zones: &ZoneBoundaries, lcn: u64) -> Option<Zone> {
    if lcn < zones.zones[1] {
        Some(Zone::Directories)
    } else if lcn < zones.zones[2] {
        Some(Zone::Regular)
    } else if lcn < zones.zones[3] {
        Some(Zone::SpaceHogs)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Fragment, Item};
    use crate::types::Vcn;
    use crate::volume::FileRef;

    fn movable_item(lcn: u64, clusters: u64, is_hog: bool) -> Item {
        let mut item = Item::new(None, clusters * 4096, false);
        item.file_ref = FileRef(lcn);
        if is_hog {
            item.flags.insert(crate::item::ItemFlags::IS_HOG);
        }
        item.fragments = vec![Fragment { lcn: Lcn::new(lcn), next_vcn: Vcn::new(clusters) }];
        item.recompute_clusters();
        item
    }

    #[test]
    fn zones_are_monotone_and_bracket_the_volume() {
        let mut tree = ItemTree::new();
        tree.insert(movable_item(10, 50, false));
        tree.insert(movable_item(900, 20, true));
        let zones = calculate_zones(&tree, 1000, 5, &[]);
        assert_eq!(zones.zones[0], 0);
        assert_eq!(zones.zones[3], 1000);
        assert!(zones.is_monotone());
    }

    #[test]
    fn empty_tree_collapses_zone_1_and_2_to_the_reserve() {
        let tree = ItemTree::new();
        let zones = calculate_zones(&tree, 1000, 10, &[]);
        assert_eq!(zones.zones, [0, 100, 200, 1000]);
    }

    #[test]
    fn unmovable_fragment_is_attributed_to_its_current_zone() {
        let mut tree = ItemTree::new();
        let mut unmovable = movable_item(150, 100, false);
        unmovable.set_unmovable(true);
        tree.insert(unmovable);
        let zones = calculate_zones(&tree, 1000, 0, &[]);
        assert!(zones.zones[1] >= 250);
    }
}
