//! Selector: finds items to fill a gap, per spec.md §4.7.

use std::time::{Duration, Instant};

use crate::gap_finder::GapExtent;
use crate::item::ItemId;
use crate::tree::ItemTree;
use crate::types::{Direction, Zone};

/// Wall-clock budget for `find_best_item`'s combination search.
pub const FIND_BEST_ITEM_BUDGET: Duration = Duration::from_millis(500);

/// Walks items in LCN order (ascending for `Direction::Above`, descending
/// for `Below`), starting at the tree's extreme end in that direction. The
/// instant a candidate's `item_lcn` crosses to the wrong side of `gap`, the
/// walk stops (there's nothing further in this direction that could still
/// be on the correct side). Returns the first movable item on the correct
/// side that fits and passes the zone filter.
pub fn find_highest_item(tree: &ItemTree, gap: GapExtent, direction: Direction, zone_filter: Option<Zone>) -> Option<ItemId> {
    let gap_begin = gap.lcn.as_u64();
    let gap_end = gap_begin + gap.clusters;
    let mut cursor = tree.first(direction);

    while let Some(here) = cursor {
        let item = tree.get(here);
        let item_lcn = item.item_lcn().as_u64();

        if item_lcn != 0 {
            match direction {
                Direction::Above => {
                    if item_lcn < gap_end {
                        return None;
                    }
                }
                Direction::Below => {
                    if item_lcn > gap_begin {
                        return None;
                    }
                }
            }
        }

        if item.is_movable()
            && item.clusters <= gap.clusters
            && item.clusters > 0
            && zone_filter.map_or(true, |z| item.preferred_zone() == z)
        {
            return Some(here);
        }
        cursor = tree.next_prev(here, direction);
    }
    None
}

/// Searches for a single item, or a chain of subsequent items in the walk
/// direction, whose cumulative size exactly fills `gap`. Bounded to
/// `FIND_BEST_ITEM_BUDGET` wall-clock time; gives up (returns `None`) if the
/// budget elapses or no combination can fill the gap.
pub fn find_best_item(tree: &ItemTree, gap: GapExtent, direction: Direction, zone_filter: Option<Zone>) -> Option<Vec<ItemId>> {
    let deadline = Instant::now() + FIND_BEST_ITEM_BUDGET;
    let mut cursor = tree.first(direction);

    while let Some(here) = cursor {
        if Instant::now() >= deadline {
            return None;
        }
        let item = tree.get(here);
        if item.is_movable() && item.clusters > 0 && zone_filter.map_or(true, |z| item.preferred_zone() == z) {
            if item.clusters == gap.clusters {
                return Some(vec![here]);
            }
            if item.clusters < gap.clusters {
                if let Some(mut chain) = extend_chain(tree, here, item.clusters, gap.clusters, direction, zone_filter, deadline) {
                    chain.insert(0, here);
                    return Some(chain);
                }
            }
        }
        cursor = tree.next_prev(here, direction);
    }
    None
}

fn extend_chain(
    tree: &ItemTree,
    after: ItemId,
    mut accumulated: u64,
    target: u64,
    direction: Direction,
    zone_filter: Option<Zone>,
    deadline: Instant,
) -> Option<Vec<ItemId>> {
    let mut chain = Vec::new();
    let mut cursor = tree.next_prev(after, direction);

    while let Some(here) = cursor {
        if Instant::now() >= deadline {
            return None;
        }
        let item = tree.get(here);
        if item.is_movable() && item.clusters > 0 && zone_filter.map_or(true, |z| item.preferred_zone() == z) {
            accumulated += item.clusters;
            chain.push(here);
            if accumulated == target {
                return Some(chain);
            }
            if accumulated > target {
                return None;
            }
        }
        cursor = tree.next_prev(here, direction);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Fragment, Item};
    use crate::types::{Lcn, Vcn};
    use crate::volume::FileRef;

    fn movable(lcn: u64, clusters: u64) -> Item {
        let mut item = Item::new(None, clusters * 4096, false);
        item.file_ref = FileRef(lcn);
        item.fragments = vec![Fragment { lcn: Lcn::new(lcn), next_vcn: Vcn::new(clusters) }];
        item.recompute_clusters();
        item
    }

    #[test]
    fn find_highest_item_returns_first_fitting_in_direction() {
        let mut tree = ItemTree::new();
        tree.insert(movable(10, 100));
        let small = tree.insert(movable(20, 5));
        tree.insert(movable(30, 50));

        let gap = GapExtent { lcn: Lcn::new(0), clusters: 5 };
        let found = find_highest_item(&tree, gap, Direction::Above, None).unwrap();
        assert_eq!(found, small);
    }

    #[test]
    fn find_highest_item_respects_zone_filter() {
        let mut tree = ItemTree::new();
        let mut hog = movable(10, 5);
        hog.flags.insert(crate::item::ItemFlags::IS_HOG);
        tree.insert(hog);
        let regular = tree.insert(movable(20, 5));

        let gap = GapExtent { lcn: Lcn::new(0), clusters: 5 };
        let found = find_highest_item(&tree, gap, Direction::Above, Some(Zone::Regular)).unwrap();
        assert_eq!(found, regular);
    }

    #[test]
    fn find_best_item_finds_exact_single_fit() {
        let mut tree = ItemTree::new();
        tree.insert(movable(10, 3));
        let exact = tree.insert(movable(20, 5));
        tree.insert(movable(30, 7));

        let gap = GapExtent { lcn: Lcn::new(0), clusters: 5 };
        let found = find_best_item(&tree, gap, Direction::Above, None).unwrap();
        assert_eq!(found, vec![exact]);
    }

    #[test]
    fn find_best_item_combines_a_chain_to_exact_fit() {
        let mut tree = ItemTree::new();
        let a = tree.insert(movable(10, 3));
        let b = tree.insert(movable(20, 2));

        let gap = GapExtent { lcn: Lcn::new(0), clusters: 5 };
        let found = find_best_item(&tree, gap, Direction::Above, None).unwrap();
        assert_eq!(found, vec![a, b]);
    }

    #[test]
    fn find_best_item_returns_none_when_nothing_fits() {
        let mut tree = ItemTree::new();
        tree.insert(movable(10, 100));

        let gap = GapExtent { lcn: Lcn::new(0), clusters: 5 };
        assert!(find_best_item(&tree, gap, Direction::Above, None).is_none());
    }
}
