//! The item (file/directory) model, per spec.md §3.

use crate::types::{Lcn, Vcn, Zone};
use crate::volume::FileRef;

/// Index into the engine's item slab. Stands in for the raw owning pointers
/// of the source implementation's intrusive tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub usize);

/// A contiguous physical run backing a contiguous VCN run of a single item.
///
/// Covers virtual clusters `[prev.next_vcn, next_vcn)`, mapped to physical
/// `[lcn, lcn + next_vcn - prev.next_vcn)`. A fragment with `lcn ==
/// Lcn::VIRTUAL` is virtual (invariant 1: fragments are VCN-ordered with
/// strictly increasing `next_vcn`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub lcn: Lcn,
    pub next_vcn: Vcn,
}

impl Fragment {
    pub fn is_virtual(&self) -> bool {
        self.lcn.is_virtual()
    }

    /// Length in clusters, given the VCN at which this fragment starts.
    pub fn length(&self, start_vcn: Vcn) -> u64 {
        self.next_vcn.as_u64().saturating_sub(start_vcn.as_u64())
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ItemFlags: u8 {
        const IS_DIR       = 0b0000_0001;
        const IS_UNMOVABLE = 0b0000_0010;
        const IS_EXCLUDED  = 0b0000_0100;
        const IS_HOG       = 0b0000_1000;
    }
}

/// A file or directory tracked by the engine.
#[derive(Debug, Clone)]
pub struct Item {
    pub file_ref: FileRef,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub long_path: Option<String>,
    pub short_path: Option<String>,

    pub bytes: u64,
    /// Sum of non-virtual fragment lengths (invariant 2).
    pub clusters: u64,

    /// 100-ns ticks since the NTFS epoch; semantics fixed by the parser collaborator.
    pub creation_time: i64,
    pub mft_change_time: i64,
    pub last_access_time: i64,

    /// Sorted by VCN (invariant 1).
    pub fragments: Vec<Fragment>,

    pub parent: Option<ItemId>,
    pub parent_inode: u64,

    pub flags: ItemFlags,

    // BST tree pointers, used by `tree::ItemTree`.
    pub(crate) tree_parent: Option<ItemId>,
    pub(crate) tree_smaller: Option<ItemId>,
    pub(crate) tree_bigger: Option<ItemId>,
}

impl Item {
    pub fn new(long_path: Option<String>, bytes: u64, is_dir: bool) -> Self {
        let mut flags = ItemFlags::empty();
        if is_dir {
            flags.insert(ItemFlags::IS_DIR);
        }
        Self {
            file_ref: FileRef(0),
            long_name: None,
            short_name: None,
            long_path,
            short_path: None,
            bytes,
            clusters: 0,
            creation_time: 0,
            mft_change_time: 0,
            last_access_time: 0,
            fragments: Vec::new(),
            parent: None,
            parent_inode: 0,
            flags,
            tree_parent: None,
            tree_smaller: None,
            tree_bigger: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.flags.contains(ItemFlags::IS_DIR)
    }

    pub fn is_unmovable(&self) -> bool {
        self.flags.contains(ItemFlags::IS_UNMOVABLE)
    }

    pub fn set_unmovable(&mut self, value: bool) {
        self.flags.set(ItemFlags::IS_UNMOVABLE, value);
    }

    pub fn is_excluded(&self) -> bool {
        self.flags.contains(ItemFlags::IS_EXCLUDED)
    }

    pub fn is_hog(&self) -> bool {
        self.flags.contains(ItemFlags::IS_HOG)
    }

    pub fn is_movable(&self) -> bool {
        !self.is_unmovable() && !self.is_excluded() && self.clusters > 0
    }

    /// Preferred zone: directories go to zone 0, space hogs to zone 2, else zone 1.
    pub fn preferred_zone(&self) -> Zone {
        if self.is_dir() {
            Zone::Directories
        } else if self.is_hog() {
            Zone::SpaceHogs
        } else {
            Zone::Regular
        }
    }

    /// BST key: first non-virtual fragment LCN, or 0 if the item has none
    /// (invariant 3).
    pub fn item_lcn(&self) -> Lcn {
        self.fragments
            .iter()
            .find(|f| !f.is_virtual())
            .map(|f| f.lcn)
            .unwrap_or(Lcn::new(0))
    }

    /// Re-derives `clusters` from the fragment list (invariant 2).
    pub fn recompute_clusters(&mut self) {
        let mut total = 0u64;
        let mut prev_vcn = Vcn::new(0);
        for frag in &self.fragments {
            if !frag.is_virtual() {
                total += frag.length(prev_vcn);
            }
            prev_vcn = frag.next_vcn;
        }
        self.clusters = total;
    }

    /// Validates invariant 1: fragments are VCN-ordered with strictly
    /// increasing `next_vcn`.
    pub fn validate_fragments(&self) -> bool {
        let mut prev = None;
        for frag in &self.fragments {
            if let Some(prev_vcn) = prev {
                if frag.next_vcn.as_u64() <= prev_vcn {
                    return false;
                }
            }
            prev = Some(frag.next_vcn.as_u64());
        }
        true
    }

    pub fn path_for_sort(&self) -> &str {
        self.long_path.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(lcn: u64, next_vcn: u64) -> Fragment {
        Fragment { lcn: Lcn::new(lcn), next_vcn: Vcn::new(next_vcn) }
    }

    #[test]
    fn clusters_equals_sum_of_non_virtual_fragments() {
        let mut item = Item::new(Some("a".into()), 4096 * 20, false);
        item.fragments = vec![frag(100, 10), frag(300, 20)];
        item.recompute_clusters();
        assert_eq!(item.clusters, 20);
    }

    #[test]
    fn virtual_fragment_does_not_count_toward_clusters() {
        let mut item = Item::new(None, 0, false);
        item.fragments = vec![frag(100, 10), frag(Lcn::VIRTUAL.as_u64(), 20), frag(200, 30)];
        item.recompute_clusters();
        assert_eq!(item.clusters, 20); // 10 + (30-20), the virtual run contributes 0
    }

    #[test]
    fn item_lcn_is_first_non_virtual_fragment() {
        let mut item = Item::new(None, 0, false);
        item.fragments = vec![frag(Lcn::VIRTUAL.as_u64(), 5), frag(42, 15)];
        assert_eq!(item.item_lcn(), Lcn::new(42));
    }

    #[test]
    fn item_lcn_defaults_to_zero_with_no_fragments() {
        let item = Item::new(None, 0, false);
        assert_eq!(item.item_lcn(), Lcn::new(0));
    }

    #[test]
    fn preferred_zone_rules() {
        let mut dir = Item::new(None, 0, true);
        assert_eq!(dir.preferred_zone().index(), 0);
        dir.flags.remove(ItemFlags::IS_DIR);
        dir.flags.insert(ItemFlags::IS_HOG);
        assert_eq!(dir.preferred_zone().index(), 2);
        dir.flags.remove(ItemFlags::IS_HOG);
        assert_eq!(dir.preferred_zone().index(), 1);
    }

    #[test]
    fn validate_fragments_rejects_non_increasing_vcn() {
        let mut item = Item::new(None, 0, false);
        item.fragments = vec![frag(100, 10), frag(300, 10)];
        assert!(!item.validate_fragments());
    }
}
