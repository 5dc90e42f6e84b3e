//! Mover: executes cluster-range moves with fragmentation-avoiding fallback,
//! per spec.md §4.5.

use crate::bitmap::VolumeBitmapCache;
use crate::error::{EngineError, Result};
use crate::fragment_analyzer::{is_fragmented, refresh_fragments};
use crate::gap_finder::{find_gap, GapExtent};
use crate::item::{Item, ItemId};
use crate::reporter::Reporter;
use crate::tree::ItemTree;
use crate::types::{DebugLevel, Lcn};
use crate::volume::VolumeBackend;

/// Directories cannot be moved on FAT volumes; once this many failed
/// directory moves accumulate, further directories are marked unmovable
/// without trying (spec.md §4.5 step 2).
const CANNOT_MOVE_DIRS_LIMIT: u32 = 20;

/// A single OS `FSCTL_MOVE_FILE`-equivalent call, covering the whole
/// `[offset, offset+size)` virtual-cluster range in one request. The OS
/// coalesces the item's fragments when it can.
pub fn move_direct(backend: &mut dyn VolumeBackend, item: &Item, new_lcn: Lcn, offset: u64, size: u64) -> Result<()> {
    backend
        .move_clusters(item.file_ref, offset, size, new_lcn)
        .map_err(|e| wrap_move_error(item, e))
}

/// Walks the item's fragments inside `[offset, offset+size)`, issuing one
/// move call per fragment so the fragments land adjacent on disk in the
/// order stored.
pub fn move_piecewise(backend: &mut dyn VolumeBackend, item: &Item, new_lcn: Lcn, offset: u64, size: u64) -> Result<()> {
    let end = offset + size;
    let mut vcn = 0u64;
    let mut write_lcn = new_lcn.as_u64();

    for frag in &item.fragments {
        let frag_start = vcn;
        let frag_end = frag.next_vcn.as_u64();
        vcn = frag_end;

        if frag.is_virtual() || frag_end <= offset || frag_start >= end {
            continue;
        }
        let seg_start = frag_start.max(offset);
        let seg_end = frag_end.min(end);
        let seg_len = seg_end - seg_start;

        backend
            .move_clusters(item.file_ref, seg_start, seg_len, Lcn::new(write_lcn))
            .map_err(|e| wrap_move_error(item, e))?;
        write_lcn += seg_len;
    }
    Ok(())
}

fn wrap_move_error(item: &Item, err: EngineError) -> EngineError {
    match err {
        EngineError::MoveFailed { .. } => err,
        other => EngineError::MoveFailed { item_id: item_id_placeholder(item), reason: other.to_string() },
    }
}

// `Item` doesn't carry its own `ItemId` (the tree owns that mapping), so
// error messages that need one are produced by the orchestrator-level
// `move_item`, which has the real id; this is only reached for backend
// errors raised directly from move_direct/move_piecewise before the
// orchestrator wraps them again.
fn item_id_placeholder(_item: &Item) -> ItemId {
    ItemId(usize::MAX)
}

/// Bookkeeping the mover owns across calls within one phase; only this
/// component is allowed to mutate `is_unmovable`/`cannot_move_dirs`.
pub struct MoverState {
    pub cannot_move_dirs: u32,
}

impl MoverState {
    pub fn new() -> Self {
        Self { cannot_move_dirs: 0 }
    }
}

impl Default for MoverState {
    fn default() -> Self {
        Self::new()
    }
}

const ONE_GIB: u64 = 1024 * 1024 * 1024;
const MAX_CHUNK_CLUSTERS: u64 = 262_144;

/// The public entry point (spec.md §4.5). Moves virtual clusters
/// `[offset, offset+size)` of `item_id` to `new_lcn`, chunked and with a
/// piecewise-move fallback on fragmentation.
#[allow(clippy::too_many_arguments)]
pub fn move_item(
    tree: &mut ItemTree,
    item_id: ItemId,
    backend: &mut dyn VolumeBackend,
    bitmap: &mut VolumeBitmapCache,
    bytes_per_cluster: u64,
    new_lcn: Lcn,
    offset: u64,
    size: u64,
    mover: &mut MoverState,
    reporter: &dyn Reporter,
    total_clusters: u64,
    mft_excludes: &[(Lcn, Lcn)],
    ignore_mft_excludes: bool,
) -> Result<bool> {
    {
        let item = tree.get(item_id);
        if item.is_unmovable() || item.is_excluded() || item.clusters == 0 {
            return Ok(false);
        }
        if item.is_dir() && mover.cannot_move_dirs > CANNOT_MOVE_DIRS_LIMIT {
            tree.get_mut(item_id).set_unmovable(true);
            return Ok(false);
        }
    }

    let chunk_size = if bytes_per_cluster > 0 {
        (ONE_GIB / bytes_per_cluster).min(MAX_CHUNK_CLUSTERS)
    } else {
        MAX_CHUNK_CLUSTERS
    };

    let mut done = 0u64;
    let mut success = true;

    while done < size {
        let todo = (size - done).min(chunk_size);
        let chunk_offset = offset + done;
        let chunk_new_lcn = new_lcn.checked_add(done).ok_or_else(|| EngineError::MoveFailed {
            item_id,
            reason: "lcn overflow while chunking move".into(),
        })?;

        let attempt = move_chunk(
            tree,
            item_id,
            backend,
            bitmap,
            bytes_per_cluster,
            chunk_new_lcn,
            chunk_offset,
            todo,
            reporter,
            total_clusters,
            mft_excludes,
            ignore_mft_excludes,
        );
        match attempt {
            Ok(()) => done += todo,
            Err(_) => {
                success = false;
                break;
            }
        }
    }

    if success {
        let item = tree.get_mut(item_id);
        if item.is_dir() {
            mover.cannot_move_dirs = 0;
        }
        tree.relocate(item_id);
        return Ok(true);
    }

    let item = tree.get_mut(item_id);
    item.set_unmovable(true);
    let is_dir = item.is_dir();
    if is_dir {
        mover.cannot_move_dirs += 1;
    }
    reporter.on_debug(DebugLevel::Warning, Some(item_id), "move failed, item marked unmovable".into());
    Ok(false)
}

#[allow(clippy::too_many_arguments)]
fn move_chunk(
    tree: &mut ItemTree,
    item_id: ItemId,
    backend: &mut dyn VolumeBackend,
    bitmap: &mut VolumeBitmapCache,
    bytes_per_cluster: u64,
    new_lcn: Lcn,
    offset: u64,
    size: u64,
    reporter: &dyn Reporter,
    total_clusters: u64,
    mft_excludes: &[(Lcn, Lcn)],
    ignore_mft_excludes: bool,
) -> Result<()> {
    let _ = bytes_per_cluster;
    let from_lcn = tree.get(item_id).item_lcn();

    {
        let item = tree.get(item_id);
        move_direct(backend, item, new_lcn, offset, size)?;
    }
    refresh_fragments(tree.get_mut(item_id), backend)?;
    bitmap.invalidate();

    if !is_fragmented(tree.get(item_id), offset, size) {
        reporter.on_move(item_id, size, from_lcn, new_lcn, offset);
        return Ok(());
    }

    // The direct move left the region fragmented (a gap this size wasn't
    // actually contiguous, or the OS couldn't coalesce). Look for a
    // genuinely different gap before retrying piecewise, the way
    // move_item4 does in the original; fall back to the same target only
    // if no alternative exists.
    let retry_lcn = alternative_gap(bitmap, &*backend, total_clusters, size, mft_excludes, ignore_mft_excludes)?
        .map(|gap| gap.lcn)
        .unwrap_or(new_lcn);
    {
        let item = tree.get(item_id);
        move_piecewise(backend, item, retry_lcn, offset, size)?;
    }
    refresh_fragments(tree.get_mut(item_id), backend)?;
    bitmap.invalidate();

    if is_fragmented(tree.get(item_id), offset, size) {
        return Err(EngineError::MoveFailed { item_id, reason: "still fragmented after piecewise retry".into() });
    }

    reporter.on_move(item_id, size, from_lcn, retry_lcn, offset);
    Ok(())
}

/// Used by callers (selector, orchestrator) to find an alternative
/// placement when a move needs retrying; kept here since it's a direct
/// extension of the mover's job of picking a target.
pub fn alternative_gap(
    bitmap: &mut VolumeBitmapCache,
    backend: &dyn VolumeBackend,
    total_clusters: u64,
    min_size: u64,
    mft_excludes: &[(Lcn, Lcn)],
    ignore_mft_excludes: bool,
) -> Result<Option<GapExtent>> {
    find_gap(bitmap, backend, total_clusters, Lcn::new(0), Lcn::new(0), min_size, false, true, mft_excludes, ignore_mft_excludes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Fragment, Item};
    use crate::reporter::NullReporter;
    use crate::testing::FakeVolume;
    use crate::types::Vcn;
    use crate::volume::ItemSource;

    fn setup() -> (ItemTree, FakeVolume) {
        (ItemTree::new(), FakeVolume::new(1000, 4096))
    }

    #[test]
    fn move_of_zero_cluster_item_fails_without_touching_volume() {
        let (mut tree, mut fake) = setup();
        let mut item = Item::new(Some("z".into()), 0, false);
        item.clusters = 0;
        let id = tree.insert(item);
        let mut bitmap = VolumeBitmapCache::new();
        let mut mover = MoverState::new();
        let ok = move_item(
            &mut tree, id, &mut fake, &mut bitmap, 4096, Lcn::new(500), 0, 0, &mut mover,
            &NullReporter, 1000, &[], false,
        )
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn successful_move_relocates_item_and_updates_fragments() {
        let (mut tree, mut fake) = setup();
        let file_ref = fake.add_fragmented_file(
            "a.txt",
            vec![
                Fragment { lcn: Lcn::new(100), next_vcn: Vcn::new(10) },
                Fragment { lcn: Lcn::new(300), next_vcn: Vcn::new(20) },
            ],
            false,
        );
        let mut item = Item::new(Some("a.txt".into()), 20 * 4096, false);
        item.file_ref = file_ref;
        item.fragments = fake.items()[0].fragments.clone();
        item.recompute_clusters();
        let id = tree.insert(item);

        let mut bitmap = VolumeBitmapCache::new();
        let mut mover = MoverState::new();
        let ok = move_item(
            &mut tree, id, &mut fake, &mut bitmap, 4096, Lcn::new(500), 0, 20, &mut mover,
            &NullReporter, 1000, &[], false,
        )
        .unwrap();
        assert!(ok);
        let item = tree.get(id);
        assert_eq!(item.fragments.len(), 1);
        assert_eq!(item.fragments[0].lcn, Lcn::new(500));
        assert_eq!(item.item_lcn(), Lcn::new(500));
    }

    #[test]
    fn unmovable_item_is_rejected() {
        let (mut tree, mut fake) = setup();
        let mut item = Item::new(Some("u".into()), 4096, false);
        item.clusters = 1;
        item.set_unmovable(true);
        let id = tree.insert(item);
        let mut bitmap = VolumeBitmapCache::new();
        let mut mover = MoverState::new();
        let ok = move_item(
            &mut tree, id, &mut fake, &mut bitmap, 4096, Lcn::new(10), 0, 1, &mut mover,
            &NullReporter, 1000, &[], false,
        )
        .unwrap();
        assert!(!ok);
    }
}
