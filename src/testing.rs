//! In-memory `VolumeBackend`/`ItemSource` used by integration tests and the
//! CLI's bundled demo mode, standing in for the real OS/parser collaborators
//! that spec.md §1 explicitly puts out of scope.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::item::Fragment;
use crate::types::{FilesystemKind, Lcn, Vcn};
use crate::volume::{BitmapFragment, FileRef, ItemSource, RawItem, VolumeBackend, VolumeInfo};

#[derive(Debug, Clone)]
struct FakeItem {
    raw: RawItem,
}

/// A volume backed by an in-memory cluster bitmap and a table of items.
pub struct FakeVolume {
    bytes_per_cluster: u64,
    total_clusters: u64,
    bitmap: Vec<bool>,
    items: HashMap<u64, FakeItem>,
    next_ref: u64,
    pub mft_excludes: Vec<(Lcn, Lcn)>,
    pub mft_locked_clusters: u64,
    pub filesystem: FilesystemKind,
}

impl FakeVolume {
    pub fn new(total_clusters: u64, bytes_per_cluster: u64) -> Self {
        Self {
            bytes_per_cluster,
            total_clusters,
            bitmap: vec![false; total_clusters as usize],
            items: HashMap::new(),
            next_ref: 1,
            mft_excludes: Vec::new(),
            mft_locked_clusters: 0,
            filesystem: FilesystemKind::Ntfs,
        }
    }

    pub fn mark_in_use(&mut self, lcn: Lcn) {
        self.bitmap[lcn.as_u64() as usize] = true;
    }

    pub fn mark_range_in_use(&mut self, start: Lcn, clusters: u64) {
        for i in 0..clusters {
            self.bitmap[(start.as_u64() + i) as usize] = true;
        }
    }

    pub fn mark_range_free(&mut self, start: Lcn, clusters: u64) {
        for i in 0..clusters {
            self.bitmap[(start.as_u64() + i) as usize] = false;
        }
    }

    /// Adds a file with a single fragment `[lcn, lcn+clusters)`, marking
    /// those clusters in-use, and returns its `FileRef`.
    pub fn add_file(&mut self, path: &str, lcn: Lcn, clusters: u64, is_dir: bool) -> FileRef {
        let file_ref = FileRef(self.next_ref);
        self.next_ref += 1;

        let fragments = if clusters == 0 {
            Vec::new()
        } else {
            vec![Fragment { lcn, next_vcn: Vcn::new(clusters) }]
        };
        if clusters > 0 {
            self.mark_range_in_use(lcn, clusters);
        }

        self.items.insert(
            file_ref.0,
            FakeItem {
                raw: RawItem {
                    file_ref,
                    long_name: path.rsplit('\\').next().map(str::to_owned),
                    short_name: None,
                    long_path: Some(path.to_owned()),
                    short_path: None,
                    bytes: clusters * self.bytes_per_cluster,
                    creation_time: 0,
                    mft_change_time: 0,
                    last_access_time: 0,
                    fragments,
                    parent_inode: 0,
                    is_dir,
                },
            },
        );
        file_ref
    }

    /// Adds a file with an explicit, possibly-fragmented, fragment list.
    pub fn add_fragmented_file(&mut self, path: &str, fragments: Vec<Fragment>, is_dir: bool) -> FileRef {
        let file_ref = FileRef(self.next_ref);
        self.next_ref += 1;

        let mut prev = Vcn::new(0);
        let mut clusters = 0u64;
        for frag in &fragments {
            if !frag.is_virtual() {
                clusters += frag.length(prev);
                self.mark_range_in_use(frag.lcn, frag.length(prev));
            }
            prev = frag.next_vcn;
        }

        self.items.insert(
            file_ref.0,
            FakeItem {
                raw: RawItem {
                    file_ref,
                    long_name: path.rsplit('\\').next().map(str::to_owned),
                    short_name: None,
                    long_path: Some(path.to_owned()),
                    short_path: None,
                    bytes: clusters * self.bytes_per_cluster,
                    creation_time: 0,
                    mft_change_time: 0,
                    last_access_time: 0,
                    fragments,
                    parent_inode: 0,
                    is_dir,
                },
            },
        );
        file_ref
    }

    pub fn set_last_access_time(&mut self, file_ref: FileRef, ticks: i64) {
        if let Some(item) = self.items.get_mut(&file_ref.0) {
            item.raw.last_access_time = ticks;
        }
    }

    pub fn set_mft_change_time(&mut self, file_ref: FileRef, ticks: i64) {
        if let Some(item) = self.items.get_mut(&file_ref.0) {
            item.raw.mft_change_time = ticks;
        }
    }
}

impl VolumeBackend for FakeVolume {
    fn volume_info(&self) -> VolumeInfo {
        VolumeInfo {
            bytes_per_cluster: self.bytes_per_cluster,
            total_clusters: self.total_clusters,
            mft_locked_clusters: self.mft_locked_clusters,
            mft_excludes: self.mft_excludes.clone(),
            filesystem: self.filesystem,
        }
    }

    fn read_bitmap(&self, lcn: Lcn) -> Result<BitmapFragment> {
        if lcn.as_u64() >= self.total_clusters {
            return Ok(BitmapFragment { starting_lcn: lcn, bit_len: 0, bits: Vec::new() });
        }
        let start = lcn.as_u64();
        let len = (self.total_clusters - start).min(crate::bitmap::BITS_PER_FRAGMENT);
        let mut bits = vec![0u8; crate::bitmap::BITMAP_FRAGMENT_BYTES];
        for i in 0..len {
            if self.bitmap[(start + i) as usize] {
                bits[(i / 8) as usize] |= 1 << (i % 8);
            }
        }
        Ok(BitmapFragment { starting_lcn: lcn, bit_len: len, bits })
    }

    fn get_fragments(&self, file_ref: FileRef) -> Result<Vec<Fragment>> {
        self.items
            .get(&file_ref.0)
            .map(|i| i.raw.fragments.clone())
            .ok_or_else(|| EngineError::ExtentMapFailed {
                item_id: crate::item::ItemId(0),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "unknown file_ref"),
            })
    }

    fn move_clusters(&mut self, file_ref: FileRef, start_vcn: u64, count: u64, new_lcn: Lcn) -> Result<()> {
        let item = self.items.get_mut(&file_ref.0).ok_or_else(|| EngineError::MoveFailed {
            item_id: crate::item::ItemId(0),
            reason: "unknown file_ref".into(),
        })?;

        // Locate and replace the fragment(s) covering [start_vcn, start_vcn+count).
        let mut new_fragments = Vec::with_capacity(item.raw.fragments.len() + 1);
        let mut prev_vcn = 0u64;
        let end_vcn = start_vcn + count;
        let mut moved_lcn = new_lcn.as_u64();

        for frag in &item.raw.fragments {
            let frag_start = prev_vcn;
            let frag_end = frag.next_vcn.as_u64();
            prev_vcn = frag_end;

            if frag_end <= start_vcn || frag_start >= end_vcn {
                new_fragments.push(*frag);
                continue;
            }

            // Fragment overlaps the moved region; split as needed and free its old clusters.
            if frag_start < start_vcn {
                new_fragments.push(Fragment { lcn: frag.lcn, next_vcn: Vcn::new(start_vcn) });
            }
            if !frag.is_virtual() {
                let old_lcn = frag.lcn.as_u64() + (start_vcn.max(frag_start) - frag_start);
                let covered = frag_end.min(end_vcn) - frag_start.max(start_vcn);
                for i in 0..covered {
                    self.bitmap[(old_lcn + i) as usize] = false;
                }
            }
            let covered_end = frag_end.min(end_vcn);
            let covered_len = covered_end - frag_start.max(start_vcn);
            new_fragments.push(Fragment { lcn: Lcn::new(moved_lcn), next_vcn: Vcn::new(covered_end) });
            moved_lcn += covered_len;

            if frag_end > end_vcn {
                new_fragments.push(Fragment { lcn: frag.lcn.checked_add(end_vcn - frag_start).unwrap(), next_vcn: frag.next_vcn });
            }
        }

        for i in 0..count {
            self.bitmap[(new_lcn.as_u64() + i) as usize] = true;
        }

        item.raw.fragments = merge_adjacent(new_fragments);
        Ok(())
    }
}

/// Merges fragments whose physical ranges are contiguous, the way the OS
/// coalesces after a move (spec.md §4.4's alignment rule).
fn merge_adjacent(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let mut merged: Vec<(u64, Fragment)> = Vec::with_capacity(fragments.len());
    let mut prev_vcn = 0u64;

    for frag in fragments {
        let frag_start_vcn = prev_vcn;
        prev_vcn = frag.next_vcn.as_u64();

        if let Some((last_start, last)) = merged.last_mut() {
            let last_len = last.next_vcn.as_u64() - *last_start;
            let aligned = !last.is_virtual()
                && !frag.is_virtual()
                && last.lcn.as_u64() + last_len == frag.lcn.as_u64();
            if aligned {
                last.next_vcn = frag.next_vcn;
                continue;
            }
        }
        merged.push((frag_start_vcn, frag));
    }

    merged.into_iter().map(|(_, f)| f).collect()
}

impl ItemSource for FakeVolume {
    fn volume_info(&self) -> VolumeInfo {
        VolumeBackend::volume_info(self)
    }

    fn items(&self) -> Vec<RawItem> {
        self.items.values().map(|i| i.raw.clone()).collect()
    }
}
