//! Volume bitmap cache, per spec.md §4.1.
//!
//! A fixed ~64 KiB buffer holds one contiguous window of the volume's
//! allocation bitmap, fetched from the `VolumeBackend` collaborator. The
//! cache does not track dirtiness: the bitmap is assumed to change under the
//! engine's feet, so any pass that must be authoritative re-reads.

use crate::error::Result;
use crate::types::Lcn;
use crate::volume::{BitmapFragment, VolumeBackend};

/// 64 KiB of bitmap bits covers 524_288 clusters on a 4 KiB-cluster volume.
pub const BITMAP_FRAGMENT_BYTES: usize = 64 * 1024;
pub const BITS_PER_FRAGMENT: u64 = BITMAP_FRAGMENT_BYTES as u64 * 8;

pub struct VolumeBitmapCache {
    fragment: Option<BitmapFragment>,
}

impl VolumeBitmapCache {
    pub fn new() -> Self {
        Self { fragment: None }
    }

    /// Up to three half-open LCN ranges treated as in-use regardless of the
    /// bitmap, unless `ignore_mft_excludes` is set (spec.md §3, §4.3).
    pub fn in_use(
        &mut self,
        backend: &dyn VolumeBackend,
        lcn: Lcn,
        mft_excludes: &[(Lcn, Lcn)],
        ignore_mft_excludes: bool,
    ) -> Result<bool> {
        if !ignore_mft_excludes {
            for (start, end) in mft_excludes {
                if lcn >= *start && lcn < *end {
                    return Ok(true);
                }
            }
        }

        let needs_reload = match &self.fragment {
            Some(f) => lcn < f.starting_lcn || lcn.as_u64() >= f.starting_lcn.as_u64() + f.bit_len,
            None => true,
        };
        if needs_reload {
            self.fragment = Some(backend.read_bitmap(lcn)?);
        }

        let fragment = self.fragment.as_ref().unwrap();
        let rel = lcn.as_u64() - fragment.starting_lcn.as_u64();
        let byte = fragment.bits[(rel / 8) as usize];
        Ok(byte & (1 << (rel % 8)) != 0)
    }

    /// Forces the next `in_use` call to re-read, regardless of window overlap.
    pub fn invalidate(&mut self) {
        self.fragment = None;
    }
}

impl Default for VolumeBitmapCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVolume;

    #[test]
    fn reports_free_and_in_use_clusters() {
        let mut fake = FakeVolume::new(1000, 4096);
        fake.mark_in_use(Lcn::new(5));
        let mut cache = VolumeBitmapCache::new();
        assert!(cache.in_use(&fake, Lcn::new(5), &[], false).unwrap());
        assert!(!cache.in_use(&fake, Lcn::new(6), &[], false).unwrap());
    }

    #[test]
    fn mft_exclusion_range_counts_as_in_use() {
        let fake = FakeVolume::new(1000, 4096);
        let mut cache = VolumeBitmapCache::new();
        let excludes = [(Lcn::new(10), Lcn::new(20))];
        assert!(cache.in_use(&fake, Lcn::new(15), &excludes, false).unwrap());
        assert!(!cache.in_use(&fake, Lcn::new(15), &excludes, true).unwrap());
        assert!(!cache.in_use(&fake, Lcn::new(25), &excludes, false).unwrap());
    }

    #[test]
    fn reloads_window_on_miss() {
        let mut fake = FakeVolume::new(2_000_000, 4096);
        fake.mark_in_use(Lcn::new(1_500_000));
        let mut cache = VolumeBitmapCache::new();
        assert!(!cache.in_use(&fake, Lcn::new(0), &[], false).unwrap());
        assert!(cache.in_use(&fake, Lcn::new(1_500_000), &[], false).unwrap());
    }
}
