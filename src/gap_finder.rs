//! Gap finder: scans the bitmap cache for free extents, per spec.md §4.3.

use crate::bitmap::VolumeBitmapCache;
use crate::error::Result;
use crate::types::Lcn;
use crate::volume::VolumeBackend;

/// A maximal run of free LCNs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapExtent {
    pub lcn: Lcn,
    pub clusters: u64,
}

#[allow(clippy::too_many_arguments)]
pub fn find_gap(
    cache: &mut VolumeBitmapCache,
    backend: &dyn VolumeBackend,
    total_clusters: u64,
    min_lcn: Lcn,
    max_lcn: Lcn,
    min_size: u64,
    must_fit: bool,
    find_highest: bool,
    mft_excludes: &[(Lcn, Lcn)],
    ignore_mft_excludes: bool,
) -> Result<Option<GapExtent>> {
    if min_lcn.as_u64() >= total_clusters {
        return Ok(None);
    }
    let scan_end = if max_lcn.as_u64() == 0 { total_clusters } else { max_lcn.as_u64().min(total_clusters) };

    let mut best_fitting: Option<GapExtent> = None;
    let mut best_overall: Option<GapExtent> = None;
    let mut run_start: Option<u64> = None;
    let mut lcn = min_lcn.as_u64();

    macro_rules! consider_run {
        ($start:expr, $len:expr) => {{
            let gap = GapExtent { lcn: Lcn::new($start), clusters: $len };
            if best_overall.map_or(true, |b| gap.clusters > b.clusters) {
                best_overall = Some(gap);
            }
            if gap.clusters >= min_size {
                if !find_highest {
                    return Ok(Some(gap));
                }
                if best_fitting.map_or(true, |b| gap.clusters > b.clusters) {
                    best_fitting = Some(gap);
                }
            }
        }};
    }

    while lcn < scan_end {
        let free = !cache.in_use(backend, Lcn::new(lcn), mft_excludes, ignore_mft_excludes)?;

        match (free, run_start) {
            (true, None) => run_start = Some(lcn),
            (false, Some(start)) => {
                consider_run!(start, lcn - start);
                run_start = None;
            }
            _ => {}
        }
        lcn += 1;
    }
    if let Some(start) = run_start {
        consider_run!(start, scan_end - start);
    }

    let result = best_fitting.or(if must_fit { None } else { best_overall });
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeVolume;

    #[test]
    fn min_lcn_past_volume_end_returns_none() {
        let fake = FakeVolume::new(1000, 4096);
        let mut cache = VolumeBitmapCache::new();
        let gap = find_gap(&mut cache, &fake, 1000, Lcn::new(1000), Lcn::new(0), 1, true, false, &[], false).unwrap();
        assert!(gap.is_none());
    }

    #[test]
    fn finds_first_fitting_gap() {
        let mut fake = FakeVolume::new(1000, 4096);
        fake.mark_range_in_use(Lcn::new(0), 100);
        fake.mark_range_in_use(Lcn::new(150), 10); // small gap before this: [100,150)
        let mut cache = VolumeBitmapCache::new();
        let gap = find_gap(&mut cache, &fake, 1000, Lcn::new(0), Lcn::new(0), 20, true, false, &[], false)
            .unwrap()
            .unwrap();
        assert_eq!(gap.lcn, Lcn::new(100));
        assert_eq!(gap.clusters, 50);
    }

    #[test]
    fn finds_highest_largest_gap_over_whole_range() {
        let mut fake = FakeVolume::new(1000, 4096);
        fake.mark_range_in_use(Lcn::new(50), 1); // splits [0,50) and [51,1000)
        let mut cache = VolumeBitmapCache::new();
        let gap = find_gap(&mut cache, &fake, 1000, Lcn::new(0), Lcn::new(0), 1, true, true, &[], false)
            .unwrap()
            .unwrap();
        assert_eq!(gap.lcn, Lcn::new(51));
        assert_eq!(gap.clusters, 949);
    }

    #[test]
    fn must_fit_false_returns_largest_gap_when_nothing_fits() {
        let mut fake = FakeVolume::new(100, 4096);
        fake.mark_range_in_use(Lcn::new(10), 90); // only [0,10) free
        let mut cache = VolumeBitmapCache::new();
        let gap = find_gap(&mut cache, &fake, 100, Lcn::new(0), Lcn::new(0), 50, false, false, &[], false)
            .unwrap()
            .unwrap();
        assert_eq!(gap.clusters, 10);
    }

    #[test]
    fn must_fit_true_returns_none_when_nothing_fits() {
        let mut fake = FakeVolume::new(100, 4096);
        fake.mark_range_in_use(Lcn::new(10), 90);
        let mut cache = VolumeBitmapCache::new();
        let gap = find_gap(&mut cache, &fake, 100, Lcn::new(0), Lcn::new(0), 50, true, false, &[], false).unwrap();
        assert!(gap.is_none());
    }
}
