//! Phase orchestrator: analyze → defragment → fixup → optimize/sort →
//! MFT move, per spec.md §4.8, plus the throttle/cancellation machinery of
//! §5.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::bitmap::VolumeBitmapCache;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::gap_finder::{find_gap, GapExtent};
use crate::item::{Item, ItemId};
use crate::masks::any_matches;
use crate::mover::{move_item, MoverState};
use crate::report::RunReport;
use crate::reporter::{Phase, ProgressState, Reporter};
use crate::selector::{find_best_item, find_highest_item};
use crate::tree::ItemTree;
use crate::types::{DebugLevel, Direction, FilesystemKind, Lcn, RunningState, SortKey, Vcn, Zone};
use crate::volume::{ItemSource, RawItem, VolumeBackend, VolumeInfo};
use crate::zones::{calculate_zones, ZoneBoundaries};

const FIFTY_MIB: u64 = 50 * 1024 * 1024;
const STALE_ACCESS_DAYS: i64 = 30;
const RECENT_CHANGE_MINUTES: i64 = 15;
const NTFS_UNIX_EPOCH_DIFF_100NS: i64 = 116_444_736_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

fn unix_now_as_ntfs_ticks() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp() * TICKS_PER_SECOND + (now.timestamp_subsec_nanos() as i64) / 100 + NTFS_UNIX_EPOCH_DIFF_100NS
}

fn ticks_to_minutes(ticks: i64) -> i64 {
    ticks / TICKS_PER_SECOND / 60
}

/// Cooperative cancellation flag (spec.md §5), shared between the
/// orchestrator and an external caller that wants to interrupt a run.
#[derive(Clone)]
pub struct RunningFlag(Arc<Mutex<RunningState>>);

impl RunningFlag {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(RunningState::Running)))
    }

    pub fn state(&self) -> RunningState {
        *self.0.lock().unwrap()
    }

    pub fn is_stopping(&self) -> bool {
        self.state() != RunningState::Running
    }

    fn request_stop(&self) {
        let mut guard = self.0.lock().unwrap();
        if *guard == RunningState::Running {
            *guard = RunningState::Stopping;
        }
    }

    fn mark_stopped(&self) {
        *self.0.lock().unwrap() = RunningState::Stopped;
    }

    /// Requests a stop and polls every 100 ms for `Stopped`. `timeout ==
    /// None` waits forever; `Some(Duration::ZERO)` checks once and returns
    /// immediately (spec.md §5's "negative means return immediately").
    pub fn stop(&self, timeout: Option<Duration>) -> bool {
        self.request_stop();
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.state() == RunningState::Stopped {
                return true;
            }
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return false;
                }
            }
            if timeout == Some(Duration::ZERO) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }
}

impl Default for RunningFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Speed throttle (spec.md §5): sleeps so that running time tracks
/// `speed_percent` of wall-clock time, capped at 200 ms per sleep.
pub struct Throttle {
    speed_percent: u8,
    start: Instant,
    active: Duration,
}

impl Throttle {
    pub fn new(speed_percent: u8) -> Self {
        Self { speed_percent, start: Instant::now(), active: Duration::ZERO }
    }

    pub fn record_active(&mut self, dur: Duration) {
        self.active += dur;
    }

    pub fn maybe_sleep(&self) {
        if self.speed_percent >= 100 {
            return;
        }
        let wall = self.start.elapsed();
        let target_wall = self.active.as_secs_f64() / (self.speed_percent.max(1) as f64 / 100.0);
        let target_wall = Duration::from_secs_f64(target_wall.max(0.0));
        if target_wall > wall {
            let sleep = (target_wall - wall).min(Duration::from_millis(200));
            std::thread::sleep(sleep);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RunStats {
    items_analyzed: u64,
    items_moved: u64,
    moves_issued: u64,
    items_marked_unmovable: u64,
    disk_full_events: u64,
}

/// The engine: owns the item tree, the volume collaborator, and all
/// per-run state. Created fresh for each volume (spec.md §5: one volume
/// handle per run).
pub struct Engine {
    tree: ItemTree,
    backend: Box<dyn VolumeBackend>,
    raw_items: Vec<RawItem>,
    bitmap: VolumeBitmapCache,
    config: EngineConfig,
    mover_state: MoverState,
    volume_info: VolumeInfo,
    zones: ZoneBoundaries,
    running: RunningFlag,
    stats: RunStats,
}

impl Engine {
    /// `volume` supplies both collaborator traits; its `ItemSource` data is
    /// pulled once up front, then only the OS-primitive half is kept for the
    /// rest of the run.
    pub fn new<V: VolumeBackend + ItemSource + 'static>(volume: V, config: EngineConfig) -> Self {
        let volume_info = ItemSource::volume_info(&volume);
        let raw_items = ItemSource::items(&volume);
        Self {
            tree: ItemTree::new(),
            backend: Box::new(volume),
            raw_items,
            bitmap: VolumeBitmapCache::new(),
            config,
            mover_state: MoverState::new(),
            volume_info,
            zones: ZoneBoundaries { zones: [0, 0, 0, 0] },
            running: RunningFlag::new(),
            stats: RunStats::default(),
        }
    }

    /// A cloneable handle an external caller uses to request cancellation.
    pub fn running_handle(&self) -> RunningFlag {
        self.running.clone()
    }

    pub fn tree(&self) -> &ItemTree {
        &self.tree
    }

    pub fn zones(&self) -> ZoneBoundaries {
        self.zones
    }

    /// Runs every phase implied by `config.optimize_mode`, per spec.md §6's
    /// mode table.
    pub fn run(&mut self, reporter: &dyn Reporter) -> Result<RunReport> {
        let start = Instant::now();
        let mut throttle = Throttle::new(self.config.speed_percent);

        let result = self.run_phases(reporter, &mut throttle);
        self.running.mark_stopped();

        let cancelled = matches!(result, Err(EngineError::Cancelled));
        if cancelled {
            // Cancellation unwinds cleanly; it is not a run failure.
        } else {
            result?;
        }

        Ok(RunReport {
            optimize_mode: self.config.optimize_mode,
            total_clusters: self.volume_info.total_clusters,
            bytes_per_cluster: self.volume_info.bytes_per_cluster,
            items_analyzed: self.stats.items_analyzed,
            items_moved: self.stats.items_moved,
            moves_issued: self.stats.moves_issued,
            items_marked_unmovable: self.stats.items_marked_unmovable,
            disk_full_events: self.stats.disk_full_events,
            cancelled,
            zones: self.zones.zones,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn run_phases(&mut self, reporter: &dyn Reporter, throttle: &mut Throttle) -> Result<()> {
        use crate::types::OptimizeMode::*;

        self.analyze(reporter, throttle)?;
        match self.config.optimize_mode {
            AnalyzeOnly => {}
            AnalyzeFixup => {
                self.defragment(reporter, throttle)?;
            }
            AnalyzeFixupFastOpt => {
                self.defragment(reporter, throttle)?;
                self.fixup(reporter, throttle)?;
                self.optimize_sort(None, reporter, throttle)?;
                self.fixup(reporter, throttle)?;
            }
            ForceTogether => {
                self.force_together(reporter, throttle)?;
            }
            MoveToEnd => {
                self.move_to_end(reporter, throttle)?;
            }
            SortByName => self.optimize_sort(Some(SortKey::Name), reporter, throttle)?,
            SortBySize => self.optimize_sort(Some(SortKey::Size), reporter, throttle)?,
            SortByAccess => self.optimize_sort(Some(SortKey::LastAccess), reporter, throttle)?,
            SortByChanged => self.optimize_sort(Some(SortKey::MftChange), reporter, throttle)?,
            SortByCreated => self.optimize_sort(Some(SortKey::Creation), reporter, throttle)?,
        }

        if self.config.enable_mft_move && self.volume_info.filesystem == FilesystemKind::Ntfs {
            self.move_mft_to_begin(reporter, throttle)?;
        }
        Ok(())
    }

    fn check_running(&self) -> Result<()> {
        if self.running.is_stopping() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    fn suspension_point(&self, throttle: &mut Throttle, work: Duration) -> Result<()> {
        throttle.record_active(work);
        throttle.maybe_sleep();
        self.check_running()
    }

    /// Phase 1: populate the item tree from the parser collaborator and
    /// classify every item (spec.md §4.8 step 1).
    fn analyze(&mut self, reporter: &dyn Reporter, throttle: &mut Throttle) -> Result<()> {
        let now_ticks = unix_now_as_ntfs_ticks();
        let raw_items = std::mem::take(&mut self.raw_items);
        let total = raw_items.len() as u64;

        for raw in raw_items {
            self.check_running()?;
            let mut item = Item::new(raw.long_path.clone(), raw.bytes, raw.is_dir);
            item.file_ref = raw.file_ref;
            item.long_name = raw.long_name;
            item.short_name = raw.short_name;
            item.short_path = raw.short_path;
            item.creation_time = raw.creation_time;
            item.mft_change_time = raw.mft_change_time;
            item.last_access_time = raw.last_access_time;
            item.fragments = raw.fragments;
            item.parent_inode = raw.parent_inode;
            item.recompute_clusters();

            classify(&mut item, &self.config, now_ticks);

            let id = self.tree.insert(item);
            self.stats.items_analyzed += 1;
            reporter.on_analyze(
                ProgressState { phase: Phase::Analyze, zone: None, items_done: self.stats.items_analyzed, items_total: total },
                Some(id),
            );
            self.suspension_point(throttle, Duration::from_micros(1))?;
        }

        self.recalculate_zones();
        reporter.on_status(ProgressState { phase: Phase::Analyze, zone: None, items_done: total, items_total: total });
        Ok(())
    }

    fn recalculate_zones(&mut self) {
        self.zones = calculate_zones(&self.tree, self.volume_info.total_clusters, self.config.free_space_percent as u64, &self.volume_info.mft_excludes);
    }

    /// Phase 2: for each fragmented movable item, find a gap and move it
    /// whole, or piecewise into the best available gaps (spec.md §4.8 step
    /// 2).
    fn defragment(&mut self, reporter: &dyn Reporter, throttle: &mut Throttle) -> Result<()> {
        let candidates: Vec<ItemId> = (0..self.tree.len())
            .map(ItemId)
            .filter(|&id| {
                let item = self.tree.get(id);
                item.is_movable() && crate::fragment_analyzer::is_fragmented(item, 0, item.clusters)
            })
            .collect();
        let total = candidates.len() as u64;

        for (done, id) in candidates.into_iter().enumerate() {
            self.check_running()?;
            let item = self.tree.get(id);
            let clusters = item.clusters;
            let preferred = item.preferred_zone();

            let gap = self.find_gap_in_zone(preferred, clusters, true)?.or(self.find_gap_anywhere(clusters, false)?);
            match gap {
                Some(g) => {
                    self.try_move(id, g.lcn, clusters, Direction::Above, reporter)?;
                }
                None => {
                    self.stats.disk_full_events += 1;
                    reporter.on_debug(DebugLevel::Warning, Some(id), "disk full: no gap for defragment".into());
                }
            }
            reporter.on_status(ProgressState { phase: Phase::Defragment, zone: None, items_done: done as u64 + 1, items_total: total });
            self.suspension_point(throttle, Duration::from_micros(1))?;
        }
        Ok(())
    }

    /// Phase 3: move misplaced or stale-fragmented items into their
    /// preferred zone (spec.md §4.8 step 3).
    fn fixup(&mut self, reporter: &dyn Reporter, throttle: &mut Throttle) -> Result<()> {
        let now_ticks = unix_now_as_ntfs_ticks();
        let candidates: Vec<ItemId> = (0..self.tree.len())
            .map(ItemId)
            .filter(|&id| self.needs_fixup(id, now_ticks))
            .collect();
        let total = candidates.len() as u64;

        for (done, id) in candidates.into_iter().enumerate() {
            self.check_running()?;
            let item = self.tree.get(id);
            let clusters = item.clusters;
            let preferred = item.preferred_zone();

            if let Some(gap) = self.find_gap_in_zone(preferred, clusters, true)? {
                self.try_move(id, gap.lcn, clusters, Direction::Above, reporter)?;
            } else {
                self.stats.disk_full_events += 1;
                reporter.on_debug(DebugLevel::Warning, Some(id), "disk full: no gap in preferred zone".into());
            }
            reporter.on_status(ProgressState { phase: Phase::Fixup, zone: Some(preferred), items_done: done as u64 + 1, items_total: total });
            self.suspension_point(throttle, Duration::from_micros(1))?;
        }
        Ok(())
    }

    fn needs_fixup(&self, id: ItemId, now_ticks: i64) -> bool {
        let item = self.tree.get(id);
        if !item.is_movable() {
            return false;
        }
        if ticks_to_minutes(now_ticks - item.mft_change_time) < RECENT_CHANGE_MINUTES {
            return false;
        }
        if crate::fragment_analyzer::is_fragmented(item, 0, item.clusters) {
            return true;
        }
        let lcn = item.item_lcn().as_u64();
        let preferred = item.preferred_zone();
        let in_mft_exclude = self.volume_info.mft_excludes.iter().any(|(s, e)| lcn >= s.as_u64() && lcn < e.as_u64());
        if in_mft_exclude {
            return true;
        }
        match preferred {
            Zone::Regular => lcn < self.zones.start_of(Zone::Regular),
            Zone::SpaceHogs => lcn < self.zones.start_of(Zone::SpaceHogs),
            Zone::Directories => false,
        }
    }

    /// Phase 4: optimize/sort. With `key == None`, items are simply packed
    /// in ascending current-LCN order within each zone (the default
    /// `AnalyzeFixupFastOpt` pass); with a key, items are ordered by it
    /// (spec.md §4.9).
    fn optimize_sort(&mut self, key: Option<SortKey>, reporter: &dyn Reporter, throttle: &mut Throttle) -> Result<()> {
        for zone in [Zone::Directories, Zone::Regular, Zone::SpaceHogs] {
            self.check_running()?;
            let mut items: Vec<ItemId> = (0..self.tree.len())
                .map(ItemId)
                .filter(|&id| self.tree.get(id).preferred_zone() == zone && self.tree.get(id).is_movable())
                .collect();
            sort_items(&mut items, &self.tree, key);

            let mut write_head = self.zones.start_of(zone);
            let total = items.len() as u64;
            for (done, id) in items.into_iter().enumerate() {
                self.check_running()?;
                let item = self.tree.get(id);
                let clusters = item.clusters;
                if clusters == 0 {
                    continue;
                }
                if item.item_lcn().as_u64() == write_head {
                    write_head += clusters;
                    continue;
                }
                if self.vacate(write_head, clusters, reporter)? {
                    self.try_move(id, Lcn::new(write_head), clusters, Direction::Above, reporter)?;
                }
                write_head += clusters;
                reporter.on_status(ProgressState { phase: Phase::Optimize, zone: Some(zone), items_done: done as u64 + 1, items_total: total });
                self.suspension_point(throttle, Duration::from_micros(1))?;
            }
        }
        Ok(())
    }

    /// `ForceTogether` mode: pack items from the high end of the volume
    /// into gaps at the low end, using the selector's fit-search over the
    /// item tree (spec.md §6's mode table, spec.md §4.7).
    fn force_together(&mut self, reporter: &dyn Reporter, throttle: &mut Throttle) -> Result<()> {
        let max_iterations = self.tree.len() + 1;
        for _ in 0..max_iterations {
            self.check_running()?;
            let Some(gap) = self.find_gap_anywhere(1, false)? else { break };

            let chain = find_best_item(&self.tree, gap, Direction::Below, None)
                .or_else(|| find_highest_item(&self.tree, gap, Direction::Below, None).map(|id| vec![id]));
            let Some(chain) = chain else { break };

            let mut cursor = gap.lcn.as_u64();
            for id in chain {
                self.check_running()?;
                let clusters = self.tree.get(id).clusters;
                if clusters == 0 {
                    continue;
                }
                self.try_move(id, Lcn::new(cursor), clusters, Direction::Below, reporter)?;
                cursor += clusters;
            }
            reporter.on_status(ProgressState { phase: Phase::Optimize, zone: None, items_done: 0, items_total: 0 });
            self.suspension_point(throttle, Duration::from_micros(1))?;
        }
        Ok(())
    }

    fn move_to_end(&mut self, reporter: &dyn Reporter, throttle: &mut Throttle) -> Result<()> {
        let boundary = self.zones.start_of(Zone::Regular);
        let candidates: Vec<ItemId> = (0..self.tree.len())
            .map(ItemId)
            .filter(|&id| {
                let item = self.tree.get(id);
                item.is_movable() && item.item_lcn().as_u64() < boundary && item.preferred_zone() != Zone::Directories
            })
            .collect();
        let total = candidates.len() as u64;

        for (done, id) in candidates.into_iter().enumerate() {
            self.check_running()?;
            let item = self.tree.get(id);
            let clusters = item.clusters;
            if let Some(gap) = self.find_gap_anywhere(clusters, true)? {
                self.try_move(id, gap.lcn, clusters, Direction::Below, reporter)?;
            }
            reporter.on_status(ProgressState { phase: Phase::Optimize, zone: None, items_done: done as u64 + 1, items_total: total });
            self.suspension_point(throttle, Duration::from_micros(1))?;
        }
        Ok(())
    }

    /// Moves the MFT item to the lowest possible LCN (spec.md §4.8 step 5);
    /// an explicit opt-in mode per spec.md §9's second open question.
    fn move_mft_to_begin(&mut self, reporter: &dyn Reporter, throttle: &mut Throttle) -> Result<()> {
        let mft_masks = [crate::masks::Mask::new("?:\\$MFT")];
        let mft_id = (0..self.tree.len()).map(ItemId).find(|&id| {
            let item = self.tree.get(id);
            any_matches(&mft_masks, item.long_path.as_deref(), item.short_path.as_deref())
        });
        let Some(id) = mft_id else { return Ok(()) };
        self.check_running()?;

        let clusters = self.tree.get(id).clusters;
        if clusters == 0 {
            return Ok(());
        }
        if let Some(gap) = self.find_gap_anywhere(clusters, false)? {
            self.try_move(id, gap.lcn, clusters, Direction::Above, reporter)?;
        }
        self.suspension_point(throttle, Duration::from_micros(1))
    }

    fn try_move(&mut self, id: ItemId, new_lcn: Lcn, clusters: u64, direction: Direction, reporter: &dyn Reporter) -> Result<()> {
        let _ = direction;
        self.stats.moves_issued += 1;
        let moved = move_item(
            &mut self.tree,
            id,
            &mut *self.backend,
            &mut self.bitmap,
            self.volume_info.bytes_per_cluster,
            new_lcn,
            0,
            clusters,
            &mut self.mover_state,
            reporter,
            self.volume_info.total_clusters,
            &self.volume_info.mft_excludes,
            self.config.ignore_mft_excludes,
        )?;
        if moved {
            self.stats.items_moved += 1;
            self.recalculate_zones();
        } else if self.tree.get(id).is_unmovable() {
            self.stats.items_marked_unmovable += 1;
        }
        Ok(())
    }

    fn find_gap_in_zone(&mut self, zone: Zone, min_size: u64, must_fit: bool) -> Result<Option<GapExtent>> {
        let min_lcn = Lcn::new(self.zones.start_of(zone));
        let max_lcn = Lcn::new(self.zones.end_of(zone));
        find_gap(
            &mut self.bitmap,
            &*self.backend,
            self.volume_info.total_clusters,
            min_lcn,
            max_lcn,
            min_size,
            must_fit,
            false,
            &self.volume_info.mft_excludes,
            self.config.ignore_mft_excludes,
        )
    }

    fn find_gap_anywhere(&mut self, min_size: u64, find_highest: bool) -> Result<Option<GapExtent>> {
        find_gap(
            &mut self.bitmap,
            &*self.backend,
            self.volume_info.total_clusters,
            Lcn::new(0),
            Lcn::new(0),
            min_size,
            false,
            find_highest,
            &self.volume_info.mft_excludes,
            self.config.ignore_mft_excludes,
        )
    }

    /// Shifts movable items upward to open `>= clusters` free clusters
    /// starting at `lcn` (spec.md §4.8.1). Stops before moving an item past
    /// its own preferred-zone watermark, preventing repeated re-vacating of
    /// the same file ("worm" ping-pong).
    fn vacate(&mut self, lcn: u64, clusters: u64, reporter: &dyn Reporter) -> Result<bool> {
        if clusters == 0 {
            return Ok(true);
        }
        let mut free = 0u64;
        let mut probe = lcn;
        while free < clusters && probe < self.volume_info.total_clusters {
            if !self.bitmap.in_use(&*self.backend, Lcn::new(probe), &self.volume_info.mft_excludes, self.config.ignore_mft_excludes)? {
                free += 1;
                probe += 1;
                continue;
            }

            let blocker = (0..self.tree.len()).map(ItemId).find(|&id| {
                let item = self.tree.get(id);
                let item_lcn = item.item_lcn().as_u64();
                item_lcn <= probe && probe < item_lcn + item.clusters
            });
            let Some(blocker_id) = blocker else { return Ok(false) };
            let blocker_item = self.tree.get(blocker_id);
            if !blocker_item.is_movable() {
                return Ok(false);
            }
            let blocker_clusters = blocker_item.clusters;
            let watermark = self.zones.end_of(blocker_item.preferred_zone());
            let new_lcn = probe + clusters;
            if new_lcn + blocker_clusters > watermark {
                return Ok(false);
            }

            self.try_move(blocker_id, Lcn::new(new_lcn), blocker_clusters, Direction::Above, reporter)?;
            free = 0;
            probe = lcn;
        }
        Ok(free >= clusters)
    }
}

fn classify(item: &mut Item, config: &EngineConfig, now_ticks: i64) {
    use crate::item::ItemFlags;

    if any_matches(&config.exclude_masks, item.long_path.as_deref(), item.short_path.as_deref()) {
        item.flags.insert(ItemFlags::IS_EXCLUDED);
    }
    if any_matches(&config.unmovable_masks, item.long_path.as_deref(), item.short_path.as_deref()) {
        item.flags.insert(ItemFlags::IS_UNMOVABLE);
    }

    let stale = ticks_to_minutes(now_ticks - item.last_access_time) >= STALE_ACCESS_DAYS * 24 * 60;
    let is_large = item.bytes > FIFTY_MIB;
    if is_large || stale || any_matches(&config.space_hog_masks, item.long_path.as_deref(), item.short_path.as_deref()) {
        item.flags.insert(ItemFlags::IS_HOG);
    }
}

fn sort_items(items: &mut [ItemId], tree: &ItemTree, key: Option<SortKey>) {
    items.sort_by(|&a, &b| {
        let ia = tree.get(a);
        let ib = tree.get(b);
        let primary = match key {
            None => ia.item_lcn().as_u64().cmp(&ib.item_lcn().as_u64()),
            Some(SortKey::Name) => ia.path_for_sort().to_lowercase().cmp(&ib.path_for_sort().to_lowercase()),
            Some(SortKey::Size) => ia.bytes.cmp(&ib.bytes),
            Some(SortKey::LastAccess) => ib.last_access_time.cmp(&ia.last_access_time),
            Some(SortKey::MftChange) => ia.mft_change_time.cmp(&ib.mft_change_time),
            Some(SortKey::Creation) => ia.creation_time.cmp(&ib.creation_time),
        };
        primary
            .then_with(|| ia.path_for_sort().cmp(ib.path_for_sort()))
            .then_with(|| ia.bytes.cmp(&ib.bytes))
            .then_with(|| ia.item_lcn().as_u64().cmp(&ib.item_lcn().as_u64()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::item::Fragment;
    use crate::reporter::NullReporter;
    use crate::testing::FakeVolume;

    fn cfg() -> EngineConfig {
        EngineConfig::build(None, 2, 100, 5, 2, None, &[], &[], false, false, false, false, None).unwrap()
    }

    #[test]
    fn single_fragmented_file_one_gap_sufficient() {
        let mut fake = FakeVolume::new(1000, 4096);
        fake.add_fragmented_file("a.txt", vec![Fragment { lcn: Lcn::new(100), next_vcn: Vcn::new(10) }, Fragment { lcn: Lcn::new(300), next_vcn: Vcn::new(20) }], false);

        let mut config = EngineConfig::build(None, 1, 100, 0, 2, None, &[], &[], false, false, false, false, None).unwrap();
        config.free_space_percent = 0;
        let mut engine = Engine::new(fake, config);
        let report = engine.run(&NullReporter).unwrap();
        assert!(!report.cancelled);

        let item = engine.tree().get(ItemId(0));
        assert_eq!(item.fragments.len(), 1);
        assert_eq!(item.item_lcn(), Lcn::new(500));
    }

    #[test]
    fn disk_full_leaves_item_unmoved() {
        let mut fake = FakeVolume::new(10, 4096);
        fake.add_file("big.bin", Lcn::new(0), 5, false);
        let config = EngineConfig::build(None, 1, 100, 0, 2, None, &[], &[], false, false, false, false, None).unwrap();
        let mut engine = Engine::new(fake, config);
        let report = engine.run(&NullReporter).unwrap();
        assert!(!report.cancelled);
        assert_eq!(engine.tree().get(ItemId(0)).item_lcn(), Lcn::new(0));
    }

    #[test]
    fn cancellation_mid_run_stops_cleanly() {
        let mut fake = FakeVolume::new(100_000, 4096);
        for i in 0..200u64 {
            fake.add_fragmented_file(
                &format!("f{i}.bin"),
                vec![
                    Fragment { lcn: Lcn::new(i * 20), next_vcn: Vcn::new(5) },
                    Fragment { lcn: Lcn::new(i * 20 + 50_000), next_vcn: Vcn::new(10) },
                ],
                false,
            );
        }
        let config = cfg();
        let mut engine = Engine::new(fake, config);
        let handle = engine.running_handle();
        handle.request_stop();
        let report = engine.run(&NullReporter).unwrap();
        assert!(report.cancelled);
        assert_eq!(handle.state(), RunningState::Stopped);
    }
}
