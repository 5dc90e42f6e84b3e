//! Reporter callback set, per spec.md §6. The engine is the only thing that
//! calls these; a GUI, a CLI progress bar, or a test assertion implements
//! them.

use crate::item::ItemId;
use crate::types::{ClusterColor, DebugLevel, Lcn, Zone};

/// Snapshot handed to `on_status`: phase, zone, and progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub phase: Phase,
    pub zone: Option<Zone>,
    pub items_done: u64,
    pub items_total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Analyze,
    Defragment,
    Fixup,
    Optimize,
    MftMove,
}

/// Callback set the engine drives; all methods default to no-ops so a
/// caller only needs to implement the ones it cares about.
pub trait Reporter {
    fn on_status(&self, _state: ProgressState) {}

    fn on_analyze(&self, _state: ProgressState, _item: Option<ItemId>) {}

    fn on_move(&self, _item: ItemId, _clusters: u64, _from_lcn: Lcn, _to_lcn: Lcn, _from_vcn: u64) {}

    fn on_debug(&self, _level: DebugLevel, _item: Option<ItemId>, _text: String) {}

    fn on_draw_cluster(&self, _lcn_begin: Lcn, _lcn_end: Lcn, _color: ClusterColor) {}

    fn on_clear_screen(&self, _text: String) {}
}

/// Discards every event. Used by tests and by the library's non-interactive
/// callers that want the engine to run silently.
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Forwards every event to the `log` crate at a level derived from
/// `DebugLevel`, and logs moves/analyze events at `info`/`trace`.
pub struct LoggingReporter;

impl Reporter for LoggingReporter {
    fn on_status(&self, state: ProgressState) {
        log::info!("{:?} phase: {}/{} items", state.phase, state.items_done, state.items_total);
    }

    fn on_analyze(&self, _state: ProgressState, item: Option<ItemId>) {
        log::trace!("analyzed item {:?}", item);
    }

    fn on_move(&self, item: ItemId, clusters: u64, from_lcn: Lcn, to_lcn: Lcn, from_vcn: u64) {
        log::info!("moved item {:?}: {} clusters, vcn {} {} -> {}", item, clusters, from_vcn, from_lcn, to_lcn);
    }

    fn on_debug(&self, level: DebugLevel, item: Option<ItemId>, text: String) {
        match level {
            DebugLevel::Fatal => log::error!("{:?}: {}", item, text),
            DebugLevel::Warning => log::warn!("{:?}: {}", item, text),
            DebugLevel::Progress | DebugLevel::DetailedProgress => log::debug!("{:?}: {}", item, text),
            DebugLevel::DetailedFileInfo | DebugLevel::DetailedGapFilling | DebugLevel::DetailedGapFinding => {
                log::trace!("{:?}: {}", item, text)
            }
        }
    }

    fn on_draw_cluster(&self, lcn_begin: Lcn, lcn_end: Lcn, color: ClusterColor) {
        log::trace!("draw {}..{} as {:?}", lcn_begin, lcn_end, color);
    }

    fn on_clear_screen(&self, text: String) {
        log::debug!("clear screen: {}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_reporter_accepts_every_callback() {
        let r = NullReporter;
        let state = ProgressState { phase: Phase::Analyze, zone: None, items_done: 0, items_total: 0 };
        r.on_status(state);
        r.on_analyze(state, None);
        r.on_move(ItemId(0), 1, Lcn::new(0), Lcn::new(1), 0);
        r.on_debug(DebugLevel::Progress, None, "ok".into());
        r.on_draw_cluster(Lcn::new(0), Lcn::new(1), ClusterColor::Empty);
        r.on_clear_screen("done".into());
    }
}
