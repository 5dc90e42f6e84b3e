//! Engine library for analyzing and defragmenting NTFS/FAT volumes.
//!
//! The engine never touches a volume directly: every OS primitive and every
//! filesystem parse goes through the `VolumeBackend`/`ItemSource` trait
//! boundary, and every progress/debug/move event goes through `Reporter`.
//! This keeps the core algorithms (gap finding, the item tree, the mover,
//! zone placement, selection, optimize/sort) testable against an in-memory
//! volume.

pub mod bitmap;
pub mod config;
pub mod error;
pub mod fragment_analyzer;
pub mod gap_finder;
pub mod item;
pub mod masks;
pub mod mover;
pub mod orchestrator;
pub mod report;
pub mod reporter;
pub mod selector;
pub mod tree;
pub mod types;
pub mod volume;
pub mod zones;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use item::{Fragment, Item, ItemFlags, ItemId};
pub use orchestrator::Engine;
pub use reporter::{LoggingReporter, NullReporter, Reporter};
pub use types::{ClusterColor, DebugLevel, FilesystemKind, Lcn, OptimizeMode, RunningState, SortKey, Vcn, Zone};
pub use volume::{FileRef, ItemSource, RawItem, VolumeBackend, VolumeInfo};
