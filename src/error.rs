use crate::item::ItemId;
use crate::types::FilesystemKind;
use thiserror::Error;

/// Error type for the defragmentation engine.
///
/// Volume-level variants (`VolumeOpenFailed`, `BitmapReadFailed`) abort the
/// current volume or phase; item-level variants (`ExtentMapFailed`,
/// `MoveFailed`) are caught by the orchestrator and turned into
/// `is_unmovable = true` rather than propagated further.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to open volume {volume}: {source}")]
    VolumeOpenFailed {
        volume: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bitmap read failed at lcn {lcn}: {source}")]
    BitmapReadFailed {
        lcn: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("extent map query failed for item {item_id:?}: {source}")]
    ExtentMapFailed {
        item_id: ItemId,
        #[source]
        source: std::io::Error,
    },

    #[error("move failed for item {item_id:?}: {reason}")]
    MoveFailed { item_id: ItemId, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("no gap available for requested placement ({clusters_needed} clusters)")]
    DiskFull { clusters_needed: u64 },

    #[error("unsupported filesystem: {0:?}")]
    UnsupportedFilesystem(FilesystemKind),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
