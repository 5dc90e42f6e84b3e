//! Collaborator boundaries named but left unimplemented by spec.md §1/§6: the
//! on-disk NTFS/FAT parsers and the OS cluster-bitmap/extent-map/move
//! primitives. The engine depends only on these traits.

use crate::error::Result;
use crate::item::Fragment;
use crate::types::{FilesystemKind, Lcn};

/// One window of the volume's allocation bitmap, as returned by
/// `FSCTL_GET_VOLUME_BITMAP` in the source implementation.
#[derive(Debug, Clone)]
pub struct BitmapFragment {
    pub starting_lcn: Lcn,
    pub bit_len: u64,
    pub bits: Vec<u8>,
}

/// Volume-wide metadata supplied by the parser collaborator (spec.md §6).
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub bytes_per_cluster: u64,
    pub total_clusters: u64,
    pub mft_locked_clusters: u64,
    pub mft_excludes: Vec<(Lcn, Lcn)>,
    pub filesystem: FilesystemKind,
}

/// Opaque file identifier a `VolumeBackend` uses to find a file again (the
/// NTFS file reference number or FAT directory-entry location, in a real
/// backend). Stands in for an open file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileRef(pub u64);

/// A file or directory as produced by the analyze-phase parser collaborator,
/// before the engine wraps it into an `Item` with tree/flag state.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub file_ref: FileRef,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub long_path: Option<String>,
    pub short_path: Option<String>,
    pub bytes: u64,
    pub creation_time: i64,
    pub mft_change_time: i64,
    pub last_access_time: i64,
    pub fragments: Vec<Fragment>,
    pub parent_inode: u64,
    pub is_dir: bool,
}

/// The OS primitives the mover, bitmap cache, and fragment analyzer call
/// through. Out of scope to implement for a real Windows volume (spec.md
/// §1); a real backend would issue `FSCTL_GET_VOLUME_BITMAP`,
/// `FSCTL_GET_RETRIEVAL_POINTERS`, and `FSCTL_MOVE_FILE`.
pub trait VolumeBackend: Send + Sync {
    fn volume_info(&self) -> VolumeInfo;

    /// Reads one ~64 KiB bitmap window starting at or before `lcn`.
    fn read_bitmap(&self, lcn: Lcn) -> Result<BitmapFragment>;

    /// Re-queries the current fragment list for an item (`FSCTL_GET_RETRIEVAL_POINTERS`).
    fn get_fragments(&self, file_ref: FileRef) -> Result<Vec<Fragment>>;

    /// Moves `count` virtual clusters starting at `start_vcn` of the item to
    /// `new_lcn`. One call per OS primitive invocation; the mover splits
    /// larger requests into chunks itself.
    fn move_clusters(&mut self, file_ref: FileRef, start_vcn: u64, count: u64, new_lcn: Lcn) -> Result<()>;
}

/// Populates the initial item tree during the analyze phase (spec.md §6).
pub trait ItemSource {
    fn volume_info(&self) -> VolumeInfo;
    fn items(&self) -> Vec<RawItem>;
}
