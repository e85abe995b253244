use crate::error::Result;

/// Abstract interface for raw storage I/O.
///
/// This trait handles the "how" of storage (filesystem vs memory), while
/// [`super::hierarchy::HierarchyStore`] and [`super::entity_files::EntityFiles`]
/// handle the "what" (document lifecycle, mirrored layout, atomic sequences).
///
/// All paths are relative to the storage root, use forward slashes, and are
/// normalized by the implementation before use.
pub trait StorageBackend: Send + Sync {
    // --- Root lifecycle ---

    /// Resolve the storage root and make sure it exists.
    /// Returns a displayable form of the root.
    fn prepare_root(&self) -> Result<String>;

    /// Give up on a configured custom root and use the default one.
    /// Returns `false` when already on the default root (nothing to fall back to).
    fn fall_back_to_default(&self) -> bool;

    /// Forget the resolved root so the next `prepare_root` resolves again.
    fn reset_root(&self);

    /// Displayable root, resolved or not.
    fn root_display(&self) -> String;

    // --- Files and directories ---

    fn exists(&self, path: &str) -> Result<bool>;

    /// Returns Ok(None) if the file does not exist.
    fn read_file(&self, path: &str) -> Result<Option<String>>;

    /// Plain (non-atomic) write. The parent directory must exist.
    fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Move `from` onto `to`, replacing `to`. Treated as atomic.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Idempotent: a missing file is not an error.
    fn remove_file(&self, path: &str) -> Result<()>;

    fn create_dir_all(&self, path: &str) -> Result<()>;

    /// Recursive and idempotent: a missing directory is not an error.
    fn remove_dir_all(&self, path: &str) -> Result<()>;

    /// Every file below `dir` (recursively), as root-relative paths.
    /// An empty `dir` means the whole root.
    fn list_files(&self, dir: &str) -> Result<Vec<String>>;
}
