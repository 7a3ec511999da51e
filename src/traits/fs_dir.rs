//! Directory primitives.

use std::path::{Path, PathBuf};

use crate::FsError;

/// Directory primitives of a backend.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`, but [`list_contents`](FsDir::list_contents)
/// is not safe against another thread mutating the same directory. Callers
/// that need a stable listing must serialize access themselves.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsDir`.
pub trait FsDir: Send + Sync {
    /// Create a directory, like POSIX `mkdir`. No recursion.
    ///
    /// # Errors
    ///
    /// - [`FsError::AlreadyExists`] if the path already exists
    /// - [`FsError::NotFound`] if the parent directory does not exist
    fn make_dir(&self, path: &Path) -> Result<(), FsError>;

    /// Remove an empty directory, like POSIX `rmdir`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::NotADirectory`] if the path is not a directory
    /// - [`FsError::DirectoryNotEmpty`] if the directory has entries
    fn remove_dir(&self, path: &Path) -> Result<(), FsError>;

    /// Full paths of the direct children of `dir`, excluding `.` and `..`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the path does not exist
    /// - [`FsError::NotADirectory`] if the path is not a directory
    fn list_contents(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError>;
}
