//! File-level primitives: opening handles, renaming, removing.

use std::path::Path;

use crate::{FsError, HandleIssuer, InputFile, OutputFile};

/// File-level primitives of a backend.
///
/// The `create_*` and [`move_file`](FsFiles::move_file) primitives assume the
/// destination's parent directory already exists. Callers normally go through
/// [`FileSystemExt`](crate::FileSystemExt), whose `open_output_file`,
/// `open_temp_file` and `rename_file` create the parent chain first.
///
/// Implementations report every failure to their
/// [`Diagnostics`](crate::Diagnostics) sink before returning it.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsFiles`.
pub trait FsFiles: Send + Sync {
    /// Open an existing file for reading.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file does not exist
    /// - [`FsError::NotAFile`] if the path is a directory
    /// - [`FsError::PermissionDenied`] if read access is denied
    fn open_input_file(&self, path: &Path) -> Result<InputFile, FsError>;

    /// Open a file for writing, truncating it unless `append` is set.
    /// The parent directory must exist.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the parent directory does not exist
    /// - [`FsError::NotAFile`] if the path is a directory
    fn create_output_file(&self, path: &Path, append: bool) -> Result<OutputFile, FsError>;

    /// Create a new, uniquely named file whose name starts with `prefix`.
    /// The directory part of `prefix` must exist.
    ///
    /// The generated name is available from [`OutputFile::filename`].
    fn create_temp_file(&self, prefix: &Path) -> Result<OutputFile, FsError>;

    /// Rename `from` to `to`, replacing an existing file at `to`. The parent
    /// of `to` must exist. Must be atomic within a single directory.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `from` or the parent of `to` does not exist
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    /// Remove a file, like POSIX `rm`.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if the file does not exist
    /// - [`FsError::NotAFile`] if the path is a directory
    fn remove_file(&self, path: &Path) -> Result<(), FsError>;

    /// Identity stamped on every handle this backend opens.
    ///
    /// [`FileSystemExt::close`](crate::FileSystemExt::close) only finalizes
    /// handles whose issuer matches. Wrappers that hand out the inner
    /// backend's handles return the inner issuer.
    fn issuer(&self) -> &HandleIssuer;

    /// Longest path accepted below `base`.
    fn max_path_length(&self, _base: &Path) -> usize {
        8192
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_files_is_object_safe() {
        fn _check(_: &dyn FsFiles) {}
    }

    #[test]
    fn fs_files_requires_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        fn _check<T: FsFiles>() {
            _assert_send_sync::<T>();
        }
    }
}
