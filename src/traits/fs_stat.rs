//! Predicates and per-path statistics.

use std::path::Path;

use crate::{FsError, Tristate};

/// Existence checks and per-path statistics.
///
/// The predicates return [`Tristate`]: when the check itself cannot be
/// completed (for example permission denied on an ancestor) the answer is
/// [`Tristate::Error`], never a guessed `False`.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsStat`.
pub trait FsStat: Send + Sync {
    /// Like POSIX `test -e`.
    fn exists(&self, path: &Path) -> Tristate;

    /// Like POSIX `test -d`.
    fn is_dir(&self, path: &Path) -> Tristate;

    /// Last access time, seconds since the Unix epoch.
    fn atime(&self, path: &Path) -> Result<i64, FsError>;

    /// Last content modification time, seconds since the Unix epoch.
    fn mtime(&self, path: &Path) -> Result<i64, FsError>;

    /// Size of a file in bytes.
    ///
    /// The meaning depends on the backend: memory backends report the logical
    /// content length, disk backends the space allocated on disk. Code that
    /// runs against several backends must not assume either meaning.
    /// Behavior on a directory is unspecified.
    fn size(&self, path: &Path) -> Result<u64, FsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_stat_is_object_safe() {
        fn _check(_: &dyn FsStat) {}
    }
}
