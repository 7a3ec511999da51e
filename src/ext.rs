//! # Composite Operations
//!
//! Backend-independent algorithms built once on top of the primitive traits.
//!
//! ## Overview
//!
//! [`FileSystemExt`] has a blanket implementation for every
//! [`FileSystem`], so each backend gets exactly the same behavior for the
//! operations below and cannot override them.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`open_output_file`](FileSystemExt::open_output_file) | create parents, then open truncating |
//! | [`open_output_file_for_append`](FileSystemExt::open_output_file_for_append) | create parents, then open appending |
//! | [`open_temp_file`](FileSystemExt::open_temp_file) | create parents, then open a fresh temp file |
//! | [`rename_file`](FileSystemExt::rename_file) | create parents of the target, then rename |
//! | [`close`](FileSystemExt::close) | finalize an owned handle |
//! | [`recursively_make_dir`](FileSystemExt::recursively_make_dir) | `mkdir -p` |
//! | [`read_file`](FileSystemExt::read_file) and friends | bounded whole-file reads |
//! | [`write_file`](FileSystemExt::write_file) | non-atomic write |
//! | [`write_temp_file`](FileSystemExt::write_temp_file) | write a fresh temp file |
//! | [`write_file_atomic`](FileSystemExt::write_file_atomic) | temp file + rename |
//! | [`dir_info`](FileSystemExt::dir_info) | recursive size / empty-dir accounting |
//! | [`try_lock_with_timeout`](FileSystemExt::try_lock_with_timeout) | best-effort lock, if supported |
//! | [`bump_lock_timeout`](FileSystemExt::bump_lock_timeout) | refresh a best-effort lock |
//!
//! Failures detected here are reported to the backend's
//! [`Diagnostics`](crate::Diagnostics); failures coming up from a primitive
//! were already reported by the backend and are passed through unchanged.
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature, `FileSystemJsonExt` adds `read_json` and
//! `write_json_atomic`.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::handle::sealed::Finalize;
use crate::{
    Clock, DirInfo, FileInfo, FileSystem, FsError, InputFile, NullProgressNotifier, OutputFile,
    OwnedFile, ProgressNotifier, SizeLimit, Tristate,
};

/// Composite operations available on every backend.
///
/// # Example
///
/// ```rust
/// use artifact_fs::{FileSystemExt, FsStat, MemFileSystem, SizeLimit};
/// use std::path::Path;
///
/// let fs = MemFileSystem::new();
/// let path = Path::new("/cache/ab/cd/entry");
///
/// // Parent directories are created on demand.
/// fs.write_file_atomic(path, b"rewritten body").unwrap();
/// assert!(fs.exists(path).is_true());
///
/// let body = fs.read_file(path, SizeLimit::Bytes(1024)).unwrap();
/// assert_eq!(body, b"rewritten body");
/// ```
pub trait FileSystemExt: FileSystem {
    /// Open `path` for writing, truncating it. Missing parent directories
    /// are created first.
    fn open_output_file(&self, path: &Path) -> Result<OutputFile, FsError> {
        ensure_parent_dir(self, path)?;
        self.create_output_file(path, false)
    }

    /// Open `path` for appending. Missing parent directories are created
    /// first.
    fn open_output_file_for_append(&self, path: &Path) -> Result<OutputFile, FsError> {
        ensure_parent_dir(self, path)?;
        self.create_output_file(path, true)
    }

    /// Open a new temp file whose name starts with `prefix`. Missing parent
    /// directories are created first. The chosen name is available from
    /// [`OutputFile::filename`].
    fn open_temp_file(&self, prefix: &Path) -> Result<OutputFile, FsError> {
        ensure_parent_dir(self, prefix)?;
        self.create_temp_file(prefix)
    }

    /// Like POSIX `mv`, except that missing parent directories of `to` are
    /// created first.
    fn rename_file(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        ensure_parent_dir(self, to)?;
        self.move_file(from, to)
    }

    /// Close a handle issued by this filesystem.
    ///
    /// Failures are reported to the diagnostic sink and returned. The handle
    /// is consumed either way.
    ///
    /// # Errors
    ///
    /// - [`FsError::ForeignHandle`] if another filesystem opened `file`,
    ///   reported to this filesystem's sink. The handle is then dropped
    ///   unclosed, which its issuer sees as a leak.
    /// - whatever the backend's close returns
    fn close<F: OwnedFile>(&self, file: F) -> Result<(), FsError> {
        if !file.issuer().same_as(self.issuer()) {
            return Err(report(
                self,
                FsError::ForeignHandle {
                    path: file.filename().to_path_buf(),
                },
            ));
        }
        file.finalize()
    }

    /// Like POSIX `mkdir -p`.
    ///
    /// Walks `path` from the root and creates only the missing segments.
    /// Stops at the first segment that exists but is not a directory, whose
    /// type cannot be determined, or that cannot be created; directories
    /// created before that point are left in place.
    ///
    /// A segment that another process creates between the existence check
    /// and `make_dir` counts as created. The backend has already reported
    /// the `AlreadyExists` from `make_dir` by then, so the sink shows one
    /// entry for a call that succeeded.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotADirectory`] if a segment is a plain file
    /// - [`FsError::Inconclusive`] if a segment's existence or type is unknown
    /// - whatever [`make_dir`](crate::FsDir::make_dir) returns
    fn recursively_make_dir(&self, path: &Path) -> Result<(), FsError> {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            if matches!(
                component,
                Component::Prefix(_) | Component::RootDir | Component::CurDir
            ) {
                continue;
            }
            match self.exists(&current) {
                Tristate::False => match self.make_dir(&current) {
                    Ok(()) => {}
                    // Lost a race with another creator.
                    Err(FsError::AlreadyExists { .. }) if self.is_dir(&current).is_true() => {}
                    Err(e) => return Err(e),
                },
                Tristate::True => match self.is_dir(&current) {
                    Tristate::True => {}
                    Tristate::False => {
                        return Err(report(self, FsError::NotADirectory { path: current }));
                    }
                    Tristate::Error => {
                        return Err(report(
                            self,
                            FsError::Inconclusive {
                                operation: "is_dir",
                                path: current,
                            },
                        ));
                    }
                },
                Tristate::Error => {
                    return Err(report(
                        self,
                        FsError::Inconclusive {
                            operation: "exists",
                            path: current,
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    /// Read a whole file, failing if it is larger than `limit`.
    ///
    /// [`SizeLimit::Unlimited`] should only be used for files the caller
    /// produced itself.
    fn read_file(&self, path: &Path, limit: SizeLimit) -> Result<Vec<u8>, FsError> {
        let file = self.open_input_file(path)?;
        self.read_input_file(file, limit)
    }

    /// Stream a whole file into `sink`, failing if it is larger than `limit`.
    ///
    /// On failure `sink` may have received part of the file.
    fn read_file_into(
        &self,
        path: &Path,
        limit: SizeLimit,
        sink: &mut dyn Write,
    ) -> Result<(), FsError> {
        let file = self.open_input_file(path)?;
        self.read_input_file_into(file, limit, sink)
    }

    /// Read the rest of an already open file and close it.
    ///
    /// The handle is closed on every path, including the size-exceeded one;
    /// a close failure fails the read.
    fn read_input_file(&self, file: InputFile, limit: SizeLimit) -> Result<Vec<u8>, FsError> {
        let mut buf = Vec::new();
        self.read_input_file_into(file, limit, &mut buf)?;
        Ok(buf)
    }

    /// Stream the rest of an already open file into `sink` and close it.
    fn read_input_file_into(
        &self,
        mut file: InputFile,
        limit: SizeLimit,
        sink: &mut dyn Write,
    ) -> Result<(), FsError> {
        let read = file.read_bounded_into(limit, sink).map(|_| ());
        let closed = self.close(file);
        read.and(closed)
    }

    /// Write `data` to `path`, replacing any previous content.
    ///
    /// Not atomic: if this fails the file may be partially written and
    /// nothing records how far the write got. Use
    /// [`write_file_atomic`](FileSystemExt::write_file_atomic) when readers
    /// must never see a partial file.
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let mut file = self.open_output_file(path)?;
        let written = file.write(data);
        let closed = self.close(file);
        written.and(closed)
    }

    /// Write `data` to a fresh temp file named after `prefix` and return the
    /// chosen name. On failure the temp file is removed.
    fn write_temp_file(&self, prefix: &Path, data: &[u8]) -> Result<PathBuf, FsError> {
        let mut file = self.open_temp_file(prefix)?;
        let name = file.filename().to_path_buf();
        let written = file.write(data);
        let closed = self.close(file);
        match written.and(closed) {
            Ok(()) => Ok(name),
            Err(e) => {
                let _ = self.remove_file(&name);
                Err(e)
            }
        }
    }

    /// Write `data` to `path` so that readers never observe a partial file.
    ///
    /// The payload goes to a temp file next to `path` (prefix `<path>.temp`),
    /// which is then renamed over `path`. Relies on the backend's rename
    /// being atomic within one directory.
    fn write_file_atomic(&self, path: &Path, data: &[u8]) -> Result<(), FsError> {
        let temp = self.write_temp_file(&temp_prefix_for(path), data)?;
        if let Err(e) = self.rename_file(&temp, path) {
            let _ = self.remove_file(&temp);
            return Err(e);
        }
        Ok(())
    }

    /// Statistics for the tree under `path`. See
    /// [`dir_info_with_progress`](FileSystemExt::dir_info_with_progress).
    fn dir_info(&self, path: &Path) -> DirInfo {
        self.dir_info_with_progress(path, &NullProgressNotifier)
    }

    /// Walk the tree under `path`, collecting every file, every empty
    /// directory below `path`, the total file size and the number of entries
    /// visited.
    ///
    /// `notifier` is called once per directory and once per entry, so a
    /// caller can tell a slow walk from a hung one.
    ///
    /// Directories that cannot be listed and entries whose type or size cannot
    /// be read are reported to the diagnostic sink and skipped. There is no
    /// cycle detection. Changes made during the walk may or may not show up.
    fn dir_info_with_progress(&self, path: &Path, notifier: &dyn ProgressNotifier) -> DirInfo {
        let mut info = DirInfo::default();
        let mut pending = vec![path.to_path_buf()];

        while let Some(dir) = pending.pop() {
            notifier.notify();
            let Ok(children) = self.list_contents(&dir) else {
                continue;
            };
            if children.is_empty() && dir != path {
                info.empty_dirs.push(dir);
                continue;
            }
            for child in children {
                notifier.notify();
                match self.is_dir(&child) {
                    Tristate::True => pending.push(child),
                    Tristate::False => {
                        if let (Ok(size), Ok(atime)) = (self.size(&child), self.atime(&child)) {
                            info.size_bytes += size;
                            info.files.push(FileInfo::new(size, atime, child));
                        }
                    }
                    Tristate::Error => continue,
                }
                info.inode_count += 1;
            }
        }
        tracing::debug!(
            root = %path.display(),
            files = info.files.len(),
            empty_dirs = info.empty_dirs.len(),
            size_bytes = info.size_bytes,
            "directory walk finished"
        );
        info
    }

    /// Best-effort lock acquisition.
    ///
    /// On backends with the [`FsStaleLock`](crate::FsStaleLock) extension a
    /// lock last refreshed at least `timeout` ago is broken and handed to the
    /// caller, so a second owner may exist. On other backends this is
    /// exactly [`try_lock`](crate::FsLock::try_lock).
    fn try_lock_with_timeout(&self, name: &Path, timeout: Duration, clock: &dyn Clock) -> Tristate {
        match self.stale_locks() {
            Some(stale) => stale.try_lock_breaking_stale(name, timeout, clock),
            None => self.try_lock(name),
        }
    }

    /// Keep a long-held lock from looking stale. A no-op success on backends
    /// that never break locks.
    fn bump_lock_timeout(&self, name: &Path) -> Result<(), FsError> {
        match self.stale_locks() {
            Some(stale) => stale.refresh_lock(name),
            None => Ok(()),
        }
    }
}

// Blanket implementation - every backend gets the composites for free
impl<B: FileSystem + ?Sized> FileSystemExt for B {}

fn report<B: FileSystem + ?Sized>(fs: &B, error: FsError) -> FsError {
    fs.diagnostics().report(&error);
    error
}

fn ensure_parent_dir<B: FileSystem + ?Sized>(fs: &B, path: &Path) -> Result<(), FsError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs.recursively_make_dir(parent),
        _ => Ok(()),
    }
}

fn temp_prefix_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".temp");
    PathBuf::from(name)
}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    /// JSON helpers for small metadata artifacts.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait FileSystemJsonExt: FileSystemExt {
        /// Read a file of at most `limit` bytes and deserialize it.
        ///
        /// # Errors
        ///
        /// - errors from [`read_file`](FileSystemExt::read_file)
        /// - [`FsError::Deserialization`] if the content is not valid JSON
        ///   for `T`
        fn read_json<T: DeserializeOwned>(
            &self,
            path: &Path,
            limit: SizeLimit,
        ) -> Result<T, FsError> {
            let data = self.read_file(path, limit)?;
            serde_json::from_slice(&data).map_err(|e| {
                report(
                    self,
                    FsError::Deserialization(format!("{}: {e}", path.display())),
                )
            })
        }

        /// Serialize `value` as pretty JSON and write it atomically.
        fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), FsError> {
            let json = serde_json::to_vec_pretty(value).map_err(|e| {
                report(
                    self,
                    FsError::Serialization(format!("{}: {e}", path.display())),
                )
            })?;
            self.write_file_atomic(path, &json)
        }
    }

    // Blanket implementation
    impl<B: FileSystemExt + ?Sized> FileSystemJsonExt for B {}
}

#[cfg(feature = "serde")]
pub use json::FileSystemJsonExt;
