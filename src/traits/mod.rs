//! # Backend Traits
//!
//! The primitive interface every backend implements.
//!
//! ## Components
//!
//! | Trait | Provides |
//! |-------|----------|
//! | [`FsFiles`] | open for read, create for write/append, temp files, move, remove |
//! | [`FsDir`] | `make_dir`, `remove_dir`, `list_contents` |
//! | [`FsStat`] | `exists`, `is_dir` (tri-state), `atime`, `mtime`, `size` |
//! | [`FsLock`] | strict named locks, optional [`FsStaleLock`] extension |
//! | [`FsDiagnostics`] | the sink failures are reported to |
//!
//! [`FileSystem`] combines all of them and has a blanket implementation.
//! Backend authors implement the components; everything built on top of them
//! (atomic writes, `mkdir -p`, directory statistics, bounded reads) lives in
//! [`FileSystemExt`](crate::FileSystemExt) and is written once.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`. Methods take `&self`; backends use
//! interior mutability.
//!
//! ## Object Safety
//!
//! All traits are object-safe:
//!
//! ```rust
//! use artifact_fs::{FileSystem, FileSystemExt, SizeLimit};
//! use std::path::Path;
//!
//! fn load(fs: &dyn FileSystem) -> Option<Vec<u8>> {
//!     fs.read_file(Path::new("/cache/entry"), SizeLimit::Bytes(1 << 20)).ok()
//! }
//! ```

mod fs_diagnostics;
mod fs_dir;
mod fs_files;
mod fs_lock;
mod fs_stat;

pub use fs_diagnostics::FsDiagnostics;
pub use fs_dir::FsDir;
pub use fs_files::FsFiles;
pub use fs_lock::{FsLock, FsStaleLock};
pub(crate) use fs_lock::is_stale;
pub use fs_stat::FsStat;

/// A complete backend.
///
/// # Blanket Implementation
///
/// Automatically implemented for any type implementing [`FsFiles`],
/// [`FsDir`], [`FsStat`], [`FsLock`] and [`FsDiagnostics`]. Never implement
/// it directly.
///
/// # Example
///
/// ```rust
/// use artifact_fs::{FileSystem, FileSystemExt, FsError};
/// use std::path::Path;
///
/// // Generic function that works with any backend
/// fn publish<B: FileSystem>(fs: &B, name: &Path, body: &[u8]) -> Result<(), FsError> {
///     fs.write_file_atomic(name, body)
/// }
/// ```
pub trait FileSystem: FsFiles + FsDir + FsStat + FsLock + FsDiagnostics {}

// Blanket implementation
impl<T: FsFiles + FsDir + FsStat + FsLock + FsDiagnostics> FileSystem for T {}
