//! # artifact-fs
//!
//! A portable filesystem contract for processes that share an on-disk cache
//! of rewritten web artifacts.
//!
//! Cooperating processes (and threads) read, write, clean and lock the same
//! directory tree. This crate gives them one interface with the same
//! semantics on every backend, plus the algorithms built on top of it:
//! bounded reads, atomic writes, `mkdir -p`, directory statistics and
//! advisory locks that can break a crashed owner's lock.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use artifact_fs::{FileSystemExt, FsLock, MemFileSystem, SizeLimit};
//! use std::path::Path;
//!
//! let fs = MemFileSystem::new();
//!
//! // Parents are created, readers never see a partial file.
//! fs.write_file_atomic(Path::new("/cache/ab/entry"), b"rewritten")?;
//!
//! // Refuse to buffer anything bigger than we expect.
//! let body = fs.read_file(Path::new("/cache/ab/entry"), SizeLimit::Bytes(1 << 20))?;
//! assert_eq!(body, b"rewritten");
//!
//! // Only one process cleans the cache at a time.
//! let lock = Path::new("/cache/clean.lock");
//! if fs.try_lock(lock).is_true() {
//!     let stats = fs.dir_info(Path::new("/cache"));
//!     assert_eq!(stats.size_bytes, 9);
//!     fs.unlock(lock)?;
//! }
//! # Ok::<(), artifact_fs::FsError>(())
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`FileSystem`] | Everything a backend implements |
//! | [`FileSystemExt`] | Composite operations, written once for every backend |
//! | [`Tristate`] | `True` / `False` / `Error` answer of checks and lock attempts |
//! | [`SizeLimit`] | Read cap; `-1` ([`UNLIMITED_SIZE`]) means no cap |
//! | [`InputFile`], [`OutputFile`] | Move-only handles, closed only through [`FileSystemExt::close`] |
//! | [`DirInfo`], [`FileInfo`] | Result of a recursive directory walk |
//! | [`FsError`] | Error type with path and operation context |
//!
//! ---
//!
//! ## Trait Structure
//!
//! ```text
//! FsFiles + FsDir + FsStat + FsLock + FsDiagnostics = FileSystem
//!                                                        ↓
//!                                   FileSystemExt (blanket impl, not overridable)
//!
//! FsLock::stale_locks() ──▶ Option<&dyn FsStaleLock>   (best-effort tier)
//! ```
//!
//! [`FileSystem`] and [`FileSystemExt`] have blanket implementations. A new
//! backend implements the five component traits and gets the rest.
//!
//! ---
//!
//! ## Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`DiskFileSystem`] | Production, over `std::fs` |
//! | [`MemFileSystem`] | Tests and in-process caches; clones share one tree |
//! | [`FaultyFileSystem`] | Wraps any backend and fails chosen primitives or handle operations, via [`FaultLayer`] |
//!
//! ---
//!
//! ## Error Reporting
//!
//! Every failure is handed to the backend's [`Diagnostics`] sink exactly
//! once, by whichever part of the crate detected it, and then returned. The
//! default sink, [`TracingDiagnostics`], emits a `tracing` warning.
//!
//! ```rust
//! use artifact_fs::{FileSystemExt, FsError, MemFileSystem, RecordingDiagnostics, SizeLimit};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let sink = Arc::new(RecordingDiagnostics::new());
//! let fs = MemFileSystem::new().with_diagnostics(sink.clone());
//!
//! let err = fs.read_file(Path::new("/missing"), SizeLimit::Unlimited).unwrap_err();
//! assert!(matches!(err, FsError::NotFound { .. }));
//! assert_eq!(sink.messages(), vec!["not found: /missing".to_string()]);
//! ```
//!
//! ---
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` and take `&self`. Backends use interior
//! mutability. Handles are `Send` but owned by one caller at a time.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for [`Tristate`], [`SizeLimit`], [`FileInfo`], [`DirInfo`], and `FileSystemJsonExt` |

// Private modules
mod backend;
mod clock;
mod diagnostics;
mod error;
mod ext;
mod handle;
mod layer;
mod progress;
mod traits;
mod types;

// Public re-exports - error types
pub use error::FsError;

// Public re-exports - core types
pub use types::{DirInfo, FileInfo, SizeLimit, Tristate, UNLIMITED_SIZE};

// Public re-exports - backend traits
pub use traits::{FileSystem, FsDiagnostics, FsDir, FsFiles, FsLock, FsStaleLock, FsStat};

// Public re-exports - handles
pub use handle::{
    HandleIssuer, InputFile, InputFileOps, OutputFile, OutputFileOps, OwnedFile,
};

// Public re-exports - collaborators
pub use clock::{Clock, ManualClock, SystemClock};
pub use diagnostics::{Diagnostics, NullDiagnostics, RecordingDiagnostics, TracingDiagnostics};
pub use progress::{NullProgressNotifier, ProgressNotifier};

// Public re-exports - backends
pub use backend::{
    DEFAULT_MAX_PATH_LENGTH, DiskFileSystem, Fault, FaultLayer, FaultyFileSystem, MemFileSystem,
};

// Public re-exports - infrastructure
pub use ext::FileSystemExt;
pub use layer::{Layer, LayerExt};

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::FileSystemJsonExt;
