//! Error types for the artifact filesystem contract.

use std::io;
use std::path::{Path, PathBuf};

/// Filesystem error type with contextual variants.
///
/// Every variant carries the path (and usually the operation) that failed, so
/// the [`Display`](std::fmt::Display) output is a complete human-readable
/// description suitable for a diagnostic sink.
///
/// # Examples
///
/// ```rust
/// use artifact_fs::FsError;
/// use std::path::PathBuf;
///
/// let err = FsError::NotFound { path: PathBuf::from("/cache/missing") };
/// assert_eq!(err.to_string(), "not found: /cache/missing");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    // Path/File Errors
    /// Path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Path already exists when it shouldn't.
    #[error("{operation}: already exists: {path}")]
    AlreadyExists {
        /// The path that already exists.
        path: PathBuf,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Expected a file but found something else.
    #[error("not a file: {path}")]
    NotAFile {
        /// The path that is not a file.
        path: PathBuf,
    },

    /// Expected a directory but found something else.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The path that is not a directory.
        path: PathBuf,
    },

    /// Directory is not empty when it should be.
    #[error("directory not empty: {path}")]
    DirectoryNotEmpty {
        /// The path to the non-empty directory.
        path: PathBuf,
    },

    /// A tri-state check came back as `Error`, so the operation could not
    /// decide how to proceed.
    #[error("{operation}: check inconclusive: {path}")]
    Inconclusive {
        /// The check that failed.
        operation: &'static str,
        /// The path that was checked.
        path: PathBuf,
    },

    // Permission/Access Errors
    /// Permission denied for operation.
    #[error("{operation}: permission denied: {path}")]
    PermissionDenied {
        /// The path where permission was denied.
        path: PathBuf,
        /// The operation that was denied.
        operation: &'static str,
    },

    // Size Errors
    /// A bounded read saw more bytes than its limit allows.
    #[error("file size exceeded: {path} (read {size} > limit {limit})")]
    FileSizeExceeded {
        /// The path to the file.
        path: PathBuf,
        /// Bytes seen so far when the limit was crossed.
        size: u64,
        /// The size limit.
        limit: u64,
    },

    /// A raw size limit was negative but not the unlimited sentinel.
    #[error("invalid size limit: {0} (use -1 for unlimited)")]
    InvalidSizeLimit(i64),

    // Handle / Lock Errors
    /// An owned file handle was dropped without going through `close`.
    #[error("file handle dropped without close: {path}")]
    HandleLeaked {
        /// Name of the leaked handle.
        path: PathBuf,
    },

    /// A handle was passed to `close` on a filesystem that did not open it.
    #[error("handle not issued by this filesystem: {path}")]
    ForeignHandle {
        /// Name of the refused handle.
        path: PathBuf,
    },

    /// Release of a lock that this backend does not consider held.
    #[error("lock not held: {name}")]
    LockNotHeld {
        /// The lock name.
        name: PathBuf,
    },

    // Backend/Operation Errors
    /// Failure produced on purpose by the fault-injection layer.
    #[error("{operation}: injected fault: {path}")]
    Injected {
        /// The operation that was made to fail.
        operation: &'static str,
        /// The path involved.
        path: PathBuf,
    },

    /// Operation is not supported.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// Generic backend error.
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// I/O error with context.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Convert an [`io::Error`] into the most specific variant, keeping the
    /// operation and path that produced it.
    pub fn from_io(operation: &'static str, path: &Path, error: io::Error) -> Self {
        let path = path.to_path_buf();
        match error.kind() {
            io::ErrorKind::NotFound => FsError::NotFound { path },
            io::ErrorKind::PermissionDenied => FsError::PermissionDenied { path, operation },
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists { path, operation },
            io::ErrorKind::NotADirectory => FsError::NotADirectory { path },
            io::ErrorKind::IsADirectory => FsError::NotAFile { path },
            io::ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty { path },
            _ => FsError::Io {
                operation,
                path,
                source: error,
            },
        }
    }
}

impl From<io::Error> for FsError {
    fn from(error: io::Error) -> Self {
        FsError::from_io("io", Path::new(""), error)
    }
}
