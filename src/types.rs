//! Core value types for the artifact filesystem contract.

use std::path::PathBuf;

use crate::FsError;

/// Raw value meaning "no size cap".
///
/// This value is documented as `-1` in user-facing configuration, so it must
/// never change.
pub const UNLIMITED_SIZE: i64 = -1;

/// Three-way answer for predicates that can themselves fail.
///
/// There is deliberately no conversion to `bool`: a caller has to say whether
/// it is looking for [`True`](Tristate::True), [`False`](Tristate::False) or
/// [`Error`](Tristate::Error), so an inconclusive check can never be mistaken
/// for "no". The default value is `Error`.
///
/// # Examples
///
/// ```rust
/// use artifact_fs::Tristate;
///
/// let mut answer = Tristate::default();
/// assert!(answer.is_error());
///
/// answer.set(true);
/// assert!(answer.is_true());
/// assert!(!answer.is_false());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tristate {
    /// The predicate holds.
    True,
    /// The predicate definitely does not hold.
    False,
    /// The check itself failed; the answer is unknown.
    #[default]
    Error,
}

impl Tristate {
    /// Build a definite answer.
    #[inline]
    pub const fn from_bool(value: bool) -> Self {
        if value { Tristate::True } else { Tristate::False }
    }

    /// Returns `true` only for [`Tristate::True`].
    #[inline]
    pub const fn is_true(&self) -> bool {
        matches!(self, Tristate::True)
    }

    /// Returns `true` only for [`Tristate::False`].
    #[inline]
    pub const fn is_false(&self) -> bool {
        matches!(self, Tristate::False)
    }

    /// Returns `true` only for [`Tristate::Error`].
    #[inline]
    pub const fn is_error(&self) -> bool {
        matches!(self, Tristate::Error)
    }

    /// Replace the value with a definite answer.
    #[inline]
    pub fn set(&mut self, value: bool) {
        *self = Tristate::from_bool(value);
    }

    /// Replace the value with [`Tristate::Error`].
    #[inline]
    pub fn set_error(&mut self) {
        *self = Tristate::Error;
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        Tristate::from_bool(value)
    }
}

/// Maximum number of bytes a bounded read may return.
///
/// The raw form is an `i64` where [`UNLIMITED_SIZE`] (`-1`) means no cap.
/// `Unlimited` is kept as its own variant so the sentinel is never mistaken
/// for a byte count; it should only be used when the caller produced the
/// file itself and knows it is small.
///
/// ```rust
/// use artifact_fs::{SizeLimit, UNLIMITED_SIZE};
///
/// assert_eq!(SizeLimit::try_from(UNLIMITED_SIZE).unwrap(), SizeLimit::Unlimited);
/// assert_eq!(SizeLimit::try_from(4096_i64).unwrap(), SizeLimit::Bytes(4096));
/// assert!(SizeLimit::try_from(-2_i64).is_err());
/// assert_eq!(SizeLimit::Unlimited.as_raw(), -1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "i64", into = "i64")
)]
pub enum SizeLimit {
    /// No cap at all.
    Unlimited,
    /// At most this many bytes.
    Bytes(u64),
}

impl SizeLimit {
    /// Returns `true` if `size` bytes fit within this limit.
    #[inline]
    pub const fn allows(&self, size: u64) -> bool {
        match self {
            SizeLimit::Unlimited => true,
            SizeLimit::Bytes(limit) => size <= *limit,
        }
    }

    /// The raw `i64` form, `-1` for [`SizeLimit::Unlimited`].
    ///
    /// Limits above `i64::MAX` saturate.
    pub fn as_raw(&self) -> i64 {
        match self {
            SizeLimit::Unlimited => UNLIMITED_SIZE,
            SizeLimit::Bytes(limit) => i64::try_from(*limit).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<i64> for SizeLimit {
    type Error = FsError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            UNLIMITED_SIZE => Ok(SizeLimit::Unlimited),
            n if n < 0 => Err(FsError::InvalidSizeLimit(n)),
            n => Ok(SizeLimit::Bytes(n.unsigned_abs())),
        }
    }
}

impl From<SizeLimit> for i64 {
    fn from(limit: SizeLimit) -> Self {
        limit.as_raw()
    }
}

/// Snapshot of a single file seen during a directory walk.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileInfo {
    /// Size in bytes, as reported by the backend's `size`.
    pub size_bytes: u64,
    /// Last access time in seconds since the Unix epoch.
    pub atime_sec: i64,
    /// Full path of the file.
    pub name: PathBuf,
}

impl FileInfo {
    /// Create a new snapshot.
    pub fn new(size_bytes: u64, atime_sec: i64, name: impl Into<PathBuf>) -> Self {
        Self {
            size_bytes,
            atime_sec,
            name: name.into(),
        }
    }
}

/// Aggregate statistics for a directory tree, used for cache accounting.
///
/// Produced by [`FileSystemExt::dir_info`](crate::FileSystemExt::dir_info).
/// The walk is not a point-in-time snapshot: entries changed while it runs
/// may or may not be reflected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirInfo {
    /// Every regular file found, in walk order.
    pub files: Vec<FileInfo>,
    /// Directories below the root that have no entries at all.
    pub empty_dirs: Vec<PathBuf>,
    /// Sum of `files[..].size_bytes`.
    pub size_bytes: u64,
    /// Number of entries (files and directories) visited below the root.
    pub inode_count: u64,
}
