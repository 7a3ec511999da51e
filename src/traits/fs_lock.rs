//! Named advisory locks for cross-process coordination.
//!
//! A lock is identified only by its name, which must be a path that does not
//! exist yet inside a directory that does. Its state lives in the backend
//! (a marker file on disk, a table entry in memory).
//!
//! # Two tiers
//!
//! - **Strict**: [`FsLock::try_lock`]. Never reports `True` to two owners at
//!   once. Use it when correctness depends on exclusivity.
//! - **Best-effort**: [`FsStaleLock::try_lock_breaking_stale`]. May take over
//!   a lock whose holder has not refreshed it within a timeout, so two owners
//!   can briefly both believe they hold it. Use it when liveness after a
//!   crashed owner matters more.
//!
//! Every call is a single non-blocking attempt; backoff belongs to the caller.
//!
//! # Example
//!
//! ```rust
//! use artifact_fs::{FileSystemExt, FsLock, MemFileSystem};
//! use std::path::Path;
//!
//! let fs = MemFileSystem::new();
//! fs.recursively_make_dir(Path::new("/locks")).unwrap();
//!
//! let name = Path::new("/locks/cache-clean");
//! assert!(fs.try_lock(name).is_true());
//! assert!(fs.try_lock(name).is_false());
//! fs.unlock(name).unwrap();
//! ```

use std::path::Path;
use std::time::Duration;

use crate::{Clock, FsError, Tristate};

/// Strict named locks.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FsLock`.
pub trait FsLock: Send + Sync {
    /// Attempt to take the lock `name`.
    ///
    /// - `True`: the caller owns the lock until it calls
    ///   [`unlock`](FsLock::unlock)
    /// - `False`: someone else holds it
    /// - `Error`: the attempt itself failed
    fn try_lock(&self, name: &Path) -> Tristate;

    /// Release a lock obtained from this backend.
    ///
    /// Behavior is undefined if the caller never held the lock. A failure
    /// does not mean the lock was released; the caller can retry or move on
    /// to a different lock name.
    fn unlock(&self, name: &Path) -> Result<(), FsError>;

    /// The stale-lock extension, if this backend implements it.
    ///
    /// Backends without it get the default: timeout acquisition behaves
    /// exactly like [`try_lock`](FsLock::try_lock) and refreshing is a no-op.
    fn stale_locks(&self) -> Option<&dyn FsStaleLock> {
        None
    }
}

/// Stale-lock breaking, the optional best-effort tier.
///
/// Both methods are required: a backend that can break stale locks must also
/// let owners refresh them, and one that can refresh has no reason to exist
/// without breaking. Expose it through [`FsLock::stale_locks`].
pub trait FsStaleLock: Send + Sync {
    /// Like [`FsLock::try_lock`], but a lock whose last refresh is at least
    /// `timeout` old according to `clock` is taken over and `True` returned.
    fn try_lock_breaking_stale(&self, name: &Path, timeout: Duration, clock: &dyn Clock)
    -> Tristate;

    /// Reset the staleness clock of a held lock.
    fn refresh_lock(&self, name: &Path) -> Result<(), FsError>;
}

/// Elapsed milliseconds since `since_ms` is at least `timeout`.
pub(crate) fn is_stale(now_ms: i64, since_ms: i64, timeout: Duration) -> bool {
    let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(since_ms) >= timeout_ms
}
