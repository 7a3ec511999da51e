//! In-memory backend.
//!
//! Files, directories and locks live in one table behind a mutex that is
//! shared with every handle the backend issues, so writes through an open
//! [`OutputFile`] are visible to readers immediately. Cloning a
//! [`MemFileSystem`] yields another view of the same tree, which is how tests
//! simulate cooperating processes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ffi::OsString;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::traits::is_stale;
use crate::{
    Clock, Diagnostics, FsDiagnostics, FsDir, FsError, FsFiles, FsLock, FsStaleLock, FsStat,
    HandleIssuer, InputFile, InputFileOps, OutputFile, OutputFileOps, SystemClock,
    TracingDiagnostics, Tristate,
};

#[derive(Debug, Clone)]
struct MemFile {
    data: Vec<u8>,
    atime_ms: i64,
    mtime_ms: i64,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<PathBuf, MemFile>,
    /// Directory path -> creation time.
    dirs: BTreeMap<PathBuf, i64>,
    /// Lock name -> last acquisition or refresh.
    locks: HashMap<PathBuf, i64>,
    next_temp: u64,
}

impl State {
    fn with_root(now_ms: i64) -> Self {
        let mut state = State::default();
        state.dirs.insert(PathBuf::from("/"), now_ms);
        state
    }

    /// Relative paths with no parent component hang off an implicit root.
    fn parent_is_dir(&self, path: &Path) -> bool {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.dirs.contains_key(parent),
            _ => true,
        }
    }

    fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.dirs.contains_key(path)
    }

    fn children(&self, dir: &Path) -> BTreeSet<PathBuf> {
        let is_child = |p: &&PathBuf| p.parent() == Some(dir) && p.as_path() != dir;
        self.files
            .keys()
            .chain(self.dirs.keys())
            .filter(is_child)
            .cloned()
            .collect()
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // Every mutation is a single map operation, so a poisoned table is still
    // consistent.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-memory [`FileSystem`](crate::FileSystem).
///
/// # Configuration
///
/// ```rust
/// use artifact_fs::{FileSystemExt, ManualClock, MemFileSystem, NullDiagnostics, SizeLimit};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// let clock = Arc::new(ManualClock::new(0));
/// let fs = MemFileSystem::new()
///     .with_clock(clock.clone())
///     .with_diagnostics(Arc::new(NullDiagnostics))
///     .with_atime_updates(false);
///
/// fs.write_file(Path::new("/hello"), b"world").unwrap();
/// assert_eq!(fs.read_file(Path::new("/hello"), SizeLimit::Unlimited).unwrap(), b"world");
/// ```
///
/// # Sizes
///
/// [`size`](FsStat::size) is the logical length of the content. Directories
/// have size `0`.
#[derive(Clone)]
pub struct MemFileSystem {
    state: Arc<Mutex<State>>,
    issuer: HandleIssuer,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn Diagnostics>,
    update_atime: bool,
}

impl MemFileSystem {
    /// An empty tree holding only `/`, stamped by the system clock and
    /// reporting through [`TracingDiagnostics`].
    pub fn new() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            state: Arc::new(Mutex::new(State::with_root(clock.now_ms()))),
            issuer: HandleIssuer::new(),
            clock,
            diagnostics: Arc::new(TracingDiagnostics),
            update_atime: true,
        }
    }

    /// Use `clock` for timestamps and lock refreshes.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report failures to `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Whether opening a file for reading updates its access time. On by
    /// default.
    pub fn with_atime_updates(mut self, enabled: bool) -> Self {
        self.update_atime = enabled;
        self
    }

    /// Number of locks currently held.
    pub fn held_lock_count(&self) -> usize {
        self.state().locks.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    fn fail(&self, error: FsError) -> FsError {
        self.diagnostics.report(&error);
        error
    }

    fn fail_tristate(&self, error: FsError) -> Tristate {
        self.diagnostics.report(&error);
        Tristate::Error
    }

    fn check_parent(&self, state: &State, path: &Path) -> Result<(), FsError> {
        if state.parent_is_dir(path) {
            return Ok(());
        }
        let parent = path.parent().unwrap_or(path).to_path_buf();
        Err(if state.files.contains_key(&parent) {
            FsError::NotADirectory { path: parent }
        } else {
            FsError::NotFound { path: parent }
        })
    }

    fn open_output(&self, path: &Path, append: bool) -> Result<OutputFile, FsError> {
        let now = self.clock.now_ms();
        let mut state = self.state();
        self.check_parent(&state, path)?;
        if state.dirs.contains_key(path) {
            return Err(FsError::NotAFile {
                path: path.to_path_buf(),
            });
        }
        let entry = state
            .files
            .entry(path.to_path_buf())
            .or_insert_with(|| MemFile {
                data: Vec::new(),
                atime_ms: now,
                mtime_ms: now,
            });
        if !append {
            entry.data.clear();
        }
        entry.mtime_ms = now;
        drop(state);

        let ops = MemOutput {
            path: path.to_path_buf(),
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        };
        Ok(OutputFile::new(
            path,
            Box::new(ops),
            self.issuer.clone(),
            Arc::clone(&self.diagnostics),
        ))
    }

    fn rename_entry(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        let mut state = self.state();
        if state.dirs.contains_key(from) {
            return Err(FsError::NotAFile {
                path: from.to_path_buf(),
            });
        }
        self.check_parent(&state, to)?;
        if state.dirs.contains_key(to) {
            return Err(FsError::NotAFile {
                path: to.to_path_buf(),
            });
        }
        let file = state.files.remove(from).ok_or_else(|| FsError::NotFound {
            path: from.to_path_buf(),
        })?;
        state.files.insert(to.to_path_buf(), file);
        Ok(())
    }

    fn stat<T>(&self, path: &Path, f: impl FnOnce(&MemFile) -> T, dir: T) -> Result<T, FsError> {
        let state = self.state();
        if let Some(file) = state.files.get(path) {
            return Ok(f(file));
        }
        if state.dirs.contains_key(path) {
            return Ok(dir);
        }
        Err(FsError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

impl Default for MemFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemFileSystem")
            .field("files", &state.files.len())
            .field("dirs", &state.dirs.len())
            .field("locks", &state.locks.len())
            .field("update_atime", &self.update_atime)
            .finish()
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Snapshot of the content at open time.
struct MemInput {
    data: Cursor<Vec<u8>>,
}

impl InputFileOps for MemInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        // Reading from a cursor cannot fail.
        Ok(self.data.read(buf).unwrap_or(0))
    }

    fn close(self: Box<Self>) -> Result<(), FsError> {
        Ok(())
    }
}

/// Writes straight into the shared table.
struct MemOutput {
    path: PathBuf,
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl OutputFileOps for MemOutput {
    fn write(&mut self, data: &[u8]) -> Result<(), FsError> {
        let now = self.clock.now_ms();
        let mut state = lock_state(&self.state);
        match state.files.get_mut(&self.path) {
            Some(file) => {
                file.data.extend_from_slice(data);
                file.mtime_ms = now;
                Ok(())
            }
            None => Err(FsError::NotFound {
                path: self.path.clone(),
            }),
        }
    }

    fn flush(&mut self) -> Result<(), FsError> {
        Ok(())
    }

    fn set_world_readable(&mut self) -> Result<(), FsError> {
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), FsError> {
        Ok(())
    }
}

// =============================================================================
// Primitives
// =============================================================================

impl FsFiles for MemFileSystem {
    fn open_input_file(&self, path: &Path) -> Result<InputFile, FsError> {
        let now = self.clock.now_ms();
        let update_atime = self.update_atime;
        let data = {
            let mut state = self.state();
            if state.dirs.contains_key(path) {
                Err(FsError::NotAFile {
                    path: path.to_path_buf(),
                })
            } else if let Some(file) = state.files.get_mut(path) {
                if update_atime {
                    file.atime_ms = now;
                }
                Ok(file.data.clone())
            } else {
                Err(FsError::NotFound {
                    path: path.to_path_buf(),
                })
            }
        };
        let data = data.map_err(|e| self.fail(e))?;
        Ok(InputFile::new(
            path,
            Box::new(MemInput {
                data: Cursor::new(data),
            }),
            self.issuer.clone(),
            Arc::clone(&self.diagnostics),
        ))
    }

    fn create_output_file(&self, path: &Path, append: bool) -> Result<OutputFile, FsError> {
        self.open_output(path, append).map_err(|e| self.fail(e))
    }

    fn create_temp_file(&self, prefix: &Path) -> Result<OutputFile, FsError> {
        let name = {
            let mut state = self.state();
            loop {
                let mut candidate = OsString::from(prefix.as_os_str());
                candidate.push(format!("{:06}", state.next_temp));
                state.next_temp += 1;
                let candidate = PathBuf::from(candidate);
                if !state.contains(&candidate) {
                    break candidate;
                }
            }
        };
        self.open_output(&name, false).map_err(|e| self.fail(e))
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.rename_entry(from, to).map_err(|e| self.fail(e))
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        let mut state = self.state();
        let result = if state.files.remove(path).is_some() {
            Ok(())
        } else if state.dirs.contains_key(path) {
            Err(FsError::NotAFile {
                path: path.to_path_buf(),
            })
        } else {
            Err(FsError::NotFound {
                path: path.to_path_buf(),
            })
        };
        drop(state);
        result.map_err(|e| self.fail(e))
    }

    fn issuer(&self) -> &HandleIssuer {
        &self.issuer
    }
}

impl FsDir for MemFileSystem {
    fn make_dir(&self, path: &Path) -> Result<(), FsError> {
        let now = self.clock.now_ms();
        let mut state = self.state();
        let result = if state.contains(path) {
            Err(FsError::AlreadyExists {
                path: path.to_path_buf(),
                operation: "make_dir",
            })
        } else {
            self.check_parent(&state, path)
        };
        if result.is_ok() {
            state.dirs.insert(path.to_path_buf(), now);
        }
        drop(state);
        result.map_err(|e| self.fail(e))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        let mut state = self.state();
        let result = if state.files.contains_key(path) {
            Err(FsError::NotADirectory {
                path: path.to_path_buf(),
            })
        } else if !state.dirs.contains_key(path) {
            Err(FsError::NotFound {
                path: path.to_path_buf(),
            })
        } else if !state.children(path).is_empty() {
            Err(FsError::DirectoryNotEmpty {
                path: path.to_path_buf(),
            })
        } else {
            state.dirs.remove(path);
            Ok(())
        };
        drop(state);
        result.map_err(|e| self.fail(e))
    }

    fn list_contents(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        let state = self.state();
        let result = if state.dirs.contains_key(dir) {
            Ok(state.children(dir).into_iter().collect())
        } else if state.files.contains_key(dir) {
            Err(FsError::NotADirectory {
                path: dir.to_path_buf(),
            })
        } else {
            Err(FsError::NotFound {
                path: dir.to_path_buf(),
            })
        };
        drop(state);
        result.map_err(|e| self.fail(e))
    }
}

impl FsStat for MemFileSystem {
    fn exists(&self, path: &Path) -> Tristate {
        Tristate::from_bool(self.state().contains(path))
    }

    fn is_dir(&self, path: &Path) -> Tristate {
        Tristate::from_bool(self.state().dirs.contains_key(path))
    }

    fn atime(&self, path: &Path) -> Result<i64, FsError> {
        let dir_time = self.state().dirs.get(path).copied().unwrap_or_default();
        self.stat(path, |f| f.atime_ms, dir_time)
            .map(|ms| ms.div_euclid(1000))
            .map_err(|e| self.fail(e))
    }

    fn mtime(&self, path: &Path) -> Result<i64, FsError> {
        let dir_time = self.state().dirs.get(path).copied().unwrap_or_default();
        self.stat(path, |f| f.mtime_ms, dir_time)
            .map(|ms| ms.div_euclid(1000))
            .map_err(|e| self.fail(e))
    }

    fn size(&self, path: &Path) -> Result<u64, FsError> {
        self.stat(path, |f| f.data.len() as u64, 0)
            .map_err(|e| self.fail(e))
    }
}

impl FsLock for MemFileSystem {
    fn try_lock(&self, name: &Path) -> Tristate {
        let now = self.clock.now_ms();
        let mut state = self.state();
        if let Err(e) = self.check_parent(&state, name) {
            drop(state);
            return self.fail_tristate(e);
        }
        if state.locks.contains_key(name) {
            return Tristate::False;
        }
        state.locks.insert(name.to_path_buf(), now);
        tracing::debug!(lock = %name.display(), "lock acquired");
        Tristate::True
    }

    fn unlock(&self, name: &Path) -> Result<(), FsError> {
        let removed = self.state().locks.remove(name);
        match removed {
            Some(_) => {
                tracing::debug!(lock = %name.display(), "lock released");
                Ok(())
            }
            None => Err(self.fail(FsError::LockNotHeld {
                name: name.to_path_buf(),
            })),
        }
    }

    fn stale_locks(&self) -> Option<&dyn FsStaleLock> {
        Some(self)
    }
}

impl FsStaleLock for MemFileSystem {
    fn try_lock_breaking_stale(
        &self,
        name: &Path,
        timeout: Duration,
        clock: &dyn Clock,
    ) -> Tristate {
        let now = clock.now_ms();
        let mut state = self.state();
        if let Err(e) = self.check_parent(&state, name) {
            drop(state);
            return self.fail_tristate(e);
        }
        match state.locks.get(name).copied() {
            Some(since) if !is_stale(now, since, timeout) => Tristate::False,
            previous => {
                state.locks.insert(name.to_path_buf(), now);
                drop(state);
                match previous {
                    Some(since) => tracing::info!(
                        lock = %name.display(),
                        idle_ms = now.saturating_sub(since),
                        "broke stale lock"
                    ),
                    None => tracing::debug!(lock = %name.display(), "lock acquired"),
                }
                Tristate::True
            }
        }
    }

    fn refresh_lock(&self, name: &Path) -> Result<(), FsError> {
        let now = self.clock.now_ms();
        let mut state = self.state();
        match state.locks.get_mut(name) {
            Some(since) => {
                *since = now;
                Ok(())
            }
            None => {
                drop(state);
                Err(self.fail(FsError::LockNotHeld {
                    name: name.to_path_buf(),
                }))
            }
        }
    }
}

impl FsDiagnostics for MemFileSystem {
    fn diagnostics(&self) -> &dyn Diagnostics {
        &*self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileSystemExt, ManualClock, RecordingDiagnostics, SizeLimit};

    fn setup() -> (MemFileSystem, Arc<ManualClock>, Arc<RecordingDiagnostics>) {
        let clock = Arc::new(ManualClock::new(5_000));
        let diag = Arc::new(RecordingDiagnostics::new());
        let fs = MemFileSystem::new()
            .with_clock(clock.clone())
            .with_diagnostics(diag.clone());
        (fs, clock, diag)
    }

    #[test]
    fn root_exists() {
        let (fs, _, _) = setup();
        assert!(fs.exists(Path::new("/")).is_true());
        assert!(fs.is_dir(Path::new("/")).is_true());
    }

    #[test]
    fn make_dir_needs_parent() {
        let (fs, _, diag) = setup();
        let err = fs.make_dir(Path::new("/a/b")).unwrap_err();
        assert!(matches!(err, FsError::NotFound { path } if path == Path::new("/a")));
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn make_dir_rejects_existing() {
        let (fs, _, _) = setup();
        fs.make_dir(Path::new("/a")).unwrap();
        let err = fs.make_dir(Path::new("/a")).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists { .. }));
    }

    #[test]
    fn remove_dir_requires_empty() {
        let (fs, _, _) = setup();
        fs.write_file(Path::new("/d/f"), b"x").unwrap();
        let err = fs.remove_dir(Path::new("/d")).unwrap_err();
        assert!(matches!(err, FsError::DirectoryNotEmpty { .. }));
        fs.remove_file(Path::new("/d/f")).unwrap();
        fs.remove_dir(Path::new("/d")).unwrap();
        assert!(fs.exists(Path::new("/d")).is_false());
    }

    #[test]
    fn list_contents_is_direct_children_only() {
        let (fs, _, _) = setup();
        fs.write_file(Path::new("/d/b"), b"").unwrap();
        fs.write_file(Path::new("/d/a/deep"), b"").unwrap();
        assert_eq!(
            fs.list_contents(Path::new("/d")).unwrap(),
            vec![PathBuf::from("/d/a"), PathBuf::from("/d/b")]
        );
    }

    #[test]
    fn create_output_file_assumes_parent() {
        let (fs, _, _) = setup();
        let err = fs
            .create_output_file(Path::new("/nope/f"), false)
            .unwrap_err();
        assert!(matches!(err, FsError::NotFound { .. }));
    }

    #[test]
    fn open_input_on_directory_fails() {
        let (fs, _, _) = setup();
        fs.make_dir(Path::new("/d")).unwrap();
        let err = fs.open_input_file(Path::new("/d")).unwrap_err();
        assert!(matches!(err, FsError::NotAFile { .. }));
    }

    #[test]
    fn move_replaces_destination() {
        let (fs, _, _) = setup();
        fs.write_file(Path::new("/a"), b"new").unwrap();
        fs.write_file(Path::new("/b"), b"old").unwrap();
        fs.move_file(Path::new("/a"), Path::new("/b")).unwrap();
        assert!(fs.exists(Path::new("/a")).is_false());
        assert_eq!(
            fs.read_file(Path::new("/b"), SizeLimit::Unlimited).unwrap(),
            b"new"
        );
    }

    #[test]
    fn times_come_from_the_clock() {
        let (fs, clock, _) = setup();
        fs.write_file(Path::new("/f"), b"x").unwrap();
        assert_eq!(fs.mtime(Path::new("/f")).unwrap(), 5);
        assert_eq!(fs.atime(Path::new("/f")).unwrap(), 5);

        clock.advance_ms(3_000);
        fs.read_file(Path::new("/f"), SizeLimit::Unlimited).unwrap();
        assert_eq!(fs.atime(Path::new("/f")).unwrap(), 8);
        assert_eq!(fs.mtime(Path::new("/f")).unwrap(), 5);
    }

    #[test]
    fn atime_updates_can_be_disabled() {
        let (fs, clock, _) = setup();
        let fs = fs.with_atime_updates(false);
        fs.write_file(Path::new("/f"), b"x").unwrap();
        clock.advance_ms(3_000);
        fs.read_file(Path::new("/f"), SizeLimit::Unlimited).unwrap();
        assert_eq!(fs.atime(Path::new("/f")).unwrap(), 5);
    }

    #[test]
    fn size_is_logical_length() {
        let (fs, _, _) = setup();
        fs.write_file(Path::new("/f"), &[7u8; 3]).unwrap();
        assert_eq!(fs.size(Path::new("/f")).unwrap(), 3);
        fs.make_dir(Path::new("/d")).unwrap();
        assert_eq!(fs.size(Path::new("/d")).unwrap(), 0);
    }

    #[test]
    fn output_handle_writes_through() {
        let (fs, _, _) = setup();
        let mut f = fs.open_output_file(Path::new("/f")).unwrap();
        f.write(b"partial").unwrap();
        assert_eq!(fs.size(Path::new("/f")).unwrap(), 7);
        fs.close(f).unwrap();
    }

    #[test]
    fn clones_share_the_tree() {
        let (fs, _, _) = setup();
        let other = fs.clone();
        fs.write_file(Path::new("/shared"), b"x").unwrap();
        assert!(other.exists(Path::new("/shared")).is_true());
    }

    #[test]
    fn lock_needs_existing_parent() {
        let (fs, _, diag) = setup();
        assert!(fs.try_lock(Path::new("/missing/l")).is_error());
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn stale_lock_lifecycle() {
        let (fs, clock, _) = setup();
        let name = Path::new("/l");
        let timeout = Duration::from_millis(1_000);

        assert!(fs.try_lock_with_timeout(name, timeout, &*clock).is_true());
        clock.advance_ms(999);
        assert!(fs.try_lock_with_timeout(name, timeout, &*clock).is_false());

        fs.bump_lock_timeout(name).unwrap();
        clock.advance_ms(999);
        assert!(fs.try_lock_with_timeout(name, timeout, &*clock).is_false());

        clock.advance_ms(1);
        assert!(fs.try_lock_with_timeout(name, timeout, &*clock).is_true());
        assert_eq!(fs.held_lock_count(), 1);
        fs.unlock(name).unwrap();
        assert_eq!(fs.held_lock_count(), 0);
    }

    #[test]
    fn strict_lock_ignores_age() {
        let (fs, clock, _) = setup();
        let name = Path::new("/l");
        assert!(fs.try_lock(name).is_true());
        clock.advance_ms(i64::from(u32::MAX));
        assert!(fs.try_lock(name).is_false());
    }

    #[test]
    fn refresh_of_unheld_lock_fails() {
        let (fs, _, diag) = setup();
        let err = fs.bump_lock_timeout(Path::new("/l")).unwrap_err();
        assert!(matches!(err, FsError::LockNotHeld { .. }));
        assert_eq!(diag.len(), 1);
    }
}
