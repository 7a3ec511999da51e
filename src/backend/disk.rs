//! Backend over the host filesystem.
//!
//! Every primitive maps onto one `std::fs` call. `io::Error`s are converted
//! with [`FsError::from_io`] and reported before they are returned.
//!
//! # Locks
//!
//! A lock is a marker file created with `O_CREAT | O_EXCL`, so two processes
//! sharing a directory can never both create it. The marker's modification
//! time is the lock's last refresh; a lock is stale once that time is at
//! least the timeout older than the caller's clock.
//!
//! # Sizes
//!
//! On Unix, [`size`](FsStat::size) is the space allocated on disk
//! (`st_blocks * 512`), not the logical length. Elsewhere it is the logical
//! length.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{ms_to_system_time, system_time_to_ms};
use crate::traits::is_stale;
use crate::{
    Clock, Diagnostics, FsDiagnostics, FsDir, FsError, FsFiles, FsLock, FsStaleLock, FsStat,
    HandleIssuer, InputFile, InputFileOps, OutputFile, OutputFileOps, SystemClock,
    TracingDiagnostics, Tristate,
};

/// Longest path the backend reports as usable unless configured otherwise.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 8192;

/// A [`FileSystem`](crate::FileSystem) over real directories.
///
/// Paths are used as given; relative paths resolve against the process's
/// working directory.
///
/// ```rust,no_run
/// use artifact_fs::{DiskFileSystem, FileSystemExt, SizeLimit};
/// use std::path::Path;
///
/// let fs = DiskFileSystem::new();
/// fs.write_file_atomic(Path::new("/var/cache/app/entry"), b"body")?;
/// let body = fs.read_file(Path::new("/var/cache/app/entry"), SizeLimit::Bytes(1 << 20))?;
/// # Ok::<(), artifact_fs::FsError>(())
/// ```
#[derive(Clone)]
pub struct DiskFileSystem {
    issuer: HandleIssuer,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn Diagnostics>,
    max_path_length: usize,
}

impl DiskFileSystem {
    /// A backend using the system clock and [`TracingDiagnostics`].
    pub fn new() -> Self {
        Self {
            issuer: HandleIssuer::new(),
            clock: Arc::new(SystemClock),
            diagnostics: Arc::new(TracingDiagnostics),
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
        }
    }

    /// Stamp lock markers with `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report failures to `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Value returned by [`max_path_length`](FsFiles::max_path_length).
    pub fn with_max_path_length(mut self, max: usize) -> Self {
        self.max_path_length = max;
        self
    }

    fn fail(&self, error: FsError) -> FsError {
        self.diagnostics.report(&error);
        error
    }

    fn io_fail(&self, operation: &'static str, path: &Path, error: io::Error) -> FsError {
        self.fail(FsError::from_io(operation, path, error))
    }

    fn fail_tristate(&self, operation: &'static str, path: &Path, error: io::Error) -> Tristate {
        self.io_fail(operation, path, error);
        Tristate::Error
    }

    fn output(&self, path: PathBuf, file: File) -> OutputFile {
        let ops = DiskOutput {
            path: path.clone(),
            file,
        };
        OutputFile::new(
            path,
            Box::new(ops),
            self.issuer.clone(),
            Arc::clone(&self.diagnostics),
        )
    }

    /// Set the marker's modification time to `now` on the backend clock.
    fn stamp(&self, name: &Path) -> io::Result<()> {
        let marker = OpenOptions::new().write(true).open(name)?;
        marker.set_modified(ms_to_system_time(self.clock.now_ms()))
    }
}

impl Default for DiskFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiskFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskFileSystem")
            .field("max_path_length", &self.max_path_length)
            .finish_non_exhaustive()
    }
}

/// A missing path, or one running through a plain file.
fn is_absent(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

// =============================================================================
// Handles
// =============================================================================

struct DiskInput {
    path: PathBuf,
    file: File,
}

impl InputFileOps for DiskInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        self.file
            .read(buf)
            .map_err(|e| FsError::from_io("read", &self.path, e))
    }

    fn close(self: Box<Self>) -> Result<(), FsError> {
        drop(self.file);
        Ok(())
    }
}

struct DiskOutput {
    path: PathBuf,
    file: File,
}

impl OutputFileOps for DiskOutput {
    fn write(&mut self, data: &[u8]) -> Result<(), FsError> {
        self.file
            .write_all(data)
            .map_err(|e| FsError::from_io("write", &self.path, e))
    }

    fn flush(&mut self) -> Result<(), FsError> {
        self.file
            .flush()
            .map_err(|e| FsError::from_io("flush", &self.path, e))
    }

    #[cfg(unix)]
    fn set_world_readable(&mut self) -> Result<(), FsError> {
        use std::os::unix::fs::PermissionsExt;
        self.file
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| FsError::from_io("set_world_readable", &self.path, e))
    }

    #[cfg(not(unix))]
    fn set_world_readable(&mut self) -> Result<(), FsError> {
        Ok(())
    }

    /// `File` is unbuffered and dropping it discards the `close(2)` result,
    /// so the data is synced here to surface write-back failures.
    fn close(self: Box<Self>) -> Result<(), FsError> {
        self.file
            .sync_data()
            .map_err(|e| FsError::from_io("close", &self.path, e))
    }
}

// =============================================================================
// Primitives
// =============================================================================

impl FsFiles for DiskFileSystem {
    fn open_input_file(&self, path: &Path) -> Result<InputFile, FsError> {
        let file = File::open(path).map_err(|e| self.io_fail("open_input_file", path, e))?;
        // Opening a directory succeeds on Unix; reading it does not.
        match file.metadata() {
            Ok(meta) if meta.is_dir() => {
                return Err(self.fail(FsError::NotAFile {
                    path: path.to_path_buf(),
                }));
            }
            Ok(_) => {}
            Err(e) => return Err(self.io_fail("open_input_file", path, e)),
        }
        let ops = DiskInput {
            path: path.to_path_buf(),
            file,
        };
        Ok(InputFile::new(
            path,
            Box::new(ops),
            self.issuer.clone(),
            Arc::clone(&self.diagnostics),
        ))
    }

    fn create_output_file(&self, path: &Path, append: bool) -> Result<OutputFile, FsError> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options
            .open(path)
            .map_err(|e| self.io_fail("create_output_file", path, e))?;
        Ok(self.output(path.to_path_buf(), file))
    }

    fn create_temp_file(&self, prefix: &Path) -> Result<OutputFile, FsError> {
        let dir = match prefix.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let stem = prefix.file_name().unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(stem)
            .tempfile_in(dir)
            .map_err(|e| self.io_fail("create_temp_file", prefix, e))?;
        let (file, path) = temp
            .keep()
            .map_err(|e| self.io_fail("create_temp_file", prefix, e.error))?;
        Ok(self.output(path, file))
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        fs::rename(from, to).map_err(|e| self.io_fail("move_file", from, e))
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_file(path).map_err(|e| self.io_fail("remove_file", path, e))
    }

    fn issuer(&self) -> &HandleIssuer {
        &self.issuer
    }

    fn max_path_length(&self, _base: &Path) -> usize {
        self.max_path_length
    }
}

impl FsDir for DiskFileSystem {
    fn make_dir(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir(path).map_err(|e| self.io_fail("make_dir", path, e))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        fs::remove_dir(path).map_err(|e| self.io_fail("remove_dir", path, e))
    }

    fn list_contents(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        let entries = fs::read_dir(dir).map_err(|e| self.io_fail("list_contents", dir, e))?;
        let mut children = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()
            .map_err(|e| self.io_fail("list_contents", dir, e))?;
        children.sort();
        Ok(children)
    }
}

impl FsStat for DiskFileSystem {
    fn exists(&self, path: &Path) -> Tristate {
        match fs::symlink_metadata(path) {
            Ok(_) => Tristate::True,
            Err(e) if is_absent(&e) => Tristate::False,
            Err(e) => self.fail_tristate("exists", path, e),
        }
    }

    fn is_dir(&self, path: &Path) -> Tristate {
        match fs::metadata(path) {
            Ok(meta) => Tristate::from_bool(meta.is_dir()),
            Err(e) if is_absent(&e) => Tristate::False,
            Err(e) => self.fail_tristate("is_dir", path, e),
        }
    }

    fn atime(&self, path: &Path) -> Result<i64, FsError> {
        fs::metadata(path)
            .and_then(|meta| meta.accessed())
            .map(|t| system_time_to_ms(t).div_euclid(1000))
            .map_err(|e| self.io_fail("atime", path, e))
    }

    fn mtime(&self, path: &Path) -> Result<i64, FsError> {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map(|t| system_time_to_ms(t).div_euclid(1000))
            .map_err(|e| self.io_fail("mtime", path, e))
    }

    fn size(&self, path: &Path) -> Result<u64, FsError> {
        let meta = fs::metadata(path).map_err(|e| self.io_fail("size", path, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(meta.blocks() * 512)
        }
        #[cfg(not(unix))]
        {
            Ok(meta.len())
        }
    }
}

impl FsLock for DiskFileSystem {
    fn try_lock(&self, name: &Path) -> Tristate {
        let created = OpenOptions::new().write(true).create_new(true).open(name);
        match created {
            Ok(marker) => {
                drop(marker);
                if let Err(e) = self.stamp(name) {
                    // The lock is ours either way; only its age is off.
                    self.io_fail("try_lock", name, e);
                }
                tracing::debug!(lock = %name.display(), "lock acquired");
                Tristate::True
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Tristate::False,
            Err(e) => self.fail_tristate("try_lock", name, e),
        }
    }

    fn unlock(&self, name: &Path) -> Result<(), FsError> {
        match fs::remove_file(name) {
            Ok(()) => {
                tracing::debug!(lock = %name.display(), "lock released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(self.fail(FsError::LockNotHeld {
                name: name.to_path_buf(),
            })),
            Err(e) => Err(self.io_fail("unlock", name, e)),
        }
    }

    fn stale_locks(&self) -> Option<&dyn FsStaleLock> {
        Some(self)
    }
}

impl FsStaleLock for DiskFileSystem {
    fn try_lock_breaking_stale(
        &self,
        name: &Path,
        timeout: Duration,
        clock: &dyn Clock,
    ) -> Tristate {
        match self.try_lock(name) {
            Tristate::False => {}
            other => return other,
        }
        let since = match fs::metadata(name).and_then(|meta| meta.modified()) {
            Ok(t) => system_time_to_ms(t),
            // Released between the two calls.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.try_lock(name),
            Err(e) => return self.fail_tristate("try_lock", name, e),
        };
        let now = clock.now_ms();
        if !is_stale(now, since, timeout) {
            return Tristate::False;
        }
        match self.stamp(name) {
            Ok(()) => {
                tracing::info!(
                    lock = %name.display(),
                    idle_ms = now.saturating_sub(since),
                    "broke stale lock"
                );
                Tristate::True
            }
            Err(e) => self.fail_tristate("try_lock", name, e),
        }
    }

    fn refresh_lock(&self, name: &Path) -> Result<(), FsError> {
        self.stamp(name).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => self.fail(FsError::LockNotHeld {
                name: name.to_path_buf(),
            }),
            _ => self.io_fail("refresh_lock", name, e),
        })
    }
}

impl FsDiagnostics for DiskFileSystem {
    fn diagnostics(&self) -> &dyn Diagnostics {
        &*self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileSystemExt, ManualClock, RecordingDiagnostics, SizeLimit};
    use tempfile::TempDir;

    fn setup() -> (TempDir, DiskFileSystem, Arc<RecordingDiagnostics>) {
        let dir = tempfile::tempdir().unwrap();
        let diag = Arc::new(RecordingDiagnostics::new());
        let fs = DiskFileSystem::new().with_diagnostics(diag.clone());
        (dir, fs, diag)
    }

    #[test]
    fn write_and_read_back() {
        let (dir, fs, diag) = setup();
        let path = dir.path().join("a/b/file");
        fs.write_file(&path, b"payload").unwrap();
        assert!(fs.exists(&path).is_true());
        assert!(fs.is_dir(&path).is_false());
        assert!(fs.is_dir(&dir.path().join("a/b")).is_true());
        assert_eq!(fs.read_file(&path, SizeLimit::Bytes(7)).unwrap(), b"payload");
        assert!(diag.is_empty());
    }

    #[test]
    fn missing_paths_are_false_not_error() {
        let (dir, fs, diag) = setup();
        let path = dir.path().join("missing");
        assert!(fs.exists(&path).is_false());
        assert!(fs.is_dir(&path).is_false());
        assert!(diag.is_empty());
    }

    #[test]
    fn path_through_plain_file_is_false() {
        let (dir, fs, diag) = setup();
        fs.write_file(&dir.path().join("plain"), b"x").unwrap();
        assert!(fs.exists(&dir.path().join("plain/child")).is_false());
        assert!(fs.is_dir(&dir.path().join("plain/child")).is_false());
        assert!(diag.is_empty());
    }

    #[test]
    fn open_missing_file_reports_not_found() {
        let (dir, fs, diag) = setup();
        let err = fs.open_input_file(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, FsError::NotFound { .. }));
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn open_directory_for_reading_fails() {
        let (dir, fs, _) = setup();
        let err = fs.open_input_file(dir.path()).unwrap_err();
        assert!(matches!(err, FsError::NotAFile { .. }));
    }

    #[test]
    fn temp_file_keeps_prefix_and_survives_close() {
        let (dir, fs, _) = setup();
        let prefix = dir.path().join("job.temp");
        let name = fs.write_temp_file(&prefix, b"x").unwrap();
        let file_name = name.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("job.temp"));
        assert!(file_name.len() > "job.temp".len());
        assert!(fs.exists(&name).is_true());
    }

    #[test]
    fn list_contents_is_sorted_full_paths() {
        let (dir, fs, _) = setup();
        fs.write_file(&dir.path().join("b"), b"").unwrap();
        fs.make_dir(&dir.path().join("a")).unwrap();
        assert_eq!(
            fs.list_contents(dir.path()).unwrap(),
            vec![dir.path().join("a"), dir.path().join("b")]
        );
    }

    #[test]
    fn remove_dir_requires_empty() {
        let (dir, fs, _) = setup();
        fs.write_file(&dir.path().join("d/f"), b"x").unwrap();
        assert!(fs.remove_dir(&dir.path().join("d")).is_err());
        fs.remove_file(&dir.path().join("d/f")).unwrap();
        fs.remove_dir(&dir.path().join("d")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_sets_mode() {
        use std::os::unix::fs::PermissionsExt;
        let (dir, fs, _) = setup();
        let path = dir.path().join("shared");
        let mut f = fs.open_output_file(&path).unwrap();
        f.set_world_readable().unwrap();
        fs.close(f).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn max_path_length_is_configurable() {
        let fs = DiskFileSystem::new();
        assert_eq!(fs.max_path_length(Path::new("/")), DEFAULT_MAX_PATH_LENGTH);
        let fs = fs.with_max_path_length(255);
        assert_eq!(fs.max_path_length(Path::new("/")), 255);
    }

    #[test]
    fn strict_lock_is_exclusive() {
        let (dir, fs, _) = setup();
        let name = dir.path().join("lock");
        assert!(fs.try_lock(&name).is_true());
        assert!(fs.try_lock(&name).is_false());
        fs.unlock(&name).unwrap();
        assert!(fs.try_lock(&name).is_true());
    }

    #[test]
    fn lock_in_missing_directory_is_error() {
        let (dir, fs, diag) = setup();
        assert!(fs.try_lock(&dir.path().join("no/such/lock")).is_error());
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn stale_marker_is_broken_and_fresh_one_is_not() {
        let (dir, fs, _) = setup();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let fs = fs.with_clock(clock.clone());
        let name = dir.path().join("lock");
        let timeout = Duration::from_secs(10);

        assert!(fs.try_lock(&name).is_true());
        clock.advance_ms(9_000);
        assert!(fs.try_lock_with_timeout(&name, timeout, &*clock).is_false());

        fs.bump_lock_timeout(&name).unwrap();
        clock.advance_ms(9_000);
        assert!(fs.try_lock_with_timeout(&name, timeout, &*clock).is_false());

        clock.advance_ms(1_000);
        assert!(fs.try_lock_with_timeout(&name, timeout, &*clock).is_true());
        // the breaker now owns a fresh window
        assert!(fs.try_lock_with_timeout(&name, timeout, &*clock).is_false());
    }

    #[test]
    fn unlock_of_missing_marker_is_lock_not_held() {
        let (dir, fs, _) = setup();
        let err = fs.unlock(&dir.path().join("lock")).unwrap_err();
        assert!(matches!(err, FsError::LockNotHeld { .. }));
    }

    #[test]
    fn close_syncs_and_leaves_content_on_disk() {
        let (dir, fs, diag) = setup();
        let path = dir.path().join("synced");
        let mut f = fs.open_output_file(&path).unwrap();
        f.write(b"abc").unwrap();
        f.flush().unwrap();
        fs.close(f).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abc");
        assert!(diag.is_empty());
    }

    #[test]
    fn handle_is_refused_by_another_backend() {
        let (dir, fs, diag) = setup();
        let other_diag = Arc::new(RecordingDiagnostics::new());
        let other = crate::MemFileSystem::new().with_diagnostics(other_diag.clone());
        let f = fs.open_output_file(&dir.path().join("owned")).unwrap();
        let err = other.close(f).unwrap_err();
        assert!(matches!(err, FsError::ForeignHandle { .. }));
        assert_eq!(other_diag.len(), 1);
        // the refused handle is reported to its issuer as leaked
        assert!(diag.messages()[0].contains("without close"));

        // a clone shares the issuer
        let g = fs.open_output_file(&dir.path().join("shared")).unwrap();
        fs.clone().close(g).unwrap();
    }
}
