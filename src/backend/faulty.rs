//! Fault injection.
//!
//! [`FaultLayer`] wraps any backend in a [`FaultyFileSystem`] whose
//! primitives can be switched to fail, at construction or at runtime. An
//! injected failure is reported to the inner backend's diagnostic sink as
//! [`FsError::Injected`]; tri-state primitives answer `Error`.
//!
//! Handles opened through the wrapper see the same fault set, so reads,
//! writes, flushes and closes can fail too, including on handles opened
//! before the fault was injected. A failing close still closes the inner
//! handle.
//!
//! The wrapper does not forward the inner backend's
//! [`FsStaleLock`](crate::FsStaleLock) extension, so it also serves as a
//! backend with strict locks only.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    Diagnostics, FileSystem, FsDiagnostics, FsDir, FsError, FsFiles, FsLock, FsStat, HandleIssuer,
    InputFile, InputFileOps, Layer, OutputFile, OutputFileOps, Tristate,
};

/// A primitive that can be made to fail.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// [`FsFiles::open_input_file`]
    OpenInputFile,
    /// [`FsFiles::create_output_file`]
    CreateOutputFile,
    /// [`FsFiles::create_temp_file`]
    CreateTempFile,
    /// [`FsFiles::move_file`]
    MoveFile,
    /// [`FsFiles::remove_file`]
    RemoveFile,
    /// [`FsDir::make_dir`]
    MakeDir,
    /// [`FsDir::remove_dir`]
    RemoveDir,
    /// [`FsDir::list_contents`]
    ListContents,
    /// [`FsStat::exists`]
    Exists,
    /// [`FsStat::is_dir`]
    IsDir,
    /// [`FsStat::atime`]
    Atime,
    /// [`FsStat::mtime`]
    Mtime,
    /// [`FsStat::size`]
    Size,
    /// [`FsLock::try_lock`]
    TryLock,
    /// [`FsLock::unlock`]
    Unlock,
    /// [`InputFile::read`]
    Read,
    /// [`OutputFile::write`]
    Write,
    /// [`OutputFile::flush`]
    Flush,
    /// [`OutputFile::set_world_readable`]
    SetWorldReadable,
    /// Closing either kind of handle.
    Close,
}

impl Fault {
    /// Name of the primitive, as used in error messages.
    pub const fn operation(&self) -> &'static str {
        match self {
            Fault::OpenInputFile => "open_input_file",
            Fault::CreateOutputFile => "create_output_file",
            Fault::CreateTempFile => "create_temp_file",
            Fault::MoveFile => "move_file",
            Fault::RemoveFile => "remove_file",
            Fault::MakeDir => "make_dir",
            Fault::RemoveDir => "remove_dir",
            Fault::ListContents => "list_contents",
            Fault::Exists => "exists",
            Fault::IsDir => "is_dir",
            Fault::Atime => "atime",
            Fault::Mtime => "mtime",
            Fault::Size => "size",
            Fault::TryLock => "try_lock",
            Fault::Unlock => "unlock",
            Fault::Read => "read",
            Fault::Write => "write",
            Fault::Flush => "flush",
            Fault::SetWorldReadable => "set_world_readable",
            Fault::Close => "close",
        }
    }
}

/// Builds a [`FaultyFileSystem`] around a backend.
///
/// ```rust
/// use artifact_fs::{Fault, FaultLayer, FileSystemExt, LayerExt, MemFileSystem};
/// use std::path::Path;
///
/// let fs = MemFileSystem::new().layer(FaultLayer::new().fail(Fault::MoveFile));
/// assert!(fs.write_file_atomic(Path::new("/entry"), b"body").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FaultLayer {
    faults: HashSet<Fault>,
}

impl FaultLayer {
    /// A layer with no faults enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `fault` fail from the start.
    pub fn fail(mut self, fault: Fault) -> Self {
        self.faults.insert(fault);
        self
    }
}

impl<B: FileSystem> Layer<B> for FaultLayer {
    type Backend = FaultyFileSystem<B>;

    fn layer(self, backend: B) -> Self::Backend {
        FaultyFileSystem {
            inner: backend,
            faults: Arc::new(Mutex::new(self.faults)),
        }
    }
}

/// A backend whose primitives fail on demand.
pub struct FaultyFileSystem<B> {
    inner: B,
    faults: FaultSet,
}

/// Shared between the wrapper and every handle it opened.
type FaultSet = Arc<Mutex<HashSet<Fault>>>;

fn lock_faults(faults: &FaultSet) -> MutexGuard<'_, HashSet<Fault>> {
    faults
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The injected error if `fault` is active. Handles report it themselves.
fn injected(faults: &FaultSet, fault: Fault, path: &Path) -> Result<(), FsError> {
    if lock_faults(faults).contains(&fault) {
        Err(FsError::Injected {
            operation: fault.operation(),
            path: path.to_path_buf(),
        })
    } else {
        Ok(())
    }
}

impl<B: FileSystem> FaultyFileSystem<B> {
    /// Start failing `fault`.
    pub fn inject(&self, fault: Fault) {
        self.faults().insert(fault);
    }

    /// Stop failing `fault`.
    pub fn clear(&self, fault: Fault) {
        self.faults().remove(&fault);
    }

    /// Stop failing everything.
    pub fn clear_all(&self) {
        self.faults().clear();
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Unwrap the backend.
    pub fn into_inner(self) -> B {
        self.inner
    }

    fn faults(&self) -> MutexGuard<'_, HashSet<Fault>> {
        lock_faults(&self.faults)
    }

    fn check(&self, fault: Fault, path: &Path) -> Result<(), FsError> {
        injected(&self.faults, fault, path).inspect_err(|e| self.inner.diagnostics().report(e))
    }

    fn wrap_input(&self, file: InputFile) -> InputFile {
        let path = file.filename().to_path_buf();
        let faults = Arc::clone(&self.faults);
        file.map_ops(move |inner| -> Box<dyn InputFileOps> {
            Box::new(FaultyInput {
                path,
                inner,
                faults,
            })
        })
    }

    fn wrap_output(&self, file: OutputFile) -> OutputFile {
        let path = file.filename().to_path_buf();
        let faults = Arc::clone(&self.faults);
        file.map_ops(move |inner| -> Box<dyn OutputFileOps> {
            Box::new(FaultyOutput {
                path,
                inner,
                faults,
            })
        })
    }

    fn check_tristate(&self, fault: Fault, path: &Path, f: impl FnOnce() -> Tristate) -> Tristate {
        match self.check(fault, path) {
            Ok(()) => f(),
            Err(_) => Tristate::Error,
        }
    }
}

impl<B> std::fmt::Debug for FaultyFileSystem<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyFileSystem")
            .field("faults", &self.faults)
            .finish_non_exhaustive()
    }
}

struct FaultyInput {
    path: PathBuf,
    inner: Box<dyn InputFileOps>,
    faults: FaultSet,
}

impl InputFileOps for FaultyInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        injected(&self.faults, Fault::Read, &self.path)?;
        self.inner.read(buf)
    }

    fn close(self: Box<Self>) -> Result<(), FsError> {
        let FaultyInput {
            path,
            inner,
            faults,
        } = *self;
        let closed = inner.close();
        injected(&faults, Fault::Close, &path).and(closed)
    }
}

struct FaultyOutput {
    path: PathBuf,
    inner: Box<dyn OutputFileOps>,
    faults: FaultSet,
}

impl OutputFileOps for FaultyOutput {
    fn write(&mut self, data: &[u8]) -> Result<(), FsError> {
        injected(&self.faults, Fault::Write, &self.path)?;
        self.inner.write(data)
    }

    fn flush(&mut self) -> Result<(), FsError> {
        injected(&self.faults, Fault::Flush, &self.path)?;
        self.inner.flush()
    }

    fn set_world_readable(&mut self) -> Result<(), FsError> {
        injected(&self.faults, Fault::SetWorldReadable, &self.path)?;
        self.inner.set_world_readable()
    }

    fn close(self: Box<Self>) -> Result<(), FsError> {
        let FaultyOutput {
            path,
            inner,
            faults,
        } = *self;
        let closed = inner.close();
        injected(&faults, Fault::Close, &path).and(closed)
    }
}

impl<B: FileSystem> FsFiles for FaultyFileSystem<B> {
    fn open_input_file(&self, path: &Path) -> Result<InputFile, FsError> {
        self.check(Fault::OpenInputFile, path)?;
        let file = self.inner.open_input_file(path)?;
        Ok(self.wrap_input(file))
    }

    fn create_output_file(&self, path: &Path, append: bool) -> Result<OutputFile, FsError> {
        self.check(Fault::CreateOutputFile, path)?;
        let file = self.inner.create_output_file(path, append)?;
        Ok(self.wrap_output(file))
    }

    fn create_temp_file(&self, prefix: &Path) -> Result<OutputFile, FsError> {
        self.check(Fault::CreateTempFile, prefix)?;
        let file = self.inner.create_temp_file(prefix)?;
        Ok(self.wrap_output(file))
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        self.check(Fault::MoveFile, from)?;
        self.inner.move_file(from, to)
    }

    fn remove_file(&self, path: &Path) -> Result<(), FsError> {
        self.check(Fault::RemoveFile, path)?;
        self.inner.remove_file(path)
    }

    fn issuer(&self) -> &HandleIssuer {
        self.inner.issuer()
    }

    fn max_path_length(&self, base: &Path) -> usize {
        self.inner.max_path_length(base)
    }
}

impl<B: FileSystem> FsDir for FaultyFileSystem<B> {
    fn make_dir(&self, path: &Path) -> Result<(), FsError> {
        self.check(Fault::MakeDir, path)?;
        self.inner.make_dir(path)
    }

    fn remove_dir(&self, path: &Path) -> Result<(), FsError> {
        self.check(Fault::RemoveDir, path)?;
        self.inner.remove_dir(path)
    }

    fn list_contents(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        self.check(Fault::ListContents, dir)?;
        self.inner.list_contents(dir)
    }
}

impl<B: FileSystem> FsStat for FaultyFileSystem<B> {
    fn exists(&self, path: &Path) -> Tristate {
        self.check_tristate(Fault::Exists, path, || self.inner.exists(path))
    }

    fn is_dir(&self, path: &Path) -> Tristate {
        self.check_tristate(Fault::IsDir, path, || self.inner.is_dir(path))
    }

    fn atime(&self, path: &Path) -> Result<i64, FsError> {
        self.check(Fault::Atime, path)?;
        self.inner.atime(path)
    }

    fn mtime(&self, path: &Path) -> Result<i64, FsError> {
        self.check(Fault::Mtime, path)?;
        self.inner.mtime(path)
    }

    fn size(&self, path: &Path) -> Result<u64, FsError> {
        self.check(Fault::Size, path)?;
        self.inner.size(path)
    }
}

impl<B: FileSystem> FsLock for FaultyFileSystem<B> {
    fn try_lock(&self, name: &Path) -> Tristate {
        self.check_tristate(Fault::TryLock, name, || self.inner.try_lock(name))
    }

    fn unlock(&self, name: &Path) -> Result<(), FsError> {
        self.check(Fault::Unlock, name)?;
        self.inner.unlock(name)
    }
}

impl<B: FileSystem> FsDiagnostics for FaultyFileSystem<B> {
    fn diagnostics(&self) -> &dyn Diagnostics {
        self.inner.diagnostics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileSystemExt, LayerExt, MemFileSystem, RecordingDiagnostics, SizeLimit};
    use std::sync::Arc;

    fn faulty() -> (FaultyFileSystem<MemFileSystem>, Arc<RecordingDiagnostics>) {
        let diag = Arc::new(RecordingDiagnostics::new());
        let fs = MemFileSystem::new()
            .with_diagnostics(diag.clone())
            .layer(FaultLayer::new());
        (fs, diag)
    }

    #[test]
    fn no_faults_means_pass_through() {
        let (fs, diag) = faulty();
        fs.write_file(Path::new("/a/f"), b"x").unwrap();
        assert_eq!(
            fs.read_file(Path::new("/a/f"), SizeLimit::Unlimited).unwrap(),
            b"x"
        );
        assert!(diag.is_empty());
    }

    #[test]
    fn injected_fault_is_reported_once() {
        let (fs, diag) = faulty();
        fs.inject(Fault::RemoveFile);
        let err = fs.remove_file(Path::new("/whatever")).unwrap_err();
        assert!(matches!(
            err,
            FsError::Injected {
                operation: "remove_file",
                ..
            }
        ));
        assert_eq!(
            diag.messages(),
            vec!["remove_file: injected fault: /whatever".to_string()]
        );
    }

    #[test]
    fn tristate_faults_answer_error() {
        let (fs, _) = faulty();
        fs.inject(Fault::IsDir);
        fs.inject(Fault::TryLock);
        assert!(fs.is_dir(Path::new("/")).is_error());
        assert!(fs.try_lock(Path::new("/l")).is_error());
        assert!(fs.inner().try_lock(Path::new("/l")).is_true());
    }

    #[test]
    fn clear_restores_behavior() {
        let (fs, _) = faulty();
        fs.inject(Fault::MakeDir);
        fs.inject(Fault::Exists);
        assert!(fs.make_dir(Path::new("/d")).is_err());
        fs.clear(Fault::MakeDir);
        fs.make_dir(Path::new("/d")).unwrap();
        assert!(fs.exists(Path::new("/d")).is_error());
        fs.clear_all();
        assert!(fs.exists(Path::new("/d")).is_true());
    }

    #[test]
    fn failed_size_skips_file_in_dir_info() {
        let (fs, _) = faulty();
        fs.write_file(Path::new("/r/f"), b"abc").unwrap();
        fs.inject(Fault::Size);
        let info = fs.dir_info(Path::new("/r"));
        assert!(info.files.is_empty());
        assert_eq!(info.size_bytes, 0);
        // still classified
        assert_eq!(info.inode_count, 1);
    }

    #[test]
    fn inconclusive_entry_is_not_counted() {
        let (fs, _) = faulty();
        fs.write_file(Path::new("/r/f"), b"abc").unwrap();
        fs.inject(Fault::IsDir);
        let info = fs.dir_info(Path::new("/r"));
        assert_eq!(info.inode_count, 0);
        assert!(info.files.is_empty());
    }

    #[test]
    fn stale_lock_extension_is_hidden() {
        let (fs, _) = faulty();
        assert!(fs.inner().stale_locks().is_some());
        assert!(fs.stale_locks().is_none());
    }

    fn no_leak_reported(diag: &RecordingDiagnostics) -> bool {
        diag.messages().iter().all(|m| !m.contains("without close"))
    }

    #[test]
    fn read_failure_still_closes_the_handle() {
        let (fs, diag) = faulty();
        fs.write_file(Path::new("/f"), b"body").unwrap();
        fs.inject(Fault::Read);
        let err = fs.read_file(Path::new("/f"), SizeLimit::Unlimited).unwrap_err();
        assert!(matches!(err, FsError::Injected { operation: "read", .. }));
        assert_eq!(diag.messages(), vec!["read: injected fault: /f".to_string()]);
    }

    #[test]
    fn close_failure_fails_an_otherwise_good_read() {
        let (fs, diag) = faulty();
        fs.write_file(Path::new("/f"), b"body").unwrap();
        fs.inject(Fault::Close);
        let mut sink = Vec::new();
        let err = fs
            .read_file_into(Path::new("/f"), SizeLimit::Unlimited, &mut sink)
            .unwrap_err();
        assert!(matches!(err, FsError::Injected { operation: "close", .. }));
        assert_eq!(sink, b"body");
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn write_file_reports_a_failed_write() {
        let (fs, diag) = faulty();
        fs.inject(Fault::Write);
        let err = fs.write_file(Path::new("/w"), b"x").unwrap_err();
        assert!(matches!(err, FsError::Injected { operation: "write", .. }));
        assert_eq!(diag.len(), 1);
        assert!(no_leak_reported(&diag));
    }

    #[test]
    fn failed_atomic_write_leaves_destination_and_no_temp_file() {
        for fault in [Fault::Write, Fault::Close] {
            let (fs, diag) = faulty();
            let path = Path::new("/cache/entry");
            fs.write_file_atomic(path, b"old").unwrap();
            fs.inject(fault);
            assert!(fs.write_file_atomic(path, b"new").is_err());
            fs.clear_all();
            assert_eq!(fs.read_file(path, SizeLimit::Unlimited).unwrap(), b"old");
            assert_eq!(
                fs.list_contents(Path::new("/cache")).unwrap(),
                vec![PathBuf::from("/cache/entry")]
            );
            assert!(no_leak_reported(&diag));
        }
    }

    #[test]
    fn failed_temp_write_removes_the_temp_file() {
        let (fs, _) = faulty();
        fs.recursively_make_dir(Path::new("/t")).unwrap();
        fs.inject(Fault::Close);
        assert!(fs.write_temp_file(Path::new("/t/job"), b"x").is_err());
        assert!(fs.list_contents(Path::new("/t")).unwrap().is_empty());
    }

    #[test]
    fn faults_apply_to_handles_already_open() {
        let (fs, diag) = faulty();
        let mut f = fs.open_output_file(Path::new("/o")).unwrap();
        f.write(b"a").unwrap();
        fs.inject(Fault::Flush);
        fs.inject(Fault::SetWorldReadable);
        assert!(f.flush().is_err());
        assert!(f.set_world_readable().is_err());
        fs.clear_all();
        f.write(b"b").unwrap();
        fs.close(f).unwrap();
        assert_eq!(diag.len(), 2);
        assert_eq!(fs.read_file(Path::new("/o"), SizeLimit::Unlimited).unwrap(), b"ab");
    }

    #[test]
    fn wrapper_and_inner_share_handle_authority() {
        let (fs, _) = faulty();
        let f = fs.open_output_file(Path::new("/x")).unwrap();
        fs.inner().close(f).unwrap();
        let g = fs.inner().open_output_file(Path::new("/y")).unwrap();
        fs.close(g).unwrap();
    }

    #[test]
    fn into_inner_returns_backend() {
        let (fs, _) = faulty();
        fs.write_file(Path::new("/kept"), b"x").unwrap();
        let inner = fs.into_inner();
        assert!(inner.exists(Path::new("/kept")).is_true());
    }
}
