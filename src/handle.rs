//! Owned file handles.
//!
//! Backends hand out [`InputFile`] and [`OutputFile`] values. A handle is
//! move-only and can only be finalized by passing it back to
//! [`FileSystemExt::close`](crate::FileSystemExt::close), so it can never be
//! closed twice and every close failure reaches the diagnostic sink.
//!
//! The backend side of a handle is a boxed [`InputFileOps`] or
//! [`OutputFileOps`]. Their `close` methods are only ever called by the crate;
//! callers holding an `InputFile` have no way to reach the boxed ops.
//!
//! Every handle carries the [`HandleIssuer`] of the filesystem that opened
//! it. `close` refuses a handle from any other issuer with
//! [`FsError::ForeignHandle`].
//!
//! Dropping a handle without closing it is reported as
//! [`FsError::HandleLeaked`] and the underlying resource is released.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{Diagnostics, FsError, SizeLimit};

/// Chunk size for streaming reads.
pub(crate) const READ_CHUNK: usize = 8192;

/// Backend implementation of a readable handle.
pub trait InputFileOps: Send {
    /// Read up to `buf.len()` bytes. Returns the number of bytes read, `0` at
    /// end of file. This is a byte count, not a success flag.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError>;

    /// Release the underlying resource.
    fn close(self: Box<Self>) -> Result<(), FsError>;
}

/// Backend implementation of a writable handle.
pub trait OutputFileOps: Send {
    /// Write all of `data` at the current position.
    ///
    /// Not atomic: on failure there is no indication of how many bytes were
    /// already written.
    fn write(&mut self, data: &[u8]) -> Result<(), FsError>;

    /// Push buffered data to the backend.
    fn flush(&mut self) -> Result<(), FsError>;

    /// Make the file readable by everyone.
    fn set_world_readable(&mut self) -> Result<(), FsError>;

    /// Release the underlying resource.
    fn close(self: Box<Self>) -> Result<(), FsError>;
}

/// Identity of the filesystem that opened a handle.
///
/// Clones compare equal to the original; independently created issuers never
/// do. A backend creates one issuer and hands a clone to every handle it
/// opens, so clones of the backend share its authority over those handles.
#[derive(Clone, Default)]
pub struct HandleIssuer(Arc<()>);

impl HandleIssuer {
    /// A new identity, distinct from every other.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `self` and `other` are the same identity.
    pub fn same_as(&self, other: &HandleIssuer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for HandleIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HandleIssuer")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

pub(crate) mod sealed {
    /// Finalization hook, only callable from inside the crate.
    pub trait Finalize {
        fn issuer(&self) -> &super::HandleIssuer;
        fn finalize(self) -> Result<(), crate::FsError>;
    }
}

/// A handle that must be closed through its issuing filesystem.
///
/// Implemented by [`InputFile`] and [`OutputFile`]; cannot be implemented
/// outside this crate.
pub trait OwnedFile: sealed::Finalize {
    /// Name of the file the handle was opened on.
    fn filename(&self) -> &Path;
}

fn closed_error(path: &Path) -> FsError {
    FsError::Backend(format!("handle already closed: {}", path.display()))
}

/// A file opened for reading.
pub struct InputFile {
    path: PathBuf,
    ops: Option<Box<dyn InputFileOps>>,
    issuer: HandleIssuer,
    diagnostics: Arc<dyn Diagnostics>,
}

impl InputFile {
    /// Wrap a backend handle. Called by backends from `open_input_file`
    /// with their own issuer.
    pub fn new(
        path: impl Into<PathBuf>,
        ops: Box<dyn InputFileOps>,
        issuer: HandleIssuer,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            path: path.into(),
            ops: Some(ops),
            issuer,
            diagnostics,
        }
    }

    /// Replace the backend ops with a wrapper around them.
    pub(crate) fn map_ops(
        mut self,
        f: impl FnOnce(Box<dyn InputFileOps>) -> Box<dyn InputFileOps>,
    ) -> Self {
        self.ops = self.ops.take().map(f);
        self
    }

    /// Name of the file.
    pub fn filename(&self) -> &Path {
        &self.path
    }

    /// Low-level read. Returns the number of bytes read, `0` at end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let result = match self.ops.as_mut() {
            Some(ops) => ops.read(buf),
            None => Err(closed_error(&self.path)),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Read the rest of the file, failing if it holds more than `limit` bytes.
    ///
    /// Never returns a truncated buffer as success.
    pub fn read_file(&mut self, limit: SizeLimit) -> Result<Vec<u8>, FsError> {
        let mut buf = Vec::new();
        self.read_bounded_into(limit, &mut buf)?;
        Ok(buf)
    }

    /// Stream the rest of the file into `sink` in chunks, checking the running
    /// total against `limit`. Returns the number of bytes copied.
    ///
    /// On failure `sink` may already have received some chunks.
    pub fn read_bounded_into(
        &mut self,
        limit: SizeLimit,
        sink: &mut dyn Write,
    ) -> Result<u64, FsError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total: u64 = 0;
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
            if let SizeLimit::Bytes(max) = limit {
                if total > max {
                    return Err(self.fail(FsError::FileSizeExceeded {
                        path: self.path.clone(),
                        size: total,
                        limit: max,
                    }));
                }
            }
            if let Err(e) = sink.write_all(&chunk[..n]) {
                return Err(self.fail(FsError::from_io("write to sink", &self.path, e)));
            }
        }
    }

    fn fail(&self, error: FsError) -> FsError {
        self.diagnostics.report(&error);
        error
    }
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFile")
            .field("path", &self.path)
            .field("open", &self.ops.is_some())
            .finish()
    }
}

impl sealed::Finalize for InputFile {
    fn issuer(&self) -> &HandleIssuer {
        &self.issuer
    }

    fn finalize(mut self) -> Result<(), FsError> {
        match self.ops.take() {
            Some(ops) => ops.close().map_err(|e| self.fail(e)),
            None => Err(self.fail(closed_error(&self.path))),
        }
    }
}

impl OwnedFile for InputFile {
    fn filename(&self) -> &Path {
        &self.path
    }
}

impl Drop for InputFile {
    fn drop(&mut self) {
        if let Some(ops) = self.ops.take() {
            self.diagnostics.report(&FsError::HandleLeaked {
                path: self.path.clone(),
            });
            drop(ops);
        }
    }
}

/// A file opened for writing.
pub struct OutputFile {
    path: PathBuf,
    ops: Option<Box<dyn OutputFileOps>>,
    issuer: HandleIssuer,
    diagnostics: Arc<dyn Diagnostics>,
}

impl OutputFile {
    /// Wrap a backend handle. Called by backends from `create_output_file`
    /// and `create_temp_file` with their own issuer.
    pub fn new(
        path: impl Into<PathBuf>,
        ops: Box<dyn OutputFileOps>,
        issuer: HandleIssuer,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            path: path.into(),
            ops: Some(ops),
            issuer,
            diagnostics,
        }
    }

    /// Replace the backend ops with a wrapper around them.
    pub(crate) fn map_ops(
        mut self,
        f: impl FnOnce(Box<dyn OutputFileOps>) -> Box<dyn OutputFileOps>,
    ) -> Self {
        self.ops = self.ops.take().map(f);
        self
    }

    /// Name of the file. For temp files this is the generated name.
    pub fn filename(&self) -> &Path {
        &self.path
    }

    /// Write all of `data`. Not atomic.
    pub fn write(&mut self, data: &[u8]) -> Result<(), FsError> {
        let result = match self.ops.as_mut() {
            Some(ops) => ops.write(data),
            None => Err(closed_error(&self.path)),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Flush buffered data.
    pub fn flush(&mut self) -> Result<(), FsError> {
        let result = match self.ops.as_mut() {
            Some(ops) => ops.flush(),
            None => Err(closed_error(&self.path)),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Make the file world-readable.
    pub fn set_world_readable(&mut self) -> Result<(), FsError> {
        let result = match self.ops.as_mut() {
            Some(ops) => ops.set_world_readable(),
            None => Err(closed_error(&self.path)),
        };
        result.map_err(|e| self.fail(e))
    }

    fn fail(&self, error: FsError) -> FsError {
        self.diagnostics.report(&error);
        error
    }
}

impl std::fmt::Debug for OutputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputFile")
            .field("path", &self.path)
            .field("open", &self.ops.is_some())
            .finish()
    }
}

impl sealed::Finalize for OutputFile {
    fn issuer(&self) -> &HandleIssuer {
        &self.issuer
    }

    fn finalize(mut self) -> Result<(), FsError> {
        match self.ops.take() {
            Some(ops) => ops.close().map_err(|e| self.fail(e)),
            None => Err(self.fail(closed_error(&self.path))),
        }
    }
}

impl OwnedFile for OutputFile {
    fn filename(&self) -> &Path {
        &self.path
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if let Some(ops) = self.ops.take() {
            self.diagnostics.report(&FsError::HandleLeaked {
                path: self.path.clone(),
            });
            drop(ops);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sealed::Finalize;
    use super::*;
    use crate::RecordingDiagnostics;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct CursorInput {
        data: Cursor<Vec<u8>>,
        fail_close: bool,
    }

    impl InputFileOps for CursorInput {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
            std::io::Read::read(&mut self.data, buf)
                .map_err(|e| FsError::from_io("read", Path::new("/t"), e))
        }

        fn close(self: Box<Self>) -> Result<(), FsError> {
            if self.fail_close {
                Err(FsError::Backend("close failed".into()))
            } else {
                Ok(())
            }
        }
    }

    struct VecOutput {
        data: Arc<Mutex<Vec<u8>>>,
    }

    impl OutputFileOps for VecOutput {
        fn write(&mut self, data: &[u8]) -> Result<(), FsError> {
            self.data.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), FsError> {
            Ok(())
        }

        fn set_world_readable(&mut self) -> Result<(), FsError> {
            Err(FsError::NotSupported {
                operation: "set_world_readable",
            })
        }

        fn close(self: Box<Self>) -> Result<(), FsError> {
            Ok(())
        }
    }

    fn input(data: &[u8], diag: Arc<RecordingDiagnostics>) -> InputFile {
        InputFile::new(
            "/t",
            Box::new(CursorInput {
                data: Cursor::new(data.to_vec()),
                fail_close: false,
            }),
            HandleIssuer::new(),
            diag,
        )
    }

    #[test]
    fn read_returns_byte_counts() {
        let diag = Arc::new(RecordingDiagnostics::new());
        let mut file = input(b"hello", diag.clone());
        let mut buf = [0u8; 3];
        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(file.read(&mut buf).unwrap(), 2);
        assert_eq!(file.read(&mut buf).unwrap(), 0);
        file.finalize().unwrap();
        assert!(diag.is_empty());
    }

    #[test]
    fn read_file_at_exact_limit_succeeds() {
        let diag = Arc::new(RecordingDiagnostics::new());
        let mut file = input(&[7u8; 10], diag.clone());
        assert_eq!(file.read_file(SizeLimit::Bytes(10)).unwrap(), vec![7u8; 10]);
        file.finalize().unwrap();
    }

    #[test]
    fn read_file_over_limit_fails_and_reports() {
        let diag = Arc::new(RecordingDiagnostics::new());
        let mut file = input(&[7u8; 11], diag.clone());
        let err = file.read_file(SizeLimit::Bytes(10)).unwrap_err();
        assert!(matches!(
            err,
            FsError::FileSizeExceeded {
                size: 11,
                limit: 10,
                ..
            }
        ));
        file.finalize().unwrap();
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn read_bounded_spans_multiple_chunks() {
        let diag = Arc::new(RecordingDiagnostics::new());
        let data = vec![1u8; READ_CHUNK * 2 + 17];
        let mut file = input(&data, diag);
        let mut sink = Vec::new();
        let n = file
            .read_bounded_into(SizeLimit::Unlimited, &mut sink)
            .unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(sink, data);
        file.finalize().unwrap();
    }

    #[test]
    fn close_failure_is_reported() {
        let diag = Arc::new(RecordingDiagnostics::new());
        let file = InputFile::new(
            "/t",
            Box::new(CursorInput {
                data: Cursor::new(Vec::new()),
                fail_close: true,
            }),
            HandleIssuer::new(),
            diag.clone(),
        );
        assert!(file.finalize().is_err());
        assert_eq!(diag.messages(), vec!["backend error: close failed".to_string()]);
    }

    #[test]
    fn dropping_unclosed_handle_reports_leak() {
        let diag = Arc::new(RecordingDiagnostics::new());
        {
            let _file = input(b"x", diag.clone());
        }
        assert_eq!(
            diag.messages(),
            vec!["file handle dropped without close: /t".to_string()]
        );
    }

    #[test]
    fn output_write_and_errors() {
        let diag = Arc::new(RecordingDiagnostics::new());
        let data = Arc::new(Mutex::new(Vec::new()));
        let mut file = OutputFile::new(
            "/out",
            Box::new(VecOutput { data: data.clone() }),
            HandleIssuer::new(),
            diag.clone(),
        );
        file.write(b"ab").unwrap();
        file.write(b"cd").unwrap();
        file.flush().unwrap();
        assert!(file.set_world_readable().is_err());
        assert_eq!(file.filename(), Path::new("/out"));
        file.finalize().unwrap();
        assert_eq!(*data.lock().unwrap(), b"abcd");
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn issuer_identity_follows_clones() {
        let a = HandleIssuer::new();
        let b = HandleIssuer::new();
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
        let file = input(b"", Arc::new(RecordingDiagnostics::new()));
        assert!(!file.issuer().same_as(&a));
        file.finalize().unwrap();
    }

    #[test]
    fn handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<InputFile>();
        assert_send::<OutputFile>();
    }
}
