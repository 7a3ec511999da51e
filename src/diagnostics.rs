//! Diagnostic sinks.
//!
//! Every failure detected by a backend or by the composite layer is handed to
//! a [`Diagnostics`] sink before it is returned. Sinks only observe; nothing
//! in this crate retries based on what a sink does.

use std::sync::Mutex;

use crate::FsError;

/// Receives a description of every failure before it reaches the caller.
///
/// # Thread Safety
///
/// Sinks are shared between a backend and the handles it issues, so they must
/// be `Send + Sync`.
pub trait Diagnostics: Send + Sync {
    /// Record a failure.
    fn report(&self, error: &FsError);
}

/// Forwards failures to `tracing` as `warn` events. This is the default sink
/// of the bundled backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, error: &FsError) {
        tracing::warn!(error = %error, "filesystem operation failed");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn report(&self, _error: &FsError) {}
}

/// Keeps the rendered text of every reported failure. Mostly useful in tests.
///
/// ```rust
/// use artifact_fs::{Diagnostics, FsError, RecordingDiagnostics};
/// use std::path::PathBuf;
///
/// let sink = RecordingDiagnostics::new();
/// sink.report(&FsError::NotFound { path: PathBuf::from("/a") });
/// assert_eq!(sink.messages(), vec!["not found: /a".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    messages: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Number of reported failures.
    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything reported so far.
    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&self, error: &FsError) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(error.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn diagnostics_is_object_safe() {
        fn _check(_: &dyn Diagnostics) {}
    }

    #[test]
    fn recording_keeps_order() {
        let sink = RecordingDiagnostics::new();
        sink.report(&FsError::NotFound {
            path: PathBuf::from("/a"),
        });
        sink.report(&FsError::NotADirectory {
            path: PathBuf::from("/b"),
        });
        assert_eq!(
            sink.messages(),
            vec!["not found: /a".to_string(), "not a directory: /b".to_string()]
        );
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn recording_clear() {
        let sink = RecordingDiagnostics::new();
        sink.report(&FsError::Backend("boom".into()));
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn null_and_tracing_accept_reports() {
        let err = FsError::Backend("boom".into());
        NullDiagnostics.report(&err);
        TracingDiagnostics.report(&err);
    }
}
