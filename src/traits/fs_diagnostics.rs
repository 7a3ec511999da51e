//! Access to a backend's diagnostic sink.

use crate::Diagnostics;

/// Exposes the sink a backend reports failures to, so the composite layer
/// reports to the same place.
pub trait FsDiagnostics: Send + Sync {
    /// The backend's diagnostic sink.
    fn diagnostics(&self) -> &dyn Diagnostics;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_diagnostics_is_object_safe() {
        fn _check(_: &dyn FsDiagnostics) {}
    }
}
