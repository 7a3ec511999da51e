//! # Layer Trait
//!
//! Tower-style wrapping of one backend by another.
//!
//! ## Overview
//!
//! A [`Layer`] holds configuration and turns a backend into a wrapped
//! backend. The wrapper implements the primitive traits by delegating to the
//! inner backend, adding its own behavior on the way. The crate uses this
//! for [`FaultLayer`](crate::FaultLayer), which makes selected primitives
//! fail on demand.
//!
//! ```text
//! Backend ──▶ Layer::layer() ──▶ Wrapped Backend
//! ```
//!
//! ## Example
//!
//! ```rust
//! use artifact_fs::{Fault, FaultLayer, FileSystemExt, LayerExt, MemFileSystem};
//! use std::path::Path;
//!
//! let fs = MemFileSystem::new().layer(FaultLayer::new().fail(Fault::MakeDir));
//! assert!(fs.recursively_make_dir(Path::new("/a")).is_err());
//!
//! fs.clear(Fault::MakeDir);
//! assert!(fs.recursively_make_dir(Path::new("/a")).is_ok());
//! ```

use crate::FileSystem;

/// A layer that wraps a backend.
///
/// # Design Notes
///
/// - `layer(self, backend)` consumes both the layer and the backend
/// - The resulting `Backend` should implement [`FileSystem`] whenever `B` does
pub trait Layer<B> {
    /// The wrapped backend type.
    type Backend;

    /// Wrap `backend`.
    fn layer(self, backend: B) -> Self::Backend;
}

/// Fluent `.layer()` on any backend.
pub trait LayerExt: FileSystem + Sized {
    /// Apply a layer to this backend.
    fn layer<L: Layer<Self>>(self, layer: L) -> L::Backend {
        layer.layer(self)
    }
}

// Blanket implementation - any backend gets LayerExt for free
impl<B: FileSystem> LayerExt for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileSystemExt, FsStat, MemFileSystem};
    use std::path::Path;

    struct Renamed<B> {
        inner: B,
    }

    struct RenameLayer;

    impl<B: FileSystem> Layer<B> for RenameLayer {
        type Backend = Renamed<B>;

        fn layer(self, backend: B) -> Self::Backend {
            Renamed { inner: backend }
        }
    }

    #[test]
    fn layer_ext_is_auto_implemented() {
        fn _check<B: FileSystem + LayerExt>() {}
        _check::<MemFileSystem>();
    }

    #[test]
    fn layer_wraps_backend() {
        let fs = MemFileSystem::new();
        fs.recursively_make_dir(Path::new("/kept")).unwrap();
        let wrapped = fs.layer(RenameLayer);
        assert!(wrapped.inner.is_dir(Path::new("/kept")).is_true());
    }
}
