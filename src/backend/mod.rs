//! # Backends
//!
//! | Backend | Storage | Stale-lock breaking | `size` means |
//! |---------|---------|---------------------|--------------|
//! | [`MemFileSystem`] | shared in-process table | yes | logical length |
//! | [`DiskFileSystem`] | host filesystem | yes, marker file mtime | allocated bytes (Unix) |
//! | [`FaultyFileSystem`] | wraps another backend | no | as the inner backend |

mod disk;
mod faulty;
mod memory;

pub use disk::{DEFAULT_MAX_PATH_LENGTH, DiskFileSystem};
pub use faulty::{Fault, FaultLayer, FaultyFileSystem};
pub use memory::MemFileSystem;
