//! Disk headroom probes.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::traits::DiskSpace;

/// Probe backed by `statvfs` (via `fs2`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDiskSpace;

impl DiskSpace for FsDiskSpace {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Probe reporting a settable value; used for embedding and tests.
#[derive(Debug, Default)]
pub struct FixedDiskSpace {
    available: AtomicU64,
}

impl FixedDiskSpace {
    /// Creates a probe that reports `available` bytes.
    #[must_use]
    pub const fn new(available: u64) -> Self {
        Self {
            available: AtomicU64::new(available),
        }
    }

    /// Changes the reported value.
    pub fn set(&self, available: u64) {
        self.available.store(available, Ordering::Release);
    }
}

impl DiskSpace for FixedDiskSpace {
    fn available_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.available.load(Ordering::Acquire))
    }
}
