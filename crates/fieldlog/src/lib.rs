//! # fieldlog
//!
//! Log lifecycle and safe retrieval for devices that write logs locally and
//! to removable volumes.
//!
//! This crate provides:
//!
//! - [`MountScanRegistry`]: trusted log roots, local and on mounted volumes
//! - [`RootSandbox`]: containment check in front of every read
//! - [`FsCatalog`]: log inventory and name resolution across roots
//! - [`RotatingWriter`]: size-rotated sink that sheds writes on low disk
//! - [`RetentionPolicy`]: keeps the newest K rotated archives
//! - [`TailReader`]: last N lines via bounded backward reads
//! - [`normalize`]: bracketed or JSON lines to uniform records
//! - [`ArchiveBundler`]: backpressured zip streaming
//! - [`LogService`]: list, tail and download on one root snapshot
//!
//! ## Example
//!
//! ```rust
//! use fieldlog::{NormalizedLine, normalize};
//!
//! let line = normalize("[2025-09-19 04:37:38,155] [ERROR] Modbus::ReadInt: Read timeout");
//! let NormalizedLine::Parsed { time, level, module, message, .. } = line else {
//!     panic!("bracketed line");
//! };
//! assert_eq!(time, "2025-09-19T04:37:38.155Z");
//! assert_eq!(level, "error");
//! assert_eq!(module, "Modbus");
//! assert_eq!(message, "Read timeout");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bundle;
pub mod catalog;
pub mod config;
pub mod disk;
pub mod error;
pub mod normalize;
pub mod retention;
pub mod roots;
pub mod sandbox;
pub mod service;
pub mod tail;
pub mod traits;
pub mod types;
pub mod writer;

// Re-export main types
pub use bundle::{ArchiveBundler, ArchiveStream, BundleEntry, BundleSummary, SkippedEntry};
pub use catalog::{FsCatalog, archive_name_for, is_archive_name, looks_like_log};
pub use config::{
    ArchiveConfig, CatalogConfig, FieldlogConfig, ReaderConfig, RootsConfig, WriterConfig,
};
pub use disk::{FixedDiskSpace, FsDiskSpace};
pub use error::{ErrorBody, LogError, Result};
pub use normalize::{NormalizedLine, normalize, normalize_all};
pub use retention::{CleanupReport, RetentionPolicy};
pub use roots::{MountScanRegistry, StaticRoots, choose_sink_dir};
pub use sandbox::{RootSandbox, is_contained};
pub use service::{LogService, TailOutput, TailRequest};
pub use tail::{TailReader, stream_lines};
pub use traits::{DiskSpace, LogCatalog, RootRegistry, Sandbox};
pub use types::{
    FileSelector, LogFileInfo, LogListing, Root, RootKind, TailFormat, archive_file_name,
    human_size,
};
pub use writer::{RotatingWriter, WriteOutcome, WriterStats, WriterStatsSnapshot};
