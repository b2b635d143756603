//! Size-rotated active log sink.
//!
//! This module provides:
//! - [`RotatingWriter`]: appends to the active file, rotating it to a
//!   timestamped archive once the next write would cross the size threshold
//! - [`WriterStats`]: counters observable while the writer is in use
//!
//! The writer may be the destination of this process's own tracing output
//! (it implements [`MakeWriter`]), so nothing on the write path emits events.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing_subscriber::fmt::MakeWriter;

use crate::catalog::archive_name_for;
use crate::config::WriterConfig;
use crate::error::{LogError, Result};
use crate::retention::RetentionPolicy;
use crate::traits::DiskSpace;
use crate::types::compact_timestamp;

/// Result of a single write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The bytes were appended, possibly after rotating the previous file.
    Written {
        /// Bytes persisted.
        bytes: usize,
        /// Archive the previous file was renamed to, if this write rotated.
        rotated: Option<PathBuf>,
    },
    /// Headroom stayed below the minimum after cleanup; nothing was persisted.
    Dropped {
        /// Bytes free on the volume.
        available: u64,
        /// Configured minimum.
        required: u64,
    },
}

impl WriteOutcome {
    /// Bytes that reached the file.
    #[must_use]
    pub const fn persisted(&self) -> usize {
        match self {
            Self::Written { bytes, .. } => *bytes,
            Self::Dropped { .. } => 0,
        }
    }

    /// Converts a dropped write into [`LogError::ResourceExhausted`].
    ///
    /// # Errors
    ///
    /// Returns an error if the write was dropped.
    pub fn into_result(self) -> Result<usize> {
        match self {
            Self::Written { bytes, .. } => Ok(bytes),
            Self::Dropped {
                available,
                required,
            } => Err(LogError::ResourceExhausted {
                available,
                required,
            }),
        }
    }
}

/// Live counters for a [`RotatingWriter`].
#[derive(Debug, Default)]
pub struct WriterStats {
    bytes_written: AtomicU64,
    rotations: AtomicU64,
    rotation_failures: AtomicU64,
    dropped_writes: AtomicU64,
    dropped_bytes: AtomicU64,
    cleanup_passes: AtomicU64,
    probe_failures: AtomicU64,
}

/// Point-in-time copy of [`WriterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterStatsSnapshot {
    /// Bytes appended across all files.
    pub bytes_written: u64,
    /// Completed rotations.
    pub rotations: u64,
    /// Rotations that failed and left the current file in place.
    pub rotation_failures: u64,
    /// Writes shed for low disk space.
    pub dropped_writes: u64,
    /// Bytes in shed writes.
    pub dropped_bytes: u64,
    /// Retention passes run, after rotation or under disk pressure.
    pub cleanup_passes: u64,
    /// Disk probes that failed; such writes proceed.
    pub probe_failures: u64,
}

impl WriterStats {
    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> WriterStatsSnapshot {
        WriterStatsSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            rotation_failures: self.rotation_failures.load(Ordering::Relaxed),
            dropped_writes: self.dropped_writes.load(Ordering::Relaxed),
            dropped_bytes: self.dropped_bytes.load(Ordering::Relaxed),
            cleanup_passes: self.cleanup_passes.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

enum SinkState {
    Open { file: File, bytes: u64 },
    /// The handle was lost during a failed rotation; the next write reopens it.
    Detached,
    Closed,
}

struct Sink {
    state: SinkState,
    /// Stamp and sequence of the most recent archive, for same-second rotations.
    last_archive: Option<(String, u32)>,
}

/// Exclusive owner of the active log file.
///
/// Writes, rotations and shutdown are serialized by one mutex, so no two
/// rotations can interleave and a rotation never splits a write.
pub struct RotatingWriter {
    dir: PathBuf,
    path: PathBuf,
    file_name: String,
    max_file_bytes: u64,
    min_free_bytes: u64,
    retention: RetentionPolicy,
    disk: Arc<dyn DiskSpace>,
    sink: Mutex<Sink>,
    stats: WriterStats,
}

impl std::fmt::Debug for RotatingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("path", &self.path)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("min_free_bytes", &self.min_free_bytes)
            .field("keep", &self.retention.keep())
            .finish_non_exhaustive()
    }
}

impl RotatingWriter {
    /// Opens (or creates) the active file `config.file_name` inside `dir`.
    ///
    /// Existing content is kept and counts toward the rotation threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn open(
        dir: impl Into<PathBuf>,
        config: &WriterConfig,
        disk: Arc<dyn DiskSpace>,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let path = dir.join(&config.file_name);
        let state = open_append(&path)?;

        Ok(Self {
            retention: RetentionPolicy::new(&dir, &config.file_name, config.max_archives),
            dir,
            path,
            file_name: config.file_name.clone(),
            max_file_bytes: config.max_file_bytes,
            min_free_bytes: config.min_free_bytes,
            disk,
            sink: Mutex::new(Sink {
                state,
                last_archive: None,
            }),
            stats: WriterStats::default(),
        })
    }

    /// Path of the active file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the active file and its archives.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Retention applied after each rotation.
    #[must_use]
    pub const fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Live counters.
    #[must_use]
    pub const fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Bytes in the active file since it was opened, or `None` once closed.
    #[must_use]
    pub fn current_size(&self) -> Option<u64> {
        match &self.sink.lock().state {
            SinkState::Open { bytes, .. } => Some(*bytes),
            SinkState::Detached => Some(0),
            SinkState::Closed => None,
        }
    }

    /// Whether [`RotatingWriter::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.sink.lock().state, SinkState::Closed)
    }

    /// Appends `buf` to the active file.
    ///
    /// Headroom is probed first; below the minimum a cleanup pass runs and, if
    /// headroom is still short, the write is dropped and reported as
    /// [`WriteOutcome::Dropped`]. The file rotates when the current size plus
    /// `buf` would exceed the threshold; an empty file never rotates.
    ///
    /// # Errors
    ///
    /// - [`LogError::WriterClosed`] after [`RotatingWriter::close`]
    /// - [`LogError::Io`] if the file cannot be reopened or written
    pub fn write_bytes(&self, buf: &[u8]) -> Result<WriteOutcome> {
        let mut sink = self.sink.lock();
        if matches!(sink.state, SinkState::Closed) {
            return Err(LogError::WriterClosed);
        }

        if let Err(available) = self.ensure_headroom() {
            WriterStats::bump(&self.stats.dropped_writes, 1);
            WriterStats::bump(&self.stats.dropped_bytes, buf.len() as u64);
            return Ok(WriteOutcome::Dropped {
                available,
                required: self.min_free_bytes,
            });
        }

        if matches!(sink.state, SinkState::Detached) {
            sink.state = open_append(&self.path)?;
        }

        let len = buf.len() as u64;
        let needs_rotation = matches!(
            sink.state,
            SinkState::Open { bytes, .. } if bytes > 0 && bytes + len > self.max_file_bytes
        );
        let rotated = if needs_rotation {
            self.rotate_locked(&mut sink)
        } else {
            None
        };
        if matches!(sink.state, SinkState::Detached) {
            sink.state = open_append(&self.path)?;
        }

        let SinkState::Open { file, bytes } = &mut sink.state else {
            return Err(LogError::WriterClosed);
        };
        file.write_all(buf)?;
        *bytes += len;
        WriterStats::bump(&self.stats.bytes_written, len);

        Ok(WriteOutcome::Written {
            bytes: buf.len(),
            rotated,
        })
    }

    /// Appends `line`, adding a trailing newline if it has none.
    ///
    /// # Errors
    ///
    /// See [`RotatingWriter::write_bytes`].
    pub fn write_line(&self, line: &str) -> Result<WriteOutcome> {
        if line.ends_with('\n') {
            self.write_bytes(line.as_bytes())
        } else {
            let mut owned = String::with_capacity(line.len() + 1);
            owned.push_str(line);
            owned.push('\n');
            self.write_bytes(owned.as_bytes())
        }
    }

    /// Rotates now, regardless of size. Returns the archive path, or `None`
    /// if the active file was empty or rotation failed.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::WriterClosed`] after shutdown.
    pub fn rotate(&self) -> Result<Option<PathBuf>> {
        let mut sink = self.sink.lock();
        let rotatable = match &sink.state {
            SinkState::Closed => return Err(LogError::WriterClosed),
            SinkState::Open { bytes, .. } => *bytes > 0,
            SinkState::Detached => false,
        };
        Ok(if rotatable {
            self.rotate_locked(&mut sink)
        } else {
            None
        })
    }

    /// Flushes and closes the active file. Later writes fail with
    /// [`LogError::WriterClosed`]; closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails. The writer is closed regardless.
    pub fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock();
        let previous = std::mem::replace(&mut sink.state, SinkState::Closed);
        if let SinkState::Open { file, .. } = previous {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Probes headroom, running one cleanup pass when short. `Err` carries the
    /// remaining free bytes when the write must be shed.
    fn ensure_headroom(&self) -> std::result::Result<(), u64> {
        match self.disk.available_bytes(&self.dir) {
            Ok(available) if available >= self.min_free_bytes => return Ok(()),
            Ok(_) => {}
            Err(_) => {
                WriterStats::bump(&self.stats.probe_failures, 1);
                return Ok(());
            }
        }

        self.run_cleanup();

        match self.disk.available_bytes(&self.dir) {
            Ok(available) if available < self.min_free_bytes => Err(available),
            Ok(_) => Ok(()),
            Err(_) => {
                WriterStats::bump(&self.stats.probe_failures, 1);
                Ok(())
            }
        }
    }

    fn run_cleanup(&self) {
        WriterStats::bump(&self.stats.cleanup_passes, 1);
        // Failures leave archives in place; the next pass retries them.
        let _ = self.retention.cleanup();
    }

    /// Close, rename, reopen, clean up. On failure the current file stays
    /// active and the failure is counted.
    fn rotate_locked(&self, sink: &mut Sink) -> Option<PathBuf> {
        let SinkState::Open { file, bytes } =
            std::mem::replace(&mut sink.state, SinkState::Detached)
        else {
            return None;
        };

        if file.sync_all().is_err() {
            WriterStats::bump(&self.stats.rotation_failures, 1);
            sink.state = SinkState::Open { file, bytes };
            return None;
        }
        drop(file);

        let (archive, stamp, seq) = self.next_archive(sink.last_archive.as_ref());
        if fs::rename(&self.path, &archive).is_err() {
            WriterStats::bump(&self.stats.rotation_failures, 1);
            sink.state = open_append(&self.path).unwrap_or(SinkState::Detached);
            return None;
        }
        sink.last_archive = Some((stamp, seq));

        sink.state = match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            Ok(file) => SinkState::Open { file, bytes: 0 },
            Err(_) => SinkState::Detached,
        };
        WriterStats::bump(&self.stats.rotations, 1);

        self.run_cleanup();
        Some(archive)
    }

    fn next_archive(&self, last: Option<&(String, u32)>) -> (PathBuf, String, u32) {
        let stamp = compact_timestamp(Utc::now());
        let mut seq = match last {
            Some((last_stamp, last_seq)) if *last_stamp == stamp => last_seq + 1,
            _ => 0,
        };
        loop {
            let candidate = self.dir.join(archive_name_for(&self.file_name, &stamp, seq));
            if !candidate.exists() {
                return (candidate, stamp, seq);
            }
            seq += 1;
        }
    }
}

fn open_append(path: &Path) -> io::Result<SinkState> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let bytes = file.metadata()?.len();
    Ok(SinkState::Open { file, bytes })
}

impl Write for &RotatingWriter {
    /// Reports the whole buffer as written even when it was shed, so callers
    /// such as tracing layers never retry into a full disk.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_bytes(buf) {
            Ok(_) => Ok(buf.len()),
            Err(LogError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for RotatingWriter {
    type Writer = &'a Self;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}
