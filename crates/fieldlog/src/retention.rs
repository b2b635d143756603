//! Bounded retention of rotated archives.
//!
//! The policy runs inside the writer's critical section, which may itself be
//! the sink for this process's tracing output, so it reports what it did via
//! [`CleanupReport`] instead of emitting events.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::catalog::{is_archive_of, parse_archive_name};

/// Keeps at most `keep` rotated archives of one active log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    dir: PathBuf,
    active_name: String,
    keep: usize,
}

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Archives deleted in this pass, oldest first.
    pub removed: Vec<PathBuf>,
    /// Archives remaining after the pass.
    pub retained: usize,
    /// Archives that could not be deleted.
    pub failed: Vec<PathBuf>,
}

impl RetentionPolicy {
    /// Creates a policy for `active_name` inside `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, active_name: impl Into<String>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            active_name: active_name.into(),
            keep,
        }
    }

    /// Directory the policy manages.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Maximum archives kept.
    #[must_use]
    pub const fn keep(&self) -> usize {
        self.keep
    }

    /// Rotated archives of the active log, oldest first. The active file is never listed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn archives(&self) -> io::Result<Vec<PathBuf>> {
        let mut archives: Vec<(SystemTime, String, u32, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)?.filter_map(std::result::Result::ok) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == self.active_name || !is_archive_of(&name, &self.active_name) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            // Equal mtimes fall back to the rotation stamp encoded in the name.
            let (stamp, seq) = parse_archive_name(&name)
                .map(|a| (a.timestamp.to_string(), a.seq))
                .unwrap_or_default();
            archives.push((modified, stamp, seq, entry.path()));
        }
        archives.sort();
        Ok(archives.into_iter().map(|(_, _, _, path)| path).collect())
    }

    /// Deletes the oldest archives until at most `keep` remain.
    ///
    /// Idempotent; files that vanish concurrently are counted as removed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory cannot be read.
    pub fn cleanup(&self) -> io::Result<CleanupReport> {
        let archives = self.archives()?;
        let excess = archives.len().saturating_sub(self.keep);
        let mut report = CleanupReport {
            retained: archives.len() - excess,
            ..CleanupReport::default()
        };

        for path in archives.into_iter().take(excess) {
            match remove_if_exists(&path) {
                Ok(()) => report.removed.push(path),
                Err(_) => report.failed.push(path),
            }
        }
        report.retained += report.failed.len();
        Ok(report)
    }
}

/// Deletes `path`, treating an already-missing file as success.
///
/// # Errors
///
/// Returns any removal error other than "not found".
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
