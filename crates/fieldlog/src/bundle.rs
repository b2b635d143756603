//! Streaming zip archives of log files.
//!
//! A producer on the blocking pool writes zip entries into one half of a
//! bounded in-memory pipe; the caller consumes the other half as a byte
//! stream. A stalled consumer blocks the producer once the pipe is full, and
//! dropping the stream stops the producer.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{Datelike, Timelike, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::config::ArchiveConfig;
use crate::error::{LogError, Result};
use crate::traits::Sandbox;

const COPY_CHUNK: usize = 64 * 1024;

/// One file to place in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// File to read.
    pub source: PathBuf,
    /// Slash-separated name inside the archive.
    pub archive_name: String,
}

impl BundleEntry {
    /// Creates an entry with an explicit in-archive name.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, archive_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            archive_name: archive_name.into(),
        }
    }

    /// Names the entry `<label>/<base name>`.
    #[must_use]
    pub fn labelled(source: impl Into<PathBuf>, label: &str) -> Self {
        let source = source.into();
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            archive_name: format!("{label}/{base}"),
            source,
        }
    }

    /// Names the entry `<label>/<path relative to base>`, falling back to the
    /// base name when `source` is not beneath `base`.
    #[must_use]
    pub fn relative_to(source: impl Into<PathBuf>, base: &Path, label: &str) -> Self {
        let source = source.into();
        let Ok(rel) = source.strip_prefix(base) else {
            return Self::labelled(source, label);
        };
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Self {
            archive_name: format!("{label}/{}", rel.join("/")),
            source,
        }
    }
}

/// An entry left out of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedEntry {
    /// Name the entry would have had.
    pub archive_name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// What the producer put in an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleSummary {
    /// Names written, in order.
    pub written: Vec<String>,
    /// Entries skipped because they could not be opened or read.
    pub skipped: Vec<SkippedEntry>,
}

/// Builds zip archives from sandboxed files.
pub struct ArchiveBundler {
    sandbox: Arc<dyn Sandbox>,
    pipe_capacity: usize,
}

impl ArchiveBundler {
    /// Creates a bundler that opens files through `sandbox`.
    #[must_use]
    pub fn new(sandbox: Arc<dyn Sandbox>, config: &ArchiveConfig) -> Self {
        Self {
            sandbox,
            pipe_capacity: config.pipe_capacity.max(1),
        }
    }

    /// Starts streaming an archive of `entries`.
    ///
    /// Entries that cannot be opened are logged and skipped. An entry whose
    /// source fails mid-read is cut short in the archive and also reported as
    /// skipped. The
    /// producer stops at the next entry or chunk once `cancel` fires or the
    /// returned stream is dropped.
    ///
    /// # Errors
    ///
    /// - [`LogError::EmptyArchive`] if `entries` is empty
    /// - [`LogError::Cancelled`] if `cancel` has already fired
    /// - [`LogError::Io`] if called outside a Tokio runtime
    pub fn bundle(
        &self,
        entries: Vec<BundleEntry>,
        cancel: &CancellationToken,
    ) -> Result<ArchiveStream> {
        if entries.is_empty() {
            return Err(LogError::EmptyArchive);
        }
        if cancel.is_cancelled() {
            return Err(LogError::Cancelled);
        }
        let handle = Handle::try_current().map_err(io::Error::other)?;

        let (writer, reader) = tokio::io::duplex(self.pipe_capacity);
        let token = cancel.child_token();
        let producer_token = token.clone();
        let sandbox = Arc::clone(&self.sandbox);
        let bridge_handle = handle.clone();

        let producer = handle.spawn_blocking(move || {
            let sink = SyncIoBridge::new_with_handle(writer, bridge_handle);
            produce(
                entries,
                |path| open_source(sandbox.as_ref(), path),
                sink,
                &producer_token,
            )
        });

        Ok(ArchiveStream {
            inner: ReaderStream::with_capacity(reader, self.pipe_capacity),
            producer,
            _guard: token.drop_guard(),
        })
    }
}

/// Zip bytes as they are produced.
///
/// Dropping the stream cancels the producer.
pub struct ArchiveStream {
    inner: ReaderStream<DuplexStream>,
    producer: JoinHandle<Result<BundleSummary>>,
    _guard: DropGuard,
}

impl std::fmt::Debug for ArchiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStream").finish_non_exhaustive()
    }
}

impl Stream for ArchiveStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl ArchiveStream {
    /// Copies the whole archive into `out`, then reports what it contains.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails or the producer failed.
    pub async fn write_to<W>(mut self, out: &mut W) -> Result<BundleSummary>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(chunk) = self.inner.next().await {
            out.write_all(&chunk?).await?;
        }
        out.flush().await?;
        self.finish().await
    }

    /// Waits for the producer and returns its summary.
    ///
    /// Call after draining the stream; the producer cannot finish while the
    /// pipe is full.
    ///
    /// # Errors
    ///
    /// Returns the producer's error, or [`LogError::Io`] if it panicked.
    pub async fn finish(self) -> Result<BundleSummary> {
        self.producer
            .await
            .map_err(|e| LogError::Io(io::Error::other(e)))?
    }
}

/// An opened entry source.
struct Source<R> {
    reader: R,
    len: u64,
    modified: Option<SystemTime>,
}

fn open_source(sandbox: &dyn Sandbox, path: &Path) -> Result<Source<File>> {
    let file = sandbox.open(path)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(LogError::Io(io::Error::other("not a regular file")));
    }
    Ok(Source {
        len: meta.len(),
        modified: meta.modified().ok(),
        reader: file,
    })
}

fn produce<R, W, F>(
    entries: Vec<BundleEntry>,
    mut open: F,
    sink: W,
    cancel: &CancellationToken,
) -> Result<BundleSummary>
where
    R: Read,
    W: Write,
    F: FnMut(&Path) -> Result<Source<R>>,
{
    let mut zip = zip::ZipWriter::new_stream(sink);
    let mut summary = BundleSummary::default();
    let mut used: HashSet<String> = HashSet::new();

    for entry in entries {
        if cancel.is_cancelled() {
            debug!(written = summary.written.len(), "archive cancelled between entries");
            return Err(LogError::Cancelled);
        }

        let mut source = match open(&entry.source) {
            Ok(source) => source,
            Err(e) => {
                if e.is_not_found() {
                    debug!(path = %entry.source.display(), "archive entry vanished");
                } else {
                    warn!(
                        path = %entry.source.display(),
                        error = %e,
                        "skipping archive entry"
                    );
                }
                summary.skipped.push(SkippedEntry {
                    archive_name: entry.archive_name,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let name = unique_name(&entry.archive_name, &mut used);
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644)
            .large_file(source.len >= u64::from(u32::MAX));
        if let Some(mtime) = source.modified.and_then(zip_time) {
            options = options.last_modified_time(mtime);
        }

        zip.start_file(name.clone(), options)
            .map_err(|e| sink_error(e.into(), cancel))?;
        match copy_entry(&mut source.reader, &mut zip, cancel)? {
            Copied::Complete(bytes) => {
                debug!(entry = %name, bytes, "archive entry written");
                summary.written.push(name);
            }
            // Bytes already streamed cannot be taken back; the entry is closed
            // short and reported as skipped.
            Copied::Truncated { bytes, error } => {
                warn!(
                    path = %entry.source.display(),
                    bytes,
                    error = %error,
                    "source read failed; entry truncated"
                );
                summary.skipped.push(SkippedEntry {
                    archive_name: name,
                    reason: format!("read failed after {bytes} bytes: {error}"),
                });
            }
        }
    }

    zip.finish().map_err(|e| sink_error(e.into(), cancel))?;
    info!(
        entries = summary.written.len(),
        skipped = summary.skipped.len(),
        "archive complete"
    );
    Ok(summary)
}

/// How far one source was copied.
#[derive(Debug)]
enum Copied {
    Complete(u64),
    Truncated { bytes: u64, error: io::Error },
}

/// Copies one source into the open entry. A source read error ends the
/// entry early; a sink error aborts the archive.
fn copy_entry<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    cancel: &CancellationToken,
) -> Result<Copied> {
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(LogError::Cancelled);
        }
        let n = match source.read(&mut buf) {
            Ok(0) => return Ok(Copied::Complete(copied)),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                return Ok(Copied::Truncated {
                    bytes: copied,
                    error,
                });
            }
        };
        sink.write_all(&buf[..n])
            .map_err(|e| sink_error(LogError::Io(e), cancel))?;
        copied += n as u64;
    }
}

fn sink_error(err: LogError, cancel: &CancellationToken) -> LogError {
    if cancel.is_cancelled() {
        LogError::Cancelled
    } else {
        debug!(error = %err, "archive consumer went away");
        err
    }
}

/// Returns `name`, or `name` with `-N` before its extension if already used.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let dir_end = name.rfind('/').map_or(0, |i| i + 1);
    let (stem, ext) = match name[dir_end..].rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dir_end + dot),
        _ => (name, ""),
    };
    let mut n = 2u32;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn zip_time(modified: SystemTime) -> Option<zip::DateTime> {
    let ts: chrono::DateTime<Utc> = modified.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(ts.year()).ok()?,
        u8::try_from(ts.month()).ok()?,
        u8::try_from(ts.day()).ok()?,
        u8::try_from(ts.hour()).ok()?,
        u8::try_from(ts.minute()).ok()?,
        u8::try_from(ts.second()).ok()?,
    )
    .ok()
}
