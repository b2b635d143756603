//! Reading the end of a log file.
//!
//! [`TailReader`] walks backward from the end in fixed-size chunks and stops
//! as soon as enough newlines have been seen, so memory use is bounded by the
//! requested lines rather than the file size.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ReaderConfig;
use crate::error::{LogError, Result};

/// Backward chunked reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailReader {
    chunk_bytes: usize,
}

impl Default for TailReader {
    fn default() -> Self {
        Self::new(ReaderConfig::default().chunk_bytes)
    }
}

impl TailReader {
    /// Creates a reader that reads `chunk_bytes` at a time (at least one byte).
    #[must_use]
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// Creates a reader from configuration.
    #[must_use]
    pub fn from_config(config: &ReaderConfig) -> Self {
        Self::new(config.chunk_bytes)
    }

    /// Returns up to `max_lines` final lines in file order.
    ///
    /// A trailing newline does not produce an empty last line, `\r` before a
    /// newline is stripped, and invalid UTF-8 is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or reading fails.
    pub fn tail<R: Read + Seek>(
        &self,
        reader: &mut R,
        max_lines: usize,
    ) -> io::Result<Vec<String>> {
        self.tail_until(reader, max_lines, || false)
    }

    /// Like [`TailReader::tail`], checking `cancel` before every chunk.
    ///
    /// # Errors
    ///
    /// - [`LogError::Cancelled`] if the token fires mid-read
    /// - [`LogError::Io`] if seeking or reading fails
    pub fn tail_cancellable<R: Read + Seek>(
        &self,
        reader: &mut R,
        max_lines: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        self.tail_until(reader, max_lines, || cancel.is_cancelled())
            .map_err(|e| {
                if e.kind() == io::ErrorKind::Interrupted {
                    LogError::Cancelled
                } else {
                    LogError::Io(e)
                }
            })
    }

    /// Tails `file` on the blocking pool, returning early when `cancel` fires.
    ///
    /// The file handle is released once the blocking read observes the
    /// cancellation, at most one chunk later.
    ///
    /// # Errors
    ///
    /// - [`LogError::Cancelled`] if the token fires first
    /// - [`LogError::Io`] if the read fails or the blocking task panics
    pub async fn tail_file(
        &self,
        file: File,
        max_lines: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(LogError::Cancelled);
        }
        let reader = *self;
        let token = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut file = file;
            reader.tail_cancellable(&mut file, max_lines, &token)
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(max_lines, "tail cancelled by caller");
                Err(LogError::Cancelled)
            }
            joined = task => joined.map_err(|e| LogError::Io(io::Error::other(e)))?,
        }
    }

    fn tail_until<R, F>(
        &self,
        reader: &mut R,
        max_lines: usize,
        stop: F,
    ) -> io::Result<Vec<String>>
    where
        R: Read + Seek,
        F: Fn() -> bool,
    {
        if max_lines == 0 {
            return Ok(Vec::new());
        }

        let mut pos = reader.seek(SeekFrom::End(0))?;
        let mut buf: Vec<u8> = Vec::new();
        let mut newlines = 0usize;

        // max_lines + 1 newlines guarantee max_lines complete lines even when
        // the file ends with a newline.
        while pos > 0 && newlines <= max_lines {
            if stop() {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "tail cancelled"));
            }
            let step = usize::try_from(pos).map_or(self.chunk_bytes, |p| p.min(self.chunk_bytes));
            pos -= step as u64;
            reader.seek(SeekFrom::Start(pos))?;

            let mut chunk = vec![0u8; step];
            reader.read_exact(&mut chunk)?;
            newlines += bytecount(&chunk);
            chunk.extend_from_slice(&buf);
            buf = chunk;
        }

        Ok(last_lines(&buf, max_lines))
    }
}

fn bytecount(chunk: &[u8]) -> usize {
    chunk.iter().filter(|&&b| b == b'\n').count()
}

fn last_lines(buf: &[u8], max_lines: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(buf);
    let mut segments: Vec<&str> = text.split('\n').collect();
    if segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }
    let start = segments.len().saturating_sub(max_lines);
    segments[start..]
        .iter()
        .map(|s| s.strip_suffix('\r').unwrap_or(s).to_string())
        .collect()
}

/// Yields each line of `reader` without its line terminator.
pub fn stream_lines<R>(reader: R) -> impl Stream<Item = io::Result<String>>
where
    R: AsyncRead + Unpin,
{
    futures::stream::unfold(BufReader::new(reader).lines(), |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(line), lines)),
            Ok(None) => None,
            Err(e) => Some((Err(e), lines)),
        }
    })
}
