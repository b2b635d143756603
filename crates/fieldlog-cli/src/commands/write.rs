//! Write command implementation.
//!
//! Feeds stdin into the rotating sink one line at a time and reports the
//! writer's counters when input ends.

use std::io::Write;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;

use fieldlog::{
    FsDiskSpace, LogService, RotatingWriter, WriteOutcome, WriterStatsSnapshot, stream_lines,
};
use futures::StreamExt;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay};

/// Handler for the write command.
pub struct WriteCommand<'a> {
    service: &'a LogService,
    sink: Option<Arc<RotatingWriter>>,
}

impl<'a> WriteCommand<'a> {
    /// Creates a new write command handler.
    ///
    /// `sink` is the writer already carrying this process's diagnostics, if
    /// any; without one the command opens its own and closes it when done.
    #[must_use]
    pub const fn new(service: &'a LogService, sink: Option<Arc<RotatingWriter>>) -> Self {
        Self { service, sink }
    }

    /// Executes the write command, reading lines from `input` until it ends
    /// or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns error if the sink cannot be opened, reading input fails, or
    /// the writer is closed.
    pub async fn execute<W, R>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        input: R,
        cancel: &CancellationToken,
    ) -> Result<(), CliError>
    where
        W: Write,
        R: AsyncRead + Unpin,
    {
        let (writer, owned) = match &self.sink {
            Some(sink) => (Arc::clone(sink), false),
            None => (Arc::new(self.service.open_writer(Arc::new(FsDiskSpace))?), true),
        };

        let mut report = WriteReport {
            path: writer.path().to_path_buf(),
            lines: 0,
            dropped_lines: 0,
            rotated: Vec::new(),
            stats: WriterStatsSnapshot::default(),
        };

        let mut lines = pin!(stream_lines(input));
        loop {
            let line = tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next() => line,
            };
            let Some(line) = line else { break };
            match writer.write_line(&line?)? {
                WriteOutcome::Written { rotated, .. } => {
                    report.lines += 1;
                    report.rotated.extend(rotated);
                }
                WriteOutcome::Dropped { .. } => report.dropped_lines += 1,
            }
        }

        if owned {
            writer.close()?;
        }
        report.stats = writer.stats().snapshot();
        debug!(
            lines = report.lines,
            dropped = report.dropped_lines,
            rotations = report.rotated.len(),
            "stdin drained into sink"
        );
        format.write(out, &report)
    }
}

/// Outcome of a write command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReport {
    /// Active log file.
    pub path: PathBuf,
    /// Lines persisted.
    pub lines: u64,
    /// Lines shed for lack of disk space.
    pub dropped_lines: u64,
    /// Archives created while writing.
    pub rotated: Vec<PathBuf>,
    /// Writer counters at the end of the run.
    pub stats: WriterStatsSnapshot,
}

impl TableDisplay for WriteReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Sink: {}", self.path.display())?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Lines written:    {}", self.lines)?;
        writeln!(writer, "Lines dropped:    {}", self.dropped_lines)?;
        writeln!(writer)?;
        writeln!(writer, "Writer")?;
        writeln!(writer, "  Bytes written:  {}", self.stats.bytes_written)?;
        writeln!(writer, "  Rotations:      {}", self.stats.rotations)?;
        writeln!(writer, "  Rotation fails: {}", self.stats.rotation_failures)?;
        writeln!(writer, "  Dropped writes: {}", self.stats.dropped_writes)?;
        writeln!(writer, "  Dropped bytes:  {}", self.stats.dropped_bytes)?;
        writeln!(writer, "  Cleanup passes: {}", self.stats.cleanup_passes)?;
        writeln!(writer, "  Probe failures: {}", self.stats.probe_failures)?;
        if !self.rotated.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Archives created")?;
            for path in &self.rotated {
                writeln!(writer, "  {}", path.display())?;
            }
        }
        Ok(())
    }
}
