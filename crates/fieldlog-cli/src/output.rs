//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use fieldlog::{LogListing, Root, RootKind};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Registered roots for display.
#[derive(Debug, Clone, Serialize)]
pub struct RootList {
    /// Roots in registry order.
    pub roots: Vec<Root>,
}

impl TableDisplay for RootList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.roots.is_empty() {
            writeln!(writer, "No log roots found")?;
            return Ok(());
        }

        writeln!(writer, "{:<16}  {:<10}  PATH", "ID", "KIND")?;
        writeln!(writer, "{}", "─".repeat(64))?;
        for root in &self.roots {
            let kind = match root.kind {
                RootKind::Local => "local",
                RootKind::Removable => "removable",
            };
            writeln!(
                writer,
                "{:<16}  {:<10}  {}",
                truncate(&root.id, 16),
                kind,
                root.path.display()
            )?;
        }
        Ok(())
    }
}

/// Log files for display.
#[derive(Debug, Clone, Serialize)]
pub struct LogList {
    /// Files, newest first.
    pub files: Vec<LogListing>,
}

impl TableDisplay for LogList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.files.is_empty() {
            writeln!(writer, "No log files")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<32}  {:<12}  {:>10}  {:<20}  DIR",
            "NAME", "ROOT", "SIZE", "MODIFIED"
        )?;
        writeln!(writer, "{}", "─".repeat(96))?;
        for file in &self.files {
            writeln!(
                writer,
                "{:<32}  {:<12}  {:>10}  {:<20}  {}",
                truncate(&file.name, 32),
                truncate(&file.root, 12),
                file.human_size,
                file.modified_at,
                file.dir.display()
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} file(s)", self.files.len())?;
        Ok(())
    }
}

/// Shortens `s` to at most `max_len` characters, marking the cut with `...`.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let head: String = s.chars().take(keep).collect();
    if max_len > 3 {
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
