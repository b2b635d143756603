//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use fieldlog::FileSelector;

/// fieldlog - device log lifecycle and retrieval.
#[derive(Parser, Debug, Clone)]
#[command(name = "fieldlog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML). Built-in defaults apply when absent.
    #[arg(short, long, env = "FIELDLOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Default log filter, overridden by `RUST_LOG`.
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Send this process's own diagnostics through the rotating sink.
    #[arg(long)]
    pub log_to_sink: bool,

    /// Emit diagnostics as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the registered log roots.
    Roots,

    /// List log files across every root, newest first.
    List(ListArgs),

    /// Print the last lines of a log file.
    Tail(TailArgs),

    /// Write a zip of selected log files.
    Download(DownloadArgs),

    /// Write a zip of every log file, grouped by root.
    DownloadAll(OutputArgs),

    /// Append stdin, line by line, to the rotating sink.
    Write,

    /// Print the default configuration as TOML.
    InitConfig,
}

impl Commands {
    /// Name as typed on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Roots => "roots",
            Self::List(_) => "list",
            Self::Tail(_) => "tail",
            Self::Download(_) => "download",
            Self::DownloadAll(_) => "download-all",
            Self::Write => "write",
            Self::InitConfig => "init-config",
        }
    }
}

/// Arguments for the list command.
#[derive(Parser, Debug, Clone, Default)]
pub struct ListArgs {
    /// Include rotated archives.
    #[arg(short, long)]
    pub all: bool,
}

/// Arguments for the tail command.
#[derive(Parser, Debug, Clone)]
pub struct TailArgs {
    /// Base file name, e.g. `api.log`.
    pub name: String,

    /// Root holding the file (see `fieldlog roots`).
    #[arg(short, long)]
    pub root: Option<String>,

    /// Number of lines; the configured default applies when omitted.
    #[arg(short = 'n', long)]
    pub lines: Option<usize>,

    /// Print lines as written instead of normalized records.
    #[arg(long)]
    pub raw: bool,
}

/// Arguments for the download command.
#[derive(Parser, Debug, Clone)]
pub struct DownloadArgs {
    /// Files as `name@root`.
    #[arg(required = true, value_parser = parse_selector)]
    pub files: Vec<FileSelector>,

    /// Archive destination.
    #[command(flatten)]
    pub output: OutputArgs,
}

/// Where an archive goes.
#[derive(Parser, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Output file, or `-` for stdout. Defaults to `logs_<timestamp>.zip`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Parses `name@root`. A bare name keeps its root empty and is rejected
/// later as ambiguous.
pub fn parse_selector(value: &str) -> Result<FileSelector, String> {
    match value.rsplit_once('@') {
        Some((name, root)) if !name.is_empty() && !root.is_empty() => {
            Ok(FileSelector::new(name, root))
        }
        Some(_) => Err(format!("expected name@root, got {value:?}")),
        None if value.is_empty() => Err("file name must not be empty".to_string()),
        None => Ok(FileSelector {
            name: value.to_string(),
            root_id: None,
        }),
    }
}
