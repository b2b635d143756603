//! Core data types shared by the catalog, readers and the service facade.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the root that sits beside the running binary.
pub const LOCAL_ROOT_ID: &str = "local";

/// Where a root was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    /// The directory adjacent to the installed binary.
    Local,
    /// A directory found on a mounted removable volume.
    Removable,
}

/// A registered top-level directory trusted as a source and sink of log files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Root {
    /// Stable identifier callers pass back to disambiguate lookups.
    pub id: String,
    /// Absolute path of the root directory.
    pub path: PathBuf,
    /// How the root was discovered.
    pub kind: RootKind,
}

impl Root {
    /// Creates the local root.
    #[must_use]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            id: LOCAL_ROOT_ID.to_string(),
            path: path.into(),
            kind: RootKind::Local,
        }
    }

    /// Creates a removable-volume root.
    #[must_use]
    pub fn removable(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            kind: RootKind::Removable,
        }
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.path.display())
    }
}

/// Point-in-time snapshot of a log file found under a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFileInfo {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Base file name.
    pub name: String,
    /// Containing directory.
    pub dir: PathBuf,
    /// Size in bytes at discovery time.
    pub size: u64,
    /// Last modification time at discovery time.
    pub modified_at: DateTime<Utc>,
    /// Identifier of the root the file was found under.
    pub root_id: String,
}

/// A catalog entry as presented to listing callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogListing {
    /// Base file name.
    pub name: String,
    /// Containing directory.
    pub dir: PathBuf,
    /// Absolute path.
    pub path: PathBuf,
    /// Root identifier.
    pub root: String,
    /// Size in bytes.
    pub size: u64,
    /// Size formatted for humans.
    pub human_size: String,
    /// Modification time, RFC 3339 UTC.
    pub modified_at: String,
}

impl From<&LogFileInfo> for LogListing {
    fn from(info: &LogFileInfo) -> Self {
        Self {
            name: info.name.clone(),
            dir: info.dir.clone(),
            path: info.path.clone(),
            root: info.root_id.clone(),
            size: info.size,
            human_size: human_size(info.size),
            modified_at: format_timestamp(info.modified_at),
        }
    }
}

/// A `{name, rootId}` pair naming one file for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSelector {
    /// Base file name.
    pub name: String,
    /// Root identifier; mandatory for resolution.
    #[serde(default)]
    pub root_id: Option<String>,
}

impl FileSelector {
    /// Creates a selector for `name` under `root_id`.
    #[must_use]
    pub fn new(name: impl Into<String>, root_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_id: Some(root_id.into()),
        }
    }
}

/// Output format of a tail request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailFormat {
    /// Normalized structured records.
    #[default]
    Json,
    /// Plain text joined by newlines.
    Raw,
}

impl TailFormat {
    /// Parses a query value; anything other than `raw` selects JSON.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("raw") {
            Self::Raw
        } else {
            Self::Json
        }
    }
}

/// Formats a byte count as `B`, `KB` or `MB` with one decimal.
#[must_use]
pub fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a timestamp as RFC 3339 UTC with second precision.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Sortable compact UTC timestamp used in rotated and downloaded file names.
#[must_use]
pub fn compact_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%S").to_string()
}

/// File name offered for a downloaded archive.
#[must_use]
pub fn archive_file_name(now: DateTime<Utc>) -> String {
    format!("logs_{}.zip", compact_timestamp(now))
}
