//! Configuration.
//!
//! A [`FieldlogConfig`] is loaded once at process start and handed to every
//! component constructor; nothing reads configuration from globals. Sections:
//! - `[roots]`: where log roots are discovered
//! - `[writer]`: active log name, rotation threshold, retention, disk headroom
//! - `[catalog]`: extension-less names accepted as logs
//! - `[reader]`: tail chunking and line limits
//! - `[archive]`: capacity of the streaming pipe

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};

const MIB: u64 = 1024 * 1024;

/// Root discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RootsConfig {
    /// Local root directory; defaults to `<exe dir>/<root_dir_name>`.
    pub local_dir: Option<PathBuf>,
    /// Parent directories scanned for removable-volume roots.
    pub mount_parents: Vec<PathBuf>,
    /// Directory name that marks a log root on a mounted volume.
    pub root_dir_name: String,
    /// How many levels below a mount parent to search.
    pub scan_depth: usize,
    /// Put the active log on a writable removable root when one exists.
    pub prefer_removable_sink: bool,
}

impl Default for RootsConfig {
    fn default() -> Self {
        Self {
            local_dir: None,
            mount_parents: vec![PathBuf::from("/mnt")],
            root_dir_name: "fieldlog".to_string(),
            scan_depth: 4,
            prefer_removable_sink: true,
        }
    }
}

impl RootsConfig {
    /// The configured local root, or the default beside the running binary.
    pub fn resolve_local_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.local_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe()?;
        let parent = exe
            .parent()
            .ok_or_else(|| LogError::Config("executable has no parent directory".to_string()))?;
        Ok(parent.join(&self.root_dir_name))
    }
}

/// Rotating writer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WriterConfig {
    /// Name of the active log file.
    pub file_name: String,
    /// Size at which the active file is rotated.
    pub max_file_bytes: u64,
    /// Number of rotated archives kept per base name.
    pub max_archives: usize,
    /// Minimum free bytes on the log volume before writes are shed.
    pub min_free_bytes: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            file_name: "api.log".to_string(),
            max_file_bytes: 5 * MIB,
            max_archives: 5,
            min_free_bytes: 6 * MIB,
        }
    }
}

/// Catalog naming settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Extension-less file names accepted as logs.
    pub bare_names: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            bare_names: vec![
                "messages".to_string(),
                "syslog".to_string(),
                "dmesg".to_string(),
            ],
        }
    }
}

/// Tail reader settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Size of each backward read.
    pub chunk_bytes: usize,
    /// Lines returned when a request names none.
    pub default_lines: usize,
    /// Upper bound on lines per request.
    pub max_lines: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 4 * 1024,
            default_lines: 200,
            max_lines: 10_000,
        }
    }
}

impl ReaderConfig {
    /// Applies the default for absent or zero requests and clamps to the maximum.
    #[must_use]
    pub fn effective_lines(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(n) if n > 0 => n.min(self.max_lines),
            _ => self.default_lines.min(self.max_lines),
        }
    }
}

/// Archive streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Bytes buffered between the zip producer and the consumer.
    pub pipe_capacity: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: 64 * 1024,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldlogConfig {
    /// Root discovery.
    pub roots: RootsConfig,
    /// Rotating writer.
    pub writer: WriterConfig,
    /// Catalog naming.
    pub catalog: CatalogConfig,
    /// Tail reader.
    pub reader: ReaderConfig,
    /// Archive streaming.
    pub archive: ArchiveConfig,
}

impl FieldlogConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LogError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| LogError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, used to write a sample configuration.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LogError::Config(format!("cannot render: {e}")))
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        validate_file_name("roots.root_dir_name", &self.roots.root_dir_name)?;
        validate_file_name("writer.file_name", &self.writer.file_name)?;

        if self.writer.max_file_bytes == 0 {
            return Err(LogError::Config(
                "writer.max_file_bytes must be greater than 0".to_string(),
            ));
        }

        if self.writer.max_archives == 0 {
            return Err(LogError::Config(
                "writer.max_archives must be greater than 0".to_string(),
            ));
        }

        if self.reader.chunk_bytes == 0 {
            return Err(LogError::Config(
                "reader.chunk_bytes must be greater than 0".to_string(),
            ));
        }

        if self.reader.max_lines == 0 {
            return Err(LogError::Config(
                "reader.max_lines must be greater than 0".to_string(),
            ));
        }

        if self.archive.pipe_capacity == 0 {
            return Err(LogError::Config(
                "archive.pipe_capacity must be greater than 0".to_string(),
            ));
        }

        for name in &self.catalog.bare_names {
            validate_file_name("catalog.bare_names", name)?;
        }

        Ok(())
    }
}

fn validate_file_name(field: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LogError::Config(format!("{field} cannot be empty")));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(LogError::Config(format!(
            "{field} must be a plain file name, got {name:?}"
        )));
    }
    Ok(())
}
