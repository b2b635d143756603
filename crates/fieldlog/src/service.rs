//! Caller-facing operations.
//!
//! [`LogService`] answers the four requests a front end makes (list, tail,
//! download selected, download everything) and opens the rotating sink. Every
//! operation rescans the roots once, so volumes mounted since the last call are
//! seen, then works on that one snapshot; every file is opened through the
//! sandbox built from it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bundle::{ArchiveBundler, ArchiveStream, BundleEntry};
use crate::catalog::FsCatalog;
use crate::config::{ArchiveConfig, FieldlogConfig, ReaderConfig, WriterConfig};
use crate::error::{LogError, Result};
use crate::normalize::{NormalizedLine, normalize_all};
use crate::roots::{MountScanRegistry, choose_sink_dir};
use crate::sandbox::RootSandbox;
use crate::tail::TailReader;
use crate::traits::{DiskSpace, LogCatalog, Sandbox};
use crate::types::{FileSelector, LogListing, Root, TailFormat};
use crate::writer::RotatingWriter;

/// Parameters of a tail request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailRequest {
    /// Base file name.
    pub name: String,
    /// Root holding the file; required.
    #[serde(default)]
    pub root_id: Option<String>,
    /// Lines wanted; the configured default applies when absent or zero.
    #[serde(default)]
    pub max_lines: Option<usize>,
    /// Output shape.
    #[serde(default)]
    pub format: TailFormat,
}

impl TailRequest {
    /// Creates a JSON-format request for `name` under `root_id`.
    #[must_use]
    pub fn new(name: impl Into<String>, root_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_id: Some(root_id.into()),
            max_lines: None,
            format: TailFormat::Json,
        }
    }

    /// Sets the line count.
    #[must_use]
    pub const fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = Some(max_lines);
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: TailFormat) -> Self {
        self.format = format;
        self
    }
}

/// Result of a tail request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TailOutput {
    /// Lines joined by `\n`, without a trailing newline.
    Raw(String),
    /// One normalized record per line.
    Records(Vec<NormalizedLine>),
}

/// Log retrieval over a catalog.
pub struct LogService {
    catalog: Arc<dyn LogCatalog>,
    reader: TailReader,
    reader_config: ReaderConfig,
    archive_config: ArchiveConfig,
    writer_config: WriterConfig,
    prefer_removable_sink: bool,
}

impl LogService {
    /// Creates a service over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<dyn LogCatalog>, config: &FieldlogConfig) -> Self {
        Self {
            catalog,
            reader: TailReader::from_config(&config.reader),
            reader_config: config.reader.clone(),
            archive_config: config.archive.clone(),
            writer_config: config.writer.clone(),
            prefer_removable_sink: config.roots.prefer_removable_sink,
        }
    }

    /// Creates a service that discovers roots on mounted volumes.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the local root
    /// cannot be determined.
    pub fn from_config(config: &FieldlogConfig) -> Result<Self> {
        config.validate()?;
        let registry = MountScanRegistry::new(&config.roots)?;
        let catalog = FsCatalog::new(Arc::new(registry), &config.catalog);
        Ok(Self::new(Arc::new(catalog), config))
    }

    /// Rescans and returns the current roots.
    #[must_use]
    pub fn roots(&self) -> Arc<[Root]> {
        self.catalog.refresh_roots()
    }

    /// Every log file, most recently modified first.
    #[must_use]
    pub fn list_logs(&self, include_archives: bool) -> Vec<LogListing> {
        let roots = self.catalog.refresh_roots();
        let mut files = self.catalog.discover_in(&roots, include_archives);
        files.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        debug!(count = files.len(), include_archives, "listed log files");
        files.iter().map(LogListing::from).collect()
    }

    /// The final lines of one file.
    ///
    /// # Errors
    ///
    /// - [`LogError::InvalidName`], [`LogError::NotFound`], [`LogError::Ambiguous`] from resolution
    /// - [`LogError::Forbidden`] if the resolved path escapes every root
    /// - [`LogError::Cancelled`] if `cancel` fires first
    /// - [`LogError::Io`] if the read fails
    pub async fn tail(
        &self,
        request: &TailRequest,
        cancel: CancellationToken,
    ) -> Result<TailOutput> {
        let roots = self.catalog.refresh_roots();
        let info = self.catalog.resolve_one_in(
            &roots,
            &request.name,
            request.root_id.as_deref(),
        )?;
        let file = RootSandbox::new(roots).open(&info.path)?;

        let max_lines = self.reader_config.effective_lines(request.max_lines);
        let lines = self.reader.tail_file(file, max_lines, cancel).await?;
        debug!(
            file = %info.path.display(),
            root = %info.root_id,
            requested = max_lines,
            returned = lines.len(),
            "tail served"
        );

        Ok(match request.format {
            TailFormat::Raw => TailOutput::Raw(lines.join("\n")),
            TailFormat::Json => TailOutput::Records(normalize_all(&lines)),
        })
    }

    /// Streams a zip of the selected files, each under a directory named by its root.
    ///
    /// Every selector is resolved before any byte is produced; one failure
    /// fails the whole request.
    ///
    /// # Errors
    ///
    /// - [`LogError::EmptyArchive`] if `selectors` is empty
    /// - any resolution or containment error for the first failing selector
    pub fn download(
        &self,
        selectors: &[FileSelector],
        cancel: &CancellationToken,
    ) -> Result<ArchiveStream> {
        if selectors.is_empty() {
            return Err(LogError::EmptyArchive);
        }
        let roots = self.catalog.refresh_roots();
        let sandbox = Arc::new(RootSandbox::new(Arc::clone(&roots)));

        let mut entries = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let info = self.catalog.resolve_one_in(
                &roots,
                &selector.name,
                selector.root_id.as_deref(),
            )?;
            if !sandbox.is_contained(&info.path) {
                return Err(LogError::Forbidden(info.path));
            }
            entries.push(BundleEntry::labelled(info.path, &info.root_id));
        }

        info!(entries = entries.len(), "streaming selected logs");
        ArchiveBundler::new(sandbox, &self.archive_config).bundle(entries, cancel)
    }

    /// Streams a zip of every catalog entry, rotated archives included,
    /// laid out as `<root id>/<path within root>`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::EmptyArchive`] if no root holds any log file.
    pub fn download_all(&self, cancel: &CancellationToken) -> Result<ArchiveStream> {
        let roots = self.catalog.refresh_roots();
        let by_id: HashMap<&str, &Root> = roots.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut files = self.catalog.discover_in(&roots, true);
        files.sort_by(|a, b| a.root_id.cmp(&b.root_id).then_with(|| a.path.cmp(&b.path)));

        let mut entries = Vec::with_capacity(files.len());
        for info in files {
            let Some(root) = by_id.get(info.root_id.as_str()) else {
                warn!(root = %info.root_id, "catalog entry names an unknown root");
                continue;
            };
            entries.push(BundleEntry::relative_to(info.path, &root.path, &root.id));
        }

        info!(entries = entries.len(), "streaming all logs");
        let sandbox = Arc::new(RootSandbox::new(Arc::clone(&roots)));
        ArchiveBundler::new(sandbox, &self.archive_config).bundle(entries, cancel)
    }

    /// Opens the rotating sink in the preferred writable root.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Config`] when no root is available, or an I/O error
    /// if the active file cannot be opened.
    pub fn open_writer(&self, disk: Arc<dyn DiskSpace>) -> Result<RotatingWriter> {
        let roots = self.catalog.refresh_roots();
        let dir = choose_sink_dir(&roots, self.prefer_removable_sink)
            .ok_or_else(|| LogError::Config("no log root available for writing".to_string()))?;
        info!(dir = %dir.display(), file = %self.writer_config.file_name, "opening log sink");
        RotatingWriter::open(dir, &self.writer_config, disk)
    }
}
