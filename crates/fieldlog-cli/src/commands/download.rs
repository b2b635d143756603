//! Download command implementations.
//!
//! Both commands stream a zip produced by the service into a file, or into
//! stdout when the destination is `-`.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fieldlog::{ArchiveStream, BundleSummary, LogService, SkippedEntry, archive_file_name};
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{DownloadArgs, OutputArgs};
use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay};

/// Handler for the download command.
pub struct DownloadCommand<'a> {
    service: &'a LogService,
}

impl<'a> DownloadCommand<'a> {
    /// Creates a new download command handler.
    #[must_use]
    pub const fn new(service: &'a LogService) -> Self {
        Self { service }
    }

    /// Executes the download command.
    ///
    /// # Errors
    ///
    /// Returns error if any selector fails to resolve, or the archive cannot
    /// be written.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &DownloadArgs,
        cancel: &CancellationToken,
    ) -> Result<(), CliError> {
        let stream = self.service.download(&args.files, cancel)?;
        save_archive(stream, &args.output, out, format).await
    }
}

/// Handler for the download-all command.
pub struct DownloadAllCommand<'a> {
    service: &'a LogService,
}

impl<'a> DownloadAllCommand<'a> {
    /// Creates a new download-all command handler.
    #[must_use]
    pub const fn new(service: &'a LogService) -> Self {
        Self { service }
    }

    /// Executes the download-all command.
    ///
    /// # Errors
    ///
    /// Returns error if no log file exists or the archive cannot be written.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &OutputArgs,
        cancel: &CancellationToken,
    ) -> Result<(), CliError> {
        let stream = self.service.download_all(cancel)?;
        save_archive(stream, args, out, format).await
    }
}

/// Where an archive ended up and what went into it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveReport {
    /// Destination file.
    pub file: PathBuf,
    /// Archive size in bytes.
    pub bytes: u64,
    /// Entry names, in archive order.
    pub entries: Vec<String>,
    /// Entries left out.
    pub skipped: Vec<SkippedEntry>,
}

impl TableDisplay for ArchiveReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(
            writer,
            "Wrote {} ({}, {} file(s))",
            self.file.display(),
            fieldlog::human_size(self.bytes),
            self.entries.len()
        )?;
        for entry in &self.entries {
            writeln!(writer, "  {entry}")?;
        }
        if !self.skipped.is_empty() {
            writeln!(writer, "Skipped:")?;
            for skipped in &self.skipped {
                writeln!(writer, "  {}: {}", skipped.archive_name, skipped.reason)?;
            }
        }
        Ok(())
    }
}

fn destination(args: &OutputArgs) -> Option<PathBuf> {
    match &args.output {
        Some(path) if path.as_os_str() == "-" => None,
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(archive_file_name(Utc::now()))),
    }
}

async fn save_archive<W: Write>(
    stream: ArchiveStream,
    args: &OutputArgs,
    out: &mut W,
    format: &OutputFormat,
) -> Result<(), CliError> {
    let Some(path) = destination(args) else {
        let summary = copy_to_writer(stream, out).await?;
        info!(
            entries = summary.written.len(),
            skipped = summary.skipped.len(),
            "archive written to stdout"
        );
        return Ok(());
    };

    let summary = match copy_to_file(stream, &path).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(remove_err) = fieldlog::retention::remove_if_exists(&path) {
                warn!(path = %path.display(), error = %remove_err, "failed to remove partial archive");
            }
            return Err(e);
        }
    };

    let bytes = tokio::fs::metadata(&path).await?.len();
    let report = ArchiveReport {
        file: path,
        bytes,
        entries: summary.written,
        skipped: summary.skipped,
    };
    format.write(out, &report)
}

async fn copy_to_file(stream: ArchiveStream, path: &Path) -> Result<BundleSummary, CliError> {
    let mut file = tokio::fs::File::create(path).await?;
    let summary = stream.write_to(&mut file).await?;
    file.sync_all().await?;
    Ok(summary)
}

async fn copy_to_writer<W: Write>(
    mut stream: ArchiveStream,
    out: &mut W,
) -> Result<BundleSummary, CliError> {
    while let Some(chunk) = stream.next().await {
        out.write_all(&chunk?)?;
    }
    out.flush()?;
    Ok(stream.finish().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use fieldlog::{FieldlogConfig, FileSelector, LogError};
    use std::fs;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        service: LogService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("temp dir");
        let local = dir.path().join("fieldlog");
        fs::create_dir_all(local.join("old")).expect("mkdir");
        fs::write(local.join("api.log"), "api body\n").expect("write");
        fs::write(local.join("old/app.log"), "app body\n").expect("write");

        let mut config = FieldlogConfig::default();
        config.roots.local_dir = Some(local);
        config.roots.mount_parents = Vec::new();
        let service = LogService::from_config(&config).expect("service");
        Fixture { dir, service }
    }

    fn entry_names(bytes: Vec<u8>) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn destination_defaults_to_timestamped_name() {
        let path = destination(&OutputArgs::default()).expect("file destination");
        let name = path.to_string_lossy().to_string();
        assert!(name.starts_with("logs_"));
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn dash_means_stdout() {
        let args = OutputArgs {
            output: Some(PathBuf::from("-")),
        };
        assert_eq!(destination(&args), None);
    }

    #[tokio::test]
    async fn download_writes_file_and_reports() {
        let fx = fixture();
        let target = fx.dir.path().join("out.zip");
        let args = DownloadArgs {
            files: vec![FileSelector::new("api.log", "local")],
            output: OutputArgs {
                output: Some(target.clone()),
            },
        };

        let mut out = Vec::new();
        DownloadCommand::new(&fx.service)
            .execute(
                &mut out,
                &OutputFormat::new(Format::Json),
                &args,
                &CancellationToken::new(),
            )
            .await
            .expect("execute");

        let report: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(report["entries"], serde_json::json!(["local/api.log"]));
        assert_eq!(
            report["bytes"].as_u64(),
            Some(fs::metadata(&target).expect("stat").len())
        );

        let mut archive =
            zip::ZipArchive::new(fs::File::open(&target).expect("open")).expect("valid zip");
        let mut body = String::new();
        archive
            .by_name("local/api.log")
            .expect("entry")
            .read_to_string(&mut body)
            .expect("read");
        assert_eq!(body, "api body\n");
    }

    #[tokio::test]
    async fn download_all_to_stdout() {
        let fx = fixture();
        let args = OutputArgs {
            output: Some(PathBuf::from("-")),
        };

        let mut out = Vec::new();
        DownloadAllCommand::new(&fx.service)
            .execute(
                &mut out,
                &OutputFormat::default(),
                &args,
                &CancellationToken::new(),
            )
            .await
            .expect("execute");

        assert_eq!(entry_names(out), vec!["local/api.log", "local/old/app.log"]);
    }

    #[tokio::test]
    async fn unresolvable_selector_writes_nothing() {
        let fx = fixture();
        let target = fx.dir.path().join("none.zip");
        let args = DownloadArgs {
            files: vec![
                FileSelector::new("api.log", "local"),
                FileSelector::new("missing.log", "local"),
            ],
            output: OutputArgs {
                output: Some(target.clone()),
            },
        };

        let result = DownloadCommand::new(&fx.service)
            .execute(
                &mut Vec::new(),
                &OutputFormat::default(),
                &args,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(CliError::Log(LogError::NotFound { .. }))
        ));
        assert!(!target.exists());
    }
}
