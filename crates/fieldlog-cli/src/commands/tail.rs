//! Tail command implementation.
//!
//! Prints the last lines of one log file, either as written or as
//! normalized records.

use std::io::Write;

use fieldlog::{LogService, NormalizedLine, TailFormat, TailOutput, TailRequest};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::TailArgs;
use crate::error::CliError;
use crate::output::{OutputFormat, TableDisplay};

/// Handler for the tail command.
pub struct TailCommand<'a> {
    service: &'a LogService,
}

impl<'a> TailCommand<'a> {
    /// Creates a new tail command handler.
    #[must_use]
    pub const fn new(service: &'a LogService) -> Self {
        Self { service }
    }

    /// Executes the tail command.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be resolved or read, or if `cancel` fires.
    pub async fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &TailArgs,
        cancel: CancellationToken,
    ) -> Result<(), CliError> {
        let request = TailRequest {
            name: args.name.clone(),
            root_id: args.root.clone(),
            max_lines: args.lines,
            format: if args.raw {
                TailFormat::Raw
            } else {
                TailFormat::Json
            },
        };
        let output = self.service.tail(&request, cancel).await?;
        format.write(out, &TailView(output))
    }
}

/// Tail output for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TailView(pub TailOutput);

impl TableDisplay for TailView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        match &self.0 {
            TailOutput::Raw(text) => {
                if !text.is_empty() {
                    writeln!(writer, "{text}")?;
                }
            }
            TailOutput::Records(records) => {
                for record in records {
                    write_record(writer, record)?;
                }
            }
        }
        Ok(())
    }
}

fn write_record<W: Write>(writer: &mut W, record: &NormalizedLine) -> Result<(), CliError> {
    match record {
        NormalizedLine::Parsed {
            time,
            level,
            module,
            message,
            ..
        } => {
            if module.is_empty() {
                writeln!(writer, "{time} {level:<5} {message}")?;
            } else {
                writeln!(writer, "{time} {level:<5} {module}: {message}")?;
            }
        }
        NormalizedLine::Structured(_) | NormalizedLine::Raw { .. } => {
            writeln!(writer, "{}", record.raw())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;
    use fieldlog::{FieldlogConfig, LogError};
    use std::fs;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> LogService {
        let local = dir.path().join("fieldlog");
        fs::create_dir_all(&local).expect("mkdir");
        fs::write(
            local.join("api.log"),
            "boot\n[2025-09-19 04:37:38,155] [ERROR] Modbus::ReadInt: Read timeout\n{\"level\":\"info\"}\n",
        )
        .expect("write");

        let mut config = FieldlogConfig::default();
        config.roots.local_dir = Some(local);
        config.roots.mount_parents = Vec::new();
        LogService::from_config(&config).expect("service")
    }

    fn args(raw: bool) -> TailArgs {
        TailArgs {
            name: "api.log".to_string(),
            root: Some("local".to_string()),
            lines: Some(2),
            raw,
        }
    }

    #[tokio::test]
    async fn tail_table_renders_parsed_fields() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(&dir);
        let mut out = Vec::new();
        TailCommand::new(&service)
            .execute(
                &mut out,
                &OutputFormat::new(Format::Table),
                &args(false),
                CancellationToken::new(),
            )
            .await
            .expect("execute");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(
            text,
            "2025-09-19T04:37:38.155Z error Modbus: Read timeout\n{\"level\":\"info\"}\n"
        );
    }

    #[tokio::test]
    async fn tail_raw_prints_lines_as_written() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(&dir);
        let mut out = Vec::new();
        TailCommand::new(&service)
            .execute(
                &mut out,
                &OutputFormat::new(Format::Table),
                &args(true),
                CancellationToken::new(),
            )
            .await
            .expect("execute");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("[2025-09-19 04:37:38,155] [ERROR]"));
        assert!(!text.contains("boot"));
    }

    #[tokio::test]
    async fn tail_json_passes_structured_lines_through() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(&dir);
        let mut out = Vec::new();
        TailCommand::new(&service)
            .execute(
                &mut out,
                &OutputFormat::new(Format::Json),
                &args(false),
                CancellationToken::new(),
            )
            .await
            .expect("execute");
        let json: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(json[0]["module"], "Modbus");
        assert_eq!(json[1], serde_json::json!({"level": "info"}));
    }

    #[tokio::test]
    async fn tail_without_root_is_ambiguous() {
        let dir = TempDir::new().expect("temp dir");
        let service = service(&dir);
        let mut no_root = args(false);
        no_root.root = None;
        let result = TailCommand::new(&service)
            .execute(
                &mut Vec::new(),
                &OutputFormat::default(),
                &no_root,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(CliError::Log(LogError::Ambiguous { .. }))
        ));
    }
}
