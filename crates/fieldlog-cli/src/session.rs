//! Process-wide state for one CLI invocation.
//!
//! A [`Session`] owns the loaded configuration, the service built from it and,
//! with `--log-to-sink`, the rotating writer that carries this process's own
//! diagnostics. Commands borrow from it.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use fieldlog::{FieldlogConfig, FsDiskSpace, LogError, LogService, RotatingWriter};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{
    DownloadAllCommand, DownloadCommand, InitConfigCommand, ListCommand, RootsCommand,
    TailCommand, WriteCommand,
};
use crate::error::CliError;
use crate::output::OutputFormat;

/// Loads configuration from `path`, or built-in defaults when absent.
///
/// # Errors
///
/// Returns [`CliError::Config`] if the file cannot be read or is invalid.
pub fn load_config(path: Option<&Path>) -> Result<FieldlogConfig, CliError> {
    match path {
        Some(path) => FieldlogConfig::from_file(path).map_err(|e| match e {
            LogError::Config(msg) => CliError::Config(msg),
            other => CliError::Log(other),
        }),
        None => Ok(FieldlogConfig::default()),
    }
}

/// Configuration, service and optional diagnostics sink.
pub struct Session {
    config: FieldlogConfig,
    service: LogService,
    sink: Option<Arc<RotatingWriter>>,
}

impl Session {
    /// Builds the service and, when `log_to_sink` is set, opens the sink.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the sink cannot be opened.
    pub fn open(config: FieldlogConfig, log_to_sink: bool) -> Result<Self, CliError> {
        let service = LogService::from_config(&config)?;
        let sink = if log_to_sink {
            Some(Arc::new(service.open_writer(Arc::new(FsDiskSpace))?))
        } else {
            None
        };
        Ok(Self {
            config,
            service,
            sink,
        })
    }

    /// The loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &FieldlogConfig {
        &self.config
    }

    /// The service built from the configuration.
    #[must_use]
    pub const fn service(&self) -> &LogService {
        &self.service
    }

    /// The diagnostics sink, if one was opened.
    #[must_use]
    pub fn sink(&self) -> Option<&Arc<RotatingWriter>> {
        self.sink.as_ref()
    }

    /// Installs the global tracing subscriber.
    ///
    /// `RUST_LOG` wins over `default_level`. Output goes to the sink when one
    /// is open, otherwise to stderr.
    pub fn init_tracing(&self, default_level: &str, json: bool) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        match (self.sink.clone(), json) {
            (Some(sink), true) => builder.json().with_writer(sink).init(),
            (Some(sink), false) => builder.with_ansi(false).with_writer(sink).init(),
            (None, true) => builder.json().with_writer(io::stderr).init(),
            (None, false) => builder.with_writer(io::stderr).init(),
        }
    }

    /// Runs one command.
    ///
    /// # Errors
    ///
    /// Returns the command's error.
    pub async fn execute<W, R>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        command: &Commands,
        input: R,
        cancel: &CancellationToken,
    ) -> Result<(), CliError>
    where
        W: Write,
        R: AsyncRead + Unpin,
    {
        match command {
            Commands::Roots => RootsCommand::new(&self.service).execute(out, format),
            Commands::List(args) => ListCommand::new(&self.service).execute(out, format, args),
            Commands::Tail(args) => {
                TailCommand::new(&self.service)
                    .execute(out, format, args, cancel.child_token())
                    .await
            }
            Commands::Download(args) => {
                DownloadCommand::new(&self.service)
                    .execute(out, format, args, cancel)
                    .await
            }
            Commands::DownloadAll(args) => {
                DownloadAllCommand::new(&self.service)
                    .execute(out, format, args, cancel)
                    .await
            }
            Commands::Write => {
                WriteCommand::new(&self.service, self.sink.clone())
                    .execute(out, format, input, cancel)
                    .await
            }
            Commands::InitConfig => InitConfigCommand::new().execute(out),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(sink) = &self.sink {
            let _ = sink.close();
        }
    }
}

/// Convenience used by the binary: load, open and run from parsed arguments.
///
/// # Errors
///
/// Returns error if loading, opening or the command fails.
pub async fn run_cli<W, R>(
    cli: &Cli,
    out: &mut W,
    input: R,
    cancel: &CancellationToken,
) -> Result<(), CliError>
where
    W: Write,
    R: AsyncRead + Unpin,
{
    let format = OutputFormat::new(cli.format);
    if matches!(cli.command, Commands::InitConfig) {
        return InitConfigCommand::new().execute(out);
    }

    let config = load_config(cli.config.as_deref())?;
    let session = Session::open(config, cli.log_to_sink)?;
    session.init_tracing(&cli.log_level, cli.json_logs);
    session
        .execute(out, &format, &cli.command, input, cancel)
        .await
}
