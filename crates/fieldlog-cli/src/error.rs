//! CLI error types.

use fieldlog::{ErrorBody, LogError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A log operation failed.
    #[error(transparent)]
    Log(#[from] LogError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Structured form for `--format json`.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        match self {
            Self::Log(err) => err.to_body(),
            Self::Io(err) => ErrorBody {
                code: "io_failure",
                message: err.to_string(),
                candidates: Vec::new(),
            },
            Self::Config(_) => ErrorBody {
                code: "config",
                message: self.to_string(),
                candidates: Vec::new(),
            },
            Self::Format(_) | Self::InvalidArgument(_) => ErrorBody {
                code: "invalid_argument",
                message: self.to_string(),
                candidates: Vec::new(),
            },
        }
    }
}
