//! Error types for log discovery, writing and retrieval.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while locating, writing or serving log files.
#[derive(Debug, Error)]
pub enum LogError {
    /// No registered root holds a file with this name (or not under the requested root).
    #[error("log not found: {name}{}", .root.as_deref().map(|r| format!(" (root {r})")).unwrap_or_default())]
    NotFound {
        /// The requested file name.
        name: String,
        /// The root the caller asked for, if any.
        root: Option<String>,
    },

    /// The name matched files but no root was supplied to pick one.
    #[error("root is required for {name}: candidates {}", .candidates.join(", "))]
    Ambiguous {
        /// The requested file name.
        name: String,
        /// Root identifiers holding a file with this name.
        candidates: Vec<String>,
    },

    /// The path lies outside every registered root.
    #[error("path not allowed: {}", .0.display())]
    Forbidden(PathBuf),

    /// Disk headroom stayed below the minimum even after cleanup.
    #[error("low disk space: {available} bytes free, {required} required")]
    ResourceExhausted {
        /// Bytes available on the volume.
        available: u64,
        /// Configured minimum headroom.
        required: u64,
    },

    /// The name is empty, contains a path separator, or is not a log name.
    #[error("invalid log file name: {0:?}")]
    InvalidName(String),

    /// The rotating writer was shut down.
    #[error("log writer is closed")]
    WriterClosed,

    /// An archive was requested with nothing to put in it.
    #[error("no log files to archive")]
    EmptyArchive,

    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Zip encoding failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogError {
    /// Creates a [`LogError::NotFound`] for a name with no root context.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            root: None,
        }
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Ambiguous { .. } => "ambiguous",
            Self::Forbidden(_) => "forbidden",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::InvalidName(_) => "invalid_name",
            Self::WriterClosed => "writer_closed",
            Self::EmptyArchive => "empty_archive",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Archive(_) | Self::Io(_) => "io_failure",
        }
    }

    /// Returns true when the underlying I/O error means the file vanished.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Converts this error into the structured body handed to callers.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let candidates = match self {
            Self::Ambiguous { candidates, .. } => candidates.clone(),
            _ => Vec::new(),
        };
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            candidates,
        }
    }
}

/// Structured failure returned to callers in place of any partial output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub code: &'static str,
    /// Human-readable description.
    pub message: String,
    /// Candidate root ids for ambiguous lookups.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

/// Result type alias for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = LogError::not_found("app.log");
        assert_eq!(err.to_string(), "log not found: app.log");

        let err = LogError::NotFound {
            name: "app.log".to_string(),
            root: Some("sd-usb0".to_string()),
        };
        assert_eq!(err.to_string(), "log not found: app.log (root sd-usb0)");

        let err = LogError::Ambiguous {
            name: "app.log".to_string(),
            candidates: vec!["local".to_string(), "sd-usb0".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "root is required for app.log: candidates local, sd-usb0"
        );

        let err = LogError::WriterClosed;
        assert_eq!(err.to_string(), "log writer is closed");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogError>();
    }

    #[test]
    fn error_codes_follow_taxonomy() {
        assert_eq!(LogError::not_found("x.log").code(), "not_found");
        assert_eq!(LogError::Forbidden(PathBuf::from("/etc")).code(), "forbidden");
        assert_eq!(
            LogError::ResourceExhausted {
                available: 1,
                required: 2
            }
            .code(),
            "resource_exhausted"
        );
        let io_err = std::io::Error::other("disk gone");
        assert_eq!(LogError::from(io_err).code(), "io_failure");
    }

    #[test]
    fn ambiguous_body_carries_candidates() {
        let err = LogError::Ambiguous {
            name: "app.log".to_string(),
            candidates: vec!["local".to_string(), "sd-usb0".to_string()],
        };
        let body = err.to_body();
        assert_eq!(body.code, "ambiguous");
        assert_eq!(body.candidates.len(), 2);

        let json = serde_json::to_value(&body).expect("serialize body");
        assert_eq!(json["code"], "ambiguous");
        assert_eq!(json["candidates"][1], "sd-usb0");
    }

    #[test]
    fn body_omits_empty_candidates() {
        let json = serde_json::to_value(LogError::EmptyArchive.to_body()).expect("serialize");
        assert!(json.get("candidates").is_none());
        assert_eq!(json["message"], "no log files to archive");
    }

    #[test]
    fn io_not_found_is_recognised() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(LogError::from(io_err).is_not_found());
        assert!(LogError::not_found("a.log").is_not_found());
        assert!(!LogError::Cancelled.is_not_found());
    }
}
