//! # fieldlog-cli
//!
//! Command-line front end for [`fieldlog`].
//!
//! Provides commands for:
//! - Inspecting log roots and the files under them
//! - Tailing a log, raw or normalized
//! - Downloading selected logs, or all of them, as a zip
//! - Feeding stdin into the rotating sink
//!
//! # Architecture
//!
//! The CLI loads one [`fieldlog::FieldlogConfig`], builds a
//! [`fieldlog::LogService`] from it inside a [`session::Session`], and runs a
//! single command against that service.
//!
//! ```text
//! ┌──────────────┐   config    ┌─────────────┐   roots/files   ┌──────────┐
//! │ fieldlog-cli │────────────►│ LogService  │◄───────────────►│ volumes  │
//! └──────────────┘             └─────────────┘                 └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
pub mod session;

pub use cli::{Cli, Commands, Format};
pub use error::CliError;
pub use output::OutputFormat;
pub use session::{Session, load_config, run_cli};
