//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`roots`]: registered log roots
//! - [`list`]: log inventory across roots
//! - [`tail`]: last lines of one file
//! - [`download`]: zip of selected files, or of everything
//! - [`write`]: stdin into the rotating sink
//! - [`init_config`]: default configuration as TOML

pub mod download;
pub mod init_config;
pub mod list;
pub mod roots;
pub mod tail;
pub mod write;

pub use download::{ArchiveReport, DownloadAllCommand, DownloadCommand};
pub use init_config::InitConfigCommand;
pub use list::ListCommand;
pub use roots::RootsCommand;
pub use tail::{TailCommand, TailView};
pub use write::{WriteCommand, WriteReport};
