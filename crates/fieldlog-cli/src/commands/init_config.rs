//! Init-config command implementation.

use std::io::Write;

use fieldlog::FieldlogConfig;

use crate::error::CliError;

/// Handler for the init-config command.
#[derive(Debug, Default)]
pub struct InitConfigCommand;

impl InitConfigCommand {
    /// Creates a new init-config command handler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Writes the default configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns error if rendering or writing fails.
    pub fn execute<W: Write>(&self, out: &mut W) -> Result<(), CliError> {
        let rendered = FieldlogConfig::default().to_toml()?;
        out.write_all(rendered.as_bytes())?;
        Ok(())
    }
}
