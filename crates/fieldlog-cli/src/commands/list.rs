//! List command implementation.

use std::io::Write;

use fieldlog::LogService;

use crate::cli::ListArgs;
use crate::error::CliError;
use crate::output::{LogList, OutputFormat};

/// Handler for the list command.
pub struct ListCommand<'a> {
    service: &'a LogService,
}

impl<'a> ListCommand<'a> {
    /// Creates a new list command handler.
    #[must_use]
    pub const fn new(service: &'a LogService) -> Self {
        Self { service }
    }

    /// Executes the list command.
    ///
    /// # Errors
    ///
    /// Returns error if writing the output fails.
    pub fn execute<W: Write>(
        &self,
        out: &mut W,
        format: &OutputFormat,
        args: &ListArgs,
    ) -> Result<(), CliError> {
        let list = LogList {
            files: self.service.list_logs(args.all),
        };
        format.write(out, &list)
    }
}
