//! Roots command implementation.

use std::io::Write;

use fieldlog::LogService;

use crate::error::CliError;
use crate::output::{OutputFormat, RootList};

/// Handler for the roots command.
pub struct RootsCommand<'a> {
    service: &'a LogService,
}

impl<'a> RootsCommand<'a> {
    /// Creates a new roots command handler.
    #[must_use]
    pub const fn new(service: &'a LogService) -> Self {
        Self { service }
    }

    /// Executes the roots command.
    ///
    /// # Errors
    ///
    /// Returns error if writing the output fails.
    pub fn execute<W: Write>(&self, out: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let list = RootList {
            roots: self.service.roots().to_vec(),
        };
        format.write(out, &list)
    }
}
