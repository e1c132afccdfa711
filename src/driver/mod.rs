//! Driver layer: command-line surface, file I/O, and the report.

mod cli;
#[allow(clippy::module_inception)]
mod driver;

pub use cli::Cli;
pub use driver::{run, write_output, DriverError};
