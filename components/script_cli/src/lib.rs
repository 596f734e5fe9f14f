//! Script runtime CLI library
//!
//! Provides the Runtime facade, the standard host modules and the
//! supporting modules for the `corten-script` command.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod repl;
pub mod runtime;
pub mod stdlib;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use runtime::{InputStatus, Runtime, RuntimeConfig};
