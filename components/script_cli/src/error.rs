//! Error types for the CLI

use bridge::BridgeError;
use core_types::ScriptError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Script compile or runtime failure
    #[error("{}", .0.render())]
    Script(#[from] ScriptError),

    /// File I/O error
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// Host module or type registration failed
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Result could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// REPL error
    #[error("REPL error: {0}")]
    Repl(String),
}

impl CliError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Script(_) => 1,
            CliError::Io(_) => 2,
            CliError::Bridge(_) | CliError::Json(_) | CliError::Repl(_) => 3,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
