//! CLI error type.

use rollcall_core::CoreError;
use std::io;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors a command can end with.
#[derive(Debug, Error)]
pub enum CliError {
    /// The registry reported an error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A partition file could not be removed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
