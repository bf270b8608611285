//! Error types for store operations.

use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The statement ran past its deadline and was interrupted.
    #[error("statement timed out after {after:?}")]
    TimedOut {
        /// The timeout the statement was bound by.
        after: Duration,
    },

    /// The statement was interrupted through its cancel token.
    #[error("statement cancelled")]
    Cancelled,

    /// The store is closed.
    #[error("store is closed")]
    Closed,

    /// A row column was missing or held an unexpected type.
    #[error("column {index}: {message}")]
    Column {
        /// Zero-based column index.
        index: usize,
        /// What was wrong with the column.
        message: String,
    },
}

impl StoreError {
    /// Creates a column error.
    pub fn column(index: usize, message: impl Into<String>) -> Self {
        Self::Column {
            index,
            message: message.into(),
        }
    }

    /// Returns true if the statement was stopped by its guard rather than
    /// failing on its own.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::Cancelled)
    }
}
