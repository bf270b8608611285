//! Error types for rollcall core.

use rollcall_store::StoreError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in rollcall core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The routing attribute was empty after trimming.
    #[error("routing key is empty")]
    EmptyRoutingKey,

    /// No partition covers the routing key.
    #[error("no partition covers routing key {key:?}")]
    NoPartition {
        /// The normalized routing key.
        key: char,
    },

    /// No partition has the given name.
    #[error("unknown partition: {name}")]
    UnknownPartition {
        /// The requested partition name.
        name: String,
    },

    /// A partition store reported an error.
    #[error("storage error on partition {partition}: {source}")]
    Storage {
        /// The partition the statement ran on.
        partition: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// A write succeeded but changed fewer rows than required.
    #[error("{operation} had no effect: expected {expected} row(s), affected {affected}")]
    NoEffect {
        /// The operation that was attempted.
        operation: String,
        /// Rows the operation was expected to change.
        expected: usize,
        /// Rows it actually changed.
        affected: usize,
    },

    /// A statement exceeded its deadline.
    #[error("statement on partition {partition} timed out after {after:?}")]
    Timeout {
        /// The partition the statement ran on.
        partition: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// A statement was abandoned because a sibling statement failed first.
    #[error("statement on partition {partition} was cancelled")]
    Cancelled {
        /// The partition the statement ran on.
        partition: String,
    },

    /// The partition manager has been shut down.
    #[error("partition manager is shut down")]
    ShutDown,

    /// The partition layout or settings are invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A query template could not be rendered or a row could not be decoded.
    #[error("query error: {message}")]
    Query {
        /// Description of the problem.
        message: String,
    },

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Wraps a store error, keeping timeouts and cancellations distinct.
    pub fn from_store(partition: impl Into<String>, source: StoreError) -> Self {
        let partition = partition.into();
        match source {
            StoreError::TimedOut { after } => Self::Timeout { partition, after },
            StoreError::Cancelled => Self::Cancelled { partition },
            source => Self::Storage { partition, source },
        }
    }

    /// Creates a no-effect error.
    pub fn no_effect(operation: impl Into<String>, expected: usize, affected: usize) -> Self {
        Self::NoEffect {
            operation: operation.into(),
            expected,
            affected,
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Creates a query error for a row that could not be decoded.
    pub fn decode(source: &StoreError) -> Self {
        Self::query(format!("cannot decode row: {source}"))
    }

    /// Returns true for routing failures the caller can correct.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::EmptyRoutingKey | Self::NoPartition { .. } | Self::UnknownPartition { .. }
        )
    }

    /// Returns true if a statement deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if repeating the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }

    /// Returns the partition this error happened on, if any.
    pub fn partition(&self) -> Option<&str> {
        match self {
            Self::Storage { partition, .. }
            | Self::Timeout { partition, .. }
            | Self::Cancelled { partition } => Some(partition),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_timeouts_stay_distinct() {
        let err = CoreError::from_store(
            "enrollment1.db",
            StoreError::TimedOut {
                after: Duration::from_secs(5),
            },
        );
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert_eq!(err.partition(), Some("enrollment1.db"));

        let err = CoreError::from_store("enrollment2.db", StoreError::Cancelled);
        assert!(matches!(err, CoreError::Cancelled { .. }));

        let err = CoreError::from_store("enrollment2.db", StoreError::Closed);
        assert!(matches!(err, CoreError::Storage { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn resolution_errors() {
        assert!(CoreError::EmptyRoutingKey.is_resolution());
        assert!(CoreError::NoPartition { key: '7' }.is_resolution());
        assert!(CoreError::UnknownPartition { name: "x".into() }.is_resolution());
        assert!(!CoreError::ShutDown.is_resolution());
        assert!(!CoreError::no_effect("add course", 1, 0).is_resolution());
    }

    #[test]
    fn error_display() {
        let err = CoreError::no_effect("add course DB101", 1, 0);
        assert_eq!(
            err.to_string(),
            "add course DB101 had no effect: expected 1 row(s), affected 0"
        );

        let err = CoreError::NoPartition { key: '7' };
        assert_eq!(err.to_string(), "no partition covers routing key '7'");
    }
}
