//! Partition store trait definition.

use crate::error::StoreResult;
use crate::guard::QueryGuard;
use crate::value::{Row, Value};

/// Outcome of a data-modifying statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Executed {
    /// Number of rows inserted, updated or deleted.
    pub rows_affected: usize,
    /// Row id of the most recent successful insert on this store.
    pub last_insert_id: i64,
}

/// A handle to one relational database instance.
///
/// A store knows nothing about partitions or routing. It executes the
/// statements it is given against its own database and nothing else.
///
/// # Invariants
///
/// - Parameters are bound positionally; implementations never splice them
///   into statement text
/// - Every guarded statement is interrupted once its guard reports a
///   deadline or cancellation, surfacing [`crate::StoreError::TimedOut`] or
///   [`crate::StoreError::Cancelled`]
/// - After `close`, every call fails with [`crate::StoreError::Closed`]
/// - Stores must be `Send + Sync` so partitions can be queried from
///   several threads
///
/// # Implementors
///
/// - [`super::SqliteStore`] - SQLite file or in-memory database
pub trait PartitionStore: Send + Sync {
    /// Executes a data-modifying statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails, the guard interrupts it, or
    /// the store is closed.
    fn execute(&self, statement: &str, params: &[Value], guard: &QueryGuard)
        -> StoreResult<Executed>;

    /// Runs a query and collects every result row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails, the guard interrupts it, or the
    /// store is closed.
    fn query(&self, statement: &str, params: &[Value], guard: &QueryGuard)
        -> StoreResult<Vec<Row>>;

    /// Runs one or more parameterless statements, such as schema DDL.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails or the store is closed.
    fn execute_batch(&self, statements: &str) -> StoreResult<()>;

    /// Releases the underlying connection.
    ///
    /// Closing an already closed store is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database reports a failure while closing.
    fn close(&self) -> StoreResult<()>;

    /// Returns true once `close` has been called.
    fn is_closed(&self) -> bool;
}
