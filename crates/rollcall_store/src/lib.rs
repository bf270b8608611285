//! # Rollcall Store
//!
//! The partition store boundary for rollcall.
//!
//! This crate provides the lowest-level storage abstraction: a handle to one
//! relational database. Stores know nothing about partitions, routing keys
//! or the enrollment domain. They execute parameterised statements against
//! their own database and return rows.
//!
//! ## Design Principles
//!
//! - Parameters are always bound positionally, never concatenated
//! - Every statement runs under a [`QueryGuard`] with its own deadline
//! - Stores must be `Send + Sync` so partitions can be queried concurrently
//! - Closing is idempotent; a closed store rejects all further work
//!
//! ## Available Stores
//!
//! - [`SqliteStore`] - SQLite database file, or `:memory:` for tests
//!
//! ## Example
//!
//! ```rust
//! use rollcall_store::{PartitionStore, QueryGuard, SqliteStore, Value};
//! use std::time::Duration;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let guard = QueryGuard::new(Duration::from_secs(5));
//! let rows = store.query("SELECT ?1 + 1", &[Value::Integer(41)], &guard).unwrap();
//! assert_eq!(rows[0].integer(0).unwrap(), 42);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod guard;
mod sqlite;
mod value;

pub use backend::{Executed, PartitionStore};
pub use error::{StoreError, StoreResult};
pub use guard::{CancelToken, Interrupt, QueryGuard};
pub use sqlite::{SqliteStore, StoreOptions, MEMORY_TARGET};
pub use value::{Row, Value};
