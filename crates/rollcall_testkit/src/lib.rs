//! # Rollcall Testkit
//!
//! Test utilities for rollcall.
//!
//! This crate provides:
//! - Store doubles that count statements or fail and stall on demand
//! - Instrumented test clusters with schema and optional sample data
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rollcall_testkit::prelude::*;
//!
//! #[test]
//! fn batches_per_partition() {
//!     let cluster = TestCluster::seeded();
//!     let students = cluster.list_students().unwrap();
//!     cluster.reset_counters();
//!     cluster.courses_for_students(&students).unwrap();
//!     assert_eq!(cluster.counter(FIRST).queries(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod doubles;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::doubles::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use doubles::*;
pub use fixtures::*;
pub use generators::*;
