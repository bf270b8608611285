//! # Rollcall Core
//!
//! Partition routing and scatter-gather queries for a student enrollment
//! registry spread over several SQLite databases.
//!
//! This crate provides:
//! - Partitions bound to inclusive ranges of routing keys
//! - A partition manager resolving names to partitions
//! - A scatter-gather executor issuing one batched query per partition
//! - The per-partition schema
//! - Domain operations for students, courses and enrollments
//! - Sample data for demos and tests
//!
//! ## Routing
//!
//! A routing key is the first character of an entity's name, trimmed and
//! uppercased. With the default layout, `"Ken Thompson"` routes to
//! `enrollment1.db` (A-M) and `"Rob Pike"` to `enrollment2.db` (N-Z).
//!
//! ```rust,ignore
//! use rollcall_core::{ClusterConfig, Registry};
//!
//! let registry = Registry::open(&ClusterConfig::in_memory())?;
//! registry.create_schema()?;
//! let ken = registry.add_student("Ken Thompson", None)?;
//! let courses = registry.courses_for_students(&[ken])?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod model;
mod partition;
mod registry;
mod scatter;
mod schema;
mod seed;

pub use config::{
    ClusterConfig, FanOut, PartitionConfig, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_QUERY_TIMEOUT_MS,
};
pub use error::{CoreError, CoreResult};
pub use model::{Course, Enrollment, Student};
pub use partition::{
    normalize_key, routing_key, KeyRange, Partition, PartitionManager, ShadowedKey,
};
pub use registry::Registry;
pub use scatter::{
    BatchQuery, Decoded, PartitionGroup, QualifiedId, Routable, ScatterGather, IDS_MARKER,
};
pub use schema::{create_schema, SCHEMA};
pub use seed::{sample_courses, seed, SAMPLE_STUDENTS};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
