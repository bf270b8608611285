//! Per-partition schema.
//!
//! Every partition carries the same tables. The course catalog is copied
//! into each one so that enrollment joins never leave the partition.

use crate::error::CoreResult;
use crate::partition::PartitionManager;
use tracing::info;

/// DDL applied to every partition. Safe to run more than once.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS courses (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    mobile TEXT
);

CREATE TABLE IF NOT EXISTS enrollment (
    student_id INTEGER NOT NULL REFERENCES students (id),
    course_code TEXT NOT NULL REFERENCES courses (code),
    date_enrolled INTEGER NOT NULL,
    final_grade TEXT,
    PRIMARY KEY (student_id, course_code)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_enrollment_date_enrolled ON enrollment (date_enrolled);
";

/// Creates the tables on every partition.
///
/// # Errors
///
/// Returns `ShutDown`, or the first partition's storage error.
pub fn create_schema(manager: &PartitionManager) -> CoreResult<()> {
    manager.ensure_open()?;
    for partition in manager.partitions() {
        partition.execute_batch(SCHEMA)?;
        info!(partition = %partition.name(), "schema ready");
    }
    Ok(())
}
