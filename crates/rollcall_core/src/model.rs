//! Domain records stored in every partition.

use crate::error::{CoreError, CoreResult};
use crate::scatter::Routable;
use rollcall_store::{Row, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A student, stored in the partition selected by the first letter of the
/// name.
///
/// `id` is assigned by the owning partition and is only unique there.
/// Two students with equal ids in different partitions are still distinct
/// values because the name takes part in equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Student {
    /// Partition-local id.
    pub id: i64,
    /// Full name; the routing attribute.
    pub name: String,
    /// Optional mobile number.
    pub mobile: Option<String>,
}

impl Student {
    /// Creates a student value.
    pub fn new(id: i64, name: impl Into<String>, mobile: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mobile,
        }
    }

    /// Decodes `id, name, mobile` starting at column `offset`.
    pub(crate) fn from_row(row: &Row, offset: usize) -> CoreResult<Self> {
        let decode = |e: StoreError| CoreError::decode(&e);
        Ok(Self {
            id: row.integer(offset).map_err(decode)?,
            name: row.text(offset + 1).map_err(decode)?.to_owned(),
            mobile: row.opt_text(offset + 2).map_err(decode)?.map(str::to_owned),
        })
    }
}

impl Routable for Student {
    fn routing_attr(&self) -> &str {
        &self.name
    }

    fn local_id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id {})", self.name, self.id)
    }
}

/// A course. The catalog is replicated to every partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Course {
    /// Course code, unique across the catalog.
    pub code: String,
    /// Display name.
    pub name: String,
}

impl Course {
    /// Creates a course value.
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }

    pub(crate) fn from_row(row: &Row, offset: usize) -> CoreResult<Self> {
        let decode = |e: StoreError| CoreError::decode(&e);
        Ok(Self {
            code: row.text(offset).map_err(decode)?.to_owned(),
            name: row.text(offset + 1).map_err(decode)?.to_owned(),
        })
    }

    /// Like [`Course::from_row`], but yields `None` when the code column is
    /// NULL, as produced by an unmatched outer join.
    pub(crate) fn from_outer_row(row: &Row, offset: usize) -> CoreResult<Option<Self>> {
        let decode = |e: StoreError| CoreError::decode(&e);
        match row.opt_text(offset).map_err(decode)? {
            None => Ok(None),
            Some(_) => Self::from_row(row, offset).map(Some),
        }
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.name)
    }
}

/// A student's enrollment in a course, stored in the student's partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enrollment {
    /// Partition-local student id.
    pub student_id: i64,
    /// Enrolled course.
    pub course_code: String,
    /// Enrollment time, UTC seconds since the Unix epoch.
    pub date_enrolled: i64,
    /// Final grade, once set.
    pub final_grade: Option<String>,
}

impl Enrollment {
    pub(crate) fn from_row(row: &Row) -> CoreResult<Self> {
        let decode = |e: StoreError| CoreError::decode(&e);
        Ok(Self {
            student_id: row.integer(0).map_err(decode)?,
            course_code: row.text(1).map_err(decode)?.to_owned(),
            date_enrolled: row.integer(2).map_err(decode)?,
            final_grade: row.opt_text(3).map_err(decode)?.map(str::to_owned),
        })
    }
}
