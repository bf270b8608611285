//! Partitions and routing.
//!
//! A [`Partition`] binds one store to an inclusive range of routing keys. The
//! [`PartitionManager`] owns every partition and resolves keys to them.

mod manager;

pub use manager::{routing_key, PartitionManager, ShadowedKey};

use crate::error::{CoreError, CoreResult};
use rollcall_store::{Executed, PartitionStore, QueryGuard, Row, Value};
use std::fmt;
use tracing::debug;

/// Uppercases a single character.
///
/// Characters whose uppercase form is more than one character (such as `ß`)
/// are returned unchanged, so the result is always a single routing key.
#[must_use]
pub fn normalize_key(ch: char) -> char {
    let mut upper = ch.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(single), None) => single,
        _ => ch,
    }
}

/// An inclusive range of normalized routing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyRange {
    start: char,
    end: char,
}

impl KeyRange {
    /// Creates a range, uppercasing both bounds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `start` sorts after `end` once normalized.
    pub fn new(start: char, end: char) -> CoreResult<Self> {
        let (start, end) = (normalize_key(start), normalize_key(end));
        if start > end {
            return Err(CoreError::invalid_config(format!(
                "range start {start:?} is after range end {end:?}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Returns the first key.
    #[must_use]
    pub const fn start(&self) -> char {
        self.start
    }

    /// Returns the last key.
    #[must_use]
    pub const fn end(&self) -> char {
        self.end
    }

    /// Returns true if `key` lies inside the range.
    #[must_use]
    pub fn contains(&self, key: char) -> bool {
        (self.start..=self.end).contains(&key)
    }

    /// Iterates every key in the range.
    pub fn keys(&self) -> impl Iterator<Item = char> {
        self.start..=self.end
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One independently stored shard bound to a range of routing keys.
///
/// A partition exclusively owns its store. Every statement issued through
/// it is tagged with the partition name on failure.
pub struct Partition {
    name: String,
    range: KeyRange,
    store: Box<dyn PartitionStore>,
}

impl Partition {
    /// Creates a partition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the name is blank or the range is inverted.
    pub fn new(
        name: impl Into<String>,
        range_start: char,
        range_end: char,
        store: Box<dyn PartitionStore>,
    ) -> CoreResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoreError::invalid_config("partition name is empty"));
        }
        Ok(Self {
            name,
            range: KeyRange::new(range_start, range_end)?,
            store,
        })
    }

    /// Returns the partition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key range.
    #[must_use]
    pub const fn range(&self) -> KeyRange {
        self.range
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn PartitionStore {
        self.store.as_ref()
    }

    /// Executes a data-modifying statement on this partition.
    ///
    /// # Errors
    ///
    /// Returns `Timeout`, `Cancelled` or `Storage` tagged with this partition.
    pub fn execute(
        &self,
        statement: &str,
        params: &[Value],
        guard: &QueryGuard,
    ) -> CoreResult<Executed> {
        debug!(partition = %self.name, params = params.len(), "execute");
        self.store
            .execute(statement, params, guard)
            .map_err(|err| CoreError::from_store(&self.name, err))
    }

    /// Runs a query on this partition.
    ///
    /// # Errors
    ///
    /// Returns `Timeout`, `Cancelled` or `Storage` tagged with this partition.
    pub fn query(&self, statement: &str, params: &[Value], guard: &QueryGuard) -> CoreResult<Vec<Row>> {
        debug!(partition = %self.name, params = params.len(), "query");
        self.store
            .query(statement, params, guard)
            .map_err(|err| CoreError::from_store(&self.name, err))
    }

    /// Runs parameterless statements such as schema DDL.
    ///
    /// # Errors
    ///
    /// Returns `Storage` tagged with this partition.
    pub fn execute_batch(&self, statements: &str) -> CoreResult<()> {
        self.store
            .execute_batch(statements)
            .map_err(|err| CoreError::from_store(&self.name, err))
    }

    pub(crate) fn close(&self) -> CoreResult<()> {
        self.store
            .close()
            .map_err(|err| CoreError::from_store(&self.name, err))
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partition")
            .field("name", &self.name)
            .field("range", &self.range)
            .field("closed", &self.store.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_store::SqliteStore;

    fn memory() -> Box<dyn PartitionStore> {
        Box::new(SqliteStore::open_in_memory().unwrap())
    }

    #[test]
    fn normalize_key_uppercases() {
        assert_eq!(normalize_key('k'), 'K');
        assert_eq!(normalize_key('K'), 'K');
        assert_eq!(normalize_key('7'), '7');
        assert_eq!(normalize_key('é'), 'É');
    }

    #[test]
    fn normalize_key_keeps_multi_char_uppercase() {
        assert_eq!(normalize_key('ß'), 'ß');
    }

    #[test]
    fn key_range_normalizes_bounds() {
        let range = KeyRange::new('a', 'm').unwrap();
        assert_eq!(range.start(), 'A');
        assert_eq!(range.end(), 'M');
        assert!(range.contains('G'));
        assert!(!range.contains('g'));
        assert!(!range.contains('N'));
        assert_eq!(range.keys().count(), 13);
        assert_eq!(range.to_string(), "A-M");
    }

    #[test]
    fn key_range_rejects_inverted_bounds() {
        let err = KeyRange::new('Z', 'a').unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn partition_rejects_blank_name() {
        let err = Partition::new("  ", 'A', 'Z', memory()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn partition_tags_store_errors() {
        let partition = Partition::new("enrollment1.db", 'A', 'M', memory()).unwrap();
        let guard = QueryGuard::new(std::time::Duration::from_secs(5));

        let err = partition.query("SELECT * FROM missing", &[], &guard).unwrap_err();

        assert!(matches!(err, CoreError::Storage { .. }));
        assert_eq!(err.partition(), Some("enrollment1.db"));
    }
}
