//! Routing-key to partition resolution.

use super::{normalize_key, Partition};
use crate::config::ClusterConfig;
use crate::error::{CoreError, CoreResult};
use rollcall_store::SqliteStore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// A routing key claimed by more than one partition.
///
/// The partition constructed later wins the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedKey {
    /// The contested key.
    pub key: char,
    /// Partition that lost the key.
    pub shadowed: String,
    /// Partition that owns the key.
    pub owner: String,
}

/// Owns the fixed set of partitions and resolves routing keys to them.
///
/// The key map is built once at construction and never changes. Callers
/// pass the manager explicitly to whatever needs routing.
///
/// # Overlapping ranges
///
/// Ranges are expected to be disjoint. If two ranges overlap, the partition
/// that appears later in construction order silently takes every shared
/// key. Each shadowed key is logged and reported by
/// [`PartitionManager::shadowed_keys`].
pub struct PartitionManager {
    partitions: Vec<Partition>,
    key_map: HashMap<char, usize>,
    shadowed: Vec<ShadowedKey>,
    shut_down: AtomicBool,
    closed: AtomicBool,
}

impl PartitionManager {
    /// Builds a manager over already opened partitions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if there are no partitions or two share a name.
    pub fn new(partitions: Vec<Partition>) -> CoreResult<Self> {
        if partitions.is_empty() {
            return Err(CoreError::invalid_config("at least one partition is required"));
        }

        let mut names = HashSet::new();
        for partition in &partitions {
            if !names.insert(partition.name()) {
                return Err(CoreError::invalid_config(format!(
                    "duplicate partition name: {}",
                    partition.name()
                )));
            }
        }

        let mut key_map = HashMap::new();
        let mut shadowed = Vec::new();
        for (index, partition) in partitions.iter().enumerate() {
            for key in partition.range().keys() {
                if let Some(previous) = key_map.insert(key, index) {
                    let entry = ShadowedKey {
                        key,
                        shadowed: partitions[previous].name().to_owned(),
                        owner: partition.name().to_owned(),
                    };
                    warn!(
                        key = %entry.key,
                        shadowed = %entry.shadowed,
                        owner = %entry.owner,
                        "overlapping partition ranges"
                    );
                    shadowed.push(entry);
                }
            }
        }

        Ok(Self {
            partitions,
            key_map,
            shadowed,
            shut_down: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Opens a SQLite store for every configured partition.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened or the layout is invalid.
    pub fn open(config: &ClusterConfig) -> CoreResult<Self> {
        let options = config.store_options();
        let mut partitions = Vec::with_capacity(config.partitions.len());

        for entry in &config.partitions {
            let store = SqliteStore::open(&entry.target, &options)
                .map_err(|err| CoreError::from_store(&entry.name, err))?;
            partitions.push(Partition::new(
                entry.name.clone(),
                entry.range_start,
                entry.range_end,
                Box::new(store),
            )?);
        }

        let manager = Self::new(partitions)?;
        info!(partitions = manager.partitions.len(), "partition manager ready");
        Ok(manager)
    }

    /// Returns the partition owning `key`, or `None` if no range covers it.
    ///
    /// The key is uppercased before lookup.
    #[must_use]
    pub fn resolve_key(&self, key: char) -> Option<&Partition> {
        self.key_map
            .get(&normalize_key(key))
            .map(|&index| &self.partitions[index])
    }

    /// Derives the routing key from a routing attribute.
    ///
    /// # Errors
    ///
    /// Returns `EmptyRoutingKey` if `input` is empty after trimming.
    pub fn resolve_key_from_string(&self, input: &str) -> CoreResult<char> {
        routing_key(input)
    }

    /// Resolves a routing attribute straight to its partition.
    ///
    /// # Errors
    ///
    /// Returns `ShutDown`, `EmptyRoutingKey` or `NoPartition`.
    pub fn resolve(&self, input: &str) -> CoreResult<&Partition> {
        self.ensure_open()?;
        let key = routing_key(input)?;
        self.resolve_key(key).ok_or(CoreError::NoPartition { key })
    }

    /// Looks up a partition by name.
    #[must_use]
    pub fn resolve_by_name(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name() == name)
    }

    /// Looks up a partition by name, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPartition` if no partition has that name.
    pub fn partition_named(&self, name: &str) -> CoreResult<&Partition> {
        self.resolve_by_name(name)
            .ok_or_else(|| CoreError::UnknownPartition {
                name: name.to_owned(),
            })
    }

    /// Returns every partition in construction order.
    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Returns the keys lost to overlapping ranges.
    #[must_use]
    pub fn shadowed_keys(&self) -> &[ShadowedKey] {
        &self.shadowed
    }

    /// Returns the number of keys with an owning partition.
    #[must_use]
    pub fn covered_keys(&self) -> usize {
        self.key_map.len()
    }

    /// Fails with `ShutDown` once [`PartitionManager::shutdown`] has run.
    ///
    /// # Errors
    ///
    /// Returns `ShutDown` after shutdown.
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.is_shut_down() {
            Err(CoreError::ShutDown)
        } else {
            Ok(())
        }
    }

    /// Returns true once the manager has been shut down.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Closes every partition store.
    ///
    /// New operations are rejected from the first call on. Every store is
    /// closed even if an earlier one fails, and the first failure is
    /// returned. A later call retries the stores that are still open; once
    /// all of them are closed, further calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the first store error raised while closing.
    pub fn shutdown(&self) -> CoreResult<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut first_error = None;
        for partition in &self.partitions {
            if let Err(err) = partition.close() {
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            warn!(%err, "partition manager shutdown incomplete");
            return Err(err);
        }

        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(partitions = self.partitions.len(), "partition manager shut down");
        }
        Ok(())
    }
}

impl std::fmt::Debug for PartitionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionManager")
            .field("partitions", &self.partitions)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Normalizes a routing attribute into its routing key.
///
/// Trims surrounding whitespace, takes the first character and uppercases it.
///
/// # Errors
///
/// Returns `EmptyRoutingKey` if nothing is left after trimming.
pub fn routing_key(input: &str) -> CoreResult<char> {
    input
        .trim()
        .chars()
        .next()
        .map(normalize_key)
        .ok_or(CoreError::EmptyRoutingKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartitionConfig;
    use rollcall_store::{Executed, PartitionStore, QueryGuard, Row, StoreError, StoreResult, Value};
    use std::sync::atomic::AtomicUsize;

    fn memory() -> Box<dyn PartitionStore> {
        Box::new(SqliteStore::open_in_memory().unwrap())
    }

    fn split() -> PartitionManager {
        PartitionManager::open(&ClusterConfig::in_memory()).unwrap()
    }

    #[test]
    fn builds_key_map_for_every_range_key() {
        let pm = split();
        assert_eq!(pm.covered_keys(), 26);
        assert!(pm.shadowed_keys().is_empty());
    }

    #[test]
    fn routing_key_trims_and_uppercases() {
        assert_eq!(routing_key("apple").unwrap(), 'A');
        assert_eq!(routing_key("  ken thompson ").unwrap(), 'K');
        assert_eq!(routing_key("\tZed").unwrap(), 'Z');
    }

    #[test]
    fn routing_key_rejects_empty_input() {
        assert!(matches!(routing_key(""), Err(CoreError::EmptyRoutingKey)));
        assert!(matches!(routing_key("   "), Err(CoreError::EmptyRoutingKey)));
    }

    #[test]
    fn resolve_key_covers_both_ranges() {
        let pm = split();
        assert_eq!(pm.resolve_key('A').unwrap().name(), "enrollment1.db");
        assert_eq!(pm.resolve_key('m').unwrap().name(), "enrollment1.db");
        assert_eq!(pm.resolve_key('N').unwrap().name(), "enrollment2.db");
        assert_eq!(pm.resolve_key('Z').unwrap().name(), "enrollment2.db");
    }

    #[test]
    fn resolve_key_outside_every_range_is_absent() {
        let pm = split();
        assert!(pm.resolve_key('7').is_none());
        assert!(pm.resolve_key('@').is_none());
        assert!(matches!(
            pm.resolve("42 Wallaby Way"),
            Err(CoreError::NoPartition { key: '4' })
        ));
    }

    #[test]
    fn resolve_by_name() {
        let pm = split();
        assert_eq!(
            pm.resolve_by_name("enrollment2.db").unwrap().range().start(),
            'N'
        );
        assert!(pm.resolve_by_name("enrollment3.db").is_none());
        assert!(matches!(
            pm.partition_named("enrollment3.db"),
            Err(CoreError::UnknownPartition { .. })
        ));
    }

    #[test]
    fn later_partition_wins_overlapping_keys() {
        let pm = PartitionManager::new(vec![
            Partition::new("first", 'A', 'M', memory()).unwrap(),
            Partition::new("second", 'K', 'Z', memory()).unwrap(),
        ])
        .unwrap();

        assert_eq!(pm.resolve_key('J').unwrap().name(), "first");
        assert_eq!(pm.resolve_key('K').unwrap().name(), "second");
        assert_eq!(pm.resolve_key('M').unwrap().name(), "second");

        let keys: Vec<char> = pm.shadowed_keys().iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!['K', 'L', 'M']);
        assert!(pm
            .shadowed_keys()
            .iter()
            .all(|s| s.shadowed == "first" && s.owner == "second"));
    }

    #[test]
    fn rejects_empty_and_duplicate_layouts() {
        assert!(matches!(
            PartitionManager::new(Vec::new()),
            Err(CoreError::InvalidConfig { .. })
        ));

        let config = ClusterConfig::new(vec![
            PartitionConfig::in_memory("same", 'A', 'M'),
            PartitionConfig::in_memory("same", 'N', 'Z'),
        ]);
        assert!(matches!(
            PartitionManager::open(&config),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn shutdown_closes_stores_once() {
        let pm = split();
        pm.shutdown().unwrap();
        pm.shutdown().unwrap();

        assert!(pm.is_shut_down());
        assert!(pm.partitions().iter().all(|p| p.store().is_closed()));
        assert!(matches!(pm.resolve("Rob Pike"), Err(CoreError::ShutDown)));
    }

    /// Fails the first `failures` calls to `close`.
    struct StubbornClose {
        inner: SqliteStore,
        failures: AtomicUsize,
    }

    impl PartitionStore for StubbornClose {
        fn execute(&self, statement: &str, params: &[Value], guard: &QueryGuard) -> StoreResult<Executed> {
            self.inner.execute(statement, params, guard)
        }

        fn query(&self, statement: &str, params: &[Value], guard: &QueryGuard) -> StoreResult<Vec<Row>> {
            self.inner.query(statement, params, guard)
        }

        fn execute_batch(&self, statements: &str) -> StoreResult<()> {
            self.inner.execute_batch(statements)
        }

        fn close(&self) -> StoreResult<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Io(std::io::Error::other("close refused")));
            }
            self.inner.close()
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }
    }

    #[test]
    fn failed_close_is_retried_by_next_shutdown() {
        let stubborn = StubbornClose {
            inner: SqliteStore::open_in_memory().unwrap(),
            failures: AtomicUsize::new(1),
        };
        let pm = PartitionManager::new(vec![
            Partition::new("first", 'A', 'M', Box::new(stubborn)).unwrap(),
            Partition::new("second", 'N', 'Z', memory()).unwrap(),
        ])
        .unwrap();

        let err = pm.shutdown().unwrap_err();
        assert_eq!(err.partition(), Some("first"));
        assert!(pm.is_shut_down());
        assert!(!pm.partitions()[0].store().is_closed());
        assert!(pm.partitions()[1].store().is_closed());
        assert!(matches!(pm.resolve("Ken"), Err(CoreError::ShutDown)));

        pm.shutdown().unwrap();
        assert!(pm.partitions().iter().all(|p| p.store().is_closed()));
        pm.shutdown().unwrap();
    }
}
