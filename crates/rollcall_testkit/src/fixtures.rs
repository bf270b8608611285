//! Test clusters and helpers.
//!
//! A [`TestCluster`] is a ready-to-use [`Registry`] over instrumented
//! partitions: every partition's store is wrapped in a [`FaultyStore`] and a
//! [`CountingStore`], so tests can count statements per partition and make
//! individual partitions fail or stall.

use crate::doubles::{CallCounter, CountingStore, FaultSwitch, FaultyStore};
use rollcall_core::{
    ClusterConfig, FanOut, Partition, PartitionConfig, PartitionManager, Registry, Student,
};
use rollcall_store::{PartitionStore, SqliteStore, StoreOptions};
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

/// Name of the A-M partition in the default layout.
pub const FIRST: &str = "enrollment1.db";

/// Name of the N-Z partition in the default layout.
pub const SECOND: &str = "enrollment2.db";

/// A registry over instrumented partitions, with automatic cleanup.
pub struct TestCluster {
    registry: Registry,
    counters: HashMap<String, CallCounter>,
    switches: HashMap<String, FaultSwitch>,
    _temp_dir: Option<TempDir>,
}

impl TestCluster {
    /// The default A-M / N-Z layout in memory, with schema, in parallel mode.
    pub fn memory() -> Self {
        Self::builder().build()
    }

    /// Like [`TestCluster::memory`], with the sample data written.
    pub fn seeded() -> Self {
        Self::builder().seeded(true).build()
    }

    /// Starts a builder.
    pub fn builder() -> TestClusterBuilder {
        TestClusterBuilder::default()
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the partition manager.
    pub fn manager(&self) -> &PartitionManager {
        self.registry.manager()
    }

    /// Returns the statement counter of a partition.
    ///
    /// # Panics
    ///
    /// Panics if no partition has that name.
    pub fn counter(&self, partition: &str) -> &CallCounter {
        self.counters
            .get(partition)
            .unwrap_or_else(|| panic!("no partition named {partition}"))
    }

    /// Returns the fault switch of a partition.
    ///
    /// # Panics
    ///
    /// Panics if no partition has that name.
    pub fn fault(&self, partition: &str) -> &FaultSwitch {
        self.switches
            .get(partition)
            .unwrap_or_else(|| panic!("no partition named {partition}"))
    }

    /// Total `query` calls across every partition.
    pub fn total_queries(&self) -> usize {
        self.counters.values().map(CallCounter::queries).sum()
    }

    /// Clears every counter.
    pub fn reset_counters(&self) {
        self.counters.values().for_each(CallCounter::reset);
    }

    /// Adds a student, panicking on failure.
    pub fn student(&self, name: &str) -> Student {
        self.registry
            .add_student(name, None)
            .unwrap_or_else(|e| panic!("failed to add {name}: {e}"))
    }
}

impl std::ops::Deref for TestCluster {
    type Target = Registry;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}

/// Builder for [`TestCluster`].
#[derive(Debug, Clone)]
pub struct TestClusterBuilder {
    layout: Vec<PartitionConfig>,
    timeout: Duration,
    fan_out: FanOut,
    on_disk: bool,
    seeded: bool,
}

impl Default for TestClusterBuilder {
    fn default() -> Self {
        Self {
            layout: ClusterConfig::in_memory().partitions,
            timeout: Duration::from_secs(5),
            fan_out: FanOut::Parallel,
            on_disk: false,
            seeded: false,
        }
    }
}

impl TestClusterBuilder {
    /// Replaces the layout. Targets are ignored; every partition gets its
    /// own fresh database.
    #[must_use]
    pub fn layout(mut self, layout: Vec<PartitionConfig>) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the per-statement deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the scatter-gather execution mode.
    #[must_use]
    pub fn fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Stores partitions as files in a temporary directory.
    #[must_use]
    pub fn on_disk(mut self, on_disk: bool) -> Self {
        self.on_disk = on_disk;
        self
    }

    /// Writes the sample data after creating the schema.
    #[must_use]
    pub fn seeded(mut self, seeded: bool) -> Self {
        self.seeded = seeded;
        self
    }

    /// Opens the cluster.
    ///
    /// # Panics
    ///
    /// Panics if any partition cannot be opened or prepared.
    pub fn build(self) -> TestCluster {
        let temp_dir = self
            .on_disk
            .then(|| TempDir::new().expect("Failed to create temp directory"));

        let mut counters = HashMap::new();
        let mut switches = HashMap::new();
        let mut partitions = Vec::with_capacity(self.layout.len());

        for entry in &self.layout {
            let sqlite = match &temp_dir {
                Some(dir) => SqliteStore::open_with_create_dirs(
                    &dir.path().join(&entry.name),
                    &StoreOptions::default(),
                ),
                None => SqliteStore::open_in_memory(),
            }
            .expect("Failed to open partition store");

            let faulty = FaultyStore::new(Box::new(sqlite));
            switches.insert(entry.name.clone(), faulty.switch());
            let counting = CountingStore::new(Box::new(faulty));
            counters.insert(entry.name.clone(), counting.counter());

            let store: Box<dyn PartitionStore> = Box::new(counting);
            partitions.push(
                Partition::new(entry.name.clone(), entry.range_start, entry.range_end, store)
                    .expect("Invalid partition"),
            );
        }

        let manager = PartitionManager::new(partitions).expect("Invalid partition layout");
        let registry = Registry::new(manager, self.timeout).with_fan_out(self.fan_out);
        registry.create_schema().expect("Failed to create schema");
        if self.seeded {
            rollcall_core::seed(&registry).expect("Failed to write sample data");
        }

        let cluster = TestCluster {
            registry,
            counters,
            switches,
            _temp_dir: temp_dir,
        };
        cluster.reset_counters();
        cluster
    }
}

/// Runs a test against a fresh in-memory cluster.
pub fn with_cluster<F, R>(f: F) -> R
where
    F: FnOnce(&TestCluster) -> R,
{
    let cluster = TestCluster::memory();
    f(&cluster)
}
