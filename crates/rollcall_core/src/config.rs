//! Cluster configuration.

use crate::error::CoreResult;
use rollcall_store::{StoreOptions, MEMORY_TARGET};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default per-statement deadline.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 1_000;

/// One partition in the static layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Unique partition name.
    pub name: String,
    /// Storage target: a database file path, or `:memory:`.
    pub target: String,
    /// First routing key covered (inclusive).
    pub range_start: char,
    /// Last routing key covered (inclusive).
    pub range_end: char,
}

impl PartitionConfig {
    /// Creates a partition entry.
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        range_start: char,
        range_end: char,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            range_start,
            range_end,
        }
    }

    /// Creates an entry backed by a private in-memory database.
    pub fn in_memory(name: impl Into<String>, range_start: char, range_end: char) -> Self {
        Self::new(name, MEMORY_TARGET, range_start, range_end)
    }
}

/// How the scatter-gather executor visits partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// One partition after another on the calling thread.
    Sequential,
    /// One scoped thread per partition, joined before merging.
    #[default]
    Parallel,
}

/// The static partition layout plus statement settings.
///
/// The layout is read once at startup. Nothing here changes at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Partitions in construction order. Later entries shadow earlier ones
    /// where ranges overlap.
    pub partitions: Vec<PartitionConfig>,

    /// Deadline applied to every individual statement, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// SQLite busy timeout, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Scatter-gather execution mode.
    #[serde(default)]
    pub fan_out: FanOut,
}

const fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for ClusterConfig {
    /// Two file partitions: `enrollment1.db` for A-M and `enrollment2.db` for N-Z.
    fn default() -> Self {
        Self::new(vec![
            PartitionConfig::new("enrollment1.db", "enrollment1.db", 'A', 'M'),
            PartitionConfig::new("enrollment2.db", "enrollment2.db", 'N', 'Z'),
        ])
    }
}

impl ClusterConfig {
    /// Creates a configuration with default statement settings.
    pub fn new(partitions: Vec<PartitionConfig>) -> Self {
        Self {
            partitions,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            fan_out: FanOut::default(),
        }
    }

    /// The default A-M / N-Z layout on in-memory databases.
    pub fn in_memory() -> Self {
        Self::new(vec![
            PartitionConfig::in_memory("enrollment1.db", 'A', 'M'),
            PartitionConfig::in_memory("enrollment2.db", 'N', 'Z'),
        ])
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the JSON is malformed.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> CoreResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Appends a partition.
    #[must_use]
    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partitions.push(partition);
        self
    }

    /// Sets the per-statement deadline.
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the scatter-gather execution mode.
    #[must_use]
    pub const fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Rebases every relative file target onto `dir`.
    #[must_use]
    pub fn rooted_at(mut self, dir: &Path) -> Self {
        for partition in &mut self.partitions {
            if partition.target != MEMORY_TARGET && Path::new(&partition.target).is_relative() {
                partition.target = dir.join(&partition.target).to_string_lossy().into_owned();
            }
        }
        self
    }

    /// Returns the per-statement deadline.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Returns the store options derived from this configuration.
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default().busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_layout_splits_alphabet() {
        let config = ClusterConfig::default();
        assert_eq!(config.partitions.len(), 2);
        assert_eq!(config.partitions[0].range_start, 'A');
        assert_eq!(config.partitions[0].range_end, 'M');
        assert_eq!(config.partitions[1].range_start, 'N');
        assert_eq!(config.partitions[1].range_end, 'Z');
        assert_eq!(config.query_timeout(), Duration::from_secs(5));
        assert_eq!(config.fan_out, FanOut::Parallel);
    }

    #[test]
    fn builder_pattern() {
        let config = ClusterConfig::new(Vec::new())
            .with_partition(PartitionConfig::in_memory("all", 'A', 'Z'))
            .with_query_timeout(Duration::from_millis(250))
            .with_fan_out(FanOut::Sequential);

        assert_eq!(config.partitions.len(), 1);
        assert_eq!(config.query_timeout_ms, 250);
        assert_eq!(config.fan_out, FanOut::Sequential);
    }

    #[test]
    fn json_defaults_missing_settings() {
        let config = ClusterConfig::from_json_str(
            r#"{"partitions": [{"name": "p1", "target": "p1.db", "range_start": "a", "range_end": "z"}]}"#,
        )
        .unwrap();

        assert_eq!(config.partitions[0].range_start, 'a');
        assert_eq!(config.query_timeout_ms, DEFAULT_QUERY_TIMEOUT_MS);
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(config.fan_out, FanOut::Parallel);
    }

    #[test]
    fn json_rejects_garbage() {
        let err = ClusterConfig::from_json_str("{\"partitions\": 3}").unwrap_err();
        assert!(matches!(err, crate::CoreError::InvalidConfig { .. }));
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cluster.json");
        let config = ClusterConfig::default().with_fan_out(FanOut::Sequential);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(ClusterConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn rooted_at_only_touches_relative_files() {
        let dir = Path::new("/var/lib/rollcall");
        let config = ClusterConfig::new(vec![
            PartitionConfig::new("rel", "rel.db", 'A', 'F'),
            PartitionConfig::new("abs", "/tmp/abs.db", 'G', 'P'),
            PartitionConfig::in_memory("mem", 'Q', 'Z'),
        ])
        .rooted_at(dir);

        assert_eq!(
            config.partitions[0].target,
            dir.join("rel.db").to_string_lossy()
        );
        assert_eq!(config.partitions[1].target, "/tmp/abs.db");
        assert_eq!(config.partitions[2].target, MEMORY_TARGET);
    }
}
