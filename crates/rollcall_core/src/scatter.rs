//! Scatter-gather execution across partitions.
//!
//! A logical multi-entity query is split into one batched query per
//! partition that actually holds a requested entity. The per-partition rows
//! are merged into a single result keyed by entity.
//!
//! ```text
//! entities ──plan──▶ {partition → ids} ──scatter──▶ per-partition rows ──gather──▶ {entity → records}
//! ```
//!
//! # Identity
//!
//! Entity ids are assigned independently per partition, so the same id can
//! appear in two partitions. Every id used as a merge key is therefore
//! qualified with its partition name ([`QualifiedId`]).
//!
//! # Failure
//!
//! The first failing partition aborts the whole call. In parallel mode the
//! failure cancels every statement still running on other partitions, and
//! no partial result is returned.

use crate::config::FanOut;
use crate::error::{CoreError, CoreResult};
use crate::partition::{routing_key, Partition, PartitionManager};
use parking_lot::Mutex;
use rollcall_store::{CancelToken, QueryGuard, Row, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Marker replaced by the bound id list in a [`BatchQuery`].
pub const IDS_MARKER: &str = "{ids}";

/// An entity that lives in exactly one partition.
pub trait Routable {
    /// The attribute the routing key is derived from.
    fn routing_attr(&self) -> &str;

    /// The partition-local identity.
    fn local_id(&self) -> i64;
}

/// A partition-local id qualified with its partition name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedId {
    /// Name of the owning partition.
    pub partition: String,
    /// Id inside that partition.
    pub id: i64,
}

impl QualifiedId {
    /// Creates a qualified id.
    pub fn new(partition: impl Into<String>, id: i64) -> Self {
        Self {
            partition: partition.into(),
            id,
        }
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.partition, self.id)
    }
}

/// Subquery that expands the bound id array into rows.
const IDS_SUBQUERY: &str = "SELECT value FROM json_each(?1)";

/// A query template with a variable-length `IN` list.
///
/// The template contains [`IDS_MARKER`] exactly once, for example
/// `SELECT ... WHERE s.id IN ({ids})`. The marker becomes a subquery over
/// `?1`, and the whole id set is bound to `?1` as one JSON array. The
/// statement text and the parameter count do not depend on how many ids
/// are asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuery {
    template: String,
    statement: String,
}

impl BatchQuery {
    /// Creates a batch query.
    ///
    /// # Errors
    ///
    /// Returns `Query` unless the template contains the marker exactly once.
    pub fn new(template: impl Into<String>) -> CoreResult<Self> {
        let template = template.into();
        match template.matches(IDS_MARKER).count() {
            1 => {
                let statement = template.replacen(IDS_MARKER, IDS_SUBQUERY, 1);
                Ok(Self { template, statement })
            }
            n => Err(CoreError::query(format!(
                "batch query must contain {IDS_MARKER} exactly once, found {n}"
            ))),
        }
    }

    /// Returns the template text.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the statement sent to every partition.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Returns the parameters for `ids`.
    ///
    /// # Errors
    ///
    /// Returns `Query` if `ids` is empty; an empty batch is never sent.
    pub fn bind(&self, ids: &[i64]) -> CoreResult<Vec<Value>> {
        if ids.is_empty() {
            return Err(CoreError::query("cannot bind a batch query with no ids"));
        }
        Ok(vec![Value::Text(serde_json::to_string(ids)?)])
    }
}

/// The ids one partition must be asked about.
#[derive(Debug)]
pub struct PartitionGroup<'m> {
    partition: &'m Partition,
    ids: Vec<i64>,
}

impl<'m> PartitionGroup<'m> {
    /// Returns the partition.
    #[must_use]
    pub fn partition(&self) -> &'m Partition {
        self.partition
    }

    /// Returns the distinct ids, in first-seen order.
    #[must_use]
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }
}

/// One decoded row: the owning entity's local id, and the associated record
/// if the outer join found one.
pub type Decoded<R> = (i64, Option<R>);

/// Runs queries across the partitions of a [`PartitionManager`].
///
/// Every statement gets its own deadline of `timeout`, counted from the
/// moment that partition's statement starts.
#[derive(Debug, Clone, Copy)]
pub struct ScatterGather<'m> {
    manager: &'m PartitionManager,
    timeout: Duration,
    fan_out: FanOut,
}

impl<'m> ScatterGather<'m> {
    /// Creates an executor with the default fan-out mode.
    #[must_use]
    pub fn new(manager: &'m PartitionManager, timeout: Duration) -> Self {
        Self {
            manager,
            timeout,
            fan_out: FanOut::default(),
        }
    }

    /// Sets the fan-out mode.
    #[must_use]
    pub const fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Returns the partition-qualified identity of `entity`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyRoutingKey` or `NoPartition`.
    pub fn qualify<E: Routable>(&self, entity: &E) -> CoreResult<QualifiedId> {
        let key = routing_key(entity.routing_attr())?;
        let partition = self
            .manager
            .resolve_key(key)
            .ok_or(CoreError::NoPartition { key })?;
        Ok(QualifiedId::new(partition.name(), entity.local_id()))
    }

    /// Groups entity ids by owning partition.
    ///
    /// Groups come back in partition construction order. Partitions with no
    /// requested entity are left out, and repeated entities are collapsed.
    ///
    /// # Errors
    ///
    /// Returns `ShutDown`, or a resolution error for the first entity that
    /// cannot be routed.
    pub fn plan<E: Routable>(&self, entities: &[E]) -> CoreResult<Vec<PartitionGroup<'m>>> {
        self.manager.ensure_open()?;

        let mut by_name: HashMap<String, Vec<i64>> = HashMap::new();
        let mut seen = HashSet::new();
        for entity in entities {
            let qualified = self.qualify(entity)?;
            if seen.insert(qualified.clone()) {
                by_name
                    .entry(qualified.partition)
                    .or_default()
                    .push(qualified.id);
            }
        }

        let groups: Vec<_> = self
            .manager
            .partitions()
            .iter()
            .filter_map(|partition| {
                by_name
                    .remove(partition.name())
                    .filter(|ids| !ids.is_empty())
                    .map(|ids| PartitionGroup { partition, ids })
            })
            .collect();

        debug!(
            entities = entities.len(),
            partitions = groups.len(),
            "scatter plan"
        );
        Ok(groups)
    }

    /// Runs one batched query per relevant partition and merges the rows.
    ///
    /// `query` must select the owning entity's id and outer-join the
    /// associated records, so that an entity without associations still
    /// yields one row. `decode` turns each row into the owner id and the
    /// optional record. Every requested entity appears in the result, with
    /// an empty list if nothing was found.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, storage, timeout or decode error.
    pub fn gather<E, R, F>(
        &self,
        entities: &[E],
        query: &BatchQuery,
        decode: F,
    ) -> CoreResult<HashMap<QualifiedId, Vec<R>>>
    where
        E: Routable,
        R: Send,
        F: Fn(&Row) -> CoreResult<Decoded<R>> + Sync,
    {
        let groups = self.plan(entities)?;

        let partials = self.fan_out_over(&groups, |group, guard| {
            let params = query.bind(&group.ids)?;
            let rows = group.partition.query(query.statement(), &params, guard)?;
            debug!(
                partition = %group.partition.name(),
                ids = group.ids.len(),
                rows = rows.len(),
                "gathered"
            );
            rows.iter().map(&decode).collect::<CoreResult<Vec<_>>>()
        })?;

        let mut merged: HashMap<QualifiedId, Vec<R>> = groups
            .iter()
            .flat_map(|group| {
                group
                    .ids
                    .iter()
                    .map(|&id| (QualifiedId::new(group.partition.name(), id), Vec::new()))
            })
            .collect();

        for (group, rows) in groups.iter().zip(partials) {
            for (owner, record) in rows {
                let key = QualifiedId::new(group.partition.name(), owner);
                let records = merged.get_mut(&key).ok_or_else(|| {
                    CoreError::query(format!("row for unrequested entity {key}"))
                })?;
                records.extend(record);
            }
        }

        Ok(merged)
    }

    /// Like [`ScatterGather::gather`], keyed by the input entities.
    ///
    /// The key set of the result is exactly the set of distinct input
    /// entities.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, storage, timeout or decode error.
    pub fn fetch_associations<E, R, F>(
        &self,
        entities: &[E],
        query: &BatchQuery,
        decode: F,
    ) -> CoreResult<HashMap<E, Vec<R>>>
    where
        E: Routable + Clone + Eq + Hash,
        R: Clone + Send,
        F: Fn(&Row) -> CoreResult<Decoded<R>> + Sync,
    {
        let gathered = self.gather(entities, query, decode)?;

        let mut out = HashMap::with_capacity(entities.len());
        for entity in entities {
            if out.contains_key(entity) {
                continue;
            }
            let records = gathered
                .get(&self.qualify(entity)?)
                .cloned()
                .unwrap_or_default();
            out.insert(entity.clone(), records);
        }
        Ok(out)
    }

    /// Runs the same query on every partition and concatenates the decoded
    /// rows in partition construction order.
    ///
    /// # Errors
    ///
    /// Returns `ShutDown` or the first storage, timeout or decode error.
    pub fn query_all<R, F>(&self, statement: &str, params: &[Value], decode: F) -> CoreResult<Vec<R>>
    where
        R: Send,
        F: Fn(&Row) -> CoreResult<R> + Sync,
    {
        self.manager.ensure_open()?;

        let partials = self.fan_out_over(self.manager.partitions(), |partition, guard| {
            partition
                .query(statement, params, guard)?
                .iter()
                .map(&decode)
                .collect::<CoreResult<Vec<_>>>()
        })?;
        Ok(partials.into_iter().flatten().collect())
    }

    /// Applies `work` to every item, returning results in item order.
    fn fan_out_over<I, T, W>(&self, items: &[I], work: W) -> CoreResult<Vec<T>>
    where
        I: Sync,
        T: Send,
        W: Fn(&I, &QueryGuard) -> CoreResult<T> + Sync,
    {
        if self.fan_out == FanOut::Sequential || items.len() <= 1 {
            return items
                .iter()
                .map(|item| work(item, &QueryGuard::new(self.timeout)))
                .collect();
        }

        let cancel = CancelToken::new();
        let first_error: Mutex<Option<CoreError>> = Mutex::new(None);

        let results: Vec<Option<T>> = thread::scope(|scope| {
            let handles: Vec<_> = items
                .iter()
                .map(|item| {
                    let (work, cancel, first_error) = (&work, &cancel, &first_error);
                    let timeout = self.timeout;
                    scope.spawn(move || {
                        let guard = QueryGuard::new(timeout).with_cancel(cancel.clone());
                        match work(item, &guard) {
                            Ok(value) => Some(value),
                            Err(err) => {
                                let mut slot = first_error.lock();
                                if slot.is_none() {
                                    cancel.cancel();
                                    *slot = Some(err);
                                }
                                None
                            }
                        }
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        });

        if let Some(err) = first_error.into_inner() {
            return Err(err);
        }
        Ok(results.into_iter().flatten().collect())
    }
}
