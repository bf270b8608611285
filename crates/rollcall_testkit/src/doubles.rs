//! Store test doubles.
//!
//! Both doubles wrap another [`PartitionStore`] and hand out cloneable
//! handles, so a test can keep observing or steering a store after the
//! store itself has been moved into a partition.

use parking_lot::Mutex;
use rollcall_store::{
    Executed, Interrupt, PartitionStore, QueryGuard, Row, StoreError, StoreResult, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A statement seen by a [`CountingStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The SQL text.
    pub statement: String,
    /// The bound parameters.
    pub params: Vec<Value>,
}

/// Shared view of the calls made against a [`CountingStore`].
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    queries: Arc<AtomicUsize>,
    executes: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallCounter {
    /// Number of `query` calls.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of `execute` calls.
    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    /// Every recorded `query` and `execute` call, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// The most recent call, if any.
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls.lock().last().cloned()
    }

    /// Clears every count.
    pub fn reset(&self) {
        self.queries.store(0, Ordering::SeqCst);
        self.executes.store(0, Ordering::SeqCst);
        self.calls.lock().clear();
    }

    fn record(&self, counter: &AtomicUsize, statement: &str, params: &[Value]) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(RecordedCall {
            statement: statement.to_owned(),
            params: params.to_vec(),
        });
    }
}

/// A store that counts the statements passed through it.
///
/// DDL sent through `execute_batch` is not counted.
pub struct CountingStore {
    inner: Box<dyn PartitionStore>,
    counter: CallCounter,
}

impl CountingStore {
    /// Wraps `inner`.
    pub fn new(inner: Box<dyn PartitionStore>) -> Self {
        Self {
            inner,
            counter: CallCounter::default(),
        }
    }

    /// Returns a handle to the counts.
    pub fn counter(&self) -> CallCounter {
        self.counter.clone()
    }
}

impl PartitionStore for CountingStore {
    fn execute(&self, statement: &str, params: &[Value], guard: &QueryGuard) -> StoreResult<Executed> {
        self.counter
            .record(&self.counter.executes, statement, params);
        self.inner.execute(statement, params, guard)
    }

    fn query(&self, statement: &str, params: &[Value], guard: &QueryGuard) -> StoreResult<Vec<Row>> {
        self.counter
            .record(&self.counter.queries, statement, params);
        self.inner.query(statement, params, guard)
    }

    fn execute_batch(&self, statements: &str) -> StoreResult<()> {
        self.inner.execute_batch(statements)
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// What a [`FaultyStore`] does with the next statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    /// Pass every statement through.
    #[default]
    None,
    /// Fail every statement at once with `StoreError::Closed`.
    Fail,
    /// Block every statement until its guard's deadline passes or its
    /// cancel token fires.
    Stall,
}

/// Handle that switches the fault of a [`FaultyStore`].
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    fault: Arc<Mutex<Fault>>,
}

impl FaultSwitch {
    /// Sets the fault.
    pub fn set(&self, fault: Fault) {
        *self.fault.lock() = fault;
    }

    /// Returns the current fault.
    pub fn get(&self) -> Fault {
        *self.fault.lock()
    }
}

/// A store that fails or stalls on demand.
pub struct FaultyStore {
    inner: Box<dyn PartitionStore>,
    switch: FaultSwitch,
}

impl FaultyStore {
    /// Wraps `inner` with no fault active.
    pub fn new(inner: Box<dyn PartitionStore>) -> Self {
        Self {
            inner,
            switch: FaultSwitch::default(),
        }
    }

    /// Returns the switch controlling this store.
    pub fn switch(&self) -> FaultSwitch {
        self.switch.clone()
    }

    fn inject(&self, guard: &QueryGuard) -> StoreResult<()> {
        match self.switch.get() {
            Fault::None => Ok(()),
            Fault::Fail => Err(StoreError::Closed),
            Fault::Stall => loop {
                match guard.check() {
                    Some(Interrupt::Deadline) => {
                        return Err(StoreError::TimedOut {
                            after: guard.timeout(),
                        })
                    }
                    Some(Interrupt::Cancelled) => return Err(StoreError::Cancelled),
                    None => thread::sleep(Duration::from_millis(2)),
                }
            },
        }
    }
}

impl PartitionStore for FaultyStore {
    fn execute(&self, statement: &str, params: &[Value], guard: &QueryGuard) -> StoreResult<Executed> {
        self.inject(guard)?;
        self.inner.execute(statement, params, guard)
    }

    fn query(&self, statement: &str, params: &[Value], guard: &QueryGuard) -> StoreResult<Vec<Row>> {
        self.inject(guard)?;
        self.inner.query(statement, params, guard)
    }

    fn execute_batch(&self, statements: &str) -> StoreResult<()> {
        self.inner.execute_batch(statements)
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
