//! SQLite-backed partition store.

use crate::backend::{Executed, PartitionStore};
use crate::error::{StoreError, StoreResult};
use crate::guard::{Interrupt, QueryGuard};
use crate::value::{Row, Value};
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Target string that opens a private in-memory database.
pub const MEMORY_TARGET: &str = ":memory:";

/// Number of SQLite virtual machine steps between guard checks.
const PROGRESS_STEPS: i32 = 1_000;

/// Connection settings applied when a store is opened.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long SQLite waits on a locked database file before failing.
    pub busy_timeout: Duration,
    /// Whether `PRAGMA foreign_keys` is switched on.
    pub foreign_keys: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(1_000),
            foreign_keys: true,
        }
    }
}

impl StoreOptions {
    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether foreign keys are enforced.
    #[must_use]
    pub const fn foreign_keys(mut self, value: bool) -> Self {
        self.foreign_keys = value;
        self
    }
}

/// A partition store over a single SQLite connection.
///
/// The connection is serialised behind a mutex. Waiting for the mutex counts
/// against the statement's deadline, and a running statement is interrupted
/// through SQLite's progress handler once its guard fires. Waiting on a
/// locked database file never outlasts the deadline either.
///
/// # Example
///
/// ```rust
/// use rollcall_store::{PartitionStore, QueryGuard, SqliteStore, Value};
/// use std::time::Duration;
///
/// let store = SqliteStore::open_in_memory().unwrap();
/// store.execute_batch("CREATE TABLE t (v TEXT)").unwrap();
///
/// let guard = QueryGuard::new(Duration::from_secs(5));
/// store.execute("INSERT INTO t VALUES (?1)", &[Value::from("x")], &guard).unwrap();
/// let rows = store.query("SELECT v FROM t", &[], &guard).unwrap();
/// assert_eq!(rows[0].text(0).unwrap(), "x");
/// ```
#[derive(Debug)]
pub struct SqliteStore {
    target: String,
    busy_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Opens or creates the database at `target`.
    ///
    /// [`MEMORY_TARGET`] opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(target: &str, options: &StoreOptions) -> StoreResult<Self> {
        let conn = if target == MEMORY_TARGET {
            Connection::open_in_memory()?
        } else {
            Connection::open(target)?
        };
        apply_options(&conn, options)?;
        debug!(store = target, "opened sqlite store");

        Ok(Self {
            target: target.to_owned(),
            busy_timeout: options.busy_timeout,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Opens a database file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the database
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path, options: &StoreOptions) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::open(&path.to_string_lossy(), options)
    }

    /// Opens a fresh in-memory store with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(MEMORY_TARGET, &StoreOptions::default())
    }

    /// Returns the target this store was opened with.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Runs `f` against the connection under `guard`.
    fn guarded<T>(
        &self,
        guard: &QueryGuard,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        if let Some(reason) = guard.check() {
            return Err(interrupted(reason, guard));
        }

        let slot = self
            .conn
            .try_lock_until(guard.deadline())
            .ok_or_else(|| interrupted(guard.check().unwrap_or(Interrupt::Deadline), guard))?;
        let conn = slot.as_ref().ok_or(StoreError::Closed)?;

        let remaining = guard.deadline().saturating_duration_since(Instant::now());
        let clamped = remaining < self.busy_timeout;
        conn.busy_timeout(self.busy_timeout.min(remaining))?;
        let watch = guard.clone();
        conn.progress_handler(PROGRESS_STEPS, Some(move || watch.check().is_some()));
        let result = f(conn);
        conn.progress_handler(PROGRESS_STEPS, None::<fn() -> bool>);
        conn.busy_timeout(self.busy_timeout)?;

        result.map_err(|err| {
            if is_interrupt(&err) || (is_busy(&err) && (clamped || guard.check().is_some())) {
                interrupted(guard.check().unwrap_or(Interrupt::Deadline), guard)
            } else {
                StoreError::Sqlite(err)
            }
        })
    }
}

impl PartitionStore for SqliteStore {
    fn execute(
        &self,
        statement: &str,
        params: &[Value],
        guard: &QueryGuard,
    ) -> StoreResult<Executed> {
        self.guarded(guard, |conn| {
            let mut stmt = conn.prepare(statement)?;
            let rows_affected = stmt.execute(params_from_iter(params.iter()))?;
            Ok(Executed {
                rows_affected,
                last_insert_id: conn.last_insert_rowid(),
            })
        })
    }

    fn query(&self, statement: &str, params: &[Value], guard: &QueryGuard) -> StoreResult<Vec<Row>> {
        self.guarded(guard, |conn| {
            let mut stmt = conn.prepare(statement)?;
            let width = stmt.column_count();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;

            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                out.push(Row::new(values));
            }
            Ok(out)
        })
    }

    fn execute_batch(&self, statements: &str) -> StoreResult<()> {
        let slot = self.conn.lock();
        let conn = slot.as_ref().ok_or(StoreError::Closed)?;
        conn.execute_batch(statements)?;
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut slot = self.conn.lock();
        if let Some(conn) = slot.take() {
            if let Err((conn, err)) = conn.close() {
                *slot = Some(conn);
                return Err(err.into());
            }
            debug!(store = %self.target, "closed sqlite store");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

fn apply_options(conn: &Connection, options: &StoreOptions) -> StoreResult<()> {
    if options.foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    }
    conn.busy_timeout(options.busy_timeout)?;
    Ok(())
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn interrupted(reason: Interrupt, guard: &QueryGuard) -> StoreError {
    debug!(?reason, timeout = ?guard.timeout(), "statement interrupted");
    match reason {
        Interrupt::Deadline => StoreError::TimedOut {
            after: guard.timeout(),
        },
        Interrupt::Cancelled => StoreError::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::CancelToken;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    const ENDLESS: &str = "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) \
                           SELECT count(*) FROM n";

    fn guard() -> QueryGuard {
        QueryGuard::new(Duration::from_secs(5))
    }

    fn people() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch(
                "CREATE TABLE people (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, note TEXT);",
            )
            .unwrap();
        store
    }

    #[test]
    fn sqlite_execute_reports_rows_and_insert_id() {
        let store = people();

        let first = store
            .execute("INSERT INTO people (name) VALUES (?1)", &["Rob Pike".into()], &guard())
            .unwrap();
        let second = store
            .execute("INSERT INTO people (name) VALUES (?1)", &["Russ Cox".into()], &guard())
            .unwrap();

        assert_eq!(first.rows_affected, 1);
        assert_eq!(first.last_insert_id, 1);
        assert_eq!(second.last_insert_id, 2);
    }

    #[test]
    fn sqlite_update_without_match_affects_zero_rows() {
        let store = people();
        let done = store
            .execute("UPDATE people SET note = ?1 WHERE id = ?2", &["x".into(), Value::Integer(99)], &guard())
            .unwrap();
        assert_eq!(done.rows_affected, 0);
    }

    #[test]
    fn sqlite_query_returns_rows_in_column_order() {
        let store = people();
        store
            .execute(
                "INSERT INTO people (name, note) VALUES (?1, ?2)",
                &["Ian Taylor".into(), Value::Null],
                &guard(),
            )
            .unwrap();

        let rows = store
            .query("SELECT id, name, note FROM people WHERE name = ?1", &["Ian Taylor".into()], &guard())
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].integer(0).unwrap(), 1);
        assert_eq!(rows[0].text(1).unwrap(), "Ian Taylor");
        assert_eq!(rows[0].opt_text(2).unwrap(), None);
    }

    #[test]
    fn sqlite_statement_error_is_sqlite_error() {
        let store = people();
        let result = store.query("SELECT nope FROM people", &[], &guard());
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn sqlite_expired_guard_refuses_to_start() {
        let store = people();
        let result = store.query("SELECT 1", &[], &QueryGuard::new(Duration::ZERO));
        assert!(matches!(result, Err(StoreError::TimedOut { .. })));
    }

    #[test]
    fn sqlite_long_query_times_out() {
        let store = SqliteStore::open_in_memory().unwrap();
        let guard = QueryGuard::new(Duration::from_millis(50));

        let result = store.query(ENDLESS, &[], &guard);

        match result {
            Err(StoreError::TimedOut { after }) => assert_eq!(after, Duration::from_millis(50)),
            other => panic!("expected timeout, got {other:?}"),
        }

        // The handler is cleared, so the connection stays usable.
        let rows = store.query("SELECT 1", &[], &QueryGuard::new(Duration::from_secs(5))).unwrap();
        assert_eq!(rows[0].integer(0).unwrap(), 1);
    }

    #[test]
    fn sqlite_cancel_interrupts_running_query() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let token = CancelToken::new();
        let guard = QueryGuard::new(Duration::from_secs(30)).with_cancel(token.clone());

        let worker = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.query(ENDLESS, &[], &guard))
        };
        thread::sleep(Duration::from_millis(50));
        token.cancel();

        assert!(matches!(worker.join().unwrap(), Err(StoreError::Cancelled)));
    }

    #[test]
    fn sqlite_waiting_for_busy_connection_counts_against_deadline() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());

        let blocker = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.query(ENDLESS, &[], &QueryGuard::new(Duration::from_millis(500))))
        };
        thread::sleep(Duration::from_millis(100));

        let result = store.query("SELECT 1", &[], &QueryGuard::new(Duration::from_millis(20)));
        assert!(matches!(result, Err(StoreError::TimedOut { .. })));
        assert!(matches!(blocker.join().unwrap(), Err(StoreError::TimedOut { .. })));
    }

    #[test]
    fn sqlite_close_is_idempotent() {
        let store = people();
        assert!(!store.is_closed());

        store.close().unwrap();
        store.close().unwrap();

        assert!(store.is_closed());
        assert!(matches!(store.query("SELECT 1", &[], &guard()), Err(StoreError::Closed)));
        assert!(matches!(store.execute_batch("SELECT 1"), Err(StoreError::Closed)));
    }

    #[test]
    fn sqlite_file_store_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("part.db");

        let store = SqliteStore::open_with_create_dirs(&path, &StoreOptions::default()).unwrap();
        store.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        store.execute("INSERT INTO t VALUES (?1)", &[Value::Integer(42)], &guard()).unwrap();
        store.close().unwrap();

        let reopened = SqliteStore::open(&path.to_string_lossy(), &StoreOptions::default()).unwrap();
        let rows = reopened.query("SELECT v FROM t", &[], &guard()).unwrap();
        assert_eq!(rows[0].integer(0).unwrap(), 42);
    }

    #[test]
    fn locked_file_times_out_at_statement_deadline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part.db");
        let target = path.to_string_lossy();
        let patient = StoreOptions::default().busy_timeout(Duration::from_secs(30));

        let holder = SqliteStore::open(&target, &patient).unwrap();
        holder.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        let waiter = SqliteStore::open(&target, &patient).unwrap();
        let started = Instant::now();
        let result = waiter.query(
            "SELECT v FROM t",
            &[],
            &QueryGuard::new(Duration::from_millis(100)),
        );

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(result, Err(StoreError::TimedOut { .. })));

        holder.execute_batch("COMMIT;").unwrap();
        assert!(waiter.query("SELECT v FROM t", &[], &guard()).unwrap().is_empty());
    }

    #[test]
    fn sqlite_enforces_foreign_keys() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch(
                "CREATE TABLE parent (id INTEGER PRIMARY KEY);
                 CREATE TABLE child (pid INTEGER NOT NULL REFERENCES parent (id));",
            )
            .unwrap();

        let result = store.execute("INSERT INTO child VALUES (?1)", &[Value::Integer(7)], &guard());
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    proptest! {
        #[test]
        fn bound_text_is_never_interpreted(name in "\\PC{0,40}") {
            let store = people();
            store
                .execute("INSERT INTO people (name) VALUES (?1)", &[Value::from(name.as_str())], &guard())
                .unwrap();

            let rows = store
                .query("SELECT name FROM people WHERE name = ?1", &[Value::from(name.as_str())], &guard())
                .unwrap();
            prop_assert_eq!(rows.len(), 1);
            prop_assert_eq!(rows[0].text(0).unwrap(), name.as_str());
        }
    }
}
