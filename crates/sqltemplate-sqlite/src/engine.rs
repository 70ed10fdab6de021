//! `SqliteEngine` and its transactions.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use asupersync::{Cx, Outcome};
use rusqlite::Connection;
use sqltemplate_core::{
    DataAccessErrorKind, Engine, Error, IsolationLevel, Result, RowSet, TransactionOps,
    TransactionOptions, Value,
};

use crate::config::SqliteConfig;
use crate::convert::{self, data_access_error};

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    config: SqliteConfig,
    /// Connections not bound to a transaction, all in auto-commit mode.
    idle: Mutex<Vec<Connection>>,
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
    /// Owns the private database directory; declared last so the idle
    /// connections close before it is removed.
    _temp_dir: Option<tempfile::TempDir>,
}

/// An engine over a SQLite database in WAL mode.
///
/// Clones share the same database and connection pool. Statements issued on
/// the engine itself run in auto-commit mode on a pooled connection; every
/// transaction holds its own connection until it completes, so readers see
/// the last committed state and never block on a writer. SQLite admits one
/// writer at a time: a second writer waits up to
/// [`SqliteConfig::busy_timeout`] and then fails with a `Timeout` error.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    shared: Arc<Shared>,
}

impl SqliteEngine {
    /// Open the database described by `config`.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let (path, temp_dir) = match &config.path {
            Some(path) => (path.clone(), None),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("sqltemplate-")
                    .tempdir()
                    .map_err(|e| {
                        Error::data_access(
                            DataAccessErrorKind::Connection,
                            format!("failed to create database directory: {e}"),
                        )
                    })?;
                (dir.path().join("db.sqlite"), Some(dir))
            }
        };

        let first = connect(&path, &config)?;
        let mode: String = first
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(data_access_error)?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "Opened SQLite database");

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                config,
                idle: Mutex::new(vec![first]),
                fail_next_commit: AtomicBool::new(false),
                fail_next_rollback: AtomicBool::new(false),
                _temp_dir: temp_dir,
            }),
        })
    }

    /// Open a private database that lives as long as the engine.
    pub fn temporary() -> Result<Self> {
        Self::open(SqliteConfig::default())
    }

    /// Create a private database and run `statements` against it,
    /// typically `CREATE TABLE` and seed `INSERT`s.
    pub fn with_tables<I, S>(statements: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let engine = Self::temporary()?;
        for sql in statements {
            let sql = sql.as_ref();
            engine
                .with_connection(|conn| conn.execute_batch(sql).map_err(data_access_error))
                .map_err(|e| e.with_sql(sql))?;
        }
        Ok(engine)
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.shared.config
    }

    /// Make the next commit on any transaction fail. The transaction is
    /// rolled back instead.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next rollback report a failure. The changes are discarded
    /// regardless.
    pub fn fail_next_rollback(&self) {
        self.shared.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    /// Number of committed rows in `table`, `None` if it does not exist.
    pub fn committed_rows(&self, table: &str) -> Option<usize> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", table.replace('"', "\"\""));
        let counted = self.with_connection(|conn| {
            conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
                .map_err(data_access_error)
        });
        match counted {
            Ok(n) => usize::try_from(n).ok(),
            Err(e) => {
                if e.data_access_kind() != Some(DataAccessErrorKind::NotFound) {
                    tracing::warn!(table, error = %e, "Failed to count committed rows");
                }
                None
            }
        }
    }

    /// Names of the user tables, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .map_err(data_access_error)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(data_access_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(data_access_error)?;
            Ok(names)
        })
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.shared
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn checkout(&self) -> Result<Connection> {
        if let Some(conn) = self.idle().pop() {
            return Ok(conn);
        }
        connect(&self.shared.path, &self.shared.config)
    }

    /// Return a connection to the pool, resetting any transaction state.
    fn checkin(&self, conn: Connection, read_only: bool) {
        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "Discarding connection that failed to roll back");
                return;
            }
        }
        if read_only {
            if let Err(e) = conn.pragma_update(None, "query_only", false) {
                tracing::warn!(error = %e, "Discarding connection stuck in query-only mode");
                return;
            }
        }
        self.idle().push(conn);
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.checkout()?;
        let result = f(&conn);
        self.checkin(conn, false);
        result
    }

    fn begin_transaction(&self, options: TransactionOptions) -> Result<SqliteTransaction<'_>> {
        let conn = self.checkout()?;
        let begin = if options.read_only {
            conn.pragma_update(None, "query_only", true)
                .and_then(|()| conn.execute_batch("BEGIN DEFERRED"))
        } else if options.isolation == Some(IsolationLevel::Serializable) {
            // Take the write lock up front so the transaction never has to
            // upgrade a stale snapshot.
            conn.execute_batch("BEGIN IMMEDIATE")
        } else {
            conn.execute_batch("BEGIN DEFERRED")
        };
        if let Err(e) = begin {
            let err = data_access_error(e);
            self.checkin(conn, options.read_only);
            return Err(err);
        }
        Ok(SqliteTransaction {
            engine: self,
            conn: Mutex::new(Some(conn)),
            read_only: options.read_only,
        })
    }
}

fn connect(path: &Path, config: &SqliteConfig) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| {
        let mut err = data_access_error(e);
        if let Error::DataAccess(inner) = &mut err {
            inner.kind = DataAccessErrorKind::Connection;
        }
        err
    })?;
    conn.busy_timeout(config.busy_timeout)
        .map_err(data_access_error)?;
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)
        .map_err(data_access_error)?;
    tracing::trace!(path = %path.display(), "Opened SQLite connection");
    Ok(conn)
}

fn outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::Err(e),
    }
}

impl Engine for SqliteEngine {
    type Tx<'conn>
        = SqliteTransaction<'conn>
    where
        Self: 'conn;

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<RowSet, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome(self.with_connection(|conn| convert::query(conn, sql, params)))
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome(self.with_connection(|conn| convert::execute(conn, sql, params)))
        }
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome(self.with_connection(|conn| convert::insert(conn, sql, params)))
        }
    }

    fn begin_with(
        &self,
        cx: &Cx,
        options: TransactionOptions,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            tracing::debug!(
                isolation = ?options.isolation,
                read_only = options.read_only,
                "Beginning SQLite transaction"
            );
            outcome(self.begin_transaction(options))
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// A transaction on a [`SqliteEngine`], bound to one pooled connection.
///
/// Isolation levels other than `Serializable` begin a deferred transaction;
/// `Serializable` takes the write lock at begin. Read-only transactions run
/// with `query_only` set, so writes fail with a `Transaction` error.
/// Dropping the handle without completing it rolls back.
#[derive(Debug)]
pub struct SqliteTransaction<'conn> {
    engine: &'conn SqliteEngine,
    conn: Mutex<Option<Connection>>,
    read_only: bool,
}

impl SqliteTransaction<'_> {
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Error::data_access(
                DataAccessErrorKind::Transaction,
                "transaction already completed",
            )),
        }
    }

    fn take_conn(&mut self) -> Option<Connection> {
        self.conn
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn finish(&mut self, commit: bool) -> Result<()> {
        let Some(conn) = self.take_conn() else {
            return Err(Error::data_access(
                DataAccessErrorKind::Transaction,
                "transaction already completed",
            ));
        };
        let engine = self.engine;
        let result = if commit {
            if engine.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
                Err(Error::data_access(
                    DataAccessErrorKind::Transaction,
                    "commit failed (injected)",
                ))
            } else {
                conn.execute_batch("COMMIT").map_err(data_access_error)
            }
        } else {
            let rolled_back = conn.execute_batch("ROLLBACK").map_err(data_access_error);
            if engine.shared.fail_next_rollback.swap(false, Ordering::SeqCst) {
                Err(Error::data_access(
                    DataAccessErrorKind::Transaction,
                    "rollback failed (injected)",
                ))
            } else {
                rolled_back
            }
        };
        // A failed COMMIT leaves the transaction open; checkin rolls it back.
        engine.checkin(conn, self.read_only);
        result
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.take_conn() {
            tracing::debug!("Rolling back abandoned SQLite transaction");
            self.engine.checkin(conn, self.read_only);
        }
    }
}

impl TransactionOps for SqliteTransaction<'_> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<RowSet, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome(self.with_conn(|conn| convert::query(conn, sql, params)))
        }
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome(self.with_conn(|conn| convert::execute(conn, sql, params)))
        }
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome(self.with_conn(|conn| convert::insert(conn, sql, params)))
        }
    }

    fn commit(mut self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                // Dropping `self` rolls back.
                return Outcome::Cancelled(reason);
            }
            let result = self.finish(true);
            tracing::debug!(ok = result.is_ok(), "Commit");
            outcome(result)
        }
    }

    fn rollback(mut self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        // Rollback must also run for cancelled contexts, so no cancellation
        // check here.
        async move {
            let result = self.finish(false);
            tracing::debug!(ok = result.is_ok(), "Rollback");
            outcome(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use std::time::Duration;

    fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    fn engine() -> SqliteEngine {
        SqliteEngine::with_tables([
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)",
            "INSERT INTO t (v) VALUES ('seed')",
        ])
        .expect("create table")
    }

    #[test]
    fn test_transaction_isolated_until_commit() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let engine = engine();

        rt.block_on(async {
            let tx = unwrap_outcome(engine.begin(&cx).await);
            let key = unwrap_outcome(
                tx.insert(&cx, "INSERT INTO t (v) VALUES (?)", &[Value::from("x")])
                    .await,
            );
            assert_eq!(key, Some(2));

            let inside = unwrap_outcome(tx.query(&cx, "SELECT * FROM t", &[]).await);
            assert_eq!(inside.count(), 2);
            assert_eq!(engine.committed_rows("t"), Some(1));

            unwrap_outcome(tx.commit(&cx).await);
            assert_eq!(engine.committed_rows("t"), Some(2));
        });
    }

    #[test]
    fn test_rollback_and_drop_discard() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let engine = engine();

        rt.block_on(async {
            let tx = unwrap_outcome(engine.begin(&cx).await);
            unwrap_outcome(tx.execute(&cx, "DELETE FROM t", &[]).await);
            unwrap_outcome(tx.rollback(&cx).await);

            let tx = unwrap_outcome(engine.begin(&cx).await);
            unwrap_outcome(tx.execute(&cx, "DELETE FROM t", &[]).await);
            drop(tx);

            // The abandoned transaction released its write lock.
            let n = unwrap_outcome(engine.execute(&cx, "UPDATE t SET v = 'after'", &[]).await);
            assert_eq!(n, 1);
        });
        assert_eq!(engine.committed_rows("t"), Some(1));
    }

    #[test]
    fn test_second_writer_times_out() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let engine = SqliteEngine::open(
            SqliteConfig::default().with_busy_timeout(Duration::from_millis(20)),
        )
        .expect("open engine");

        rt.block_on(async {
            unwrap_outcome(
                engine
                    .execute(&cx, "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
                    .await,
            );
            let first = unwrap_outcome(engine.begin(&cx).await);
            let second = unwrap_outcome(engine.begin(&cx).await);
            unwrap_outcome(first.execute(&cx, "INSERT INTO t (v) VALUES ('a')", &[]).await);
            match second.execute(&cx, "INSERT INTO t (v) VALUES ('b')", &[]).await {
                Outcome::Err(e) => {
                    assert_eq!(e.data_access_kind(), Some(DataAccessErrorKind::Timeout));
                    assert!(e.primary().is_data_access());
                }
                other => panic!("expected busy timeout, got {other:?}"),
            }
            unwrap_outcome(second.rollback(&cx).await);
            unwrap_outcome(first.commit(&cx).await);
        });
        assert_eq!(engine.committed_rows("t"), Some(1));
    }

    #[test]
    fn test_injected_failures() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let engine = engine();

        rt.block_on(async {
            engine.fail_next_commit();
            let tx = unwrap_outcome(engine.begin(&cx).await);
            unwrap_outcome(tx.execute(&cx, "DELETE FROM t", &[]).await);
            assert!(matches!(tx.commit(&cx).await, Outcome::Err(_)));
            assert_eq!(engine.committed_rows("t"), Some(1));

            engine.fail_next_rollback();
            let tx = unwrap_outcome(engine.begin(&cx).await);
            unwrap_outcome(tx.execute(&cx, "DELETE FROM t", &[]).await);
            assert!(matches!(tx.rollback(&cx).await, Outcome::Err(_)));
            assert_eq!(engine.committed_rows("t"), Some(1));

            // Flags are one-shot.
            let tx = unwrap_outcome(engine.begin(&cx).await);
            unwrap_outcome(tx.commit(&cx).await);
        });
    }

    #[test]
    fn test_autocommit_and_read_only() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let engine = engine();

        rt.block_on(async {
            let n = unwrap_outcome(
                engine
                    .execute(&cx, "UPDATE t SET v = ? WHERE id = 1", &[Value::from("y")])
                    .await,
            );
            assert_eq!(n, 1);

            let options = TransactionOptions {
                isolation: None,
                read_only: true,
            };
            let tx = unwrap_outcome(engine.begin_with(&cx, options).await);
            match tx.execute(&cx, "DELETE FROM t", &[]).await {
                Outcome::Err(e) => {
                    assert_eq!(e.data_access_kind(), Some(DataAccessErrorKind::Transaction));
                }
                other => panic!("expected read-only failure, got {other:?}"),
            }
            let rows = unwrap_outcome(tx.query(&cx, "SELECT v FROM t", &[]).await);
            let values: Vec<String> = rows.map(|r| r.unwrap().string("v").unwrap()).collect();
            assert_eq!(values, vec!["y"]);
            unwrap_outcome(tx.rollback(&cx).await);

            // The pooled connection is writable again.
            let n = unwrap_outcome(engine.execute(&cx, "DELETE FROM t", &[]).await);
            assert_eq!(n, 1);
        });
        assert_eq!(engine.table_names().unwrap(), vec!["t".to_string()]);
    }

    #[test]
    fn test_cancelled_context_skips_work() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let engine = engine();

        rt.block_on(async {
            let tx = unwrap_outcome(engine.begin(&cx).await);
            unwrap_outcome(tx.execute(&cx, "DELETE FROM t", &[]).await);

            cx.cancel_with(asupersync::CancelKind::User, Some("shutting down"));
            assert!(matches!(
                engine.query(&cx, "SELECT * FROM t", &[]).await,
                Outcome::Cancelled(_)
            ));
            assert!(matches!(tx.commit(&cx).await, Outcome::Cancelled(_)));
        });
        assert_eq!(engine.committed_rows("t"), Some(1));
    }

    #[test]
    fn test_key_after_largest_rowid() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let engine = engine();

        rt.block_on(async {
            let top = unwrap_outcome(
                engine
                    .insert(&cx, "INSERT INTO t (id, v) VALUES (?, 'top')", &[Value::BigInt(i64::MAX)])
                    .await,
            );
            assert_eq!(top, Some(i64::MAX));

            // SQLite picks an unused key once the largest one is taken.
            let next = unwrap_outcome(engine.insert(&cx, "INSERT INTO t (v) VALUES ('next')", &[]).await);
            assert!(matches!(next, Some(k) if k > 0 && k != i64::MAX));
        });
        assert_eq!(engine.committed_rows("t"), Some(3));
    }

    #[test]
    fn test_file_database_persists_across_engines() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = SqliteConfig::new().with_path(dir.path().join("app.db"));
        {
            let engine = SqliteEngine::open(config.clone()).expect("open");
            engine
                .with_connection(|conn| {
                    conn.execute_batch("CREATE TABLE k (id INTEGER PRIMARY KEY); INSERT INTO k DEFAULT VALUES;")
                        .map_err(data_access_error)
                })
                .expect("seed");
        }
        let reopened = SqliteEngine::open(config).expect("reopen");
        assert_eq!(reopened.committed_rows("k"), Some(1));
        assert_eq!(reopened.committed_rows("missing"), None);
    }
}
