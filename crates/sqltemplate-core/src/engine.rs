//! The execution engine boundary.
//!
//! sqltemplate never talks to a database itself. An [`Engine`] runs
//! statements and opens transactions; a transaction handle implements
//! [`TransactionOps`]. Pooling, dialects, transport and cursor management all
//! live behind these traits.
//!
//! All operations take a [`Cx`] so engines can honour cancellation and
//! budgets; results use asupersync's [`Outcome`]. The facade converts them to a
//! plain [`Result`](crate::Result) with
//! [`OutcomeExt::into_sql_result`](crate::error::OutcomeExt::into_sql_result).

use std::future::Future;

use asupersync::{Cx, Outcome};

use crate::error::Error;
use crate::rowset::RowSet;
use crate::value::Value;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling, for engines that issue `SET TRANSACTION ISOLATION LEVEL`.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Whether a transactional call joins its caller's transaction or starts
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Join the enclosing transaction when one is passed in, otherwise start one.
    #[default]
    Required,
    /// Always start an independent transaction.
    RequiresNew,
}

impl std::str::FromStr for Propagation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "REQUIRED" => Ok(Propagation::Required),
            "REQUIRES_NEW" => Ok(Propagation::RequiresNew),
            other => Err(Error::custom(format!(
                "unknown propagation '{other}', expected REQUIRED or REQUIRES_NEW"
            ))),
        }
    }
}

/// Options forwarded to [`Engine::begin_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionOptions {
    /// Isolation level, or the engine default when `None`.
    pub isolation: Option<IsolationLevel>,
    /// Hint that the transaction performs no writes.
    pub read_only: bool,
}

/// Statement execution inside an open transaction.
///
/// `commit` and `rollback` consume the handle: a transaction completes at
/// most once. Dropping a handle without completing it must roll back.
pub trait TransactionOps: Send + Sync {
    /// Run a query and stream its rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<RowSet, Error>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Run an INSERT and return the key of the last inserted row, `None`
    /// when no row was inserted.
    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send;

    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;
}

/// A database (or data source) able to run statements and open transactions.
///
/// Statements issued directly on the engine run in auto-commit mode.
pub trait Engine: Send + Sync {
    /// Transaction handle type.
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<RowSet, Error>> + Send;

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<i64>, Error>> + Send;

    /// Open a new, independent transaction.
    fn begin_with(
        &self,
        cx: &Cx,
        options: TransactionOptions,
    ) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send;

    /// Open a transaction with default options.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, Error>> + Send {
        self.begin_with(cx, TransactionOptions::default())
    }
}
