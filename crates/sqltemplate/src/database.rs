//! The query facade.
//!
//! [`Database`] wraps an [`Engine`] and offers the application-facing
//! operations: typed queries driven by extractors, auto-committed writes, and
//! transactions. Every method takes the caller's [`Cx`] and returns a plain
//! [`Result`]; engine cancellation surfaces as a data access error of kind
//! `Cancelled`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqltemplate::prelude::*;
//!
//! let db = Database::new(SqliteEngine::temporary()?);
//! let ids: Vec<i64> = db
//!     .query_list(&cx, "SELECT id FROM users ORDER BY id", |row: &Row| row.long("id"))
//!     .await?;
//!
//! let db = Database::builder()
//!     .with_transaction_config(TransactionConfig::default().with_rollback_on_extraction_error(true))
//!     .build_with(engine);
//! ```

use sqltemplate_core::extract::{self, Extractor, RowSetExtractor};
use sqltemplate_core::{Cx, Engine, OutcomeExt, Result, RowSet, Statement};
use sqltemplate_session::{TransactionConfig, TransactionRunner, TransactionScope};

/// Application entry point for queries and transactions over an engine.
#[derive(Debug)]
pub struct Database<E: Engine> {
    /// The underlying engine
    engine: E,
    /// Configuration for transactions begun through [`Database::transaction`]
    config: TransactionConfig,
}

impl<E: Engine> Database<E> {
    /// Create a database with the default transaction configuration.
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            config: TransactionConfig::default(),
        }
    }

    #[must_use]
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Consume the database and return the underlying engine.
    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn transaction_config(&self) -> &TransactionConfig {
        &self.config
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Run a query expected to return exactly one row and extract it.
    ///
    /// Zero or several rows fail with a cardinality error without running
    /// the extractor.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn query_one<T, X>(
        &self,
        cx: &Cx,
        statement: impl Into<Statement>,
        extractor: X,
    ) -> Result<T>
    where
        X: Extractor<T>,
    {
        let mut rows = self.fetch(cx, statement.into()).await?;
        extract::extract_one(&mut rows, extractor)
    }

    /// Like [`query_one`](Self::query_one), but zero rows yields `None`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn query_optional<T, X>(
        &self,
        cx: &Cx,
        statement: impl Into<Statement>,
        extractor: X,
    ) -> Result<Option<T>>
    where
        X: Extractor<T>,
    {
        let mut rows = self.fetch(cx, statement.into()).await?;
        extract::extract_optional(&mut rows, extractor)
    }

    /// Run a query and extract every row, preserving row order.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn query_list<T, X>(
        &self,
        cx: &Cx,
        statement: impl Into<Statement>,
        extractor: X,
    ) -> Result<Vec<T>>
    where
        X: Extractor<T>,
    {
        let mut rows = self.fetch(cx, statement.into()).await?;
        let list = extract::extract_list(&mut rows, extractor)?;
        tracing::debug!(rows = list.len(), "Query returned rows");
        Ok(list)
    }

    /// Run a query and hand the whole row set to `extractor`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn query_aggregate<T, R>(
        &self,
        cx: &Cx,
        statement: impl Into<Statement>,
        extractor: R,
    ) -> Result<T>
    where
        R: RowSetExtractor<T>,
    {
        let mut rows = self.fetch(cx, statement.into()).await?;
        extract::extract_all(&mut rows, extractor)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Run a statement in auto-commit mode and return the affected row count.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn update(&self, cx: &Cx, statement: impl Into<Statement>) -> Result<u64> {
        let (sql, params) = statement.into().into_positional()?;
        tracing::debug!(sql = %sql, params = params.len(), "Executing statement");
        let affected = self
            .engine
            .execute(cx, &sql, &params)
            .await
            .into_sql_result()
            .map_err(|e| e.with_sql(&sql))?;
        tracing::debug!(affected, "Statement executed");
        Ok(affected)
    }

    /// Run an INSERT in auto-commit mode and return the key of the last
    /// inserted row, `None` when nothing was inserted.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn insert(&self, cx: &Cx, statement: impl Into<Statement>) -> Result<Option<i64>> {
        let (sql, params) = statement.into().into_positional()?;
        tracing::debug!(sql = %sql, params = params.len(), "Executing insert");
        self.engine
            .insert(cx, &sql, &params)
            .await
            .into_sql_result()
            .map_err(|e| e.with_sql(&sql))
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// A runner using this database's transaction configuration.
    pub fn runner(&self) -> TransactionRunner<'_, E> {
        TransactionRunner::with_config(&self.engine, self.config.clone())
    }

    /// Run `uow` in a new transaction using the database's configuration.
    pub async fn transaction<'a, T, F>(&'a self, cx: &Cx, uow: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut TransactionScope<'a, E>) -> Result<T>,
    {
        self.runner().run(cx, uow).await
    }

    /// Run `uow` in a new transaction with an explicit configuration.
    pub async fn transaction_with<'a, T, F>(
        &'a self,
        cx: &Cx,
        config: TransactionConfig,
        uow: F,
    ) -> Result<T>
    where
        F: AsyncFnOnce(&mut TransactionScope<'a, E>) -> Result<T>,
    {
        TransactionRunner::with_config(&self.engine, config)
            .run(cx, uow)
            .await
    }

    async fn fetch(&self, cx: &Cx, statement: Statement) -> Result<RowSet> {
        let (sql, params) = statement.into_positional()?;
        tracing::debug!(sql = %sql, params = params.len(), "Executing query");
        self.engine
            .query(cx, &sql, &params)
            .await
            .into_sql_result()
            .map_err(|e| e.with_sql(&sql))
    }
}

/// Builder for creating a [`Database`].
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    config: TransactionConfig,
}

impl DatabaseBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration used by [`Database::transaction`] and
    /// [`Database::runner`].
    #[must_use]
    pub fn with_transaction_config(mut self, config: TransactionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build_with<E: Engine>(self, engine: E) -> Database<E> {
        Database {
            engine,
            config: self.config,
        }
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use sqltemplate_core::Propagation;
    use sqltemplate_sqlite::SqliteEngine;

    #[test]
    fn test_database_new_uses_default_config() {
        let db = Database::new(SqliteEngine::temporary().unwrap());
        assert_eq!(db.transaction_config().propagation, Propagation::Required);
        assert!(db.engine().table_names().unwrap().is_empty());
    }

    #[test]
    fn test_builder_sets_transaction_config() {
        let db = Database::<SqliteEngine>::builder()
            .with_transaction_config(TransactionConfig::requires_new().with_read_only(true))
            .build_with(SqliteEngine::temporary().unwrap());
        assert_eq!(db.transaction_config().propagation, Propagation::RequiresNew);
        assert!(db.runner().config().read_only);
    }

    #[test]
    fn test_into_engine_keeps_tables() {
        let engine = SqliteEngine::with_tables(["CREATE TABLE t (id INTEGER)"]).unwrap();
        let mut db = Database::new(engine);
        let _ = db.engine_mut();
        let engine = db.into_engine();
        assert_eq!(engine.committed_rows("t"), Some(0));
    }
}
