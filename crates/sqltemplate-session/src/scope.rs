//! The transaction context handed to a unit of work.

use std::fmt;

use asupersync::Cx;
use sqltemplate_core::extract::{self, Extractor, RowSetExtractor};
use sqltemplate_core::{
    Engine, Error, OutcomeExt, Propagation, Result, RowSet, Statement, TransactionOps,
};

use crate::config::TransactionConfig;
use crate::runner::TransactionRunner;
use crate::status::TransactionStatus;

/// An open transaction plus its status.
///
/// Every statement issued through a scope runs on the transaction handle, so
/// it sees the transaction's own uncommitted writes and nothing it does is
/// visible to others before commit.
pub struct TransactionScope<'e, E: Engine + 'e> {
    pub(crate) engine: &'e E,
    pub(crate) tx: E::Tx<'e>,
    pub(crate) status: TransactionStatus,
    pub(crate) config: TransactionConfig,
}

impl<'e, E: Engine + 'e> TransactionScope<'e, E> {
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut TransactionStatus {
        &mut self.status
    }

    /// Shorthand for `status_mut().set_rollback_only()`.
    pub fn set_rollback_only(&mut self) -> Result<()> {
        self.status.set_rollback_only()
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// The engine this transaction was begun on.
    pub fn engine(&self) -> &'e E {
        self.engine
    }

    /// Run a nested unit of work from inside this one.
    ///
    /// With [`Propagation::Required`] it joins this transaction; with
    /// [`Propagation::RequiresNew`] it commits or rolls back on its own.
    pub async fn nested<T, F>(&mut self, cx: &Cx, propagation: Propagation, uow: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut TransactionScope<'e, E>) -> Result<T>,
    {
        let config = self.config.clone().with_propagation(propagation);
        TransactionRunner::with_config(self.engine, config)
            .run_within(cx, self, uow)
            .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Expect exactly one row and extract it.
    pub async fn query_one<T, X>(
        &mut self,
        cx: &Cx,
        statement: impl Into<Statement>,
        extractor: X,
    ) -> Result<T>
    where
        X: Extractor<T>,
    {
        let mut rows = self.fetch(cx, statement.into()).await?;
        let result = extract::extract_one(&mut rows, extractor);
        self.observe(result)
    }

    pub async fn query_optional<T, X>(
        &mut self,
        cx: &Cx,
        statement: impl Into<Statement>,
        extractor: X,
    ) -> Result<Option<T>>
    where
        X: Extractor<T>,
    {
        let mut rows = self.fetch(cx, statement.into()).await?;
        let result = extract::extract_optional(&mut rows, extractor);
        self.observe(result)
    }

    pub async fn query_list<T, X>(
        &mut self,
        cx: &Cx,
        statement: impl Into<Statement>,
        extractor: X,
    ) -> Result<Vec<T>>
    where
        X: Extractor<T>,
    {
        let mut rows = self.fetch(cx, statement.into()).await?;
        let result = extract::extract_list(&mut rows, extractor);
        self.observe(result)
    }

    pub async fn query_aggregate<T, R>(
        &mut self,
        cx: &Cx,
        statement: impl Into<Statement>,
        extractor: R,
    ) -> Result<T>
    where
        R: RowSetExtractor<T>,
    {
        let mut rows = self.fetch(cx, statement.into()).await?;
        let result = extract::extract_all(&mut rows, extractor);
        self.observe(result)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Run a statement and return the number of affected rows.
    pub async fn update(&mut self, cx: &Cx, statement: impl Into<Statement>) -> Result<u64> {
        let (sql, params) = statement.into().into_positional()?;
        let affected = self
            .tx
            .execute(cx, &sql, &params)
            .await
            .into_sql_result()
            .map_err(|e| e.with_sql(&sql))?;
        tracing::debug!(tx_id = self.status.id(), affected, "Executed statement");
        Ok(affected)
    }

    /// Run an INSERT and return the key of the last inserted row, `None`
    /// when nothing was inserted.
    pub async fn insert(
        &mut self,
        cx: &Cx,
        statement: impl Into<Statement>,
    ) -> Result<Option<i64>> {
        let (sql, params) = statement.into().into_positional()?;
        let id = self
            .tx
            .insert(cx, &sql, &params)
            .await
            .into_sql_result()
            .map_err(|e| e.with_sql(&sql))?;
        tracing::debug!(tx_id = self.status.id(), generated_id = ?id, "Inserted row");
        Ok(id)
    }

    async fn fetch(&self, cx: &Cx, statement: Statement) -> Result<RowSet> {
        let (sql, params) = statement.into_positional()?;
        tracing::debug!(
            tx_id = self.status.id(),
            sql = %sql,
            params = params.len(),
            "Querying in transaction"
        );
        self.tx
            .query(cx, &sql, &params)
            .await
            .into_sql_result()
            .map_err(|e| e.with_sql(&sql))
    }

    fn observe<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            if self.config.rollback_on_extraction_error && is_extraction_failure(error) {
                tracing::warn!(
                    tx_id = self.status.id(),
                    error = %error,
                    "Extraction failed, marking transaction rollback-only"
                );
                self.status.mark_rollback_only();
            }
        }
        result
    }
}

fn is_extraction_failure(error: &Error) -> bool {
    let error = error.primary();
    error.is_extraction() || error.is_cardinality()
}

impl<'e, E: Engine + 'e> fmt::Debug for TransactionScope<'e, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("status", &self.status)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
