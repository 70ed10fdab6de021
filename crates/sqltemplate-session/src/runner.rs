//! Running units of work inside transactions.

use std::sync::atomic::{AtomicU64, Ordering};

use asupersync::Cx;
use sqltemplate_core::{
    DataAccessError, DataAccessErrorKind, Engine, Error, OutcomeExt, Propagation, Result,
    TransactionOps,
};

use crate::config::TransactionConfig;
use crate::scope::TransactionScope;
use crate::status::{Resolution, TransactionStatus};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Runs units of work inside engine transactions.
///
/// A runner is cheap: it borrows the engine and owns a copy of its
/// configuration. The transaction it begins commits when the unit of work
/// returns `Ok` without requesting rollback, and rolls back otherwise.
pub struct TransactionRunner<'e, E: Engine> {
    engine: &'e E,
    config: TransactionConfig,
}

impl<'e, E: Engine + 'e> TransactionRunner<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self::with_config(engine, TransactionConfig::default())
    }

    pub fn with_config(engine: &'e E, config: TransactionConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Run `uow` in a new transaction and return its value.
    ///
    /// There is no enclosing transaction here, so propagation does not
    /// matter; use [`run_within`](Self::run_within) to join one.
    pub async fn run<T, F>(&self, cx: &Cx, uow: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut TransactionScope<'e, E>) -> Result<T>,
    {
        let (value, _status) = self.run_with_status(cx, uow).await?;
        Ok(value)
    }

    /// Like [`run`](Self::run), also returning the resolved status.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn run_with_status<T, F>(&self, cx: &Cx, uow: F) -> Result<(T, TransactionStatus)>
    where
        F: AsyncFnOnce(&mut TransactionScope<'e, E>) -> Result<T>,
    {
        let tx = match self
            .engine
            .begin_with(cx, self.config.begin_options())
            .await
            .into_sql_result()
        {
            Ok(tx) => tx,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to begin transaction");
                return Err(e);
            }
        };
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            tx_id = id,
            isolation = ?self.config.isolation,
            read_only = self.config.read_only,
            "Began transaction"
        );

        let mut scope = TransactionScope {
            engine: self.engine,
            tx,
            status: TransactionStatus::new(id),
            config: self.config.clone(),
        };
        let result = uow(&mut scope).await;
        let TransactionScope { tx, mut status, .. } = scope;

        match result {
            Ok(value) if !status.is_rollback_only() => match tx.commit(cx).await.into_sql_result() {
                Ok(()) => {
                    status.complete(Resolution::Committed);
                    tracing::info!(tx_id = id, "Committed transaction");
                    Ok((value, status))
                }
                Err(e) => {
                    status.complete(Resolution::RolledBack);
                    tracing::error!(tx_id = id, error = %e, "Commit failed");
                    Err(commit_failed(id, e))
                }
            },
            Ok(value) => {
                let outcome = tx.rollback(cx).await.into_sql_result();
                status.complete(Resolution::RolledBack);
                match outcome {
                    Ok(()) => {
                        tracing::info!(tx_id = id, "Rolled back rollback-only transaction");
                        Ok((value, status))
                    }
                    Err(e) => {
                        tracing::error!(tx_id = id, error = %e, "Rollback failed");
                        Err(e)
                    }
                }
            }
            Err(error) => {
                let outcome = tx.rollback(cx).await.into_sql_result();
                status.complete(Resolution::RolledBack);
                match outcome {
                    Ok(()) => {
                        tracing::info!(tx_id = id, error = %error, "Rolled back failed transaction");
                        Err(error)
                    }
                    Err(rollback_error) => {
                        tracing::error!(
                            tx_id = id,
                            error = %error,
                            rollback_error = %rollback_error,
                            "Rollback failed after unit of work error"
                        );
                        Err(error.with_suppressed(rollback_error))
                    }
                }
            }
        }
    }

    /// Run `uow` on behalf of a caller that already holds `scope`.
    ///
    /// `Required` joins the caller's transaction: the unit of work gets the
    /// same scope and nothing is committed here. If it fails, the enclosing
    /// transaction is marked rollback-only before the error is returned.
    /// `RequiresNew` leaves `scope` untouched and runs in an independent
    /// transaction that resolves before this call returns.
    #[tracing::instrument(level = "debug", skip_all, fields(outer_tx_id = scope.status.id()))]
    pub async fn run_within<T, F>(
        &self,
        cx: &Cx,
        scope: &mut TransactionScope<'e, E>,
        uow: F,
    ) -> Result<T>
    where
        F: AsyncFnOnce(&mut TransactionScope<'e, E>) -> Result<T>,
    {
        match self.config.propagation {
            Propagation::Required => {
                tracing::debug!("Joining enclosing transaction");
                scope.status.enter_joined();
                let result = uow(&mut *scope).await;
                scope.status.exit_joined();
                if let Err(error) = &result {
                    if !scope.status.is_rollback_only() {
                        tracing::warn!(
                            tx_id = scope.status.id(),
                            error = %error,
                            "Joined unit of work failed, marking transaction rollback-only"
                        );
                    }
                    scope.status.mark_rollback_only();
                }
                result
            }
            Propagation::RequiresNew => {
                tracing::debug!("Starting independent transaction");
                self.run(cx, uow).await
            }
        }
    }
}

fn commit_failed(id: u64, cause: Error) -> Error {
    if cause.is_data_access() {
        return cause;
    }
    Error::DataAccess(DataAccessError {
        kind: DataAccessErrorKind::Transaction,
        message: format!("commit of transaction {id} failed: {cause}"),
        sql: None,
        source: Some(Box::new(cause)),
    })
}
