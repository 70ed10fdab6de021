//! Transaction configuration.

use sqltemplate_core::{IsolationLevel, Propagation, TransactionOptions};

/// Configuration for [`TransactionRunner`](crate::TransactionRunner) behavior.
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    /// Join the caller's transaction or begin an independent one.
    pub propagation: Propagation,
    /// Isolation level requested from the engine, engine default when `None`.
    pub isolation: Option<IsolationLevel>,
    /// Hint forwarded to the engine.
    pub read_only: bool,
    /// Mark the transaction rollback-only when a scope query fails with an
    /// extraction or cardinality error, even if the unit of work recovers.
    pub rollback_on_extraction_error: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            propagation: Propagation::Required,
            isolation: None,
            read_only: false,
            rollback_on_extraction_error: false,
        }
    }
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a configuration that always begins a new transaction.
    pub fn requires_new() -> Self {
        Self::default().with_propagation(Propagation::RequiresNew)
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_rollback_on_extraction_error(mut self, enabled: bool) -> Self {
        self.rollback_on_extraction_error = enabled;
        self
    }

    pub(crate) fn begin_options(&self) -> TransactionOptions {
        TransactionOptions {
            isolation: self.isolation,
            read_only: self.read_only,
        }
    }
}
