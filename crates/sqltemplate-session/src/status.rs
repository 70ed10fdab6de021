//! Transaction status handed to units of work.

use sqltemplate_core::{Error, Result};

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Committed,
    /// Requested, forced by a failing unit of work, or left behind by a
    /// failed commit.
    RolledBack,
}

/// Handle a unit of work uses to request rollback and inspect completion.
///
/// Owned by the transaction scope and lent out by exclusive reference, so it is
/// never shared between tasks. Once the transaction resolves every mutation
/// fails with an illegal state error.
#[derive(Debug)]
pub struct TransactionStatus {
    id: u64,
    resolution: Option<Resolution>,
    rollback_only: bool,
    /// Number of joined units of work currently running on this transaction.
    joined: usize,
}

impl TransactionStatus {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            resolution: None,
            rollback_only: false,
            joined: 0,
        }
    }

    /// Identifier of the transaction, as used in log events.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_completed(&self) -> bool {
        self.resolution.is_some()
    }

    /// `None` while the transaction is active.
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Whether the unit of work currently holding this status began the
    /// transaction, as opposed to having joined an enclosing one.
    pub fn is_new_transaction(&self) -> bool {
        self.joined == 0
    }

    /// Request that the transaction be rolled back instead of committed.
    ///
    /// Idempotent. The request is only evaluated when the outermost unit of
    /// work returns.
    pub fn set_rollback_only(&mut self) -> Result<()> {
        if let Some(resolution) = self.resolution {
            return Err(Error::illegal_state(format!(
                "transaction {} already completed ({resolution:?})",
                self.id
            )));
        }
        self.rollback_only = true;
        Ok(())
    }

    pub(crate) fn mark_rollback_only(&mut self) {
        if !self.is_completed() {
            self.rollback_only = true;
        }
    }

    pub(crate) fn enter_joined(&mut self) {
        self.joined += 1;
    }

    pub(crate) fn exit_joined(&mut self) {
        self.joined = self.joined.saturating_sub(1);
    }

    pub(crate) fn complete(&mut self, resolution: Resolution) {
        self.resolution = Some(resolution);
    }
}
