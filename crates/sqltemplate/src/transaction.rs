//! Transaction re-exports.
//!
//! The runner, scope and status types live in the `sqltemplate-session`
//! crate. This module lets facade users reach them without depending on
//! sub-crates directly.

pub use sqltemplate_session::{
    Propagation, Resolution, TransactionConfig, TransactionRunner, TransactionScope,
    TransactionStatus,
};
