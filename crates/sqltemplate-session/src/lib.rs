//! Transactions and units of work for sqltemplate.
//!
//! A unit of work is an async closure that receives a [`TransactionScope`].
//! The [`TransactionRunner`] begins a transaction on the engine, runs the
//! unit of work, and then resolves the transaction exactly once:
//!
//! - **Commit** when the unit of work returns `Ok` and nobody called
//!   [`TransactionStatus::set_rollback_only`].
//! - **Rollback** when rollback was requested or the unit of work returned
//!   `Err`. The original error is returned; a failing rollback is logged and
//!   attached to it as a suppressed error.
//!
//! There is no ambient "current transaction". Nested units of work receive the
//! enclosing scope explicitly through [`TransactionRunner::run_within`] or
//! [`TransactionScope::nested`], and [`Propagation`] decides whether they join
//! it or run independently.
//!
//! # Example
//!
//! ```ignore
//! let runner = TransactionRunner::new(&engine);
//! let total = runner
//!     .run(&cx, async |scope| {
//!         scope
//!             .update(&cx, Statement::new("UPDATE accounts SET balance = ? WHERE id = ?").bind(0).bind(7))
//!             .await?;
//!         scope
//!             .query_aggregate(&cx, "SELECT id FROM accounts WHERE balance > 0", count_rows())
//!             .await
//!     })
//!     .await?;
//! ```

pub mod config;
pub mod runner;
pub mod scope;
pub mod status;

pub use config::TransactionConfig;
pub use runner::TransactionRunner;
pub use scope::TransactionScope;
pub use sqltemplate_core::Propagation;
pub use status::{Resolution, TransactionStatus};
