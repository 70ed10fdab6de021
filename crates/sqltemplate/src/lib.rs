//! sqltemplate: typed SQL queries and transactions over pluggable engines.
//!
//! `sqltemplate` is the **facade crate** of the workspace. It re-exports the
//! data model and strategy traits from `sqltemplate-core`, the transaction
//! runner from `sqltemplate-session`, and (with the default `sqlite` feature)
//! the SQLite engine, and adds [`Database`], the query facade.
//!
//! # Role In The Architecture
//!
//! - **Query facade**: [`Database`] runs statements through an [`Engine`] and
//!   applies [`Extractor`]s or [`RowSetExtractor`]s to the result.
//! - **Transactions**: [`TransactionRunner`] runs units of work and commits or
//!   rolls back exactly once; [`Propagation`] controls nesting.
//! - **Errors**: one [`Error`] type separating data access, extraction,
//!   cardinality and illegal state failures.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sqltemplate::prelude::*;
//!
//! let db = Database::new(SqliteEngine::with_tables([
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
//! ])?);
//!
//! db.insert(&cx, Statement::new("INSERT INTO users (name) VALUES (?)").bind("Kasia"))
//!     .await?;
//!
//! let names = db
//!     .query_list(&cx, "SELECT name FROM users ORDER BY id", |row: &Row| row.string("name"))
//!     .await?;
//!
//! db.transaction(&cx, async |scope| {
//!     scope.update(&cx, "DELETE FROM users WHERE id = 1").await?;
//!     scope.set_rollback_only()
//! })
//! .await?;
//! ```

pub mod database;
pub mod transaction;

pub use database::{Database, DatabaseBuilder};
pub use transaction::{
    Propagation, Resolution, TransactionConfig, TransactionRunner, TransactionScope,
    TransactionStatus,
};

pub use sqltemplate_core::extract;
pub use sqltemplate_core::{
    CardinalityError, ColumnInfo, ConversionError, Cx, DataAccessError, DataAccessErrorKind,
    Engine, Error, ExtractionError, ExtractionErrorKind, Extractor, FromValue, IllegalStateError,
    IsolationLevel, Outcome, OutcomeExt, Result, Row, RowSet, RowSetExtractor, Statement,
    TransactionOps, TransactionOptions, Value, create_extractor,
};

#[cfg(feature = "sqlite")]
pub use sqltemplate_sqlite::{SqliteConfig, SqliteEngine, SqliteTransaction};

/// Commonly used items.
pub mod prelude {
    pub use crate::database::Database;
    pub use crate::extract::{column, column_at, count_rows, exists, group_by};
    pub use crate::transaction::{
        Propagation, Resolution, TransactionConfig, TransactionRunner, TransactionScope,
        TransactionStatus,
    };
    pub use sqltemplate_core::{
        Cx, Error, Extractor, IsolationLevel, Outcome, Result, Row, RowSet, RowSetExtractor,
        Statement, Value, create_extractor,
    };

    #[cfg(feature = "sqlite")]
    pub use sqltemplate_sqlite::{SqliteConfig, SqliteEngine};
}
