//! SQLite execution engine for sqltemplate.
//!
//! `SqliteEngine` implements the `Engine` and `TransactionOps` contracts from
//! `sqltemplate-core` on top of `rusqlite` with a bundled SQLite. It opens
//! either a database file or a private temporary database, keeps a small
//! pool of connections, and runs the database in WAL mode so that readers
//! keep seeing the last committed state while a transaction is open.
//!
//! ```rust,ignore
//! use sqltemplate_sqlite::{SqliteConfig, SqliteEngine};
//!
//! let scratch = SqliteEngine::with_tables(["CREATE TABLE t (id INTEGER PRIMARY KEY)"])?;
//! let on_disk = SqliteEngine::open(SqliteConfig::new().with_path("app.db"))?;
//! ```

pub mod config;
mod convert;
pub mod engine;

pub use config::SqliteConfig;
pub use engine::{SqliteEngine, SqliteTransaction};
