//! Core types and contracts for sqltemplate.
//!
//! `sqltemplate-core` is the **foundation layer** of the workspace. It defines
//! the data model that flows between an execution engine and application code,
//! and the strategy contracts used to turn query results into typed values.
//!
//! # Role In The Architecture
//!
//! - **Data model**: `Value`, `Row` and `RowSet` describe query inputs/outputs.
//! - **Strategies**: `Extractor` (row -> value) and `RowSetExtractor`
//!   (row set -> value), implemented for plain closures.
//! - **Engine boundary**: `Engine` and `TransactionOps` are implemented by
//!   execution engines such as `sqltemplate-sqlite`.
//! - **Errors**: one `Error` taxonomy shared by every crate.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync
//!   so engine operations are cancel-correct.
//!
//! Most applications should use the `sqltemplate` facade; reach for this crate
//! directly when writing an engine.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod engine;
pub mod error;
pub mod extract;
pub mod row;
pub mod rowset;
pub mod statement;
pub mod value;

pub use engine::{Engine, IsolationLevel, Propagation, TransactionOps, TransactionOptions};
pub use error::{
    CardinalityError, DataAccessError, DataAccessErrorKind, Error, ExtractionError,
    ExtractionErrorKind, IllegalStateError, OutcomeExt, Result,
};
pub use extract::{Extractor, RowSetExtractor, create_extractor};
pub use row::{ColumnInfo, ConversionError, FromValue, Row};
pub use rowset::RowSet;
pub use statement::Statement;
pub use value::Value;
