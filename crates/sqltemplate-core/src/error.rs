//! Error taxonomy for sqltemplate.
//!
//! Every public operation reports failures through a single [`Error`] value.
//! The variant tells the caller *what* went wrong:
//!
//! - [`Error::DataAccess`]: the execution engine failed (connectivity, SQL,
//!   constraint violation, cancellation).
//! - [`Error::Extraction`]: a row or row set could not be mapped to the
//!   requested type.
//! - [`Error::Cardinality`]: a single-row query produced zero or several rows.
//! - [`Error::IllegalState`]: a transaction status was used after completion.
//! - [`Error::Custom`]: an application failure raised from a unit of work.
//! - [`Error::Suppressed`]: an original error carrying a secondary failure
//!   (usually a rollback error) that happened while handling it.

use std::fmt;

use asupersync::Outcome;

/// Boxed error source carried by the structured error payloads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type for all sqltemplate operations.
#[derive(Debug)]
pub enum Error {
    /// Engine-level failure.
    DataAccess(DataAccessError),
    /// Mapping a row or row set to a value failed.
    Extraction(ExtractionError),
    /// Wrong number of rows for a single-row query.
    Cardinality(CardinalityError),
    /// A handle was used outside of its valid lifetime.
    IllegalState(IllegalStateError),
    /// Application-defined failure.
    Custom(String),
    /// An error together with a secondary failure raised while handling it.
    Suppressed {
        /// The error the caller should act on.
        error: Box<Error>,
        /// The failure that happened afterwards (e.g. during rollback).
        suppressed: Box<Error>,
    },
}

#[derive(Debug)]
pub struct DataAccessError {
    pub kind: DataAccessErrorKind,
    pub message: String,
    /// The SQL that was being executed, when known.
    pub sql: Option<String>,
    pub source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAccessErrorKind {
    /// Failed to reach or talk to the database.
    Connection,
    /// Malformed or unsupported SQL.
    Syntax,
    /// Unique, primary key or other constraint violation.
    Constraint,
    /// Unknown table or column.
    NotFound,
    /// Serialization failure under concurrent transactions.
    Serialization,
    /// Deadlock detected by the engine.
    Deadlock,
    /// The engine gave up waiting.
    Timeout,
    /// The operation was cancelled through its context.
    Cancelled,
    /// Begin/commit/rollback failed.
    Transaction,
    /// A statement parameter could not be bound.
    InvalidParameter,
    /// Any other engine failure.
    Database,
}

#[derive(Debug)]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
    /// The column involved, when the failure concerns a single column.
    pub column: Option<String>,
    pub source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    /// The row has no column with the requested name or position.
    MissingColumn,
    /// The column is NULL but a non-null value was requested.
    UnexpectedNull,
    /// The column value cannot be converted to the requested type.
    TypeMismatch,
    /// Raised by user extractor code.
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardinalityError {
    /// Human readable expectation, e.g. "exactly one row".
    pub expected: &'static str,
    /// Number of rows observed. Counting stops at 2 for single-row queries.
    pub actual: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalStateError {
    pub message: String,
}

impl Error {
    /// Build a data access error without a source.
    pub fn data_access(kind: DataAccessErrorKind, message: impl Into<String>) -> Self {
        Error::DataAccess(DataAccessError {
            kind,
            message: message.into(),
            sql: None,
            source: None,
        })
    }

    /// Build an extraction error for a specific column.
    pub fn extraction(
        kind: ExtractionErrorKind,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Extraction(ExtractionError {
            kind,
            message: message.into(),
            column: Some(column.into()),
            source: None,
        })
    }

    /// Wrap an arbitrary failure raised inside an extractor.
    pub fn extraction_failed(message: impl Into<String>, source: Option<BoxError>) -> Self {
        Error::Extraction(ExtractionError {
            kind: ExtractionErrorKind::Custom,
            message: message.into(),
            column: None,
            source,
        })
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Error::IllegalState(IllegalStateError {
            message: message.into(),
        })
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    /// Attach a secondary failure to this error.
    ///
    /// The receiver stays the primary error; `primary()` and `kind_name()`
    /// keep reporting it.
    pub fn with_suppressed(self, suppressed: Error) -> Self {
        Error::Suppressed {
            error: Box::new(self),
            suppressed: Box::new(suppressed),
        }
    }

    /// The error the caller should act on, looking through suppression.
    pub fn primary(&self) -> &Error {
        match self {
            Error::Suppressed { error, .. } => error.primary(),
            other => other,
        }
    }

    /// The secondary failure attached to this error, if any.
    pub fn suppressed(&self) -> Option<&Error> {
        match self {
            Error::Suppressed { suppressed, .. } => Some(suppressed),
            _ => None,
        }
    }

    /// Stable name of the primary error kind.
    pub fn kind_name(&self) -> &'static str {
        match self.primary() {
            Error::DataAccess(_) => "data_access",
            Error::Extraction(_) => "extraction",
            Error::Cardinality(_) => "cardinality",
            Error::IllegalState(_) => "illegal_state",
            Error::Custom(_) => "custom",
            Error::Suppressed { .. } => "suppressed",
        }
    }

    pub fn is_data_access(&self) -> bool {
        matches!(self.primary(), Error::DataAccess(_))
    }

    pub fn is_extraction(&self) -> bool {
        matches!(self.primary(), Error::Extraction(_))
    }

    pub fn is_cardinality(&self) -> bool {
        matches!(self.primary(), Error::Cardinality(_))
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self.primary(), Error::IllegalState(_))
    }

    /// The data access kind of the primary error, if it is one.
    pub fn data_access_kind(&self) -> Option<DataAccessErrorKind> {
        match self.primary() {
            Error::DataAccess(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Attach the SQL text to a data access error that does not carry one yet.
    pub fn with_sql(mut self, sql: &str) -> Self {
        if let Error::DataAccess(e) = &mut self {
            if e.sql.is_none() {
                e.sql = Some(sql.to_string());
            }
        }
        self
    }
}

impl DataAccessError {
    /// Whether retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DataAccessErrorKind::Serialization
                | DataAccessErrorKind::Deadlock
                | DataAccessErrorKind::Timeout
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DataAccess(e) => write!(f, "Data access error: {}", e),
            Error::Extraction(e) => write!(f, "Extraction error: {}", e),
            Error::Cardinality(e) => write!(f, "Cardinality error: {}", e),
            Error::IllegalState(e) => write!(f, "Illegal state: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
            Error::Suppressed { error, suppressed } => {
                write!(f, "{} (suppressed: {})", error, suppressed)
            }
        }
    }
}

impl fmt::Display for DataAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(sql) = &self.sql {
            write!(f, " [sql: {}]", sql)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(f, "column '{}': {}", col, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for CardinalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.actual > 1 {
            write!(f, "expected {}, got more than one", self.expected)
        } else {
            write!(f, "expected {}, got {}", self.expected, self.actual)
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DataAccess(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            Error::Extraction(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            Error::Suppressed { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<DataAccessError> for Error {
    fn from(e: DataAccessError) -> Self {
        Error::DataAccess(e)
    }
}

impl From<ExtractionError> for Error {
    fn from(e: ExtractionError) -> Self {
        Error::Extraction(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Extraction(ExtractionError {
            kind: ExtractionErrorKind::TypeMismatch,
            message: format!("JSON conversion failed: {}", e),
            column: None,
            source: Some(Box::new(e)),
        })
    }
}

/// Result type alias for sqltemplate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Conversion from engine [`Outcome`]s into plain results.
///
/// The engine boundary speaks asupersync's four-state `Outcome`; application
/// code only ever sees one error value, so cancellation and panics are folded
/// into [`DataAccessErrorKind::Cancelled`] and [`DataAccessErrorKind::Database`].
pub trait OutcomeExt<T> {
    fn into_sql_result(self) -> Result<T>;
}

impl<T> OutcomeExt<T> for Outcome<T, Error> {
    fn into_sql_result(self) -> Result<T> {
        match self {
            Outcome::Ok(v) => Ok(v),
            Outcome::Err(e) => Err(e),
            Outcome::Cancelled(r) => Err(Error::data_access(
                DataAccessErrorKind::Cancelled,
                format!("Cancelled: {r:?}"),
            )),
            Outcome::Panicked(p) => Err(Error::data_access(
                DataAccessErrorKind::Database,
                format!("Panicked: {p:?}"),
            )),
        }
    }
}
