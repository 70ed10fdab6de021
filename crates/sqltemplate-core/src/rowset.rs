//! Forward-only query results.

use std::fmt;
use std::iter::Peekable;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::row::{ColumnInfo, Row};

type RowStream = Box<dyn Iterator<Item = Result<Row>> + Send>;

/// An ordered, single-pass sequence of rows.
///
/// A `RowSet` cannot be cloned or rewound. Whoever holds it is its only
/// consumer; extraction borrows it mutably for exactly one call.
///
/// Entries are `Result<Row>` so an engine streaming from a cursor can report a
/// failure (e.g. cancellation) in the middle of the traversal.
pub struct RowSet {
    columns: Arc<ColumnInfo>,
    rows: Peekable<RowStream>,
    consumed: usize,
}

impl RowSet {
    /// A row set over already materialized rows.
    pub fn from_rows(columns: Arc<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self::from_stream(columns, rows.into_iter().map(Ok))
    }

    /// A row set over a lazily produced stream.
    pub fn from_stream<I>(columns: Arc<ColumnInfo>, rows: I) -> Self
    where
        I: Iterator<Item = Result<Row>> + Send + 'static,
    {
        let stream: RowStream = Box::new(rows);
        Self {
            columns,
            rows: stream.peekable(),
            consumed: 0,
        }
    }

    /// A row set with no columns and no rows.
    pub fn empty() -> Self {
        Self::from_rows(Arc::new(ColumnInfo::new(Vec::new())), Vec::new())
    }

    pub fn columns(&self) -> &Arc<ColumnInfo> {
        &self.columns
    }

    /// Whether another entry (row or error) is pending.
    pub fn has_next(&mut self) -> bool {
        self.rows.peek().is_some()
    }

    /// Advance to the next row.
    pub fn next_row(&mut self) -> Option<Result<Row>> {
        let next = self.rows.next();
        if matches!(next, Some(Ok(_))) {
            self.consumed += 1;
        }
        next
    }

    /// Number of rows handed out so far.
    pub fn rows_consumed(&self) -> usize {
        self.consumed
    }

    /// Drain the remaining rows, stopping at the first error.
    pub fn collect_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row() {
            rows.push(row?);
        }
        Ok(rows)
    }
}

impl Iterator for RowSet {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row()
    }
}

impl fmt::Debug for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowSet")
            .field("columns", &self.columns.names())
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

impl From<Vec<Row>> for RowSet {
    /// Column metadata is taken from the first row.
    fn from(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map_or_else(|| Arc::new(ColumnInfo::new(Vec::new())), |r| Arc::clone(r.columns()));
        Self::from_rows(columns, rows)
    }
}

/// Build a stream entry signalling an engine failure mid-traversal.
pub fn stream_error(error: Error) -> Result<Row> {
    Err(error)
}
