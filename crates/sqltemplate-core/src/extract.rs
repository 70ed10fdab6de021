//! Extraction strategies and how they are applied to a [`RowSet`].
//!
//! An [`Extractor`] maps one row to a value and is applied to every row in
//! traversal order. A [`RowSetExtractor`] sees the whole row set once and is
//! used when the result depends on several rows (aggregation, grouping,
//! existence checks).
//!
//! Both are implemented for plain closures, so most call sites never name the
//! traits:
//!
//! ```
//! use sqltemplate_core::{Row, RowSet, Value, extract};
//!
//! let rows = vec![
//!     Row::from_pairs([("id", Value::Int(1))]),
//!     Row::from_pairs([("id", Value::Int(2))]),
//! ];
//! let ids = extract::extract_list(&mut RowSet::from(rows), |row: &Row| row.int("id")).unwrap();
//! assert_eq!(ids, vec![1, 2]);
//! ```
//!
//! Extraction is all-or-nothing: the first failing row aborts the call and
//! whatever was collected so far is dropped. Failures raised by extractor
//! code surface as [`Error::Extraction`]; errors from the row stream itself
//! (engine failures, cancellation) pass through unchanged.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::error::{CardinalityError, Error, Result};
use crate::row::{FromValue, Row};
use crate::rowset::RowSet;

/// Strategy mapping a single row to a value.
pub trait Extractor<T> {
    fn extract(&self, row: &Row) -> Result<T>;
}

impl<T, F> Extractor<T> for F
where
    F: Fn(&Row) -> Result<T>,
{
    fn extract(&self, row: &Row) -> Result<T> {
        self(row)
    }
}

/// Strategy mapping a whole row set to a value.
///
/// Called exactly once; the row set can be traversed once.
pub trait RowSetExtractor<T> {
    fn extract(self, rows: &mut RowSet) -> Result<T>;
}

impl<T, F> RowSetExtractor<T> for F
where
    F: FnOnce(&mut RowSet) -> Result<T>,
{
    fn extract(self, rows: &mut RowSet) -> Result<T> {
        self(rows)
    }
}

/// Identity for closures, handy when an extractor is defined away from its use.
pub fn create_extractor<T, F>(f: F) -> F
where
    F: Fn(&Row) -> Result<T>,
{
    f
}

/// Extracts one named column.
#[derive(Debug, Clone)]
pub struct Column<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromValue> Extractor<T> for Column<T> {
    fn extract(&self, row: &Row) -> Result<T> {
        row.get_named(&self.name)
    }
}

/// Extracts the column at a 1-based position.
#[derive(Debug, Clone)]
pub struct ColumnAt<T> {
    position: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FromValue> Extractor<T> for ColumnAt<T> {
    fn extract(&self, row: &Row) -> Result<T> {
        row.get_by_position(self.position)
    }
}

pub fn column<T: FromValue>(name: impl Into<String>) -> Column<T> {
    Column {
        name: name.into(),
        _marker: PhantomData,
    }
}

pub fn column_at<T: FromValue>(position: usize) -> ColumnAt<T> {
    ColumnAt {
        position,
        _marker: PhantomData,
    }
}

/// Extractor adapter applying `f` to the output of `inner`.
#[derive(Debug, Clone)]
pub struct Map<E, F, A> {
    inner: E,
    f: F,
    _marker: PhantomData<fn() -> A>,
}

impl<A, B, E, F> Extractor<B> for Map<E, F, A>
where
    E: Extractor<A>,
    F: Fn(A) -> B,
{
    fn extract(&self, row: &Row) -> Result<B> {
        self.inner.extract(row).map(&self.f)
    }
}

pub fn map<A, B, E, F>(inner: E, f: F) -> Map<E, F, A>
where
    E: Extractor<A>,
    F: Fn(A) -> B,
{
    Map {
        inner,
        f,
        _marker: PhantomData,
    }
}

/// Row set extractor counting the remaining rows.
pub fn count_rows() -> impl FnOnce(&mut RowSet) -> Result<usize> {
    |rows: &mut RowSet| {
        let mut n = 0;
        while let Some(row) = rows.next_row() {
            row?;
            n += 1;
        }
        Ok(n)
    }
}

/// Row set extractor answering whether at least one row exists.
///
/// Stops after the first row.
pub fn exists() -> impl FnOnce(&mut RowSet) -> Result<bool> {
    |rows: &mut RowSet| match rows.next_row() {
        Some(row) => row.map(|_| true),
        None => Ok(false),
    }
}

/// Row set extractor grouping rows by a key, preserving row order inside
/// each group.
pub fn group_by<K, V, KE, VE>(
    key: KE,
    value: VE,
) -> impl FnOnce(&mut RowSet) -> Result<BTreeMap<K, Vec<V>>>
where
    K: Ord,
    KE: Extractor<K>,
    VE: Extractor<V>,
{
    move |rows: &mut RowSet| {
        let mut groups: BTreeMap<K, Vec<V>> = BTreeMap::new();
        while let Some(row) = rows.next_row() {
            let row = row?;
            let k = key.extract(&row)?;
            let v = value.extract(&row)?;
            groups.entry(k).or_default().push(v);
        }
        Ok(groups)
    }
}

// ============================================================================
// Applying strategies
// ============================================================================

const EXACTLY_ONE: &str = "exactly one row";
const AT_MOST_ONE: &str = "at most one row";

/// Apply `extractor` to every row, in order, collecting eagerly.
pub fn extract_list<T, E>(rows: &mut RowSet, extractor: E) -> Result<Vec<T>>
where
    E: Extractor<T>,
{
    let mut out = Vec::new();
    while let Some(row) = rows.next_row() {
        let row = row?;
        out.push(apply(&extractor, &row)?);
    }
    tracing::trace!(rows = out.len(), "Extracted row list");
    Ok(out)
}

/// Expect exactly one row and extract it.
///
/// Cardinality is checked before the extractor runs, so a query returning
/// zero or several rows never invokes it.
pub fn extract_one<T, E>(rows: &mut RowSet, extractor: E) -> Result<T>
where
    E: Extractor<T>,
{
    match take_single(rows, EXACTLY_ONE)? {
        Some(row) => apply(&extractor, &row),
        None => Err(Error::Cardinality(CardinalityError {
            expected: EXACTLY_ONE,
            actual: 0,
        })),
    }
}

/// Expect zero or one row.
pub fn extract_optional<T, E>(rows: &mut RowSet, extractor: E) -> Result<Option<T>>
where
    E: Extractor<T>,
{
    take_single(rows, AT_MOST_ONE)?
        .map(|row| apply(&extractor, &row))
        .transpose()
}

/// Hand the whole row set to a row set extractor.
pub fn extract_all<T, R>(rows: &mut RowSet, extractor: R) -> Result<T>
where
    R: RowSetExtractor<T>,
{
    extractor.extract(rows).map_err(|e| {
        if matches!(
            e.primary(),
            Error::Extraction(_) | Error::Cardinality(_) | Error::DataAccess(_)
        ) {
            e
        } else {
            wrap_failure(e)
        }
    })
}

fn apply<T, E: Extractor<T>>(extractor: &E, row: &Row) -> Result<T> {
    extractor.extract(row).map_err(|e| {
        if matches!(e.primary(), Error::Extraction(_) | Error::Cardinality(_)) {
            e
        } else {
            wrap_failure(e)
        }
    })
}

fn wrap_failure(e: Error) -> Error {
    Error::extraction_failed(format!("extractor failed: {e}"), Some(Box::new(e)))
}

fn take_single(rows: &mut RowSet, expected: &'static str) -> Result<Option<Row>> {
    let Some(first) = rows.next_row() else {
        return Ok(None);
    };
    let first = first?;
    match rows.next_row() {
        None => Ok(Some(first)),
        Some(Err(e)) => Err(e),
        Some(Ok(_)) => Err(Error::Cardinality(CardinalityError {
            expected,
            actual: 2,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DataAccessErrorKind, ExtractionErrorKind};
    use crate::row::ColumnInfo;
    use crate::rowset::stream_error;
    use crate::value::Value;
    use std::cell::Cell;
    use std::sync::Arc;

    fn people(names: &[(i32, &str)]) -> RowSet {
        let cols = Arc::new(ColumnInfo::new(vec!["id".into(), "name".into()]));
        let rows = names
            .iter()
            .map(|(id, name)| {
                Row::new(
                    Arc::clone(&cols),
                    vec![Value::Int(*id), Value::Text((*name).to_string())],
                )
            })
            .collect();
        RowSet::from_rows(cols, rows)
    }

    #[test]
    fn test_list_preserves_order() {
        let mut rs = people(&[(3, "c"), (1, "a"), (2, "b")]);
        let ids = extract_list(&mut rs, column::<i32>("id")).unwrap();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_list_aborts_on_first_failure() {
        let mut rs = people(&[(1, "a"), (2, "b"), (3, "c")]);
        let calls = Cell::new(0);
        let err = extract_list(&mut rs, |row: &Row| {
            calls.set(calls.get() + 1);
            let id = row.int("id")?;
            if id == 2 {
                return Err(Error::extraction_failed("bad row", None));
            }
            Ok(id)
        })
        .unwrap_err();
        assert!(err.is_extraction());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_one_checks_cardinality_before_extracting() {
        let calls = Cell::new(0);
        let counting = |row: &Row| {
            calls.set(calls.get() + 1);
            row.string("name")
        };

        let err = extract_one(&mut people(&[]), counting).unwrap_err();
        assert!(matches!(err, Error::Cardinality(CardinalityError { actual: 0, .. })));

        let err = extract_one(&mut people(&[(1, "a"), (2, "b")]), counting).unwrap_err();
        assert!(err.is_cardinality());
        assert_eq!(calls.get(), 0);

        let name = extract_one(&mut people(&[(1, "a")]), counting).unwrap();
        assert_eq!(name, "a");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_optional() {
        assert_eq!(extract_optional(&mut people(&[]), column::<i32>("id")).unwrap(), None);
        assert_eq!(
            extract_optional(&mut people(&[(9, "z")]), column::<i32>("id")).unwrap(),
            Some(9)
        );
        assert!(
            extract_optional(&mut people(&[(1, "a"), (2, "b")]), column::<i32>("id"))
                .unwrap_err()
                .is_cardinality()
        );
    }

    #[test]
    fn test_column_at_and_map() {
        let mut rs = people(&[(1, "ann")]);
        let upper = map(column_at::<String>(2), |s: String| s.to_uppercase());
        assert_eq!(extract_one(&mut rs, upper).unwrap(), "ANN");
    }

    #[test]
    fn test_row_set_helpers() {
        assert_eq!(extract_all(&mut people(&[(1, "a"), (2, "b")]), count_rows()).unwrap(), 2);
        assert!(extract_all(&mut people(&[(1, "a")]), exists()).unwrap());
        assert!(!extract_all(&mut people(&[]), exists()).unwrap());

        let groups = extract_all(
            &mut people(&[(1, "Michal"), (2, "Kasia"), (4, "Michal")]),
            group_by(column::<String>("name"), column::<i32>("id")),
        )
        .unwrap();
        assert_eq!(groups["Michal"], vec![1, 4]);
        assert_eq!(groups["Kasia"], vec![2]);
    }

    #[test]
    fn test_type_mismatch_is_extraction_error() {
        let mut rs = people(&[(1, "a")]);
        let err = extract_one(&mut rs, column::<i64>("name")).unwrap_err();
        assert!(
            matches!(err, Error::Extraction(ref e) if e.kind == ExtractionErrorKind::TypeMismatch)
        );
    }

    #[test]
    fn test_extractor_failures_become_extraction_errors() {
        let err = extract_list(&mut people(&[(1, "a"), (2, "b")]), |row: &Row| {
            match row.int("id")? {
                2 => Err(Error::custom("bad row")),
                id => Ok(id),
            }
        })
        .unwrap_err();
        match &err {
            Error::Extraction(e) => {
                assert_eq!(e.kind, ExtractionErrorKind::Custom);
                assert!(e.message.contains("bad row"));
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());

        let err = extract_all(&mut people(&[(1, "a")]), |_: &mut RowSet| {
            Err::<(), _>(Error::custom("no totals"))
        })
        .unwrap_err();
        assert!(err.is_extraction());

        let err = extract_all(&mut people(&[(1, "a")]), |_: &mut RowSet| {
            Err::<(), _>(Error::Cardinality(CardinalityError {
                expected: EXACTLY_ONE,
                actual: 0,
            }))
        })
        .unwrap_err();
        assert!(err.is_cardinality());
    }

    #[test]
    fn test_stream_failure_propagates_unchanged() {
        let cols = Arc::new(ColumnInfo::new(vec!["id".into()]));
        let entries = vec![
            Ok(Row::new(Arc::clone(&cols), vec![Value::Int(1)])),
            stream_error(Error::data_access(DataAccessErrorKind::Cancelled, "stop")),
        ];
        let mut rs = RowSet::from_stream(Arc::clone(&cols), entries.into_iter());
        let err = extract_list(&mut rs, column::<i32>("id")).unwrap_err();
        assert_eq!(err.data_access_kind(), Some(DataAccessErrorKind::Cancelled));

        let entries = vec![stream_error(Error::data_access(
            DataAccessErrorKind::Cancelled,
            "stop",
        ))];
        let mut rs = RowSet::from_stream(cols, entries.into_iter());
        let err = extract_all(&mut rs, count_rows()).unwrap_err();
        assert_eq!(err.data_access_kind(), Some(DataAccessErrorKind::Cancelled));
    }
}
