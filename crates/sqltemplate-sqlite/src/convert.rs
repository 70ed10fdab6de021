//! Conversions between sqltemplate values and SQLite.

use std::sync::Arc;

use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection, ErrorCode, ffi};
use sqltemplate_core::{
    ColumnInfo, DataAccessError, DataAccessErrorKind, Error, Result, Row, RowSet, Value,
};

/// Convert a bound parameter to SQLite's storage classes.
///
/// Booleans become 0/1, temporal values their integer encoding and JSON its
/// text form. Arrays have no SQLite representation.
pub(crate) fn to_sqlite(value: &Value) -> Result<SqliteValue> {
    Ok(match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::TinyInt(v) => SqliteValue::Integer(i64::from(*v)),
        Value::SmallInt(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Int(v) => SqliteValue::Integer(i64::from(*v)),
        Value::BigInt(v) | Value::Time(v) | Value::Timestamp(v) => SqliteValue::Integer(*v),
        Value::Date(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Float(v) => SqliteValue::Real(f64::from(*v)),
        Value::Double(v) => SqliteValue::Real(*v),
        Value::Decimal(s) | Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Json(v) => SqliteValue::Text(v.to_string()),
        Value::Array(_) => {
            return Err(Error::data_access(
                DataAccessErrorKind::InvalidParameter,
                "ARRAY parameters cannot be bound to SQLite",
            ));
        }
    })
}

pub(crate) fn bind_all(params: &[Value]) -> Result<Vec<SqliteValue>> {
    params.iter().map(to_sqlite).collect()
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::BigInt(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// Run a query and materialize its rows.
pub(crate) fn query(conn: &Connection, sql: &str, params: &[Value]) -> Result<RowSet> {
    let bound = bind_all(params)?;
    let mut stmt = conn.prepare(sql).map_err(data_access_error)?;
    let columns = Arc::new(ColumnInfo::new(
        stmt.column_names().into_iter().map(String::from).collect(),
    ));
    let width = columns.len();

    let mut rows = stmt
        .query(rusqlite::params_from_iter(bound.iter()))
        .map_err(data_access_error)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(data_access_error)? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(from_sqlite(row.get_ref(idx).map_err(data_access_error)?));
        }
        out.push(Row::new(Arc::clone(&columns), values));
    }
    tracing::trace!(rows = out.len(), "SQLite query returned rows");
    Ok(RowSet::from_rows(columns, out))
}

pub(crate) fn execute(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64> {
    let bound = bind_all(params)?;
    let affected = conn
        .execute(sql, rusqlite::params_from_iter(bound.iter()))
        .map_err(data_access_error)?;
    Ok(affected as u64)
}

pub(crate) fn insert(conn: &Connection, sql: &str, params: &[Value]) -> Result<Option<i64>> {
    match execute(conn, sql, params)? {
        0 => Ok(None),
        _ => Ok(Some(conn.last_insert_rowid())),
    }
}

/// Map a rusqlite failure onto the data access taxonomy.
pub(crate) fn data_access_error(err: rusqlite::Error) -> Error {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(failure, message) => classify(failure, message.as_deref()),
        rusqlite::Error::InvalidParameterCount(..) | rusqlite::Error::InvalidParameterName(_) => {
            DataAccessErrorKind::InvalidParameter
        }
        rusqlite::Error::InvalidPath(_) => DataAccessErrorKind::Connection,
        _ => DataAccessErrorKind::Database,
    };
    Error::DataAccess(DataAccessError {
        kind,
        message: err.to_string(),
        sql: None,
        source: Some(Box::new(err)),
    })
}

fn classify(failure: &ffi::Error, message: Option<&str>) -> DataAccessErrorKind {
    match failure.code {
        ErrorCode::ConstraintViolation => DataAccessErrorKind::Constraint,
        ErrorCode::DatabaseBusy if failure.extended_code == ffi::SQLITE_BUSY_SNAPSHOT => {
            DataAccessErrorKind::Serialization
        }
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => DataAccessErrorKind::Timeout,
        ErrorCode::ReadOnly => DataAccessErrorKind::Transaction,
        ErrorCode::OperationInterrupted => DataAccessErrorKind::Cancelled,
        ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::PermissionDenied => {
            DataAccessErrorKind::Connection
        }
        ErrorCode::ParameterOutOfRange => DataAccessErrorKind::InvalidParameter,
        ErrorCode::Unknown => match message {
            Some(m) if m.starts_with("no such table") || m.starts_with("no such column") => {
                DataAccessErrorKind::NotFound
            }
            Some(m) if m.contains("syntax error") || m.starts_with("incomplete input") => {
                DataAccessErrorKind::Syntax
            }
            _ => DataAccessErrorKind::Database,
        },
        _ => DataAccessErrorKind::Database,
    }
}
