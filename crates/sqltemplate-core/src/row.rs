//! Result rows and typed column access.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, ExtractionErrorKind, Result};
use crate::value::Value;

/// Column names of a result, shared by every row it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    names: Vec<String>,
    /// Lowercased name -> 0-based index of its first occurrence.
    by_name: HashMap<String, usize>,
}

impl ColumnInfo {
    pub fn new(names: Vec<String>) -> Self {
        let mut by_name = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            by_name.entry(name.to_ascii_lowercase()).or_insert(idx);
        }
        Self { names, by_name }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 0-based index of a column. Lookup is case-insensitive, like SQL identifiers.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }
}

/// A single record of a query result.
///
/// Columns are addressable by name or by 1-based position.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row sharing column metadata with its siblings.
    ///
    /// Missing trailing values are padded with NULL so `values` always matches
    /// the column count.
    pub fn new(columns: Arc<ColumnInfo>, mut values: Vec<Value>) -> Self {
        values.resize(columns.len(), Value::Null);
        Self { columns, values }
    }

    /// Convenience constructor for ad-hoc rows.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(Arc::new(ColumnInfo::new(names)), values)
    }

    pub fn columns(&self) -> &Arc<ColumnInfo> {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.index_of(name).is_some()
    }

    /// Raw value of a named column.
    pub fn value(&self, name: &str) -> Result<&Value> {
        self.columns
            .index_of(name)
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| {
                Error::extraction(
                    ExtractionErrorKind::MissingColumn,
                    name,
                    "no such column in result",
                )
            })
    }

    /// Raw value at a 1-based position.
    pub fn value_at(&self, position: usize) -> Result<&Value> {
        position
            .checked_sub(1)
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| {
                Error::extraction(
                    ExtractionErrorKind::MissingColumn,
                    format!("#{position}"),
                    format!("position out of range 1..={}", self.values.len()),
                )
            })
    }

    /// Typed value of a named column.
    ///
    /// Request `Option<T>` to accept NULL.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.value(name)?;
        T::from_value(value).map_err(|e| e.for_column(name))
    }

    /// Typed value at a 1-based position.
    pub fn get_by_position<T: FromValue>(&self, position: usize) -> Result<T> {
        let value = self.value_at(position)?;
        let label = self
            .columns
            .names()
            .get(position - 1)
            .cloned()
            .unwrap_or_else(|| format!("#{position}"));
        T::from_value(value).map_err(|e| e.for_column(&label))
    }

    pub fn int(&self, name: &str) -> Result<i32> {
        self.get_named(name)
    }

    pub fn long(&self, name: &str) -> Result<i64> {
        self.get_named(name)
    }

    pub fn double(&self, name: &str) -> Result<f64> {
        self.get_named(name)
    }

    pub fn boolean(&self, name: &str) -> Result<bool> {
        self.get_named(name)
    }

    pub fn string(&self, name: &str) -> Result<String> {
        self.get_named(name)
    }

    pub fn string_or_null(&self, name: &str) -> Result<Option<String>> {
        self.get_named(name)
    }

    pub fn bytes(&self, name: &str) -> Result<Vec<u8>> {
        self.get_named(name)
    }

    /// Elements of an array column; NULL yields an empty vector.
    pub fn array<T: FromValue>(&self, name: &str) -> Result<Vec<T>> {
        match self.value(name)? {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .map(|item| T::from_value(item).map_err(|e| e.for_column(name)))
                .collect(),
            other => Err(Error::extraction(
                ExtractionErrorKind::TypeMismatch,
                name,
                format!("expected ARRAY, found {}", other.type_name()),
            )),
        }
    }

    /// Deserialize a JSON column into any serde type.
    pub fn json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T> {
        match self.value(name)? {
            Value::Json(v) => serde_json::from_value(v.clone()).map_err(Error::from),
            Value::Text(s) => serde_json::from_str(s).map_err(Error::from),
            other => Err(Error::extraction(
                ExtractionErrorKind::TypeMismatch,
                name,
                format!("expected JSON, found {}", other.type_name()),
            )),
        }
    }
}

/// Column conversion failure before the column name is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    kind: ExtractionErrorKind,
    message: String,
}

impl ConversionError {
    pub fn null() -> Self {
        Self {
            kind: ExtractionErrorKind::UnexpectedNull,
            message: "unexpected NULL".to_string(),
        }
    }

    pub fn mismatch(expected: &str, found: &Value) -> Self {
        Self {
            kind: ExtractionErrorKind::TypeMismatch,
            message: format!("expected {}, found {}", expected, found.type_name()),
        }
    }

    pub fn out_of_range(expected: &str, found: &Value) -> Self {
        Self {
            kind: ExtractionErrorKind::TypeMismatch,
            message: format!("value {:?} out of range for {}", found, expected),
        }
    }

    fn for_column(self, column: &str) -> Error {
        Error::extraction(self.kind, column, self.message)
    }
}

/// Conversion from a column [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
                    if value.is_null() {
                        return Err(ConversionError::null());
                    }
                    let wide = value
                        .as_i64()
                        .ok_or_else(|| ConversionError::mismatch($name, value))?;
                    <$ty>::try_from(wide).map_err(|_| ConversionError::out_of_range($name, value))
                }
            }
        )*
    };
}

impl_from_value_int!(
    i8 => "TINYINT",
    i16 => "SMALLINT",
    i32 => "INTEGER",
    i64 => "BIGINT",
    u32 => "INTEGER",
    u64 => "BIGINT",
);

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
        if value.is_null() {
            return Err(ConversionError::null());
        }
        value
            .as_f64()
            .ok_or_else(|| ConversionError::mismatch("DOUBLE", value))
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
        if value.is_null() {
            return Err(ConversionError::null());
        }
        value
            .as_bool()
            .ok_or_else(|| ConversionError::mismatch("BOOLEAN", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
        match value {
            Value::Null => Err(ConversionError::null()),
            Value::Text(s) | Value::Decimal(s) => Ok(s.clone()),
            Value::Json(v) => Ok(v.to_string()),
            other => Err(ConversionError::mismatch("TEXT", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
        match value {
            Value::Null => Err(ConversionError::null()),
            other => other
                .as_bytes()
                .map(<[u8]>::to_vec)
                .ok_or_else(|| ConversionError::mismatch("BLOB", other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> std::result::Result<Self, ConversionError> {
        match value {
            Value::Null => Err(ConversionError::null()),
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => {
                serde_json::from_str(s).map_err(|_| ConversionError::mismatch("JSON", value))
            }
            other => Err(ConversionError::mismatch("JSON", other)),
        }
    }
}
