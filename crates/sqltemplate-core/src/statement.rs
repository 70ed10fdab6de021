//! SQL statements with bound parameters.
//!
//! Three flavours are accepted:
//!
//! ```
//! use sqltemplate_core::{Statement, Value};
//!
//! let plain: Statement = "SELECT name FROM people WHERE id = 1".into();
//! let positional = Statement::new("SELECT name FROM people WHERE id = ?").bind(1);
//! let named = Statement::named("SELECT name FROM people WHERE id = :id").param("id", 2);
//!
//! let (sql, params) = named.into_positional().unwrap();
//! assert_eq!(sql, "SELECT name FROM people WHERE id = ?");
//! assert_eq!(params, vec![Value::Int(2)]);
//! # let _ = (plain, positional);
//! ```
//!
//! Engines only ever see the positional form.

use crate::error::{DataAccessErrorKind, Error, Result};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Params {
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

/// A SQL string plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Params,
    /// First binding call that did not match the placeholder style.
    misuse: Option<String>,
}

impl Statement {
    /// A statement using positional `?` placeholders.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::Positional(Vec::new()),
            misuse: None,
        }
    }

    /// A positional statement with all parameters at once.
    pub fn positional<I, V>(sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            sql: sql.into(),
            params: Params::Positional(params.into_iter().map(Into::into).collect()),
            misuse: None,
        }
    }

    /// A statement using `:name` placeholders.
    pub fn named(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::Named(Vec::new()),
            misuse: None,
        }
    }

    /// Append a positional parameter.
    ///
    /// On a named statement the call is recorded and
    /// [`into_positional`](Statement::into_positional) fails with
    /// `InvalidParameter`; use [`Statement::param`] there.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        match &mut self.params {
            Params::Positional(values) => values.push(value.into()),
            Params::Named(_) => {
                tracing::debug!(sql = %self.sql, "bind() called on a named statement");
                self.record_misuse("positional value bound to a statement using :name placeholders");
            }
        }
        self
    }

    /// Set a named parameter, replacing an earlier value of the same name.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match &mut self.params {
            Params::Named(values) => {
                if let Some(slot) = values.iter_mut().find(|(n, _)| *n == name) {
                    slot.1 = value;
                } else {
                    values.push((name, value));
                }
            }
            Params::Positional(_) => {
                tracing::debug!(sql = %self.sql, param = %name, "param() called on a positional statement");
                self.record_misuse(format!(
                    "named parameter ':{name}' set on a statement using ? placeholders"
                ));
            }
        }
        self
    }

    fn record_misuse(&mut self, message: impl Into<String>) {
        if self.misuse.is_none() {
            self.misuse = Some(message.into());
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_named(&self) -> bool {
        matches!(self.params, Params::Named(_))
    }

    /// Resolve to SQL with `?` placeholders and the ordered parameter list.
    ///
    /// Named placeholders are replaced in order of appearance; a name used
    /// twice binds its value twice.
    ///
    /// Fails with `InvalidParameter` when a named parameter has no value or
    /// a binding call did not match the placeholder style.
    pub fn into_positional(self) -> Result<(String, Vec<Value>)> {
        if let Some(message) = self.misuse {
            return Err(
                Error::data_access(DataAccessErrorKind::InvalidParameter, message)
                    .with_sql(&self.sql),
            );
        }
        match self.params {
            Params::Positional(values) => Ok((self.sql, values)),
            Params::Named(values) => expand_named(&self.sql, &values),
        }
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

impl From<&String> for Statement {
    fn from(sql: &String) -> Self {
        Statement::new(sql.as_str())
    }
}

fn expand_named(sql: &str, values: &[(String, Value)]) -> Result<(String, Vec<Value>)> {
    let mut out = String::with_capacity(sql.len());
    let mut bound = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            ':' if matches!(chars.peek(), Some((_, ':'))) => {
                // `::type` cast
                out.push_str("::");
                chars.next();
            }
            ':' if chars
                .peek()
                .is_some_and(|(_, n)| n.is_ascii_alphabetic() || *n == '_') =>
            {
                let start = i + 1;
                let mut end = start;
                while let Some((j, n)) = chars.peek().copied() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = j + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &sql[start..end];
                let value = values
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        Error::data_access(
                            DataAccessErrorKind::InvalidParameter,
                            format!("No value supplied for named parameter ':{name}'"),
                        )
                        .with_sql(sql)
                    })?;
                bound.push(value);
                out.push('?');
            }
            _ => out.push(c),
        }
    }

    Ok((out, bound))
}
