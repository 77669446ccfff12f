//! Statement building.
//!
//! Table and column names come from declarations, values from rows, so
//! statements are assembled at runtime: identifiers are quoted and values
//! are bound through numbered `$n` placeholders.

use std::fmt::Write as _;

use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Column, Row};

use super::{SqlxResultExt, StoreError};
use crate::Result;
use crate::scope::Scope;
use crate::value::{Key, Value};

/// Quote an identifier for both SQLite and PostgreSQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A statement under construction together with its bound values.
#[derive(Debug, Default)]
pub(crate) struct Sql {
    text: String,
    binds: Vec<Value>,
}

impl Sql {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            binds: Vec::new(),
        }
    }

    pub fn push(&mut self, text: &str) -> &mut Self {
        self.text.push_str(text);
        self
    }

    pub fn push_ident(&mut self, name: &str) -> &mut Self {
        self.text.push_str(&quote_ident(name));
        self
    }

    /// Comma separated, quoted identifiers.
    pub fn push_idents<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.text.push_str(", ");
            }
            self.push_ident(name.as_ref());
        }
        self
    }

    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.binds.push(value.into());
        // Writing to a String cannot fail.
        let _ = write!(self.text, "${}", self.binds.len());
        self
    }

    /// `column = $n`, or `column IS NULL` for a null value.
    pub fn push_eq(&mut self, column: &str, value: &Value) -> &mut Self {
        self.push_ident(column);
        if value.is_null() {
            self.push(" IS NULL")
        } else {
            self.push(" = ").push_bind(value.clone())
        }
    }

    /// A predicate matching exactly the rows of `scope`.
    pub fn push_scope(&mut self, scope: &Scope) -> &mut Self {
        if scope.is_unscoped() {
            return self.push("1 = 1");
        }
        self.push("(");
        for (i, (column, value)) in scope.components().iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.push_eq(column, value);
        }
        self.push(")")
    }

    /// A predicate matching the row with primary key `key`.
    pub fn push_key<S: AsRef<str>>(&mut self, primary_key: &[S], key: &Key) -> &mut Self {
        self.push("(");
        for (i, (column, value)) in primary_key.iter().zip(key.values()).enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.push_eq(column.as_ref(), value);
        }
        self.push(")")
    }

    /// A predicate matching any of `keys`.
    pub fn push_keys<S: AsRef<str>>(&mut self, primary_key: &[S], keys: &[Key]) -> &mut Self {
        if keys.is_empty() {
            return self.push("1 = 0");
        }
        self.push("(");
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                self.push(" OR ");
            }
            self.push_key(primary_key, key);
        }
        self.push(")")
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    fn query(&self) -> sqlx::query::Query<'_, sqlx::Any, sqlx::any::AnyArguments<'_>> {
        let mut query = sqlx::query(&self.text);
        for value in &self.binds {
            query = match value {
                Value::Null => query.bind(None::<i64>),
                Value::Bool(b) => query.bind(*b),
                Value::Int(i) => query.bind(*i),
                Value::Text(s) => query.bind(s.as_str()),
            };
        }
        query
    }

    pub async fn execute(&self, conn: &mut AnyConnection, context: &str) -> Result<u64> {
        let result = self.query().execute(&mut *conn).await.sql_context(context)?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&self, conn: &mut AnyConnection, context: &str) -> Result<Vec<AnyRow>> {
        self.query().fetch_all(&mut *conn).await.sql_context(context)
    }

    pub async fn fetch_optional(
        &self,
        conn: &mut AnyConnection,
        context: &str,
    ) -> Result<Option<AnyRow>> {
        self.query().fetch_optional(&mut *conn).await.sql_context(context)
    }

    /// The first column of the first row as an integer, `None` when there is
    /// no row or the column is NULL.
    pub async fn fetch_int(&self, conn: &mut AnyConnection, context: &str) -> Result<Option<i64>> {
        match self.fetch_optional(conn, context).await? {
            Some(row) => row.try_get::<Option<i64>, _>(0).sql_context(context),
            None => Ok(None),
        }
    }
}

/// Read a column of unknown type as a [`Value`].
pub(crate) fn decode_value(row: &AnyRow, index: usize) -> Result<Value> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::Int));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::Bool));
    }
    match row.try_get::<Option<String>, _>(index) {
        Ok(v) => Ok(v.map_or(Value::Null, Value::Text)),
        Err(e) => Err(StoreError::UndecodableColumn {
            column: row
                .columns()
                .get(index)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| index.to_string()),
            reason: e.to_string(),
        }
        .into()),
    }
}

/// Read `len` consecutive columns starting at `start` as a key.
pub(crate) fn decode_key(row: &AnyRow, start: usize, len: usize) -> Result<Key> {
    (start..start + len)
        .map(|i| decode_value(row, i))
        .collect::<Result<Vec<_>>>()
        .map(Key::new)
}

/// Read `columns.len()` consecutive columns starting at `start` as a scope.
pub(crate) fn decode_scope(row: &AnyRow, start: usize, columns: &[String]) -> Result<Scope> {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| Ok((c.clone(), decode_value(row, start + i)?)))
        .collect::<Result<Vec<_>>>()
        .map(Scope::new)
}
