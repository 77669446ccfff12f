//! A minimal persistence layer for dynamic [`Record`]s.
//!
//! Hosts with their own persistence call the engine's hooks directly. `Table`
//! is what the command line tool and the test suite use: it saves records
//! with plain SQL and invokes the hooks at the right points.

use std::collections::BTreeMap;
use std::sync::Arc;

use sqlx::Column;
use sqlx::Row;
use sqlx::any::AnyRow;
use tracing::debug;

use crate::Result;
use crate::position::{PositionError, Positioning};
use crate::record::{Record, ScopedPositionable};
use crate::scope::Scope;
use crate::store::sql::{Sql, decode_key, decode_value};
use crate::store::{StoreError, Transaction};
use crate::value::{Key, Value};

/// Saves, loads and deletes the rows of one positioned type.
#[derive(Debug, Clone)]
pub struct Table {
    engine: Arc<Positioning>,
}

impl Table {
    pub fn new(engine: Arc<Positioning>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Positioning> {
        &self.engine
    }

    fn name(&self) -> &str {
        self.engine.schema().table()
    }

    fn primary_key(&self) -> &[String] {
        self.engine.schema().primary_key()
    }

    fn missing_key(&self) -> crate::Error {
        PositionError::MissingKey {
            table: self.name().to_string(),
        }
        .into()
    }

    /// Insert a new record, assigning its positions first.
    ///
    /// Primary-key values present on the record are used as given; otherwise
    /// the key generated by the database is read back.
    pub async fn insert(&self, tx: &mut Transaction, record: &mut Record) -> Result<Key> {
        self.engine.before_create(tx, record).await?;
        if let Some(timestamp) = self.engine.schema().timestamp_column() {
            if record.get(timestamp).is_null() {
                record.set(timestamp, tx.now_millis());
            }
        }

        let values: Vec<(String, Value)> = record
            .attributes()
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        let mut sql = Sql::new("INSERT INTO ");
        sql.push_ident(self.name());
        if values.is_empty() {
            sql.push(" DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
            sql.push(" (").push_idents(&columns).push(") VALUES (");
            for (i, (_, value)) in values.into_iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                sql.push_bind(value);
            }
            sql.push(")");
        }

        let provided = Key::new(
            self.primary_key()
                .iter()
                .map(|c| record.get(c).clone())
                .collect(),
        );
        let key = if provided.is_blank() {
            sql.push(" RETURNING ").push_idents(self.primary_key());
            let row = sql
                .fetch_optional(tx.conn(), "Failed to insert row")
                .await?
                .ok_or_else(|| self.missing_key())?;
            let key = decode_key(&row, 0, self.primary_key().len())?;
            for (column, value) in self.primary_key().iter().zip(key.values()) {
                record.set(column, value.clone());
            }
            key
        } else {
            sql.execute(tx.conn(), "Failed to insert row").await?;
            provided
        };

        debug!(table = self.name(), key = %key, "Inserted row");
        record.mark_persisted(key.clone());
        Ok(key)
    }

    /// Save a record's changes, moving it first if its scope or position changed.
    pub async fn update(&self, tx: &mut Transaction, record: &mut Record) -> Result<()> {
        let key = record.key().cloned().ok_or_else(|| self.missing_key())?;
        self.engine.before_update(tx, record).await?;
        if !record.has_changes() {
            return Ok(());
        }
        if let Some(timestamp) = self.engine.schema().timestamp_column() {
            if !record.attribute_changed(timestamp) {
                record.set(timestamp, tx.now_millis());
            }
        }

        let mut sql = Sql::new("UPDATE ");
        sql.push_ident(self.name()).push(" SET ");
        for (i, column) in record.changed_columns().into_iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push_ident(column)
                .push(" = ")
                .push_bind(record.get(column).clone());
        }
        sql.push(" WHERE ").push_key(self.primary_key(), &key);
        let rows = sql.execute(tx.conn(), "Failed to update row").await?;
        if rows == 0 {
            return Err(StoreError::RowNotFound {
                table: self.name().to_string(),
                key,
            }
            .into());
        }

        debug!(table = self.name(), key = %key, "Updated row");
        record.mark_persisted(key);
        Ok(())
    }

    /// Delete a record, closing the gap it leaves.
    pub async fn destroy(&self, tx: &mut Transaction, record: &Record) -> Result<()> {
        let key = record.key().cloned().ok_or_else(|| self.missing_key())?;
        self.engine.before_destroy(tx, record).await?;

        let mut sql = Sql::new("DELETE FROM ");
        sql.push_ident(self.name())
            .push(" WHERE ")
            .push_key(self.primary_key(), &key);
        let rows = sql.execute(tx.conn(), "Failed to delete row").await?;
        if rows == 0 {
            return Err(StoreError::RowNotFound {
                table: self.name().to_string(),
                key,
            }
            .into());
        }
        debug!(table = self.name(), key = %key, "Deleted row");
        Ok(())
    }

    /// Delete every row whose `foreign_key` is `parent`, as a cascade from
    /// deleting the parent. Returns the number of rows deleted.
    ///
    /// Tracked columns scoped by `foreign_key` lose their whole scope, so no
    /// contraction runs for them.
    pub async fn destroy_dependents(
        &self,
        tx: &mut Transaction,
        foreign_key: &str,
        parent: impl Into<Value>,
    ) -> Result<u64> {
        let filter = Scope::new(vec![(foreign_key.to_string(), parent.into())]);
        let dependents = self.select(tx, &filter, None).await?;
        for mut record in dependents.iter().cloned() {
            record.mark_destroyed_by(foreign_key);
            self.destroy(tx, &record).await?;
        }
        debug!(
            table = self.name(),
            foreign_key,
            rows = dependents.len(),
            "Destroyed dependents"
        );
        Ok(dependents.len() as u64)
    }

    pub async fn find(&self, tx: &mut Transaction, key: &Key) -> Result<Option<Record>> {
        let mut sql = Sql::new("SELECT * FROM ");
        sql.push_ident(self.name())
            .push(" WHERE ")
            .push_key(self.primary_key(), key);
        match sql.fetch_optional(tx.conn(), "Failed to find row").await? {
            Some(row) => Ok(Some(self.decode(&row)?)),
            None => Ok(None),
        }
    }

    /// Records of `scope` ordered by the tracked `column`.
    pub async fn in_order(
        &self,
        tx: &mut Transaction,
        column: &str,
        scope: &Scope,
    ) -> Result<Vec<Record>> {
        if self.engine.schema().tracked(column).is_none() {
            return Err(PositionError::UnknownColumn {
                table: self.name().to_string(),
                column: column.to_string(),
            }
            .into());
        }
        self.select(tx, scope, Some(column)).await
    }

    async fn select(
        &self,
        tx: &mut Transaction,
        filter: &Scope,
        order: Option<&str>,
    ) -> Result<Vec<Record>> {
        let mut sql = Sql::new("SELECT * FROM ");
        sql.push_ident(self.name())
            .push(" WHERE ")
            .push_scope(filter)
            .push(" ORDER BY ");
        if let Some(column) = order {
            sql.push_ident(column).push(", ");
        }
        sql.push_idents(self.primary_key());
        sql.fetch_all(tx.conn(), "Failed to select rows")
            .await?
            .iter()
            .map(|row| self.decode(row))
            .collect()
    }

    fn decode(&self, row: &AnyRow) -> Result<Record> {
        let mut attributes = BTreeMap::new();
        for (i, column) in row.columns().iter().enumerate() {
            attributes.insert(column.name().to_string(), decode_value(row, i)?);
        }
        let key = Key::new(
            self.primary_key()
                .iter()
                .map(|c| attributes.get(c).cloned().unwrap_or_default())
                .collect(),
        );
        if key.is_blank() {
            return Err(self.missing_key());
        }
        Ok(Record::persisted(key, attributes))
    }
}
