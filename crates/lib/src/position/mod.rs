//! The position engine.
//!
//! A [`Positioning`] is built once per positioned type from its
//! [`TableSchema`] and a [`Store`]. The host calls its lifecycle hooks inside
//! the transaction that saves a row:
//!
//! - [`before_create`](Positioning::before_create) before inserting,
//! - [`before_update`](Positioning::before_update) before updating,
//! - [`before_destroy`](Positioning::before_destroy) before deleting,
//!
//! and then commits or rolls back through [`Transaction`], which releases the
//! locks the hooks took. Out-of-band maintenance ([`heal`](Positioning::heal),
//! [`reposition`](Positioning::reposition), [`check`](Positioning::check))
//! runs its own transactions.

mod directive;
mod errors;
mod healer;
mod mechanism;
mod reposition;
mod resolver;

pub use directive::PositionDirective;
pub use errors::PositionError;
pub use healer::{Direction, HealReport, OrderBy, ScopeReport};
pub use reposition::{RepositionOrder, RepositionReport};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mechanism::Mechanism;

use crate::Result;
use crate::config::TableSchema;
use crate::lock::{self, LockStrategy, ScopeLock};
use crate::record::ScopedPositionable;
use crate::scope::Scope;
use crate::store::sql::{Sql, decode_scope};
use crate::store::{SqlxResultExt, Store, Transaction};
use crate::value::Key;

/// Maintains every tracked column of one positioned type.
#[derive(Debug)]
pub struct Positioning {
    store: Store,
    schema: Arc<TableSchema>,
    /// One lock per tracked column, in declaration order.
    locks: Vec<Arc<dyn ScopeLock>>,
    shifts: AtomicU64,
}

impl Positioning {
    pub fn new(store: &Store, schema: Arc<TableSchema>) -> Self {
        let locks = schema
            .columns()
            .iter()
            .map(|column| lock::for_column(store, schema.table(), column))
            .collect();
        Self {
            store: store.clone(),
            schema,
            locks,
            shifts: AtomicU64::new(0),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Number of expand/contract operations run so far.
    pub fn shift_count(&self) -> u64 {
        self.shifts.load(Ordering::Relaxed)
    }

    /// The lock strategy in effect for `column`.
    pub fn lock_strategy(&self, column: &str) -> Result<LockStrategy> {
        Ok(self.mechanism(column)?.lock.strategy())
    }

    fn mechanism(&self, column: &str) -> Result<Mechanism<'_>> {
        self.mechanisms()
            .find(|m| m.column.column() == column)
            .ok_or_else(|| {
                PositionError::UnknownColumn {
                    table: self.schema.table().to_string(),
                    column: column.to_string(),
                }
                .into()
            })
    }

    fn mechanisms(&self) -> impl Iterator<Item = Mechanism<'_>> {
        self.schema
            .columns()
            .iter()
            .zip(&self.locks)
            .map(move |(column, lock)| Mechanism {
                engine: self,
                column,
                lock: lock.as_ref(),
            })
    }

    /// Whether `key` has one value per primary-key column.
    pub(crate) fn key_matches(&self, key: &Key) -> bool {
        key.len() == self.schema.primary_key().len()
    }

    pub(crate) fn require_key<R: ScopedPositionable + ?Sized>(&self, row: &R) -> Result<Key> {
        let key = row.key().ok_or_else(|| PositionError::MissingKey {
            table: self.schema.table().to_string(),
        })?;
        if !self.key_matches(&key) {
            return Err(PositionError::MalformedKey {
                table: self.schema.table().to_string(),
                key,
                expected: self.schema.primary_key().len(),
            }
            .into());
        }
        Ok(key)
    }

    /// Assign every tracked column of a row about to be inserted.
    pub async fn before_create<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &mut R,
    ) -> Result<()> {
        for mechanism in self.mechanisms() {
            mechanism.create_position(tx, row).await?;
        }
        Ok(())
    }

    /// Move a row about to be updated to its requested position and scope.
    ///
    /// Columns whose scope and position are both unchanged are left alone.
    pub async fn before_update<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &mut R,
    ) -> Result<()> {
        for mechanism in self.mechanisms() {
            mechanism.update_position(tx, row).await?;
        }
        Ok(())
    }

    /// Close the gap a row about to be deleted leaves behind.
    pub async fn before_destroy<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &R,
    ) -> Result<()> {
        for mechanism in self.mechanisms() {
            mechanism.destroy_position(tx, row).await?;
        }
        Ok(())
    }

    /// Key of the row immediately before `row` in `column`'s order.
    pub async fn prior<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &R,
        column: &str,
    ) -> Result<Option<Key>> {
        self.mechanism(column)?.neighbour(tx, row, -1).await
    }

    /// Key of the row immediately after `row` in `column`'s order.
    pub async fn subsequent<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &R,
        column: &str,
    ) -> Result<Option<Key>> {
        self.mechanism(column)?.neighbour(tx, row, 1).await
    }

    /// Distinct scopes of `column`, optionally only those holding `keys`.
    async fn scopes(&self, mechanism: &Mechanism<'_>, keys: Option<&[Key]>) -> Result<Vec<Scope>> {
        let columns = mechanism.column.scope_columns();
        if columns.is_empty() {
            return Ok(vec![Scope::unscoped()]);
        }
        let mut sql = Sql::new("SELECT DISTINCT ");
        sql.push_idents(columns).push(" FROM ").push_ident(mechanism.table());
        if let Some(keys) = keys {
            sql.push(" WHERE ").push_keys(self.schema.primary_key(), keys);
        }

        let mut conn = self.connection().await?;
        let rows = sql.fetch_all(&mut conn, "Failed to list scopes").await?;
        let mut scopes = rows
            .iter()
            .map(|row| decode_scope(row, 0, columns))
            .collect::<Result<Vec<_>>>()?;
        scopes.sort();
        Ok(scopes)
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Any>> {
        self.store
            .pool()
            .acquire()
            .await
            .sql_context("Failed to acquire connection")
    }
}

