//! Keeping one tracked column dense through create, update and destroy.
//!
//! Every transition follows the same protocol: lock the scopes involved,
//! resolve the target against the destination scope, park the acting row
//! at `0`, then shift the rows in between. A shift runs in two statements:
//!
//! 1. negate every position in the affected range;
//! 2. flip every negative position back, one slot up (expand) or down
//!    (contract).
//!
//! At no point do two rows in a scope hold the same non-negative position, so
//! a unique index over `(scope..., position)` holds throughout.

use std::sync::atomic::Ordering;

use tracing::{debug, trace};

use super::resolver::{self, Extent, Placement};
use super::{PositionDirective, PositionError, Positioning};
use crate::Result;
use crate::config::TrackedColumn;
use crate::lock::{LockTarget, ScopeLock};
use crate::record::ScopedPositionable;
use crate::scope::Scope;
use crate::store::sql::{Sql, decode_key};
use crate::store::{StoreError, Transaction};
use crate::value::{Key, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shift {
    /// Open a slot: every position in range moves up one.
    Expand,
    /// Close a slot: every position in range moves down one.
    Contract,
}

/// The operations on one tracked column of one type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mechanism<'a> {
    pub engine: &'a Positioning,
    pub column: &'a TrackedColumn,
    pub lock: &'a dyn ScopeLock,
}

impl<'a> Mechanism<'a> {
    pub fn table(&self) -> &'a str {
        self.engine.schema().table()
    }

    pub fn name(&self) -> &'a str {
        self.column.column()
    }

    pub fn scope_of<R: ScopedPositionable + ?Sized>(&self, row: &R) -> Scope {
        Scope::of(self.column, |c| row.attribute(c))
    }

    pub fn scope_was<R: ScopedPositionable + ?Sized>(&self, row: &R) -> Scope {
        Scope::of(self.column, |c| row.attribute_was(c))
    }

    fn scope_changed<R: ScopedPositionable + ?Sized>(&self, row: &R) -> bool {
        self.column
            .scope_columns()
            .iter()
            .any(|c| row.attribute_changed(c))
    }

    /// The directive the row asks for, if any.
    ///
    /// A row without an explicit directive whose position attribute was
    /// assigned directly is read as asking for that value.
    fn requested<R: ScopedPositionable + ?Sized>(
        &self,
        row: &R,
    ) -> Result<Option<PositionDirective>> {
        let column = self.name();
        if let Some(directive) = row.position_directive(column) {
            return Ok(Some(directive));
        }
        if !row.attribute_changed(column) {
            return Ok(None);
        }
        match row.attribute(column) {
            Value::Null => Ok(Some(PositionDirective::Unset)),
            Value::Int(n) => Ok(Some(PositionDirective::Absolute(n))),
            Value::Text(s) => Ok(Some(s.parse()?)),
            other => Err(PositionError::invalid(other).into()),
        }
    }

    /// Serialise against every other writer to `scopes`.
    pub async fn lock(&self, tx: &mut Transaction, scopes: Vec<Scope>) -> Result<()> {
        let target = LockTarget::new(self.table(), self.column, scopes);
        if let Some(path) = self.lock.guard_path()
            && tx.holds(path)
        {
            trace!(
                table = self.table(),
                column = self.name(),
                "Lock already held by this transaction"
            );
            return Ok(());
        }
        if let Some(guard) = self.lock.acquire(tx.conn(), &target).await? {
            tx.hold(guard);
        }
        debug!(
            table = self.table(),
            column = self.name(),
            strategy = ?self.lock.strategy(),
            scopes = target.scopes.len(),
            "Locked scopes"
        );
        Ok(())
    }

    pub async fn max_position(&self, tx: &mut Transaction, scope: &Scope) -> Result<i64> {
        let mut sql = Sql::new("SELECT MAX(");
        sql.push_ident(self.name())
            .push(") FROM ")
            .push_ident(self.table())
            .push(" WHERE ")
            .push_scope(scope);
        Ok(sql
            .fetch_int(tx.conn(), "Failed to read scope extent")
            .await?
            .unwrap_or(0))
    }

    /// Stored position of `key` if the row is in `scope`. A NULL position reads as `0`.
    pub async fn position_in(
        &self,
        tx: &mut Transaction,
        scope: &Scope,
        key: &Key,
    ) -> Result<Option<i64>> {
        let mut sql = Sql::new("SELECT COALESCE(");
        sql.push_ident(self.name())
            .push(", 0) FROM ")
            .push_ident(self.table())
            .push(" WHERE ")
            .push_scope(scope)
            .push(" AND ")
            .push_key(self.engine.schema().primary_key(), key);
        sql.fetch_int(tx.conn(), "Failed to read position").await
    }

    /// Stored position of `key` if the row is in `scope` and has one.
    pub async fn placed_position_in(
        &self,
        tx: &mut Transaction,
        scope: &Scope,
        key: &Key,
    ) -> Result<Option<i64>> {
        let mut sql = Sql::new("SELECT ");
        sql.push_ident(self.name())
            .push(" FROM ")
            .push_ident(self.table())
            .push(" WHERE ")
            .push_scope(scope)
            .push(" AND ")
            .push_key(self.engine.schema().primary_key(), key)
            .push(" AND ")
            .push_ident(self.name())
            .push(" IS NOT NULL");
        sql.fetch_int(tx.conn(), "Failed to read position").await
    }

    pub async fn stored_position(&self, tx: &mut Transaction, key: &Key) -> Result<i64> {
        self.position_in(tx, &Scope::unscoped(), key)
            .await?
            .ok_or_else(|| {
                StoreError::RowNotFound {
                    table: self.table().to_string(),
                    key: key.clone(),
                }
                .into()
            })
    }

    pub async fn write_own(&self, tx: &mut Transaction, key: &Key, position: i64) -> Result<()> {
        let mut sql = Sql::new("UPDATE ");
        sql.push_ident(self.table())
            .push(" SET ")
            .push_ident(self.name())
            .push(" = ")
            .push_bind(position)
            .push(" WHERE ")
            .push_key(self.engine.schema().primary_key(), key);
        sql.execute(tx.conn(), "Failed to park row").await?;
        Ok(())
    }

    /// Resolve `directive` against `scope`.
    ///
    /// `position_was` is the acting row's stored position when it is already
    /// a member of `scope`.
    pub async fn resolve(
        &self,
        tx: &mut Transaction,
        directive: &PositionDirective,
        scope: &Scope,
        position_was: Option<i64>,
    ) -> Result<i64> {
        let reference = match directive {
            PositionDirective::Before(Some(key)) | PositionDirective::After(Some(key)) => {
                let found = if self.engine.key_matches(key) {
                    self.position_in(tx, scope, key).await?
                } else {
                    None
                };
                match found {
                    Some(position) => Some(position),
                    None => {
                        return Err(PositionError::InvalidScope {
                            column: self.name().to_string(),
                            reference: key.clone(),
                        }
                        .into());
                    }
                }
            }
            _ => None,
        };
        let extent = Extent {
            max_position: self.max_position(tx, scope).await?,
            position_was,
        };
        let target = resolver::solidify(Placement::of(directive, reference), &extent);
        debug!(
            table = self.table(),
            column = self.name(),
            scope = %scope,
            directive = ?directive,
            target,
            "Resolved position"
        );
        Ok(target)
    }

    /// Shift the positions in `[from, to]` (unbounded above when `to` is
    /// `None`) one slot in the direction of `shift`.
    pub async fn shift(
        &self,
        tx: &mut Transaction,
        scope: &Scope,
        from: i64,
        to: Option<i64>,
        shift: Shift,
    ) -> Result<u64> {
        let column = self.name();

        let mut negate = Sql::new("UPDATE ");
        negate
            .push_ident(self.table())
            .push(" SET ")
            .push_ident(column)
            .push(" = -")
            .push_ident(column);
        if let Some(timestamp) = self.engine.schema().timestamp_column() {
            negate
                .push(", ")
                .push_ident(timestamp)
                .push(" = ")
                .push_bind(tx.now_millis());
        }
        negate
            .push(" WHERE ")
            .push_scope(scope)
            .push(" AND ")
            .push_ident(column)
            .push(" >= ")
            .push_bind(from);
        if let Some(to) = to {
            negate.push(" AND ").push_ident(column).push(" <= ").push_bind(to);
        }
        let rows = negate
            .execute(tx.conn(), "Failed to move positions out of range")
            .await?;

        let mut settle = Sql::new("UPDATE ");
        settle
            .push_ident(self.table())
            .push(" SET ")
            .push_ident(column)
            .push(" = -")
            .push_ident(column)
            .push(match shift {
                Shift::Expand => " + 1",
                Shift::Contract => " - 1",
            })
            .push(" WHERE ")
            .push_scope(scope)
            .push(" AND ")
            .push_ident(column)
            .push(" <= -1");
        settle
            .execute(tx.conn(), "Failed to settle shifted positions")
            .await?;

        self.engine.shifts.fetch_add(1, Ordering::Relaxed);
        debug!(
            table = self.table(),
            column,
            scope = %scope,
            from,
            to = ?to,
            shift = ?shift,
            rows,
            "Shifted positions"
        );
        Ok(rows)
    }

    pub async fn create_position<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &mut R,
    ) -> Result<()> {
        let scope = self.scope_of(row);
        self.lock(tx, vec![scope.clone()]).await?;

        let directive = self.requested(row)?.unwrap_or_default();
        let target = self.resolve(tx, &directive, &scope, None).await?;
        self.shift(tx, &scope, target, None, Shift::Expand).await?;

        row.write_position(self.name(), target);
        Ok(())
    }

    pub async fn update_position<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &mut R,
    ) -> Result<()> {
        let requested = self.requested(row)?;
        let attributes_moved = self.scope_changed(row);
        if requested.is_none() && !attributes_moved {
            return Ok(());
        }
        let key = self.engine.require_key(row)?;

        let scope = self.scope_of(row);
        let scope_was = self.scope_was(row);
        let mut scopes = vec![scope.clone()];
        if attributes_moved {
            scopes.push(scope_was.clone());
        }
        self.lock(tx, scopes).await?;

        // The store decides membership; a scope attribute rewritten to an
        // equivalent value does not move the row.
        let membership = self.position_in(tx, &scope, &key).await?;
        let moved = match membership {
            Some(_) => false,
            None if attributes_moved => true,
            None => {
                return Err(StoreError::RowNotFound {
                    table: self.table().to_string(),
                    key,
                }
                .into());
            }
        };
        let directive = match requested {
            Some(directive) => directive,
            None if moved => PositionDirective::Unset,
            None => return Ok(()),
        };

        let target = self.resolve(tx, &directive, &scope, membership).await?;
        let position_was = match membership {
            Some(position) => position,
            None => self.stored_position(tx, &key).await?,
        };
        self.write_own(tx, &key, 0).await?;

        if moved {
            self.shift(tx, &scope_was, position_was, None, Shift::Contract)
                .await?;
            self.shift(tx, &scope, target, None, Shift::Expand).await?;
        } else if target < position_was {
            self.shift(tx, &scope, target, Some(position_was), Shift::Expand)
                .await?;
        } else {
            self.shift(tx, &scope, position_was, Some(target), Shift::Contract)
                .await?;
        }

        row.write_position(self.name(), target);
        Ok(())
    }

    pub async fn destroy_position<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &R,
    ) -> Result<()> {
        if let Some(foreign_key) = row.destroyed_by_association() {
            if self.column.is_scoped_by(foreign_key) {
                debug!(
                    table = self.table(),
                    column = self.name(),
                    foreign_key,
                    "Scope destroyed with its parent; not contracting"
                );
                return Ok(());
            }
        }
        let key = self.engine.require_key(row)?;
        let scope = self.scope_was(row);
        self.lock(tx, vec![scope.clone()]).await?;

        let Some(position) = self.position_in(tx, &scope, &key).await? else {
            tracing::warn!(
                table = self.table(),
                column = self.name(),
                key = %key,
                "Destroyed row is not in its recorded scope; nothing to contract"
            );
            return Ok(());
        };
        self.write_own(tx, &key, 0).await?;
        self.shift(tx, &scope, position + 1, None, Shift::Contract)
            .await?;
        Ok(())
    }

    /// Key of the row `offset` slots away from `row` in its current scope.
    pub async fn neighbour<R: ScopedPositionable + ?Sized>(
        &self,
        tx: &mut Transaction,
        row: &R,
        offset: i64,
    ) -> Result<Option<Key>> {
        let Some(position) = row.attribute(self.name()).as_int() else {
            return Ok(None);
        };
        let primary_key = self.engine.schema().primary_key();
        let mut sql = Sql::new("SELECT ");
        sql.push_idents(primary_key)
            .push(" FROM ")
            .push_ident(self.table())
            .push(" WHERE ")
            .push_scope(&self.scope_of(row))
            .push(" AND ")
            .push_ident(self.name())
            .push(" = ")
            .push_bind(position + offset)
            .push(" LIMIT 1");
        match sql
            .fetch_optional(tx.conn(), "Failed to read neighbour")
            .await?
        {
            Some(found) => Ok(Some(decode_key(&found, 0, primary_key.len())?)),
            None => Ok(None),
        }
    }
}
