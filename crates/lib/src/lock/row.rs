//! Row-level locking.

use async_trait::async_trait;
use sqlx::AnyConnection;

use super::{LockGuard, LockStrategy, LockTarget, ScopeLock};
use crate::Result;
use crate::scope::Scope;
use crate::store::DbKind;
use crate::store::sql::Sql;
use crate::value::Value;

/// Locks the parent rows a scope belongs to, or the scope's own rows.
///
/// A scope that names a non-polymorphic belongs-to relation with a known
/// parent table is locked through its parent row, which also covers an
/// empty scope. Otherwise every row currently in the scope is locked; on
/// PostgreSQL an empty scope then locks nothing.
///
/// SQLite has no row locks. A no-op write takes the database write lock,
/// which serialises all writers.
#[derive(Debug, Clone, Copy)]
pub struct RowLock {
    kind: DbKind,
}

/// A single row lock statement. Ordered so that every transaction takes
/// its locks in the same sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RowTarget {
    Parent {
        table: String,
        primary_key: String,
        key: Value,
    },
    Scope(Scope),
}

impl RowLock {
    pub fn new(kind: DbKind) -> Self {
        Self { kind }
    }

    fn plan(target: &LockTarget<'_>) -> Vec<RowTarget> {
        let mut rows = Vec::new();
        for scope in &target.scopes {
            let parents: Vec<RowTarget> = target
                .column
                .scope_relations()
                .iter()
                .filter_map(|relation| {
                    let (table, primary_key) = relation.lockable_parent()?;
                    let key = scope.get(relation.foreign_key_column())?;
                    (!key.is_null()).then(|| RowTarget::Parent {
                        table: table.to_string(),
                        primary_key: primary_key.to_string(),
                        key: key.clone(),
                    })
                })
                .collect();
            if parents.is_empty() {
                rows.push(RowTarget::Scope(scope.clone()));
            } else {
                rows.extend(parents);
            }
        }
        rows.sort();
        rows.dedup();
        rows
    }

    fn statement(&self, target: &LockTarget<'_>, row: &RowTarget) -> Sql {
        let mut sql = Sql::default();
        match (self.kind, row) {
            (
                DbKind::Postgres,
                RowTarget::Parent {
                    table,
                    primary_key,
                    key,
                },
            ) => {
                sql.push("SELECT 1 AS locked FROM ")
                    .push_ident(table)
                    .push(" WHERE ")
                    .push_eq(primary_key, key)
                    .push(" FOR UPDATE");
            }
            (DbKind::Postgres, RowTarget::Scope(scope)) => {
                sql.push("SELECT 1 AS locked FROM ")
                    .push_ident(target.table)
                    .push(" WHERE ")
                    .push_scope(scope)
                    .push(" FOR UPDATE");
            }
            (
                DbKind::Sqlite,
                RowTarget::Parent {
                    table,
                    primary_key,
                    key,
                },
            ) => {
                sql.push("UPDATE ")
                    .push_ident(table)
                    .push(" SET ")
                    .push_ident(primary_key)
                    .push(" = ")
                    .push_ident(primary_key)
                    .push(" WHERE ")
                    .push_eq(primary_key, key);
            }
            (DbKind::Sqlite, RowTarget::Scope(scope)) => {
                let column = target.column.column();
                sql.push("UPDATE ")
                    .push_ident(target.table)
                    .push(" SET ")
                    .push_ident(column)
                    .push(" = ")
                    .push_ident(column)
                    .push(" WHERE ")
                    .push_scope(scope);
            }
        }
        sql
    }
}

#[async_trait]
impl ScopeLock for RowLock {
    fn strategy(&self) -> LockStrategy {
        LockStrategy::Row
    }

    async fn acquire(
        &self,
        conn: &mut AnyConnection,
        target: &LockTarget<'_>,
    ) -> Result<Option<LockGuard>> {
        for row in Self::plan(target) {
            tracing::trace!(table = target.table, lock = ?row, "Taking row lock");
            self.statement(target, &row)
                .execute(&mut *conn, "Failed to take row lock")
                .await?;
        }
        Ok(None)
    }
}
