//! The transaction every position change runs inside.

use std::path::Path;

use sqlx::{Any, AnyConnection};

use super::{DbKind, SqlxResultExt};
use crate::Result;
use crate::lock::LockGuard;

/// A database transaction plus the locks taken inside it.
///
/// Advisory locks that live outside the database (SQLite lock files) are
/// attached to the transaction as [`LockGuard`]s and released once it
/// commits or rolls back. Dropping an unfinished transaction rolls it back
/// and releases its guards.
///
/// The transaction time is read from the store's clock when the transaction
/// begins; every modification timestamp written inside it uses that value.
#[derive(Debug)]
pub struct Transaction {
    inner: sqlx::Transaction<'static, Any>,
    guards: Vec<LockGuard>,
    kind: DbKind,
    now: i64,
}

impl Transaction {
    pub(crate) fn new(inner: sqlx::Transaction<'static, Any>, kind: DbKind, now: i64) -> Self {
        Self {
            inner,
            guards: Vec::new(),
            kind,
            now,
        }
    }

    /// The connection the transaction runs on, for host statements.
    pub fn conn(&mut self) -> &mut AnyConnection {
        &mut self.inner
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    /// Transaction time in milliseconds since the Unix epoch.
    pub fn now_millis(&self) -> i64 {
        self.now
    }

    /// Number of lock guards currently held.
    pub fn held_locks(&self) -> usize {
        self.guards.len()
    }

    /// Whether this transaction already holds the lock file at `path`.
    ///
    /// File locks are per open file, so taking the same lock twice from one
    /// transaction would wait on itself.
    pub fn holds(&self, path: &Path) -> bool {
        self.guards.iter().any(|guard| guard.path() == path)
    }

    pub(crate) fn hold(&mut self, guard: LockGuard) {
        self.guards.push(guard);
    }

    pub async fn commit(self) -> Result<()> {
        let Transaction { inner, guards, .. } = self;
        let result = inner.commit().await.sql_context("Failed to commit transaction");
        release(guards);
        result
    }

    pub async fn rollback(self) -> Result<()> {
        let Transaction { inner, guards, .. } = self;
        let result = inner
            .rollback()
            .await
            .sql_context("Failed to roll back transaction");
        release(guards);
        result
    }
}

fn release(guards: Vec<LockGuard>) {
    // Reverse acquisition order.
    for guard in guards.into_iter().rev() {
        guard.release();
    }
}
