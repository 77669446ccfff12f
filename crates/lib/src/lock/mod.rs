//! Serialising concurrent writers to a scope.
//!
//! Every position change takes a lock before it reads anything, so two
//! transactions changing the same scope run one after the other and each
//! sees the other's committed result. Three strategies are available:
//!
//! - [`LockStrategy::Advisory`] (default): one named lock per table and
//!   column. PostgreSQL uses a transaction-scoped advisory lock; SQLite uses
//!   an exclusive lock on a file in the store's lock directory.
//! - [`LockStrategy::Row`]: row locks on the parent rows named by the scope,
//!   or on the scope's own rows when there is no lockable parent.
//! - [`LockStrategy::None`]: no locking; the host guarantees a single writer.
//!
//! The lock is always the first statement of the transaction. SQLite only
//! retries a busy database for a transaction that holds no locks yet, so a
//! transaction that read first and then tried to write would fail instead
//! of waiting.

mod advisory;
mod errors;
mod row;

pub use advisory::AdvisoryLock;
pub use errors::LockError;
pub use row::RowLock;

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::AnyConnection;

use crate::Result;
use crate::config::TrackedColumn;
use crate::scope::Scope;
use crate::store::Store;

/// How writers to a tracked column are serialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    #[default]
    Advisory,
    Row,
    None,
}

impl std::str::FromStr for LockStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "advisory" => Ok(LockStrategy::Advisory),
            "row" => Ok(LockStrategy::Row),
            "none" => Ok(LockStrategy::None),
            other => Err(format!(
                "unknown lock strategy `{other}` (expected advisory, row or none)"
            )),
        }
    }
}

/// What a lock has to cover.
#[derive(Debug)]
pub struct LockTarget<'a> {
    pub table: &'a str,
    pub column: &'a TrackedColumn,
    /// Scopes being changed, sorted and without duplicates.
    pub scopes: Vec<Scope>,
}

impl<'a> LockTarget<'a> {
    pub fn new(table: &'a str, column: &'a TrackedColumn, mut scopes: Vec<Scope>) -> Self {
        scopes.sort();
        scopes.dedup();
        Self {
            table,
            column,
            scopes,
        }
    }
}

/// A lock that lives outside the database transaction.
///
/// Held by the [`Transaction`](crate::store::Transaction) until it commits or
/// rolls back. Dropping a guard releases the lock as well.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    #[cfg(feature = "sqlite")]
    file: std::fs::File,
}

impl LockGuard {
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub(crate) fn release(self) {
        #[cfg(feature = "sqlite")]
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            // Closing the file below releases the lock regardless.
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to unlock lock file");
        }
        tracing::trace!(path = %self.path.display(), "Released lock file");
    }
}

/// A way of serialising writers to the scopes of one tracked column.
#[async_trait]
pub trait ScopeLock: Send + Sync + Debug {
    fn strategy(&self) -> LockStrategy;

    /// The lock file this lock is held through, when it lives outside the
    /// database. A transaction already holding it does not take it again.
    fn guard_path(&self) -> Option<&std::path::Path> {
        None
    }

    /// Block until the current transaction is the only writer to `target`.
    ///
    /// Locks held by the database are released when the transaction ends.
    /// Locks held outside it are returned as a guard for the caller to attach
    /// to the transaction.
    async fn acquire(
        &self,
        conn: &mut AnyConnection,
        target: &LockTarget<'_>,
    ) -> Result<Option<LockGuard>>;
}

/// No locking at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock;

#[async_trait]
impl ScopeLock for NoLock {
    fn strategy(&self) -> LockStrategy {
        LockStrategy::None
    }

    async fn acquire(
        &self,
        _conn: &mut AnyConnection,
        _target: &LockTarget<'_>,
    ) -> Result<Option<LockGuard>> {
        Ok(None)
    }
}

/// The lock implementing `column`'s declared strategy on `store`.
pub fn for_column(store: &Store, table: &str, column: &TrackedColumn) -> Arc<dyn ScopeLock> {
    match column.lock() {
        LockStrategy::Advisory => Arc::new(AdvisoryLock::new(store, table, column.column())),
        LockStrategy::Row => Arc::new(RowLock::new(store.kind())),
        LockStrategy::None => Arc::new(NoLock),
    }
}
