//! Named per-column locks.

use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::AnyConnection;

use super::{LockGuard, LockStrategy, LockTarget, ScopeLock};
#[cfg(feature = "sqlite")]
use super::LockError;
use crate::Result;
use crate::store::sql::Sql;
use crate::store::{DbKind, Store};

/// One lock per (database, table, column).
///
/// The lock name is the SHA-256 of `"{identity}.{table}.{column}"`. On
/// PostgreSQL its low 63 bits key a transaction-scoped advisory lock; on
/// SQLite it names a lock file.
#[derive(Debug, Clone)]
pub struct AdvisoryLock {
    kind: DbKind,
    name: String,
    key: i64,
    path: PathBuf,
}

impl AdvisoryLock {
    pub fn new(store: &Store, table: &str, column: &str) -> Self {
        let digest = Sha256::digest(format!("{}.{table}.{column}", store.identity()).as_bytes());
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest[digest.len() - 8..]);
        let key = i64::from_be_bytes(low) & i64::MAX;
        let name = hex::encode(digest);
        let path = store.lock_dir().join(format!("positioning-{name}.lock"));
        Self {
            kind: store.kind(),
            name,
            key,
            path,
        }
    }

    /// Hex lock name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-negative PostgreSQL advisory lock key.
    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    #[cfg(feature = "sqlite")]
    async fn lock_file(&self) -> Result<LockGuard> {
        let path = self.path.clone();
        let task_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&task_path)?;
            fs2::FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(|e| LockError::Task {
            path: path.clone(),
            reason: e.to_string(),
        })?
        .map_err(|source| LockError::LockFile {
            path: path.clone(),
            source,
        })?;
        Ok(LockGuard { path, file })
    }
}

#[async_trait]
impl ScopeLock for AdvisoryLock {
    fn strategy(&self) -> LockStrategy {
        LockStrategy::Advisory
    }

    fn guard_path(&self) -> Option<&std::path::Path> {
        match self.kind {
            DbKind::Sqlite => Some(&self.path),
            DbKind::Postgres => None,
        }
    }

    async fn acquire(
        &self,
        conn: &mut AnyConnection,
        target: &LockTarget<'_>,
    ) -> Result<Option<LockGuard>> {
        tracing::trace!(
            table = target.table,
            column = target.column.column(),
            lock = %self.name,
            "Waiting for advisory lock"
        );
        match self.kind {
            DbKind::Postgres => {
                // Selecting the void result directly is not decodable through Any.
                let mut sql = Sql::new("SELECT 1 AS locked FROM pg_advisory_xact_lock(");
                sql.push_bind(self.key).push(")");
                sql.execute(conn, "Failed to take advisory lock").await?;
                Ok(None)
            }
            #[cfg(feature = "sqlite")]
            DbKind::Sqlite => self.lock_file().await.map(Some),
            #[cfg(not(feature = "sqlite"))]
            DbKind::Sqlite => Err(super::LockError::Unsupported {
                strategy: LockStrategy::Advisory,
                kind: DbKind::Sqlite,
            }
            .into()),
        }
    }
}
