//! Lock acquisition errors.

use std::path::PathBuf;

use thiserror::Error;

use super::LockStrategy;
use crate::store::DbKind;

/// Errors raised while serialising writers to a scope.
///
/// Database-side lock failures (deadlock detection, timeouts) are reported by
/// the driver and surface as [`StoreError`](crate::store::StoreError)s.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock file could not be opened or locked.
    #[error("failed to lock {path}: {source}")]
    LockFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking task waiting on a lock file did not complete.
    #[error("lock task for {path} failed: {reason}")]
    Task { path: PathBuf, reason: String },

    /// The strategy cannot be provided by this database in this build.
    #[error("{strategy:?} locking is not available for {kind}")]
    Unsupported { strategy: LockStrategy, kind: DbKind },
}

impl LockError {
    /// Check if this error came from the lock file itself.
    pub fn is_io_error(&self) -> bool {
        matches!(self, LockError::LockFile { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, LockError::Unsupported { .. })
    }
}

impl From<LockError> for crate::Error {
    fn from(err: LockError) -> Self {
        crate::Error::Lock(err)
    }
}
