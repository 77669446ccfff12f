//! Store error types.
//!
//! Structured errors for the SQL layer, wrapping sqlx failures with the
//! context of the statement that failed.

use thiserror::Error;

use crate::value::Key;

/// Errors that can occur while talking to the relational store.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// A sqlx operation failed.
    #[error("SQL error: {reason}")]
    SqlxError {
        /// Description of what was being attempted, including the driver message
        reason: String,
        /// The underlying sqlx error, when there is one
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A row the engine expected to exist was not found.
    #[error("{table} row {key} not found")]
    RowNotFound {
        /// The table that was queried
        table: String,
        /// The primary key that was looked up
        key: Key,
    },

    /// A column held a value that has no [`Value`](crate::Value) representation.
    #[error("cannot decode column `{column}`: {reason}")]
    UndecodableColumn { column: String, reason: String },

    /// The connection URL names a database this build cannot talk to.
    #[error("unsupported database URL: {url}")]
    UnsupportedUrl { url: String },
}

impl StoreError {
    /// Check if this error indicates a row was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::RowNotFound { .. })
    }

    /// Check if this error came from the driver.
    pub fn is_sql_error(&self) -> bool {
        matches!(self, StoreError::SqlxError { .. })
    }

    /// Check if the driver reported a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::SqlxError {
                source: Some(sqlx::Error::Database(db)),
                ..
            } => db.is_unique_violation(),
            _ => false,
        }
    }

    /// Check if this error is a configuration problem rather than a runtime failure.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, StoreError::UnsupportedUrl { .. })
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}
