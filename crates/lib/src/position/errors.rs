//! Position resolution errors.

use thiserror::Error;

use crate::value::Key;

/// Errors raised while resolving or applying a position.
///
/// All of these are raised before any row other than the acting one has been
/// shifted, so abandoning the enclosing transaction is always sufficient.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PositionError {
    /// The directive could not be decoded into an integer, `first`, `last`,
    /// `before` or `after`.
    #[error(
        "invalid position `{input}`: must be an integer, first, last, before: <key>, after: <key>, or empty"
    )]
    InvalidPosition {
        /// Rendering of the rejected input
        input: String,
    },

    /// A relative directive referenced a row outside the destination scope.
    #[error("relative `{column}` reference {reference} must be in the same scope")]
    InvalidScope {
        /// The tracked column being resolved
        column: String,
        /// The referenced primary key
        reference: Key,
    },

    /// The column is not tracked by this type.
    #[error("`{column}` is not a positioned column of {table}")]
    UnknownColumn { table: String, column: String },

    /// A persisted row was required but the record has no primary key.
    #[error("{table} record has no primary key")]
    MissingKey { table: String },

    /// A key does not have one value per primary-key column.
    #[error("key {key} does not match the {expected}-column primary key of {table}")]
    MalformedKey {
        table: String,
        key: Key,
        expected: usize,
    },
}

impl PositionError {
    pub(crate) fn invalid(input: impl std::fmt::Display) -> Self {
        PositionError::InvalidPosition {
            input: input.to_string(),
        }
    }

    /// Check if this error is a caller error (bad directive or reference).
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PositionError::InvalidPosition { .. }
                | PositionError::InvalidScope { .. }
                | PositionError::MalformedKey { .. }
        )
    }

    pub fn is_invalid_position(&self) -> bool {
        matches!(self, PositionError::InvalidPosition { .. })
    }

    pub fn is_invalid_scope(&self) -> bool {
        matches!(self, PositionError::InvalidScope { .. })
    }
}

impl From<PositionError> for crate::Error {
    fn from(err: PositionError) -> Self {
        crate::Error::Position(err)
    }
}
