//! Declaration errors.

use thiserror::Error;

/// Errors raised while declaring positioned types.
///
/// These surface at application startup; a type whose declaration fails is
/// never handed to the engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The same column was declared as positioned twice on one type.
    #[error("the column `{column}` of {type_name} has already been used by the scope {scope:?}")]
    DuplicateColumn {
        type_name: String,
        column: String,
        scope: Vec<String>,
    },

    /// Positioned columns may only be declared on the root of a type hierarchy.
    #[error("{type_name} is a subtype of {base}; declare positioned columns on {base}")]
    NotRootType { type_name: String, base: String },

    /// Tables must declare at least one primary key column.
    #[error("{type_name} has no primary key columns")]
    MissingPrimaryKey { type_name: String },

    /// A column or table name was empty.
    #[error("{type_name} declares an empty {what} name")]
    EmptyName {
        type_name: String,
        what: &'static str,
    },

    /// Two schemas were registered under the same type name.
    #[error("type {type_name} is already registered")]
    DuplicateType { type_name: String },

    /// A subtype names a base type that was never registered.
    #[error("{type_name} extends unknown type {base}")]
    UnknownBaseType { type_name: String, base: String },

    /// A lookup named a type that was never registered.
    #[error("unknown positioned type {type_name}")]
    UnknownType { type_name: String },
}

impl ConfigurationError {
    /// Check if this error is about a duplicate declaration.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            ConfigurationError::DuplicateColumn { .. } | ConfigurationError::DuplicateType { .. }
        )
    }

    /// Check if this error is about the type hierarchy.
    pub fn is_hierarchy_error(&self) -> bool {
        matches!(
            self,
            ConfigurationError::NotRootType { .. } | ConfigurationError::UnknownBaseType { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigurationError::UnknownType { .. })
    }
}

impl From<ConfigurationError> for crate::Error {
    fn from(err: ConfigurationError) -> Self {
        crate::Error::Config(err)
    }
}
