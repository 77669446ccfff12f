//!
//! Positioning: dense, gap-free ordering columns for rows grouped into scopes.
//!
//! A positioned column holds each row's place within its scope (all items of
//! a list, all nodes under a parent). The engine keeps the positions of every
//! scope exactly `1..N` through inserts, moves, scope changes and deletes,
//! with concurrent writers serialised by a per-scope lock.
//!
//! ## Core Concepts
//!
//! * **Schemas (`config::TableSchema`)**: per-type declarations of the table,
//!   primary key, belongs-to relations and tracked columns, collected into a
//!   read-only `config::Registry`.
//! * **Directives (`PositionDirective`)**: where a row should go: an integer,
//!   `first`, `last`, or before/after another row.
//! * **The engine (`Positioning`)**: lifecycle hooks the host calls inside the
//!   transaction that saves a row, plus bulk `reposition`, `heal` and `check`.
//! * **Locks (`lock::ScopeLock`)**: advisory, row-level or no locking.
//! * **Stores (`Store`)**: SQLite and PostgreSQL through sqlx.
//! * **Records (`Record`, `Table`)**: a dynamic row implementing
//!   `ScopedPositionable`, and a small persistence layer that drives the hooks.
//!
//! ```no_run
//! use std::sync::Arc;
//! use positioning::config::{BelongsTo, Positioned, TableSchema};
//! use positioning::{PositionDirective, Positioning, Record, Store, Table};
//!
//! # async fn run() -> positioning::Result<()> {
//! let store = Store::open_sqlite("todo.db").await?;
//! let schema = TableSchema::builder("Item", "items")
//!     .belongs_to(BelongsTo::new("list"))
//!     .positioned(Positioned::on(["list"]))?
//!     .build()?;
//! let items = Table::new(Arc::new(Positioning::new(&store, Arc::new(schema))));
//!
//! let mut tx = store.begin().await?;
//! let mut item = Record::new()
//!     .with("list_id", 1)
//!     .with_position("position", PositionDirective::First);
//! items.insert(&mut tx, &mut item).await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod lock;
pub mod position;
pub mod record;
pub mod scope;
pub mod store;
pub mod table;
pub mod value;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ConfigurationError;
pub use lock::LockError;
pub use position::{
    Direction, HealReport, OrderBy, PositionDirective, PositionError, Positioning,
    RepositionOrder, RepositionReport, ScopeReport,
};
pub use record::{Record, ScopedPositionable};
pub use scope::Scope;
pub use store::{DbKind, Store, StoreError, Transaction};
pub use table::Table;
pub use value::{Key, Value};

/// Result type used throughout the positioning library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the positioning library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured declaration errors from the config module
    #[error(transparent)]
    Config(config::ConfigurationError),

    /// Structured resolution errors from the position module
    #[error(transparent)]
    Position(position::PositionError),

    /// Structured database errors from the store module
    #[error(transparent)]
    Store(store::StoreError),

    /// Structured locking errors from the lock module
    #[error(transparent)]
    Lock(lock::LockError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Position(_) => "position",
            Error::Store(_) => "store",
            Error::Lock(_) => "lock",
        }
    }

    /// Check if this error indicates a row or type was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Config(config_err) => config_err.is_not_found(),
            Error::Store(store_err) => store_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error was caused by the caller's input (a bad
    /// directive, a reference outside the scope, a malformed key).
    pub fn is_caller_error(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_caller_error(),
            _ => false,
        }
    }

    /// Check if a position directive could not be decoded.
    pub fn is_invalid_position(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_invalid_position(),
            _ => false,
        }
    }

    /// Check if a relative directive referenced a row outside the scope.
    pub fn is_invalid_scope(&self) -> bool {
        match self {
            Error::Position(position_err) => position_err.is_invalid_scope(),
            _ => false,
        }
    }

    /// Check if this error comes from a bad declaration or connection setting.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::Store(store_err) => store_err.is_configuration_error(),
            Error::Lock(lock_err) => lock_err.is_unsupported(),
            _ => false,
        }
    }

    /// Check if this error is database-related.
    pub fn is_database_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    /// Check if this error came from acquiring a lock.
    pub fn is_lock_error(&self) -> bool {
        matches!(self, Error::Lock(_))
    }
}
