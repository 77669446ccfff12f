//! Connection handling for the relational store.
//!
//! The engine talks to SQLite and PostgreSQL through sqlx's `AnyPool`, so a
//! single code path serves both. Statements use `$n` placeholders, which both
//! drivers accept.
//!
//! ## Available Databases
//!
//! - **SQLite** (feature: `sqlite`): embedded database, file or in-memory
//! - **PostgreSQL** (feature: `postgres`): server database, optionally in an
//!   isolated schema for tests
//!
//! Table creation is the host's concern; [`Store::execute`] is provided for
//! migrations and test fixtures.

mod errors;
pub(crate) mod sql;
mod transaction;

pub use errors::StoreError;
pub use transaction::Transaction;

use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(feature = "postgres")]
use std::time::Duration;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
use sqlx::Executor;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::Result;
use crate::clock::{Clock, SystemClock};

/// Extension trait for sqlx Result types to simplify error handling.
///
/// Similar to `anyhow::Context`, this trait adds a method to convert
/// sqlx errors to `StoreError::SqlxError` with a context message.
pub(crate) trait SqlxResultExt<T> {
    /// Convert sqlx error to StoreError with context message.
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            StoreError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// Database kind for SQL dialect selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// SQLite database
    Sqlite,
    /// PostgreSQL database
    Postgres,
}

impl std::fmt::Display for DbKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbKind::Sqlite => write!(f, "sqlite"),
            DbKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// A pool of connections to one database.
///
/// `Store` is cheap to clone; clones share the pool and the clock.
///
/// # Identity
///
/// Every store carries an identity string naming the database it is
/// connected to (the canonical file path for SQLite, `database.schema` for
/// PostgreSQL). Advisory lock names are derived from it, so two processes
/// positioning the same table in the same database contend for the same lock.
#[derive(Clone)]
pub struct Store {
    pool: AnyPool,
    kind: DbKind,
    identity: String,
    clock: Arc<dyn Clock>,
    lock_dir: PathBuf,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .field("lock_dir", &self.lock_dir)
            .finish_non_exhaustive()
    }
}

impl Store {
    fn new(pool: AnyPool, kind: DbKind, identity: String) -> Self {
        Self {
            pool,
            kind,
            identity,
            clock: Arc::new(SystemClock),
            lock_dir: std::env::temp_dir(),
        }
    }

    /// Connect to the database named by `url`, dispatching on its scheme.
    ///
    /// `sqlite:` URLs go to [`connect_sqlite`](Self::connect_sqlite) and
    /// `postgres://` / `postgresql://` URLs to
    /// [`connect_postgres`](Self::connect_postgres).
    pub async fn connect(url: &str) -> Result<Self> {
        #[cfg(feature = "sqlite")]
        if url.starts_with("sqlite:") {
            return Self::connect_sqlite(url).await;
        }
        #[cfg(feature = "postgres")]
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Self::connect_postgres(url).await;
        }
        Err(StoreError::UnsupportedUrl {
            url: url.to_string(),
        }
        .into())
    }

    /// Replace the clock used to stamp modification timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Directory holding SQLite advisory lock files (default: the system temp dir).
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Get the database kind.
    pub fn kind(&self) -> DbKind {
        self.kind
    }

    /// Check if this store is using SQLite.
    pub fn is_sqlite(&self) -> bool {
        self.kind == DbKind::Sqlite
    }

    /// Check if this store is using PostgreSQL.
    pub fn is_postgres(&self) -> bool {
        self.kind == DbKind::Postgres
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Begin a transaction. The transaction's timestamp is read from the clock now.
    pub async fn begin(&self) -> Result<Transaction> {
        let inner = self
            .pool
            .begin()
            .await
            .sql_context("Failed to begin transaction")?;
        Ok(Transaction::new(inner, self.kind, self.clock.now_millis()))
    }

    /// Run one statement outside any transaction, returning the affected row count.
    pub async fn execute(&self, statement: &str) -> Result<u64> {
        let result = sqlx::query(statement)
            .execute(&self.pool)
            .await
            .sql_context("Failed to execute statement")?;
        Ok(result.rows_affected())
    }

    /// Close every connection in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// SQLite-specific implementations
#[cfg(feature = "sqlite")]
impl Store {
    /// Open a SQLite database at the given path, creating the file if needed.
    pub async fn open_sqlite<P: AsRef<Path>>(path: P) -> Result<Self> {
        // mode=rwc: read-write-create (create file if it doesn't exist)
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        let mut store = Self::connect_sqlite(&url).await?;
        if let Ok(canonical) = std::fs::canonicalize(path.as_ref()) {
            store.identity = canonical.display().to_string();
        }
        Ok(store)
    }

    /// Connect to a SQLite database using a connection URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite:./my.db")
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let is_in_memory = url.contains("mode=memory") || url.contains(":memory:");

        // Every connection needs its own busy handler; a pragma run once on the
        // pool only reaches whichever connection served it.
        let mut options = AnyPoolOptions::new()
            .max_connections(5)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("PRAGMA busy_timeout = 5000;").await?;
                    Ok(())
                })
            });

        // When the last connection to a shared in-memory database closes, the
        // database is destroyed.
        if is_in_memory {
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect(url)
            .await
            .sql_context("Failed to connect to SQLite")?;

        if !is_in_memory {
            // - journal_mode=WAL: readers do not block the single writer
            // - synchronous=NORMAL: safe with WAL
            sqlx::query("PRAGMA journal_mode = WAL;")
                .execute(&pool)
                .await
                .sql_context("Failed to configure SQLite")?;
            sqlx::query("PRAGMA synchronous = NORMAL;")
                .execute(&pool)
                .await
                .sql_context("Failed to configure SQLite")?;
        }

        let identity = sqlite_identity(url);
        tracing::debug!(identity = %identity, in_memory = is_in_memory, "Connected to SQLite");
        Ok(Self::new(pool, DbKind::Sqlite, identity))
    }

    /// Create an in-memory SQLite database.
    ///
    /// The database exists only for the lifetime of this store. Useful for testing.
    pub async fn sqlite_in_memory() -> Result<Self> {
        // Shared cache so all pooled connections see one database; a unique
        // name so separate stores do not.
        let unique_id = uuid::Uuid::new_v4();
        let url = format!("sqlite:file:mem_{unique_id}?mode=memory&cache=shared");
        Self::connect_sqlite(&url).await
    }
}

/// The database part of a SQLite URL: scheme and query string removed.
#[cfg(feature = "sqlite")]
fn sqlite_identity(url: &str) -> String {
    let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")).unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    path.strip_prefix("file:").unwrap_or(path).to_string()
}

// PostgreSQL-specific implementations
#[cfg(feature = "postgres")]
impl Store {
    /// Connect to a PostgreSQL database using a connection URL.
    ///
    /// This connects to the default (public) schema. For test isolation,
    /// use `connect_postgres_isolated()` instead.
    pub async fn connect_postgres(url: &str) -> Result<Self> {
        Self::connect_postgres_with_schema(url, None).await
    }

    /// Connect to a PostgreSQL database with a specific schema for isolation.
    async fn connect_postgres_with_schema(url: &str, schema_name: Option<String>) -> Result<Self> {
        sqlx::any::install_default_drivers();

        // Create the schema first, then point every pooled connection at it
        // with an after_connect hook; URL options are not honoured everywhere.
        if let Some(ref schema) = schema_name {
            let temp_pool = AnyPoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await
                .sql_context("Failed to connect to PostgreSQL")?;

            let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {schema}");
            sqlx::query(&create_schema)
                .execute(&temp_pool)
                .await
                .sql_context(&format!("Failed to create schema {schema}"))?;

            temp_pool.close().await;
        }

        let schema_for_hook = schema_name.clone();
        let mut pool_options = AnyPoolOptions::new();

        if schema_name.is_some() {
            // Tests run many isolated stores in parallel; wait for a connection
            // rather than exhausting the server's max_connections.
            pool_options = pool_options
                .max_connections(3)
                .acquire_timeout(Duration::from_secs(30));
        } else {
            pool_options = pool_options.max_connections(5);
        }

        let pool = pool_options
            .after_connect(move |conn, _meta| {
                let schema = schema_for_hook.clone();
                Box::pin(async move {
                    if let Some(ref s) = schema {
                        let set_path = format!("SET search_path TO {s}");
                        conn.execute(set_path.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;

        let identity: String = sqlx::query_scalar(
            "SELECT CAST(current_database() AS TEXT) || '.' || CAST(current_schema() AS TEXT)",
        )
        .fetch_one(&pool)
        .await
        .sql_context("Failed to read database identity")?;

        tracing::debug!(identity = %identity, "Connected to PostgreSQL");
        Ok(Self::new(pool, DbKind::Postgres, identity))
    }

    /// Connect to a PostgreSQL database with test isolation.
    ///
    /// Creates a unique schema for this store, so tests running in parallel
    /// do not see each other's tables.
    pub async fn connect_postgres_isolated(url: &str) -> Result<Self> {
        // PostgreSQL schema names must start with a letter and be lowercase
        let unique_id = uuid::Uuid::new_v4().simple().to_string();
        let schema_name = format!("test_{unique_id}");
        Self::connect_postgres_with_schema(url, Some(schema_name)).await
    }
}
