use std::sync::Arc;

use positioning::config::{BelongsTo, Positioned, TableSchema};
use positioning::lock::LockStrategy;
use positioning::{
    DbKind, Key, PositionDirective, Positioning, Record, Scope, Store, Table, Value,
};

// ==========================
// CORE TEST FACTORIES
// ==========================
// These are the foundation for all test setup. They provide a single point of change
// for backend matrix testing via TEST_BACKEND env var.

/// Creates a test store based on TEST_BACKEND env var.
///
/// Supported values:
/// - "sqlite" or unset: SQLite in-memory store (default)
/// - "postgres": PostgreSQL in a fresh schema (requires TEST_POSTGRES_URL)
///
/// # Example
/// ```bash
/// # Run tests with SQLite
/// cargo test
///
/// # Run tests with PostgreSQL
/// TEST_BACKEND=postgres TEST_POSTGRES_URL="postgres://localhost/positioning_test" cargo test
/// ```
pub async fn test_store() -> Store {
    match std::env::var("TEST_BACKEND").as_deref() {
        Ok("postgres") => {
            #[cfg(feature = "postgres")]
            {
                let url = std::env::var("TEST_POSTGRES_URL")
                    .unwrap_or_else(|_| "postgres://localhost/positioning_test".to_string());
                Store::connect_postgres_isolated(&url)
                    .await
                    .expect("Failed to connect to PostgreSQL")
            }
            #[cfg(not(feature = "postgres"))]
            {
                panic!("TEST_BACKEND=postgres requires the 'postgres' feature to be enabled")
            }
        }
        Ok("sqlite") | Ok("") | Err(_) => {
            #[cfg(feature = "sqlite")]
            {
                Store::sqlite_in_memory()
                    .await
                    .expect("Failed to create SQLite store")
            }
            #[cfg(not(feature = "sqlite"))]
            {
                panic!("TEST_BACKEND=sqlite requires the 'sqlite' feature to be enabled")
            }
        }
        Ok(other) => panic!("Unknown TEST_BACKEND value: {other}. Supported: sqlite, postgres"),
    }
}

/// Auto-incrementing primary key column definition for the store's dialect.
pub fn serial_key(store: &Store) -> &'static str {
    match store.kind() {
        DbKind::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        DbKind::Postgres => "BIGSERIAL PRIMARY KEY",
    }
}

pub async fn run(store: &Store, statement: &str) {
    store
        .execute(statement)
        .await
        .unwrap_or_else(|e| panic!("Failed to run `{statement}`: {e}"));
}

/// `lists` with three rows, ids 1 to 3.
pub async fn create_lists(store: &Store) {
    run(
        store,
        &format!("CREATE TABLE lists (id {}, name TEXT)", serial_key(store)),
    )
    .await;
    run(
        store,
        "INSERT INTO lists (name) VALUES ('groceries'), ('chores'), ('errands')",
    )
    .await;
}

/// `items`, optionally with a unique index over `(list_id, position)`.
pub async fn create_items(store: &Store, unique: bool) {
    run(
        store,
        &format!(
            "CREATE TABLE items (id {}, list_id BIGINT, name TEXT, position BIGINT, updated_at BIGINT)",
            serial_key(store)
        ),
    )
    .await;
    if unique {
        run(
            store,
            "CREATE UNIQUE INDEX items_list_position ON items (list_id, position)",
        )
        .await;
    }
}

// ==========================
// SCHEMAS
// ==========================

pub fn item_schema() -> TableSchema {
    item_schema_locked(LockStrategy::default())
}

pub fn item_schema_locked(lock: LockStrategy) -> TableSchema {
    TableSchema::builder("Item", "items")
        .belongs_to(BelongsTo::new("list").parent_table("lists"))
        .timestamps("updated_at")
        .positioned(Positioned::on(["list"]).lock(lock))
        .expect("Failed to declare position")
        .build()
        .expect("Failed to build item schema")
}

pub fn list(id: i64) -> Scope {
    Scope::new(vec![("list_id".to_string(), Value::Int(id))])
}

pub fn text(record: &Record, column: &str) -> String {
    match record.get(column) {
        Value::Text(s) => s.clone(),
        other => panic!("`{column}` is not text: {other:?}"),
    }
}

// ==========================
// ITEMS FIXTURE
// ==========================

/// A store with `lists` and `items` tables and a positioned `Item` type.
pub struct Items {
    pub store: Store,
    pub table: Table,
}

impl Items {
    /// Items with a unique `(list_id, position)` index on the test store.
    pub async fn new() -> Self {
        Self::on(test_store().await, item_schema(), true).await
    }

    /// Items without the unique index, so scopes can be corrupted.
    pub async fn loose() -> Self {
        Self::on(test_store().await, item_schema(), false).await
    }

    pub async fn on(store: Store, schema: TableSchema, unique: bool) -> Self {
        create_lists(&store).await;
        create_items(&store, unique).await;
        Self::attach(store, schema)
    }

    /// Build the fixture over tables that already exist.
    pub fn attach(store: Store, schema: TableSchema) -> Self {
        let engine = Positioning::new(&store, Arc::new(schema));
        Self {
            table: Table::new(Arc::new(engine)),
            store,
        }
    }

    pub fn engine(&self) -> &Positioning {
        self.table.engine()
    }

    /// Append an item to the end of `list`.
    pub async fn add(&self, list: i64, name: &str) -> Record {
        self.try_add(Record::new().with("list_id", list).with("name", name))
            .await
            .expect("Failed to insert item")
    }

    pub async fn add_at(
        &self,
        list: i64,
        name: &str,
        directive: impl Into<PositionDirective>,
    ) -> Record {
        self.try_add(
            Record::new()
                .with("list_id", list)
                .with("name", name)
                .with_position("position", directive),
        )
        .await
        .expect("Failed to insert item")
    }

    /// Several items appended to `list` in order.
    pub async fn add_all(&self, list: i64, names: &[&str]) -> Vec<Record> {
        let mut records = Vec::with_capacity(names.len());
        for name in names {
            records.push(self.add(list, name).await);
        }
        records
    }

    pub async fn try_add(&self, mut record: Record) -> positioning::Result<Record> {
        let mut tx = self.store.begin().await?;
        match self.table.insert(&mut tx, &mut record).await {
            Ok(_) => {
                tx.commit().await?;
                Ok(record)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Save a record's changes in their own transaction.
    pub async fn save(&self, record: &mut Record) -> positioning::Result<()> {
        let mut tx = self.store.begin().await?;
        match self.table.update(&mut tx, record).await {
            Ok(()) => tx.commit().await,
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    pub async fn remove(&self, record: &Record) {
        let mut tx = self.store.begin().await.expect("Failed to begin");
        self.table
            .destroy(&mut tx, record)
            .await
            .expect("Failed to destroy item");
        tx.commit().await.expect("Failed to commit");
    }

    /// The stored version of `record`.
    pub async fn reload(&self, record: &Record) -> Record {
        let key = record.key().expect("record has no key");
        self.find(key).await
    }

    pub async fn find(&self, key: &Key) -> Record {
        let mut tx = self.store.begin().await.expect("Failed to begin");
        let found = self
            .table
            .find(&mut tx, key)
            .await
            .expect("Failed to find item")
            .expect("item not found");
        tx.commit().await.expect("Failed to commit");
        found
    }

    pub async fn in_scope(&self, scope: &Scope) -> Vec<Record> {
        let mut tx = self.store.begin().await.expect("Failed to begin");
        let records = self
            .table
            .in_order(&mut tx, "position", scope)
            .await
            .expect("Failed to list items");
        tx.commit().await.expect("Failed to commit");
        records
    }

    /// Item names of `list` in position order.
    pub async fn names(&self, list_id: i64) -> Vec<String> {
        self.in_scope(&list(list_id))
            .await
            .iter()
            .map(|r| text(r, "name"))
            .collect()
    }

    /// Stored positions of `list` in ascending order.
    pub async fn positions(&self, list_id: i64) -> Vec<i64> {
        self.in_scope(&list(list_id))
            .await
            .iter()
            .map(|r| r.position("position").expect("position is not an integer"))
            .collect()
    }

    /// Assert that `list` holds exactly `names`, at positions `1..=N`.
    pub async fn assert_order(&self, list_id: i64, names: &[&str]) {
        assert_eq!(self.names(list_id).await, names, "order of list {list_id}");
        let expected: Vec<i64> = (1..=names.len() as i64).collect();
        assert_eq!(
            self.positions(list_id).await,
            expected,
            "positions of list {list_id}"
        );
    }

    /// Assert every scope of `column` is dense.
    pub async fn assert_dense(&self, column: &str) {
        for report in self.engine().check(column).await.expect("Failed to check") {
            assert!(report.is_dense(), "scope not dense: {report:?}");
        }
    }
}
