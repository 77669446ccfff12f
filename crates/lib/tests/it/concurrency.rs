//! Concurrent writers to one scope.
//!
//! SQLite runs on a file so that every pooled connection is a real,
//! independent connection; PostgreSQL uses the isolated test schema.

use positioning::lock::LockStrategy;
use positioning::{PositionDirective, Record, Store};
use tempfile::TempDir;

use crate::helpers::*;

const WRITERS: usize = 12;

/// A store shared by concurrent tasks. The temporary directory holds the
/// SQLite file and its lock files and must outlive the store.
async fn shared_store() -> (Store, Option<TempDir>) {
    if matches!(std::env::var("TEST_BACKEND").as_deref(), Ok("postgres")) {
        return (test_store().await, None);
    }
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = Store::open_sqlite(dir.path().join("concurrency.db"))
        .await
        .expect("Failed to open SQLite file")
        .with_lock_dir(dir.path());
    (store, Some(dir))
}

async fn fixture(lock: LockStrategy) -> (Items, Option<TempDir>) {
    let (store, dir) = shared_store().await;
    (Items::on(store, item_schema_locked(lock), true).await, dir)
}

async fn concurrent_inserts(lock: LockStrategy) {
    let (items, _dir) = fixture(lock).await;
    let table = items.table.clone();
    let store = items.store.clone();

    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let table = table.clone();
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let directive = match i % 3 {
                0 => PositionDirective::First,
                1 => PositionDirective::Last,
                _ => PositionDirective::Absolute(2),
            };
            let mut record = Record::new()
                .with("list_id", 1)
                .with("name", format!("item-{i}"))
                .with_position("position", directive);
            let mut tx = store.begin().await?;
            table.insert(&mut tx, &mut record).await?;
            tx.commit().await
        }));
    }
    for handle in handles {
        handle.await.expect("writer panicked").expect("writer failed");
    }

    let expected: Vec<i64> = (1..=WRITERS as i64).collect();
    assert_eq!(items.positions(1).await, expected);
    items.assert_dense("position").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_with_advisory_lock() {
    concurrent_inserts(LockStrategy::Advisory).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_with_row_lock() {
    concurrent_inserts(LockStrategy::Row).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_operations() {
    let (items, _dir) = fixture(LockStrategy::Advisory).await;
    let names: Vec<String> = (0..WRITERS).map(|i| format!("item-{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let records = items.add_all(1, &names).await;
    items.add_all(2, &["x", "y"]).await;

    let mut handles = Vec::new();
    // Each task owns one row, so its scope values stay current; positions
    // are always read from the store under the lock.
    for (i, mut current) in records.into_iter().enumerate() {
        let table = items.table.clone();
        let store = items.store.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = store.begin().await?;
            match i % 4 {
                0 => table.destroy(&mut tx, &current).await?,
                1 => {
                    current.set("list_id", 2);
                    table.update(&mut tx, &mut current).await?;
                }
                2 => {
                    current.set_position("position", PositionDirective::First);
                    table.update(&mut tx, &mut current).await?;
                }
                _ => {
                    current.set_position("position", PositionDirective::Last);
                    table.update(&mut tx, &mut current).await?;
                }
            }
            tx.commit().await
        }));
    }
    for handle in handles {
        handle.await.expect("writer panicked").expect("writer failed");
    }

    let destroyed = WRITERS.div_ceil(4);
    let moved = (WRITERS - 1).div_ceil(4);
    assert_eq!(items.positions(1).await.len(), WRITERS - destroyed - moved);
    assert_eq!(items.positions(2).await.len(), 2 + moved);
    items.assert_dense("position").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_moves_in_both_directions() {
    let (items, _dir) = fixture(LockStrategy::Row).await;
    let half = WRITERS / 2;
    let left: Vec<String> = (0..half).map(|i| format!("left-{i}")).collect();
    let right: Vec<String> = (0..half).map(|i| format!("right-{i}")).collect();
    let mut records = items
        .add_all(1, &left.iter().map(String::as_str).collect::<Vec<_>>())
        .await;
    records.extend(
        items
            .add_all(2, &right.iter().map(String::as_str).collect::<Vec<_>>())
            .await,
    );

    // Every transaction locks lists 1 and 2; half of them move 1 -> 2 and
    // half 2 -> 1, so unordered locking would deadlock.
    let mut handles = Vec::new();
    for mut current in records {
        let table = items.table.clone();
        let store = items.store.clone();
        handles.push(tokio::spawn(async move {
            let to = if current.get("list_id").as_int() == Some(1) { 2 } else { 1 };
            current.set("list_id", to);
            let mut tx = store.begin().await?;
            table.update(&mut tx, &mut current).await?;
            tx.commit().await
        }));
    }
    for handle in handles {
        handle.await.expect("writer panicked").expect("writer failed");
    }

    let expected: Vec<i64> = (1..=half as i64).collect();
    assert_eq!(items.positions(1).await, expected);
    assert_eq!(items.positions(2).await, expected);
    let mut moved = items.names(2).await;
    moved.sort();
    assert_eq!(moved, left);
    items.assert_dense("position").await;
}
