//! Create, update and destroy within a single scope.

use std::time::Duration;

use positioning::lock::LockStrategy;
use positioning::{PositionDirective, Record};

use crate::helpers::*;

#[tokio::test]
async fn test_inserts_append_by_default() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;

    items.assert_order(1, &["a", "b", "c"]).await;
    assert_eq!(records[2].position("position"), Some(3));
}

#[tokio::test]
async fn test_scopes_are_independent() {
    let items = Items::new().await;
    items.add_all(1, &["a", "b"]).await;
    items.add_all(2, &["x"]).await;
    items.add(1, "c").await;

    items.assert_order(1, &["a", "b", "c"]).await;
    items.assert_order(2, &["x"]).await;
}

#[tokio::test]
async fn test_insert_first_and_absolute() {
    let items = Items::new().await;
    items.add_all(1, &["a", "b", "c"]).await;

    items.add_at(1, "d", PositionDirective::First).await;
    items.assert_order(1, &["d", "a", "b", "c"]).await;

    items.add_at(1, "e", 3).await;
    items.assert_order(1, &["d", "a", "e", "b", "c"]).await;

    items.add_at(1, "f", PositionDirective::Last).await;
    items.assert_order(1, &["d", "a", "e", "b", "c", "f"]).await;
}

#[tokio::test]
async fn test_out_of_range_positions_are_clamped() {
    let items = Items::new().await;
    items.add_all(1, &["a", "b"]).await;

    let high = items.add_at(1, "high", 99).await;
    assert_eq!(high.position("position"), Some(3));
    let low = items.add_at(1, "low", -4).await;
    assert_eq!(low.position("position"), Some(1));
    let zero = items.add_at(1, "zero", 0).await;
    assert_eq!(zero.position("position"), Some(1));
    items
        .assert_order(1, &["zero", "low", "a", "b", "high"])
        .await;

    // A member can go no further than the last slot.
    let mut a = items.reload(&items.in_scope(&list(1)).await[2]).await;
    a.set_position("position", 1000);
    items.save(&mut a).await.unwrap();
    assert_eq!(a.position("position"), Some(5));
    items
        .assert_order(1, &["zero", "low", "b", "high", "a"])
        .await;
}

#[tokio::test]
async fn test_first_insert_into_empty_scope() {
    let items = Items::new().await;
    let only = items.add_at(3, "only", 42).await;
    assert_eq!(only.position("position"), Some(1));
    items.assert_order(3, &["only"]).await;
}

#[tokio::test]
async fn test_move_within_scope() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c", "d", "e"]).await;

    let mut b = records[1].clone();
    b.set_position("position", 4);
    items.save(&mut b).await.unwrap();
    items.assert_order(1, &["a", "c", "d", "b", "e"]).await;

    let mut d = items.reload(&records[3]).await;
    assert_eq!(d.position("position"), Some(3));
    d.set_position("position", PositionDirective::First);
    items.save(&mut d).await.unwrap();
    items.assert_order(1, &["d", "a", "c", "b", "e"]).await;

    let mut a = items.reload(&records[0]).await;
    a.set_position("position", PositionDirective::Last);
    items.save(&mut a).await.unwrap();
    items.assert_order(1, &["d", "c", "b", "e", "a"]).await;
}

#[tokio::test]
async fn test_assigning_the_attribute_moves_the_row() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;

    let mut c = records[2].clone();
    c.set("position", 1);
    items.save(&mut c).await.unwrap();
    items.assert_order(1, &["c", "a", "b"]).await;

    let mut c = items.reload(&c).await;
    c.set("position", "last");
    items.save(&mut c).await.unwrap();
    items.assert_order(1, &["a", "b", "c"]).await;
}

#[tokio::test]
async fn test_moving_to_the_same_position() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;

    let mut b = records[1].clone();
    b.set_position("position", 2);
    items.save(&mut b).await.unwrap();
    items.assert_order(1, &["a", "b", "c"]).await;
}

#[tokio::test]
async fn test_decoded_directives() {
    let items = Items::new().await;
    items.add_all(1, &["a", "b", "c"]).await;

    let first: PositionDirective = "first".parse().unwrap();
    items.add_at(1, "d", first).await;
    let second: PositionDirective = "\"2\"".parse().unwrap();
    items.add_at(1, "e", second).await;
    let blank: PositionDirective = "".parse().unwrap();
    items.add_at(1, "f", blank).await;

    items.assert_order(1, &["d", "e", "a", "b", "c", "f"]).await;
}

#[tokio::test]
async fn test_invalid_directive_leaves_scope_untouched() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;
    let shifts = items.engine().shift_count();

    let mut b = records[1].clone();
    b.set("position", "sideways");
    let err = items.save(&mut b).await.unwrap_err();
    assert!(err.is_invalid_position());
    assert!(err.is_caller_error());

    let err = items
        .try_add(
            Record::new()
                .with("list_id", 1)
                .with("name", "d")
                .with("position", "upwards"),
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid_position());

    assert_eq!(items.engine().shift_count(), shifts);
    items.assert_order(1, &["a", "b", "c"]).await;
}

#[tokio::test]
async fn test_destroy_closes_the_gap() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c", "d"]).await;

    items.remove(&records[1]).await;
    items.assert_order(1, &["a", "c", "d"]).await;

    items.remove(&items.reload(&records[3]).await).await;
    items.assert_order(1, &["a", "c"]).await;

    items.remove(&items.reload(&records[0]).await).await;
    items.assert_order(1, &["c"]).await;
}

#[tokio::test]
async fn test_unrelated_updates_do_not_shift() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;
    let shifts = items.engine().shift_count();

    let mut b = records[1].clone();
    b.set("name", "bee");
    items.save(&mut b).await.unwrap();

    assert_eq!(items.engine().shift_count(), shifts);
    items.assert_order(1, &["a", "bee", "c"]).await;
}

#[tokio::test]
async fn test_rollback_discards_shifts() {
    let items = Items::new().await;
    items.add_all(1, &["a", "b", "c"]).await;

    let mut tx = items.store.begin().await.unwrap();
    let mut d = Record::new()
        .with("list_id", 1)
        .with("name", "d")
        .with_position("position", PositionDirective::First);
    items.table.insert(&mut tx, &mut d).await.unwrap();
    tx.rollback().await.unwrap();

    items.assert_order(1, &["a", "b", "c"]).await;
}

#[tokio::test]
async fn test_missing_rows_and_unknown_columns() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b"]).await;
    items.remove(&records[0]).await;

    let mut gone = records[0].clone();
    gone.set_position("position", 2);
    let err = items.save(&mut gone).await.unwrap_err();
    assert!(err.is_not_found());

    let err = items.engine().heal("rank", None).await.unwrap_err();
    assert!(matches!(
        err,
        positioning::Error::Position(positioning::PositionError::UnknownColumn { .. })
    ));
    items.assert_order(1, &["b"]).await;
}

#[tokio::test]
async fn test_lock_strategy_per_column() {
    let items = Items::new().await;
    assert_eq!(
        items.engine().lock_strategy("position").unwrap(),
        positioning::lock::LockStrategy::Advisory
    );
    assert!(items.engine().lock_strategy("rank").is_err());
}

#[tokio::test]
async fn test_several_changes_in_one_transaction() {
    let items = Items::on(
        test_store().await,
        item_schema_locked(LockStrategy::Advisory),
        true,
    )
    .await;
    items.add(1, "a").await;

    let mut tx = items.store.begin().await.unwrap();
    let changes = async {
        let mut b = Record::new()
            .with("list_id", 1)
            .with("name", "b")
            .with_position("position", PositionDirective::First);
        items.table.insert(&mut tx, &mut b).await?;
        let mut c = Record::new().with("list_id", 1).with("name", "c");
        items.table.insert(&mut tx, &mut c).await?;
        b.set_position("position", PositionDirective::Last);
        items.table.update(&mut tx, &mut b).await?;
        positioning::Result::Ok(())
    };
    tokio::time::timeout(Duration::from_secs(10), changes)
        .await
        .expect("transaction waited on its own lock")
        .unwrap();
    // The lock is taken once per transaction, however many rows change.
    assert!(tx.held_locks() <= 1);
    tx.commit().await.unwrap();

    items.assert_order(1, &["a", "c", "b"]).await;
    items.assert_dense("position").await;
}
