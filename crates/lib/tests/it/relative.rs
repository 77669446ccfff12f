//! Relative directives and neighbour lookups.

use positioning::{Key, PositionDirective, Record};
use serde_json::json;

use crate::helpers::*;

fn key(record: &Record) -> Key {
    record.key().cloned().expect("record has no key")
}

#[tokio::test]
async fn test_move_before_and_after() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c", "d"]).await;

    let mut d = records[3].clone();
    d.set_position("position", PositionDirective::before(key(&records[1])));
    items.save(&mut d).await.unwrap();
    items.assert_order(1, &["a", "d", "b", "c"]).await;

    let mut a = items.reload(&records[0]).await;
    a.set_position("position", PositionDirective::after(key(&records[2])));
    items.save(&mut a).await.unwrap();
    items.assert_order(1, &["d", "b", "c", "a"]).await;

    let mut c = items.reload(&records[2]).await;
    c.set_position("position", PositionDirective::after(key(&records[3])));
    items.save(&mut c).await.unwrap();
    items.assert_order(1, &["d", "c", "b", "a"]).await;
}

#[tokio::test]
async fn test_empty_references() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;

    // After nothing is the start of the scope.
    let mut b = records[1].clone();
    b.set_position("position", PositionDirective::After(None));
    items.save(&mut b).await.unwrap();
    items.assert_order(1, &["b", "a", "c"]).await;

    // Before nothing is the end.
    let mut b = items.reload(&b).await;
    b.set_position("position", PositionDirective::Before(None));
    items.save(&mut b).await.unwrap();
    items.assert_order(1, &["a", "c", "b"]).await;
}

#[tokio::test]
async fn test_insert_relative() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;

    items
        .add_at(1, "d", PositionDirective::before(key(&records[1])))
        .await;
    items.assert_order(1, &["a", "d", "b", "c"]).await;

    items
        .add_at(1, "e", PositionDirective::after(key(&records[2])))
        .await;
    items.assert_order(1, &["a", "d", "b", "c", "e"]).await;

    items
        .add_at(1, "f", PositionDirective::before(key(&records[0])))
        .await;
    items.assert_order(1, &["f", "a", "d", "b", "c", "e"]).await;
}

#[tokio::test]
async fn test_json_directives() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;
    let id = records[1].key().unwrap().values()[0].as_int().unwrap();

    let before: PositionDirective = json!({"before": id}).try_into().unwrap();
    items.add_at(1, "d", before).await;
    // Ids arriving as strings still match integer keys.
    let after: PositionDirective = json!({"after": id.to_string()}).try_into().unwrap();
    items.add_at(1, "e", after).await;
    let encoded: PositionDirective = format!("{{\"after\": {id}}}").parse().unwrap();
    items.add_at(1, "f", encoded).await;

    items.assert_order(1, &["a", "d", "b", "f", "e", "c"]).await;
}

#[tokio::test]
async fn test_reference_outside_the_scope() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b"]).await;
    let other = items.add(2, "x").await;
    let shifts = items.engine().shift_count();

    let mut a = records[0].clone();
    a.set_position("position", PositionDirective::before(key(&other)));
    let err = items.save(&mut a).await.unwrap_err();
    assert!(err.is_invalid_scope());
    assert!(err.is_caller_error());

    let err = items
        .try_add(
            Record::new()
                .with("list_id", 1)
                .with("name", "c")
                .with_position("position", PositionDirective::after(9999)),
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid_scope());

    assert_eq!(items.engine().shift_count(), shifts);
    items.assert_order(1, &["a", "b"]).await;
    items.assert_order(2, &["x"]).await;
}

#[tokio::test]
async fn test_prior_and_subsequent() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;
    let mut tx = items.store.begin().await.unwrap();

    let b = &records[1];
    assert_eq!(
        items.engine().prior(&mut tx, b, "position").await.unwrap(),
        Some(key(&records[0]))
    );
    assert_eq!(
        items.engine().subsequent(&mut tx, b, "position").await.unwrap(),
        Some(key(&records[2]))
    );
    assert_eq!(
        items
            .engine()
            .prior(&mut tx, &records[0], "position")
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        items
            .engine()
            .subsequent(&mut tx, &records[2], "position")
            .await
            .unwrap(),
        None
    );
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_after_prior_keeps_the_order() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c", "d"]).await;
    let shifts = items.engine().shift_count();

    for record in &records {
        let mut current = items.reload(record).await;
        let mut tx = items.store.begin().await.unwrap();
        let prior = items
            .engine()
            .prior(&mut tx, &current, "position")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        current.set_position("position", PositionDirective::After(prior));
        items.save(&mut current).await.unwrap();
        items.assert_order(1, &["a", "b", "c", "d"]).await;
    }
    assert_eq!(items.engine().shift_count(), shifts + records.len() as u64);
}
