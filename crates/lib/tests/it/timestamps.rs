//! Modification timestamps on shifted rows.

use std::sync::Arc;

use positioning::{FixedClock, PositionDirective, Record};

use crate::helpers::*;

async fn clocked() -> (Items, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(1_000));
    let store = test_store().await.with_clock(clock.clone());
    (Items::on(store, item_schema(), true).await, clock)
}

async fn stamps(items: &Items, list_id: i64) -> Vec<(String, i64)> {
    items
        .in_scope(&list(list_id))
        .await
        .iter()
        .map(|r| {
            (
                text(r, "name"),
                r.get("updated_at").as_int().expect("missing timestamp"),
            )
        })
        .collect()
}

fn expected(pairs: &[(&str, i64)]) -> Vec<(String, i64)> {
    pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
}

#[tokio::test]
async fn test_shifted_rows_are_stamped() {
    let (items, clock) = clocked().await;
    items.add_all(1, &["a", "b", "c"]).await;
    assert_eq!(
        stamps(&items, 1).await,
        expected(&[("a", 1_000), ("b", 1_000), ("c", 1_000)])
    );

    clock.set(5_000);
    items.add_at(1, "d", 2).await;
    assert_eq!(
        stamps(&items, 1).await,
        expected(&[("a", 1_000), ("d", 5_000), ("b", 5_000), ("c", 5_000)])
    );

    clock.set(9_000);
    let b = items.in_scope(&list(1)).await[2].clone();
    items.remove(&b).await;
    assert_eq!(
        stamps(&items, 1).await,
        expected(&[("a", 1_000), ("d", 5_000), ("c", 9_000)])
    );
}

#[tokio::test]
async fn test_rows_outside_the_range_keep_their_stamp() {
    let (items, clock) = clocked().await;
    let records = items.add_all(1, &["a", "b", "c", "d"]).await;
    items.add(2, "x").await;

    clock.advance(500);
    let mut c = records[2].clone();
    c.set_position("position", 2);
    items.save(&mut c).await.unwrap();

    assert_eq!(
        stamps(&items, 1).await,
        expected(&[("a", 1_000), ("c", 1_500), ("b", 1_500), ("d", 1_000)])
    );
    assert_eq!(stamps(&items, 2).await, expected(&[("x", 1_000)]));
}

#[tokio::test]
async fn test_explicit_timestamps_are_kept() {
    let (items, clock) = clocked().await;
    clock.set(2_000);
    let record = items
        .try_add(
            Record::new()
                .with("list_id", 1)
                .with("name", "imported")
                .with("updated_at", 42)
                .with_position("position", PositionDirective::First),
        )
        .await
        .unwrap();
    assert_eq!(items.reload(&record).await.get("updated_at").as_int(), Some(42));
}
