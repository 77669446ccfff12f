//! Dependents destroyed with their parent, and registry-driven engines.

use std::sync::Arc;

use positioning::config::{BelongsTo, Positioned, Registry, TableSchema};
use positioning::{Positioning, Table};

use crate::helpers::*;

#[tokio::test]
async fn test_destroying_a_scope_skips_contraction() {
    let items = Items::new().await;
    items.add_all(1, &["a", "b", "c"]).await;
    items.add_all(2, &["x", "y"]).await;
    let shifts = items.engine().shift_count();

    let mut tx = items.store.begin().await.unwrap();
    let destroyed = items
        .table
        .destroy_dependents(&mut tx, "list_id", 1)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(destroyed, 3);
    assert_eq!(items.engine().shift_count(), shifts);
    items.assert_order(1, &[]).await;
    items.assert_order(2, &["x", "y"]).await;
}

#[tokio::test]
async fn test_other_associations_still_contract() {
    let items = Items::new().await;
    let records = items.add_all(1, &["a", "b", "c"]).await;

    // Destroyed as a dependent through a column that is not part of the scope.
    let mut b = records[1].clone();
    b.mark_destroyed_by("owner_id");
    items.remove(&b).await;

    items.assert_order(1, &["a", "c"]).await;
}

#[tokio::test]
async fn test_subtypes_share_the_root_schema() {
    let store = test_store().await;
    create_lists(&store).await;
    create_items(&store, true).await;

    let registry = Registry::builder()
        .register(item_schema())
        .unwrap()
        .register(
            TableSchema::builder("UrgentItem", "items")
                .subtype_of("Item")
                .build()
                .unwrap(),
        )
        .unwrap()
        .build()
        .unwrap();

    let item = registry.get("Item").unwrap();
    let urgent = registry.get("UrgentItem").unwrap();
    assert!(Arc::ptr_eq(item, urgent));
    assert!(registry.get("Ghost").unwrap_err().is_not_found());

    let plain = Items::attach(store.clone(), (**item).clone());
    plain.add_all(1, &["a", "b"]).await;

    // An engine built for the subtype writes into the same scope.
    let urgent_table = Table::new(Arc::new(Positioning::new(&store, urgent.clone())));
    let mut tx = store.begin().await.unwrap();
    let mut record = positioning::Record::new()
        .with("list_id", 1)
        .with("name", "now")
        .with_position("position", positioning::PositionDirective::First);
    urgent_table.insert(&mut tx, &mut record).await.unwrap();
    tx.commit().await.unwrap();

    plain.assert_order(1, &["now", "a", "b"]).await;
}

#[test]
fn test_declarations_on_subtypes_are_rejected() {
    let err = TableSchema::builder("UrgentItem", "items")
        .subtype_of("Item")
        .positioned(Positioned::on(["list"]))
        .unwrap_err();
    assert!(err.is_hierarchy_error());

    let err = TableSchema::builder("Item", "items")
        .belongs_to(BelongsTo::new("list"))
        .positioned(Positioned::on(["list"]))
        .unwrap()
        .positioned(Positioned::on(["category"]))
        .unwrap_err();
    assert!(err.is_duplicate());
}
