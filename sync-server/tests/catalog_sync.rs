//! Full reconciliation passes against a scripted gateway.

mod common;

use common::{category_json, harness, harness_with, item_json};
use serde_json::json;
use shared::models::EntityStatus;
use sync_server::{JobOutcome, OrphanPolicy};

#[tokio::test]
async fn test_creates_category_tree() {
    let h = harness().await;
    h.gateway.stub(
        "catalog/list",
        json!([
            category_json(1, 0, "Root"),
            category_json(2, 1, "Child"),
        ]),
    );
    h.stub_no_products();

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let repo = h.ctx.categories();
    let all = repo.find_all().await.unwrap();
    assert_eq!(all.len(), 2);

    let root = repo.find_by_external_id(1).await.unwrap().unwrap();
    let child = repo.find_by_external_id(2).await.unwrap().unwrap();
    assert_eq!(root.parent_id, None);
    assert_eq!(child.parent_id, Some(root.id));
    assert_eq!(child.status, EntityStatus::Work);
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let h = harness().await;
    let categories = json!([category_json(1, 0, "Root")]);
    h.gateway.stub("catalog/list", categories);
    h.gateway.stub("item/count", json!({"count": 2}));
    h.gateway.stub(
        "item/list",
        json!([
            item_json(10, 1, "Bolt", "1.00"),
            item_json(11, 1, "Nut", "2.00"),
        ]),
    );

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let category_id = h
        .ctx
        .categories()
        .find_by_external_id(1)
        .await
        .unwrap()
        .unwrap()
        .id;
    let product_id = h
        .ctx
        .products()
        .find_by_external_id(10)
        .await
        .unwrap()
        .unwrap()
        .id;

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    // Same local identifiers, no duplicate rows
    let categories = h.ctx.categories().find_all().await.unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].id, category_id);
    assert_eq!(categories[0].status, EntityStatus::Work);

    let products = h
        .ctx
        .products()
        .find_by_status(EntityStatus::Work)
        .await
        .unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(
        h.ctx
            .products()
            .find_by_external_id(10)
            .await
            .unwrap()
            .unwrap()
            .id,
        product_id
    );
}

#[tokio::test]
async fn test_pagination_requests_every_page_once() {
    let h = harness().await;
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": "250"}));

    for page in 0..3i64 {
        let size = if page == 2 { 50 } else { 100 };
        let items: Vec<_> = (0..size)
            .map(|i| {
                let id = 1000 + page * 100 + i;
                item_json(id, 1, &format!("Item {id}"), "1.00")
            })
            .collect();
        h.gateway.push("item/list", json!(items));
    }

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let calls = h.gateway.calls_to("item/list");
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].param("offset"), Some("0"));
    assert_eq!(calls[1].param("offset"), Some("100"));
    assert_eq!(calls[2].param("offset"), Some("200"));
    assert_eq!(calls[0].param("limit"), Some("100"));

    let products = h
        .ctx
        .products()
        .find_by_status(EntityStatus::Work)
        .await
        .unwrap();
    assert_eq!(products.len(), 250);
}

#[tokio::test]
async fn test_empty_page_does_not_end_pagination() {
    let h = harness().await;
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": 250}));

    let first: Vec<_> = (0..100)
        .map(|i| item_json(1000 + i, 1, &format!("Item {i}"), "1.00"))
        .collect();
    let third: Vec<_> = (0..50)
        .map(|i| item_json(3000 + i, 1, &format!("Late {i}"), "1.00"))
        .collect();
    h.gateway.push("item/list", json!(first));
    // Transport hiccup: empty body decoded to an empty list
    h.gateway.push("item/list", json!([]));
    h.gateway.push("item/list", json!(third));

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    // The loop's `page * size <= count` condition still governs
    assert_eq!(h.gateway.calls_to("item/list").len(), 3);
    let products = h
        .ctx
        .products()
        .find_by_status(EntityStatus::Work)
        .await
        .unwrap();
    assert_eq!(products.len(), 150);
}

#[tokio::test]
async fn test_sweep_cascades_to_descendants_and_products() {
    let h = harness().await;
    h.gateway.stub(
        "catalog/list",
        json!([
            category_json(1, 0, "Root"),
            category_json(2, 1, "Child"),
            category_json(3, 2, "Grandchild"),
        ]),
    );
    h.gateway.stub("item/count", json!({"count": 1}));
    h.gateway
        .stub("item/list", json!([item_json(10, 3, "Bolt", "1.00")]));
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    // Child vanishes from the next snapshot: its subtree and the product go
    h.gateway.stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": 0}));
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let categories = h.ctx.categories();
    assert_eq!(
        categories.find_by_external_id(1).await.unwrap().unwrap().status,
        EntityStatus::Work
    );
    assert_eq!(
        categories.find_by_external_id(2).await.unwrap().unwrap().status,
        EntityStatus::Delete
    );
    assert_eq!(
        categories.find_by_external_id(3).await.unwrap().unwrap().status,
        EntityStatus::Delete
    );
    assert_eq!(
        h.ctx
            .products()
            .find_by_external_id(10)
            .await
            .unwrap()
            .unwrap()
            .status,
        EntityStatus::Delete
    );
}

#[tokio::test]
async fn test_address_collision_skips_and_sweeps() {
    let h = harness().await;
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": 2}));
    h.gateway.stub(
        "item/list",
        json!([
            item_json(10, 1, "Alpha", "1.00"),
            item_json(11, 1, "Beta", "1.00"),
        ]),
    );
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    // Alpha's address now collides with Beta's: the upsert is rejected, Alpha
    // is never marked seen and the sweep soft-deletes it.
    let mut colliding = item_json(10, 1, "Alpha", "1.00");
    colliding["link"] = json!("beta");
    h.gateway.stub(
        "item/list",
        json!([colliding, item_json(11, 1, "Beta", "1.00")]),
    );
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let products = h.ctx.products();
    let alpha = products.find_by_external_id(10).await.unwrap().unwrap();
    let beta = products.find_by_external_id(11).await.unwrap().unwrap();
    assert_eq!(alpha.status, EntityStatus::Delete);
    assert_eq!(alpha.address, "alpha"); // un-upserted, old address kept
    assert_eq!(beta.status, EntityStatus::Work);
}

#[tokio::test]
async fn test_title_collision_updates_existing_row() {
    let h = harness().await;
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Tools")]));
    h.stub_no_products();
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let original = h
        .ctx
        .categories()
        .find_by_external_id(1)
        .await
        .unwrap()
        .unwrap();

    // The ERP re-keys the same category: the incoming record collides on
    // title and falls back to updating the existing row.
    h.gateway
        .stub("catalog/list", json!([category_json(9, 0, "Tools")]));
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let all = h.ctx.categories().find_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, original.id);
    assert_eq!(all[0].external_id, 9);
    assert_eq!(all[0].status, EntityStatus::Work);
}

#[tokio::test]
async fn test_orphan_attach_to_root() {
    let h = harness().await;
    h.gateway.stub(
        "catalog/list",
        json!([category_json(1, 0, "Root"), category_json(5, 99, "Lost")]),
    );
    h.stub_no_products();

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let lost = h
        .ctx
        .categories()
        .find_by_external_id(5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lost.parent_id, None);
    assert_eq!(lost.status, EntityStatus::Work);
}

#[tokio::test]
async fn test_orphan_mark_invalid() {
    let h = harness_with(|config| config.orphan_policy = OrphanPolicy::MarkInvalid).await;
    h.gateway.stub(
        "catalog/list",
        json!([category_json(1, 0, "Root"), category_json(5, 99, "Lost")]),
    );
    h.stub_no_products();

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let lost = h
        .ctx
        .categories()
        .find_by_external_id(5)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lost.status, EntityStatus::Delete);
}

#[tokio::test]
async fn test_orphan_reject_pass() {
    let h = harness_with(|config| config.orphan_policy = OrphanPolicy::RejectPass).await;
    h.gateway.stub(
        "catalog/list",
        json!([category_json(1, 0, "Root"), category_json(5, 99, "Lost")]),
    );
    h.stub_no_products();

    assert_eq!(h.run_sync().await, JobOutcome::Failed);
}

#[tokio::test]
async fn test_product_with_unresolved_category_is_skipped_not_deleted() {
    let h = harness().await;
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": 2}));
    h.gateway.stub(
        "item/list",
        json!([
            item_json(10, 1, "Bolt", "1.00"),
            item_json(11, 42, "Stray", "1.00"),
        ]),
    );

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let products = h.ctx.products();
    assert!(products.find_by_external_id(10).await.unwrap().is_some());
    // Excluded from the pass, not created at all
    assert!(products.find_by_external_id(11).await.unwrap().is_none());
}

#[tokio::test]
async fn test_generated_addresses_follow_the_tree() {
    let h = harness_with(|config| config.generate_addresses = true).await;
    h.gateway.stub(
        "catalog/list",
        json!([category_json(1, 0, "Root"), category_json(2, 1, "Child")]),
    );
    h.gateway.stub("item/count", json!({"count": 1}));
    h.gateway
        .stub("item/list", json!([item_json(10, 2, "Big Bolt", "1.00")]));

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let child = h
        .ctx
        .categories()
        .find_by_external_id(2)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(child.address, "root/child");

    let product = h
        .ctx
        .products()
        .find_by_external_id(10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.address, "root/child/big-bolt");
}

#[tokio::test]
async fn test_index_fields_and_tag_attributes() {
    let h = harness().await;
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": 1}));
    let mut item = item_json(10, 1, "Bolt", "1.00");
    item["ind1"] = json!("steel");
    item["ind5"] = json!("new;featured");
    h.gateway.stub("item/list", json!([item]));

    assert_eq!(h.run_sync().await, JobOutcome::Done);
    // Second run must not duplicate any attribute
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let attributes = h.ctx.attributes().find_all().await.unwrap();
    let slots: Vec<_> = attributes
        .iter()
        .filter(|a| a.group == "erp")
        .collect();
    let tags: Vec<_> = attributes
        .iter()
        .filter(|a| a.group == "erp-tags")
        .collect();
    assert_eq!(slots.len(), 4);
    assert_eq!(tags.len(), 2);

    let product = h
        .ctx
        .products()
        .find_by_external_id(10)
        .await
        .unwrap()
        .unwrap();
    let values = h.ctx.products().attribute_values(product.id).await.unwrap();
    // ind1 slot value plus two boolean tags
    assert_eq!(values.len(), 3);
    assert!(values.values().any(|v| v == "steel"));
    assert_eq!(values.values().filter(|v| v.as_str() == "true").count(), 2);
}

#[tokio::test]
async fn test_relations_merged_per_product() {
    let h = harness().await;
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": 3}));
    h.gateway.stub(
        "item/list",
        json!([
            item_json(10, 1, "Bolt", "1.00"),
            item_json(11, 1, "Nut", "1.00"),
            item_json(12, 1, "Washer", "1.00"),
        ]),
    );
    h.gateway.push(
        "item/related",
        json!([
            {"idTovar1": "10", "idTovar2": "11", "kolvo": "2"},
            {"idTovar1": "10", "idTovar2": "12", "kolvo": "4"},
            {"idTovar1": "11", "idTovar2": "10"},
            {"idTovar1": "10", "idTovar2": "99", "kolvo": "1"}
        ]),
    );

    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let products = h.ctx.products();
    let bolt = products.find_by_external_id(10).await.unwrap().unwrap();
    let nut = products.find_by_external_id(11).await.unwrap().unwrap();
    let washer = products.find_by_external_id(12).await.unwrap().unwrap();

    let bolt_relations = products.relations(bolt.id).await.unwrap();
    assert_eq!(bolt_relations.len(), 2); // unresolved 99 dropped
    assert_eq!(bolt_relations.get(&nut.id), Some(&2.0));
    assert_eq!(bolt_relations.get(&washer.id), Some(&4.0));

    let nut_relations = products.relations(nut.id).await.unwrap();
    assert_eq!(nut_relations.get(&bolt.id), Some(&1.0)); // default quantity
}

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_100() {
    let h = harness().await;
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": 150}));
    for page in 0..2i64 {
        let size = if page == 1 { 50 } else { 100 };
        let items: Vec<_> = (0..size)
            .map(|i| item_json(1000 + page * 100 + i, 1, &format!("P{page}-{i}"), "1.00"))
            .collect();
        h.gateway.push("item/list", json!(items));
    }

    let mut handle = h.start_sync();
    let mut progress = handle.watch_progress();
    let samples = tokio::spawn(async move {
        let mut seen = vec![*progress.borrow()];
        while progress.changed().await.is_ok() {
            seen.push(*progress.borrow());
        }
        seen
    });

    assert_eq!(handle.wait().await, JobOutcome::Done);
    drop(handle);
    drop(h);
    let samples = samples.await.unwrap();

    assert!(samples.windows(2).all(|w| w[0] <= w[1]), "{samples:?}");
    assert_eq!(*samples.last().unwrap(), 100);
}

#[tokio::test]
async fn test_empty_category_feed_sweeps_everything() {
    let h = harness().await;
    h.gateway.stub(
        "catalog/list",
        json!([category_json(1, 0, "Root"), category_json(2, 1, "Child")]),
    );
    h.stub_no_products();
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    // Gateway failure: catalog/list collapses to an empty list — every
    // previously live category is unseen and swept.
    h.gateway.stub("catalog/list", json!([]));
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let work = h
        .ctx
        .categories()
        .find_by_status(EntityStatus::Work)
        .await
        .unwrap();
    assert!(work.is_empty());
}
