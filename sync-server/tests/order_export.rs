//! Order export flows against a scripted gateway.

mod common;

use common::{category_json, harness, harness_with, item_json};
use serde_json::json;
use shared::models::{OrderCreate, OrderRouting, OrderType};
use std::collections::HashMap;
use sync_server::{
    EventListener, ExportStatus, JobOutcome, PricingPolicy, SendOrderJob, StockCheckPolicy,
};

/// Seed one category and two ERP-known products, return their local ids.
async fn seed_products(h: &common::TestHarness) -> (i64, i64) {
    h.gateway
        .stub("catalog/list", json!([category_json(1, 0, "Root")]));
    h.gateway.stub("item/count", json!({"count": 2}));
    h.gateway.stub(
        "item/list",
        json!([
            item_json(10, 1, "Bolt", "12.30"),
            {
                "idTovar": "11", "vStrukture": "1", "name": "Nut",
                "price": "2.00", "opt_price": "1.50", "link": "nut"
            },
        ]),
    );
    assert_eq!(h.run_sync().await, JobOutcome::Done);

    let products = h.ctx.products();
    let bolt = products.find_by_external_id(10).await.unwrap().unwrap();
    let nut = products.find_by_external_id(11).await.unwrap().unwrap();
    (bolt.id, nut.id)
}

async fn seed_order(h: &common::TestHarness, items: HashMap<i64, f64>, user_id: Option<i64>) -> i64 {
    let order = h
        .ctx
        .orders()
        .create(OrderCreate {
            items,
            client: "Ivan".to_string(),
            address: "Some street 1".to_string(),
            phone: "+700000000".to_string(),
            email: "ivan@example.com".to_string(),
            comment: "call first".to_string(),
            shipping_at: None,
            user_id,
        })
        .await
        .unwrap();
    order.id
}

#[tokio::test]
async fn test_already_exported_order_is_cancelled_without_calls() {
    let h = harness().await;
    let (bolt, _) = seed_products(&h).await;
    let order_id = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;

    assert!(h.ctx.orders().set_external_id(order_id, "777").await.unwrap());
    let calls_before = h.gateway.calls().len();

    let job = SendOrderJob::new(h.ctx.clone(), order_id, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Cancelled);

    // Zero gateway calls for the short-circuited export
    assert_eq!(h.gateway.calls().len(), calls_before);
    assert_eq!(
        h.ctx
            .orders()
            .find_by_id(order_id)
            .await
            .unwrap()
            .unwrap()
            .external_id
            .as_deref(),
        Some("777")
    );
}

#[tokio::test]
async fn test_successful_export_records_number_once() {
    let h = harness().await;
    let (bolt, nut) = seed_products(&h).await;
    let order_id = seed_order(&h, HashMap::from([(bolt, 2.0), (nut, 1.0)]), None).await;

    h.gateway
        .stub("order/cart/anonym", json!([{"nomerZakaza": "554"}]));

    let job = SendOrderJob::new(h.ctx.clone(), order_id, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Done);

    let order = h.ctx.orders().find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.external_id.as_deref(), Some("554"));

    let calls = h.gateway.calls_to("order/cart/anonym");
    assert_eq!(calls.len(), 1);
    let lines: Vec<serde_json::Value> =
        serde_json::from_str(calls[0].param("tovarJson").unwrap()).unwrap();
    assert_eq!(lines.len(), 2);
    let bolt_line = lines.iter().find(|l| l["id"] == 10).unwrap();
    // Retail 12.30 × 2
    assert_eq!(bolt_line["price"], 24.6);
    assert_eq!(calls[0].param("nalich"), Some("1"));
    assert_eq!(calls[0].param("nameKontakt"), Some("Ivan"));

    // A second attempt is a no-op
    let again = SendOrderJob::new(h.ctx.clone(), order_id, OrderRouting::default());
    assert_eq!(again.execute().await.unwrap(), ExportStatus::Cancelled);
    assert_eq!(h.gateway.calls_to("order/cart/anonym").len(), 1);
}

#[tokio::test]
async fn test_confirmation_notifier_fires_on_success() {
    use shared::models::Order;
    use std::sync::{Arc, Mutex};
    use sync_server::Notifier;

    #[derive(Default)]
    struct RecordingNotifier {
        confirmed: Mutex<Vec<(i64, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn order_confirmed(&self, order: &Order) {
            self.confirmed.lock().unwrap().push((
                order.id,
                order.external_id.clone().unwrap_or_default(),
            ));
        }

        fn payment_received(&self, _order: &Order) {}
    }

    let h = harness().await;
    let (bolt, _) = seed_products(&h).await;
    let order_id = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;
    h.gateway
        .stub("order/cart/anonym", json!([{"nomerZakaza": "808"}]));

    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = h.ctx.clone().with_notifier(notifier.clone());
    let job = SendOrderJob::new(ctx, order_id, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Done);

    let confirmed = notifier.confirmed.lock().unwrap();
    assert_eq!(confirmed.as_slice(), &[(order_id, "808".to_string())]);
}

#[tokio::test]
async fn test_rejection_sentinel_stores_diagnostic() {
    let h = harness().await;
    let (bolt, _) = seed_products(&h).await;
    let order_id = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;

    h.gateway
        .stub("order/cart/anonym", json!({"nomerZakaza": "-1", "err": "no stock"}));

    let job = SendOrderJob::new(h.ctx.clone(), order_id, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Failed);

    let order = h.ctx.orders().find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.external_id, None);
    let system = order.system.expect("diagnostic stored");
    assert_eq!(system["nomerZakaza"], "-1");
}

#[tokio::test]
async fn test_ambiguous_response_reports_diagnostics() {
    let h = harness().await;
    let (bolt, _) = seed_products(&h).await;
    let order_id = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;

    h.gateway
        .stub("order/cart/anonym", json!({"status": "queued"}));

    let job = SendOrderJob::new(h.ctx.clone(), order_id, OrderRouting::default());
    // The remote accepted the call but did not confirm order creation
    assert_eq!(job.execute().await.unwrap(), ExportStatus::DoneWithDiagnostics);

    let order = h.ctx.orders().find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.external_id, None);
    assert_eq!(order.system.unwrap()["status"], "queued");
}

#[tokio::test]
async fn test_empty_response_fails_without_diagnostics() {
    let h = harness().await;
    let (bolt, _) = seed_products(&h).await;
    let order_id = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;

    // No stub: the gateway collapses to an empty list
    let job = SendOrderJob::new(h.ctx.clone(), order_id, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Failed);

    let order = h.ctx.orders().find_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.external_id, None);
    assert_eq!(order.system, None);
}

#[tokio::test]
async fn test_wholesale_pricing_applies_to_registered_users_only() {
    let h = harness_with(|config| config.pricing_policy = PricingPolicy::Wholesale).await;
    let (_, nut) = seed_products(&h).await;
    h.gateway
        .stub("order/cart/anonym", json!([{"nomerZakaza": "1"}]));

    // Registered user: wholesale 1.50
    let registered = seed_order(&h, HashMap::from([(nut, 2.0)]), Some(42)).await;
    let job = SendOrderJob::new(h.ctx.clone(), registered, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Done);

    // Anonymous: retail 2.00 even under the wholesale policy
    let anonymous = seed_order(&h, HashMap::from([(nut, 2.0)]), None).await;
    let job = SendOrderJob::new(h.ctx.clone(), anonymous, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Done);

    let calls = h.gateway.calls_to("order/cart/anonym");
    assert_eq!(calls.len(), 2);
    let first: Vec<serde_json::Value> =
        serde_json::from_str(calls[0].param("tovarJson").unwrap()).unwrap();
    let second: Vec<serde_json::Value> =
        serde_json::from_str(calls[1].param("tovarJson").unwrap()).unwrap();
    assert_eq!(first[0]["price"], 3.0);
    assert_eq!(second[0]["price"], 4.0);
}

#[tokio::test]
async fn test_stock_check_flag_follows_policy() {
    let h = harness_with(|config| {
        config.stock_check_policy = StockCheckPolicy::RegisteredOnly;
    })
    .await;
    let (bolt, _) = seed_products(&h).await;
    h.gateway
        .stub("order/cart/anonym", json!([{"nomerZakaza": "1"}]));

    let anonymous = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;
    let job = SendOrderJob::new(h.ctx.clone(), anonymous, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Done);

    let calls = h.gateway.calls_to("order/cart/anonym");
    assert_eq!(calls[0].param("nalich"), Some("0"));
}

#[tokio::test]
async fn test_endpoint_selection_by_order_type() {
    let h = harness().await;
    let (bolt, _) = seed_products(&h).await;
    h.gateway
        .stub("order/cart/rezervTel", json!([{"nomerZakaza": "2"}]));
    h.gateway
        .stub("custom/addRezervTovarTblKontaktSite", json!([{"nomerZakaza": "3"}]));
    h.gateway.stub("order/cart/kpTel", json!([{"nomerZakaza": "4"}]));

    let reservation = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;
    let routing = OrderRouting {
        order_type: OrderType::Reservation,
        ..Default::default()
    };
    assert_eq!(
        SendOrderJob::new(h.ctx.clone(), reservation, routing)
            .execute()
            .await
            .unwrap(),
        ExportStatus::Done
    );
    assert_eq!(h.gateway.calls_to("order/cart/rezervTel").len(), 1);

    let document = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;
    let routing = OrderRouting {
        order_type: OrderType::Reservation,
        document_number: "D-9".to_string(),
        document_line: "1".to_string(),
        contact_id: "K-5".to_string(),
        ..Default::default()
    };
    assert_eq!(
        SendOrderJob::new(h.ctx.clone(), document, routing)
            .execute()
            .await
            .unwrap(),
        ExportStatus::Done
    );
    let custom = h.gateway.calls_to("custom/addRezervTovarTblKontaktSite");
    assert_eq!(custom.len(), 1);
    assert_eq!(custom[0].param("nomDoc"), Some("D-9"));
    assert_eq!(custom[0].param("idKontakt"), Some("K-5"));

    let quote = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;
    let routing = OrderRouting {
        order_type: OrderType::Quote,
        ..Default::default()
    };
    assert_eq!(
        SendOrderJob::new(h.ctx.clone(), quote, routing)
            .execute()
            .await
            .unwrap(),
        ExportStatus::Done
    );
    assert_eq!(h.gateway.calls_to("order/cart/kpTel").len(), 1);
}

#[tokio::test]
async fn test_products_without_external_id_are_excluded() {
    let h = harness().await;
    let (bolt, _) = seed_products(&h).await;

    // A locally created product the ERP has never seen
    let local_only = 123456789i64;
    let order_id = seed_order(
        &h,
        HashMap::from([(bolt, 1.0), (local_only, 5.0)]),
        None,
    )
    .await;
    h.gateway
        .stub("order/cart/anonym", json!([{"nomerZakaza": "5"}]));

    let job = SendOrderJob::new(h.ctx.clone(), order_id, OrderRouting::default());
    assert_eq!(job.execute().await.unwrap(), ExportStatus::Done);

    let calls = h.gateway.calls_to("order/cart/anonym");
    let lines: Vec<serde_json::Value> =
        serde_json::from_str(calls[0].param("tovarJson").unwrap()).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], 10);
}

#[tokio::test]
async fn test_order_created_event_triggers_export() {
    let h = harness().await;
    let (bolt, _) = seed_products(&h).await;
    let order_id = seed_order(&h, HashMap::from([(bolt, 1.0)]), None).await;
    h.gateway
        .stub("order/cart/anonym", json!([{"nomerZakaza": "901"}]));

    let shutdown = h.queue.shutdown_token();
    let listener = EventListener::new(h.ctx.clone(), h.queue.clone(), shutdown.clone());
    tokio::spawn(listener.run());
    // Give the listener a beat to subscribe before publishing
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    h.ctx.bus.publish(sync_server::EngineEvent::OrderCreated {
        order_id,
        routing: OrderRouting::default(),
    });

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        let order = h.ctx.orders().find_by_id(order_id).await.unwrap().unwrap();
        if order.external_id.as_deref() == Some("901") {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "export never happened"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    shutdown.cancel();
}
