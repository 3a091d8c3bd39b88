//! Gateway-event reconciliation: idempotent ingestion, due-date floating, refund voiding and
//! ledger-derived balances.

use abg_common::Money;
use atelier_billing_engine::{
    db_types::{Gateway, NewBasketLine, OrderId, OrderLineStatusType, OrderStatusType, PaymentStatus},
    events::EventProducers,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed::{seed_catalog, SeededCatalog},
    },
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
    BasketApi,
    OrderFlowApi,
    SqliteDatabase,
};
use chrono::Duration;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

/// Seeds the catalog and checks out a two-line order for the given customer.
/// Line totals: 210.00 + 30.00, so the amount payable is 240.00.
async fn checkout_order(db: &SqliteDatabase, customer: &str) -> (SeededCatalog, atelier_billing_engine::db_types::Order) {
    let catalog = seed_catalog(db).await;
    let basket_api = BasketApi::new(db.clone());
    basket_api
        .add_or_update_line(customer, None, NewBasketLine {
            topic: "Main piece".to_string(),
            service_type_id: catalog.essay.id,
            turnaround_id: catalog.three_days.id,
            level_id: Some(catalog.graduate.id),
            tier_id: Some(catalog.premium.id),
            pages: 3,
            references: None,
            comment: None,
            quantity: 2,
        })
        .await
        .expect("Error adding line");
    basket_api
        .add_or_update_line(customer, None, NewBasketLine {
            topic: "Abstract".to_string(),
            service_type_id: catalog.essay.id,
            turnaround_id: catalog.three_days.id,
            level_id: None,
            tier_id: None,
            pages: 2,
            references: None,
            comment: None,
            quantity: 1,
        })
        .await
        .expect("Error adding line");
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let result = flow.checkout(customer).await.expect("Error checking out");
    (catalog, result.order)
}

#[tokio::test]
async fn payment_replay_is_idempotent() {
    let db = new_db().await;
    let (_, order) = checkout_order(&db, "alice").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let paid_at = order.created_at + Duration::hours(6);

    let first = flow
        .payment_succeeded(order.id, Money::whole(240), Some("TX-1".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error applying payment");
    assert!(!first.duplicate);
    assert!(first.newly_paid);

    let lines_after_first = db.fetch_order_lines(order.id).await.expect("Error fetching lines");

    // Redelivery of the same transaction reference: exactly one record, one due-date shift, no event.
    let replay = flow
        .payment_succeeded(order.id, Money::whole(240), Some("TX-1".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error applying replay");
    assert!(replay.duplicate);
    assert!(!replay.newly_paid);

    let records = flow.payments_for_order(order.id).await.expect("Error fetching payments");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatus::Completed);

    let lines_after_replay = db.fetch_order_lines(order.id).await.expect("Error fetching lines");
    for (a, b) in lines_after_first.iter().zip(lines_after_replay.iter()) {
        assert_eq!(a.due_date, b.due_date);
        assert_eq!(a.status, b.status);
    }
}

#[tokio::test]
async fn due_dates_float_until_the_payment_clock_starts() {
    let db = new_db().await;
    let (_, order) = checkout_order(&db, "bob").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let before = db.fetch_order_lines(order.id).await.expect("Error fetching lines");

    // The customer pays 6 hours after checkout.
    let paid_at = order.created_at + Duration::hours(6);
    flow.payment_succeeded(order.id, Money::whole(240), Some("TX-float".to_string()), paid_at, Gateway::Twocheckout)
        .await
        .expect("Error applying payment");

    let after = db.fetch_order_lines(order.id).await.expect("Error fetching lines");
    for (old, new) in before.iter().zip(after.iter()) {
        assert_eq!(new.due_date, old.due_date + Duration::hours(6));
        assert_eq!(new.status, OrderLineStatusType::InProgress);
    }
    let order = db.fetch_order(order.id).await.expect("Error fetching order").expect("Order missing");
    assert_eq!(order.status, OrderStatusType::Paid);

    // Once paid, the external representation shows the shifted due dates.
    let summary = flow.order_summary(order.id).await.expect("Error fetching summary").expect("Order missing");
    assert!(summary.lines.iter().all(|l| l.due_date.is_some()));
    assert_eq!(summary.earliest_due, after.iter().map(|l| l.due_date).min());
}

#[tokio::test]
async fn partial_payment_keeps_the_order_unpaid_and_only_shifts_once() {
    let db = new_db().await;
    let (_, order) = checkout_order(&db, "carol").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());

    let first_paid_at = order.created_at + Duration::hours(2);
    let partial = flow
        .payment_succeeded(order.id, Money::whole(100), Some("TX-a".to_string()), first_paid_at, Gateway::Paypal)
        .await
        .expect("Error applying partial payment");
    assert!(!partial.newly_paid);
    assert_eq!(flow.balance(order.id).await.expect("Error fetching balance"), Money::whole(140));
    let after_first = db.fetch_order_lines(order.id).await.expect("Error fetching lines");
    assert!(after_first.iter().all(|l| l.status == OrderLineStatusType::InProgress));

    // The second payment settles the order. Lines are already in progress, so no further shift.
    let second_paid_at = order.created_at + Duration::hours(20);
    let settling = flow
        .payment_succeeded(order.id, Money::whole(140), Some("TX-b".to_string()), second_paid_at, Gateway::Paypal)
        .await
        .expect("Error applying settling payment");
    assert!(settling.newly_paid);
    assert_eq!(flow.balance(order.id).await.expect("Error fetching balance"), Money::default());
    let after_second = db.fetch_order_lines(order.id).await.expect("Error fetching lines");
    for (a, b) in after_first.iter().zip(after_second.iter()) {
        assert_eq!(a.due_date, b.due_date);
    }
}

#[tokio::test]
async fn any_refund_voids_every_line() {
    let db = new_db().await;
    let (_, order) = checkout_order(&db, "dave").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let paid_at = order.created_at + Duration::hours(1);
    flow.payment_succeeded(order.id, Money::whole(100), Some("TX-pay".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error applying payment");

    // The refund covers only part of what was paid, yet the whole order is voided.
    flow.payment_refunded(order.id, Money::whole(40), Some("TX-refund".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error applying refund");

    let order_row = db.fetch_order(order.id).await.expect("Error fetching order").expect("Order missing");
    assert_eq!(order_row.status, OrderStatusType::Refunded);
    let lines = db.fetch_order_lines(order.id).await.expect("Error fetching lines");
    assert!(lines.iter().all(|l| l.status == OrderLineStatusType::Void));

    let summary = flow.order_summary(order.id).await.expect("Error fetching summary").expect("Order missing");
    assert!(summary.is_complete);
    assert_eq!(summary.total_paid, Money::whole(60));
}

#[tokio::test]
async fn declines_are_recorded_but_change_nothing() {
    let db = new_db().await;
    let (_, order) = checkout_order(&db, "erin").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let paid_at = order.created_at + Duration::minutes(30);

    flow.payment_declined(order.id, Money::whole(240), Some("TX-no".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error recording decline");

    let order_row = db.fetch_order(order.id).await.expect("Error fetching order").expect("Order missing");
    assert_eq!(order_row.status, OrderStatusType::Unpaid);
    let lines = db.fetch_order_lines(order.id).await.expect("Error fetching lines");
    assert!(lines.iter().all(|l| l.status == OrderLineStatusType::Pending));
    assert_eq!(flow.balance(order.id).await.expect("Error fetching balance"), Money::whole(240));
    let records = flow.payments_for_order(order.id).await.expect("Error fetching payments");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatus::Declined);
}

#[tokio::test]
async fn balance_plus_net_paid_equals_payable_through_an_event_sequence() {
    let db = new_db().await;
    let (_, order) = checkout_order(&db, "frank").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let payable = Money::whole(240);
    let t0 = order.created_at;

    flow.payment_succeeded(order.id, Money::whole(90), Some("TX-1".to_string()), t0 + Duration::hours(1), Gateway::Paypal)
        .await
        .expect("Error applying payment");
    flow.payment_declined(order.id, Money::whole(150), Some("TX-2".to_string()), t0 + Duration::hours(2), Gateway::Paypal)
        .await
        .expect("Error recording decline");
    flow.payment_succeeded(order.id, Money::whole(60), Some("TX-3".to_string()), t0 + Duration::hours(3), Gateway::Twocheckout)
        .await
        .expect("Error applying payment");
    flow.payment_refunded(order.id, Money::whole(30), Some("TX-4".to_string()), t0 + Duration::hours(4), Gateway::Paypal)
        .await
        .expect("Error applying refund");

    let records = flow.payments_for_order(order.id).await.expect("Error fetching payments");
    let net = atelier_billing_engine::ledger::net_paid(&records);
    let balance = flow.balance(order.id).await.expect("Error fetching balance");
    assert_eq!(net, Money::whole(120));
    assert_eq!(balance + net, payable);
}

#[tokio::test]
async fn events_for_unknown_orders_are_rejected_for_redelivery() {
    let db = new_db().await;
    seed_catalog(&db).await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let ghost = OrderId(4040);
    let now = chrono::Utc::now();

    let err = flow
        .payment_succeeded(ghost, Money::whole(10), Some("TX-g1".to_string()), now, Gateway::Paypal)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentGatewayError::OrderNotFound(id) if id == ghost));
    let err =
        flow.payment_refunded(ghost, Money::whole(10), Some("TX-g2".to_string()), now, Gateway::Paypal).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::OrderNotFound(_)));
    // Nothing may have reached the ledger.
    assert!(flow.payments_for_order(ghost).await.expect("Error fetching payments").is_empty());
}

#[tokio::test]
async fn order_paid_event_fires_exactly_once() {
    use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};

    use atelier_billing_engine::events::{EventHandlers, EventHooks};

    let db = new_db().await;
    let (_, order) = checkout_order(&db, "grace").await;

    let paid_count = Arc::new(AtomicUsize::new(0));
    let counter = paid_count.clone();
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |_event| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    let flow = OrderFlowApi::new(db.clone(), producers);

    let paid_at = order.created_at + Duration::hours(1);
    flow.payment_succeeded(order.id, Money::whole(240), Some("TX-once".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error applying payment");
    // Replay and an overpayment top-up: neither may re-fire the hook.
    flow.payment_succeeded(order.id, Money::whole(240), Some("TX-once".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error applying replay");
    flow.payment_succeeded(order.id, Money::whole(5), Some("TX-extra".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error applying top-up");

    drop(flow);
    handlers.start_handlers().await;
    // Give the spawned handler a beat to drain.
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    assert_eq!(paid_count.load(Ordering::SeqCst), 1);
}
