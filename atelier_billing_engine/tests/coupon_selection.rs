//! Best-match coupon selection against the store.

use abg_common::Money;
use atelier_billing_engine::{
    db_types::{Gateway, NewBasketLine},
    events::EventProducers,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed::{seed_catalog, seed_coupon, seed_expired_coupon, seed_first_timer_coupon},
    },
    traits::CatalogManagement,
    BasketApi,
    OrderFlowApi,
    PricingApi,
    SqliteDatabase,
};
use chrono::Duration;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

/// Runs a one-line basket through checkout and pays it in full, giving the customer paid history.
async fn give_paid_history(db: &SqliteDatabase, customer: &str) {
    let catalog = seed_catalog(db).await;
    let basket_api = BasketApi::new(db.clone());
    basket_api
        .add_or_update_line(customer, None, NewBasketLine {
            topic: "History maker".to_string(),
            service_type_id: catalog.essay.id,
            turnaround_id: catalog.three_days.id,
            level_id: None,
            tier_id: None,
            pages: 1,
            references: None,
            comment: None,
            quantity: 1,
        })
        .await
        .expect("Error adding line");
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let result = flow.checkout(customer).await.expect("Error checking out");
    let paid_at = result.order.created_at + Duration::minutes(10);
    flow.payment_succeeded(result.order.id, Money::whole(15), Some("TX-hist".to_string()), paid_at, Gateway::Paypal)
        .await
        .expect("Error paying order");
}

#[tokio::test]
async fn largest_qualifying_minimum_wins() {
    let db = new_db().await;
    seed_coupon(&db, "SMALL", 5, Some(Money::whole(50))).await;
    seed_coupon(&db, "MEDIUM", 10, Some(Money::whole(150))).await;
    seed_coupon(&db, "LARGE", 15, Some(Money::whole(300))).await;
    let pricing = PricingApi::new(db.clone());

    let best = pricing.best_coupon(Money::whole(200), None).await.expect("Error selecting").expect("No coupon");
    assert_eq!(best.code, "MEDIUM");
    let best = pricing.best_coupon(Money::whole(400), None).await.expect("Error selecting").expect("No coupon");
    assert_eq!(best.code, "LARGE");
    assert!(pricing.best_coupon(Money::whole(10), None).await.expect("Error selecting").is_none());
}

#[tokio::test]
async fn expired_and_deactivated_coupons_are_skipped() {
    let db = new_db().await;
    seed_expired_coupon(&db, "STALE", 50).await;
    seed_coupon(&db, "DISABLED", 40, Some(Money::whole(10))).await;
    db.deactivate_coupon("DISABLED").await.expect("Error deactivating");
    seed_coupon(&db, "FRESH", 10, Some(Money::whole(10))).await;
    let pricing = PricingApi::new(db.clone());

    let best = pricing.best_coupon(Money::whole(100), None).await.expect("Error selecting").expect("No coupon");
    assert_eq!(best.code, "FRESH");
}

#[tokio::test]
async fn first_timer_coupon_beats_higher_minimum_coupons_for_new_customers() {
    let db = new_db().await;
    seed_coupon(&db, "LOYALTY", 25, Some(Money::whole(50))).await;
    seed_first_timer_coupon(&db, "WELCOME", 10).await;
    let pricing = PricingApi::new(db.clone());

    // A first-time customer gets the welcome coupon even though the loyalty coupon discounts more.
    let best =
        pricing.best_coupon(Money::whole(500), Some("newcomer")).await.expect("Error selecting").expect("No coupon");
    assert_eq!(best.code, "WELCOME");
}

#[tokio::test]
async fn first_timer_coupon_is_withheld_from_paying_customers() {
    let db = new_db().await;
    give_paid_history(&db, "regular").await;
    seed_first_timer_coupon(&db, "WELCOME", 10).await;
    seed_coupon(&db, "LOYALTY", 25, Some(Money::whole(50))).await;
    let pricing = PricingApi::new(db.clone());

    let best =
        pricing.best_coupon(Money::whole(500), Some("regular")).await.expect("Error selecting").expect("No coupon");
    assert_eq!(best.code, "LOYALTY");
}
