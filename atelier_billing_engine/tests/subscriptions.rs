//! Platform subscription billing: activation cascade, lifecycle transitions and sale ordering.

use abg_common::Money;
use atelier_billing_engine::{
    db_types::{Gateway, NewSubscription, SubscriptionStatus},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::SubscriptionApiError,
    SqliteDatabase,
    SubscriptionApi,
};
use chrono::{Duration, Utc};

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn new_subscription(external_id: &str, on_trial: bool) -> NewSubscription {
    let now = Utc::now();
    NewSubscription {
        external_subscription_id: external_id.to_string(),
        plan_id: "P-PLAN".to_string(),
        plan_name: Some("Atelier monthly".to_string()),
        amount: Some(Money::whole(29)),
        is_on_trial: on_trial,
        start_time: now,
        next_billing_time: now + Duration::days(30),
    }
}

#[tokio::test]
async fn activation_retires_every_other_active_subscription() {
    let db = new_db().await;
    let api = SubscriptionApi::new(db.clone());

    let first = api.activated(new_subscription("I-FIRST", true)).await.expect("Error activating");
    assert!(first.created);
    assert!(first.retired.is_empty());
    assert!(first.subscription.is_on_trial);

    let second = api.activated(new_subscription("I-SECOND", false)).await.expect("Error activating");
    assert!(second.created);
    assert_eq!(second.retired.len(), 1);
    assert_eq!(second.retired[0].id, first.subscription.id);
    assert!(second.retired[0].retired_at.is_some());

    // At most one subscription is ever active.
    let active = api.active_subscription().await.expect("Error fetching active").expect("No active subscription");
    assert_eq!(active.id, second.subscription.id);
}

#[tokio::test]
async fn reactivation_refreshes_the_existing_link() {
    let db = new_db().await;
    let api = SubscriptionApi::new(db.clone());
    let first = api.activated(new_subscription("I-SAME", false)).await.expect("Error activating");

    let mut refresh = new_subscription("I-SAME", false);
    refresh.next_billing_time = Utc::now() + Duration::days(60);
    let again = api.activated(refresh.clone()).await.expect("Error re-activating");
    assert!(!again.created);
    assert_eq!(again.subscription.id, first.subscription.id);
    assert_eq!(again.subscription.status, SubscriptionStatus::Active);
    assert_eq!(again.subscription.next_billing_time, refresh.next_billing_time);
}

#[tokio::test]
async fn suspend_and_cancel_follow_the_link() {
    let db = new_db().await;
    let api = SubscriptionApi::new(db.clone());
    api.activated(new_subscription("I-LIFE", false)).await.expect("Error activating");

    let suspended = api.suspended("I-LIFE").await.expect("Error suspending").expect("No subscription");
    assert_eq!(suspended.status, SubscriptionStatus::Suspended);

    let cancelled_at = Utc::now() - Duration::minutes(5);
    let cancelled = api.cancelled("I-LIFE", cancelled_at).await.expect("Error cancelling").expect("No subscription");
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert_eq!(cancelled.cancelled_at, Some(cancelled_at));

    // Events for subscriptions this instance does not know are acknowledged, not errors.
    assert!(api.suspended("I-ELSEWHERE").await.expect("Error suspending").is_none());
    assert!(api.cancelled("I-ELSEWHERE", Utc::now()).await.expect("Error cancelling").is_none());
}

#[tokio::test]
async fn sales_require_the_activation_to_have_landed_first() {
    let db = new_db().await;
    let api = SubscriptionApi::new(db.clone());
    let now = Utc::now();

    // The sale arrived before its activation: the caller must be told to retry later.
    let err = api
        .sale_completed("I-EARLY", Money::whole(29), now, Some("SALE-1".to_string()), Gateway::Paypal)
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriptionApiError::LinkNotFound(id) if id == "I-EARLY"));

    // After the activation lands, the redelivered sale settles.
    api.activated(new_subscription("I-EARLY", false)).await.expect("Error activating");
    let sale = api
        .sale_completed("I-EARLY", Money::whole(29), now, Some("SALE-1".to_string()), Gateway::Paypal)
        .await
        .expect("Error recording sale");
    assert!(!sale.duplicate);

    // And a second redelivery is a no-op acknowledgement.
    let replay = api
        .sale_completed("I-EARLY", Money::whole(29), now, Some("SALE-1".to_string()), Gateway::Paypal)
        .await
        .expect("Error recording replay");
    assert!(replay.duplicate);

    let history = api.billing_history().await.expect("Error fetching history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].amount, Money::whole(29));
}

#[tokio::test]
async fn updated_state_applies_the_fetched_billing_info() {
    let db = new_db().await;
    let api = SubscriptionApi::new(db.clone());
    api.activated(new_subscription("I-UPD", true)).await.expect("Error activating");

    let next = Utc::now() + Duration::days(90);
    let updated = api.updated("I-UPD", next, false).await.expect("Error updating").expect("No subscription");
    assert_eq!(updated.next_billing_time, next);
    assert!(!updated.is_on_trial);

    // Unknown link: nothing to update, acknowledged upstream.
    assert!(api.updated("I-GONE", next, false).await.expect("Error updating").is_none());
}
