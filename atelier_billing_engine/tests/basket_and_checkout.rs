//! Basket pricing, coupon handling and the atomic basket-to-order conversion.

use abg_common::Money;
use atelier_billing_engine::{
    db_types::{NewBasketLine, OrderLineStatusType, OrderStatusType},
    events::EventProducers,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        seed::{seed_catalog, seed_coupon, seed_expired_coupon, SeededCatalog},
    },
    traits::{BasketApiError, BasketManagement, CatalogManagement, PaymentGatewayDatabase, PaymentGatewayError},
    BasketApi,
    OrderFlowApi,
    PricingApi,
    SqliteDatabase,
};

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn line(catalog: &SeededCatalog, topic: &str, pages: i64, quantity: i64, tier: Option<i64>) -> NewBasketLine {
    NewBasketLine {
        topic: topic.to_string(),
        service_type_id: catalog.essay.id,
        turnaround_id: catalog.three_days.id,
        level_id: Some(catalog.graduate.id),
        tier_id: tier,
        pages,
        references: None,
        comment: None,
        quantity,
    }
}

#[tokio::test]
async fn wildcard_rate_beats_level_specific_rate() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    // A level-specific rule exists alongside the wildcard. The wildcard must still win.
    db.add_rate_rule(catalog.essay.id, catalog.three_days.id, Some(catalog.graduate.id), Money::whole(25))
        .await
        .expect("Error adding level rule");
    let pricing = PricingApi::new(db.clone());
    let rule = pricing
        .resolve_rate(catalog.essay.id, catalog.three_days.id, Some(catalog.graduate.id))
        .await
        .expect("Error resolving rate")
        .expect("No rate found");
    assert!(rule.is_wildcard());
    assert_eq!(rule.amount_per_page, Money::whole(15));
}

#[tokio::test]
async fn level_specific_rate_applies_when_no_wildcard_exists() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    let presentation = db.add_service_type("Presentation").await.expect("Error adding service type");
    db.add_rate_rule(presentation.id, catalog.three_days.id, Some(catalog.graduate.id), Money::whole(9))
        .await
        .expect("Error adding rule");
    let pricing = PricingApi::new(db.clone());
    let rule = pricing
        .resolve_rate(presentation.id, catalog.three_days.id, Some(catalog.graduate.id))
        .await
        .expect("Error resolving rate")
        .expect("No rate found");
    assert_eq!(rule.level_id, Some(catalog.graduate.id));
    assert_eq!(rule.amount_per_page, Money::whole(9));
    // Absence is a normal outcome, not a fault.
    let missing = pricing.resolve_rate(presentation.id, catalog.three_days.id, None).await.expect("Error resolving");
    assert!(missing.is_none());
}

#[tokio::test]
async fn unavailable_rate_is_a_recoverable_error() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    let basket_api = BasketApi::new(db.clone());
    let mut orphan = line(&catalog, "No such scope", 1, 1, None);
    orphan.turnaround_id = catalog.three_days.id + 99;
    let err = basket_api.add_or_update_line("alice", None, orphan).await.unwrap_err();
    assert!(matches!(err, BasketApiError::RateUnavailable));
}

#[tokio::test]
async fn basket_totals_follow_the_line_arithmetic() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    // Second scope priced at $10.00/page with a $30.00/page premium surcharge.
    let slides = db.add_service_type("Slides").await.expect("Error adding service type");
    let rule = db.add_rate_rule(slides.id, catalog.three_days.id, None, Money::whole(10)).await.expect("Error adding rule");
    db.add_tier_surcharge(rule.id, catalog.premium.id, Some(Money::whole(30))).await.expect("Error adding surcharge");

    let basket_api = BasketApi::new(db.clone());
    let line1 = basket_api
        .add_or_update_line("alice", None, line(&catalog, "Renaissance trade routes", 3, 2, Some(catalog.premium.id)))
        .await
        .expect("Error adding line 1");
    let mut second = line(&catalog, "Supporting slide deck", 3, 1, Some(catalog.premium.id));
    second.service_type_id = slides.id;
    let line2 = basket_api.add_or_update_line("alice", None, second).await.expect("Error adding line 2");

    // price = pages * page_price + pages * tier_surcharge
    assert_eq!(line1.price(), Money::whole(105));
    assert_eq!(line1.total(), Money::whole(210));
    assert_eq!(line2.price(), Money::whole(120));
    assert_eq!(line2.total(), Money::whole(120));

    let summary = basket_api.summary("alice").await.expect("Error fetching summary");
    assert_eq!(summary.subtotal, Money::whole(330));
    assert_eq!(summary.discount, Money::default());
    assert_eq!(summary.total, Money::whole(330));

    // With a 20%-off coupon the total drops to 264.00.
    seed_coupon(&db, "SAVE20", 20, Some(Money::whole(100))).await;
    basket_api.apply_coupon("alice", "SAVE20").await.expect("Error applying coupon");
    let summary = basket_api.summary("alice").await.expect("Error fetching summary");
    assert_eq!(summary.discount, Money::whole(66));
    assert_eq!(summary.total, Money::whole(264));
}

#[tokio::test]
async fn coupon_cannot_be_applied_twice() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    seed_coupon(&db, "TWICE", 10, None).await;
    let basket_api = BasketApi::new(db.clone());
    basket_api.add_or_update_line("bob", None, line(&catalog, "Topic", 2, 1, None)).await.expect("Error adding line");
    basket_api.apply_coupon("bob", "TWICE").await.expect("Error applying coupon");
    let err = basket_api.apply_coupon("bob", "TWICE").await.unwrap_err();
    assert!(matches!(err, BasketApiError::CouponAlreadyApplied(code) if code == "TWICE"));
}

#[tokio::test]
async fn removing_a_line_detaches_a_coupon_that_no_longer_qualifies() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    // Minimum of $60.00; two 2-page lines at $15.00/page give a $60.00 subtotal.
    seed_coupon(&db, "BIGBASKET", 15, Some(Money::whole(60))).await;
    let basket_api = BasketApi::new(db.clone());
    basket_api.add_or_update_line("carol", None, line(&catalog, "First", 2, 1, None)).await.expect("Error adding");
    let removable =
        basket_api.add_or_update_line("carol", None, line(&catalog, "Second", 2, 1, None)).await.expect("Error adding");
    basket_api.apply_coupon("carol", "BIGBASKET").await.expect("Error applying coupon");

    basket_api.remove_line("carol", removable.id).await.expect("Error removing line");
    let summary = basket_api.summary("carol").await.expect("Error fetching summary");
    // Subtotal fell to $30.00, below the minimum: the coupon must be gone, the basket untouched.
    assert_eq!(summary.subtotal, Money::whole(30));
    assert!(summary.basket.coupon_id.is_none());
    assert_eq!(summary.discount, Money::default());
    assert_eq!(summary.lines.len(), 1);
}

#[tokio::test]
async fn deleting_a_coupon_detaches_it_from_baskets() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    seed_coupon(&db, "SHORTLIVED", 10, None).await;
    let basket_api = BasketApi::new(db.clone());
    basket_api.add_or_update_line("dave", None, line(&catalog, "Topic", 1, 1, None)).await.expect("Error adding");
    basket_api.apply_coupon("dave", "SHORTLIVED").await.expect("Error applying coupon");

    db.delete_coupon("SHORTLIVED").await.expect("Error deleting coupon");
    let summary = basket_api.summary("dave").await.expect("Error fetching summary");
    assert!(summary.basket.coupon_id.is_none());
    assert_eq!(summary.lines.len(), 1);
}

#[tokio::test]
async fn checkout_snapshots_catalog_text_and_deletes_the_basket() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    let basket_api = BasketApi::new(db.clone());
    let mut with_refs = line(&catalog, "Weimar cinema", 3, 2, Some(catalog.premium.id));
    with_refs.references = Some(4);
    with_refs.comment = Some("Harvard referencing please".to_string());
    let basket_line = basket_api.add_or_update_line("erin", None, with_refs).await.expect("Error adding line");
    basket_api
        .add_line_attachment("erin", basket_line.id, "media/erin/brief.pdf", Some("Assignment brief"))
        .await
        .expect("Error adding attachment");

    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let result = flow.checkout("erin").await.expect("Error checking out");
    assert_eq!(result.order.status, OrderStatusType::Unpaid);
    assert_eq!(result.lines.len(), 1);
    let order_line = &result.lines[0];
    assert_eq!(order_line.service_type, "Essay");
    assert_eq!(order_line.turnaround, "3 Days");
    assert_eq!(order_line.level.as_deref(), Some("Graduate"));
    assert_eq!(order_line.tier.as_deref(), Some("Premium"));
    assert_eq!(order_line.references, Some(4));
    assert_eq!(order_line.status, OrderLineStatusType::Pending);
    assert_eq!(order_line.total(), Money::whole(210));

    // The attachment rows moved across with the line.
    let attachments = db.fetch_order_line_attachments(order_line.id).await.expect("Error fetching attachments");
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].storage_key, "media/erin/brief.pdf");

    // Baskets are single-use.
    assert!(db.fetch_basket("erin").await.expect("Error fetching basket").is_none());

    let summary = flow.order_summary(result.order.id).await.expect("Error fetching summary").expect("Order missing");
    assert_eq!(summary.amount_payable, Money::whole(210));
    // Unpaid orders never show a due date.
    assert!(summary.lines[0].due_date.is_none());
    assert!(summary.earliest_due.is_none());
}

#[tokio::test]
async fn checkout_snapshots_an_unexpired_coupon_and_drops_an_expired_one() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    let basket_api = BasketApi::new(db.clone());
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());

    // Valid coupon: snapshotted with the discount computed at checkout time.
    seed_coupon(&db, "KEEPME", 20, None).await;
    basket_api.add_or_update_line("frank", None, line(&catalog, "Kept", 2, 1, None)).await.expect("Error adding");
    basket_api.apply_coupon("frank", "KEEPME").await.expect("Error applying coupon");
    let result = flow.checkout("frank").await.expect("Error checking out");
    let snapshot = db.fetch_order_coupon(result.order.id).await.expect("Error fetching coupon").expect("No snapshot");
    assert_eq!(snapshot.code, "KEEPME");
    assert_eq!(snapshot.discount, Money::whole(6));
    // The snapshot survives deleting the coupon itself.
    db.delete_coupon("KEEPME").await.expect("Error deleting coupon");
    let snapshot = db.fetch_order_coupon(result.order.id).await.expect("Error fetching coupon").expect("No snapshot");
    assert_eq!(snapshot.code, "KEEPME");

    // Expired coupon: attached directly (the apply guard would reject it), silently dropped at checkout.
    let expired = seed_expired_coupon(&db, "TOOLATE", 50).await;
    basket_api.add_or_update_line("grace", None, line(&catalog, "Dropped", 2, 1, None)).await.expect("Error adding");
    let basket = db.fetch_basket("grace").await.expect("Error fetching basket").expect("No basket");
    db.attach_coupon(basket.id, expired.id).await.expect("Error attaching coupon");
    let result = flow.checkout("grace").await.expect("Error checking out");
    assert!(db.fetch_order_coupon(result.order.id).await.expect("Error fetching coupon").is_none());
    assert_eq!(flow.balance(result.order.id).await.expect("Error fetching balance"), Money::whole(30));
}

#[tokio::test]
async fn checkout_of_an_empty_or_missing_basket_creates_nothing() {
    let db = new_db().await;
    let catalog = seed_catalog(&db).await;
    let basket_api = BasketApi::new(db.clone());
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());

    let err = flow.checkout("nobody").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::BasketNotFound(_)));

    basket_api.add_or_update_line("harry", None, line(&catalog, "Gone again", 1, 1, None)).await.expect("Error adding");
    basket_api.clear("harry").await.expect("Error clearing");
    let err = flow.checkout("harry").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::EmptyBasket));
    // The basket survived the failed checkout.
    assert!(db.fetch_basket("harry").await.expect("Error fetching basket").is_some());
}
