//! Catalog fixtures shared by the integration tests.

use abg_common::Money;
use chrono::{Duration, Utc};

use crate::{
    db_types::{Coupon, CouponKind, Level, NewCoupon, RateRule, ServiceType, Tier, Turnaround, TurnaroundUnit},
    traits::CatalogManagement,
};

/// A small catalog: one service type, a 3-day turnaround, one level, two tiers, a wildcard rate rule at
/// $15.00/page with a $20.00/page surcharge on the premium tier and a free standard tier.
pub struct SeededCatalog {
    pub essay: ServiceType,
    pub three_days: Turnaround,
    pub graduate: Level,
    pub standard: Tier,
    pub premium: Tier,
    pub wildcard_rule: RateRule,
}

pub async fn seed_catalog<B: CatalogManagement>(db: &B) -> SeededCatalog {
    let essay = db.add_service_type("Essay").await.expect("Error seeding service type");
    let three_days = db.add_turnaround(3, TurnaroundUnit::Day).await.expect("Error seeding turnaround");
    let graduate = db.add_level("Graduate").await.expect("Error seeding level");
    let standard = db.add_tier("Standard").await.expect("Error seeding tier");
    let premium = db.add_tier("Premium").await.expect("Error seeding tier");
    let wildcard_rule = db
        .add_rate_rule(essay.id, three_days.id, None, Money::whole(15))
        .await
        .expect("Error seeding rate rule");
    db.add_tier_surcharge(wildcard_rule.id, standard.id, None).await.expect("Error seeding standard tier");
    db.add_tier_surcharge(wildcard_rule.id, premium.id, Some(Money::whole(20)))
        .await
        .expect("Error seeding premium tier");
    SeededCatalog { essay, three_days, graduate, standard, premium, wildcard_rule }
}

/// Creates a regular coupon valid for a week.
pub async fn seed_coupon<B: CatalogManagement>(
    db: &B,
    code: &str,
    percent_off: i64,
    minimum: Option<Money>,
) -> Coupon {
    let now = Utc::now();
    db.add_coupon(NewCoupon {
        code: Some(code.to_string()),
        kind: CouponKind::Regular,
        percent_off,
        minimum,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(7),
    })
    .await
    .expect("Error seeding coupon")
}

/// Creates a coupon whose validity window already ended.
pub async fn seed_expired_coupon<B: CatalogManagement>(db: &B, code: &str, percent_off: i64) -> Coupon {
    let now = Utc::now();
    db.add_coupon(NewCoupon {
        code: Some(code.to_string()),
        kind: CouponKind::Regular,
        percent_off,
        minimum: None,
        start_date: now - Duration::days(14),
        end_date: now - Duration::days(7),
    })
    .await
    .expect("Error seeding expired coupon")
}

/// Creates a first-timer coupon valid for a week.
pub async fn seed_first_timer_coupon<B: CatalogManagement>(db: &B, code: &str, percent_off: i64) -> Coupon {
    let now = Utc::now();
    db.add_coupon(NewCoupon {
        code: Some(code.to_string()),
        kind: CouponKind::FirstTimer,
        percent_off,
        minimum: None,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(7),
    })
    .await
    .expect("Error seeding first-timer coupon")
}
