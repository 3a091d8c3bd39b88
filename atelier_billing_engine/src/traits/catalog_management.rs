use abg_common::Money;
use thiserror::Error;

use crate::db_types::{Coupon, Level, NewCoupon, RateRule, ServiceType, Tier, TierSurcharge, Turnaround, TurnaroundUnit};

/// Catalog scope entities, rate rules and coupons.
///
/// The admin surface that edits the catalog is an external collaborator; the write methods here are the
/// minimal set it (and the test suite) needs to seed scope entities and prices.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement: Clone {
    async fn add_service_type(&self, name: &str) -> Result<ServiceType, CatalogApiError>;

    async fn add_turnaround(&self, value: i64, unit: TurnaroundUnit) -> Result<Turnaround, CatalogApiError>;

    async fn add_level(&self, name: &str) -> Result<Level, CatalogApiError>;

    async fn add_tier(&self, name: &str) -> Result<Tier, CatalogApiError>;

    /// Creates a rate rule. `level_id = None` creates the wildcard rule for the (service type, turnaround)
    /// pair. The scope tuple is unique.
    async fn add_rate_rule(
        &self,
        service_type_id: i64,
        turnaround_id: i64,
        level_id: Option<i64>,
        amount_per_page: Money,
    ) -> Result<RateRule, CatalogApiError>;

    /// Creates a tier surcharge for a rate rule. `amount_per_page = None` marks the tier as free.
    async fn add_tier_surcharge(
        &self,
        rate_rule_id: i64,
        tier_id: i64,
        amount_per_page: Option<Money>,
    ) -> Result<TierSurcharge, CatalogApiError>;

    /// Fetches the rate rule with exactly the given scope. Wildcard-priority resolution is layered on top
    /// of this by [`crate::PricingApi`].
    async fn fetch_rate_for_scope(
        &self,
        service_type_id: i64,
        turnaround_id: i64,
        level_id: Option<i64>,
    ) -> Result<Option<RateRule>, CatalogApiError>;

    async fn fetch_tier_surcharge(
        &self,
        rate_rule_id: i64,
        tier_id: i64,
    ) -> Result<Option<TierSurcharge>, CatalogApiError>;

    async fn add_coupon(&self, coupon: NewCoupon) -> Result<Coupon, CatalogApiError>;

    /// Soft-deactivates a coupon. Deactivated coupons are never selected or accepted.
    async fn deactivate_coupon(&self, code: &str) -> Result<(), CatalogApiError>;

    /// Hard-deletes a coupon. Baskets holding it have their reference nulled (weak reference).
    async fn delete_coupon(&self, code: &str) -> Result<(), CatalogApiError>;

    async fn fetch_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, CatalogApiError>;

    async fn fetch_coupon_by_id(&self, id: i64) -> Result<Option<Coupon>, CatalogApiError>;

    /// The first active first-timer coupon, if any exists.
    async fn fetch_first_timer_coupon(&self) -> Result<Option<Coupon>, CatalogApiError>;

    /// Active coupons whose minimum is set and does not exceed `subtotal`, largest minimum first.
    async fn fetch_coupons_with_minimum_at_most(&self, subtotal: Money) -> Result<Vec<Coupon>, CatalogApiError>;

    /// Whether the customer has at least one historically paid order. Drives first-timer eligibility.
    async fn customer_has_paid_order(&self, customer_id: &str) -> Result<bool, CatalogApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum CatalogApiError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("A rate rule already exists for this (service type, turnaround, level) scope")]
    DuplicateRateScope,
    #[error("A tier surcharge already exists for this (rate rule, tier) scope")]
    DuplicateTierScope,
    #[error("A coupon with code {0} already exists")]
    DuplicateCouponCode(String),
    #[error("Could not generate a unique coupon code")]
    CouponCodeExhausted,
    #[error("No coupon with code {0} exists")]
    CouponNotFound(String),
}

impl From<sqlx::Error> for CatalogApiError {
    fn from(e: sqlx::Error) -> Self {
        CatalogApiError::DatabaseError(e.to_string())
    }
}
