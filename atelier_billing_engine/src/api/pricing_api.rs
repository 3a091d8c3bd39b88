use std::fmt::Debug;

use abg_common::Money;
use log::*;

use crate::{
    db_types::{Coupon, CouponKind, RateRule, TierSurcharge},
    traits::{CatalogApiError, CatalogManagement},
};

/// `PricingApi` answers the two pricing questions of the storefront: what does a unit of work cost
/// (rate resolution), and which discount applies (coupon selection).
pub struct PricingApi<B> {
    db: B,
}

impl<B: Debug> Debug for PricingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PricingApi ({:?})", self.db)
    }
}

impl<B> PricingApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> PricingApi<B>
where B: CatalogManagement
{
    /// Resolves the rate rule for a (service type, turnaround, level) tuple.
    ///
    /// The wildcard rule (no level constraint) always wins, **even when a level-specific rule also
    /// exists**: pricing "any level" uniformly is a deliberate business policy, not a fallback. Only when
    /// no wildcard exists is the level-specific rule consulted.
    ///
    /// `None` is a normal outcome and means the service is currently unavailable for that scope.
    pub async fn resolve_rate(
        &self,
        service_type_id: i64,
        turnaround_id: i64,
        level_id: Option<i64>,
    ) -> Result<Option<RateRule>, CatalogApiError> {
        if let Some(rule) = self.db.fetch_rate_for_scope(service_type_id, turnaround_id, None).await? {
            trace!("💰️ Wildcard rate found for service {service_type_id}/turnaround {turnaround_id}");
            return Ok(Some(rule));
        }
        match level_id {
            Some(level) => self.db.fetch_rate_for_scope(service_type_id, turnaround_id, Some(level)).await,
            None => Ok(None),
        }
    }

    /// Resolves the tier surcharge for an already-resolved rate rule. Since the rule itself was resolved
    /// wildcard-first, that priority applies transitively here.
    pub async fn resolve_tier_surcharge(
        &self,
        rule: &RateRule,
        tier_id: i64,
    ) -> Result<Option<TierSurcharge>, CatalogApiError> {
        self.db.fetch_tier_surcharge(rule.id, tier_id).await
    }

    /// Picks the most appropriate coupon for a subtotal and customer.
    ///
    /// A valid first-timer coupon for an eligible first-time customer wins immediately and bypasses the
    /// minimum-threshold comparison entirely. Otherwise the qualifying coupon with the largest minimum
    /// wins. Expired or deactivated coupons are never returned.
    pub async fn best_coupon(
        &self,
        subtotal: Money,
        customer_id: Option<&str>,
    ) -> Result<Option<Coupon>, CatalogApiError> {
        let has_paid_order = match customer_id {
            Some(id) => self.db.customer_has_paid_order(id).await?,
            None => false,
        };
        if let Some(coupon) = self.db.fetch_first_timer_coupon().await? {
            if coupon_is_valid(&coupon, subtotal, has_paid_order) {
                debug!("💰️ First-timer coupon {} selected", coupon.code);
                return Ok(Some(coupon));
            }
        }
        let candidates = self.db.fetch_coupons_with_minimum_at_most(subtotal).await?;
        let best = candidates.into_iter().find(|c| coupon_is_valid(c, subtotal, has_paid_order));
        Ok(best)
    }

    /// Validates a specific coupon for a subtotal and customer, e.g. when the customer types in a code.
    pub async fn is_valid_for(
        &self,
        coupon: &Coupon,
        subtotal: Money,
        customer_id: Option<&str>,
    ) -> Result<bool, CatalogApiError> {
        let has_paid_order = match customer_id {
            Some(id) => self.db.customer_has_paid_order(id).await?,
            None => false,
        };
        Ok(coupon_is_valid(coupon, subtotal, has_paid_order))
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// The coupon validity predicate: active, unexpired, minimum met (if any), and first-timer coupons only
/// for customers without a historically paid order.
pub fn coupon_is_valid(coupon: &Coupon, subtotal: Money, has_paid_order: bool) -> bool {
    if !coupon.is_active || coupon.is_expired() {
        return false;
    }
    if coupon.kind == CouponKind::FirstTimer && has_paid_order {
        return false;
    }
    if let Some(minimum) = coupon.minimum {
        if subtotal < minimum {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::db_types::CouponKind;

    fn coupon(kind: CouponKind, minimum: Option<i64>, expired: bool) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: 1,
            code: "TESTCODE".to_string(),
            kind,
            percent_off: 20,
            minimum: minimum.map(Money::whole),
            start_date: now - Duration::days(7),
            end_date: if expired { now - Duration::days(1) } else { now + Duration::days(7) },
            is_active: true,
        }
    }

    #[test]
    fn expired_coupons_are_never_valid() {
        let c = coupon(CouponKind::Regular, None, true);
        assert!(!coupon_is_valid(&c, Money::whole(1_000), false));
    }

    #[test]
    fn deactivated_coupons_are_never_valid() {
        let mut c = coupon(CouponKind::Regular, None, false);
        c.is_active = false;
        assert!(!coupon_is_valid(&c, Money::whole(1_000), false));
    }

    #[test]
    fn minimum_must_be_met() {
        let c = coupon(CouponKind::Regular, Some(100), false);
        assert!(!coupon_is_valid(&c, Money::whole(99), false));
        assert!(coupon_is_valid(&c, Money::whole(100), false));
        assert!(coupon_is_valid(&c, Money::whole(101), false));
    }

    #[test]
    fn first_timer_requires_no_paid_history() {
        let c = coupon(CouponKind::FirstTimer, None, false);
        assert!(coupon_is_valid(&c, Money::whole(10), false));
        assert!(!coupon_is_valid(&c, Money::whole(10), true));
    }

    #[test]
    fn no_minimum_means_any_subtotal_qualifies() {
        let c = coupon(CouponKind::Regular, None, false);
        assert!(coupon_is_valid(&c, Money::default(), false));
    }
}
