use std::fmt::Debug;

use abg_common::Money;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    api::pricing_api::{coupon_is_valid, PricingApi},
    db_types::{Basket, BasketLine, BasketLineAttachment, Coupon, NewBasketLine},
    traits::{BasketApiError, BasketManagement, CatalogManagement},
};

/// The customer-facing view of a basket with all derived amounts computed on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketSummary {
    pub basket: Basket,
    pub lines: Vec<BasketLine>,
    pub coupon: Option<Coupon>,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    /// The best coupon the customer *could* apply, surfaced as a hint.
    pub best_match_coupon: Option<BestMatchCoupon>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestMatchCoupon {
    pub code: String,
    pub discount: Money,
}

/// `BasketApi` owns the mutable pre-order basket: line management with point-in-time price capture,
/// coupon application, and the computed subtotal/discount/total reads.
pub struct BasketApi<B> {
    db: B,
}

impl<B> Debug for BasketApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BasketApi")
    }
}

impl<B> BasketApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> BasketApi<B>
where B: BasketManagement + CatalogManagement
{
    /// Adds a line to the customer's basket, or updates an existing one when `line_id` is given.
    ///
    /// The page price and tier surcharge are resolved now and captured on the line; later catalog rate
    /// changes do not touch it. An unavailable rate or tier is a recoverable user-facing error.
    pub async fn add_or_update_line(
        &self,
        customer_id: &str,
        line_id: Option<i64>,
        line: NewBasketLine,
    ) -> Result<BasketLine, BasketApiError> {
        let pricing = PricingApi::new(self.db.clone());
        let rule = pricing
            .resolve_rate(line.service_type_id, line.turnaround_id, line.level_id)
            .await?
            .ok_or(BasketApiError::RateUnavailable)?;
        let tier_price = match line.tier_id {
            Some(tier_id) => {
                let surcharge =
                    pricing.resolve_tier_surcharge(&rule, tier_id).await?.ok_or(BasketApiError::TierUnavailable)?;
                Some(surcharge.surcharge_per_page())
            },
            None => None,
        };
        let basket = self.db.fetch_or_create_basket(customer_id).await?;
        match line_id {
            Some(id) => {
                let existing = self.db.fetch_basket_line(id).await?.ok_or(BasketApiError::LineNotFound(id))?;
                if existing.basket_id != basket.id {
                    return Err(BasketApiError::LineNotFound(id));
                }
                self.db.update_basket_line(id, &line, rule.amount_per_page, tier_price).await
            },
            None => self.db.insert_basket_line(basket.id, &line, rule.amount_per_page, tier_price).await,
        }
    }

    /// Removes a line, then re-validates the attached coupon against the shrunken subtotal: a coupon whose
    /// minimum is no longer met is detached.
    pub async fn remove_line(&self, customer_id: &str, line_id: i64) -> Result<(), BasketApiError> {
        let basket =
            self.db.fetch_basket(customer_id).await?.ok_or_else(|| BasketApiError::BasketNotFound(customer_id.to_string()))?;
        self.db.remove_basket_line(basket.id, line_id).await?;
        self.revalidate_coupon(&basket).await?;
        Ok(())
    }

    /// Clears all lines (the basket itself survives) and re-validates the attached coupon.
    pub async fn clear(&self, customer_id: &str) -> Result<(), BasketApiError> {
        let basket =
            self.db.fetch_basket(customer_id).await?.ok_or_else(|| BasketApiError::BasketNotFound(customer_id.to_string()))?;
        self.db.clear_basket(basket.id).await?;
        self.revalidate_coupon(&basket).await?;
        Ok(())
    }

    /// Applies a coupon code to the basket. Re-applying the coupon already attached is rejected; the
    /// validity predicate (expiry, minimum, first-timer eligibility) is enforced here, synchronously.
    pub async fn apply_coupon(&self, customer_id: &str, code: &str) -> Result<(Coupon, Money), BasketApiError> {
        let coupon =
            self.db.fetch_coupon_by_code(code).await?.ok_or_else(|| BasketApiError::CouponNotFound(code.to_string()))?;
        let basket = self.db.fetch_or_create_basket(customer_id).await?;
        if basket.coupon_id == Some(coupon.id) {
            return Err(BasketApiError::CouponAlreadyApplied(coupon.code));
        }
        let subtotal = self.subtotal(basket.id).await?;
        let has_paid = self.db.customer_has_paid_order(customer_id).await?;
        if !coupon_is_valid(&coupon, subtotal, has_paid) {
            return Err(BasketApiError::CouponNotValid(coupon.code));
        }
        self.db.attach_coupon(basket.id, coupon.id).await?;
        let discount = coupon.discount_on(subtotal);
        debug!("🧺️ Coupon {} applied to basket of {customer_id} for {discount}", coupon.code);
        Ok((coupon, discount))
    }

    pub async fn add_line_attachment(
        &self,
        customer_id: &str,
        line_id: i64,
        storage_key: &str,
        comment: Option<&str>,
    ) -> Result<BasketLineAttachment, BasketApiError> {
        let basket =
            self.db.fetch_basket(customer_id).await?.ok_or_else(|| BasketApiError::BasketNotFound(customer_id.to_string()))?;
        let line = self.db.fetch_basket_line(line_id).await?.ok_or(BasketApiError::LineNotFound(line_id))?;
        if line.basket_id != basket.id {
            return Err(BasketApiError::LineNotFound(line_id));
        }
        self.db.add_line_attachment(line_id, storage_key, comment).await
    }

    /// The basket with all derived amounts. Everything is recomputed on every read.
    pub async fn summary(&self, customer_id: &str) -> Result<BasketSummary, BasketApiError> {
        let basket = self.db.fetch_or_create_basket(customer_id).await?;
        let lines = self.db.fetch_basket_lines(basket.id).await?;
        let subtotal: Money = lines.iter().map(|l| l.total()).sum();
        let coupon = match basket.coupon_id {
            Some(id) => self.db.fetch_coupon_by_id(id).await?,
            None => None,
        };
        let discount = match &coupon {
            Some(c) if !c.is_expired() => c.discount_on(subtotal),
            _ => Money::default(),
        };
        let total = subtotal - discount;
        let pricing = PricingApi::new(self.db.clone());
        let best_match_coupon = pricing
            .best_coupon(subtotal, Some(customer_id))
            .await?
            .map(|c| BestMatchCoupon { discount: c.discount_on(subtotal), code: c.code });
        Ok(BasketSummary { basket, lines, coupon, subtotal, discount, total, best_match_coupon })
    }

    async fn subtotal(&self, basket_id: i64) -> Result<Money, BasketApiError> {
        let lines = self.db.fetch_basket_lines(basket_id).await?;
        Ok(lines.iter().map(|l| l.total()).sum())
    }

    /// Re-evaluates the attached coupon after the basket shrank. If it no longer qualifies (e.g. the
    /// subtotal fell below its minimum), it is detached. The basket is otherwise untouched.
    async fn revalidate_coupon(&self, basket: &Basket) -> Result<(), BasketApiError> {
        let Some(coupon_id) = basket.coupon_id else {
            return Ok(());
        };
        let Some(coupon) = self.db.fetch_coupon_by_id(coupon_id).await? else {
            return Ok(());
        };
        let subtotal = self.subtotal(basket.id).await?;
        let has_paid = self.db.customer_has_paid_order(&basket.customer_id).await?;
        if !coupon_is_valid(&coupon, subtotal, has_paid) {
            info!("🧺️ Coupon {} no longer qualifies for basket #{}. Detaching it.", coupon.code, basket.id);
            self.db.detach_coupon(basket.id).await?;
        }
        Ok(())
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
