use abg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{Basket, BasketLine, BasketLineAttachment, NewBasketLine},
    traits::CatalogApiError,
};

/// Storage operations for the single mutable pre-order basket each customer owns.
///
/// Price resolution and coupon policy live in [`crate::BasketApi`]; these methods only move rows.
#[allow(async_fn_in_trait)]
pub trait BasketManagement: Clone {
    /// Returns the customer's basket, creating an empty one if none exists.
    async fn fetch_or_create_basket(&self, customer_id: &str) -> Result<Basket, BasketApiError>;

    async fn fetch_basket(&self, customer_id: &str) -> Result<Option<Basket>, BasketApiError>;

    async fn fetch_basket_lines(&self, basket_id: i64) -> Result<Vec<BasketLine>, BasketApiError>;

    async fn fetch_basket_line(&self, line_id: i64) -> Result<Option<BasketLine>, BasketApiError>;

    /// Inserts a line with the prices the engine resolved for it.
    async fn insert_basket_line(
        &self,
        basket_id: i64,
        line: &NewBasketLine,
        page_price: Money,
        tier_price: Option<Money>,
    ) -> Result<BasketLine, BasketApiError>;

    /// Replaces an existing line's scope, descriptive fields and captured prices.
    async fn update_basket_line(
        &self,
        line_id: i64,
        line: &NewBasketLine,
        page_price: Money,
        tier_price: Option<Money>,
    ) -> Result<BasketLine, BasketApiError>;

    /// Removes a line. Removing the last line leaves the (empty) basket in place.
    async fn remove_basket_line(&self, basket_id: i64, line_id: i64) -> Result<(), BasketApiError>;

    /// Deletes all lines. The basket row itself survives.
    async fn clear_basket(&self, basket_id: i64) -> Result<(), BasketApiError>;

    async fn attach_coupon(&self, basket_id: i64, coupon_id: i64) -> Result<(), BasketApiError>;

    async fn detach_coupon(&self, basket_id: i64) -> Result<(), BasketApiError>;

    /// Records an attachment for a line. The blob itself lives in the external attachment store; only the
    /// storage key is kept.
    async fn add_line_attachment(
        &self,
        line_id: i64,
        storage_key: &str,
        comment: Option<&str>,
    ) -> Result<BasketLineAttachment, BasketApiError>;

    async fn fetch_line_attachments(&self, line_id: i64) -> Result<Vec<BasketLineAttachment>, BasketApiError>;
}

/// Errors for basket operations. The user-facing variants are recoverable validation errors and are
/// returned synchronously, never swallowed.
#[derive(Debug, Clone, Error)]
pub enum BasketApiError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Customer {0} has no basket")]
    BasketNotFound(String),
    #[error("Basket line {0} does not exist")]
    LineNotFound(i64),
    #[error("Apologies, this service is currently unavailable")]
    RateUnavailable,
    #[error("This service tier is currently unavailable")]
    TierUnavailable,
    #[error("No coupon with code {0} exists")]
    CouponNotFound(String),
    #[error("Coupon {0} has already been applied to this basket")]
    CouponAlreadyApplied(String),
    #[error("Coupon {0} cannot be applied to this basket")]
    CouponNotValid(String),
    #[error(transparent)]
    Catalog(#[from] CatalogApiError),
}

impl From<sqlx::Error> for BasketApiError {
    fn from(e: sqlx::Error) -> Self {
        BasketApiError::DatabaseError(e.to_string())
    }
}
