//! `SqliteDatabase` is a concrete implementation of an Atelier billing engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module. Multi-step operations (checkout, event application, activation) each run in a
//! single transaction so partial application is never observable.
use std::fmt::Debug;

use abg_common::Money;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{baskets, coupons, orders, payments, rates, subscriptions};
use crate::{
    db_types::{
        Basket,
        BasketLine,
        BasketLineAttachment,
        Coupon,
        Gateway,
        GatewayLink,
        LedgerTarget,
        Level,
        NewBasketLine,
        NewCoupon,
        NewOrderLine,
        NewSubscription,
        Order,
        OrderCoupon,
        OrderId,
        OrderLine,
        OrderLineAttachment,
        OrderStatusType,
        PaymentRecord,
        PaymentStatus,
        RateRule,
        ServiceType,
        Subscription,
        SubscriptionStatus,
        Tier,
        TierSurcharge,
        Turnaround,
        TurnaroundUnit,
    },
    ledger,
    traits::{
        BasketApiError,
        BasketManagement,
        CatalogApiError,
        CatalogManagement,
        CheckoutResult,
        DeclineRecorded,
        PaymentApplied,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        RefundApplied,
        SaleRecorded,
        SubscriptionActivation,
        SubscriptionApiError,
        SubscriptionManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool against the given URL.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = super::db::new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn add_service_type(&self, name: &str) -> Result<ServiceType, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        rates::insert_service_type(name, &mut conn).await
    }

    async fn add_turnaround(&self, value: i64, unit: TurnaroundUnit) -> Result<Turnaround, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        rates::insert_turnaround(value, unit, &mut conn).await
    }

    async fn add_level(&self, name: &str) -> Result<Level, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        rates::insert_level(name, &mut conn).await
    }

    async fn add_tier(&self, name: &str) -> Result<Tier, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        rates::insert_tier(name, &mut conn).await
    }

    async fn add_rate_rule(
        &self,
        service_type_id: i64,
        turnaround_id: i64,
        level_id: Option<i64>,
        amount_per_page: Money,
    ) -> Result<RateRule, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        rates::insert_rate_rule(service_type_id, turnaround_id, level_id, amount_per_page, &mut conn).await
    }

    async fn add_tier_surcharge(
        &self,
        rate_rule_id: i64,
        tier_id: i64,
        amount_per_page: Option<Money>,
    ) -> Result<TierSurcharge, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        rates::insert_tier_surcharge(rate_rule_id, tier_id, amount_per_page, &mut conn).await
    }

    async fn fetch_rate_for_scope(
        &self,
        service_type_id: i64,
        turnaround_id: i64,
        level_id: Option<i64>,
    ) -> Result<Option<RateRule>, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        rates::fetch_rate_for_scope(service_type_id, turnaround_id, level_id, &mut conn).await
    }

    async fn fetch_tier_surcharge(
        &self,
        rate_rule_id: i64,
        tier_id: i64,
    ) -> Result<Option<TierSurcharge>, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        rates::fetch_tier_surcharge(rate_rule_id, tier_id, &mut conn).await
    }

    async fn add_coupon(&self, coupon: NewCoupon) -> Result<Coupon, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        coupons::insert_coupon(coupon, &mut conn).await
    }

    async fn deactivate_coupon(&self, code: &str) -> Result<(), CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        coupons::deactivate(code, &mut conn).await
    }

    async fn delete_coupon(&self, code: &str) -> Result<(), CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        coupons::delete(code, &mut conn).await
    }

    async fn fetch_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_by_code(code, &mut conn).await
    }

    async fn fetch_coupon_by_id(&self, id: i64) -> Result<Option<Coupon>, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_by_id(id, &mut conn).await
    }

    async fn fetch_first_timer_coupon(&self) -> Result<Option<Coupon>, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_first_timer(&mut conn).await
    }

    async fn fetch_coupons_with_minimum_at_most(&self, subtotal: Money) -> Result<Vec<Coupon>, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        coupons::fetch_minimum_candidates(subtotal, &mut conn).await
    }

    async fn customer_has_paid_order(&self, customer_id: &str) -> Result<bool, CatalogApiError> {
        let mut conn = self.pool.acquire().await?;
        orders::has_paid_order(customer_id, &mut conn).await.map_err(|e| CatalogApiError::DatabaseError(e.to_string()))
    }
}

impl BasketManagement for SqliteDatabase {
    async fn fetch_or_create_basket(&self, customer_id: &str) -> Result<Basket, BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::fetch_or_create(customer_id, &mut conn).await
    }

    async fn fetch_basket(&self, customer_id: &str) -> Result<Option<Basket>, BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::fetch(customer_id, &mut conn).await
    }

    async fn fetch_basket_lines(&self, basket_id: i64) -> Result<Vec<BasketLine>, BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::fetch_lines(basket_id, &mut conn).await
    }

    async fn fetch_basket_line(&self, line_id: i64) -> Result<Option<BasketLine>, BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::fetch_line(line_id, &mut conn).await
    }

    async fn insert_basket_line(
        &self,
        basket_id: i64,
        line: &NewBasketLine,
        page_price: Money,
        tier_price: Option<Money>,
    ) -> Result<BasketLine, BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        let line = baskets::insert_line(basket_id, line, page_price, tier_price, &mut conn).await?;
        debug!("🧺️ Basket #{basket_id}: line {} added ({})", line.id, line.topic);
        Ok(line)
    }

    async fn update_basket_line(
        &self,
        line_id: i64,
        line: &NewBasketLine,
        page_price: Money,
        tier_price: Option<Money>,
    ) -> Result<BasketLine, BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::update_line(line_id, line, page_price, tier_price, &mut conn).await
    }

    async fn remove_basket_line(&self, basket_id: i64, line_id: i64) -> Result<(), BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::delete_line(basket_id, line_id, &mut conn).await
    }

    async fn clear_basket(&self, basket_id: i64) -> Result<(), BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::clear(basket_id, &mut conn).await
    }

    async fn attach_coupon(&self, basket_id: i64, coupon_id: i64) -> Result<(), BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::set_coupon(basket_id, Some(coupon_id), &mut conn).await
    }

    async fn detach_coupon(&self, basket_id: i64) -> Result<(), BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::set_coupon(basket_id, None, &mut conn).await
    }

    async fn add_line_attachment(
        &self,
        line_id: i64,
        storage_key: &str,
        comment: Option<&str>,
    ) -> Result<BasketLineAttachment, BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::insert_attachment(line_id, storage_key, comment, &mut conn).await
    }

    async fn fetch_line_attachments(&self, line_id: i64) -> Result<Vec<BasketLineAttachment>, BasketApiError> {
        let mut conn = self.pool.acquire().await?;
        baskets::fetch_attachments(line_id, &mut conn).await
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn checkout_basket(&self, customer_id: &str) -> Result<CheckoutResult, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let basket = baskets::fetch(customer_id, &mut tx)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))?
            .ok_or_else(|| PaymentGatewayError::BasketNotFound(customer_id.to_string()))?;
        let lines = baskets::fetch_checkout_lines(basket.id, &mut tx)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))?;
        if lines.is_empty() {
            return Err(PaymentGatewayError::EmptyBasket);
        }
        let now = Utc::now();
        let order = orders::insert_order(customer_id, now, &mut tx).await?;
        // An expired coupon at checkout time is silently dropped: no snapshot, no error.
        if let Some(coupon_id) = basket.coupon_id {
            let coupon = coupons::fetch_by_id(coupon_id, &mut tx)
                .await
                .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))?;
            if let Some(coupon) = coupon.filter(|c| !c.is_expired()) {
                let subtotal: Money = lines.iter().map(|l| l.total()).sum();
                let discount = coupon.discount_on(subtotal);
                orders::insert_order_coupon(order.id, &coupon.code, discount, &mut tx).await?;
                debug!("📦️ Order {}: snapshotted coupon {} worth {discount}", order.id, coupon.code);
            }
        }
        let mut order_lines = Vec::with_capacity(lines.len());
        for line in &lines {
            let new_line = NewOrderLine {
                topic: line.topic.clone(),
                service_type: line.service_type_name.clone(),
                turnaround: line.turnaround_label(),
                level: line.level_name.clone(),
                tier: line.tier_name.clone(),
                pages: line.pages,
                references: line.references,
                comment: line.comment.clone(),
                quantity: line.quantity,
                page_price: line.page_price,
                tier_price: line.tier_price,
                due_date: now + line.turnaround_duration(),
            };
            let order_line = orders::insert_order_line(order.id, new_line, &mut tx).await?;
            let attachments = baskets::fetch_attachments(line.id, &mut tx)
                .await
                .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))?;
            for attachment in attachments {
                orders::insert_order_line_attachment(
                    order_line.id,
                    &attachment.storage_key,
                    attachment.comment.as_deref(),
                    &mut tx,
                )
                .await?;
            }
            order_lines.push(order_line);
        }
        // Baskets are single-use; the cascade removes lines and attachment rows with it.
        baskets::delete_basket(basket.id, &mut tx)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))?;
        tx.commit().await?;
        debug!("📦️ Basket of {customer_id} converted into order {} with {} lines", order.id, order_lines.len());
        Ok(CheckoutResult { order, lines: order_lines })
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn fetch_order_lines(&self, id: OrderId) -> Result<Vec<OrderLine>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_lines(id, &mut conn).await
    }

    async fn fetch_order_coupon(&self, id: OrderId) -> Result<Option<OrderCoupon>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_coupon(id, &mut conn).await
    }

    async fn fetch_order_line_attachments(
        &self,
        line_id: i64,
    ) -> Result<Vec<OrderLineAttachment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_line_attachments(line_id, &mut conn).await
    }

    async fn fetch_payments_for_order(&self, id: OrderId) -> Result<Vec<PaymentRecord>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_for_target(&LedgerTarget::Order(id), &mut conn).await
    }

    async fn amount_payable(&self, id: OrderId) -> Result<Money, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::amount_payable(id, &mut conn).await
    }

    async fn apply_payment(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<PaymentApplied, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(id, &mut tx).await?.ok_or(PaymentGatewayError::OrderNotFound(id))?;
        let target = LedgerTarget::Order(id);
        match payments::insert_record(&target, txid.as_deref(), amount, PaymentStatus::Completed, gateway, paid_at, &mut tx)
            .await
        {
            Ok(_) => {},
            Err(PaymentGatewayError::PaymentAlreadyExists(txid)) => {
                debug!("💳️ Payment {txid} for order {id} was already recorded. Nothing to do.");
                return Ok(PaymentApplied { order, duplicate: true, newly_paid: false });
            },
            Err(e) => return Err(e),
        }
        // Due dates float until the payment clock starts: shift by the wall-clock time the order spent
        // unpaid, then start the still-pending lines.
        let elapsed = paid_at - order.created_at;
        orders::start_pending_lines(id, elapsed, &mut tx).await?;
        let records = payments::fetch_for_target(&target, &mut tx).await?;
        let payable = orders::amount_payable(id, &mut tx).await?;
        let balance = ledger::balance(payable, &records);
        let mut newly_paid = false;
        let order = if balance.is_zero() && order.status != OrderStatusType::Paid {
            newly_paid = true;
            orders::update_order_status(id, OrderStatusType::Paid, &mut tx).await?
        } else {
            order
        };
        tx.commit().await?;
        debug!("💳️ Payment of {amount} applied to order {id}. Balance is now {balance}.");
        Ok(PaymentApplied { order, duplicate: false, newly_paid })
    }

    async fn apply_refund(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<RefundApplied, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(id, &mut tx).await?.ok_or(PaymentGatewayError::OrderNotFound(id))?;
        let target = LedgerTarget::Order(id);
        match payments::insert_record(&target, txid.as_deref(), amount, PaymentStatus::Refunded, gateway, paid_at, &mut tx)
            .await
        {
            Ok(_) => {},
            Err(PaymentGatewayError::PaymentAlreadyExists(txid)) => {
                debug!("💳️ Refund {txid} for order {id} was already recorded. Nothing to do.");
                return Ok(RefundApplied { order, duplicate: true });
            },
            Err(e) => return Err(e),
        }
        // Any refund, even a partial one, voids the whole order.
        let order = orders::update_order_status(id, OrderStatusType::Refunded, &mut tx).await?;
        let voided = orders::void_all_lines(id, &mut tx).await?;
        tx.commit().await?;
        debug!("💳️ Refund of {amount} applied to order {id}. {voided} lines voided.");
        Ok(RefundApplied { order, duplicate: false })
    }

    async fn apply_decline(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<DeclineRecorded, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        orders::fetch_order(id, &mut tx).await?.ok_or(PaymentGatewayError::OrderNotFound(id))?;
        let target = LedgerTarget::Order(id);
        let result = match payments::insert_record(
            &target,
            txid.as_deref(),
            amount,
            PaymentStatus::Declined,
            gateway,
            paid_at,
            &mut tx,
        )
        .await
        {
            Ok(record) => DeclineRecorded { duplicate: false, record: Some(record) },
            Err(PaymentGatewayError::PaymentAlreadyExists(_)) => DeclineRecorded { duplicate: true, record: None },
            Err(e) => return Err(e),
        };
        tx.commit().await?;
        debug!("💳️ Decline of {amount} recorded for order {id}.");
        Ok(result)
    }
}

impl SubscriptionManagement for SqliteDatabase {
    async fn activate_subscription(&self, sub: NewSubscription) -> Result<SubscriptionActivation, SubscriptionApiError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let result = match subscriptions::fetch_link(&sub.external_subscription_id, &mut tx).await? {
            Some(link) => {
                subscriptions::update_billing(link.subscription_id, sub.next_billing_time, None, &mut tx).await?;
                let subscription =
                    subscriptions::set_status(link.subscription_id, SubscriptionStatus::Active, &mut tx).await?;
                let retired = subscriptions::retire_active_except(Some(link.subscription_id), now, &mut tx).await?;
                SubscriptionActivation { subscription, link, created: false, retired }
            },
            None => {
                let retired = subscriptions::retire_active_except(None, now, &mut tx).await?;
                let subscription = subscriptions::insert_subscription(&sub, &mut tx).await?;
                let link = subscriptions::insert_link(subscription.id, &sub, &mut tx).await?;
                SubscriptionActivation { subscription, link, created: true, retired }
            },
        };
        tx.commit().await?;
        info!(
            "🔁️ Subscription {} is active (created: {}, retired {} others)",
            result.link.external_subscription_id,
            result.created,
            result.retired.len()
        );
        Ok(result)
    }

    async fn suspend_subscription(&self, external_id: &str) -> Result<Option<Subscription>, SubscriptionApiError> {
        let mut tx = self.pool.begin().await?;
        let result = match subscriptions::fetch_link(external_id, &mut tx).await? {
            Some(link) => {
                Some(subscriptions::set_status(link.subscription_id, SubscriptionStatus::Suspended, &mut tx).await?)
            },
            None => None,
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn cancel_subscription(
        &self,
        external_id: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Option<Subscription>, SubscriptionApiError> {
        let mut tx = self.pool.begin().await?;
        let result = match subscriptions::fetch_link(external_id, &mut tx).await? {
            Some(link) => Some(subscriptions::set_cancelled(link.subscription_id, cancelled_at, &mut tx).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn record_subscription_sale(
        &self,
        external_id: &str,
        amount: Money,
        paid_at: DateTime<Utc>,
        txid: Option<String>,
        gateway: Gateway,
    ) -> Result<SaleRecorded, SubscriptionApiError> {
        let mut tx = self.pool.begin().await?;
        let link = subscriptions::fetch_link(external_id, &mut tx)
            .await?
            .ok_or_else(|| SubscriptionApiError::LinkNotFound(external_id.to_string()))?;
        let target = LedgerTarget::Subscription(link.id);
        let result = match payments::insert_record(
            &target,
            txid.as_deref(),
            amount,
            PaymentStatus::Completed,
            gateway,
            paid_at,
            &mut tx,
        )
        .await
        {
            Ok(record) => SaleRecorded { duplicate: false, record: Some(record) },
            Err(PaymentGatewayError::PaymentAlreadyExists(_)) => SaleRecorded { duplicate: true, record: None },
            Err(e) => return Err(SubscriptionApiError::DatabaseError(e.to_string())),
        };
        tx.commit().await?;
        debug!("🔁️ Sale of {amount} recorded for subscription {external_id}");
        Ok(result)
    }

    async fn update_billing_state(
        &self,
        external_id: &str,
        next_billing_time: DateTime<Utc>,
        is_on_trial: bool,
    ) -> Result<Option<Subscription>, SubscriptionApiError> {
        let mut tx = self.pool.begin().await?;
        let result = match subscriptions::fetch_link(external_id, &mut tx).await? {
            Some(link) => Some(
                subscriptions::update_billing(link.subscription_id, next_billing_time, Some(is_on_trial), &mut tx)
                    .await?,
            ),
            None => None,
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_active_subscription(&self) -> Result<Option<Subscription>, SubscriptionApiError> {
        let mut conn = self.pool.acquire().await?;
        subscriptions::fetch_active(&mut conn).await
    }

    async fn fetch_gateway_link(&self, external_id: &str) -> Result<Option<GatewayLink>, SubscriptionApiError> {
        let mut conn = self.pool.acquire().await?;
        subscriptions::fetch_link(external_id, &mut conn).await
    }

    async fn fetch_link_for_subscription(
        &self,
        subscription_id: i64,
    ) -> Result<Option<GatewayLink>, SubscriptionApiError> {
        let mut conn = self.pool.acquire().await?;
        subscriptions::fetch_link_for_subscription(subscription_id, &mut conn).await
    }

    async fn fetch_subscription_payments(&self) -> Result<Vec<PaymentRecord>, SubscriptionApiError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_subscription_records(&mut conn).await.map_err(|e| SubscriptionApiError::DatabaseError(e.to_string()))
    }
}
