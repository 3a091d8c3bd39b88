use chrono::{DateTime, Utc};
use thiserror::Error;

use abg_common::Money;

use crate::{
    db_types::{Gateway, Order, OrderCoupon, OrderId, OrderLine, OrderLineAttachment, PaymentRecord},
    traits::data_objects::{CheckoutResult, DeclineRecorded, PaymentApplied, RefundApplied},
};

/// The order lifecycle and payment reconciliation contract.
///
/// Every mutating method is a single atomic transaction: a partially applied checkout or webhook event is
/// never observable, and concurrent events against the same order serialize at the database.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Converts the customer's basket into an order, atomically:
    /// * the order is created for the basket's owner;
    /// * an unexpired attached coupon is snapshotted (code + discount at checkout time); an expired one is
    ///   silently dropped;
    /// * every basket line becomes an order line with all catalog display attributes copied to plain
    ///   text/number fields and `due_date = now + turnaround duration`, status `Pending`;
    /// * line attachments are copied across;
    /// * the basket is deleted (baskets are single-use).
    ///
    /// Notification side effects are **not** part of the transaction; the API layer emits them after commit.
    async fn checkout_basket(&self, customer_id: &str) -> Result<CheckoutResult, PaymentGatewayError>;

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_order_lines(&self, id: OrderId) -> Result<Vec<OrderLine>, PaymentGatewayError>;

    async fn fetch_order_coupon(&self, id: OrderId) -> Result<Option<OrderCoupon>, PaymentGatewayError>;

    async fn fetch_order_line_attachments(&self, line_id: i64)
        -> Result<Vec<OrderLineAttachment>, PaymentGatewayError>;

    /// All ledger records for the order, oldest first.
    async fn fetch_payments_for_order(&self, id: OrderId) -> Result<Vec<PaymentRecord>, PaymentGatewayError>;

    /// The sum of line totals minus the snapshotted coupon discount.
    async fn amount_payable(&self, id: OrderId) -> Result<Money, PaymentGatewayError>;

    /// Applies a payment-succeeded event: appends a `Completed` ledger record, shifts the due date of every
    /// line still `Pending` by `paid_at - order.created_at` and moves it to `InProgress`, and transitions
    /// the order to `Paid` when the derived balance reaches zero.
    ///
    /// A transaction reference already present in the ledger makes the whole call a no-op
    /// (`duplicate = true`): redelivered events are acknowledged, not errors.
    async fn apply_payment(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<PaymentApplied, PaymentGatewayError>;

    /// Applies a payment-refunded event: appends a `Refunded` record for the refunded amount, transitions
    /// the order to `Refunded` and voids all of its lines, regardless of whether the refund was partial.
    async fn apply_refund(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<RefundApplied, PaymentGatewayError>;

    /// Records a payment-declined event in the ledger. Declines are recorded, not acted on: neither the
    /// order nor its lines change status.
    async fn apply_decline(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<DeclineRecorded, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    /// The event's target order is not (yet) visible. Webhook callers translate this into a retry-able
    /// rejection so the gateway redelivers once the prerequisite state exists.
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Customer {0} has no basket to check out")]
    BasketNotFound(String),
    #[error("The basket is empty")]
    EmptyBasket,
    #[error("A payment with transaction reference {0} already exists for this target")]
    PaymentAlreadyExists(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
