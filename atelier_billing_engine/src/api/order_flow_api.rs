use std::fmt::Debug;

use abg_common::Money;
use chrono::{DateTime, Utc};
use log::*;

use crate::{
    api::order_objects::OrderResult,
    db_types::{Gateway, OrderId, PaymentRecord},
    events::{EventProducers, OrderPaidEvent, OrderReceivedEvent},
    ledger,
    traits::{CheckoutResult, DeclineRecorded, PaymentApplied, PaymentGatewayDatabase, PaymentGatewayError, RefundApplied},
};

/// `OrderFlowApi` is the primary API for the order lifecycle: converting baskets into orders, and
/// reconciling payment gateway events into the ledger and order/line statuses.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Converts the customer's basket into a priced, immutable order in a single atomic transaction, then
    /// emits the order-received event. The event is published strictly after the commit and is
    /// fire-and-forget: notification failures never roll back or retry the checkout.
    pub async fn checkout(&self, customer_id: &str) -> Result<CheckoutResult, PaymentGatewayError> {
        let result = self.db.checkout_basket(customer_id).await?;
        info!("📦️ Order {} created for {customer_id} with {} lines", result.order.id, result.lines.len());
        for emitter in &self.producers.order_received_producer {
            let event = OrderReceivedEvent::new(result.order.clone(), result.lines.clone());
            emitter.publish_event(event).await;
        }
        Ok(result)
    }

    /// Applies a payment-succeeded gateway event.
    ///
    /// Redelivered events (same transaction reference) are no-op acknowledgements. When this payment
    /// settles the order in full, the order transitions to `Paid` and the order-paid event fires exactly
    /// once, after the transaction has committed.
    pub async fn payment_succeeded(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<PaymentApplied, PaymentGatewayError> {
        let result = self.db.apply_payment(id, amount, txid, paid_at, gateway).await?;
        if result.duplicate {
            info!("💳️ Duplicate payment event for order {id} acknowledged");
            return Ok(result);
        }
        if result.newly_paid {
            info!("💳️ Order {id} is now fully paid");
            for emitter in &self.producers.order_paid_producer {
                let event = OrderPaidEvent::new(result.order.clone());
                emitter.publish_event(event).await;
            }
        }
        Ok(result)
    }

    /// Applies a payment-refunded gateway event. The order is marked `Refunded` and every line voided,
    /// regardless of whether the refunded amount covers the full order.
    pub async fn payment_refunded(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<RefundApplied, PaymentGatewayError> {
        let result = self.db.apply_refund(id, amount, txid, paid_at, gateway).await?;
        if result.duplicate {
            info!("💳️ Duplicate refund event for order {id} acknowledged");
        } else {
            info!("💳️ Order {id} refunded ({amount}); all lines voided");
        }
        Ok(result)
    }

    /// Records a payment-declined gateway event in the ledger. Declines do not change any status.
    pub async fn payment_declined(
        &self,
        id: OrderId,
        amount: Money,
        txid: Option<String>,
        paid_at: DateTime<Utc>,
        gateway: Gateway,
    ) -> Result<DeclineRecorded, PaymentGatewayError> {
        let result = self.db.apply_decline(id, amount, txid, paid_at, gateway).await?;
        info!("💳️ Decline of {amount} recorded against order {id}");
        Ok(result)
    }

    /// The ledger records for an order, oldest first.
    pub async fn payments_for_order(&self, id: OrderId) -> Result<Vec<PaymentRecord>, PaymentGatewayError> {
        self.db.fetch_payments_for_order(id).await
    }

    /// The outstanding balance, derived from the ledger on every call.
    pub async fn balance(&self, id: OrderId) -> Result<Money, PaymentGatewayError> {
        let payable = self.db.amount_payable(id).await?;
        let records = self.db.fetch_payments_for_order(id).await?;
        Ok(ledger::balance(payable, &records))
    }

    /// The full external representation of an order: lines, snapshot coupon, derived amounts and balance.
    pub async fn order_summary(&self, id: OrderId) -> Result<Option<OrderResult>, PaymentGatewayError> {
        let Some(order) = self.db.fetch_order(id).await? else {
            return Ok(None);
        };
        let lines = self.db.fetch_order_lines(id).await?;
        let coupon = self.db.fetch_order_coupon(id).await?;
        let records = self.db.fetch_payments_for_order(id).await?;
        Ok(Some(OrderResult::assemble(order, lines, coupon, &records)))
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
