//! External representations of orders.
//!
//! These are the objects the HTTP layer serializes. The key difference from the raw db types is that line
//! due dates are hidden while the order is unpaid: due dates "float" until the payment clock starts, so an
//! unpaid order never shows a meaningful due date.

use abg_common::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, OrderCoupon, OrderId, OrderLine, OrderLineStatusType, OrderStatusType, PaymentRecord},
    ledger,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub id: OrderId,
    pub customer_id: String,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub coupon: Option<OrderCoupon>,
    pub original_amount_payable: Money,
    pub amount_payable: Money,
    pub total_paid: Money,
    pub balance: Money,
    /// The earliest due date among open lines; only meaningful (and only set) once the order is paid.
    pub earliest_due: Option<DateTime<Utc>>,
    pub is_complete: bool,
    pub lines: Vec<OrderLineResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineResult {
    pub id: i64,
    pub topic: String,
    pub service_type: String,
    pub turnaround: String,
    pub level: Option<String>,
    pub tier: Option<String>,
    pub pages: i64,
    pub references: Option<i64>,
    pub comment: Option<String>,
    pub quantity: i64,
    pub page_price: Money,
    pub tier_price: Option<Money>,
    pub price: Money,
    pub total: Money,
    /// `None` while the order is unpaid.
    pub due_date: Option<DateTime<Utc>>,
    pub status: OrderLineStatusType,
}

impl OrderResult {
    pub fn assemble(
        order: Order,
        lines: Vec<OrderLine>,
        coupon: Option<OrderCoupon>,
        records: &[PaymentRecord],
    ) -> Self {
        let original_amount_payable: Money = lines.iter().map(|l| l.total()).sum();
        let discount = coupon.as_ref().map(|c| c.discount).unwrap_or_default();
        let amount_payable = original_amount_payable - discount;
        let total_paid = ledger::net_paid(records);
        let balance = ledger::balance(amount_payable, records);
        let earliest_due = if order.status == OrderStatusType::Paid {
            lines.iter().filter(|l| l.is_open()).map(|l| l.due_date).min()
        } else {
            None
        };
        let is_complete = lines
            .iter()
            .all(|l| matches!(l.status, OrderLineStatusType::Complete | OrderLineStatusType::Void));
        let unpaid = order.status == OrderStatusType::Unpaid;
        let lines = lines
            .into_iter()
            .map(|l| OrderLineResult {
                id: l.id,
                price: l.price(),
                total: l.total(),
                due_date: if unpaid { None } else { Some(l.due_date) },
                topic: l.topic,
                service_type: l.service_type,
                turnaround: l.turnaround,
                level: l.level,
                tier: l.tier,
                pages: l.pages,
                references: l.references,
                comment: l.comment,
                quantity: l.quantity,
                page_price: l.page_price,
                tier_price: l.tier_price,
                status: l.status,
            })
            .collect();
        Self {
            id: order.id,
            customer_id: order.customer_id,
            status: order.status,
            created_at: order.created_at,
            coupon,
            original_amount_payable,
            amount_payable,
            total_paid,
            balance,
            earliest_due,
            is_complete,
            lines,
        }
    }
}
