use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, Type};
use thiserror::Error;

pub use abg_common::Money;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(pub &'static str, pub String);

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub i64);

impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self).map_err(|_| ConversionError("order id", s.to_string()))
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// Awaiting payment. No line has a meaningful due date yet.
    Unpaid,
    /// The outstanding balance reached zero.
    Paid,
    /// A refund event was received. All lines are voided, even for partial refunds.
    Refunded,
    /// Reserved for admin flows; the reconciler never sets this itself.
    PartiallyRefunded,
    /// Reserved for admin flows; declines are recorded in the ledger, not acted on.
    Declined,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Unpaid => "Unpaid",
            OrderStatusType::Paid => "Paid",
            OrderStatusType::Refunded => "Refunded",
            OrderStatusType::PartiallyRefunded => "PartiallyRefunded",
            OrderStatusType::Declined => "Declined",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unpaid" => Ok(Self::Unpaid),
            "Paid" => Ok(Self::Paid),
            "Refunded" => Ok(Self::Refunded),
            "PartiallyRefunded" => Ok(Self::PartiallyRefunded),
            "Declined" => Ok(Self::Declined),
            other => Err(ConversionError("order status", other.to_string())),
        }
    }
}

//--------------------------------------  OrderLineStatusType  -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderLineStatusType {
    Pending,
    InProgress,
    Complete,
    Void,
}

impl Display for OrderLineStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderLineStatusType::Pending => "Pending",
            OrderLineStatusType::InProgress => "InProgress",
            OrderLineStatusType::Complete => "Complete",
            OrderLineStatusType::Void => "Void",
        };
        f.write_str(s)
    }
}

//--------------------------------------     PaymentStatus     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Refunded,
    PartiallyRefunded,
    Declined,
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Refunded => "Refunded",
            PaymentStatus::PartiallyRefunded => "PartiallyRefunded",
            PaymentStatus::Declined => "Declined",
            PaymentStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

//--------------------------------------        Gateway        -------------------------------------------------------
/// The integration a ledger record originated from. A closed enum rather than a free-form string, so that every
/// consumption site has to handle all providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum Gateway {
    Paypal,
    Twocheckout,
}

impl Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gateway::Paypal => f.write_str("Paypal"),
            Gateway::Twocheckout => f.write_str("Twocheckout"),
        }
    }
}

//--------------------------------------      LedgerTarget     -------------------------------------------------------
/// The entity a [`PaymentRecord`] settles against: a customer order, or the platform subscription's gateway link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerTarget {
    Order(OrderId),
    Subscription(i64),
}

impl LedgerTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerTarget::Order(_) => "Order",
            LedgerTarget::Subscription(_) => "Subscription",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            LedgerTarget::Order(oid) => oid.value(),
            LedgerTarget::Subscription(link_id) => *link_id,
        }
    }
}

impl Display for LedgerTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerTarget::Order(oid) => write!(f, "order {oid}"),
            LedgerTarget::Subscription(link_id) => write!(f, "subscription link #{link_id}"),
        }
    }
}

//--------------------------------------       Catalog         -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TurnaroundUnit {
    Hour,
    Day,
}

impl TurnaroundUnit {
    pub fn duration(&self, value: i64) -> Duration {
        match self {
            TurnaroundUnit::Hour => Duration::hours(value),
            TurnaroundUnit::Day => Duration::days(value),
        }
    }
}

impl Display for TurnaroundUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnaroundUnit::Hour => f.write_str("Hour"),
            TurnaroundUnit::Day => f.write_str("Day"),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Turnaround {
    pub id: i64,
    pub value: i64,
    pub unit: TurnaroundUnit,
}

impl Turnaround {
    /// Human-readable label, e.g. "3 Days". This is what gets snapshotted onto order lines.
    pub fn full_name(&self) -> String {
        turnaround_label(self.value, self.unit)
    }

    pub fn duration(&self) -> Duration {
        self.unit.duration(self.value)
    }
}

pub(crate) fn turnaround_label(value: i64, unit: TurnaroundUnit) -> String {
    let suffix = if value > 1 { "s" } else { "" };
    format!("{value} {unit}{suffix}")
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Level {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Tier {
    pub id: i64,
    pub name: String,
}

//--------------------------------------       RateRule        -------------------------------------------------------
/// A per-page price for a (service type, turnaround, level) scope. `level_id = None` is the wildcard scope,
/// which matches any level and always takes priority over level-specific rules.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RateRule {
    pub id: i64,
    pub service_type_id: i64,
    pub turnaround_id: i64,
    pub level_id: Option<i64>,
    pub amount_per_page: Money,
}

impl RateRule {
    pub fn is_wildcard(&self) -> bool {
        self.level_id.is_none()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TierSurcharge {
    pub id: i64,
    pub rate_rule_id: i64,
    pub tier_id: i64,
    /// None or zero means the tier is free for this rule.
    pub amount_per_page: Option<Money>,
}

impl TierSurcharge {
    pub fn surcharge_per_page(&self) -> Money {
        self.amount_per_page.unwrap_or_default()
    }
}

//--------------------------------------        Coupon         -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CouponKind {
    Regular,
    FirstTimer,
}

impl Display for CouponKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CouponKind::Regular => f.write_str("Regular"),
            CouponKind::FirstTimer => f.write_str("FirstTimer"),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Coupon {
    pub id: i64,
    pub code: String,
    pub kind: CouponKind,
    pub percent_off: i64,
    /// Minimum basket subtotal required for the coupon to qualify.
    pub minimum: Option<Money>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

impl Coupon {
    /// Expiry is derived from the validity window, never stored.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.end_date
    }

    pub fn discount_on(&self, amount: Money) -> Money {
        amount.percent(self.percent_off)
    }
}

/// Input for creating a coupon. With `code = None` a random 8-character code is generated.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: Option<String>,
    pub kind: CouponKind,
    pub percent_off: i64,
    pub minimum: Option<Money>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

//--------------------------------------        Basket         -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Basket {
    pub id: i64,
    pub customer_id: String,
    pub coupon_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BasketLine {
    pub id: i64,
    pub basket_id: i64,
    pub topic: String,
    pub service_type_id: i64,
    pub turnaround_id: i64,
    pub level_id: Option<i64>,
    pub tier_id: Option<i64>,
    pub pages: i64,
    #[sqlx(rename = "reference_count")]
    pub references: Option<i64>,
    pub comment: Option<String>,
    pub quantity: i64,
    pub page_price: Money,
    pub tier_price: Option<Money>,
}

impl BasketLine {
    /// Unit price: all pages at the page rate, plus the tier surcharge per page if one applies.
    pub fn price(&self) -> Money {
        line_price(self.pages, self.page_price, self.tier_price)
    }

    pub fn total(&self) -> Money {
        self.price() * self.quantity
    }
}

pub(crate) fn line_price(pages: i64, page_price: Money, tier_price: Option<Money>) -> Money {
    let mut price = page_price * pages;
    if let Some(tier) = tier_price {
        price = price + tier * pages;
    }
    price
}

/// A basket line as submitted by the customer. Prices are resolved by the engine, never taken from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBasketLine {
    pub topic: String,
    pub service_type_id: i64,
    pub turnaround_id: i64,
    pub level_id: Option<i64>,
    pub tier_id: Option<i64>,
    pub pages: i64,
    pub references: Option<i64>,
    pub comment: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BasketLineAttachment {
    pub id: i64,
    pub basket_line_id: i64,
    pub storage_key: String,
    pub comment: Option<String>,
}

/// A basket line joined with the catalog display attributes needed to snapshot it onto an order.
#[derive(Debug, Clone, FromRow)]
pub struct CheckoutLine {
    pub id: i64,
    pub topic: String,
    pub pages: i64,
    #[sqlx(rename = "reference_count")]
    pub references: Option<i64>,
    pub comment: Option<String>,
    pub quantity: i64,
    pub page_price: Money,
    pub tier_price: Option<Money>,
    pub service_type_name: String,
    pub turnaround_value: i64,
    pub turnaround_unit: TurnaroundUnit,
    pub level_name: Option<String>,
    pub tier_name: Option<String>,
}

impl CheckoutLine {
    pub fn turnaround_duration(&self) -> Duration {
        self.turnaround_unit.duration(self.turnaround_value)
    }

    pub fn turnaround_label(&self) -> String {
        turnaround_label(self.turnaround_value, self.turnaround_unit)
    }

    pub fn total(&self) -> Money {
        line_price(self.pages, self.page_price, self.tier_price) * self.quantity
    }
}

//--------------------------------------         Order         -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: String,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: OrderId,
    pub topic: String,
    pub service_type: String,
    pub turnaround: String,
    pub level: Option<String>,
    pub tier: Option<String>,
    pub pages: i64,
    #[sqlx(rename = "reference_count")]
    pub references: Option<i64>,
    pub comment: Option<String>,
    pub quantity: i64,
    pub page_price: Money,
    pub tier_price: Option<Money>,
    pub due_date: DateTime<Utc>,
    pub status: OrderLineStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderLine {
    pub fn price(&self) -> Money {
        line_price(self.pages, self.page_price, self.tier_price)
    }

    pub fn total(&self) -> Money {
        self.price() * self.quantity
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, OrderLineStatusType::Pending | OrderLineStatusType::InProgress)
    }
}

/// The fully-textual snapshot written at checkout time.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
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
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderCoupon {
    pub order_id: OrderId,
    pub code: String,
    pub discount: Money,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderLineAttachment {
    pub id: i64,
    pub order_line_id: i64,
    pub storage_key: String,
    pub comment: Option<String>,
}

//--------------------------------------     PaymentRecord     -------------------------------------------------------
/// One entry in the payment ledger. Balances are always derived from the record stream and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub target: LedgerTarget,
    /// Gateway transaction reference used as idempotency key. At most one record may exist per
    /// (target, non-null txid).
    pub txid: Option<String>,
    pub amount: Money,
    pub status: PaymentStatus,
    pub gateway: Gateway,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlite")]
impl<'r> FromRow<'r, sqlx::sqlite::SqliteRow> for PaymentRecord {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("target_kind")?;
        let target_id: i64 = row.try_get("target_id")?;
        let target = match kind.as_str() {
            "Order" => LedgerTarget::Order(OrderId(target_id)),
            "Subscription" => LedgerTarget::Subscription(target_id),
            other => {
                return Err(sqlx::Error::Decode(Box::new(ConversionError("ledger target", other.to_string()))));
            },
        };
        Ok(Self {
            id: row.try_get("id")?,
            target,
            txid: row.try_get("txid")?,
            amount: row.try_get("amount")?,
            status: row.try_get("status")?,
            gateway: row.try_get("gateway")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

//--------------------------------------     Subscription      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Cancelled,
    Retired,
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionStatus::Active => "Active",
            SubscriptionStatus::Suspended => "Suspended",
            SubscriptionStatus::Cancelled => "Cancelled",
            SubscriptionStatus::Retired => "Retired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub status: SubscriptionStatus,
    pub is_on_trial: bool,
    pub start_time: DateTime<Utc>,
    pub next_billing_time: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.next_billing_time
    }
}

/// Binds the platform subscription to the payment gateway's identifiers.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GatewayLink {
    pub id: i64,
    pub subscription_id: i64,
    pub external_subscription_id: String,
    pub plan_id: String,
    pub plan_name: Option<String>,
    pub amount: Option<Money>,
}

/// Everything the activation command needs to create a subscription and its gateway link.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub external_subscription_id: String,
    pub plan_id: String,
    pub plan_name: Option<String>,
    pub amount: Option<Money>,
    pub is_on_trial: bool,
    pub start_time: DateTime<Utc>,
    pub next_billing_time: DateTime<Utc>,
}
