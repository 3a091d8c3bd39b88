use crate::db_types::{GatewayLink, Order, OrderLine, PaymentRecord, Subscription};

/// The result of converting a basket into an order.
#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// Outcome of applying a payment-succeeded event to an order.
#[derive(Debug, Clone)]
pub struct PaymentApplied {
    pub order: Order,
    /// The event's transaction reference was already in the ledger; nothing was changed.
    pub duplicate: bool,
    /// The order transitioned to `Paid` as part of this application.
    pub newly_paid: bool,
}

/// Outcome of applying a payment-refunded event to an order.
#[derive(Debug, Clone)]
pub struct RefundApplied {
    pub order: Order,
    pub duplicate: bool,
}

/// Outcome of recording a payment-declined event.
#[derive(Debug, Clone)]
pub struct DeclineRecorded {
    pub duplicate: bool,
    pub record: Option<PaymentRecord>,
}

/// Outcome of recording a subscription sale.
#[derive(Debug, Clone)]
pub struct SaleRecorded {
    pub duplicate: bool,
    pub record: Option<PaymentRecord>,
}

/// Outcome of the subscription activation command.
#[derive(Debug, Clone)]
pub struct SubscriptionActivation {
    pub subscription: Subscription,
    pub link: GatewayLink,
    /// False when an existing link was refreshed instead of a new subscription being created.
    pub created: bool,
    /// Subscriptions that were forced to `Retired` to uphold the at-most-one-active invariant.
    pub retired: Vec<Subscription>,
}
