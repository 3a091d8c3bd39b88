use chrono::{DateTime, Utc};
use thiserror::Error;

use abg_common::Money;

use crate::{
    db_types::{Gateway, GatewayLink, NewSubscription, PaymentRecord, Subscription},
    traits::data_objects::{SaleRecorded, SubscriptionActivation},
};

/// Platform subscription billing: the same gateway-event reconciliation pattern as order payments,
/// applied to the platform's own recurring-billing lifecycle.
#[allow(async_fn_in_trait)]
pub trait SubscriptionManagement: Clone {
    /// The explicit activation command. In one transaction:
    /// * if a gateway link already exists for the external subscription id, its subscription is refreshed
    ///   (next billing time, status back to `Active`);
    /// * otherwise a new subscription and link are created;
    /// * in either case every *other* currently-`Active` subscription is forced to `Retired` with a retired
    ///   timestamp, so at most one subscription is ever active.
    async fn activate_subscription(&self, sub: NewSubscription) -> Result<SubscriptionActivation, SubscriptionApiError>;

    /// Suspends the subscription behind the external id. An unmatched link is not an error; `None` is
    /// returned and the caller acknowledges the event.
    async fn suspend_subscription(&self, external_id: &str) -> Result<Option<Subscription>, SubscriptionApiError>;

    /// Cancels the subscription behind the external id, recording when the gateway created the event.
    async fn cancel_subscription(
        &self,
        external_id: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Option<Subscription>, SubscriptionApiError>;

    /// Appends a `Completed` ledger record for a recurring billing sale. Requires the gateway link to
    /// exist already; [`SubscriptionApiError::LinkNotFound`] signals an ordering race that the gateway
    /// should retry after the activation event lands.
    async fn record_subscription_sale(
        &self,
        external_id: &str,
        amount: Money,
        paid_at: DateTime<Utc>,
        txid: Option<String>,
        gateway: Gateway,
    ) -> Result<SaleRecorded, SubscriptionApiError>;

    /// Applies the authoritative billing state fetched out-of-band after an `updated` event.
    async fn update_billing_state(
        &self,
        external_id: &str,
        next_billing_time: DateTime<Utc>,
        is_on_trial: bool,
    ) -> Result<Option<Subscription>, SubscriptionApiError>;

    async fn fetch_active_subscription(&self) -> Result<Option<Subscription>, SubscriptionApiError>;

    async fn fetch_gateway_link(&self, external_id: &str) -> Result<Option<GatewayLink>, SubscriptionApiError>;

    async fn fetch_link_for_subscription(
        &self,
        subscription_id: i64,
    ) -> Result<Option<GatewayLink>, SubscriptionApiError>;

    /// The platform's billing history: all subscription-targeted ledger records, newest first.
    async fn fetch_subscription_payments(&self) -> Result<Vec<PaymentRecord>, SubscriptionApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum SubscriptionApiError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    /// The activation event for this external subscription id has not arrived yet.
    #[error("No gateway link exists for external subscription {0}")]
    LinkNotFound(String),
    #[error("A sale with transaction reference {0} already exists for this subscription")]
    SaleAlreadyExists(String),
}

impl From<sqlx::Error> for SubscriptionApiError {
    fn from(e: sqlx::Error) -> Self {
        SubscriptionApiError::DatabaseError(e.to_string())
    }
}
