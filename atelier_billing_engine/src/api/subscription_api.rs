use std::fmt::Debug;

use abg_common::Money;
use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{Gateway, GatewayLink, NewSubscription, PaymentRecord, Subscription},
    traits::{SaleRecorded, SubscriptionActivation, SubscriptionApiError, SubscriptionManagement},
};

/// `SubscriptionApi` reconciles the platform's own recurring-billing lifecycle from gateway events.
/// It is the same idempotent-ingestion pattern as order payments, applied to the subscription context.
pub struct SubscriptionApi<B> {
    db: B,
}

impl<B> Debug for SubscriptionApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubscriptionApi")
    }
}

impl<B> SubscriptionApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> SubscriptionApi<B>
where B: SubscriptionManagement
{
    /// Handles an `activated` event. Creating or re-activating a subscription retires every other active
    /// one in the same transaction, so the at-most-one-active invariant can never be observed broken.
    pub async fn activated(&self, sub: NewSubscription) -> Result<SubscriptionActivation, SubscriptionApiError> {
        self.db.activate_subscription(sub).await
    }

    /// Handles a `suspended` event. An unmatched external id is acknowledged, not an error: the
    /// subscription may belong to another execution scope.
    pub async fn suspended(&self, external_id: &str) -> Result<Option<Subscription>, SubscriptionApiError> {
        let result = self.db.suspend_subscription(external_id).await?;
        match &result {
            Some(sub) => info!("🔁️ Subscription #{} suspended", sub.id),
            None => debug!("🔁️ Suspend event for unknown subscription {external_id} acknowledged"),
        }
        Ok(result)
    }

    /// Handles a `cancelled` event, recording the gateway's event creation time as the cancellation time.
    pub async fn cancelled(
        &self,
        external_id: &str,
        cancelled_at: DateTime<Utc>,
    ) -> Result<Option<Subscription>, SubscriptionApiError> {
        let result = self.db.cancel_subscription(external_id, cancelled_at).await?;
        match &result {
            Some(sub) => info!("🔁️ Subscription #{} cancelled at {cancelled_at}", sub.id),
            None => debug!("🔁️ Cancel event for unknown subscription {external_id} acknowledged"),
        }
        Ok(result)
    }

    /// Handles a `sale-completed` event. [`SubscriptionApiError::LinkNotFound`] means the activation
    /// event has not landed yet; the caller converts it into a retry-able rejection so the gateway
    /// redelivers once ordering catches up.
    pub async fn sale_completed(
        &self,
        external_id: &str,
        amount: Money,
        paid_at: DateTime<Utc>,
        txid: Option<String>,
        gateway: Gateway,
    ) -> Result<SaleRecorded, SubscriptionApiError> {
        self.db.record_subscription_sale(external_id, amount, paid_at, txid, gateway).await
    }

    /// Applies the authoritative state fetched from the gateway after an `updated` event. The fetch
    /// itself (token exchange + signed GET) happens upstream; by the time this is called the payload is
    /// complete and trusted.
    pub async fn updated(
        &self,
        external_id: &str,
        next_billing_time: DateTime<Utc>,
        is_on_trial: bool,
    ) -> Result<Option<Subscription>, SubscriptionApiError> {
        self.db.update_billing_state(external_id, next_billing_time, is_on_trial).await
    }

    pub async fn active_subscription(&self) -> Result<Option<Subscription>, SubscriptionApiError> {
        self.db.fetch_active_subscription().await
    }

    pub async fn link_for_active_subscription(&self) -> Result<Option<GatewayLink>, SubscriptionApiError> {
        match self.db.fetch_active_subscription().await? {
            Some(sub) => self.db.fetch_link_for_subscription(sub.id).await,
            None => Ok(None),
        }
    }

    /// The platform's billing history, newest first.
    pub async fn billing_history(&self) -> Result<Vec<PaymentRecord>, SubscriptionApiError> {
        self.db.fetch_subscription_payments().await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
