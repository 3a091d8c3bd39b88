//! 2Checkout INS webhook ingestion.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::*;

use atelier_billing_engine::{db_types::Gateway, traits::PaymentGatewayDatabase, OrderFlowApi};

use crate::{
    config::TwocheckoutConfig,
    data_objects::JsonResponse,
    errors::ServerError,
    integrations::twocheckout::{InsNotification, TwocheckoutMessageType},
};

/// POST handler for 2Checkout INS messages.
///
/// The hash is checked before any domain logic; `ORDER_CREATED` maps to a payment-succeeded event, and
/// every other message type is acknowledged untouched.
pub async fn twocheckout_webhook<B: PaymentGatewayDatabase>(
    form: web::Form<InsNotification>,
    api: web::Data<OrderFlowApi<B>>,
    config: web::Data<TwocheckoutConfig>,
) -> Result<HttpResponse, ServerError> {
    let notification = form.into_inner();
    if !config.is_configured() {
        error!("2️⃣ 2Checkout secret is not configured; cannot verify notification");
        return Err(ServerError::ConfigurationError("Missing 2Checkout secret".to_string()));
    }
    if !notification.check_hash(config.secret.reveal()) {
        warn!("2️⃣ INS hash mismatch for sale {}; rejecting call", notification.sale_id);
        return Err(ServerError::InvalidSignature);
    }
    match notification.message_type() {
        TwocheckoutMessageType::OrderCreated => {
            let order_id = notification
                .vendor_order_id
                .as_deref()
                .ok_or_else(|| ServerError::MalformedPayload("param vendor_order_id is not set".to_string()))?
                .parse()
                .map_err(|_| ServerError::MalformedPayload("vendor_order_id is not an order id".to_string()))?;
            let amount = notification
                .amount()
                .ok_or_else(|| ServerError::MalformedPayload("invoice_list_amount is missing or invalid".to_string()))?;
            let paid_at = notification.sale_date_utc().unwrap_or_else(Utc::now);
            let result = api
                .payment_succeeded(order_id, amount, Some(notification.sale_id.clone()), paid_at, Gateway::Twocheckout)
                .await?;
            let message = if result.duplicate { "Payment already recorded." } else { "Payment recorded." };
            Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
        },
        TwocheckoutMessageType::Other(kind) => {
            debug!("2️⃣ Acknowledging unhandled INS message type {kind}");
            Ok(HttpResponse::Ok().json(JsonResponse::success("Notification acknowledged.")))
        },
    }
}
