//! Helpers for the PayPal webhook endpoints.

use actix_web::HttpRequest;
use atelier_billing_engine::db_types::OrderId;
use paypal_tools::{CaptureResource, WebhookHeaders};

use crate::errors::ServerError;

/// Pulls the five signature transmission headers off the request. A call without the full set cannot be
/// verified and is treated the same as a bad signature: a client error, with no ledger mutation.
pub fn extract_webhook_headers(req: &HttpRequest) -> Result<WebhookHeaders, ServerError> {
    let header = |name: &str| -> Result<String, ServerError> {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .ok_or(ServerError::InvalidSignature)
    };
    Ok(WebhookHeaders {
        transmission_id: header("paypal-transmission-id")?,
        transmission_time: header("paypal-transmission-time")?,
        transmission_sig: header("paypal-transmission-sig")?,
        cert_url: header("paypal-cert-url")?,
        auth_algo: header("paypal-auth-algo")?,
    })
}

/// The order id a capture event refers to, carried in the `custom_id` the storefront set at checkout.
pub fn order_id_for_capture(resource: &CaptureResource) -> Result<OrderId, ServerError> {
    let custom_id = resource
        .custom_id
        .as_deref()
        .ok_or_else(|| ServerError::MalformedPayload("webhook data does not contain custom_id".to_string()))?;
    custom_id
        .parse()
        .map_err(|_| ServerError::MalformedPayload(format!("custom_id {custom_id} is not an order id")))
}
