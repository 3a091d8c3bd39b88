//! PayPal webhook ingestion.
//!
//! Both endpoints follow the same contract: verify the transmission signature before any domain logic
//! runs, translate referential misses into retry-able rejections, and acknowledge everything else —
//! duplicate deliveries and unrecognized event types included — so the delivery queue never wedges.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::*;
use serde_json::Value;

use atelier_billing_engine::{
    db_types::{Gateway, NewSubscription},
    traits::{PaymentGatewayDatabase, SubscriptionManagement},
    OrderFlowApi,
    SubscriptionApi,
};
use paypal_tools::{
    is_on_trial,
    CaptureResource,
    PaypalApi,
    PaypalEventType,
    SaleResource,
    SubscriptionResource,
    WebhookEnvelope,
};

use crate::{
    data_objects::JsonResponse,
    errors::ServerError,
    integrations::paypal::{extract_webhook_headers, order_id_for_capture},
};

/// POST handler for the order-payments webhook.
pub async fn paypal_payments_webhook<B: PaymentGatewayDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
    paypal: web::Data<PaypalApi>,
) -> Result<HttpResponse, ServerError> {
    trace!("🅿️ Received payment webhook request: {}", req.uri());
    let webhook_id = paypal
        .config()
        .webhook_id
        .clone()
        .ok_or_else(|| ServerError::ConfigurationError("Missing PayPal webhook id".to_string()))?;
    let envelope = verified_envelope(&req, &body, &paypal, &webhook_id).await?;
    match envelope.event() {
        PaypalEventType::PaymentCaptureCompleted => {
            let capture = capture_resource(&envelope)?;
            let order_id = order_id_for_capture(&capture)?;
            let amount = capture
                .amount
                .as_ref()
                .ok_or_else(|| ServerError::MalformedPayload("capture carries no amount".to_string()))?
                .amount()?;
            let result = api
                .payment_succeeded(order_id, amount, Some(capture.id.clone()), capture.create_time, Gateway::Paypal)
                .await?;
            let message = if result.duplicate { "Payment already recorded." } else { "Payment recorded." };
            Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
        },
        PaypalEventType::PaymentCaptureRefunded => {
            let capture = capture_resource(&envelope)?;
            let order_id = order_id_for_capture(&capture)?;
            let refunded = capture
                .seller_payable_breakdown
                .as_ref()
                .ok_or_else(|| ServerError::MalformedPayload("refund carries no payable breakdown".to_string()))?
                .total_refunded_amount
                .amount()?;
            api.payment_refunded(order_id, refunded, Some(capture.id.clone()), capture.create_time, Gateway::Paypal)
                .await?;
            Ok(HttpResponse::Ok().json(JsonResponse::success("Refund recorded.")))
        },
        PaypalEventType::PaymentCaptureDenied => {
            let capture = capture_resource(&envelope)?;
            let order_id = order_id_for_capture(&capture)?;
            let amount = capture
                .amount
                .as_ref()
                .ok_or_else(|| ServerError::MalformedPayload("capture carries no amount".to_string()))?
                .amount()?;
            api.payment_declined(order_id, amount, Some(capture.id.clone()), capture.create_time, Gateway::Paypal)
                .await?;
            Ok(HttpResponse::Ok().json(JsonResponse::success("Decline recorded.")))
        },
        other => {
            // Never let an unrecognized event type block the delivery queue.
            debug!("🅿️ Acknowledging unhandled payment event {other:?}");
            Ok(HttpResponse::Ok().json(JsonResponse::success("Event acknowledged.")))
        },
    }
}

/// POST handler for the platform subscription webhook.
pub async fn paypal_subscription_webhook<B: SubscriptionManagement>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<SubscriptionApi<B>>,
    paypal: web::Data<PaypalApi>,
) -> Result<HttpResponse, ServerError> {
    trace!("🅿️ Received subscription webhook request: {}", req.uri());
    let webhook_id = paypal
        .config()
        .subscription_webhook_id
        .clone()
        .ok_or_else(|| ServerError::ConfigurationError("Missing PayPal subscription webhook id".to_string()))?;
    let envelope = verified_envelope(&req, &body, &paypal, &webhook_id).await?;
    match envelope.event() {
        PaypalEventType::SubscriptionActivated => {
            let resource = subscription_resource(&envelope)?;
            let billing = resource
                .billing_info
                .as_ref()
                .ok_or_else(|| ServerError::MalformedPayload("activation carries no billing_info".to_string()))?;
            let sub = NewSubscription {
                external_subscription_id: resource.id.clone(),
                plan_id: resource.plan_id.clone().unwrap_or_default(),
                plan_name: None,
                amount: None,
                is_on_trial: is_on_trial(&billing.cycle_executions),
                start_time: resource.start_time.unwrap_or_else(Utc::now),
                next_billing_time: billing.next_billing_time,
            };
            api.activated(sub).await?;
            Ok(HttpResponse::Ok().json(JsonResponse::success("Subscription activated.")))
        },
        PaypalEventType::SubscriptionSuspended => {
            let resource = subscription_resource(&envelope)?;
            // An unmatched link is acknowledged: the subscription may belong to another context.
            api.suspended(&resource.id).await?;
            Ok(HttpResponse::Ok().json(JsonResponse::success("Subscription suspended.")))
        },
        PaypalEventType::SubscriptionCancelled => {
            let resource = subscription_resource(&envelope)?;
            let cancelled_at = envelope.create_time.unwrap_or_else(Utc::now);
            api.cancelled(&resource.id, cancelled_at).await?;
            Ok(HttpResponse::Ok().json(JsonResponse::success("Subscription cancelled.")))
        },
        PaypalEventType::SaleCompleted => {
            let sale: SaleResource = serde_json::from_value(envelope.resource.clone())
                .map_err(|e| ServerError::MalformedPayload(e.to_string()))?;
            let external_id = sale
                .billing_agreement_id
                .as_deref()
                .ok_or_else(|| ServerError::MalformedPayload("sale carries no billing_agreement_id".to_string()))?;
            let amount = sale.amount.amount()?;
            // LinkNotFound maps to a retry-able rejection: the activation event has to land first.
            api.sale_completed(external_id, amount, sale.create_time, Some(sale.id.clone()), Gateway::Paypal).await?;
            Ok(HttpResponse::Ok().json(JsonResponse::success("Sale recorded.")))
        },
        PaypalEventType::SubscriptionUpdated => {
            let resource = subscription_resource(&envelope)?;
            // The updated payload is partial; fetch the authoritative resource before applying anything.
            // A token-exchange or fetch failure is fatal to this event, distinct from signature failure.
            let authoritative = paypal.fetch_subscription(&resource.id).await?;
            if let Some(billing) = authoritative.billing_info {
                api.updated(&resource.id, billing.next_billing_time, is_on_trial(&billing.cycle_executions)).await?;
            } else {
                warn!("🅿️ Subscription {} fetch returned no billing info; nothing applied", resource.id);
            }
            Ok(HttpResponse::Ok().json(JsonResponse::success("Subscription updated.")))
        },
        other => {
            debug!("🅿️ Acknowledging unhandled subscription event {other:?}");
            Ok(HttpResponse::Ok().json(JsonResponse::success("Event acknowledged.")))
        },
    }
}

/// Verifies the transmission signature and deserializes the envelope. No domain logic may run before
/// this returns successfully.
async fn verified_envelope(
    req: &HttpRequest,
    body: &web::Bytes,
    paypal: &PaypalApi,
    webhook_id: &str,
) -> Result<WebhookEnvelope, ServerError> {
    let headers = extract_webhook_headers(req)?;
    let event: Value = serde_json::from_slice(body).map_err(|e| ServerError::MalformedPayload(e.to_string()))?;
    if !paypal.verify_webhook_signature(webhook_id, &headers, &event).await? {
        warn!("🅿️ Webhook signature verification failed; rejecting call");
        return Err(ServerError::InvalidSignature);
    }
    serde_json::from_value(event).map_err(|e| ServerError::MalformedPayload(e.to_string()))
}

fn capture_resource(envelope: &WebhookEnvelope) -> Result<CaptureResource, ServerError> {
    serde_json::from_value(envelope.resource.clone()).map_err(|e| ServerError::MalformedPayload(e.to_string()))
}

fn subscription_resource(envelope: &WebhookEnvelope) -> Result<SubscriptionResource, ServerError> {
    serde_json::from_value(envelope.resource.clone()).map_err(|e| ServerError::MalformedPayload(e.to_string()))
}
