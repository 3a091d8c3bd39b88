//! Request handler definitions for the customer-facing surface.
//!
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and
//! tidy 🙏
//!
//! Identity and session authentication are external collaborators; the customer id in the path is
//! whatever the fronting auth layer resolved. Handlers are generic over the backend traits and get their
//! concrete types at registration in [`crate::server`].

use actix_web::{get, web, HttpResponse, Responder};
use log::*;

use atelier_billing_engine::{
    db_types::OrderId,
    traits::{BasketManagement, CatalogManagement, PaymentGatewayDatabase, SubscriptionManagement},
    BasketApi,
    OrderFlowApi,
    SubscriptionApi,
};
use paypal_tools::PaypalApi;

use crate::{
    data_objects::{ApplyCouponRequest, AttachmentRequest, JsonResponse, UpsertLineRequest},
    errors::ServerError,
};

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Basket  ----------------------------------------------------
/// GET the basket with computed subtotal/discount/total and the best-match coupon hint.
pub async fn get_basket<B: BasketManagement + CatalogManagement>(
    path: web::Path<String>,
    api: web::Data<BasketApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = path.into_inner();
    debug!("💻️ GET basket for {customer_id}");
    let summary = api.summary(&customer_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// POST a line: add when no `line_id` is given, update otherwise. Prices are resolved and captured now.
pub async fn upsert_basket_line<B: BasketManagement + CatalogManagement>(
    path: web::Path<String>,
    body: web::Json<UpsertLineRequest>,
    api: web::Data<BasketApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = path.into_inner();
    let request = body.into_inner();
    debug!("💻️ POST basket line for {customer_id}");
    let line = api.add_or_update_line(&customer_id, request.line_id, request.line).await?;
    Ok(HttpResponse::Ok().json(line))
}

pub async fn remove_basket_line<B: BasketManagement + CatalogManagement>(
    path: web::Path<(String, i64)>,
    api: web::Data<BasketApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (customer_id, line_id) = path.into_inner();
    debug!("💻️ DELETE basket line {line_id} for {customer_id}");
    api.remove_line(&customer_id, line_id).await?;
    let summary = api.summary(&customer_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn clear_basket<B: BasketManagement + CatalogManagement>(
    path: web::Path<String>,
    api: web::Data<BasketApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = path.into_inner();
    debug!("💻️ POST clear basket for {customer_id}");
    api.clear(&customer_id).await?;
    let summary = api.summary(&customer_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn apply_coupon<B: BasketManagement + CatalogManagement>(
    path: web::Path<String>,
    body: web::Json<ApplyCouponRequest>,
    api: web::Data<BasketApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = path.into_inner();
    let request = body.into_inner();
    debug!("💻️ POST apply coupon {} for {customer_id}", request.coupon_code);
    let (coupon, discount) = api.apply_coupon(&customer_id, &request.coupon_code).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "code": coupon.code, "discount": discount })))
}

/// POST an attachment record for a line. The blob is uploaded to the external attachment store by the
/// fronting layer; only the storage key lands here.
pub async fn add_line_attachment<B: BasketManagement + CatalogManagement>(
    path: web::Path<(String, i64)>,
    body: web::Json<AttachmentRequest>,
    api: web::Data<BasketApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let (customer_id, line_id) = path.into_inner();
    let request = body.into_inner();
    let attachment =
        api.add_line_attachment(&customer_id, line_id, &request.storage_key, request.comment.as_deref()).await?;
    Ok(HttpResponse::Ok().json(attachment))
}

//----------------------------------------------   Checkout  ----------------------------------------------------
/// POST checkout: converts the basket into an order atomically and returns the full order representation.
pub async fn checkout<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = path.into_inner();
    debug!("💻️ POST checkout for {customer_id}");
    let result = api.checkout(&customer_id).await?;
    let summary = api.order_summary(result.order.id).await?;
    match summary {
        Some(summary) => Ok(HttpResponse::Created().json(summary)),
        None => Err(ServerError::BackendError(format!("order {} vanished after checkout", result.order.id))),
    }
}

//----------------------------------------------   Orders  ----------------------------------------------------
/// GET an order with lines, snapshot coupon, derived amounts and outstanding balance. Line due dates are
/// null while the order is unpaid.
pub async fn order_by_id<B: PaymentGatewayDatabase>(
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = OrderId(path.into_inner());
    debug!("💻️ GET order {id}");
    let summary = api.order_summary(id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("order {id}")))?;
    Ok(HttpResponse::Ok().json(summary))
}

//----------------------------------------------   Subscription  ----------------------------------------------------
pub async fn current_subscription<B: SubscriptionManagement>(
    api: web::Data<SubscriptionApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let subscription = api.active_subscription().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "subscription": subscription })))
}

pub async fn billing_history<B: SubscriptionManagement>(
    api: web::Data<SubscriptionApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let history = api.billing_history().await?;
    Ok(HttpResponse::Ok().json(history))
}

/// POST cancel: cancels the active subscription at the gateway, then records the cancellation locally.
pub async fn cancel_subscription<B: SubscriptionManagement>(
    api: web::Data<SubscriptionApi<B>>,
    paypal: web::Data<PaypalApi>,
) -> Result<HttpResponse, ServerError> {
    let Some(link) = api.link_for_active_subscription().await? else {
        debug!("💻️ No active subscription to cancel");
        return Ok(HttpResponse::Ok().json(JsonResponse::success("No active subscription.")));
    };
    paypal.cancel_subscription(&link.external_subscription_id).await?;
    api.cancelled(&link.external_subscription_id, chrono::Utc::now()).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Subscription cancelled.")))
}
