use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use atelier_billing_engine::traits::{BasketApiError, CatalogApiError, PaymentGatewayError, SubscriptionApiError};
use paypal_tools::PaypalApiError;
use thiserror::Error;

/// The server error taxonomy. What matters here is the status each class maps to:
/// * configuration errors are server faults (500) and are never retried by the caller's logic;
/// * authentication errors (bad signature/hash) are client errors (400-class) and mutate nothing;
/// * referential errors (the event's target is not visible yet) are 503 so the gateway redelivers;
/// * validation errors on the basket/order surface are synchronous 4xx responses.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Upstream gateway call failed. {0}")]
    GatewayApiError(String),
    #[error("Webhook signature invalid or not provided")]
    InvalidSignature,
    #[error("Could not read request body: {0}")]
    MalformedPayload(String),
    #[error("Event cannot be processed yet: {0}")]
    RetryLater(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::RetryLater(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::GatewayApiError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<BasketApiError> for ServerError {
    fn from(e: BasketApiError) -> Self {
        match e {
            BasketApiError::DatabaseError(msg) => Self::BackendError(msg),
            BasketApiError::BasketNotFound(_) | BasketApiError::LineNotFound(_) => Self::NoRecordFound(e.to_string()),
            BasketApiError::Catalog(inner) => inner.into(),
            // Unavailable rates and coupon rejections are recoverable, user-facing validation errors.
            other => Self::ValidationError(other.to_string()),
        }
    }
}

impl From<CatalogApiError> for ServerError {
    fn from(e: CatalogApiError) -> Self {
        match e {
            CatalogApiError::DatabaseError(msg) => Self::BackendError(msg),
            CatalogApiError::CouponNotFound(_) => Self::NoRecordFound(e.to_string()),
            other => Self::ValidationError(other.to_string()),
        }
    }
}

impl From<PaymentGatewayError> for ServerError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::DatabaseError(msg) => Self::BackendError(msg),
            // The order in the event payload is not visible (yet). Signal the gateway to redeliver.
            PaymentGatewayError::OrderNotFound(oid) => Self::RetryLater(format!("order {oid} is not known yet")),
            PaymentGatewayError::BasketNotFound(_) | PaymentGatewayError::EmptyBasket => {
                Self::ValidationError(e.to_string())
            },
            PaymentGatewayError::PaymentAlreadyExists(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<SubscriptionApiError> for ServerError {
    fn from(e: SubscriptionApiError) -> Self {
        match e {
            SubscriptionApiError::DatabaseError(msg) => Self::BackendError(msg),
            // The activation event has not landed yet; the sale must be redelivered after it.
            SubscriptionApiError::LinkNotFound(id) => Self::RetryLater(format!("subscription {id} is not known yet")),
            SubscriptionApiError::SaleAlreadyExists(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<PaypalApiError> for ServerError {
    fn from(e: PaypalApiError) -> Self {
        match e {
            PaypalApiError::MissingCredentials => Self::ConfigurationError(e.to_string()),
            // Token exchange and out-of-band fetch failures are fatal to the event being handled, and are
            // a different failure class from signature verification failure.
            other => Self::GatewayApiError(other.to_string()),
        }
    }
}
