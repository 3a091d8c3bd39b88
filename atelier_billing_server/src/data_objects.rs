use atelier_billing_engine::db_types::NewBasketLine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}

/// Add a new line, or update an existing one when `line_id` is given.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertLineRequest {
    #[serde(default)]
    pub line_id: Option<i64>,
    #[serde(flatten)]
    pub line: NewBasketLine,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyCouponRequest {
    pub coupon_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentRequest {
    pub storage_key: String,
    #[serde(default)]
    pub comment: Option<String>,
}
