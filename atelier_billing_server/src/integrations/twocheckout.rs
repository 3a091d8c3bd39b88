//! 2Checkout INS (Instant Notification Service) support.
//!
//! INS messages arrive form-encoded and are authenticated with an uppercase-hex MD5 digest over
//! the concatenation of sale id, vendor id, invoice id and the merchant's secret word.

use abg_common::Money;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Athens;
use md5::{Digest, Md5};
use serde::Deserialize;

/// 2Checkout sends timestamps as local wall-clock time in the vendor area's timezone.
const SALE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The INS message types the reconciler acts on. Everything else is acknowledged untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwocheckoutMessageType {
    OrderCreated,
    Other(String),
}

impl From<&str> for TwocheckoutMessageType {
    fn from(s: &str) -> Self {
        match s {
            "ORDER_CREATED" => Self::OrderCreated,
            other => Self::Other(other.to_string()),
        }
    }
}

/// The subset of INS parameters the billing engine consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct InsNotification {
    pub message_type: String,
    pub md5_hash: String,
    pub sale_id: String,
    pub vendor_id: String,
    pub invoice_id: String,
    #[serde(default)]
    pub vendor_order_id: Option<String>,
    #[serde(default)]
    pub invoice_list_amount: Option<String>,
    #[serde(default)]
    pub sale_date_placed: Option<String>,
}

impl InsNotification {
    pub fn message_type(&self) -> TwocheckoutMessageType {
        TwocheckoutMessageType::from(self.message_type.as_str())
    }

    /// Checks the INS hash: MD5(sale_id ‖ vendor_id ‖ invoice_id ‖ secret), uppercase hex.
    pub fn check_hash(&self, secret: &str) -> bool {
        let mut hasher = Md5::new();
        hasher.update(self.sale_id.as_bytes());
        hasher.update(self.vendor_id.as_bytes());
        hasher.update(self.invoice_id.as_bytes());
        hasher.update(secret.as_bytes());
        let expected = hex::encode(hasher.finalize()).to_uppercase();
        expected == self.md5_hash
    }

    pub fn amount(&self) -> Option<Money> {
        self.invoice_list_amount.as_deref().and_then(|s| s.parse().ok())
    }

    /// Parses `sale_date_placed` (Europe/Athens wall-clock) into UTC.
    pub fn sale_date_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.sale_date_placed.as_deref()?;
        let naive = NaiveDateTime::parse_from_str(raw, SALE_DATE_FORMAT).ok()?;
        let local = Athens.from_local_datetime(&naive).single()?;
        Some(local.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn notification(md5_hash: &str) -> InsNotification {
        InsNotification {
            message_type: "ORDER_CREATED".to_string(),
            md5_hash: md5_hash.to_string(),
            sale_id: "106235964".to_string(),
            vendor_id: "901248204".to_string(),
            invoice_id: "106235965".to_string(),
            vendor_order_id: Some("42".to_string()),
            invoice_list_amount: Some("264.00".to_string()),
            sale_date_placed: Some("2024-06-11 12:30:00".to_string()),
        }
    }

    fn expected_hash(n: &InsNotification, secret: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(n.sale_id.as_bytes());
        hasher.update(n.vendor_id.as_bytes());
        hasher.update(n.invoice_id.as_bytes());
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize()).to_uppercase()
    }

    #[test]
    fn valid_hash_is_accepted() {
        let mut n = notification("");
        n.md5_hash = expected_hash(&n, "tango");
        assert!(n.check_hash("tango"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let mut n = notification("");
        n.md5_hash = expected_hash(&n, "tango");
        assert!(!n.check_hash("cash"));
    }

    #[test]
    fn lowercase_hash_is_rejected() {
        let mut n = notification("");
        n.md5_hash = expected_hash(&n, "tango").to_lowercase();
        assert!(!n.check_hash("tango"));
    }

    #[test]
    fn tampered_fields_break_the_hash() {
        let mut n = notification("");
        n.md5_hash = expected_hash(&n, "tango");
        n.sale_id = "106235999".to_string();
        assert!(!n.check_hash("tango"));
    }

    #[test]
    fn sale_date_converts_from_athens_to_utc() {
        let n = notification("");
        let utc = n.sale_date_utc().unwrap();
        // Athens is UTC+3 in June (EEST).
        assert_eq!(utc.to_rfc3339(), "2024-06-11T09:30:00+00:00");
    }

    #[test]
    fn amount_parses_the_invoice_total() {
        let n = notification("");
        assert_eq!(n.amount().unwrap(), Money::whole(264));
    }

    #[test]
    fn message_types_map_to_the_closed_enum() {
        let n = notification("");
        assert_eq!(n.message_type(), TwocheckoutMessageType::OrderCreated);
        let mut other = notification("");
        other.message_type = "FRAUD_STATUS_CHANGED".to_string();
        assert_eq!(other.message_type(), TwocheckoutMessageType::Other("FRAUD_STATUS_CHANGED".to_string()));
    }
}
