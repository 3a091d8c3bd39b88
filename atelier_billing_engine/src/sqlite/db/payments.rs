use abg_common::Money;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Gateway, LedgerTarget, PaymentRecord, PaymentStatus},
    traits::PaymentGatewayError,
};

const RECORD_COLUMNS: &str = "id, target_kind, target_id, txid, amount, status, gateway, paid_at, created_at";

/// Appends a ledger record. The partial unique index over (target, txid) makes this the idempotency
/// gate for redelivered webhook events: a duplicate transaction reference surfaces as
/// [`PaymentGatewayError::PaymentAlreadyExists`], which callers treat as a no-op acknowledgement.
pub async fn insert_record(
    target: &LedgerTarget,
    txid: Option<&str>,
    amount: Money,
    status: PaymentStatus,
    gateway: Gateway,
    paid_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, PaymentGatewayError> {
    let record = sqlx::query_as(&format!(
        r#"
            INSERT INTO payments (target_kind, target_id, txid, amount, status, gateway, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RECORD_COLUMNS};
        "#
    ))
    .bind(target.kind())
    .bind(target.id())
    .bind(txid)
    .bind(amount)
    .bind(status)
    .bind(gateway)
    .bind(paid_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            PaymentGatewayError::PaymentAlreadyExists(txid.unwrap_or_default().to_string())
        },
        _ => PaymentGatewayError::from(e),
    })?;
    Ok(record)
}

pub async fn fetch_for_target(
    target: &LedgerTarget,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRecord>, PaymentGatewayError> {
    let records = sqlx::query_as(&format!(
        "SELECT {RECORD_COLUMNS} FROM payments WHERE target_kind = $1 AND target_id = $2 ORDER BY id"
    ))
    .bind(target.kind())
    .bind(target.id())
    .fetch_all(conn)
    .await?;
    Ok(records)
}

/// The platform's recurring-billing history across all gateway links, newest first.
pub async fn fetch_subscription_records(conn: &mut SqliteConnection) -> Result<Vec<PaymentRecord>, PaymentGatewayError> {
    let records = sqlx::query_as(&format!(
        "SELECT {RECORD_COLUMNS} FROM payments WHERE target_kind = 'Subscription' ORDER BY paid_at DESC"
    ))
    .fetch_all(conn)
    .await?;
    Ok(records)
}
