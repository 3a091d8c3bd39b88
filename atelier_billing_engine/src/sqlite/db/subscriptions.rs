use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{GatewayLink, NewSubscription, Subscription, SubscriptionStatus},
    traits::SubscriptionApiError,
};

const SUB_COLUMNS: &str = "id, status, is_on_trial, start_time, next_billing_time, cancelled_at, retired_at, created_at";
const LINK_COLUMNS: &str = "id, subscription_id, external_subscription_id, plan_id, plan_name, amount";

pub async fn insert_subscription(
    sub: &NewSubscription,
    conn: &mut SqliteConnection,
) -> Result<Subscription, SubscriptionApiError> {
    let row = sqlx::query_as(&format!(
        r#"
            INSERT INTO subscriptions (status, is_on_trial, start_time, next_billing_time)
            VALUES ('Active', $1, $2, $3)
            RETURNING {SUB_COLUMNS};
        "#
    ))
    .bind(sub.is_on_trial)
    .bind(sub.start_time)
    .bind(sub.next_billing_time)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn insert_link(
    subscription_id: i64,
    sub: &NewSubscription,
    conn: &mut SqliteConnection,
) -> Result<GatewayLink, SubscriptionApiError> {
    let row = sqlx::query_as(&format!(
        r#"
            INSERT INTO gateway_links (subscription_id, external_subscription_id, plan_id, plan_name, amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {LINK_COLUMNS};
        "#
    ))
    .bind(subscription_id)
    .bind(&sub.external_subscription_id)
    .bind(&sub.plan_id)
    .bind(&sub.plan_name)
    .bind(sub.amount)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_link(
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<GatewayLink>, SubscriptionApiError> {
    let row = sqlx::query_as(&format!(
        "SELECT {LINK_COLUMNS} FROM gateway_links WHERE external_subscription_id = $1"
    ))
    .bind(external_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_link_for_subscription(
    subscription_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<GatewayLink>, SubscriptionApiError> {
    let row = sqlx::query_as(&format!("SELECT {LINK_COLUMNS} FROM gateway_links WHERE subscription_id = $1"))
        .bind(subscription_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn fetch_subscription(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Subscription>, SubscriptionApiError> {
    let row = sqlx::query_as(&format!("SELECT {SUB_COLUMNS} FROM subscriptions WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn fetch_active(conn: &mut SqliteConnection) -> Result<Option<Subscription>, SubscriptionApiError> {
    let row = sqlx::query_as(&format!(
        "SELECT {SUB_COLUMNS} FROM subscriptions WHERE status = 'Active' ORDER BY created_at DESC LIMIT 1"
    ))
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Forces every active subscription except `keep` to `Retired`. This is the cascade that upholds the
/// at-most-one-active invariant; it runs inside the activation transaction.
pub async fn retire_active_except(
    keep: Option<i64>,
    retired_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Subscription>, SubscriptionApiError> {
    let rows: Vec<Subscription> = sqlx::query_as(&format!(
        r#"
            UPDATE subscriptions SET status = 'Retired', retired_at = $1
            WHERE status = 'Active' AND id IS NOT $2
            RETURNING {SUB_COLUMNS};
        "#
    ))
    .bind(retired_at)
    .bind(keep)
    .fetch_all(conn)
    .await?;
    if !rows.is_empty() {
        debug!("🔁️ Retired {} previously active subscription(s)", rows.len());
    }
    Ok(rows)
}

pub async fn set_status(
    subscription_id: i64,
    status: SubscriptionStatus,
    conn: &mut SqliteConnection,
) -> Result<Subscription, SubscriptionApiError> {
    let row: Option<Subscription> = sqlx::query_as(&format!(
        "UPDATE subscriptions SET status = $1 WHERE id = $2 RETURNING {SUB_COLUMNS}"
    ))
    .bind(status)
    .bind(subscription_id)
    .fetch_optional(conn)
    .await?;
    row.ok_or_else(|| SubscriptionApiError::DatabaseError(format!("subscription {subscription_id} vanished")))
}

pub async fn set_cancelled(
    subscription_id: i64,
    cancelled_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Subscription, SubscriptionApiError> {
    let row: Option<Subscription> = sqlx::query_as(&format!(
        "UPDATE subscriptions SET status = 'Cancelled', cancelled_at = $1 WHERE id = $2 RETURNING {SUB_COLUMNS}"
    ))
    .bind(cancelled_at)
    .bind(subscription_id)
    .fetch_optional(conn)
    .await?;
    row.ok_or_else(|| SubscriptionApiError::DatabaseError(format!("subscription {subscription_id} vanished")))
}

pub async fn update_billing(
    subscription_id: i64,
    next_billing_time: DateTime<Utc>,
    is_on_trial: Option<bool>,
    conn: &mut SqliteConnection,
) -> Result<Subscription, SubscriptionApiError> {
    let row: Option<Subscription> = sqlx::query_as(&format!(
        r#"
            UPDATE subscriptions SET
                next_billing_time = $1,
                is_on_trial = IFNULL($2, is_on_trial)
            WHERE id = $3
            RETURNING {SUB_COLUMNS};
        "#
    ))
    .bind(next_billing_time)
    .bind(is_on_trial)
    .bind(subscription_id)
    .fetch_optional(conn)
    .await?;
    row.ok_or_else(|| SubscriptionApiError::DatabaseError(format!("subscription {subscription_id} vanished")))
}
