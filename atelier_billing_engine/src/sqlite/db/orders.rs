use abg_common::Money;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{
        NewOrderLine,
        Order,
        OrderCoupon,
        OrderId,
        OrderLine,
        OrderLineAttachment,
        OrderLineStatusType,
        OrderStatusType,
    },
    traits::PaymentGatewayError,
};

const ORDER_COLUMNS: &str = "id, customer_id, status, created_at, updated_at";
const LINE_COLUMNS: &str = "id, order_id, topic, service_type, turnaround, level, tier, pages, reference_count, \
                            comment, quantity, page_price, tier_price, due_date, status, created_at, updated_at";

pub async fn insert_order(
    customer_id: &str,
    created_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    let order = sqlx::query_as(&format!(
        "INSERT INTO orders (customer_id, created_at, updated_at) VALUES ($1, $2, $2) RETURNING {ORDER_COLUMNS}"
    ))
    .bind(customer_id)
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, PaymentGatewayError> {
    let order = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn update_order_status(
    id: OrderId,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    let order: Option<Order> = sqlx::query_as(&format!(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING {ORDER_COLUMNS}"
    ))
    .bind(status)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    order.ok_or(PaymentGatewayError::OrderNotFound(id))
}

pub async fn insert_order_coupon(
    id: OrderId,
    code: &str,
    discount: Money,
    conn: &mut SqliteConnection,
) -> Result<OrderCoupon, PaymentGatewayError> {
    let coupon = sqlx::query_as(
        "INSERT INTO order_coupons (order_id, code, discount) VALUES ($1, $2, $3) RETURNING order_id, code, discount",
    )
    .bind(id)
    .bind(code)
    .bind(discount)
    .fetch_one(conn)
    .await?;
    Ok(coupon)
}

pub async fn fetch_order_coupon(
    id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderCoupon>, PaymentGatewayError> {
    let coupon = sqlx::query_as("SELECT order_id, code, discount FROM order_coupons WHERE order_id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(coupon)
}

pub async fn insert_order_line(
    id: OrderId,
    line: NewOrderLine,
    conn: &mut SqliteConnection,
) -> Result<OrderLine, PaymentGatewayError> {
    let row = sqlx::query_as(&format!(
        r#"
            INSERT INTO order_lines (
                order_id, topic, service_type, turnaround, level, tier,
                pages, reference_count, comment, quantity, page_price, tier_price, due_date
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {LINE_COLUMNS};
        "#
    ))
    .bind(id)
    .bind(line.topic)
    .bind(line.service_type)
    .bind(line.turnaround)
    .bind(line.level)
    .bind(line.tier)
    .bind(line.pages)
    .bind(line.references)
    .bind(line.comment)
    .bind(line.quantity)
    .bind(line.page_price)
    .bind(line.tier_price)
    .bind(line.due_date)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_order_lines(id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, PaymentGatewayError> {
    let lines = sqlx::query_as(&format!("SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = $1 ORDER BY id"))
        .bind(id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

/// Shifts the due date of every line still `Pending` by `delta` and moves it to `InProgress`.
/// Due dates "float" until the first successful payment starts the clock.
pub async fn start_pending_lines(
    id: OrderId,
    delta: Duration,
    conn: &mut SqliteConnection,
) -> Result<u64, PaymentGatewayError> {
    let lines = fetch_order_lines(id, &mut *conn).await?;
    let mut started = 0;
    for line in lines.iter().filter(|l| l.status == OrderLineStatusType::Pending) {
        let due_date = line.due_date + delta;
        sqlx::query(
            "UPDATE order_lines SET due_date = $1, status = 'InProgress', updated_at = CURRENT_TIMESTAMP WHERE id = \
             $2",
        )
        .bind(due_date)
        .bind(line.id)
        .execute(&mut *conn)
        .await?;
        started += 1;
    }
    debug!("📦️ Order {id}: {started} lines moved to InProgress");
    Ok(started)
}

/// Voids every line of the order. Applied on any refund, partial or not.
pub async fn void_all_lines(id: OrderId, conn: &mut SqliteConnection) -> Result<u64, PaymentGatewayError> {
    let result =
        sqlx::query("UPDATE order_lines SET status = 'Void', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1")
            .bind(id)
            .execute(conn)
            .await?;
    Ok(result.rows_affected())
}

/// Sum of line totals minus the snapshotted coupon discount.
pub async fn amount_payable(id: OrderId, conn: &mut SqliteConnection) -> Result<Money, PaymentGatewayError> {
    let lines = fetch_order_lines(id, &mut *conn).await?;
    let subtotal: Money = lines.iter().map(|l| l.total()).sum();
    let discount = fetch_order_coupon(id, conn).await?.map(|c| c.discount).unwrap_or_default();
    Ok(subtotal - discount)
}

pub async fn insert_order_line_attachment(
    order_line_id: i64,
    storage_key: &str,
    comment: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<OrderLineAttachment, PaymentGatewayError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO order_line_attachments (order_line_id, storage_key, comment) VALUES ($1, $2, $3)
            RETURNING id, order_line_id, storage_key, comment;
        "#,
    )
    .bind(order_line_id)
    .bind(storage_key)
    .bind(comment)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_order_line_attachments(
    order_line_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderLineAttachment>, PaymentGatewayError> {
    let rows = sqlx::query_as(
        "SELECT id, order_line_id, storage_key, comment FROM order_line_attachments WHERE order_line_id = $1 ORDER \
         BY id",
    )
    .bind(order_line_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Whether the customer has any order that has historically reached `Paid`.
pub async fn has_paid_order(customer_id: &str, conn: &mut SqliteConnection) -> Result<bool, PaymentGatewayError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM orders WHERE customer_id = $1 AND status = 'Paid' LIMIT 1")
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}
