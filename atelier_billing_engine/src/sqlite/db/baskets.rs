use abg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Basket, BasketLine, BasketLineAttachment, CheckoutLine, NewBasketLine},
    traits::BasketApiError,
};

const BASKET_COLUMNS: &str = "id, customer_id, coupon_id, created_at";
const LINE_COLUMNS: &str = "id, basket_id, topic, service_type_id, turnaround_id, level_id, tier_id, pages, \
                            reference_count, comment, quantity, page_price, tier_price";

pub async fn fetch_or_create(customer_id: &str, conn: &mut SqliteConnection) -> Result<Basket, BasketApiError> {
    sqlx::query("INSERT INTO baskets (customer_id) VALUES ($1) ON CONFLICT (customer_id) DO NOTHING")
        .bind(customer_id)
        .execute(&mut *conn)
        .await?;
    let basket = fetch(customer_id, conn)
        .await?
        .ok_or_else(|| BasketApiError::BasketNotFound(customer_id.to_string()))?;
    Ok(basket)
}

pub async fn fetch(customer_id: &str, conn: &mut SqliteConnection) -> Result<Option<Basket>, BasketApiError> {
    let basket = sqlx::query_as(&format!("SELECT {BASKET_COLUMNS} FROM baskets WHERE customer_id = $1"))
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
    Ok(basket)
}

pub async fn fetch_lines(basket_id: i64, conn: &mut SqliteConnection) -> Result<Vec<BasketLine>, BasketApiError> {
    let lines = sqlx::query_as(&format!("SELECT {LINE_COLUMNS} FROM basket_lines WHERE basket_id = $1 ORDER BY id"))
        .bind(basket_id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

pub async fn fetch_line(line_id: i64, conn: &mut SqliteConnection) -> Result<Option<BasketLine>, BasketApiError> {
    let line = sqlx::query_as(&format!("SELECT {LINE_COLUMNS} FROM basket_lines WHERE id = $1"))
        .bind(line_id)
        .fetch_optional(conn)
        .await?;
    Ok(line)
}

pub async fn insert_line(
    basket_id: i64,
    line: &NewBasketLine,
    page_price: Money,
    tier_price: Option<Money>,
    conn: &mut SqliteConnection,
) -> Result<BasketLine, BasketApiError> {
    let row = sqlx::query_as(&format!(
        r#"
            INSERT INTO basket_lines (
                basket_id, topic, service_type_id, turnaround_id, level_id, tier_id,
                pages, reference_count, comment, quantity, page_price, tier_price
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {LINE_COLUMNS};
        "#
    ))
    .bind(basket_id)
    .bind(&line.topic)
    .bind(line.service_type_id)
    .bind(line.turnaround_id)
    .bind(line.level_id)
    .bind(line.tier_id)
    .bind(line.pages)
    .bind(line.references)
    .bind(&line.comment)
    .bind(line.quantity)
    .bind(page_price)
    .bind(tier_price)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn update_line(
    line_id: i64,
    line: &NewBasketLine,
    page_price: Money,
    tier_price: Option<Money>,
    conn: &mut SqliteConnection,
) -> Result<BasketLine, BasketApiError> {
    let row: Option<BasketLine> = sqlx::query_as(&format!(
        r#"
            UPDATE basket_lines SET
                topic = $2, service_type_id = $3, turnaround_id = $4, level_id = $5, tier_id = $6,
                pages = $7, reference_count = $8, comment = $9, quantity = $10, page_price = $11, tier_price = $12
            WHERE id = $1
            RETURNING {LINE_COLUMNS};
        "#
    ))
    .bind(line_id)
    .bind(&line.topic)
    .bind(line.service_type_id)
    .bind(line.turnaround_id)
    .bind(line.level_id)
    .bind(line.tier_id)
    .bind(line.pages)
    .bind(line.references)
    .bind(&line.comment)
    .bind(line.quantity)
    .bind(page_price)
    .bind(tier_price)
    .fetch_optional(conn)
    .await?;
    row.ok_or(BasketApiError::LineNotFound(line_id))
}

pub async fn delete_line(basket_id: i64, line_id: i64, conn: &mut SqliteConnection) -> Result<(), BasketApiError> {
    let result = sqlx::query("DELETE FROM basket_lines WHERE id = $1 AND basket_id = $2")
        .bind(line_id)
        .bind(basket_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(BasketApiError::LineNotFound(line_id));
    }
    Ok(())
}

/// Deletes all lines. The basket row stays; removing the last line never removes the basket.
pub async fn clear(basket_id: i64, conn: &mut SqliteConnection) -> Result<(), BasketApiError> {
    sqlx::query("DELETE FROM basket_lines WHERE basket_id = $1").bind(basket_id).execute(conn).await?;
    Ok(())
}

pub async fn set_coupon(
    basket_id: i64,
    coupon_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<(), BasketApiError> {
    sqlx::query("UPDATE baskets SET coupon_id = $1 WHERE id = $2")
        .bind(coupon_id)
        .bind(basket_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_attachment(
    line_id: i64,
    storage_key: &str,
    comment: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<BasketLineAttachment, BasketApiError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO basket_line_attachments (basket_line_id, storage_key, comment) VALUES ($1, $2, $3)
            RETURNING id, basket_line_id, storage_key, comment;
        "#,
    )
    .bind(line_id)
    .bind(storage_key)
    .bind(comment)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_attachments(
    line_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<BasketLineAttachment>, BasketApiError> {
    let rows = sqlx::query_as(
        "SELECT id, basket_line_id, storage_key, comment FROM basket_line_attachments WHERE basket_line_id = $1 \
         ORDER BY id",
    )
    .bind(line_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Basket lines joined with the catalog display attributes the checkout snapshot needs.
pub async fn fetch_checkout_lines(
    basket_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CheckoutLine>, BasketApiError> {
    let rows = sqlx::query_as(
        r#"
            SELECT
                bl.id as id,
                bl.topic as topic,
                bl.pages as pages,
                bl.reference_count as reference_count,
                bl.comment as comment,
                bl.quantity as quantity,
                bl.page_price as page_price,
                bl.tier_price as tier_price,
                st.name as service_type_name,
                t.value as turnaround_value,
                t.unit as turnaround_unit,
                l.name as level_name,
                ti.name as tier_name
            FROM basket_lines bl
            JOIN service_types st ON bl.service_type_id = st.id
            JOIN turnarounds t ON bl.turnaround_id = t.id
            LEFT JOIN levels l ON bl.level_id = l.id
            LEFT JOIN tiers ti ON bl.tier_id = ti.id
            WHERE bl.basket_id = $1
            ORDER BY bl.id
        "#,
    )
    .bind(basket_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn delete_basket(basket_id: i64, conn: &mut SqliteConnection) -> Result<(), BasketApiError> {
    sqlx::query("DELETE FROM baskets WHERE id = $1").bind(basket_id).execute(conn).await?;
    Ok(())
}
