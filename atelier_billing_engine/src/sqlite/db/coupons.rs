use abg_common::Money;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Coupon, NewCoupon},
    helpers::generate_coupon_code,
    traits::CatalogApiError,
};

const COUPON_COLUMNS: &str = "id, code, kind, percent_off, minimum, start_date, end_date, is_active";
const CODE_GENERATION_ATTEMPTS: usize = 10;

pub async fn insert_coupon(coupon: NewCoupon, conn: &mut SqliteConnection) -> Result<Coupon, CatalogApiError> {
    match &coupon.code {
        Some(code) => {
            let code = code.clone();
            try_insert(coupon, &code, conn).await.map_err(|e| match e {
                sqlx::Error::Database(err) if err.is_unique_violation() => CatalogApiError::DuplicateCouponCode(code),
                _ => CatalogApiError::from(e),
            })
        },
        None => {
            // Generated codes can collide; retry with a fresh code until the unique constraint is happy.
            for _ in 0..CODE_GENERATION_ATTEMPTS {
                let code = generate_coupon_code();
                match try_insert(coupon.clone(), &code, conn).await {
                    Ok(coupon) => return Ok(coupon),
                    Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                        debug!("🎟️ Coupon code {code} collided, generating a new one");
                    },
                    Err(e) => return Err(e.into()),
                }
            }
            Err(CatalogApiError::CouponCodeExhausted)
        },
    }
}

async fn try_insert(coupon: NewCoupon, code: &str, conn: &mut SqliteConnection) -> Result<Coupon, sqlx::Error> {
    let row = sqlx::query_as(&format!(
        r#"
            INSERT INTO coupons (code, kind, percent_off, minimum, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COUPON_COLUMNS};
        "#
    ))
    .bind(code)
    .bind(coupon.kind)
    .bind(coupon.percent_off)
    .bind(coupon.minimum)
    .bind(coupon.start_date)
    .bind(coupon.end_date)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn deactivate(code: &str, conn: &mut SqliteConnection) -> Result<(), CatalogApiError> {
    let result = sqlx::query("UPDATE coupons SET is_active = 0 WHERE code = $1").bind(code).execute(conn).await?;
    if result.rows_affected() == 0 {
        return Err(CatalogApiError::CouponNotFound(code.to_string()));
    }
    Ok(())
}

/// Deletes the coupon. The `ON DELETE SET NULL` on `baskets.coupon_id` detaches it from any basket
/// holding it, without touching the basket itself.
pub async fn delete(code: &str, conn: &mut SqliteConnection) -> Result<(), CatalogApiError> {
    let result = sqlx::query("DELETE FROM coupons WHERE code = $1").bind(code).execute(conn).await?;
    if result.rows_affected() == 0 {
        return Err(CatalogApiError::CouponNotFound(code.to_string()));
    }
    Ok(())
}

pub async fn fetch_by_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Coupon>, CatalogApiError> {
    let row = sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"))
        .bind(code)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn fetch_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Coupon>, CatalogApiError> {
    let row = sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn fetch_first_timer(conn: &mut SqliteConnection) -> Result<Option<Coupon>, CatalogApiError> {
    let row = sqlx::query_as(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE kind = 'FirstTimer' AND is_active = 1 ORDER BY created_at LIMIT 1"
    ))
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Active coupons with a minimum not exceeding the subtotal, largest qualifying threshold first.
pub async fn fetch_minimum_candidates(
    subtotal: Money,
    conn: &mut SqliteConnection,
) -> Result<Vec<Coupon>, CatalogApiError> {
    let rows = sqlx::query_as(&format!(
        r#"
            SELECT {COUPON_COLUMNS} FROM coupons
            WHERE is_active = 1 AND minimum IS NOT NULL AND minimum <= $1
            ORDER BY minimum DESC
        "#
    ))
    .bind(subtotal)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
