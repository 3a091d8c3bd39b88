use abg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Level, RateRule, ServiceType, Tier, TierSurcharge, Turnaround, TurnaroundUnit},
    traits::CatalogApiError,
};

pub async fn insert_service_type(name: &str, conn: &mut SqliteConnection) -> Result<ServiceType, CatalogApiError> {
    let row = sqlx::query_as("INSERT INTO service_types (name) VALUES ($1) RETURNING id, name")
        .bind(name)
        .fetch_one(conn)
        .await?;
    Ok(row)
}

pub async fn insert_turnaround(
    value: i64,
    unit: TurnaroundUnit,
    conn: &mut SqliteConnection,
) -> Result<Turnaround, CatalogApiError> {
    let row = sqlx::query_as("INSERT INTO turnarounds (value, unit) VALUES ($1, $2) RETURNING id, value, unit")
        .bind(value)
        .bind(unit)
        .fetch_one(conn)
        .await?;
    Ok(row)
}

pub async fn insert_level(name: &str, conn: &mut SqliteConnection) -> Result<Level, CatalogApiError> {
    let row = sqlx::query_as("INSERT INTO levels (name) VALUES ($1) RETURNING id, name")
        .bind(name)
        .fetch_one(conn)
        .await?;
    Ok(row)
}

pub async fn insert_tier(name: &str, conn: &mut SqliteConnection) -> Result<Tier, CatalogApiError> {
    let row =
        sqlx::query_as("INSERT INTO tiers (name) VALUES ($1) RETURNING id, name").bind(name).fetch_one(conn).await?;
    Ok(row)
}

pub async fn insert_rate_rule(
    service_type_id: i64,
    turnaround_id: i64,
    level_id: Option<i64>,
    amount_per_page: Money,
    conn: &mut SqliteConnection,
) -> Result<RateRule, CatalogApiError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO rate_rules (service_type_id, turnaround_id, level_id, amount_per_page)
            VALUES ($1, $2, $3, $4)
            RETURNING id, service_type_id, turnaround_id, level_id, amount_per_page;
        "#,
    )
    .bind(service_type_id)
    .bind(turnaround_id)
    .bind(level_id)
    .bind(amount_per_page)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => CatalogApiError::DuplicateRateScope,
        _ => CatalogApiError::from(e),
    })?;
    Ok(row)
}

/// Fetches the rule with exactly the given scope. `level_id = None` fetches the wildcard rule.
pub async fn fetch_rate_for_scope(
    service_type_id: i64,
    turnaround_id: i64,
    level_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<Option<RateRule>, CatalogApiError> {
    let row = sqlx::query_as(
        r#"
            SELECT id, service_type_id, turnaround_id, level_id, amount_per_page FROM rate_rules
            WHERE service_type_id = $1 AND turnaround_id = $2 AND level_id IS $3
        "#,
    )
    .bind(service_type_id)
    .bind(turnaround_id)
    .bind(level_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

pub async fn insert_tier_surcharge(
    rate_rule_id: i64,
    tier_id: i64,
    amount_per_page: Option<Money>,
    conn: &mut SqliteConnection,
) -> Result<TierSurcharge, CatalogApiError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO tier_surcharges (rate_rule_id, tier_id, amount_per_page)
            VALUES ($1, $2, $3)
            RETURNING id, rate_rule_id, tier_id, amount_per_page;
        "#,
    )
    .bind(rate_rule_id)
    .bind(tier_id)
    .bind(amount_per_page)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => CatalogApiError::DuplicateTierScope,
        _ => CatalogApiError::from(e),
    })?;
    Ok(row)
}

pub async fn fetch_tier_surcharge(
    rate_rule_id: i64,
    tier_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<TierSurcharge>, CatalogApiError> {
    let row = sqlx::query_as(
        "SELECT id, rate_rule_id, tier_id, amount_per_page FROM tier_surcharges WHERE rate_rule_id = $1 AND tier_id \
         = $2",
    )
    .bind(rate_rule_id)
    .bind(tier_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}
