//! Platform settings singleton and the category catalogue.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;

use super::{from_millis, money, parse_money, to_millis};
use crate::errors::{ApiError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    pub platform_name: String,
    pub support_email: String,
    pub primary_color: String,
    pub platform_logo: String,
    pub platform_fees: Decimal,
    pub enable_user_registration: bool,
    pub social_links: BTreeMap<String, String>,
    pub categories: Vec<PlatformCategory>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformCategory {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    platform_name: String,
    support_email: String,
    primary_color: String,
    platform_logo: String,
    platform_fees: String,
    enable_user_registration: bool,
    social_links: String,
    updated_by: Option<String>,
    updated_at: i64,
}

pub fn default_social_links() -> BTreeMap<String, String> {
    [
        ("facebook", "https://facebook.com/yourpage"),
        ("twitter", "https://twitter.com/yourprofile"),
        ("instagram", "https://instagram.com/yourprofile"),
        ("linkedin", "https://linkedin.com/company/yourcompany"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Load the settings row, creating it with defaults on first access.
pub async fn get_or_create(pool: &SqlitePool, now: DateTime<Utc>) -> Result<PlatformSettings> {
    sqlx::query(
        "INSERT OR IGNORE INTO platform_settings (id, social_links, updated_at) VALUES (1, ?1, ?2)",
    )
    .bind(serde_json::to_string(&default_social_links())?)
    .bind(to_millis(now))
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, SettingsRow>(
        r#"
        SELECT platform_name, support_email, primary_color, platform_logo, platform_fees,
               enable_user_registration, social_links, updated_by, updated_at
        FROM   platform_settings WHERE id = 1
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(PlatformSettings {
        platform_name: row.platform_name,
        support_email: row.support_email,
        primary_color: row.primary_color,
        platform_logo: row.platform_logo,
        platform_fees: parse_money(&row.platform_fees)?,
        enable_user_registration: row.enable_user_registration,
        social_links: serde_json::from_str(&row.social_links)
            .map_err(|e| ApiError::Corrupt(format!("social links: {e}")))?,
        categories: list_categories(pool).await?,
        updated_by: row.updated_by,
        updated_at: from_millis(row.updated_at)?,
    })
}

pub async fn save(pool: &SqlitePool, s: &PlatformSettings) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE platform_settings
        SET    platform_name = ?1, support_email = ?2, primary_color = ?3, platform_logo = ?4,
               platform_fees = ?5, enable_user_registration = ?6, social_links = ?7,
               updated_by = ?8, updated_at = ?9
        WHERE  id = 1
        "#,
    )
    .bind(&s.platform_name)
    .bind(&s.support_email)
    .bind(&s.primary_color)
    .bind(&s.platform_logo)
    .bind(money(s.platform_fees))
    .bind(s.enable_user_registration)
    .bind(serde_json::to_string(&s.social_links)?)
    .bind(&s.updated_by)
    .bind(to_millis(s.updated_at))
    .execute(pool)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────────────────

pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<PlatformCategory>> {
    let rows: Vec<(String, String, i64)> =
        sqlx::query_as("SELECT id, name, created_at FROM platform_categories ORDER BY created_at ASC")
            .fetch_all(pool)
            .await?;
    rows.into_iter()
        .map(|(id, name, created_at)| {
            Ok(PlatformCategory {
                id,
                name,
                created_at: from_millis(created_at)?,
            })
        })
        .collect()
}

pub async fn insert_category(pool: &SqlitePool, category: &PlatformCategory) -> Result<()> {
    let result =
        sqlx::query("INSERT INTO platform_categories (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&category.id)
            .bind(&category.name)
            .bind(to_millis(category.created_at))
            .execute(pool)
            .await;
    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(ApiError::BadRequest("Category already exists".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_category(pool: &SqlitePool, id: &str) -> Result<bool> {
    let done = sqlx::query("DELETE FROM platform_categories WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}
