//! Administrator accounts, kept apart from platform users.

use chrono::{DateTime, Utc};
use crowdfund_protocol::AdminRole;
use serde::Serialize;
use sqlx::SqlitePool;

use super::{from_millis, from_millis_opt, parse_wire, to_millis};
use crate::errors::{ApiError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdminRecord {
    pub fn is_super(&self) -> bool {
        self.role == AdminRole::SuperAdmin
    }
}

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    last_login_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<AdminRow> for AdminRecord {
    type Error = ApiError;

    fn try_from(row: AdminRow) -> Result<Self> {
        Ok(AdminRecord {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: parse_wire(&row.role)?,
            is_active: row.is_active,
            last_login_at: from_millis_opt(row.last_login_at)?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

const ADMIN_COLUMNS: &str =
    "id, name, email, password_hash, role, is_active, last_login_at, created_at";

pub async fn insert(
    pool: &SqlitePool,
    id: &str,
    name: &str,
    email: &str,
    password_hash: &str,
    role: AdminRole,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO admins (id, name, email, password_hash, role, is_active, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(to_millis(now))
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(ApiError::BadRequest(
            "Admin with this email already exists".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<AdminRecord>> {
    let row = sqlx::query_as::<_, AdminRow>(&format!(
        "SELECT {ADMIN_COLUMNS} FROM admins WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(AdminRecord::try_from).transpose()
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<AdminRecord>> {
    let row = sqlx::query_as::<_, AdminRow>(&format!(
        "SELECT {ADMIN_COLUMNS} FROM admins WHERE email = ?1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;
    row.map(AdminRecord::try_from).transpose()
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<AdminRecord>> {
    let rows = sqlx::query_as::<_, AdminRow>(&format!(
        "SELECT {ADMIN_COLUMNS} FROM admins ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(AdminRecord::try_from).collect()
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM admins")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

pub async fn record_login(pool: &SqlitePool, id: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE admins SET last_login_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(to_millis(now))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_active(pool: &SqlitePool, id: &str, active: bool, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE admins SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(active)
        .bind(to_millis(now))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: &str) -> Result<bool> {
    let done = sqlx::query("DELETE FROM admins WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}
