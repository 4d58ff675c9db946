//! Platform user accounts, their OTP/reset challenges and KYC payload.

use chrono::{DateTime, Utc};
use crowdfund_protocol::{lifecycle::Creator, IdType, KycStatus, UserRole};
use serde::Serialize;
use sqlx::SqlitePool;

use super::{from_millis, from_millis_opt, parse_wire, to_millis, PageWindow};
use crate::errors::{ApiError, Result};

/// Identity data extracted by a successful verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycDetails {
    pub name: Option<String>,
    pub id_number: Option<String>,
    pub id_type: Option<IdType>,
    pub verified_at: Option<DateTime<Utc>>,
    pub face_match_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: UserRole,
    pub kyc_status: KycStatus,
    pub kyc: Option<KycDetails>,
    #[serde(skip)]
    pub otp_code: Option<String>,
    #[serde(skip)]
    pub otp_expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub reset_token: Option<String>,
    #[serde(skip)]
    pub reset_expires_at: Option<DateTime<Utc>>,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// The user as seen by the KYC gate.
    pub fn as_actor(&self) -> Creator {
        Creator {
            id: self.id.clone(),
            role: self.role,
            kyc_status: self.kyc_status,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    kyc_status: String,
    kyc_name: Option<String>,
    kyc_id_number: Option<String>,
    kyc_id_type: Option<String>,
    kyc_verified_at: Option<i64>,
    kyc_face_match_score: Option<f64>,
    otp_code: Option<String>,
    otp_expires_at: Option<i64>,
    reset_token: Option<String>,
    reset_expires_at: Option<i64>,
    is_email_verified: bool,
    created_at: i64,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = ApiError;

    fn try_from(row: UserRow) -> Result<Self> {
        let kyc = if row.kyc_verified_at.is_some() || row.kyc_id_number.is_some() {
            Some(KycDetails {
                name: row.kyc_name,
                id_number: row.kyc_id_number,
                id_type: row.kyc_id_type.as_deref().map(parse_wire).transpose()?,
                verified_at: from_millis_opt(row.kyc_verified_at)?,
                face_match_score: row.kyc_face_match_score,
            })
        } else {
            None
        };
        Ok(UserRecord {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: parse_wire(&row.role)?,
            kyc_status: parse_wire(&row.kyc_status)?,
            kyc,
            otp_code: row.otp_code,
            otp_expires_at: from_millis_opt(row.otp_expires_at)?,
            reset_token: row.reset_token,
            reset_expires_at: from_millis_opt(row.reset_expires_at)?,
            is_email_verified: row.is_email_verified,
            created_at: from_millis(row.created_at)?,
        })
    }
}

const USER_COLUMNS: &str = r#"
    id, name, email, password_hash, role, kyc_status, kyc_name, kyc_id_number,
    kyc_id_type, kyc_verified_at, kyc_face_match_score, otp_code, otp_expires_at,
    reset_token, reset_expires_at, is_email_verified, created_at
"#;

pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: UserRole,
    pub otp_code: Option<&'a str>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub is_email_verified: bool,
    pub now: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

pub async fn insert_user(pool: &SqlitePool, user: &NewUser<'_>) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO users
            (id, name, email, password_hash, role, kyc_status, otp_code, otp_expires_at,
             is_email_verified, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 'NOT_VERIFIED', ?6, ?7, ?8, ?9, ?9)
        "#,
    )
    .bind(user.id)
    .bind(user.name)
    .bind(user.email)
    .bind(user.password_hash)
    .bind(user.role.as_str())
    .bind(user.otp_code)
    .bind(user.otp_expires_at.map(to_millis))
    .bind(user.is_email_verified)
    .bind(to_millis(user.now))
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(ApiError::BadRequest(
            "User already exists with this email".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_user(pool: &SqlitePool, id: &str) -> Result<bool> {
    let done = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

pub async fn set_otp(
    pool: &SqlitePool,
    id: &str,
    code: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE users SET otp_code = ?2, otp_expires_at = ?3, updated_at = ?4 WHERE id = ?1")
        .bind(id)
        .bind(code)
        .bind(to_millis(expires_at))
        .bind(to_millis(now))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_email_verified(pool: &SqlitePool, id: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET    is_email_verified = 1, otp_code = NULL, otp_expires_at = NULL, updated_at = ?2
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .bind(to_millis(now))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_reset_token(
    pool: &SqlitePool,
    id: &str,
    token: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE users SET reset_token = ?2, reset_expires_at = ?3, updated_at = ?4 WHERE id = ?1",
    )
    .bind(id)
    .bind(token)
    .bind(to_millis(expires_at))
    .bind(to_millis(now))
    .execute(pool)
    .await?;
    Ok(())
}

/// Store a new password hash and burn the reset token.
pub async fn reset_password(
    pool: &SqlitePool,
    id: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET    password_hash = ?2, reset_token = NULL, reset_expires_at = NULL, updated_at = ?3
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .bind(password_hash)
    .bind(to_millis(now))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_kyc_verified(
    pool: &SqlitePool,
    id: &str,
    details: &KycDetails,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET    kyc_status = 'VERIFIED', kyc_name = ?2, kyc_id_number = ?3, kyc_id_type = ?4,
               kyc_verified_at = ?5, kyc_face_match_score = ?6, updated_at = ?7
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .bind(&details.name)
    .bind(&details.id_number)
    .bind(details.id_type.map(|t| t.as_str()))
    .bind(details.verified_at.map(to_millis))
    .bind(details.face_match_score)
    .bind(to_millis(now))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_kyc_status(
    pool: &SqlitePool,
    id: &str,
    status: KycStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let done = sqlx::query("UPDATE users SET kyc_status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(status.as_str())
        .bind(to_millis(now))
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

pub async fn set_role(pool: &SqlitePool, id: &str, role: UserRole, now: DateTime<Utc>) -> Result<bool> {
    let done = sqlx::query("UPDATE users SET role = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(id)
        .bind(role.as_str())
        .bind(to_millis(now))
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<UserRecord>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(UserRecord::try_from).transpose()
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<UserRecord>> {
    let row =
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))
            .bind(email)
            .fetch_optional(pool)
            .await?;
    row.map(UserRecord::try_from).transpose()
}

pub async fn find_by_reset_token(pool: &SqlitePool, token: &str) -> Result<Option<UserRecord>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE reset_token = ?1"
    ))
    .bind(token)
    .fetch_optional(pool)
    .await?;
    row.map(UserRecord::try_from).transpose()
}

/// Whether another account already verified with the same identity number.
pub async fn id_number_taken(pool: &SqlitePool, id_number: &str, except_user: &str) -> Result<bool> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM users WHERE kyc_id_number = ?1 AND id != ?2 LIMIT 1")
            .bind(id_number)
            .bind(except_user)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

pub async fn list(pool: &SqlitePool, window: PageWindow) -> Result<(Vec<UserRecord>, i64)> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
    ))
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool)
    .await?;
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let users = rows
        .into_iter()
        .map(UserRecord::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok((users, total))
}

/// Head counts for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounts {
    pub total: i64,
    pub admins: i64,
    pub regular_users: i64,
    pub pending_kyc: i64,
}

pub async fn counts(pool: &SqlitePool) -> Result<UserCounts> {
    let (total, admins, regular_users, pending_kyc): (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(role IN ('admin', 'super_admin')), 0),
               COALESCE(SUM(role = 'user'), 0),
               COALESCE(SUM(kyc_status = 'PENDING'), 0)
        FROM   users
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(UserCounts {
        total,
        admins,
        regular_users,
        pending_kyc,
    })
}

/// Other accounts bound to an identity number.
pub async fn count_id_number(pool: &SqlitePool, id_number: &str, except_user: &str) -> Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE kyc_id_number = ?1 AND id != ?2")
            .bind(id_number)
            .bind(except_user)
            .fetch_one(pool)
            .await?;
    Ok(n)
}

/// Users for the manual KYC review queue; all users when `status` is `None`.
pub async fn list_by_kyc_status(
    pool: &SqlitePool,
    status: Option<KycStatus>,
) -> Result<Vec<UserRecord>> {
    let rows = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        SELECT {USER_COLUMNS} FROM users
        WHERE  ?1 IS NULL OR kyc_status = ?1
        ORDER  BY updated_at DESC
        "#
    ))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(UserRecord::try_from).collect()
}

/// Number of campaigns that keep a user from being deleted.
pub async fn count_open_campaigns(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM campaigns WHERE creator_id = ?1 AND status IN ('active', 'pending_review')",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
