//! Campaign reports and comments.

use chrono::{DateTime, Utc};
use crowdfund_protocol::ReportStatus;
use serde::Serialize;
use sqlx::SqlitePool;

use super::{from_millis, from_millis_opt, parse_wire, to_millis};
use crate::errors::{ApiError, Result};

// ─────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub campaign_id: String,
    pub reporter_id: Option<String>,
    pub reporter_name: String,
    pub reason: String,
    pub status: ReportStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: String,
    campaign_id: String,
    reporter_id: Option<String>,
    reporter_name: String,
    reason: String,
    status: String,
    admin_notes: Option<String>,
    reviewed_by: Option<String>,
    reviewed_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<ReportRow> for Report {
    type Error = ApiError;

    fn try_from(row: ReportRow) -> Result<Self> {
        Ok(Report {
            id: row.id,
            campaign_id: row.campaign_id,
            reporter_id: row.reporter_id,
            reporter_name: row.reporter_name,
            reason: row.reason,
            status: parse_wire(&row.status)?,
            admin_notes: row.admin_notes,
            reviewed_by: row.reviewed_by,
            reviewed_at: from_millis_opt(row.reviewed_at)?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

const REPORT_COLUMNS: &str = r#"
    id, campaign_id, reporter_id, reporter_name, reason, status, admin_notes,
    reviewed_by, reviewed_at, created_at
"#;

pub async fn insert_report(pool: &SqlitePool, report: &Report) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reports
            (id, campaign_id, reporter_id, reporter_name, reason, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        "#,
    )
    .bind(&report.id)
    .bind(&report.campaign_id)
    .bind(&report.reporter_id)
    .bind(&report.reporter_name)
    .bind(&report.reason)
    .bind(report.status.as_str())
    .bind(to_millis(report.created_at))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn save_review(pool: &SqlitePool, report: &Report) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE reports
        SET    status = ?2, admin_notes = ?3, reviewed_by = ?4, reviewed_at = ?5, updated_at = ?5
        WHERE  id = ?1
        "#,
    )
    .bind(&report.id)
    .bind(report.status.as_str())
    .bind(&report.admin_notes)
    .bind(&report.reviewed_by)
    .bind(report.reviewed_at.map(to_millis))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_report(pool: &SqlitePool, id: &str) -> Result<Option<Report>> {
    let row = sqlx::query_as::<_, ReportRow>(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(Report::try_from).transpose()
}

/// All reports, or those of one campaign, newest first.
pub async fn list_reports(pool: &SqlitePool, campaign_id: Option<&str>) -> Result<Vec<Report>> {
    let rows = sqlx::query_as::<_, ReportRow>(&format!(
        r#"
        SELECT {REPORT_COLUMNS} FROM reports
        WHERE  ?1 IS NULL OR campaign_id = ?1
        ORDER  BY created_at DESC
        "#
    ))
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Report::try_from).collect()
}

// ─────────────────────────────────────────────────────────
// Comments
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub campaign_id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    campaign_id: String,
    user_id: String,
    user_name: String,
    text: String,
    created_at: i64,
}

impl TryFrom<CommentRow> for Comment {
    type Error = ApiError;

    fn try_from(row: CommentRow) -> Result<Self> {
        Ok(Comment {
            id: row.id,
            campaign_id: row.campaign_id,
            user_id: row.user_id,
            user_name: row.user_name,
            text: row.text,
            created_at: from_millis(row.created_at)?,
        })
    }
}

pub async fn insert_comment(pool: &SqlitePool, comment: &Comment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO comments (id, campaign_id, user_id, user_name, text, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&comment.id)
    .bind(&comment.campaign_id)
    .bind(&comment.user_id)
    .bind(&comment.user_name)
    .bind(&comment.text)
    .bind(to_millis(comment.created_at))
    .execute(pool)
    .await?;
    Ok(())
}

/// Comments of one campaign, or all comments, newest first.
pub async fn list_comments(pool: &SqlitePool, campaign_id: Option<&str>) -> Result<Vec<Comment>> {
    let rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT id, campaign_id, user_id, user_name, text, created_at
        FROM   comments
        WHERE  ?1 IS NULL OR campaign_id = ?1
        ORDER  BY created_at DESC
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Comment::try_from).collect()
}

pub async fn delete_comment(pool: &SqlitePool, id: &str) -> Result<bool> {
    let done = sqlx::query("DELETE FROM comments WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected() > 0)
}
