//! In-app notifications.

use chrono::{DateTime, Utc};
use crowdfund_protocol::NotificationKind;
use serde::Serialize;
use sqlx::SqlitePool;

use super::{from_millis, parse_wire, to_millis, PageWindow};
use crate::errors::{ApiError, Result};

/// A file linked from a notification (e.g. a new proof document).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedDocument {
    pub title: String,
    pub file_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub message: String,
    /// Display label for the admin view: user email, `All`, or campaign title.
    pub recipient: Option<String>,
    pub campaign_id: Option<String>,
    pub document: Option<LinkedDocument>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    kind: String,
    message: String,
    recipient: Option<String>,
    campaign_id: Option<String>,
    document_title: Option<String>,
    document_url: Option<String>,
    read: bool,
    created_at: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = ApiError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        let document = match (row.document_title, row.document_url) {
            (Some(title), Some(file_url)) => Some(LinkedDocument { title, file_url }),
            _ => None,
        };
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            kind: parse_wire(&row.kind)?,
            message: row.message,
            recipient: row.recipient,
            campaign_id: row.campaign_id,
            document,
            read: row.read,
            created_at: from_millis(row.created_at)?,
        })
    }
}

const NOTIFICATION_COLUMNS: &str = r#"
    id, user_id, kind, message, recipient, campaign_id, document_title, document_url,
    read, created_at
"#;

/// Insert a batch in one transaction.
pub async fn insert_many(pool: &SqlitePool, batch: &[Notification]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for n in batch {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, kind, message, recipient, campaign_id, document_title,
                 document_url, read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&n.id)
        .bind(&n.user_id)
        .bind(n.kind.as_str())
        .bind(&n.message)
        .bind(&n.recipient)
        .bind(&n.campaign_id)
        .bind(n.document.as_ref().map(|d| d.title.as_str()))
        .bind(n.document.as_ref().map(|d| d.file_url.as_str()))
        .bind(n.read)
        .bind(to_millis(n.created_at))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn list_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Notification>> {
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        r#"
        SELECT {NOTIFICATION_COLUMNS} FROM notifications
        WHERE  user_id = ?1
        ORDER  BY created_at DESC
        "#
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Notification::try_from).collect()
}

/// Every notification, newest first, for the admin view.
pub async fn list_all(pool: &SqlitePool, window: PageWindow) -> Result<(Vec<Notification>, i64)> {
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        r#"
        SELECT {NOTIFICATION_COLUMNS} FROM notifications
        ORDER  BY created_at DESC
        LIMIT  ?1 OFFSET ?2
        "#
    ))
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool)
    .await?;
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications")
        .fetch_one(pool)
        .await?;
    let notifications = rows
        .into_iter()
        .map(Notification::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok((notifications, total))
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: &str) -> Result<u64> {
    let done = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(done.rows_affected())
}

/// Every user as `(id, email)`, for broadcast notifications.
pub async fn all_recipients(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, email FROM users")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}
