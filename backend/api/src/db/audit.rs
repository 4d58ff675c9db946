//! Audit log persistence and filtered retrieval.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{from_millis, to_millis, PageWindow};
use crate::audit::{AuditActor, AuditEntry, AuditEvent};
use crate::errors::{ApiError, Result};

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    action: String,
    actor_id: String,
    actor_name: String,
    actor_email: String,
    actor_role: String,
    target: String,
    details: Option<String>,
    ip: Option<String>,
    created_at: i64,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = ApiError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(AuditEntry {
            id: row.id,
            action: row.action,
            actor: AuditActor {
                id: row.actor_id,
                name: row.actor_name,
                email: row.actor_email,
                role: row.actor_role,
            },
            target: serde_json::from_str(&row.target)
                .map_err(|e| ApiError::Corrupt(format!("audit target: {e}")))?,
            details: match row.details {
                Some(d) => serde_json::from_str(&d)
                    .map_err(|e| ApiError::Corrupt(format!("audit details: {e}")))?,
                None => Default::default(),
            },
            ip: row.ip,
            created_at: from_millis(row.created_at)?,
        })
    }
}

/// Retrieval filter. All bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Case-insensitive substring of the actor's email.
    pub actor_email: Option<String>,
    /// Exact action tag.
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Escape `%`, `_` and `\` so user input matches literally inside `LIKE`.
/// Folded the same way as `actor_email_folded`.
fn like_contains(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

pub async fn insert(pool: &SqlitePool, event: &AuditEvent, now: DateTime<Utc>) -> Result<()> {
    let details = if event.details.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&event.details)?)
    };
    sqlx::query(
        r#"
        INSERT INTO audit_logs
            (action, actor_id, actor_name, actor_email, actor_email_folded, actor_role, target,
             details, ip, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(event.action)
    .bind(&event.actor.id)
    .bind(&event.actor.name)
    .bind(&event.actor.email)
    .bind(event.actor.email.to_lowercase())
    .bind(&event.actor.role)
    .bind(serde_json::to_string(&event.target)?)
    .bind(details)
    .bind(&event.ip)
    .bind(to_millis(now))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn query(
    pool: &SqlitePool,
    filter: &AuditFilter,
    window: PageWindow,
) -> Result<(Vec<AuditEntry>, i64)> {
    let email = filter.actor_email.as_deref().map(like_contains);
    let from = filter.from.map(to_millis);
    let to = filter.to.map(to_millis);
    let predicate = r#"
        WHERE (?1 IS NULL OR actor_email_folded LIKE ?1 ESCAPE '\')
          AND (?2 IS NULL OR action = ?2)
          AND (?3 IS NULL OR created_at >= ?3)
          AND (?4 IS NULL OR created_at <= ?4)
    "#;

    let rows = sqlx::query_as::<_, AuditRow>(&format!(
        r#"
        SELECT id, action, actor_id, actor_name, actor_email, actor_role, target, details, ip,
               created_at
        FROM   audit_logs
        {predicate}
        ORDER  BY created_at DESC, id DESC
        LIMIT  ?5 OFFSET ?6
        "#
    ))
    .bind(&email)
    .bind(&filter.action)
    .bind(from)
    .bind(to)
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM audit_logs {predicate}"))
        .bind(&email)
        .bind(&filter.action)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;

    let entries = rows
        .into_iter()
        .map(AuditEntry::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok((entries, total))
}
