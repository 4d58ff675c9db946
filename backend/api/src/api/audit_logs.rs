//! Audit trail retrieval for super admins.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{ok, ApiResult, ApiState, Pagination};
use crate::audit::AuditEntry;
use crate::db::{audit, audit::AuditFilter, PageWindow};
use crate::errors::ApiError;
use crate::session::SuperAdmin;

const LOG_LIMIT: u32 = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// A bare date covers the whole UTC day; RFC 3339 instants are taken as is.
fn parse_bound(field: &str, raw: &str, bound: Bound) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::field(field, format!("{field} must be a date (YYYY-MM-DD)")))?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ApiError::field(field, "invalid date"))?
        .and_utc();
    Ok(match bound {
        Bound::Start => midnight,
        Bound::End => midnight + Duration::days(1) - Duration::milliseconds(1),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AuditQuery {
    fn filter(&self) -> Result<AuditFilter, ApiError> {
        let from = non_blank(self.start_date.clone())
            .map(|d| parse_bound("startDate", &d, Bound::Start))
            .transpose()?;
        let to = non_blank(self.end_date.clone())
            .map(|d| parse_bound("endDate", &d, Bound::End))
            .transpose()?;
        Ok(AuditFilter {
            actor_email: non_blank(self.actor.clone()),
            action: non_blank(self.action.clone()),
            from,
            to,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AuditPage {
    pub logs: Vec<AuditEntry>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// `GET /audit-logs?actor&action&startDate&endDate&page&limit`
async fn list_audit_logs(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(_admin): SuperAdmin,
    Query(query): Query<AuditQuery>,
) -> ApiResult<AuditPage> {
    let filter = query.filter()?;
    let window = PageWindow::new(query.page, query.limit, LOG_LIMIT);
    let (logs, total) = audit::query(&state.pool, &filter, window).await?;
    ok(AuditPage {
        logs,
        pagination: Pagination::new(window, total),
    })
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/audit-logs", get(list_audit_logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_bounds_cover_whole_day() {
        let start = parse_bound("startDate", "2026-03-01", Bound::Start).unwrap();
        let end = parse_bound("endDate", "2026-03-01", Bound::End).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
        assert!(parse_bound("startDate", "01/03/2026", Bound::Start).is_err());
    }

    #[test]
    fn blank_filters_are_dropped() {
        let query = AuditQuery {
            actor: Some("  ".into()),
            action: Some("kyc_approve".into()),
            start_date: Some(String::new()),
            ..Default::default()
        };
        let filter = query.filter().unwrap();
        assert_eq!(filter.actor_email, None);
        assert_eq!(filter.action.as_deref(), Some("kyc_approve"));
        assert!(filter.from.is_none() && filter.to.is_none());
    }
}
