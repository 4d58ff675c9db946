//! Campaign reports from users and their review by admins.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use crowdfund_protocol::{NotificationKind, ReportStatus};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{created, ok, ok_with, ApiResult, ApiState, JsonBody};
use crate::audit::{audited, AuditEvent, AuditTarget};
use crate::db::{campaigns, moderation, moderation::Report, users};
use crate::errors::ApiError;
use crate::notify::{self, notification, send_quietly, Email};
use crate::session::{AuthAdmin, AuthUser, ClientIp};

const REASON_MAX: usize = 1000;
const ANONYMOUS_REPORTER: &str = "Anonymous";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReport {
    pub campaign_id: Option<String>,
    pub reason: Option<String>,
}

impl SubmitReport {
    fn into_parts(self) -> Result<(String, String), ApiError> {
        let campaign_id = self.campaign_id.map(|c| c.trim().to_string()).unwrap_or_default();
        let reason = self.reason.map(|r| r.trim().to_string()).unwrap_or_default();
        if campaign_id.is_empty() || reason.is_empty() {
            return Err(ApiError::BadRequest(
                "Campaign ID and reason are required".to_string(),
            ));
        }
        if reason.chars().count() > REASON_MAX {
            return Err(ApiError::field(
                "reason",
                "reason cannot exceed 1000 characters",
            ));
        }
        Ok((campaign_id, reason))
    }
}

async fn file_report(
    state: &ApiState,
    req: SubmitReport,
    reporter: Option<(String, String)>,
) -> Result<Report, ApiError> {
    let (campaign_id, reason) = req.into_parts()?;
    if campaigns::find(&state.pool, &campaign_id).await?.is_none() {
        return Err(ApiError::not_found("Campaign"));
    }
    let (reporter_id, reporter_name) = match reporter {
        Some((id, name)) => (Some(id), name),
        None => (None, ANONYMOUS_REPORTER.to_string()),
    };
    let report = Report {
        id: Uuid::new_v4().to_string(),
        campaign_id,
        reporter_id,
        reporter_name,
        reason,
        status: ReportStatus::Pending,
        admin_notes: None,
        reviewed_by: None,
        reviewed_at: None,
        created_at: Utc::now(),
    };
    moderation::insert_report(&state.pool, &report).await?;
    info!(report_id = %report.id, campaign_id = %report.campaign_id, "Report filed");
    Ok(report)
}

/// `POST /reports/submit`
async fn submit(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<SubmitReport>,
) -> Result<impl IntoResponse, ApiError> {
    let report = file_report(&state, req, Some((user.id, user.name))).await?;
    created("Report submitted successfully", report)
}

/// `POST /reports/submit-anonymous`
async fn submit_anonymous(
    State(state): State<Arc<ApiState>>,
    JsonBody(req): JsonBody<SubmitReport>,
) -> Result<impl IntoResponse, ApiError> {
    let report = file_report(&state, req, None).await?;
    created("Report submitted successfully", report)
}

/// `GET /reports`
async fn list_reports(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
) -> ApiResult<Vec<Report>> {
    ok(moderation::list_reports(&state.pool, None).await?)
}

/// `GET /reports/campaign/:id`
async fn campaign_reports(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Path(campaign_id): Path<String>,
) -> ApiResult<Vec<Report>> {
    ok(moderation::list_reports(&state.pool, Some(&campaign_id)).await?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    pub status: Option<String>,
    pub admin_notes: Option<String>,
}

/// `rejected` is accepted as a synonym of `dismissed`.
fn review_status(raw: Option<&str>, current: ReportStatus) -> Result<ReportStatus, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(current),
        Some("rejected") => Ok(ReportStatus::Dismissed),
        Some(other) => other
            .parse()
            .map_err(|_| ApiError::field("status", format!("Unknown report status '{other}'"))),
    }
}

/// Tell the reporter and the campaign creator that a report was resolved.
async fn announce_resolution(state: &ApiState, report: &Report) -> Result<(), ApiError> {
    let Some(campaign) = campaigns::find(&state.pool, &report.campaign_id).await? else {
        return Ok(());
    };
    let now = Utc::now();
    let mut batch = Vec::new();
    let mut mails = Vec::new();

    if let Some(reporter_id) = &report.reporter_id {
        if let Some(reporter) = users::find_by_id(&state.pool, reporter_id).await? {
            let message = format!(
                "Your report for campaign \"{}\" has been resolved.",
                campaign.title
            );
            batch.push(
                notification(&reporter.id, NotificationKind::Report, message.clone(), now)
                    .for_campaign(&campaign.id),
            );
            mails.push(Email::new(
                &reporter.email,
                "Your Report Resolved",
                format!("Hello {},\n\n{message}\n", reporter.name),
            ));
        }
    }
    if let Some(creator) = users::find_by_id(&state.pool, &campaign.creator_id).await? {
        let message = format!(
            "A report for your campaign \"{}\" has been resolved by admin.",
            campaign.title
        );
        batch.push(
            notification(&creator.id, NotificationKind::Report, message.clone(), now)
                .for_campaign(&campaign.id),
        );
        mails.push(Email::new(
            &creator.email,
            "Report Resolved on Your Campaign",
            format!("Hello {},\n\n{message}\n", creator.name),
        ));
    }

    notify::deliver(&state.pool, batch).await;
    for mail in mails {
        send_quietly(state.mailer.as_ref(), mail).await;
    }
    Ok(())
}

/// `PATCH /reports/:id`
async fn review(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ReviewReport>,
) -> ApiResult<Report> {
    let mut report = moderation::find_report(&state.pool, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Report"))?;
    report.status = review_status(req.status.as_deref(), report.status)?;
    if let Some(notes) = req.admin_notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        report.admin_notes = Some(notes);
    }
    report.reviewed_by = Some(admin.id.clone());
    report.reviewed_at = Some(Utc::now());

    let event = AuditEvent::new("report_update", &admin, AuditTarget::Report { id: id.clone() })
        .detail("status", report.status.as_str())
        .ip(ip);
    audited(&state.pool, event, moderation::save_review(&state.pool, &report)).await?;

    if report.status == ReportStatus::Resolved {
        announce_resolution(&state, &report).await?;
    }
    ok_with("Report updated successfully", report)
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/reports", get(list_reports))
        .route("/reports/submit", post(submit))
        .route("/reports/submit-anonymous", post(submit_anonymous))
        .route("/reports/campaign/:id", get(campaign_reports))
        .route("/reports/:id", patch(review))
}
