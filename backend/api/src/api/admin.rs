//! Moderation endpoints for administrators.
//!
//! Every mutation runs inside [`audited`], so a successful change leaves an
//! audit entry and a refused one leaves nothing.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use crowdfund_protocol::{
    lifecycle,
    withdrawal::{self, Decision},
    Campaign, CampaignStatus, Donation, KycStatus, NotificationKind, ProofDocument, UserRole,
    Withdrawal, WithdrawalStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::campaigns::CampaignPage;
use super::donations::DonationPage;
use super::kyc::UserKyc;
use super::{done, ok, ok_with, ApiResult, ApiState, JsonBody, PageQuery, Pagination};
use crate::audit::{self, audited, AuditEvent, AuditTarget};
use crate::db::{
    admins::AdminRecord, campaigns, donations, moderation, moderation::Comment, notifications,
    notifications::Notification, users, users::UserCounts, users::UserRecord, withdrawals,
    PageWindow,
};
use crate::errors::ApiError;
use crate::notify::{self, notification, send_quietly, Email};
use crate::session::{AuthAdmin, ClientIp};

const QUEUE_LIMIT: u32 = 10;
const FEED_LIMIT: u32 = 20;
const RECENT_LIMIT: u32 = 5;

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Blank and `all` mean no filter.
fn parse_filter<T: FromStr>(raw: Option<&str>) -> Result<Option<T>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ApiError::field("status", format!("Unknown status '{value}'"))),
    }
}

async fn load_campaign(state: &ApiState, id: &str) -> Result<Campaign, ApiError> {
    campaigns::find(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign"))
}

async fn persist_transition(
    state: &ApiState,
    campaign: &Campaign,
    expected: CampaignStatus,
) -> Result<(), ApiError> {
    if campaigns::save_transition(&state.pool, campaign, expected).await? {
        Ok(())
    } else {
        Err(ApiError::Conflict(
            "Campaign changed while it was being updated, please retry".to_string(),
        ))
    }
}

fn campaign_target(campaign: &Campaign) -> AuditTarget {
    AuditTarget::Campaign {
        id: campaign.id.clone(),
        title: Some(campaign.title.clone()),
    }
}

// ─────────────────────────────────────────────────────────
// Dashboard
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCounts {
    pub total: i64,
    pub active: i64,
    pub pending: i64,
    pub completed: i64,
}

impl CampaignCounts {
    fn from_rows(rows: &[(CampaignStatus, i64)]) -> Self {
        rows.iter()
            .fold(Self::default(), |mut counts, &(status, n)| {
                counts.total += n;
                match status {
                    CampaignStatus::Active => counts.active += n,
                    CampaignStatus::PendingReview => counts.pending += n,
                    CampaignStatus::Completed => counts.completed += n,
                    _ => {}
                }
                counts
            })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationSummary {
    pub total: usize,
    pub amount_raised: Decimal,
}

#[derive(Debug, Serialize)]
pub struct RecentActivity {
    pub users: Vec<UserRecord>,
    pub campaigns: Vec<Campaign>,
    pub donations: Vec<Donation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub users: UserCounts,
    pub campaigns: CampaignCounts,
    pub donations: DonationSummary,
    pub recent_activity: RecentActivity,
}

/// `GET /admin/dashboard`
async fn dashboard(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
) -> ApiResult<Dashboard> {
    let amounts = donations::completed_amounts(&state.pool, None).await?;
    let recent = PageWindow::new(Some(1), Some(RECENT_LIMIT), RECENT_LIMIT);
    let (recent_users, _) = users::list(&state.pool, recent).await?;
    let (recent_campaigns, _) = campaigns::list_by_status(&state.pool, None, recent).await?;

    let board = Dashboard {
        users: users::counts(&state.pool).await?,
        campaigns: CampaignCounts::from_rows(&campaigns::count_by_status(&state.pool).await?),
        donations: DonationSummary {
            total: amounts.len(),
            amount_raised: amounts.iter().sum(),
        },
        recent_activity: RecentActivity {
            users: recent_users,
            campaigns: recent_campaigns,
            donations: donations::recent_completed(&state.pool, i64::from(RECENT_LIMIT)).await?,
        },
    };

    let mut fields = BTreeMap::new();
    fields.insert("view".to_string(), "dashboard".to_string());
    audit::emit(
        &state.pool,
        &AuditEvent::new("dashboard_access", &admin, AuditTarget::Other { fields }).ip(ip),
    )
    .await;
    ok(board)
}

// ─────────────────────────────────────────────────────────
// Campaign moderation
// ─────────────────────────────────────────────────────────

/// `GET /admin/campaigns?status=`
async fn list_campaigns(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Query(query): Query<FilterQuery>,
) -> ApiResult<CampaignPage> {
    let status = parse_filter::<CampaignStatus>(query.status.as_deref())?;
    let window = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .window(QUEUE_LIMIT);
    let (campaigns, total) = campaigns::list_by_status(&state.pool, status, window).await?;
    ok(CampaignPage {
        campaigns,
        pagination: Pagination::new(window, total),
    })
}

/// `PUT /admin/campaigns/:id/approve`
async fn approve_campaign(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<Campaign> {
    let mut campaign = load_campaign(&state, &id).await?;
    let expected = campaign.status;
    let now = Utc::now();
    lifecycle::approve(&mut campaign, now)?;

    let event = AuditEvent::new("campaign_approve", &admin, campaign_target(&campaign))
        .detail("previousStatus", expected.as_str())
        .ip(ip);
    audited(
        &state.pool,
        event,
        persist_transition(&state, &campaign, expected),
    )
    .await?;

    notify::deliver(
        &state.pool,
        vec![notification(
            &campaign.creator_id,
            NotificationKind::Campaign,
            format!("Your campaign \"{}\" has been approved and is now live.", campaign.title),
            now,
        )
        .for_campaign(&campaign.id)],
    )
    .await;
    info!(campaign_id = %id, admin_id = %admin.id, "Campaign approved");
    ok_with("Campaign approved successfully", campaign)
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectCampaignRequest {
    pub reason: Option<String>,
}

/// `PUT /admin/campaigns/:id/reject`
async fn reject_campaign(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    body: Option<JsonBody<RejectCampaignRequest>>,
) -> ApiResult<Campaign> {
    let reason = body.and_then(|JsonBody(b)| b.reason);
    let mut campaign = load_campaign(&state, &id).await?;
    let expected = campaign.status;
    let now = Utc::now();
    lifecycle::reject(&mut campaign, reason, now)?;

    let mut event = AuditEvent::new("campaign_reject", &admin, campaign_target(&campaign)).ip(ip);
    if let Some(reason) = &campaign.rejection_reason {
        event = event.detail("reason", reason.clone());
    }
    audited(
        &state.pool,
        event,
        persist_transition(&state, &campaign, expected),
    )
    .await?;

    let message = match &campaign.rejection_reason {
        Some(reason) => format!(
            "Your campaign \"{}\" was rejected. Reason: {reason}",
            campaign.title
        ),
        None => format!("Your campaign \"{}\" was rejected.", campaign.title),
    };
    notify::deliver(
        &state.pool,
        vec![
            notification(&campaign.creator_id, NotificationKind::Campaign, message, now)
                .for_campaign(&campaign.id),
        ],
    )
    .await;
    info!(campaign_id = %id, admin_id = %admin.id, "Campaign rejected");
    ok_with("Campaign rejected", campaign)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsReleased {
    pub campaign_id: String,
    pub status: CampaignStatus,
    pub funds_released: bool,
}

/// `POST /admin/campaigns/:id/release-funds`
async fn release_funds(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<FundsReleased> {
    let mut campaign = load_campaign(&state, &id).await?;
    let expected = campaign.status;
    lifecycle::release_funds(&mut campaign, Utc::now())?;

    let event = AuditEvent::new("campaign_release_funds", &admin, campaign_target(&campaign))
        .detail("amount", campaign.current_amount.to_string())
        .ip(ip);
    audited(
        &state.pool,
        event,
        persist_transition(&state, &campaign, expected),
    )
    .await?;

    info!(campaign_id = %id, amount = %campaign.current_amount, "Funds released");
    ok_with(
        "Funds released and campaign marked as completed.",
        FundsReleased {
            campaign_id: campaign.id,
            status: campaign.status,
            funds_released: campaign.funds_released,
        },
    )
}

/// Everything a reviewer looks at before approving a campaign.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDocuments {
    pub campaign_id: String,
    pub title: String,
    pub status: CampaignStatus,
    pub is_voting_enabled: bool,
    pub documents: Vec<ProofDocument>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

impl From<Campaign> for CampaignDocuments {
    fn from(c: Campaign) -> Self {
        Self {
            campaign_id: c.id,
            title: c.title,
            status: c.status,
            is_voting_enabled: c.is_voting_enabled,
            documents: c.proof_documents,
            images: c.images,
            videos: c.videos,
        }
    }
}

/// `GET /admin/campaigns/:id/documents`
async fn campaign_documents(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Path(id): Path<String>,
) -> ApiResult<CampaignDocuments> {
    ok(load_campaign(&state, &id).await?.into())
}

/// Text sent to a creator once their proof documents are in review.
fn review_notice(campaign: &Campaign) -> (NotificationKind, &'static str) {
    if campaign.is_voting_enabled {
        (
            NotificationKind::VotingDocument,
            "The campaigner has uploaded proof documents for public review. \
             You can now participate in the review process.",
        )
    } else {
        (
            NotificationKind::Campaign,
            "The campaigner has uploaded proof documents for admin verification. \
             Thank you for your support!",
        )
    }
}

/// `POST /admin/campaigns/:id/notify`
async fn notify_creator(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let campaign = load_campaign(&state, &id).await?;
    let (kind, message) = review_notice(&campaign);
    let batch = [notification(&campaign.creator_id, kind, message, Utc::now())
        .for_campaign(&campaign.id)];

    let event = AuditEvent::new("campaign_notify_creator", &admin, campaign_target(&campaign))
        .detail("kind", kind.as_str())
        .ip(ip);
    audited(
        &state.pool,
        event,
        notifications::insert_many(&state.pool, &batch),
    )
    .await?;
    done("Notification sent to campaign creator.")
}

/// `DELETE /admin/campaigns/:id`, soft delete of a campaign nobody has donated to.
async fn delete_campaign(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let mut campaign = load_campaign(&state, &id).await?;
    if campaign.status == CampaignStatus::Deleted {
        return Err(ApiError::not_found("Campaign"));
    }
    if donations::count_for_campaign(&state.pool, &id).await? > 0 {
        return Err(ApiError::BadRequest(
            "Cannot delete campaign with existing donations".to_string(),
        ));
    }
    let expected = campaign.status;
    lifecycle::remove(&mut campaign, Utc::now())?;

    let event = AuditEvent::new("campaign_delete", &admin, campaign_target(&campaign)).ip(ip);
    audited(
        &state.pool,
        event,
        persist_transition(&state, &campaign, expected),
    )
    .await?;
    done("Campaign deleted successfully")
}

// ─────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<UserRecord>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// `GET /admin/users`
async fn list_users(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Query(page): Query<PageQuery>,
) -> ApiResult<UserPage> {
    let window = page.window(QUEUE_LIMIT);
    let (users, total) = users::list(&state.pool, window).await?;
    ok(UserPage {
        users,
        pagination: Pagination::new(window, total),
    })
}

async fn load_user(state: &ApiState, id: &str) -> Result<UserRecord, ApiError> {
    users::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

fn user_target(user: &UserRecord) -> AuditTarget {
    AuditTarget::User {
        id: user.id.clone(),
        email: Some(user.email.clone()),
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChanged {
    pub user_id: String,
    pub role: UserRole,
}

/// `PUT /admin/users/:id/role`
async fn update_user_role(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RoleRequest>,
) -> ApiResult<RoleChanged> {
    let role: UserRole = req
        .role
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid role".to_string()))?;
    let user = load_user(&state, &id).await?;

    let event = AuditEvent::new("user_role_update", &admin, user_target(&user))
        .detail("from", user.role.as_str())
        .detail("to", role.as_str())
        .ip(ip);
    audited(&state.pool, event, async {
        users::set_role(&state.pool, &user.id, role, Utc::now()).await?;
        Ok::<_, ApiError>(())
    })
    .await?;

    ok_with(
        "User role updated successfully",
        RoleChanged {
            user_id: user.id,
            role,
        },
    )
}

/// `DELETE /admin/users/:id`
async fn delete_user(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let user = load_user(&state, &id).await?;
    if users::count_open_campaigns(&state.pool, &user.id).await? > 0 {
        return Err(ApiError::BadRequest(
            "Cannot delete user with active campaigns".to_string(),
        ));
    }

    let event = AuditEvent::new("user_delete", &admin, user_target(&user)).ip(ip);
    audited(&state.pool, event, async {
        users::delete_user(&state.pool, &user.id).await?;
        Ok::<_, ApiError>(())
    })
    .await?;
    info!(user_id = %id, admin_id = %admin.id, "User deleted");
    done("User deleted successfully")
}

// ─────────────────────────────────────────────────────────
// Manual KYC review
// ─────────────────────────────────────────────────────────

/// `GET /admin/kyc-users?status=`
async fn kyc_users(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Query(query): Query<FilterQuery>,
) -> ApiResult<Vec<UserRecord>> {
    let status = parse_filter::<KycStatus>(query.status.as_deref())?;
    ok(users::list_by_kyc_status(&state.pool, status).await?)
}

/// `GET /admin/users/:id/kyc`
async fn user_kyc(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Path(id): Path<String>,
) -> ApiResult<UserKyc> {
    let user = load_user(&state, &id).await?;
    if user.kyc.is_none() {
        return Err(ApiError::BadRequest("No KYC data found for user".to_string()));
    }
    ok(user.into())
}

async fn review_kyc(
    state: &ApiState,
    admin: &AdminRecord,
    ip: Option<String>,
    user_id: &str,
    verdict: KycStatus,
) -> Result<(), ApiError> {
    let user = load_user(state, user_id).await?;
    let now = Utc::now();
    let action = if verdict == KycStatus::Verified {
        "kyc_approve"
    } else {
        "kyc_reject"
    };
    let event = AuditEvent::new(action, admin, user_target(&user))
        .detail("from", user.kyc_status.as_str())
        .ip(ip);
    audited(&state.pool, event, async {
        users::set_kyc_status(&state.pool, &user.id, verdict, now).await?;
        Ok::<_, ApiError>(())
    })
    .await?;

    let message = if verdict == KycStatus::Verified {
        "Your identity verification has been approved."
    } else {
        "Your identity verification was rejected. Please submit your documents again."
    };
    notify::deliver(
        &state.pool,
        vec![notification(&user.id, NotificationKind::Kyc, message, now)],
    )
    .await;
    Ok(())
}

/// `PUT /admin/kyc/:userId/approve`
async fn approve_kyc(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(user_id): Path<String>,
) -> ApiResult<()> {
    review_kyc(&state, &admin, ip, &user_id, KycStatus::Verified).await?;
    done("KYC approved")
}

/// `PUT /admin/kyc/:userId/reject`
async fn reject_kyc(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(user_id): Path<String>,
) -> ApiResult<()> {
    review_kyc(&state, &admin, ip, &user_id, KycStatus::Failed).await?;
    done("KYC rejected")
}

// ─────────────────────────────────────────────────────────
// Withdrawals
// ─────────────────────────────────────────────────────────

/// `GET /admin/withdrawals?status=`
async fn list_withdrawals(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Query(query): Query<FilterQuery>,
) -> ApiResult<Vec<Withdrawal>> {
    let status = parse_filter::<WithdrawalStatus>(query.status.as_deref())?;
    ok(withdrawals::list_by_status(&state.pool, status).await?)
}

fn decision_text(w: &Withdrawal, title: &str, when: DateTime<Utc>) -> String {
    let date = when.format("%d/%m/%Y");
    match &w.rejection_reason {
        Some(reason) if w.status == WithdrawalStatus::Rejected => format!(
            "Your withdrawal request for campaign \"{title}\" (Amount: {}) was rejected. \
             Reason: \"{reason}\". Date: {date}",
            w.amount
        ),
        _ => format!(
            "Your withdrawal request for campaign \"{title}\" (Amount: {}) was approved. Date: {date}",
            w.amount
        ),
    }
}

/// Decide a pending withdrawal, then tell the requester in-app and by mail.
async fn settle_withdrawal(
    state: &ApiState,
    admin: &AdminRecord,
    ip: Option<String>,
    id: &str,
    decision: Decision,
) -> Result<Withdrawal, ApiError> {
    let mut request = withdrawals::find(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Withdrawal"))?;
    let action = match decision {
        Decision::Approve { .. } => "withdrawal_approve",
        Decision::Reject { .. } => "withdrawal_reject",
    };
    let now = Utc::now();
    withdrawal::decide(&mut request, &admin.id, decision, now)?;

    let mut event = AuditEvent::new(
        action,
        admin,
        AuditTarget::Withdrawal {
            id: request.id.clone(),
            campaign_id: request.campaign_id.clone(),
        },
    )
    .detail("amount", request.amount.to_string())
    .ip(ip);
    if let Some(reason) = &request.rejection_reason {
        event = event.detail("reason", reason.clone());
    }
    audited(&state.pool, event, async {
        if withdrawals::save_decision(&state.pool, &request).await? {
            Ok(())
        } else {
            Err(ApiError::Conflict(
                "Withdrawal request was already processed".to_string(),
            ))
        }
    })
    .await?;

    let title = campaigns::title_of(&state.pool, &request.campaign_id)
        .await?
        .unwrap_or_else(|| request.campaign_id.clone());
    let message = decision_text(&request, &title, now);
    if let Some(requester) = users::find_by_id(&state.pool, &request.requester_id).await? {
        notify::deliver(
            &state.pool,
            vec![
                notification(&requester.id, NotificationKind::Admin, message.clone(), now)
                    .for_campaign(&request.campaign_id)
                    .labelled(requester.email.clone()),
            ],
        )
        .await;
        let subject = if request.status == WithdrawalStatus::Rejected {
            "Withdrawal Request Rejected"
        } else {
            "Withdrawal Request Approved"
        };
        send_quietly(
            state.mailer.as_ref(),
            Email::new(&requester.email, subject, message),
        )
        .await;
    }
    info!(withdrawal_id = %id, status = %request.status, "Withdrawal decided");
    Ok(request)
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveWithdrawalRequest {
    pub notes: Option<String>,
}

/// `PUT /admin/withdrawals/:id/approve`
async fn approve_withdrawal(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    body: Option<JsonBody<ApproveWithdrawalRequest>>,
) -> ApiResult<Withdrawal> {
    let notes = body.and_then(|JsonBody(b)| b.notes);
    let request = settle_withdrawal(&state, &admin, ip, &id, Decision::Approve { notes }).await?;
    ok_with("Withdrawal approved", request)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectWithdrawalRequest {
    pub rejection_reason: Option<String>,
}

/// `PUT /admin/withdrawals/:id/reject`
async fn reject_withdrawal(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    body: Option<JsonBody<RejectWithdrawalRequest>>,
) -> ApiResult<Withdrawal> {
    let reason = body
        .and_then(|JsonBody(b)| b.rejection_reason)
        .unwrap_or_default();
    let request = settle_withdrawal(&state, &admin, ip, &id, Decision::Reject { reason }).await?;
    ok_with("Withdrawal rejected", request)
}

// ─────────────────────────────────────────────────────────
// Donations and comments
// ─────────────────────────────────────────────────────────

/// `GET /admin/donations`
async fn list_donations(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Query(page): Query<PageQuery>,
) -> ApiResult<DonationPage> {
    let window = page.window(FEED_LIMIT);
    let (donations, total) = donations::list_all(&state.pool, window).await?;
    ok(DonationPage {
        donations,
        pagination: Pagination::new(window, total),
    })
}

/// `GET /admin/comments`
async fn list_comments(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
) -> ApiResult<Vec<Comment>> {
    ok(moderation::list_comments(&state.pool, None).await?)
}

/// `DELETE /admin/comments/:id`
async fn delete_comment(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let event = AuditEvent::new("comment_delete", &admin, AuditTarget::Comment { id: id.clone() })
        .ip(ip);
    audited(&state.pool, event, async {
        if moderation::delete_comment(&state.pool, &id).await? {
            Ok(())
        } else {
            Err(ApiError::not_found("Comment"))
        }
    })
    .await?;
    done("Comment deleted successfully")
}

// ─────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub recipient_type: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub campaign_id: Option<String>,
    pub message: Option<String>,
}

/// Who a broadcast reaches, and the label shown for it in the admin feed.
#[derive(Debug)]
enum Audience {
    All { label: &'static str },
    User { id: String, email: String },
    Donors { campaign_id: String, ids: Vec<String> },
}

async fn resolve_audience(
    state: &ApiState,
    req: &SendNotificationRequest,
) -> Result<Audience, ApiError> {
    let blank = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match req.recipient_type.as_deref().map(str::trim) {
        Some("all") => Ok(Audience::All { label: "All" }),
        Some("user") => {
            let user = match (blank(&req.user_id), blank(&req.user_email)) {
                (Some(id), _) => users::find_by_id(&state.pool, &id).await?,
                (None, Some(email)) => {
                    users::find_by_email(&state.pool, &email.to_lowercase()).await?
                }
                (None, None) => {
                    return Err(ApiError::BadRequest(
                        "userId or userEmail is required for a single user".to_string(),
                    ))
                }
            };
            let user = user.ok_or_else(|| ApiError::not_found("User"))?;
            Ok(Audience::User {
                id: user.id,
                email: user.email,
            })
        }
        Some("campaignDonors") => {
            let campaign_id = blank(&req.campaign_id).ok_or_else(|| {
                ApiError::BadRequest("campaignId is required for campaignDonors".to_string())
            })?;
            let ids = donations::distinct_donors(&state.pool, Some(&campaign_id)).await?;
            if ids.is_empty() {
                Ok(Audience::All {
                    label: "All (fallback from campaign donors)",
                })
            } else {
                Ok(Audience::Donors { campaign_id, ids })
            }
        }
        _ => Err(ApiError::BadRequest(
            "recipientType must be all, user or campaignDonors".to_string(),
        )),
    }
}

/// `POST /admin/notifications`
async fn send_notification(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(admin): AuthAdmin,
    ClientIp(ip): ClientIp,
    JsonBody(req): JsonBody<SendNotificationRequest>,
) -> ApiResult<()> {
    let message = req
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    let (Some(message), Some(_)) = (message, req.recipient_type.as_deref()) else {
        return Err(ApiError::BadRequest(
            "Message and recipientType are required".to_string(),
        ));
    };
    let audience = resolve_audience(&state, &req).await?;
    let now = Utc::now();

    let batch: Vec<Notification> = match &audience {
        Audience::All { label } => notifications::all_recipients(&state.pool)
            .await?
            .into_iter()
            .map(|(id, _)| {
                notification(&id, NotificationKind::Admin, message.clone(), now).labelled(*label)
            })
            .collect(),
        Audience::User { id, email } => {
            vec![
                notification(id, NotificationKind::Admin, message.clone(), now)
                    .labelled(email.clone()),
            ]
        }
        Audience::Donors { campaign_id, ids } => ids
            .iter()
            .map(|id| {
                notification(id, NotificationKind::Admin, message.clone(), now)
                    .for_campaign(campaign_id)
                    .labelled(format!("Donors: {campaign_id}"))
            })
            .collect(),
    };

    let mut fields = BTreeMap::new();
    fields.insert(
        "recipientType".to_string(),
        req.recipient_type.clone().unwrap_or_default(),
    );
    let event = AuditEvent::new("notification_send", &admin, AuditTarget::Other { fields })
        .detail("recipients", batch.len().to_string())
        .ip(ip);
    audited(&state.pool, event, async {
        notifications::insert_many(&state.pool, &batch).await
    })
    .await?;
    done("Notification(s) sent")
}

#[derive(Debug, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// `GET /admin/notifications`
async fn list_notifications(
    State(state): State<Arc<ApiState>>,
    AuthAdmin(_admin): AuthAdmin,
    Query(page): Query<PageQuery>,
) -> ApiResult<NotificationPage> {
    let window = page.window(FEED_LIMIT);
    let (notifications, total) = notifications::list_all(&state.pool, window).await?;
    ok(NotificationPage {
        notifications,
        pagination: Pagination::new(window, total),
    })
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/campaigns", get(list_campaigns))
        .route("/admin/campaigns/:id", delete(delete_campaign))
        .route("/admin/campaigns/:id/documents", get(campaign_documents))
        .route("/admin/campaigns/:id/notify", post(notify_creator))
        .route("/admin/campaigns/:id/approve", put(approve_campaign))
        .route("/admin/campaigns/:id/reject", put(reject_campaign))
        .route("/admin/campaigns/:id/release-funds", post(release_funds))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", delete(delete_user))
        .route("/admin/users/:id/role", put(update_user_role))
        .route("/admin/users/:id/kyc", get(user_kyc))
        .route("/admin/kyc-users", get(kyc_users))
        .route("/admin/kyc/:userId/approve", put(approve_kyc))
        .route("/admin/kyc/:userId/reject", put(reject_kyc))
        .route("/admin/withdrawals", get(list_withdrawals))
        .route("/admin/withdrawals/:id/approve", put(approve_withdrawal))
        .route("/admin/withdrawals/:id/reject", put(reject_withdrawal))
        .route("/admin/donations", get(list_donations))
        .route("/admin/comments", get(list_comments))
        .route("/admin/comments/:id", delete(delete_comment))
        .route(
            "/admin/notifications",
            get(list_notifications).post(send_notification),
        )
}
