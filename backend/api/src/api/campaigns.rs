//! Campaign endpoints for creators, voters and the public.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use crowdfund_protocol::{
    lifecycle::{self, CampaignDraft, CampaignPatch},
    voting, Campaign, CampaignStatus, Category, NotificationKind, ProofDocument, ProtocolError,
    Vote, VoteChoice, VoteTally,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{created, done, ok, ok_with, required, ApiResult, ApiState, JsonBody, Pagination};
use crate::db::{campaigns, donations, moderation, moderation::Comment, users, PageWindow};
use crate::errors::ApiError;
use crate::notify::{self, notification};
use crate::session::AuthUser;
use crate::uploads::{MultipartForm, TempUpload, UploadKind};

const LIST_LIMIT: u32 = 10;
const COMMENT_LEN: (usize, usize) = (1, 1000);

/// Statuses in which the creator may attach proof documents.
const PROOF_STATUSES: [CampaignStatus; 3] = [
    CampaignStatus::Active,
    CampaignStatus::AwaitingAdminApproval,
    CampaignStatus::Completed,
];

// ─────────────────────────────────────────────────────────
// Form field parsing
// ─────────────────────────────────────────────────────────

fn parse_amount(field: &str, raw: &str) -> Result<Decimal, ApiError> {
    Decimal::from_str(raw.trim()).map_err(|_| ApiError::field(field, format!("{field} must be a number")))
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn parse_instant(field: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| ApiError::field(field, format!("Please provide a valid {field}")))
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on" | "yes")
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::field("category", "Please select a valid category"))
}

fn draft_from_form(form: &MultipartForm) -> Result<CampaignDraft, ApiError> {
    let text = |name: &str| form.text(name).map(str::to_string);
    Ok(CampaignDraft {
        title: required("title", text("title"))?,
        description: required("description", text("description"))?,
        category: parse_category(&required("category", text("category"))?)?,
        target_amount: parse_amount(
            "targetAmount",
            &required("targetAmount", text("targetAmount"))?,
        )?,
        start_date: parse_instant("startDate", &required("startDate", text("startDate"))?)?,
        end_date: parse_instant("endDate", &required("endDate", text("endDate"))?)?,
        is_voting_enabled: form.text("isVotingEnabled").is_some_and(parse_flag),
        is_organization: form.text("isOrganization").is_some_and(parse_flag),
        organization_name: text("organizationName"),
        organization_details: text("organizationDetails"),
    })
}

async fn load(state: &ApiState, id: &str) -> Result<Campaign, ApiError> {
    campaigns::find(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign"))
}

// ─────────────────────────────────────────────────────────
// Creation and edits
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCreated {
    pub campaign_id: String,
    pub status: CampaignStatus,
}

/// `POST /campaigns/create`, multipart with `images[]` and `videos[]`.
async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = MultipartForm::collect(multipart).await?;
    let now = Utc::now();
    let creator = user.as_actor();
    let draft = draft_from_form(&form)?;

    // Reject before anything touches the upload area.
    lifecycle::ensure_may_create(&creator)?;
    lifecycle::validate_draft(&draft, now)?;

    let images = state
        .uploads
        .save_all(UploadKind::CampaignImage, form.files_named("images"), now)
        .await?;
    let videos = state
        .uploads
        .save_all(UploadKind::CampaignVideo, form.files_named("videos"), now)
        .await?;

    let campaign = lifecycle::open_campaign(
        Uuid::new_v4().to_string(),
        &creator,
        draft,
        images.urls(),
        videos.urls(),
        now,
    )?;
    campaigns::insert(&state.pool, &campaign).await?;
    images.commit();
    videos.commit();

    info!(
        campaign_id = %campaign.id,
        creator_id = %user.id,
        voting = campaign.is_voting_enabled,
        "Campaign submitted for review"
    );
    created(
        "Campaign created successfully! It is now under review.",
        CampaignCreated {
            campaign_id: campaign.id,
            status: campaign.status,
        },
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub target_amount: Option<Decimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_voting_enabled: Option<bool>,
    pub is_organization: Option<bool>,
    pub organization_name: Option<String>,
    pub organization_details: Option<String>,
}

impl UpdateCampaignRequest {
    fn into_patch(self) -> Result<CampaignPatch, ApiError> {
        Ok(CampaignPatch {
            title: self.title,
            description: self.description,
            category: self.category.as_deref().map(parse_category).transpose()?,
            target_amount: self.target_amount,
            start_date: self.start_date,
            end_date: self.end_date,
            is_voting_enabled: self.is_voting_enabled,
            is_organization: self.is_organization,
            organization_name: self.organization_name,
            organization_details: self.organization_details,
        })
    }
}

/// `PUT /campaigns/:id`
async fn update_campaign(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateCampaignRequest>,
) -> ApiResult<Campaign> {
    let mut campaign = load(&state, &id).await?;
    if !campaign.is_owned_by(&user.id) {
        return Err(ProtocolError::NotOwner.into());
    }
    let expected = campaign.status;
    lifecycle::apply_patch(&mut campaign, &user.id, req.into_patch()?, Utc::now())?;

    if !campaigns::save_edit(&state.pool, &campaign, expected).await? {
        return Err(ApiError::Conflict(
            "Campaign changed while it was being edited, please retry".to_string(),
        ));
    }
    info!(campaign_id = %id, status = %campaign.status, "Campaign edited");
    ok_with("Campaign updated successfully", campaign)
}

/// `DELETE /campaigns/:id`, soft delete by the creator.
async fn delete_campaign(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let mut campaign = load(&state, &id).await?;
    let expected = campaign.status;
    lifecycle::soft_delete(&mut campaign, &user.id, Utc::now())?;

    if !campaigns::save_transition(&state.pool, &campaign, expected).await? {
        return Err(ApiError::Conflict(
            "Campaign changed while it was being deleted, please retry".to_string(),
        ));
    }
    info!(campaign_id = %id, "Campaign deleted by creator");
    done("Campaign deleted successfully")
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CampaignPage {
    pub campaigns: Vec<Campaign>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// `GET /campaigns`, active campaigns only.
async fn list_campaigns(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<CampaignPage> {
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(parse_category)
        .transpose()?;
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let window = PageWindow::new(query.page, query.limit, LIST_LIMIT);
    let (campaigns, total) = campaigns::list_active(&state.pool, category, search, window).await?;
    ok(CampaignPage {
        campaigns,
        pagination: Pagination::new(window, total),
    })
}

#[derive(Debug, Serialize)]
pub struct CreatorSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub creator: Option<CreatorSummary>,
}

/// `GET /campaigns/:id`
async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<CampaignDetail> {
    let campaign = load(&state, &id).await?;
    if campaign.status == CampaignStatus::Deleted {
        return Err(ApiError::not_found("Campaign"));
    }
    let creator = users::find_by_id(&state.pool, &campaign.creator_id)
        .await?
        .map(|u| CreatorSummary { id: u.id, name: u.name });
    ok(CampaignDetail { campaign, creator })
}

/// `GET /campaigns/user/my-campaigns`
async fn my_campaigns(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<Campaign>> {
    ok(campaigns::list_by_creator(&state.pool, &user.id).await?)
}

// ─────────────────────────────────────────────────────────
// Voting
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote: VoteChoice,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub vote: Vote,
    pub vote_results: VoteTally,
}

/// `POST /campaigns/:id/vote`
async fn vote(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<VoteRequest>,
) -> ApiResult<VoteOutcome> {
    let mut campaign = load(&state, &id).await?;
    let cast = voting::cast_vote(&mut campaign, &user.id, req.vote, req.comment, Utc::now())?;
    let vote_results = campaigns::insert_vote(&state.pool, &id, &cast).await?;

    info!(campaign_id = %id, voter_id = %user.id, vote = %cast.vote, "Vote recorded");
    ok_with(
        "Vote submitted successfully",
        VoteOutcome {
            vote: cast,
            vote_results,
        },
    )
}

// ─────────────────────────────────────────────────────────
// Proof documents
// ─────────────────────────────────────────────────────────

/// `POST /campaigns/:id/proofs`, multipart `document` plus `title`/`description`.
async fn upload_proof(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = MultipartForm::collect(multipart).await?;
    let campaign = load(&state, &id).await?;
    if !campaign.is_owned_by(&user.id) {
        return Err(ProtocolError::NotOwner.into());
    }
    if !PROOF_STATUSES.contains(&campaign.status) {
        return Err(ApiError::BadRequest(
            "Proof documents can only be uploaded for active or completed campaigns".to_string(),
        ));
    }
    let title = required("title", form.text("title").map(str::to_string))?;
    let part = form
        .file("document")
        .ok_or_else(|| ApiError::field("document", "document is required"))?;

    let now = Utc::now();
    let stored = state.uploads.save(UploadKind::Proof, part, now).await?;
    let file = TempUpload::new(stored.path);
    let proof = ProofDocument {
        title,
        description: form.text("description").map(str::to_string),
        file_url: stored.url,
        uploaded_at: now,
    };
    campaigns::insert_proof(&state.pool, &id, &proof).await?;
    file.keep();

    let batch = if campaign.is_voting_enabled {
        let message = format!(
            "New proof document \"{}\" was uploaded for \"{}\". Please review it and cast your vote.",
            proof.title, campaign.title
        );
        donations::distinct_donors(&state.pool, Some(&id))
            .await?
            .into_iter()
            .filter(|donor| !campaign.is_owned_by(donor))
            .map(|donor| {
                notification(&donor, NotificationKind::VotingDocument, message.clone(), now)
                    .for_campaign(&id)
                    .with_document(&proof.title, &proof.file_url)
            })
            .collect()
    } else {
        vec![notification(
            &campaign.creator_id,
            NotificationKind::Campaign,
            format!(
                "Proof document \"{}\" was added to \"{}\".",
                proof.title, campaign.title
            ),
            now,
        )
        .for_campaign(&id)
        .with_document(&proof.title, &proof.file_url)]
    };
    notify::deliver(&state.pool, batch).await;

    info!(campaign_id = %id, file = %proof.file_url, "Proof document uploaded");
    created("Proof document uploaded successfully", proof)
}

// ─────────────────────────────────────────────────────────
// Comments
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub text: String,
}

/// `GET /campaigns/:id/comments`
async fn list_comments(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Comment>> {
    ok(moderation::list_comments(&state.pool, Some(&id)).await?)
}

/// `POST /campaigns/:id/comments`
async fn add_comment(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = req.text.trim().to_string();
    let len = text.chars().count();
    if len < COMMENT_LEN.0 || len > COMMENT_LEN.1 {
        return Err(ApiError::field(
            "text",
            "Comment must be between 1 and 1000 characters",
        ));
    }
    let campaign = load(&state, &id).await?;
    if campaign.status == CampaignStatus::Deleted {
        return Err(ApiError::not_found("Campaign"));
    }

    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        campaign_id: id,
        user_id: user.id,
        user_name: user.name,
        text,
        created_at: Utc::now(),
    };
    moderation::insert_comment(&state.pool, &comment).await?;
    created("Comment added successfully", comment)
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/campaigns", get(list_campaigns))
        .route("/campaigns/create", post(create_campaign))
        .route("/campaigns/user/my-campaigns", get(my_campaigns))
        .route(
            "/campaigns/:id",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/campaigns/:id/vote", post(vote))
        .route("/campaigns/:id/proofs", post(upload_proof))
        .route("/campaigns/:id/comments", get(list_comments).post(add_comment))
}
