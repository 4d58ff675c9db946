//! # Campaign lifecycle
//!
//! Every status change a campaign can undergo goes through one of the
//! functions below. Each one checks its guard against the campaign as it is
//! *now* and either mutates it in place or returns a [`ProtocolError`]
//! leaving it untouched.
//!
//! | From                                          | To                        | Entry point          |
//! |-----------------------------------------------|---------------------------|----------------------|
//! | (new)                                         | `pending_review`          | [`open_campaign`]    |
//! | `pending_review`, `rejected`                  | `active`                  | [`approve`]          |
//! | `pending_review`, `active` (unfunded)         | `rejected`                | [`reject`]           |
//! | `active`                                      | `awaiting_admin_approval` | [`crate::settlement`]|
//! | `awaiting_admin_approval`                     | `completed`               | [`release_funds`]    |
//! | `draft`, `pending_review`, `rejected`, `completed` | `deleted`             | [`soft_delete`], [`remove`] |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::errors::{ProtocolError, Result};
use crate::settlement::MAX_AMOUNT;
use crate::types::{Campaign, CampaignStatus, Category, KycStatus, UserRole, VoteTally};

/// Campaigns with a target at or above this amount always require donor voting.
pub const AUTO_VOTING_THRESHOLD: i64 = 50_000;

pub const TITLE_LEN: (usize, usize) = (5, 100);
pub const DESCRIPTION_LEN: (usize, usize) = (50, 2000);
pub const ORGANIZATION_NAME_MAX: usize = 100;
pub const ORGANIZATION_DETAILS_MAX: usize = 500;
pub const REASON_MAX: usize = 500;

/// Statuses from which the creator may soft-delete an unfunded campaign.
pub const DELETABLE: [CampaignStatus; 4] = [
    CampaignStatus::Draft,
    CampaignStatus::PendingReview,
    CampaignStatus::Rejected,
    CampaignStatus::Completed,
];

/// Statuses in which the creator may still edit the campaign.
pub const EDITABLE: [CampaignStatus; 3] = [
    CampaignStatus::Draft,
    CampaignStatus::PendingReview,
    CampaignStatus::Rejected,
];

/// The acting user, as far as the KYC gate is concerned.
#[derive(Clone, Debug)]
pub struct Creator {
    pub id: String,
    pub role: UserRole,
    pub kyc_status: KycStatus,
}

/// Creator-supplied campaign fields, before any media is attached.
#[derive(Clone, Debug)]
pub struct CampaignDraft {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub target_amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_voting_enabled: bool,
    pub is_organization: bool,
    pub organization_name: Option<String>,
    pub organization_details: Option<String>,
}

/// Partial update applied by the creator while the campaign is editable.
#[derive(Clone, Debug, Default)]
pub struct CampaignPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub target_amount: Option<Decimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_voting_enabled: Option<bool>,
    pub is_organization: Option<bool>,
    pub organization_name: Option<String>,
    pub organization_details: Option<String>,
}

/// Campaign creation and withdrawals are gated on verified KYC unless the
/// acting user is elevated.
pub fn ensure_kyc_verified(actor: &Creator) -> Result<()> {
    if actor.role.is_elevated() || actor.kyc_status == KycStatus::Verified {
        Ok(())
    } else {
        Err(ProtocolError::KycRequired)
    }
}

pub fn ensure_may_create(creator: &Creator) -> Result<()> {
    ensure_kyc_verified(creator)
}

fn check_len(field: &'static str, value: &str, (min, max): (usize, usize)) -> Result<()> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(ProtocolError::invalid(
            field,
            format!("must be between {min} and {max} characters"),
        ));
    }
    Ok(())
}

fn check_max(field: &'static str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.trim().chars().count() > max => Err(ProtocolError::invalid(
            field,
            format!("cannot exceed {max} characters"),
        )),
        _ => Ok(()),
    }
}

/// Field-level validation of a draft. `now` is the reference for the
/// "start date cannot be in the past" rule.
pub fn validate_draft(draft: &CampaignDraft, now: DateTime<Utc>) -> Result<()> {
    check_len("title", &draft.title, TITLE_LEN)?;
    check_len("description", &draft.description, DESCRIPTION_LEN)?;
    if draft.target_amount < Decimal::ONE {
        return Err(ProtocolError::invalid(
            "targetAmount",
            "target amount must be at least 1",
        ));
    }
    if draft.target_amount > MAX_AMOUNT {
        return Err(ProtocolError::invalid(
            "targetAmount",
            format!("target amount cannot exceed {MAX_AMOUNT}"),
        ));
    }
    if draft.start_date < now {
        return Err(ProtocolError::invalid(
            "startDate",
            "start date cannot be in the past",
        ));
    }
    if draft.end_date <= draft.start_date {
        return Err(ProtocolError::invalid(
            "endDate",
            "end date must be after start date",
        ));
    }
    check_max(
        "organizationName",
        draft.organization_name.as_deref(),
        ORGANIZATION_NAME_MAX,
    )?;
    check_max(
        "organizationDetails",
        draft.organization_details.as_deref(),
        ORGANIZATION_DETAILS_MAX,
    )?;
    Ok(())
}

/// Apply the platform voting rule: voting is forced on at or above
/// [`AUTO_VOTING_THRESHOLD`], otherwise the creator's choice stands. When
/// voting is on, the voting window closes with the campaign.
pub fn resolve_voting(
    target_amount: Decimal,
    requested: bool,
    end_date: DateTime<Utc>,
) -> (bool, Option<DateTime<Utc>>) {
    let enabled = requested || target_amount >= Decimal::from(AUTO_VOTING_THRESHOLD);
    let voting_end = enabled.then_some(end_date);
    (enabled, voting_end)
}

/// Build a new campaign in `pending_review` from a validated draft.
pub fn open_campaign(
    id: String,
    creator: &Creator,
    draft: CampaignDraft,
    images: Vec<String>,
    videos: Vec<String>,
    now: DateTime<Utc>,
) -> Result<Campaign> {
    ensure_may_create(creator)?;
    validate_draft(&draft, now)?;

    let (is_voting_enabled, voting_end_date) =
        resolve_voting(draft.target_amount, draft.is_voting_enabled, draft.end_date);
    let (organization_name, organization_details) = if draft.is_organization {
        (draft.organization_name, draft.organization_details)
    } else {
        (None, None)
    };

    Ok(Campaign {
        id,
        creator_id: creator.id.clone(),
        title: draft.title.trim().to_string(),
        description: draft.description.trim().to_string(),
        category: draft.category,
        target_amount: draft.target_amount,
        current_amount: Decimal::ZERO,
        start_date: draft.start_date,
        end_date: draft.end_date,
        images,
        videos,
        is_organization: draft.is_organization,
        organization_name,
        organization_details,
        is_voting_enabled,
        voting_end_date,
        proof_documents: Vec::new(),
        votes: Vec::new(),
        vote_results: VoteTally::default(),
        status: CampaignStatus::PendingReview,
        funds_released: false,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    })
}

/// Creator edit. Ownership is checked before anything else so a stranger
/// learns nothing about the campaign's state.
pub fn apply_patch(
    campaign: &mut Campaign,
    actor_id: &str,
    patch: CampaignPatch,
    now: DateTime<Utc>,
) -> Result<()> {
    if !campaign.is_owned_by(actor_id) {
        return Err(ProtocolError::NotOwner);
    }
    if !EDITABLE.contains(&campaign.status) {
        return Err(ProtocolError::InvalidTransition {
            action: "edited",
            status: campaign.status.to_string(),
        });
    }

    let draft = CampaignDraft {
        title: patch.title.unwrap_or_else(|| campaign.title.clone()),
        description: patch
            .description
            .unwrap_or_else(|| campaign.description.clone()),
        category: patch.category.unwrap_or(campaign.category),
        target_amount: patch.target_amount.unwrap_or(campaign.target_amount),
        start_date: patch.start_date.unwrap_or(campaign.start_date),
        end_date: patch.end_date.unwrap_or(campaign.end_date),
        is_voting_enabled: patch
            .is_voting_enabled
            .unwrap_or(campaign.is_voting_enabled),
        is_organization: patch.is_organization.unwrap_or(campaign.is_organization),
        organization_name: patch
            .organization_name
            .or_else(|| campaign.organization_name.clone()),
        organization_details: patch
            .organization_details
            .or_else(|| campaign.organization_details.clone()),
    };

    // An untouched start date that has already passed does not block an edit.
    let reference = if patch.start_date.is_some() {
        now
    } else {
        draft.start_date
    };
    validate_draft(&draft, reference)?;

    let (is_voting_enabled, voting_end_date) =
        resolve_voting(draft.target_amount, draft.is_voting_enabled, draft.end_date);

    campaign.title = draft.title.trim().to_string();
    campaign.description = draft.description.trim().to_string();
    campaign.category = draft.category;
    campaign.target_amount = draft.target_amount;
    campaign.start_date = draft.start_date;
    campaign.end_date = draft.end_date;
    campaign.is_voting_enabled = is_voting_enabled;
    campaign.voting_end_date = voting_end_date;
    campaign.is_organization = draft.is_organization;
    if draft.is_organization {
        campaign.organization_name = draft.organization_name;
        campaign.organization_details = draft.organization_details;
    } else {
        campaign.organization_name = None;
        campaign.organization_details = None;
    }
    if campaign.status == CampaignStatus::Rejected {
        campaign.status = CampaignStatus::PendingReview;
        campaign.rejection_reason = None;
    }
    campaign.updated_at = now;
    Ok(())
}

/// Moderator approval.
pub fn approve(campaign: &mut Campaign, now: DateTime<Utc>) -> Result<()> {
    match campaign.status {
        CampaignStatus::PendingReview | CampaignStatus::Rejected => {
            campaign.status = CampaignStatus::Active;
            campaign.rejection_reason = None;
            campaign.updated_at = now;
            Ok(())
        }
        other => Err(ProtocolError::InvalidTransition {
            action: "approved",
            status: other.to_string(),
        }),
    }
}

/// Moderator rejection. An active campaign can only be pulled back while it
/// holds no funds.
pub fn reject(campaign: &mut Campaign, reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
    check_max("reason", reason.as_deref(), REASON_MAX)?;
    let allowed = match campaign.status {
        CampaignStatus::PendingReview => true,
        CampaignStatus::Active => campaign.current_amount.is_zero(),
        _ => false,
    };
    if !allowed {
        return Err(ProtocolError::InvalidTransition {
            action: "rejected",
            status: campaign.status.to_string(),
        });
    }
    campaign.status = CampaignStatus::Rejected;
    campaign.rejection_reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    campaign.updated_at = now;
    Ok(())
}

/// Admin fund release. Only valid once settlement has parked the campaign in
/// `awaiting_admin_approval`; a repeated call fails instead of re-releasing.
pub fn release_funds(campaign: &mut Campaign, now: DateTime<Utc>) -> Result<()> {
    if campaign.status != CampaignStatus::AwaitingAdminApproval {
        return Err(ProtocolError::NotAwaitingApproval);
    }
    campaign.status = CampaignStatus::Completed;
    campaign.funds_released = true;
    campaign.updated_at = now;
    Ok(())
}

/// Creator soft delete.
pub fn soft_delete(campaign: &mut Campaign, actor_id: &str, now: DateTime<Utc>) -> Result<()> {
    if !campaign.is_owned_by(actor_id) {
        return Err(ProtocolError::NotOwner);
    }
    remove(campaign, now)
}

/// Moderator removal. Same guard as the creator path, without the ownership check.
pub fn remove(campaign: &mut Campaign, now: DateTime<Utc>) -> Result<()> {
    ensure_deletable(campaign)?;
    campaign.status = CampaignStatus::Deleted;
    campaign.updated_at = now;
    Ok(())
}

/// Deletion guard shared by the creator and admin paths.
pub fn ensure_deletable(campaign: &Campaign) -> Result<()> {
    if !campaign.current_amount.is_zero() {
        return Err(ProtocolError::HasFunds);
    }
    if !DELETABLE.contains(&campaign.status) {
        return Err(ProtocolError::InvalidTransition {
            action: "deleted",
            status: campaign.status.to_string(),
        });
    }
    Ok(())
}

/// Donations are only accepted while the campaign is active.
pub fn ensure_accepts_donations(status: CampaignStatus) -> Result<()> {
    if status == CampaignStatus::Active {
        Ok(())
    } else {
        Err(ProtocolError::NotAcceptingDonations)
    }
}

/// Whether `from -> to` is an edge of the lifecycle graph.
pub fn is_valid_transition(from: CampaignStatus, to: CampaignStatus) -> bool {
    use CampaignStatus::*;
    matches!(
        (from, to),
        (Draft, PendingReview)
            | (PendingReview, Active)
            | (PendingReview, Rejected)
            | (Rejected, Active)
            | (Rejected, PendingReview)
            | (Active, Rejected)
            | (Active, AwaitingAdminApproval)
            | (AwaitingAdminApproval, Completed)
            | (Draft, Deleted)
            | (PendingReview, Deleted)
            | (Rejected, Deleted)
            | (Completed, Deleted)
    )
}
