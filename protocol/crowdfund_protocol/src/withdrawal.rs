//! # Withdrawals
//!
//! A creator may hold at most one `pending` withdrawal per campaign. The
//! requester can cancel it; an admin approves or rejects it. Both paths only
//! act on `pending` requests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::errors::{ProtocolError, Result};
use crate::lifecycle::{ensure_kyc_verified, Creator};
use crate::settlement::MAX_AMOUNT;
use crate::types::{
    same_identity, BeneficiaryDetails, Campaign, CampaignStatus, PayoutStatus, Withdrawal,
    WithdrawalStatus,
};

pub const REASON_MAX: usize = 500;

#[derive(Clone, Debug)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub reason: String,
    pub beneficiary: BeneficiaryDetails,
}

/// Admin verdict on a pending request.
#[derive(Clone, Debug)]
pub enum Decision {
    Approve { notes: Option<String> },
    Reject { reason: String },
}

/// Validate a request against its campaign and the campaign's existing
/// withdrawals, then build the new `pending` withdrawal. The requester must
/// have verified KYC unless elevated.
pub fn open_withdrawal(
    id: String,
    campaign: &Campaign,
    requester: &Creator,
    request: WithdrawalRequest,
    has_pending: bool,
    now: DateTime<Utc>,
) -> Result<Withdrawal> {
    let reason = request.reason.trim().to_string();
    if reason.is_empty() {
        return Err(ProtocolError::invalid("reason", "reason is required"));
    }
    if reason.chars().count() > REASON_MAX {
        return Err(ProtocolError::invalid(
            "reason",
            "reason cannot exceed 500 characters",
        ));
    }
    if request.amount <= Decimal::ZERO {
        return Err(ProtocolError::invalid(
            "amount",
            "withdrawal amount must be greater than 0",
        ));
    }
    if request.amount > MAX_AMOUNT {
        return Err(ProtocolError::invalid(
            "amount",
            format!("withdrawal amount cannot exceed {MAX_AMOUNT}"),
        ));
    }
    ensure_kyc_verified(requester)?;
    if !campaign.is_owned_by(&requester.id) {
        return Err(ProtocolError::NotOwner);
    }
    if !matches!(
        campaign.status,
        CampaignStatus::Active | CampaignStatus::Completed
    ) {
        return Err(ProtocolError::WithdrawalNotAllowed);
    }
    if has_pending {
        return Err(ProtocolError::PendingWithdrawalExists);
    }

    Ok(Withdrawal {
        id,
        campaign_id: campaign.id.clone(),
        requester_id: requester.id.clone(),
        amount: request.amount,
        reason,
        status: WithdrawalStatus::Pending,
        admin_notes: None,
        rejection_reason: None,
        approved_by: None,
        approved_at: None,
        is_voting_campaign: campaign.is_voting_enabled,
        payout_id: None,
        payout_status: PayoutStatus::Pending,
        beneficiary: request.beneficiary,
        created_at: now,
        updated_at: now,
    })
}

/// Requester-side cancellation.
pub fn cancel(
    withdrawal: &mut Withdrawal,
    requester_id: &str,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<()> {
    if !same_identity(&withdrawal.requester_id, requester_id) {
        return Err(ProtocolError::NotRequester);
    }
    if withdrawal.status != WithdrawalStatus::Pending {
        return Err(ProtocolError::WithdrawalNotPending {
            action: "cancelled",
        });
    }
    withdrawal.status = WithdrawalStatus::Cancelled;
    if let Some(note) = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        withdrawal.admin_notes = Some(note);
    }
    withdrawal.updated_at = now;
    Ok(())
}

/// Admin-side decision. The caller has already established that `admin_id`
/// belongs to an active administrator.
pub fn decide(
    withdrawal: &mut Withdrawal,
    admin_id: &str,
    decision: Decision,
    now: DateTime<Utc>,
) -> Result<()> {
    let action = match decision {
        Decision::Approve { .. } => "approved",
        Decision::Reject { .. } => "rejected",
    };
    if withdrawal.status != WithdrawalStatus::Pending {
        return Err(ProtocolError::WithdrawalNotPending { action });
    }
    match decision {
        Decision::Approve { notes } => {
            withdrawal.status = WithdrawalStatus::Approved;
            withdrawal.admin_notes = notes.filter(|n| !n.trim().is_empty());
        }
        Decision::Reject { reason } => {
            let reason = reason.trim().to_string();
            if reason.is_empty() {
                return Err(ProtocolError::invalid(
                    "rejectionReason",
                    "a rejection reason is required",
                ));
            }
            withdrawal.status = WithdrawalStatus::Rejected;
            withdrawal.rejection_reason = Some(reason);
        }
    }
    withdrawal.approved_by = Some(admin_id.to_string());
    withdrawal.approved_at = Some(now);
    withdrawal.updated_at = now;
    Ok(())
}
