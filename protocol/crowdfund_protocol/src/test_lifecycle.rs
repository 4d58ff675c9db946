use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::{ErrorKind, ProtocolError};
use crate::invariants;
use crate::lifecycle::{
    apply_patch, approve, open_campaign, reject, release_funds, remove, soft_delete, CampaignDraft,
    CampaignPatch, Creator,
};
use crate::settlement::settle;
use crate::types::{Campaign, CampaignStatus, Category, KycStatus, UserRole};

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub(crate) fn verified_creator(id: &str) -> Creator {
    Creator {
        id: id.to_string(),
        role: UserRole::User,
        kyc_status: KycStatus::Verified,
    }
}

pub(crate) fn draft(target: Decimal) -> CampaignDraft {
    CampaignDraft {
        title: "Flood relief for Kuttanad".into(),
        description: "Rebuilding homes and replacing school supplies for families hit by the monsoon floods."
            .into(),
        category: Category::DisasterRecovery,
        target_amount: target,
        start_date: now() + Duration::days(1),
        end_date: now() + Duration::days(31),
        is_voting_enabled: false,
        is_organization: false,
        organization_name: None,
        organization_details: None,
    }
}

pub(crate) fn active_campaign(target: Decimal) -> Campaign {
    let mut c = open_campaign(
        "c-1".into(),
        &verified_creator("u-creator"),
        draft(target),
        vec![],
        vec![],
        now(),
    )
    .unwrap();
    approve(&mut c, now()).unwrap();
    c
}

fn assert_kind(err: ProtocolError, kind: ErrorKind) {
    assert_eq!(err.kind(), kind, "unexpected error: {err}");
}

// ── Creation ─────────────────────────────────────────────────

#[test]
fn test_create_by_verified_creator_is_pending_review() {
    let c = open_campaign(
        "c-1".into(),
        &verified_creator("u-1"),
        draft(dec!(1000)),
        vec!["/uploads/campaigns/a.jpg".into()],
        vec![],
        now(),
    )
    .unwrap();

    assert_eq!(c.status, CampaignStatus::PendingReview);
    assert!(!c.is_voting_enabled);
    assert_eq!(c.voting_end_date, None);
    assert_eq!(c.current_amount, Decimal::ZERO);
    assert_eq!(c.images.len(), 1);
    invariants::assert_all_campaign_invariants(&c);
}

#[test]
fn test_create_requires_verified_kyc() {
    for status in [KycStatus::NotVerified, KycStatus::Pending, KycStatus::Failed] {
        let creator = Creator {
            id: "u-1".into(),
            role: UserRole::User,
            kyc_status: status,
        };
        let err = open_campaign("c".into(), &creator, draft(dec!(1000)), vec![], vec![], now())
            .unwrap_err();
        assert_eq!(err, ProtocolError::KycRequired);
    }
}

#[test]
fn test_elevated_roles_bypass_kyc() {
    for role in [UserRole::Admin, UserRole::SuperAdmin] {
        let creator = Creator {
            id: "u-1".into(),
            role,
            kyc_status: KycStatus::NotVerified,
        };
        assert!(
            open_campaign("c".into(), &creator, draft(dec!(1000)), vec![], vec![], now()).is_ok()
        );
    }
}

#[test]
fn test_auto_voting_threshold() {
    let creator = verified_creator("u-1");
    let at = open_campaign("a".into(), &creator, draft(dec!(50000)), vec![], vec![], now())
        .unwrap();
    assert!(at.is_voting_enabled);
    assert_eq!(at.voting_end_date, Some(at.end_date));

    let below = open_campaign("b".into(), &creator, draft(dec!(49999)), vec![], vec![], now())
        .unwrap();
    assert!(!below.is_voting_enabled);

    let mut opted = draft(dec!(49999));
    opted.is_voting_enabled = true;
    let opted = open_campaign("c".into(), &creator, opted, vec![], vec![], now()).unwrap();
    assert!(opted.is_voting_enabled);
}

#[test]
fn test_draft_field_validation() {
    let creator = verified_creator("u-1");
    let cases: Vec<(&str, Box<dyn Fn(&mut CampaignDraft)>)> = vec![
        ("title", Box::new(|d| d.title = "Hey".into())),
        ("description", Box::new(|d| d.description = "too short".into())),
        ("targetAmount", Box::new(|d| d.target_amount = dec!(0.5))),
        ("targetAmount", Box::new(|d| d.target_amount = Decimal::MAX)),
        ("startDate", Box::new(|d| d.start_date = now() - Duration::days(1))),
        ("endDate", Box::new(|d| d.end_date = d.start_date)),
        (
            "organizationName",
            Box::new(|d| d.organization_name = Some("x".repeat(101))),
        ),
    ];
    for (field, mutate) in cases {
        let mut d = draft(dec!(1000));
        mutate(&mut d);
        match open_campaign("c".into(), &creator, d, vec![], vec![], now()) {
            Err(ProtocolError::InvalidField { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected {field} failure, got {other:?}"),
        }
    }
}

#[test]
fn test_organization_fields_dropped_for_individuals() {
    let mut d = draft(dec!(1000));
    d.organization_name = Some("Kerala Relief Trust".into());
    let c = open_campaign("c".into(), &verified_creator("u"), d, vec![], vec![], now()).unwrap();
    assert_eq!(c.organization_name, None);
}

// ── Moderation ───────────────────────────────────────────────

#[test]
fn test_approve_and_reject_transitions() {
    let mut c = open_campaign(
        "c".into(),
        &verified_creator("u"),
        draft(dec!(1000)),
        vec![],
        vec![],
        now(),
    )
    .unwrap();

    reject(&mut c, Some("Missing documents".into()), now()).unwrap();
    assert_eq!(c.status, CampaignStatus::Rejected);
    assert_eq!(c.rejection_reason.as_deref(), Some("Missing documents"));

    approve(&mut c, now()).unwrap();
    assert_eq!(c.status, CampaignStatus::Active);
    assert_eq!(c.rejection_reason, None);

    assert_kind(approve(&mut c, now()).unwrap_err(), ErrorKind::InvalidState);
}

#[test]
fn test_reject_active_only_while_unfunded() {
    let mut c = active_campaign(dec!(1000));
    c.current_amount = dec!(10);
    assert_kind(reject(&mut c, None, now()).unwrap_err(), ErrorKind::InvalidState);

    c.current_amount = Decimal::ZERO;
    reject(&mut c, None, now()).unwrap();
    assert_eq!(c.status, CampaignStatus::Rejected);
}

// ── Release ──────────────────────────────────────────────────

#[test]
fn test_release_funds_requires_awaiting_status() {
    let mut c = active_campaign(dec!(1000));
    let err = release_funds(&mut c, now()).unwrap_err();
    assert_eq!(err, ProtocolError::NotAwaitingApproval);
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(err.to_string(), "Campaign is not awaiting admin approval");

    let s = settle(c.status, c.current_amount, c.target_amount, dec!(1000)).unwrap();
    c.current_amount = s.new_amount;
    c.status = s.status;
    release_funds(&mut c, now()).unwrap();
    assert_eq!(c.status, CampaignStatus::Completed);
    assert!(c.funds_released);

    assert_eq!(
        release_funds(&mut c, now()).unwrap_err(),
        ProtocolError::NotAwaitingApproval
    );
}

// ── Editing ──────────────────────────────────────────────────

#[test]
fn test_patch_by_stranger_is_forbidden_in_every_status() {
    for status in CampaignStatus::ALL {
        let mut c = active_campaign(dec!(1000));
        c.status = *status;
        let err = apply_patch(&mut c, "u-other", CampaignPatch::default(), now()).unwrap_err();
        assert_eq!(err, ProtocolError::NotOwner);
    }
}

#[test]
fn test_patch_rejected_campaign_resubmits() {
    let mut c = active_campaign(dec!(1000));
    reject(&mut c, Some("Blurry images".into()), now()).unwrap();

    let patch = CampaignPatch {
        title: Some("Flood relief for Alappuzha".into()),
        ..Default::default()
    };
    apply_patch(&mut c, "u-creator", patch, now() + Duration::days(5)).unwrap();

    assert_eq!(c.status, CampaignStatus::PendingReview);
    assert_eq!(c.title, "Flood relief for Alappuzha");
    assert_eq!(c.rejection_reason, None);
}

#[test]
fn test_patch_not_allowed_once_active() {
    let mut c = active_campaign(dec!(1000));
    let err = apply_patch(&mut c, "u-creator", CampaignPatch::default(), now()).unwrap_err();
    assert_kind(err, ErrorKind::InvalidState);
}

#[test]
fn test_patch_raising_target_forces_voting() {
    let mut c = open_campaign(
        "c".into(),
        &verified_creator("u"),
        draft(dec!(1000)),
        vec![],
        vec![],
        now(),
    )
    .unwrap();
    let patch = CampaignPatch {
        target_amount: Some(dec!(75000)),
        ..Default::default()
    };
    apply_patch(&mut c, "u", patch, now()).unwrap();
    assert!(c.is_voting_enabled);
    assert_eq!(c.voting_end_date, Some(c.end_date));
}

// ── Deletion ─────────────────────────────────────────────────

#[test]
fn test_delete_by_stranger_is_forbidden_in_every_status() {
    for status in CampaignStatus::ALL {
        let mut c = active_campaign(dec!(1000));
        c.status = *status;
        let err = soft_delete(&mut c, "u-other", now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}

#[test]
fn test_delete_guard_on_funds_and_status() {
    let mut c = active_campaign(dec!(1000));
    assert_kind(
        soft_delete(&mut c, "u-creator", now()).unwrap_err(),
        ErrorKind::InvalidState,
    );

    c.status = CampaignStatus::Completed;
    c.current_amount = dec!(1);
    assert_eq!(
        soft_delete(&mut c, "u-creator", now()).unwrap_err(),
        ProtocolError::HasFunds
    );

    c.current_amount = Decimal::ZERO;
    soft_delete(&mut c, "U-CREATOR ", now()).unwrap();
    assert_eq!(c.status, CampaignStatus::Deleted);
    invariants::assert_deleted_unfunded(&c);
}

#[test]
fn test_moderator_removal_keeps_funds_guard() {
    let mut c = active_campaign(dec!(1000));
    c.status = CampaignStatus::Rejected;
    c.current_amount = dec!(10);
    assert_eq!(remove(&mut c, now()).unwrap_err(), ProtocolError::HasFunds);

    c.current_amount = Decimal::ZERO;
    remove(&mut c, now()).unwrap();
    assert_eq!(c.status, CampaignStatus::Deleted);
}

#[test]
fn test_transition_graph_matches_entry_points() {
    use CampaignStatus::*;
    invariants::assert_valid_status_transition(PendingReview, Active);
    invariants::assert_valid_status_transition(Active, AwaitingAdminApproval);
    invariants::assert_valid_status_transition(AwaitingAdminApproval, Completed);
    invariants::assert_valid_status_transition(Rejected, PendingReview);
    assert!(!crate::lifecycle::is_valid_transition(Active, Completed));
    assert!(!crate::lifecycle::is_valid_transition(AwaitingAdminApproval, Deleted));
    assert!(!crate::lifecycle::is_valid_transition(Deleted, Active));
}
