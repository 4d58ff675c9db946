use rust_decimal_macros::dec;

use crate::errors::{ErrorKind, ProtocolError};
use crate::invariants;
use crate::lifecycle::Creator;
use crate::test_lifecycle::{active_campaign, now, verified_creator};
use crate::types::{
    BeneficiaryDetails, CampaignStatus, KycStatus, UserRole, Withdrawal, WithdrawalStatus,
};
use crate::withdrawal::{cancel, decide, open_withdrawal, Decision, WithdrawalRequest};

fn request() -> WithdrawalRequest {
    WithdrawalRequest {
        amount: dec!(400),
        reason: "Buying roofing sheets".into(),
        beneficiary: BeneficiaryDetails {
            account_number: Some("000123456789".into()),
            ifsc: Some("SBIN0001234".into()),
            name: Some("Asha Menon".into()),
            phone: None,
        },
    }
}

fn creator() -> Creator {
    verified_creator("u-creator")
}

fn pending() -> Withdrawal {
    let c = active_campaign(dec!(1000));
    open_withdrawal("w-1".into(), &c, &creator(), request(), false, now()).unwrap()
}

#[test]
fn test_second_pending_request_is_refused() {
    let c = active_campaign(dec!(1000));
    let first = open_withdrawal("w-1".into(), &c, &creator(), request(), false, now()).unwrap();
    assert_eq!(first.status, WithdrawalStatus::Pending);

    let err = open_withdrawal("w-2".into(), &c, &creator(), request(), true, now()).unwrap_err();
    assert_eq!(err, ProtocolError::PendingWithdrawalExists);
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    invariants::assert_single_pending(&[first]);
}

#[test]
fn test_open_guards() {
    let mut c = active_campaign(dec!(1000));
    assert_eq!(
        open_withdrawal("w".into(), &c, &verified_creator("u-other"), request(), false, now())
            .unwrap_err(),
        ProtocolError::NotOwner
    );

    let mut blank = request();
    blank.reason = "   ".into();
    assert_eq!(
        open_withdrawal("w".into(), &c, &creator(), blank, false, now())
            .unwrap_err()
            .kind(),
        ErrorKind::Validation
    );

    c.status = CampaignStatus::PendingReview;
    assert_eq!(
        open_withdrawal("w".into(), &c, &creator(), request(), false, now()).unwrap_err(),
        ProtocolError::WithdrawalNotAllowed
    );

    c.status = CampaignStatus::Completed;
    assert!(open_withdrawal("w".into(), &c, &creator(), request(), false, now()).is_ok());
}

#[test]
fn test_unverified_creator_needs_kyc() {
    let c = active_campaign(dec!(1000));
    for kyc_status in [KycStatus::NotVerified, KycStatus::Pending, KycStatus::Failed] {
        let requester = Creator {
            kyc_status,
            ..creator()
        };
        let err = open_withdrawal("w".into(), &c, &requester, request(), false, now()).unwrap_err();
        assert_eq!(err, ProtocolError::KycRequired);
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    let elevated = Creator {
        role: UserRole::Admin,
        kyc_status: KycStatus::NotVerified,
        ..creator()
    };
    assert!(open_withdrawal("w".into(), &c, &elevated, request(), false, now()).is_ok());
}

#[test]
fn test_cancel_only_by_requester_while_pending() {
    let mut w = pending();
    assert_eq!(
        cancel(&mut w, "u-other", None, now()).unwrap_err(),
        ProtocolError::NotRequester
    );

    cancel(&mut w, "u-creator", Some("Raised elsewhere".into()), now()).unwrap();
    assert_eq!(w.status, WithdrawalStatus::Cancelled);
    assert_eq!(w.admin_notes.as_deref(), Some("Raised elsewhere"));

    assert!(matches!(
        cancel(&mut w, "u-creator", None, now()).unwrap_err(),
        ProtocolError::WithdrawalNotPending { .. }
    ));
}

#[test]
fn test_admin_decisions() {
    let mut w = pending();
    decide(
        &mut w,
        "a-1",
        Decision::Approve {
            notes: Some("Bills verified".into()),
        },
        now(),
    )
    .unwrap();
    assert_eq!(w.status, WithdrawalStatus::Approved);
    assert_eq!(w.approved_by.as_deref(), Some("a-1"));
    assert_eq!(w.approved_at, Some(now()));

    let err = decide(
        &mut w,
        "a-1",
        Decision::Reject {
            reason: "late".into(),
        },
        now(),
    )
    .unwrap_err();
    assert_eq!(err, ProtocolError::WithdrawalNotPending { action: "rejected" });

    let mut w = pending();
    let err = decide(&mut w, "a-1", Decision::Reject { reason: " ".into() }, now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(w.status, WithdrawalStatus::Pending);

    decide(
        &mut w,
        "a-1",
        Decision::Reject {
            reason: "Invoice does not match".into(),
        },
        now(),
    )
    .unwrap();
    assert_eq!(w.status, WithdrawalStatus::Rejected);
    assert_eq!(w.rejection_reason.as_deref(), Some("Invoice does not match"));
}
