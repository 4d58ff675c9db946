use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::{ErrorKind, ProtocolError};
use crate::invariants;
use crate::settlement::settle;
use crate::test_lifecycle::active_campaign;
use crate::types::{Campaign, CampaignStatus};

/// Fold `amount` into `campaign` the way the service does after a successful
/// compare-and-set.
fn donate(campaign: &mut Campaign, amount: Decimal) -> crate::errors::Result<bool> {
    let s = settle(
        campaign.status,
        campaign.current_amount,
        campaign.target_amount,
        amount,
    )?;
    assert_eq!(s.previous_amount, campaign.current_amount);
    campaign.current_amount = s.new_amount;
    campaign.status = s.status;
    Ok(s.target_reached)
}

#[test]
fn test_two_donations_cross_target() {
    let mut c = active_campaign(dec!(1000));

    assert!(!donate(&mut c, dec!(600)).unwrap());
    assert_eq!(c.current_amount, dec!(600));
    assert_eq!(c.status, CampaignStatus::Active);

    assert!(donate(&mut c, dec!(500)).unwrap());
    assert_eq!(c.current_amount, dec!(1100));
    assert_eq!(c.status, CampaignStatus::AwaitingAdminApproval);
    invariants::assert_settlement_sum(&c, &[dec!(600), dec!(500)]);
    invariants::assert_all_campaign_invariants(&c);
}

#[test]
fn test_exact_target_reaches_awaiting() {
    let mut c = active_campaign(dec!(1000));
    assert!(donate(&mut c, dec!(1000)).unwrap());
    assert_eq!(c.status, CampaignStatus::AwaitingAdminApproval);
}

#[test]
fn test_donation_to_non_active_campaign_conflicts() {
    for status in CampaignStatus::ALL
        .iter()
        .copied()
        .filter(|s| *s != CampaignStatus::Active)
    {
        let err = settle(status, Decimal::ZERO, dec!(1000), dec!(10)).unwrap_err();
        assert_eq!(err, ProtocolError::NotAcceptingDonations);
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}

#[test]
fn test_non_positive_amount_is_invalid() {
    for amount in [Decimal::ZERO, dec!(-5)] {
        let err = settle(CampaignStatus::Active, Decimal::ZERO, dec!(1000), amount).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

#[test]
fn test_overflowing_balance_is_refused() {
    let current = Decimal::MAX - dec!(10);
    let err = settle(CampaignStatus::Active, current, Decimal::MAX, Decimal::MAX).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let s = settle(CampaignStatus::Active, current, Decimal::MAX, dec!(10)).unwrap();
    assert_eq!(s.new_amount, Decimal::MAX);
    assert!(s.target_reached);
}

#[test]
fn test_fractional_amounts_sum_exactly() {
    let mut c = active_campaign(dec!(1));
    for _ in 0..3 {
        donate(&mut c, dec!(0.1)).unwrap();
    }
    assert_eq!(c.current_amount, dec!(0.3));
    assert_eq!(c.status, CampaignStatus::Active);
}

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    // Whole rupees and paise, 0.01 ..= 5000.00
    (1i64..=500_000).prop_map(|paise| Decimal::new(paise, 2))
}

proptest! {
    #[test]
    fn prop_balance_is_sum_and_target_crossed_once(
        target in (1i64..=20_000).prop_map(Decimal::from),
        amounts in prop::collection::vec(amount_strategy(), 1..40),
    ) {
        let mut c = active_campaign(target);
        let mut accepted = Vec::new();
        let mut crossings = 0;

        for amount in amounts {
            match donate(&mut c, amount) {
                Ok(reached) => {
                    accepted.push(amount);
                    if reached {
                        crossings += 1;
                    }
                }
                Err(e) => {
                    prop_assert_eq!(e, ProtocolError::NotAcceptingDonations);
                    prop_assert_eq!(c.status, CampaignStatus::AwaitingAdminApproval);
                }
            }
            invariants::assert_settlement_sum(&c, &accepted);
            invariants::assert_target_status_consistent(&c);
        }

        let total: Decimal = accepted.iter().copied().sum();
        prop_assert_eq!(crossings, usize::from(total >= target));
    }
}
