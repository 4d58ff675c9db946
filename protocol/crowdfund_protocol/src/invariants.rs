#![allow(dead_code)]

use rust_decimal::Decimal;

use crate::lifecycle::is_valid_transition;
use crate::types::{Campaign, CampaignStatus, Vote, VoteTally, Withdrawal, WithdrawalStatus};
use crate::voting::tally;

/// INV-1: Current amount is never negative.
pub fn assert_amount_non_negative(campaign: &Campaign) {
    assert!(
        campaign.current_amount >= Decimal::ZERO,
        "INV-1 violated: campaign {} has negative amount ({})",
        campaign.id,
        campaign.current_amount
    );
}

/// INV-2: Target amount is always positive.
pub fn assert_target_positive(campaign: &Campaign) {
    assert!(
        campaign.target_amount > Decimal::ZERO,
        "INV-2 violated: campaign {} has non-positive target ({})",
        campaign.id,
        campaign.target_amount
    );
}

/// INV-3: Settlement invariant. After donations `amounts`, the balance is
/// their exact sum.
pub fn assert_settlement_sum(campaign: &Campaign, amounts: &[Decimal]) {
    let sum: Decimal = amounts.iter().copied().sum();
    assert_eq!(
        campaign.current_amount, sum,
        "INV-3 violated: balance {} != sum of donations {}",
        campaign.current_amount, sum
    );
}

/// INV-4: A campaign at or over its target cannot still be active, and a
/// campaign under its target cannot be awaiting release.
pub fn assert_target_status_consistent(campaign: &Campaign) {
    let reached = campaign.current_amount >= campaign.target_amount;
    if campaign.status == CampaignStatus::Active {
        assert!(
            !reached,
            "INV-4 violated: campaign {} is active past its target",
            campaign.id
        );
    }
    if campaign.status == CampaignStatus::AwaitingAdminApproval {
        assert!(
            reached,
            "INV-4 violated: campaign {} awaits release below its target",
            campaign.id
        );
    }
}

/// INV-5: Tally is consistent with the vote list.
pub fn assert_tally_consistent(votes: &[Vote], results: &VoteTally) {
    assert_eq!(
        *results,
        tally(votes),
        "INV-5 violated: cached tally does not match votes"
    );
    assert_eq!(
        results.approve_count + results.reject_count,
        results.total_votes,
        "INV-5 violated: approve + reject != total"
    );
    assert_eq!(
        results.total_votes as usize,
        votes.len(),
        "INV-5 violated: total != number of votes"
    );
}

/// INV-6: One vote per voter.
pub fn assert_unique_voters(votes: &[Vote]) {
    for (i, a) in votes.iter().enumerate() {
        for b in &votes[i + 1..] {
            assert_ne!(
                a.voter_id, b.voter_id,
                "INV-6 violated: voter {} voted twice",
                a.voter_id
            );
        }
    }
}

/// INV-7: A deleted campaign never held funds.
pub fn assert_deleted_unfunded(campaign: &Campaign) {
    if campaign.status == CampaignStatus::Deleted {
        assert!(
            campaign.current_amount.is_zero(),
            "INV-7 violated: funded campaign {} was deleted",
            campaign.id
        );
    }
}

/// INV-8: Status transition validity.
pub fn assert_valid_status_transition(from: CampaignStatus, to: CampaignStatus) {
    assert!(
        is_valid_transition(from, to),
        "INV-8 violated: invalid status transition from {:?} to {:?}",
        from,
        to
    );
}

/// INV-9: At most one pending withdrawal per campaign.
pub fn assert_single_pending(withdrawals: &[Withdrawal]) {
    let mut seen: Vec<&str> = Vec::new();
    for w in withdrawals
        .iter()
        .filter(|w| w.status == WithdrawalStatus::Pending)
    {
        assert!(
            !seen.contains(&w.campaign_id.as_str()),
            "INV-9 violated: campaign {} has two pending withdrawals",
            w.campaign_id
        );
        seen.push(&w.campaign_id);
    }
}

/// Run all stateless campaign invariants.
pub fn assert_all_campaign_invariants(campaign: &Campaign) {
    assert_amount_non_negative(campaign);
    assert_target_positive(campaign);
    assert_target_status_consistent(campaign);
    assert_tally_consistent(&campaign.votes, &campaign.vote_results);
    assert_unique_voters(&campaign.votes);
    assert_deleted_unfunded(campaign);
}
