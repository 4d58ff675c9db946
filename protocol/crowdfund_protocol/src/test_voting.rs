use chrono::Duration;
use proptest::prelude::*;
use rust_decimal_macros::dec;

use crate::errors::ProtocolError;
use crate::invariants;
use crate::test_lifecycle::{active_campaign, now};
use crate::types::{Campaign, CampaignStatus, VoteChoice, VoteTally};
use crate::voting::{cast_vote, tally};

fn voting_campaign() -> Campaign {
    let mut c = active_campaign(dec!(60000));
    assert!(c.is_voting_enabled);
    c.voting_end_date = Some(now() + Duration::days(30));
    c
}

#[test]
fn test_second_vote_is_refused_and_tally_unchanged() {
    let mut c = voting_campaign();

    let vote = cast_vote(&mut c, "u-donor", VoteChoice::Approve, None, now()).unwrap();
    assert_eq!(vote.vote, VoteChoice::Approve);
    assert_eq!(
        c.vote_results,
        VoteTally {
            approve_count: 1,
            reject_count: 0,
            total_votes: 1
        }
    );

    let err = cast_vote(&mut c, "u-donor", VoteChoice::Reject, None, now()).unwrap_err();
    assert_eq!(err, ProtocolError::AlreadyVoted);
    assert_eq!(c.vote_results.total_votes, 1);
    assert_eq!(c.votes.len(), 1);
    invariants::assert_tally_consistent(&c.votes, &c.vote_results);
}

#[test]
fn test_vote_guards() {
    let mut c = active_campaign(dec!(1000));
    assert_eq!(
        cast_vote(&mut c, "u", VoteChoice::Approve, None, now()).unwrap_err(),
        ProtocolError::VotingDisabled
    );

    let mut c = voting_campaign();
    c.status = CampaignStatus::AwaitingAdminApproval;
    assert_eq!(
        cast_vote(&mut c, "u", VoteChoice::Approve, None, now()).unwrap_err(),
        ProtocolError::VotingClosed
    );

    let mut c = voting_campaign();
    let after = c.voting_end_date.unwrap();
    assert_eq!(
        cast_vote(&mut c, "u", VoteChoice::Approve, None, after).unwrap_err(),
        ProtocolError::VotingEnded
    );
}

#[test]
fn test_long_comment_is_rejected() {
    let mut c = voting_campaign();
    let err = cast_vote(
        &mut c,
        "u",
        VoteChoice::Reject,
        Some("x".repeat(501)),
        now(),
    )
    .unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidField { field: "comment", .. }));
    assert!(c.votes.is_empty());
}

proptest! {
    #[test]
    fn prop_tally_tracks_votes(choices in prop::collection::vec((0u8..6, any::<bool>()), 0..60)) {
        let mut c = voting_campaign();
        for (voter, approve) in choices {
            let choice = if approve { VoteChoice::Approve } else { VoteChoice::Reject };
            let before = c.vote_results;
            match cast_vote(&mut c, &format!("u-{voter}"), choice, None, now()) {
                Ok(_) => {}
                Err(e) => {
                    prop_assert_eq!(e, ProtocolError::AlreadyVoted);
                    prop_assert_eq!(c.vote_results, before);
                }
            }
            invariants::assert_tally_consistent(&c.votes, &c.vote_results);
            invariants::assert_unique_voters(&c.votes);
        }
        prop_assert!(c.votes.len() <= 6);
        prop_assert_eq!(tally(&c.votes), c.vote_results);
    }
}
