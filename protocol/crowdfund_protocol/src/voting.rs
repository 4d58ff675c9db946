//! # Donor voting
//!
//! Votes are immutable once cast: a second attempt by the same voter is
//! refused, never overwritten. The cached [`VoteTally`] is always rebuilt
//! from the full vote list.

use chrono::{DateTime, Utc};

use crate::errors::{ProtocolError, Result};
use crate::types::{same_identity, Campaign, CampaignStatus, Vote, VoteChoice, VoteTally};

pub const COMMENT_MAX: usize = 500;

/// Recount a vote list from scratch.
pub fn tally(votes: &[Vote]) -> VoteTally {
    let approve_count = votes
        .iter()
        .filter(|v| v.vote == VoteChoice::Approve)
        .count() as u32;
    let reject_count = votes
        .iter()
        .filter(|v| v.vote == VoteChoice::Reject)
        .count() as u32;
    VoteTally {
        approve_count,
        reject_count,
        total_votes: approve_count + reject_count,
    }
}

/// Check whether `voter_id` may vote on `campaign` at `now`.
pub fn ensure_can_vote(campaign: &Campaign, voter_id: &str, now: DateTime<Utc>) -> Result<()> {
    if !campaign.is_voting_enabled {
        return Err(ProtocolError::VotingDisabled);
    }
    if campaign.status != CampaignStatus::Active {
        return Err(ProtocolError::VotingClosed);
    }
    if let Some(end) = campaign.voting_end_date {
        if now >= end {
            return Err(ProtocolError::VotingEnded);
        }
    }
    if campaign
        .votes
        .iter()
        .any(|v| same_identity(&v.voter_id, voter_id))
    {
        return Err(ProtocolError::AlreadyVoted);
    }
    Ok(())
}

/// Record a vote and refresh the cached tally. Returns the vote as stored.
pub fn cast_vote(
    campaign: &mut Campaign,
    voter_id: &str,
    choice: VoteChoice,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<Vote> {
    let comment = comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(c) = &comment {
        if c.chars().count() > COMMENT_MAX {
            return Err(ProtocolError::invalid(
                "comment",
                "comment cannot exceed 500 characters",
            ));
        }
    }
    ensure_can_vote(campaign, voter_id, now)?;

    let vote = Vote {
        voter_id: voter_id.to_string(),
        vote: choice,
        comment,
        voted_at: now,
    };
    campaign.votes.push(vote.clone());
    campaign.vote_results = tally(&campaign.votes);
    campaign.updated_at = now;
    Ok(vote)
}
