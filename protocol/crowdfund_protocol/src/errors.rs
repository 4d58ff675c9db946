//! Domain errors raised by the lifecycle rules.

use thiserror::Error;

/// Broad class of a [`ProtocolError`], used by the service layer to pick a
/// response status without matching on every variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// Role, KYC or ownership check failed.
    Forbidden,
    /// The operation is not valid for the entity's current status.
    InvalidState,
    /// The entity refuses new writes of this kind (donations to a closed campaign).
    Conflict,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    #[error("unknown {kind} value '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("You must complete KYC verification to perform this action")]
    KycRequired,

    #[error("Only the campaign creator can perform this action")]
    NotOwner,

    #[error("Admin privileges required")]
    AdminRequired,

    #[error("This campaign is not accepting donations")]
    NotAcceptingDonations,

    #[error("Campaign is not awaiting admin approval")]
    NotAwaitingApproval,

    #[error("Campaign cannot be {action} while it is {status}")]
    InvalidTransition { action: &'static str, status: String },

    #[error("Cannot delete a campaign that has received donations")]
    HasFunds,

    #[error("Voting is not enabled for this campaign")]
    VotingDisabled,

    #[error("Voting is only allowed for active campaigns")]
    VotingClosed,

    #[error("Voting period has ended")]
    VotingEnded,

    #[error("You have already voted on this campaign")]
    AlreadyVoted,

    #[error("A pending withdrawal request already exists for this campaign")]
    PendingWithdrawalExists,

    #[error("Withdrawals can only be requested for active or completed campaigns")]
    WithdrawalNotAllowed,

    #[error("Only pending withdrawal requests can be {action}")]
    WithdrawalNotPending { action: &'static str },

    #[error("Not authorized to change this withdrawal request")]
    NotRequester,
}

impl ProtocolError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidField { .. } | Self::UnknownVariant { .. } => ErrorKind::Validation,
            Self::KycRequired | Self::NotOwner | Self::AdminRequired | Self::NotRequester => {
                ErrorKind::Forbidden
            }
            Self::NotAcceptingDonations => ErrorKind::Conflict,
            Self::NotAwaitingApproval
            | Self::InvalidTransition { .. }
            | Self::HasFunds
            | Self::VotingDisabled
            | Self::VotingClosed
            | Self::VotingEnded
            | Self::AlreadyVoted
            | Self::PendingWithdrawalExists
            | Self::WithdrawalNotAllowed
            | Self::WithdrawalNotPending { .. } => ErrorKind::InvalidState,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
