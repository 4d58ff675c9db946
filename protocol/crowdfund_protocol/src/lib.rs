//! # Crowdfund Protocol
//!
//! Domain rules of the crowdfunding platform, free of any I/O. The HTTP
//! service in `backend/api` loads entities, hands them to the functions in
//! this crate and persists whatever they return.
//!
//! | Phase        | Entry point(s)                                               |
//! |--------------|--------------------------------------------------------------|
//! | Creation     | [`lifecycle::open_campaign`], [`lifecycle::apply_patch`]     |
//! | Moderation   | [`lifecycle::approve`], [`lifecycle::reject`]                |
//! | Funding      | [`settlement::settle`], [`settlement::DonationRequest`]      |
//! | Voting       | [`voting::cast_vote`], [`voting::tally`]                     |
//! | Release      | [`lifecycle::release_funds`]                                 |
//! | Withdrawals  | [`withdrawal::open_withdrawal`], [`withdrawal::cancel`], [`withdrawal::decide`] |
//! | Removal      | [`lifecycle::soft_delete`]                                   |
//!
//! ## Architecture
//!
//! Entity shapes live in [`types`]. Each lifecycle concern has its own
//! module and reports rule violations through [`ProtocolError`], whose
//! [`ErrorKind`] tells the caller whether the failure is a validation,
//! authorization or state problem.

pub mod errors;
pub mod lifecycle;
pub mod settlement;
pub mod types;
pub mod voting;
pub mod withdrawal;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_lifecycle;
#[cfg(test)]
mod test_settlement;
#[cfg(test)]
mod test_voting;
#[cfg(test)]
mod test_withdrawal;

pub use errors::{ErrorKind, ProtocolError};
pub use types::{
    BeneficiaryDetails, Campaign, CampaignStatus, Category, Donation, IdType, KycStatus,
    NotificationKind, PaymentMethod, PaymentStatus, PayoutStatus, ProofDocument, ReportStatus,
    UserRole, AdminRole, Vote, VoteChoice, VoteTally, Withdrawal, WithdrawalStatus,
};
pub use types::same_identity;
