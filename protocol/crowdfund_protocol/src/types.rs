//! # Types
//!
//! Shared data structures used across all modules of the crowdfunding protocol.
//!
//! ## Design decisions
//!
//! ### Wire names
//!
//! Every enumeration has a fixed lower-case (or, for KYC, upper-case) wire name
//! produced by `as_str`, accepted by `FromStr` and used verbatim by serde. The
//! service stores exactly these strings, so the database and the JSON API can
//! never disagree about a status.
//!
//! ### Status as a Finite-State Machine
//!
//! [`CampaignStatus`] follows the lifecycle enforced in [`crate::lifecycle`]:
//!
//! ```text
//! (new) ──► PendingReview ──► Active ──► AwaitingAdminApproval ──► Completed
//!                │   ▲          │
//!                ▼   │          ▼
//!              Rejected ◄───────┘ (only while unfunded)
//!
//! {Draft, PendingReview, Rejected, Completed} ──► Deleted   (unfunded only)
//! ```
//!
//! ### Money
//!
//! Amounts are [`Decimal`]. They are never floats, so a sum of donations is
//! exactly the campaign's `current_amount`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Declares a closed enumeration with a fixed wire name per variant.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Identifier stored in the database and sent over the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(ProtocolError::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Lifecycle status of a campaign.
    pub enum CampaignStatus {
        /// Saved but never submitted.
        Draft => "draft",
        /// Submitted; waiting for a moderator.
        PendingReview => "pending_review",
        /// Accepting donations.
        Active => "active",
        /// Temporarily closed to donations.
        Paused => "paused",
        /// Funds released to the creator.
        Completed => "completed",
        /// Refused by a moderator.
        Rejected => "rejected",
        /// Soft-deleted by its creator or an admin.
        Deleted => "deleted",
        /// Target reached; funds held until an admin releases them.
        AwaitingAdminApproval => "awaiting_admin_approval",
    }
}

wire_enum! {
    pub enum Category {
        DisasterRecovery => "disaster_recovery",
        Education => "education",
        Sports => "sports",
        Business => "business",
        Medical => "medical",
        Community => "community",
        Environment => "environment",
        Arts => "arts",
        Technology => "technology",
        Other => "other",
    }
}

wire_enum! {
    pub enum VoteChoice {
        Approve => "approve",
        Reject => "reject",
    }
}

wire_enum! {
    pub enum PaymentMethod {
        Upi => "upi",
        Card => "card",
        NetBanking => "net_banking",
        Wallet => "wallet",
    }
}

wire_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
}

wire_enum! {
    pub enum WithdrawalStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Completed => "completed",
        Cancelled => "cancelled",
        Processed => "processed",
    }
}

wire_enum! {
    pub enum PayoutStatus {
        Pending => "pending",
        Processed => "processed",
        Failed => "failed",
        Reversed => "reversed",
    }
}

wire_enum! {
    /// Role carried by a platform user account.
    pub enum UserRole {
        User => "user",
        Admin => "admin",
        SuperAdmin => "super_admin",
    }
}

wire_enum! {
    /// Role carried by an administrator account.
    pub enum AdminRole {
        Admin => "admin",
        SuperAdmin => "super_admin",
    }
}

wire_enum! {
    pub enum IdType {
        Aadhar => "AADHAR",
        Pan => "PAN",
    }
}

wire_enum! {
    pub enum ReportStatus {
        Pending => "pending",
        Reviewed => "reviewed",
        Resolved => "resolved",
        Dismissed => "dismissed",
    }
}

wire_enum! {
    pub enum NotificationKind {
        Campaign => "campaign",
        Donation => "donation",
        Kyc => "kyc",
        Admin => "admin",
        Other => "other",
        VotingDocument => "voting_document",
        TargetReached => "target_reached",
        Report => "report",
    }
}

impl UserRole {
    /// Admin and super-admin users bypass the KYC gate.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

impl PaymentMethod {
    /// Methods that need a payer handle alongside the donation.
    pub fn requires_handle(&self) -> bool {
        matches!(self, Self::Upi)
    }
}

/// Identity verification state of a user.
///
/// Parsing is case-insensitive and accepts the legacy `not_submitted` spelling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    #[default]
    NotVerified,
    Pending,
    Verified,
    Failed,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotVerified => "NOT_VERIFIED",
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for KycStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KycStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NOT_VERIFIED" | "NOT_SUBMITTED" => Ok(Self::NotVerified),
            "PENDING" => Ok(Self::Pending),
            "VERIFIED" | "APPROVED" => Ok(Self::Verified),
            "FAILED" | "REJECTED" => Ok(Self::Failed),
            _ => Err(ProtocolError::UnknownVariant {
                kind: "KycStatus",
                value: s.to_string(),
            }),
        }
    }
}

/// Cached vote counts; always recomputed from the vote list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub approve_count: u32,
    pub reject_count: u32,
    pub total_votes: u32,
}

/// A single donor vote. Immutable once cast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter_id: String,
    pub vote: VoteChoice,
    pub comment: Option<String>,
    pub voted_at: DateTime<Utc>,
}

/// Evidence uploaded by the creator to justify fund release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofDocument {
    pub title: String,
    pub description: Option<String>,
    pub file_url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Full representation of a campaign.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    /// Unique identifier.
    pub id: String,
    /// User that created the campaign and receives its funds.
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    /// Funding goal; always positive.
    pub target_amount: Decimal,
    /// Sum of completed donations.
    pub current_amount: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub is_organization: bool,
    pub organization_name: Option<String>,
    pub organization_details: Option<String>,
    pub is_voting_enabled: bool,
    pub voting_end_date: Option<DateTime<Utc>>,
    pub proof_documents: Vec<ProofDocument>,
    pub votes: Vec<Vote>,
    pub vote_results: VoteTally,
    pub status: CampaignStatus,
    pub funds_released: bool,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Ownership check on the identity string issued at account creation.
    pub fn is_owned_by(&self, actor_id: &str) -> bool {
        same_identity(&self.creator_id, actor_id)
    }
}

/// Compare two principal identifiers. Identifiers are generated as lower-case
/// hyphenated UUIDs; surrounding whitespace and letter case are ignored.
pub fn same_identity(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// A recorded contribution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    pub transaction_id: String,
    pub campaign_id: String,
    /// `None` for unauthenticated donors.
    pub donor_id: Option<String>,
    pub donor_name: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub upi_id: Option<String>,
    pub message: Option<String>,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeneficiaryDetails {
    pub account_number: Option<String>,
    pub ifsc: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// A creator's request to draw down campaign funds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub campaign_id: String,
    pub requester_id: String,
    pub amount: Decimal,
    pub reason: String,
    pub status: WithdrawalStatus,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub is_voting_campaign: bool,
    pub payout_id: Option<String>,
    pub payout_status: PayoutStatus,
    pub beneficiary: BeneficiaryDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
