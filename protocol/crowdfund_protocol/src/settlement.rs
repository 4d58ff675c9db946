//! # Settlement
//!
//! Folding a completed donation into a campaign. The service calls
//! [`settle`] with the amount it has just read and writes the result back
//! with a compare-and-set on that same amount, so two racing donations can
//! never both observe the pre-target balance and overrun silently.

use rust_decimal::Decimal;

use crate::errors::{ProtocolError, Result};
use crate::lifecycle::ensure_accepts_donations;
use crate::types::{CampaignStatus, PaymentMethod};

pub const DONOR_NAME_LEN: (usize, usize) = (2, 100);
pub const MESSAGE_MAX: usize = 500;

/// Largest amount accepted for a single donation, campaign target or
/// withdrawal.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Display name stored for anonymous donations.
pub const ANONYMOUS_DONOR: &str = "Anonymous";

/// Outcome of folding one donation into a campaign.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub previous_amount: Decimal,
    pub new_amount: Decimal,
    pub status: CampaignStatus,
    /// `true` only for the donation that pushed the campaign over its target.
    pub target_reached: bool,
}

/// Compute the campaign state after a donation of `amount`.
pub fn settle(
    status: CampaignStatus,
    current_amount: Decimal,
    target_amount: Decimal,
    amount: Decimal,
) -> Result<Settlement> {
    if amount <= Decimal::ZERO {
        return Err(ProtocolError::invalid(
            "amount",
            "donation amount must be greater than 0",
        ));
    }
    ensure_accepts_donations(status)?;

    let new_amount = current_amount
        .checked_add(amount)
        .ok_or_else(|| ProtocolError::invalid("amount", "donation amount is too large"))?;
    let target_reached = new_amount >= target_amount;
    let status = if target_reached {
        CampaignStatus::AwaitingAdminApproval
    } else {
        CampaignStatus::Active
    };

    Ok(Settlement {
        previous_amount: current_amount,
        new_amount,
        status,
        target_reached,
    })
}

/// Donor-supplied fields of a donation.
#[derive(Clone, Debug)]
pub struct DonationRequest {
    pub amount: Decimal,
    pub donor_name: String,
    pub payment_method: PaymentMethod,
    pub upi_id: Option<String>,
    pub message: Option<String>,
    pub is_anonymous: bool,
}

impl DonationRequest {
    /// Field-level checks that do not need the campaign.
    pub fn validate(&self) -> Result<()> {
        if self.amount < Decimal::ONE {
            return Err(ProtocolError::invalid(
                "amount",
                "donation amount must be at least 1",
            ));
        }
        if self.amount > MAX_AMOUNT {
            return Err(ProtocolError::invalid(
                "amount",
                format!("donation amount cannot exceed {MAX_AMOUNT}"),
            ));
        }
        let name_len = self.donor_name.trim().chars().count();
        if name_len < DONOR_NAME_LEN.0 || name_len > DONOR_NAME_LEN.1 {
            return Err(ProtocolError::invalid(
                "donorName",
                "donor name must be between 2 and 100 characters",
            ));
        }
        if let Some(message) = &self.message {
            if message.trim().chars().count() > MESSAGE_MAX {
                return Err(ProtocolError::invalid(
                    "message",
                    "message cannot exceed 500 characters",
                ));
            }
        }
        match (&self.upi_id, self.payment_method.requires_handle()) {
            (None, true) => Err(ProtocolError::invalid(
                "upiId",
                "UPI ID is required for UPI payments",
            )),
            (Some(handle), _) if !is_valid_upi_handle(handle.trim()) => Err(
                ProtocolError::invalid("upiId", "please provide a valid UPI ID"),
            ),
            _ => Ok(()),
        }
    }

    /// Name recorded on the donation row.
    pub fn display_name(&self) -> String {
        if self.is_anonymous {
            ANONYMOUS_DONOR.to_string()
        } else {
            self.donor_name.trim().to_string()
        }
    }
}

/// `local@provider`, local part `[A-Za-z0-9._-]+`, provider `[A-Za-z0-9.-]+`.
pub fn is_valid_upi_handle(handle: &str) -> bool {
    let Some((local, provider)) = handle.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !provider.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && provider
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
}

/// Aggregate over a campaign's completed donations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DonationTotals {
    pub total_amount: Decimal,
    pub total_donations: u64,
    pub average_amount: Decimal,
}

impl DonationTotals {
    pub fn from_amounts<I: IntoIterator<Item = Decimal>>(amounts: I) -> Self {
        let (total_amount, total_donations) = amounts
            .into_iter()
            .fold((Decimal::ZERO, 0u64), |(sum, n), a| (sum + a, n + 1));
        let average_amount = if total_donations == 0 {
            Decimal::ZERO
        } else {
            (total_amount / Decimal::from(total_donations)).round_dp(2)
        };
        Self {
            total_amount,
            total_donations,
            average_amount,
        }
    }
}
