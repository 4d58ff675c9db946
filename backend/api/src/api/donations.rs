//! Donation intake and donation reads.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use crowdfund_protocol::{
    lifecycle, settlement::DonationRequest, settlement::DonationTotals, Donation,
    NotificationKind, PaymentMethod, PaymentStatus,
};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{created, ok, ApiResult, ApiState, JsonBody, PageQuery, Pagination};
use crate::db::{campaigns, donations, PageWindow};
use crate::errors::ApiError;
use crate::notify::{self, notification};
use crate::session::{AuthUser, MaybeUser};

const LIST_LIMIT: u32 = 10;
const RECENT_COUNT: u32 = 5;
const TXN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `TXN<millis><nine upper-case alphanumerics>`.
pub fn transaction_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| char::from(TXN_ALPHABET[rng.gen_range(0..TXN_ALPHABET.len())]))
        .collect();
    format!("TXN{}{suffix}", now.timestamp_millis())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonateRequest {
    #[serde(default)]
    pub campaign_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub donor_name: String,
    pub payment_method: PaymentMethod,
    pub upi_id: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

impl DonateRequest {
    fn split(self) -> (String, DonationRequest) {
        let blank_to_none = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        (
            self.campaign_id.trim().to_string(),
            DonationRequest {
                amount: self.amount,
                donor_name: self.donor_name,
                payment_method: self.payment_method,
                upi_id: blank_to_none(self.upi_id),
                message: blank_to_none(self.message),
                is_anonymous: self.is_anonymous,
            },
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationReceipt {
    pub donation_id: String,
    pub transaction_id: String,
    pub amount: Decimal,
    pub payment_status: PaymentStatus,
    pub target_reached: bool,
}

/// `POST /donations/donate`. A missing or unusable token donates anonymously.
async fn donate(
    State(state): State<Arc<ApiState>>,
    MaybeUser(donor): MaybeUser,
    JsonBody(req): JsonBody<DonateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (campaign_id, request) = req.split();
    if campaign_id.is_empty() {
        return Err(ApiError::field(
            "campaignId",
            "Please provide a valid campaign ID",
        ));
    }
    request.validate()?;

    let campaign = campaigns::find(&state.pool, &campaign_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign"))?;
    lifecycle::ensure_accepts_donations(campaign.status)?;

    let now = Utc::now();
    let upi_id = if request.payment_method.requires_handle() {
        request.upi_id.clone()
    } else {
        None
    };
    let donation = Donation {
        id: Uuid::new_v4().to_string(),
        transaction_id: transaction_id(now),
        campaign_id: campaign_id.clone(),
        donor_id: donor.as_ref().map(|u| u.id.clone()),
        donor_name: request.display_name(),
        amount: request.amount,
        payment_method: request.payment_method,
        payment_status: PaymentStatus::Pending,
        upi_id,
        message: request.message,
        is_anonymous: request.is_anonymous,
        created_at: now,
    };

    let settled = donations::settle_donation(&state.pool, donation, now).await?;

    if settled.settlement.target_reached {
        info!(campaign_id = %campaign_id, "Campaign reached its target");
        let message = format!(
            "Congratulations! Your campaign \"{}\" has reached its target amount of {}. \
             The campaign is now under admin review for fund release.",
            settled.campaign_title, campaign.target_amount
        );
        notify::deliver(
            &state.pool,
            vec![
                notification(&settled.creator_id, NotificationKind::TargetReached, message, now)
                    .for_campaign(&campaign_id),
            ],
        )
        .await;
    }

    created(
        "Donation successful! Thank you for your contribution.",
        DonationReceipt {
            donation_id: settled.donation.id,
            transaction_id: settled.donation.transaction_id,
            amount: settled.donation.amount,
            payment_status: settled.donation.payment_status,
            target_reached: settled.settlement.target_reached,
        },
    )
}

#[derive(Debug, Serialize)]
pub struct DonationPage {
    pub donations: Vec<Donation>,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// `GET /donations/campaign/:id`, completed donations only.
async fn campaign_donations(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<DonationPage> {
    let window = page.window(LIST_LIMIT);
    let (donations, total) =
        donations::list_completed_for_campaign(&state.pool, &campaign_id, window).await?;
    ok(DonationPage {
        donations,
        pagination: Pagination::new(window, total),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationStats {
    #[serde(flatten)]
    pub totals: TotalsView,
    pub recent_donations: Vec<Donation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsView {
    pub total_amount: Decimal,
    pub total_donations: u64,
    pub average_amount: Decimal,
}

impl From<DonationTotals> for TotalsView {
    fn from(t: DonationTotals) -> Self {
        Self {
            total_amount: t.total_amount,
            total_donations: t.total_donations,
            average_amount: t.average_amount,
        }
    }
}

/// `GET /donations/campaign/:id/stats`
async fn campaign_stats(
    State(state): State<Arc<ApiState>>,
    Path(campaign_id): Path<String>,
) -> ApiResult<DonationStats> {
    let amounts = donations::completed_amounts(&state.pool, Some(&campaign_id)).await?;
    let (recent_donations, _) = donations::list_completed_for_campaign(
        &state.pool,
        &campaign_id,
        PageWindow::new(Some(1), Some(RECENT_COUNT), RECENT_COUNT),
    )
    .await?;
    ok(DonationStats {
        totals: DonationTotals::from_amounts(amounts).into(),
        recent_donations,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorHistory {
    pub donations: Vec<Donation>,
    pub total_donated: Decimal,
}

impl From<Vec<Donation>> for DonorHistory {
    fn from(donations: Vec<Donation>) -> Self {
        let total_donated = donations
            .iter()
            .filter(|d| d.payment_status == PaymentStatus::Completed)
            .map(|d| d.amount)
            .sum();
        Self {
            donations,
            total_donated,
        }
    }
}

/// `GET /donations/user-donations`
async fn my_donations(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<DonorHistory> {
    ok(donations::list_by_donor(&state.pool, &user.id, None).await?.into())
}

/// `GET /donations/user/:campaignId`
async fn my_donations_to(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(campaign_id): Path<String>,
) -> ApiResult<DonorHistory> {
    ok(donations::list_by_donor(&state.pool, &user.id, Some(&campaign_id))
        .await?
        .into())
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/donations/donate", post(donate))
        .route("/donations/campaign/:id", get(campaign_donations))
        .route("/donations/campaign/:id/stats", get(campaign_stats))
        .route("/donations/user-donations", get(my_donations))
        .route("/donations/user/:campaignId", get(my_donations_to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn transaction_id_shape() {
        let now = Utc::now();
        let id = transaction_id(now);
        let prefix = format!("TXN{}", now.timestamp_millis());
        assert!(id.starts_with(&prefix));
        let suffix = &id[prefix.len()..];
        assert_eq!(suffix.len(), 9);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn history_counts_completed_only() {
        let base = Donation {
            id: "d-1".into(),
            transaction_id: "TXN1".into(),
            campaign_id: "c-1".into(),
            donor_id: Some("u-1".into()),
            donor_name: "Asha".into(),
            amount: dec!(600),
            payment_method: PaymentMethod::Card,
            payment_status: PaymentStatus::Completed,
            upi_id: None,
            message: None,
            is_anonymous: false,
            created_at: Utc::now(),
        };
        let failed = Donation {
            id: "d-2".into(),
            amount: dec!(50),
            payment_status: PaymentStatus::Failed,
            ..base.clone()
        };
        let history = DonorHistory::from(vec![base, failed]);
        assert_eq!(history.total_donated, dec!(600));
        assert_eq!(history.donations.len(), 2);
    }
}
