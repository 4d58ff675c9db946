//! Creator-side withdrawal requests.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use crowdfund_protocol::{
    withdrawal::{self, WithdrawalRequest},
    BeneficiaryDetails, Withdrawal,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{created, ok, ok_with, ApiResult, ApiState, JsonBody};
use crate::db::{campaigns, withdrawals};
use crate::errors::ApiError;
use crate::session::AuthUser;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWithdrawal {
    pub campaign_id: Option<String>,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
    #[serde(default)]
    pub beneficiary_details: BeneficiaryDetails,
}

/// `POST /withdrawals/request`
async fn request_withdrawal(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<RequestWithdrawal>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(campaign_id), Some(amount), Some(reason)) = (
        req.campaign_id.filter(|c| !c.trim().is_empty()),
        req.amount,
        req.reason.filter(|r| !r.trim().is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Campaign ID, amount, and reason are required".to_string(),
        ));
    };

    let campaign = campaigns::find(&state.pool, campaign_id.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign"))?;
    let has_pending = withdrawals::has_pending(&state.pool, &campaign.id).await?;
    let request = withdrawal::open_withdrawal(
        Uuid::new_v4().to_string(),
        &campaign,
        &user.as_actor(),
        WithdrawalRequest {
            amount,
            reason,
            beneficiary: req.beneficiary_details,
        },
        has_pending,
        Utc::now(),
    )?;
    withdrawals::insert(&state.pool, &request).await?;

    info!(
        withdrawal_id = %request.id,
        campaign_id = %request.campaign_id,
        amount = %request.amount,
        "Withdrawal requested"
    );
    created("Withdrawal request submitted successfully", request)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub cancel_reason: Option<String>,
}

/// `POST|PATCH /withdrawals/cancel/:id`
async fn cancel_withdrawal(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    body: Option<JsonBody<CancelRequest>>,
) -> ApiResult<Withdrawal> {
    let note = body.and_then(|JsonBody(b)| b.cancel_reason);
    let mut request = withdrawals::find(&state.pool, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Withdrawal request"))?;
    withdrawal::cancel(&mut request, &user.id, note, Utc::now())?;

    if !withdrawals::save_decision(&state.pool, &request).await? {
        return Err(ApiError::Conflict(
            "Withdrawal request was already processed".to_string(),
        ));
    }
    info!(withdrawal_id = %id, "Withdrawal cancelled by requester");
    ok_with("Withdrawal request cancelled", request)
}

/// `GET /withdrawals/my-withdrawals`
async fn my_withdrawals(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<Withdrawal>> {
    ok(withdrawals::list_by_requester(&state.pool, &user.id).await?)
}

/// `GET /withdrawals/campaign/:campaignId`, withdrawals raised without donor voting.
async fn campaign_withdrawals(
    State(state): State<Arc<ApiState>>,
    AuthUser(_user): AuthUser,
    Path(campaign_id): Path<String>,
) -> ApiResult<Vec<Withdrawal>> {
    ok(withdrawals::list_non_voting_for_campaign(&state.pool, &campaign_id).await?)
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/withdrawals/request", post(request_withdrawal))
        .route(
            "/withdrawals/cancel/:id",
            post(cancel_withdrawal).patch(cancel_withdrawal),
        )
        .route("/withdrawals/my-withdrawals", get(my_withdrawals))
        .route("/withdrawals/campaign/:campaignId", get(campaign_withdrawals))
}
