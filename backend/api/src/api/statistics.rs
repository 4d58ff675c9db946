//! Public platform totals.

use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{ok, ApiResult, ApiState};
use crate::db::{campaigns, donations};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatistics {
    pub total_amount_raised: Decimal,
    pub total_donors: usize,
    pub total_campaigns: i64,
}

/// `GET /statistics`
async fn statistics(State(state): State<Arc<ApiState>>) -> ApiResult<PlatformStatistics> {
    let raised = donations::completed_amounts(&state.pool, None).await?;
    let donors = donations::distinct_donors(&state.pool, None).await?;
    ok(PlatformStatistics {
        total_amount_raised: raised.into_iter().sum(),
        total_donors: donors.len(),
        total_campaigns: campaigns::count(&state.pool).await?,
    })
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/statistics", get(statistics))
}
