//! Identity verification endpoints.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use crowdfund_protocol::{IdType, KycStatus};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ok, ok_with, required, ApiResult, ApiState, JsonBody};
use crate::db::users::{self, KycDetails, UserRecord};
use crate::errors::ApiError;
use crate::kyc::{log_outcome, VerificationRequest, VerificationResult};
use crate::session::AuthUser;
use crate::uploads::{MultipartForm, TempUpload};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycState {
    pub kyc_status: KycStatus,
    pub kyc: Option<KycDetails>,
}

/// KYC record of a named user, for reviewers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserKyc {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub kyc_status: KycStatus,
    pub kyc: Option<KycDetails>,
}

impl From<UserRecord> for UserKyc {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            email: user.email,
            kyc_status: user.kyc_status,
            kyc: user.kyc,
        }
    }
}

fn duplicate_id(id_type: IdType) -> ApiError {
    let label = match id_type {
        IdType::Aadhar => "Aadhaar",
        IdType::Pan => "PAN",
    };
    ApiError::BadRequest(format!(
        "This {label} number has already been used for KYC verification by another user. \
         Please use a different ID or contact support if this is an error."
    ))
}

fn parse_id_type(raw: Option<&str>) -> Result<IdType, ApiError> {
    match raw {
        None => Ok(IdType::Aadhar),
        Some(raw) => raw
            .trim()
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| ApiError::field("idType", "idType must be AADHAR or PAN")),
    }
}

/// `POST /kyc/verify`, multipart `idCard`, `faceImage`, `idType` and an
/// optional claimed `idNumber`.
async fn verify(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> ApiResult<KycState> {
    let form = MultipartForm::collect(multipart).await?;
    if user.kyc_status == KycStatus::Verified {
        return Err(ApiError::BadRequest("KYC is already verified".to_string()));
    }
    let (Some(id_card), Some(face)) = (form.file("idCard"), form.file("faceImage")) else {
        return Err(ApiError::BadRequest(
            "Both ID card and face image are required".to_string(),
        ));
    };
    let id_type = parse_id_type(form.text("idType"))?;
    let claimed = form
        .text("idNumber")
        .or_else(|| form.text("aadhaar_number"))
        .or_else(|| form.text("pan_number"));

    if let Some(number) = claimed {
        if users::id_number_taken(&state.pool, number, &user.id).await? {
            return Err(duplicate_id(id_type));
        }
    }

    let now = Utc::now();
    let id_card = TempUpload::new(state.uploads.stage_identity_image(id_card, now).await?);
    let face = TempUpload::new(state.uploads.stage_identity_image(face, now).await?);

    let result = state
        .verifier
        .verify(VerificationRequest {
            id_card: id_card.path(),
            face_image: face.path(),
            id_type,
            claimed_id_number: claimed,
        })
        .await?;
    log_outcome(&user.id, &result);

    match result {
        VerificationResult::Verified {
            name,
            id_number,
            face_match_score,
        } => {
            let id_number = id_number.or_else(|| claimed.map(str::to_string));
            if let Some(number) = &id_number {
                if users::id_number_taken(&state.pool, number, &user.id).await? {
                    warn!(user_id = %user.id, "Verified identity already bound to another account");
                    return Err(duplicate_id(id_type));
                }
            }
            let details = KycDetails {
                name,
                id_number,
                id_type: Some(id_type),
                verified_at: Some(now),
                face_match_score,
            };
            users::set_kyc_verified(&state.pool, &user.id, &details, now).await?;
            ok_with(
                "KYC verified successfully",
                KycState {
                    kyc_status: KycStatus::Verified,
                    kyc: Some(details),
                },
            )
        }
        VerificationResult::NotVerified { message, .. } => Err(ApiError::BadRequest(message)),
    }
}

/// `GET /kyc/status`
async fn status(AuthUser(user): AuthUser) -> ApiResult<KycState> {
    ok(KycState {
        kyc_status: user.kyc_status,
        kyc: user.kyc,
    })
}

/// `GET /kyc/status/:userId`, admin-role users only.
async fn status_of(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<UserKyc> {
    if !user.role.is_elevated() {
        return Err(ApiError::Forbidden(
            "Access denied. Admin privileges required.".to_string(),
        ));
    }
    let target = users::find_by_id(&state.pool, &user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    ok(target.into())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheckRequest {
    pub id_number: Option<String>,
    pub id_type: Option<String>,
}

/// Only the verdict leaves the server, never the other account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCheck {
    pub id_type: IdType,
    pub is_duplicate: bool,
    pub count: i64,
}

/// `POST /kyc/check-duplicate`
async fn check_duplicate(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<DuplicateCheckRequest>,
) -> ApiResult<DuplicateCheck> {
    let id_number = required("idNumber", req.id_number)?;
    let id_type = parse_id_type(req.id_type.as_deref())?;
    let count = users::count_id_number(&state.pool, &id_number, &user.id).await?;
    ok(DuplicateCheck {
        id_type,
        is_duplicate: count > 0,
        count,
    })
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/kyc/verify", post(verify))
        .route("/kyc/status", get(status))
        .route("/kyc/status/:userId", get(status_of))
        .route("/kyc/check-duplicate", post(check_duplicate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_type_defaults_and_case() {
        assert_eq!(parse_id_type(None).unwrap(), IdType::Aadhar);
        assert_eq!(parse_id_type(Some("pan")).unwrap(), IdType::Pan);
        assert!(parse_id_type(Some("passport")).is_err());
    }
}
