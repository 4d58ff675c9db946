//! Axum REST API: shared state, response envelope and the route table.

mod admin;
mod admins;
mod audit_logs;
mod auth;
mod campaigns;
mod donations;
mod health;
mod kyc;
mod reports;
mod settings;
mod statistics;
mod users;
mod withdrawals;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRequest},
    http::StatusCode,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::db::PageWindow;
use crate::errors::ApiError;
use crate::kyc::IdentityVerifier;
use crate::notify::Mailer;
use crate::session::Sessions;
use crate::uploads::UploadArea;

/// Largest accepted request body (campaign videos included).
const BODY_LIMIT: usize = 50 * 1024 * 1024;

pub struct ApiState {
    pub pool: SqlitePool,
    pub config: Config,
    pub sessions: Sessions,
    pub uploads: UploadArea,
    pub mailer: Arc<dyn Mailer>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl ApiState {
    pub fn new(
        pool: SqlitePool,
        config: Config,
        mailer: Arc<dyn Mailer>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let sessions = Sessions::new(
            &config.jwt_secret,
            config.user_token_ttl,
            config.admin_token_ttl,
        );
        let uploads = UploadArea::new(&config.upload_dir, &config.kyc_staging_dir);
        Self {
            pool,
            config,
            sessions,
            uploads,
            mailer,
            verifier,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        message: None,
        data: Some(data),
    }))
}

pub fn ok_with<T: Serialize>(message: &str, data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        message: Some(message.to_string()),
        data: Some(data),
    }))
}

pub fn done(message: &str) -> ApiResult<()> {
    Ok(Json(Envelope {
        success: true,
        message: Some(message.to_string()),
        data: None,
    }))
}

pub fn created<T: Serialize>(
    message: &str,
    data: T,
) -> Result<(StatusCode, Json<Envelope<T>>), ApiError> {
    Ok((
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        }),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: i64,
    pub total: i64,
    pub limit: u32,
}

impl Pagination {
    pub fn new(window: PageWindow, total: i64) -> Self {
        let limit = i64::from(window.limit.max(1));
        Self {
            current_page: window.page,
            total_pages: (total + limit - 1) / limit,
            total,
            limit: window.limit,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn window(&self, default_limit: u32) -> PageWindow {
        PageWindow::new(self.page, self.limit, default_limit)
    }
}

/// JSON body whose rejection renders through [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Reject an empty or whitespace-only text field.
pub fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::field(field, format!("{field} is required")))
}

// ─────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────

pub fn router(state: Arc<ApiState>) -> Router {
    let uploads = ServeDir::new(state.uploads.root().to_path_buf());

    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(campaigns::router())
        .merge(donations::router())
        .merge(withdrawals::router())
        .merge(kyc::router())
        .merge(reports::router())
        .merge(settings::router())
        .merge(statistics::router())
        .merge(audit_logs::router())
        .merge(admins::router())
        .merge(admin::router())
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
