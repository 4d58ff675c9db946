//! Application-wide error types and their HTTP rendering.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crowdfund_protocol::{ErrorKind, ProtocolError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

static EXPOSE_INTERNAL: AtomicBool = AtomicBool::new(false);

/// Show internal error detail in responses (development only).
pub fn expose_internal_details(enabled: bool) {
    EXPOSE_INTERNAL.store(enabled, Ordering::Relaxed);
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// An external collaborator (verification service, mail relay) failed.
    #[error("{0}")]
    Upstream(String),

    /// Stored data that no longer parses into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Protocol(e) => match e.kind() {
                ErrorKind::Validation | ErrorKind::InvalidState => StatusCode::BAD_REQUEST,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Conflict => StatusCode::CONFLICT,
            },
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) | ApiError::Http(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_)
            | ApiError::Migrate(_)
            | ApiError::Json(_)
            | ApiError::Io(_)
            | ApiError::Config(_)
            | ApiError::Corrupt(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, errors) = match self {
            ApiError::Validation(errors) => ("Validation failed".to_string(), Some(errors)),
            ApiError::Protocol(ProtocolError::InvalidField { field, message }) => (
                message.clone(),
                Some(vec![FieldError {
                    field: field.to_string(),
                    message,
                }]),
            ),
            ApiError::Http(e) => {
                error!("Upstream HTTP failure: {e}");
                ("Upstream service unavailable".to_string(), None)
            }
            other if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!("Request failed: {other}");
                if EXPOSE_INTERNAL.load(Ordering::Relaxed) {
                    (other.to_string(), None)
                } else {
                    ("Internal server error".to_string(), None)
                }
            }
            other => (other.to_string(), None),
        };

        let body = Json(ErrorBody {
            success: false,
            message,
            errors,
        });
        (status, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("Invalid multipart body: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_by_kind() {
        assert_eq!(
            ApiError::from(ProtocolError::NotAcceptingDonations).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ProtocolError::NotAwaitingApproval).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ProtocolError::NotOwner).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(ProtocolError::invalid("amount", "bad")).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_detail_hidden_by_default() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
