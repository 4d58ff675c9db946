//! Platform-user registration, email verification, login and password reset.

use std::sync::{Arc, OnceLock};

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use crowdfund_protocol::UserRole;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::{created, done, ok, ok_with, ApiResult, ApiState, JsonBody};
use crate::db::{settings, users, users::NewUser, users::UserRecord};
use crate::errors::{ApiError, FieldError};
use crate::notify::{send_quietly, Email};
use crate::session::{self, AuthUser};

const OTP_TTL_MINUTES: i64 = 10;
const RESET_TTL_HOURS: i64 = 1;
const PASSWORD_MIN: usize = 6;
const NAME_LEN: (usize, usize) = (2, 50);

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|_| unreachable!())
    })
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

fn field_error(field: &str, message: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        let name_len = self.name.trim().chars().count();
        if name_len < NAME_LEN.0 || name_len > NAME_LEN.1 {
            errors.push(field_error(
                "name",
                "Name must be between 2 and 50 characters",
            ));
        }
        if !is_valid_email(&normalize_email(&self.email)) {
            errors.push(field_error("email", "Please provide a valid email"));
        }
        if self.password.chars().count() < PASSWORD_MIN {
            errors.push(field_error(
                "password",
                "Password must be at least 6 characters long",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub user_id: String,
    pub email: String,
}

/// `POST /auth/register`
async fn register(
    State(state): State<Arc<ApiState>>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    req.validate()?;
    let now = Utc::now();

    let platform = settings::get_or_create(&state.pool, now).await?;
    if !platform.enable_user_registration {
        return Err(ApiError::Forbidden(
            "User registration is currently disabled".to_string(),
        ));
    }

    let email = normalize_email(&req.email);
    let name = req.name.trim().to_string();
    let id = Uuid::new_v4().to_string();
    let otp = session::generate_otp();
    let password_hash = session::hash_password(&req.password)?;

    users::insert_user(
        &state.pool,
        &NewUser {
            id: &id,
            name: &name,
            email: &email,
            password_hash: &password_hash,
            role: UserRole::User,
            otp_code: Some(&otp),
            otp_expires_at: Some(now + Duration::minutes(OTP_TTL_MINUTES)),
            is_email_verified: false,
            now,
        },
    )
    .await?;

    if let Err(e) = state.mailer.send(&Email::otp(&email, &name, &otp)).await {
        warn!(user_id = %id, "Verification email failed, removing account: {e}");
        users::delete_user(&state.pool, &id).await?;
        return Err(ApiError::BadRequest(
            "Failed to send verification email. Please provide a valid email address."
                .to_string(),
        ));
    }

    info!(user_id = %id, "User registered");
    created(
        "Registration successful! Please check your email for OTP verification.",
        Registered { user_id: id, email },
    )
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionGrant {
    pub user: UserRecord,
    pub token: String,
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".to_string())
}

/// `POST /auth/login`
async fn login(
    State(state): State<Arc<ApiState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<SessionGrant> {
    let email = normalize_email(&req.email);
    let user = users::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(invalid_credentials)?;
    if !session::verify_password(&req.password, &user.password_hash)? {
        return Err(invalid_credentials());
    }
    if !user.is_email_verified {
        return Err(ApiError::Unauthorized(
            "Please verify your email address before logging in. Check your inbox for the verification email."
                .to_string(),
        ));
    }
    let token = state.sessions.issue_user(&user, Utc::now())?;
    info!(user_id = %user.id, "User logged in");
    ok_with("Login successful!", SessionGrant { user, token })
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

async fn unverified_user(state: &ApiState, email: &str) -> Result<UserRecord, ApiError> {
    let user = users::find_by_email(&state.pool, &normalize_email(email))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    if user.is_email_verified {
        return Err(ApiError::BadRequest("Email is already verified".to_string()));
    }
    Ok(user)
}

/// `POST /auth/verify-otp`
async fn verify_otp(
    State(state): State<Arc<ApiState>>,
    JsonBody(req): JsonBody<VerifyOtpRequest>,
) -> ApiResult<SessionGrant> {
    let user = unverified_user(&state, &req.email).await?;
    let now = Utc::now();
    let (Some(code), Some(expires_at)) = (&user.otp_code, user.otp_expires_at) else {
        return Err(ApiError::BadRequest(
            "No OTP found. Please request a new one.".to_string(),
        ));
    };
    if now > expires_at {
        return Err(ApiError::BadRequest(
            "OTP has expired. Please request a new one.".to_string(),
        ));
    }
    if code != req.otp.trim() {
        return Err(ApiError::BadRequest("Invalid OTP".to_string()));
    }

    users::mark_email_verified(&state.pool, &user.id, now).await?;
    let user = users::find_by_id(&state.pool, &user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let token = state.sessions.issue_user(&user, now)?;
    ok_with("Email verified successfully!", SessionGrant { user, token })
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

/// `POST /auth/resend-otp`
async fn resend_otp(
    State(state): State<Arc<ApiState>>,
    JsonBody(req): JsonBody<EmailRequest>,
) -> ApiResult<()> {
    let user = unverified_user(&state, &req.email).await?;
    let now = Utc::now();
    let otp = session::generate_otp();
    users::set_otp(
        &state.pool,
        &user.id,
        &otp,
        now + Duration::minutes(OTP_TTL_MINUTES),
        now,
    )
    .await?;
    state
        .mailer
        .send(&Email::otp(&user.email, &user.name, &otp))
        .await
        .map_err(|_| {
            ApiError::BadRequest(
                "Failed to send OTP. Please provide a valid email address.".to_string(),
            )
        })?;
    done("New OTP sent successfully! Please check your email.")
}

/// `POST /auth/request-password-reset`
///
/// Answers the same way whether or not the address is registered.
async fn request_password_reset(
    State(state): State<Arc<ApiState>>,
    JsonBody(req): JsonBody<EmailRequest>,
) -> ApiResult<()> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::field("email", "Please provide a valid email"));
    }
    if let Some(user) = users::find_by_email(&state.pool, &email).await? {
        let now = Utc::now();
        let token = session::generate_reset_token();
        users::set_reset_token(
            &state.pool,
            &user.id,
            &token,
            now + Duration::hours(RESET_TTL_HOURS),
            now,
        )
        .await?;
        send_quietly(
            state.mailer.as_ref(),
            Email::password_reset(&user.email, &user.name, &token),
        )
        .await;
    }
    done("If an account exists for this email, a password reset link has been sent.")
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
}

/// `POST /auth/reset-password`
async fn reset_password(
    State(state): State<Arc<ApiState>>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> ApiResult<()> {
    if req.password.chars().count() < PASSWORD_MIN {
        return Err(ApiError::field(
            "password",
            "Password must be at least 6 characters long",
        ));
    }
    let invalid = || {
        ApiError::BadRequest(
            "Invalid or expired reset token. Please request a new password reset.".to_string(),
        )
    };
    let token = req.token.trim();
    if token.is_empty() {
        return Err(invalid());
    }
    let user = users::find_by_reset_token(&state.pool, token)
        .await?
        .ok_or_else(invalid)?;
    let now = Utc::now();
    if user.reset_expires_at.map_or(true, |exp| now > exp) {
        return Err(invalid());
    }
    let hash = session::hash_password(&req.password)?;
    users::reset_password(&state.pool, &user.id, &hash, now).await?;
    info!(user_id = %user.id, "Password reset");
    done("Password reset successful! You can now login with your new password.")
}

/// `GET /auth/profile`
async fn profile(AuthUser(user): AuthUser) -> ApiResult<UserRecord> {
    ok(user)
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/resend-otp", post(resend_otp))
        .route("/auth/request-password-reset", post(request_password_reset))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/profile", get(profile))
}
