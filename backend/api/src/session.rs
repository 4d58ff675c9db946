//! Bearer tokens, password hashing and principal resolution.
//!
//! Users and admins share one token format; the `kind` claim keeps the two
//! namespaces apart. [`authenticate`] decodes the token and re-reads the
//! principal on every request so role changes, deactivation and deletion
//! take effect immediately.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{
        Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};

use crate::api::ApiState;
use crate::db::{admins, admins::AdminRecord, users, users::UserRecord};
use crate::errors::{ApiError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub kind: PrincipalKind,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct Sessions {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    user_ttl: Duration,
    admin_ttl: Duration,
}

impl Sessions {
    pub fn new(secret: &str, user_ttl: Duration, admin_ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            user_ttl,
            admin_ttl,
        }
    }

    pub fn issue_user(&self, user: &UserRecord, now: DateTime<Utc>) -> Result<String> {
        self.issue(
            PrincipalKind::User,
            &user.id,
            &user.email,
            user.role.as_str(),
            self.user_ttl,
            now,
        )
    }

    pub fn issue_admin(&self, admin: &AdminRecord, now: DateTime<Utc>) -> Result<String> {
        self.issue(
            PrincipalKind::Admin,
            &admin.id,
            &admin.email,
            admin.role.as_str(),
            self.admin_ttl,
            now,
        )
    }

    fn issue(
        &self,
        kind: PrincipalKind,
        sub: &str,
        email: &str,
        role: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let iat = now.timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            kind,
            email: email.to_string(),
            role: role.to_string(),
            iat,
            exp: iat + ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {e}")))
    }

    pub fn decode(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthorized("Token expired".to_string())
                }
                _ => ApiError::Unauthorized("Invalid token".to_string()),
            })
    }
}

// ─────────────────────────────────────────────────────────
// Passwords and one-time secrets
// ─────────────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))
}

/// `Ok(false)` on a mismatch; `Err` only when the stored hash is unusable.
pub fn verify_password(candidate: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ApiError::Corrupt(format!("password hash: {e}")))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(other) => Err(ApiError::Internal(format!(
            "Password verification failed: {other}"
        ))),
    }
}

/// Six decimal digits.
pub fn generate_otp() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

pub fn generate_reset_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

// ─────────────────────────────────────────────────────────
// Principal resolution
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    User,
    Admin,
    SuperAdmin,
}

#[derive(Debug, Clone)]
pub enum Principal {
    User(UserRecord),
    Admin(AdminRecord),
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty()).then_some(token)
}

/// Resolve the caller for `requirement`, re-reading the principal record.
pub async fn authenticate(
    state: &ApiState,
    parts: &Parts,
    requirement: Requirement,
) -> Result<Principal> {
    let token = bearer_token(parts)
        .ok_or_else(|| ApiError::Unauthorized("Access token is required".to_string()))?;
    let claims = state.sessions.decode(token)?;

    match (requirement, claims.kind) {
        (Requirement::User, PrincipalKind::User) => {
            let user = users::find_by_id(&state.pool, &claims.sub)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;
            if !user.is_email_verified {
                return Err(ApiError::Unauthorized(
                    "Please verify your email address".to_string(),
                ));
            }
            Ok(Principal::User(user))
        }
        (Requirement::User, PrincipalKind::Admin) => {
            Err(ApiError::Unauthorized("Invalid token".to_string()))
        }
        (Requirement::Admin | Requirement::SuperAdmin, PrincipalKind::User) => Err(
            ApiError::Forbidden("Access denied. Admin only.".to_string()),
        ),
        (Requirement::Admin | Requirement::SuperAdmin, PrincipalKind::Admin) => {
            let admin = admins::find_by_id(&state.pool, &claims.sub)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("Admin not found".to_string()))?;
            if !admin.is_active {
                return Err(ApiError::Forbidden(
                    "Admin account is deactivated".to_string(),
                ));
            }
            if requirement == Requirement::SuperAdmin && !admin.is_super() {
                return Err(ApiError::Forbidden(
                    "Access denied. Super admin only.".to_string(),
                ));
            }
            Ok(Principal::Admin(admin))
        }
    }
}

// ─────────────────────────────────────────────────────────
// Extractors
// ─────────────────────────────────────────────────────────

/// A verified platform user.
pub struct AuthUser(pub UserRecord);

/// A platform user when a valid token is present, otherwise anonymous.
pub struct MaybeUser(pub Option<UserRecord>);

/// An active administrator.
pub struct AuthAdmin(pub AdminRecord);

/// An active super administrator.
pub struct SuperAdmin(pub AdminRecord);

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self> {
        match authenticate(state, parts, Requirement::User).await? {
            Principal::User(user) => Ok(AuthUser(user)),
            Principal::Admin(_) => Err(ApiError::Unauthorized("Invalid token".to_string())),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self> {
        if bearer_token(parts).is_none() {
            return Ok(MaybeUser(None));
        }
        match authenticate(state, parts, Requirement::User).await {
            Ok(Principal::User(user)) => Ok(MaybeUser(Some(user))),
            Ok(Principal::Admin(_))
            | Err(ApiError::Unauthorized(_))
            | Err(ApiError::Forbidden(_)) => Ok(MaybeUser(None)),
            Err(other) => Err(other),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for AuthAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self> {
        match authenticate(state, parts, Requirement::Admin).await? {
            Principal::Admin(admin) => Ok(AuthAdmin(admin)),
            Principal::User(_) => Err(ApiError::Forbidden("Access denied. Admin only.".to_string())),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for SuperAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<ApiState>) -> Result<Self> {
        match authenticate(state, parts, Requirement::SuperAdmin).await? {
            Principal::Admin(admin) => Ok(SuperAdmin(admin)),
            Principal::User(_) => Err(ApiError::Forbidden("Access denied. Admin only.".to_string())),
        }
    }
}

/// Caller address: first `X-Forwarded-For` hop, else the socket peer.
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(ClientIp(forwarded.or(peer)))
    }
}
