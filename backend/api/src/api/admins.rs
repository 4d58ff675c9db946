//! Administrator sign-in and account management.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use crowdfund_protocol::{same_identity, AdminRole};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::auth::{is_valid_email, normalize_email};
use super::{created, done, ok, ok_with, ApiResult, ApiState, JsonBody};
use crate::audit::{audited, AuditEvent, AuditTarget};
use crate::db::{admins, admins::AdminRecord};
use crate::errors::ApiError;
use crate::notify::{send_quietly, Email};
use crate::session::{self, ClientIp, SuperAdmin};

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminSession {
    pub admin: AdminRecord,
    pub token: String,
}

fn admin_target(admin: &AdminRecord) -> AuditTarget {
    AuditTarget::Admin {
        id: admin.id.clone(),
        email: Some(admin.email.clone()),
    }
}

/// `POST /admin/auth/login`
async fn login(
    State(state): State<Arc<ApiState>>,
    ClientIp(ip): ClientIp,
    JsonBody(req): JsonBody<AdminLoginRequest>,
) -> ApiResult<AdminSession> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());
    let admin = admins::find_by_email(&state.pool, &normalize_email(&req.email))
        .await?
        .ok_or_else(invalid)?;
    if !session::verify_password(&req.password, &admin.password_hash)? {
        return Err(invalid());
    }
    if !admin.is_active {
        return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
    }

    let now = Utc::now();
    let event = AuditEvent::new("admin_login", &admin, admin_target(&admin)).ip(ip);
    audited(&state.pool, event, admins::record_login(&state.pool, &admin.id, now)).await?;

    let token = state.sessions.issue_admin(&admin, now)?;
    let admin = AdminRecord {
        last_login_at: Some(now),
        ..admin
    };
    info!(admin_id = %admin.id, "Admin logged in");
    ok_with("Login successful", AdminSession { admin, token })
}

/// `GET /admin/admins`
async fn list_admins(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(_actor): SuperAdmin,
) -> ApiResult<Vec<AdminRecord>> {
    ok(admins::list(&state.pool).await?)
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

/// `POST /admin/admins`. The generated password is only ever sent by mail.
async fn create_admin(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(actor): SuperAdmin,
    ClientIp(ip): ClientIp,
    JsonBody(req): JsonBody<CreateAdminRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() || email.is_empty() || req.role.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Name, email, and role are required".to_string(),
        ));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::field("email", "Please provide a valid email"));
    }
    let role: AdminRole = req.role.trim().parse().map_err(|_| {
        ApiError::BadRequest("Invalid role. Must be admin or super_admin".to_string())
    })?;
    if admins::find_by_email(&state.pool, &email).await?.is_some() {
        return Err(ApiError::BadRequest(
            "Admin with this email already exists".to_string(),
        ));
    }

    let password = session::generate_password();
    let hash = session::hash_password(&password)?;
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let event = AuditEvent::new(
        "admin_create",
        &actor,
        AuditTarget::Admin {
            id: id.clone(),
            email: Some(email.clone()),
        },
    )
    .detail("role", role.as_str())
    .ip(ip);
    audited(
        &state.pool,
        event,
        admins::insert(&state.pool, &id, &name, &email, &hash, role, now),
    )
    .await?;

    send_quietly(
        state.mailer.as_ref(),
        Email::admin_credentials(&email, &name, &password, role.as_str()),
    )
    .await;

    let admin = admins::find_by_id(&state.pool, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Admin"))?;
    info!(admin_id = %id, role = %role, "Admin account created");
    created(
        "Admin created successfully. Credentials sent to email.",
        admin,
    )
}

async fn load_admin(state: &ApiState, id: &str) -> Result<AdminRecord, ApiError> {
    admins::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Admin"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleStatusRequest {
    pub is_active: bool,
}

/// `PUT /admin/admins/:id/toggle-status`
async fn toggle_status(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(actor): SuperAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ToggleStatusRequest>,
) -> ApiResult<AdminRecord> {
    let target = load_admin(&state, &id).await?;
    if target.is_super() || same_identity(&target.id, &actor.id) {
        return Err(ApiError::Forbidden(
            "Cannot deactivate super admin".to_string(),
        ));
    }

    let event = AuditEvent::new("admin_toggle_status", &actor, admin_target(&target))
        .detail("isActive", req.is_active.to_string())
        .ip(ip);
    audited(
        &state.pool,
        event,
        admins::set_active(&state.pool, &target.id, req.is_active, Utc::now()),
    )
    .await?;

    let message = if req.is_active {
        "Admin activated successfully"
    } else {
        "Admin deactivated successfully"
    };
    ok_with(
        message,
        AdminRecord {
            is_active: req.is_active,
            ..target
        },
    )
}

/// `DELETE /admin/admins/:id`
async fn delete_admin(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(actor): SuperAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let target = load_admin(&state, &id).await?;
    if target.is_super() || same_identity(&target.id, &actor.id) {
        return Err(ApiError::Forbidden("Cannot delete super admin".to_string()));
    }

    let event = AuditEvent::new("admin_delete", &actor, admin_target(&target)).ip(ip);
    audited(&state.pool, event, async {
        admins::delete(&state.pool, &target.id).await?;
        Ok::<_, ApiError>(())
    })
    .await?;
    info!(admin_id = %id, "Admin account deleted");
    done("Admin deleted successfully")
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/admin/auth/login", post(login))
        .route("/admin/admins", get(list_admins).post(create_admin))
        .route("/admin/admins/:id", delete(delete_admin))
        .route("/admin/admins/:id/toggle-status", put(toggle_status))
}
