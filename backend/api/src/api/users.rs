//! Signed-in user's own profile and notification inbox.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use super::{ok, ok_with, ApiResult, ApiState};
use crate::db::{notifications, notifications::Notification, users::UserRecord};
use crate::session::AuthUser;

const INBOX_SIZE: usize = 50;

/// `GET /users/me`
async fn me(AuthUser(user): AuthUser) -> ApiResult<UserRecord> {
    ok(user)
}

/// `GET /users/notifications`, newest first.
async fn inbox(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<Vec<Notification>> {
    let mut items = notifications::list_for_user(&state.pool, &user.id).await?;
    items.truncate(INBOX_SIZE);
    ok(items)
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// `POST /users/notifications/mark-read`
async fn mark_read(
    State(state): State<Arc<ApiState>>,
    AuthUser(user): AuthUser,
) -> ApiResult<MarkedRead> {
    let updated = notifications::mark_all_read(&state.pool, &user.id).await?;
    ok_with("Notifications marked as read", MarkedRead { updated })
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/users/me", get(me))
        .route("/users/notifications", get(inbox))
        .route("/users/notifications/mark-read", post(mark_read))
}
