//! Platform settings and the campaign category catalogue.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::auth::is_valid_email;
use super::{created, done, ok, ok_with, ApiResult, ApiState, JsonBody};
use crate::audit::{audited, AuditEvent, AuditTarget};
use crate::db::{settings, settings::PlatformCategory, settings::PlatformSettings};
use crate::errors::ApiError;
use crate::session::{ClientIp, SuperAdmin};
use crate::uploads::{MultipartForm, TempUpload, UploadKind};

const CATEGORY_NAME_MAX: usize = 50;
const LOGO_MAX_BYTES: usize = 5 * 1024 * 1024;

/// `GET /platform-settings`
async fn get_settings(State(state): State<Arc<ApiState>>) -> ApiResult<PlatformSettings> {
    ok(settings::get_or_create(&state.pool, Utc::now()).await?)
}

/// `GET /platform-settings/admin`
async fn admin_settings(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(_admin): SuperAdmin,
) -> ApiResult<PlatformSettings> {
    ok(settings::get_or_create(&state.pool, Utc::now()).await?)
}

/// `POST /platform-settings/upload-logo`, multipart `logo`.
async fn upload_logo(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(admin): SuperAdmin,
    ClientIp(ip): ClientIp,
    multipart: Multipart,
) -> ApiResult<PlatformSettings> {
    let form = MultipartForm::collect(multipart).await?;
    let logo = form
        .file("logo")
        .ok_or_else(|| ApiError::BadRequest("No logo file uploaded".to_string()))?;
    if logo.bytes.len() > LOGO_MAX_BYTES {
        return Err(ApiError::field("logo", "Logo must be at most 5MB"));
    }

    let now = Utc::now();
    let stored = state.uploads.save(UploadKind::PlatformLogo, logo, now).await?;
    let file = TempUpload::new(stored.path);
    let mut current = settings::get_or_create(&state.pool, now).await?;
    current.platform_logo = stored.url;
    current.updated_by = Some(admin.id.clone());
    current.updated_at = now;

    let event = AuditEvent::new(
        "platform_logo_upload",
        &admin,
        AuditTarget::Platform {
            setting: "platform_logo".to_string(),
        },
    )
    .detail("url", current.platform_logo.clone())
    .ip(ip);
    audited(&state.pool, event, settings::save(&state.pool, &current)).await?;
    file.keep();

    info!(admin_id = %admin.id, "Platform logo replaced");
    ok_with("Logo uploaded successfully", current)
}

/// Partial update; absent or blank fields keep their value and social links merge by key.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub platform_name: Option<String>,
    pub support_email: Option<String>,
    pub primary_color: Option<String>,
    pub platform_logo: Option<String>,
    pub platform_fees: Option<Decimal>,
    pub enable_user_registration: Option<bool>,
    pub social_links: Option<BTreeMap<String, String>>,
}

impl SettingsUpdate {
    fn apply(self, current: &mut PlatformSettings) -> Result<(), ApiError> {
        let filled = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        if let Some(fees) = self.platform_fees {
            if fees < Decimal::ZERO || fees > Decimal::ONE_HUNDRED {
                return Err(ApiError::field(
                    "platformFees",
                    "platformFees must be between 0 and 100",
                ));
            }
            current.platform_fees = fees;
        }
        if let Some(email) = filled(self.support_email) {
            if !is_valid_email(&email) {
                return Err(ApiError::field("supportEmail", "Please provide a valid email"));
            }
            current.support_email = email;
        }
        if let Some(name) = filled(self.platform_name) {
            current.platform_name = name;
        }
        if let Some(color) = filled(self.primary_color) {
            current.primary_color = color;
        }
        if let Some(logo) = filled(self.platform_logo) {
            current.platform_logo = logo;
        }
        if let Some(enabled) = self.enable_user_registration {
            current.enable_user_registration = enabled;
        }
        if let Some(links) = self.social_links {
            current.social_links.extend(links);
        }
        Ok(())
    }
}

/// `PUT /platform-settings`
async fn update_settings(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(admin): SuperAdmin,
    ClientIp(ip): ClientIp,
    JsonBody(update): JsonBody<SettingsUpdate>,
) -> ApiResult<PlatformSettings> {
    let now = Utc::now();
    let mut current = settings::get_or_create(&state.pool, now).await?;
    update.apply(&mut current)?;
    current.updated_by = Some(admin.id.clone());
    current.updated_at = now;

    let event = AuditEvent::new(
        "platform_settings_update",
        &admin,
        AuditTarget::Platform {
            setting: "platform_settings".to_string(),
        },
    )
    .detail("platformFees", current.platform_fees.to_string())
    .detail(
        "enableUserRegistration",
        current.enable_user_registration.to_string(),
    )
    .ip(ip);
    audited(&state.pool, event, settings::save(&state.pool, &current)).await?;

    info!(admin_id = %admin.id, "Platform settings updated");
    ok_with("Platform settings updated successfully", current)
}

/// `GET /platform-settings/categories`
async fn list_categories(
    State(state): State<Arc<ApiState>>,
) -> ApiResult<Vec<PlatformCategory>> {
    ok(settings::list_categories(&state.pool).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
}

/// `POST /platform-settings/categories`
async fn add_category(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(admin): SuperAdmin,
    ClientIp(ip): ClientIp,
    JsonBody(req): JsonBody<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Category name is required".to_string()))?;
    if name.chars().count() > CATEGORY_NAME_MAX {
        return Err(ApiError::field(
            "name",
            "Category name cannot exceed 50 characters",
        ));
    }
    let category = PlatformCategory {
        id: Uuid::new_v4().to_string(),
        name,
        created_at: Utc::now(),
    };

    let event = AuditEvent::new(
        "category_create",
        &admin,
        AuditTarget::Platform {
            setting: "categories".to_string(),
        },
    )
    .detail("name", category.name.clone())
    .ip(ip);
    audited(
        &state.pool,
        event,
        settings::insert_category(&state.pool, &category),
    )
    .await?;
    created("Category added successfully", category)
}

/// `DELETE /platform-settings/categories/:id`
async fn delete_category(
    State(state): State<Arc<ApiState>>,
    SuperAdmin(admin): SuperAdmin,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let event = AuditEvent::new(
        "category_delete",
        &admin,
        AuditTarget::Platform {
            setting: "categories".to_string(),
        },
    )
    .detail("categoryId", id.clone())
    .ip(ip);
    audited(&state.pool, event, async {
        if settings::delete_category(&state.pool, &id).await? {
            Ok(())
        } else {
            Err(ApiError::not_found("Category"))
        }
    })
    .await?;
    done("Category deleted successfully")
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/platform-settings", get(get_settings).put(update_settings))
        .route("/platform-settings/admin", get(admin_settings))
        .route("/platform-settings/upload-logo", post(upload_logo))
        .route(
            "/platform-settings/categories",
            get(list_categories).post(add_category),
        )
        .route("/platform-settings/categories/:id", delete(delete_category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::settings::default_social_links;
    use rust_decimal_macros::dec;

    fn defaults() -> PlatformSettings {
        PlatformSettings {
            platform_name: "Crowdfund".into(),
            support_email: "support@example.com".into(),
            primary_color: "#1976d2".into(),
            platform_logo: String::new(),
            platform_fees: dec!(2.5),
            enable_user_registration: true,
            social_links: default_social_links(),
            categories: Vec::new(),
            updated_by: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fees_outside_percentage_are_refused() {
        let mut s = defaults();
        let update = SettingsUpdate {
            platform_fees: Some(dec!(101)),
            ..Default::default()
        };
        assert!(update.apply(&mut s).is_err());
        assert_eq!(s.platform_fees, dec!(2.5));
    }

    #[test]
    fn social_links_merge_and_blanks_are_ignored() {
        let mut s = defaults();
        let update = SettingsUpdate {
            platform_name: Some("  ".into()),
            social_links: Some(BTreeMap::from([(
                "twitter".to_string(),
                "https://twitter.com/crowdfund".to_string(),
            )])),
            enable_user_registration: Some(false),
            ..Default::default()
        };
        update.apply(&mut s).unwrap();
        assert_eq!(s.platform_name, "Crowdfund");
        assert_eq!(s.social_links["twitter"], "https://twitter.com/crowdfund");
        assert_eq!(s.social_links.len(), default_social_links().len());
        assert!(!s.enable_user_registration);
    }
}
