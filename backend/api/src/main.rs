//! Crowdfunding API server entry point.
//!
//! Loads configuration, prepares the database and upload area, seeds the
//! first super admin when none exists, then serves the REST API.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use crowdfund_protocol::AdminRole;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crowdfund_api::api::{self, ApiState};
use crowdfund_api::config::Config;
use crowdfund_api::kyc::HttpVerifier;
use crowdfund_api::{db, errors, notify, session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Structured logging; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    errors::expose_internal_details(config.is_development());

    let pool = db::init_pool(&config.database_url).await?;
    seed_super_admin(&pool, &config).await?;

    let verifier = HttpVerifier::new(&config.kyc_service_url, config.kyc_timeout)?;
    let mailer = notify::mailer_for(&config)?;
    let state = Arc::new(ApiState::new(
        pool,
        config.clone(),
        mailer,
        Arc::new(verifier),
    ));
    state.uploads.ensure_dirs().await?;

    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Create the first super admin from `SUPER_ADMIN_EMAIL`/`SUPER_ADMIN_PASSWORD`.
async fn seed_super_admin(pool: &sqlx::SqlitePool, config: &Config) -> anyhow::Result<()> {
    if db::admins::count(pool).await? > 0 {
        return Ok(());
    }
    let Some((email, password)) = &config.super_admin else {
        warn!("No admin accounts exist and SUPER_ADMIN_EMAIL is not set");
        return Ok(());
    };
    let hash = session::hash_password(password)?;
    db::admins::insert(
        pool,
        &Uuid::new_v4().to_string(),
        "Super Admin",
        &email.trim().to_lowercase(),
        &hash,
        AdminRole::SuperAdmin,
        Utc::now(),
    )
    .await?;
    info!(%email, "Seeded super admin account");
    Ok(())
}
