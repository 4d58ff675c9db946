//! Database layer: pool set-up, migrations and per-entity queries.
//!
//! Every query is a runtime `sqlx::query`/`query_as` so the crate builds
//! without a live database. Rows are read into `*Row` structs of plain
//! SQLite types and converted into domain values at the module boundary.

pub mod admins;
pub mod audit;
pub mod campaigns;
pub mod donations;
pub mod moderation;
pub mod notifications;
pub mod settings;
pub mod users;
pub mod withdrawals;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crowdfund_protocol::ProtocolError;
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::errors::{ApiError, Result};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Column codecs
// ─────────────────────────────────────────────────────────

pub fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ApiError::Corrupt(format!("timestamp out of range: {ms}")))
}

pub fn from_millis_opt(ms: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

/// Canonical text form of an amount. Equal amounts always encode equally,
/// which the settlement compare-and-set relies on.
pub fn money(amount: Decimal) -> String {
    amount.normalize().to_string()
}

pub fn parse_money(text: &str) -> Result<Decimal> {
    Decimal::from_str(text).map_err(|e| ApiError::Corrupt(format!("amount '{text}': {e}")))
}

/// Parse a stored wire name back into its enum.
pub fn parse_wire<T>(text: &str) -> Result<T>
where
    T: FromStr<Err = ProtocolError>,
{
    text.parse()
        .map_err(|e: ProtocolError| ApiError::Corrupt(e.to_string()))
}

pub fn parse_json_list(text: &str) -> Result<Vec<String>> {
    serde_json::from_str(text).map_err(|e| ApiError::Corrupt(format!("list column: {e}")))
}

/// `LIMIT`/`OFFSET` pair for a 1-based page.
#[derive(Debug, Clone, Copy)]
pub struct PageWindow {
    pub page: u32,
    pub limit: u32,
}

impl PageWindow {
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit.filter(|l| *l > 0).unwrap_or(default_limit).min(100),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.limit)
    }
}
