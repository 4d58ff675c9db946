//! Donation records and the settlement transaction.

use chrono::{DateTime, Utc};
use crowdfund_protocol::{
    settlement::{settle, Settlement},
    Donation, PaymentStatus,
};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::campaigns::{CampaignRow, CAMPAIGN_COLUMNS};
use super::{from_millis, money, parse_money, parse_wire, to_millis, PageWindow};
use crate::errors::{ApiError, Result};

#[derive(sqlx::FromRow)]
struct DonationRow {
    id: String,
    transaction_id: String,
    campaign_id: String,
    donor_id: Option<String>,
    donor_name: String,
    amount: String,
    payment_method: String,
    payment_status: String,
    upi_id: Option<String>,
    message: Option<String>,
    is_anonymous: bool,
    created_at: i64,
}

impl TryFrom<DonationRow> for Donation {
    type Error = ApiError;

    fn try_from(row: DonationRow) -> Result<Self> {
        Ok(Donation {
            id: row.id,
            transaction_id: row.transaction_id,
            campaign_id: row.campaign_id,
            donor_id: row.donor_id,
            donor_name: row.donor_name,
            amount: parse_money(&row.amount)?,
            payment_method: parse_wire(&row.payment_method)?,
            payment_status: parse_wire(&row.payment_status)?,
            upi_id: row.upi_id,
            message: row.message,
            is_anonymous: row.is_anonymous,
            created_at: from_millis(row.created_at)?,
        })
    }
}

const DONATION_COLUMNS: &str = r#"
    id, transaction_id, campaign_id, donor_id, donor_name, amount, payment_method,
    payment_status, upi_id, message, is_anonymous, created_at
"#;

fn into_donations(rows: Vec<DonationRow>) -> Result<Vec<Donation>> {
    rows.into_iter().map(Donation::try_from).collect()
}

/// Outcome of a committed settlement.
#[derive(Debug, Clone)]
pub struct Settled {
    pub donation: Donation,
    pub settlement: Settlement,
    pub creator_id: String,
    pub campaign_title: String,
}

// ─────────────────────────────────────────────────────────
// Settlement
// ─────────────────────────────────────────────────────────

/// Record `donation` and fold its amount into the campaign, atomically.
///
/// The donation row is written `pending` first, which also takes SQLite's
/// write lock for the rest of the transaction. The campaign balance is then
/// re-read, the new state computed, and written back with a compare-and-set
/// on the amount that was read. Any failure rolls the whole unit back.
pub async fn settle_donation(
    pool: &SqlitePool,
    mut donation: Donation,
    now: DateTime<Utc>,
) -> Result<Settled> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO donations
            (id, transaction_id, campaign_id, donor_id, donor_name, amount, payment_method,
             payment_status, upi_id, message, is_anonymous, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&donation.id)
    .bind(&donation.transaction_id)
    .bind(&donation.campaign_id)
    .bind(&donation.donor_id)
    .bind(&donation.donor_name)
    .bind(money(donation.amount))
    .bind(donation.payment_method.as_str())
    .bind(&donation.upi_id)
    .bind(&donation.message)
    .bind(donation.is_anonymous)
    .bind(to_millis(donation.created_at))
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, CampaignRow>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"
    ))
    .bind(&donation.campaign_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Campaign"))?;
    let read_amount = row.current_amount.clone();
    let campaign = row.into_campaign()?;

    let settlement = settle(
        campaign.status,
        campaign.current_amount,
        campaign.target_amount,
        donation.amount,
    )?;

    let swapped = sqlx::query(
        r#"
        UPDATE campaigns
        SET    current_amount = ?2, status = ?3, updated_at = ?4
        WHERE  id = ?1 AND current_amount = ?5 AND status = 'active'
        "#,
    )
    .bind(&campaign.id)
    .bind(money(settlement.new_amount))
    .bind(settlement.status.as_str())
    .bind(to_millis(now))
    .bind(&read_amount)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    if swapped != 1 {
        warn!(campaign_id = %campaign.id, "Settlement compare-and-set lost, rolling back");
        return Err(ApiError::Conflict(
            "Campaign changed while the donation was processed, please retry".to_string(),
        ));
    }

    // Payment gateway is stubbed: every recorded donation succeeds.
    sqlx::query("UPDATE donations SET payment_status = 'completed' WHERE id = ?1")
        .bind(&donation.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    donation.payment_status = PaymentStatus::Completed;

    info!(
        campaign_id = %campaign.id,
        transaction_id = %donation.transaction_id,
        amount = %donation.amount,
        new_amount = %settlement.new_amount,
        "Donation settled"
    );

    Ok(Settled {
        donation,
        settlement,
        creator_id: campaign.creator_id,
        campaign_title: campaign.title,
    })
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

/// Completed donations of a campaign, newest first.
pub async fn list_completed_for_campaign(
    pool: &SqlitePool,
    campaign_id: &str,
    window: PageWindow,
) -> Result<(Vec<Donation>, i64)> {
    let rows = sqlx::query_as::<_, DonationRow>(&format!(
        r#"
        SELECT {DONATION_COLUMNS} FROM donations
        WHERE  campaign_id = ?1 AND payment_status = 'completed'
        ORDER  BY created_at DESC
        LIMIT  ?2 OFFSET ?3
        "#
    ))
    .bind(campaign_id)
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool)
    .await?;
    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM donations WHERE campaign_id = ?1 AND payment_status = 'completed'",
    )
    .bind(campaign_id)
    .fetch_one(pool)
    .await?;
    Ok((into_donations(rows)?, total))
}

/// Amounts of all completed donations of a campaign. Summed in Rust so the
/// totals stay exact decimals.
pub async fn completed_amounts(pool: &SqlitePool, campaign_id: Option<&str>) -> Result<Vec<Decimal>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT amount FROM donations
        WHERE  payment_status = 'completed' AND (?1 IS NULL OR campaign_id = ?1)
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(|(a,)| parse_money(a)).collect()
}

pub async fn list_by_donor(
    pool: &SqlitePool,
    donor_id: &str,
    campaign_id: Option<&str>,
) -> Result<Vec<Donation>> {
    let rows = sqlx::query_as::<_, DonationRow>(&format!(
        r#"
        SELECT {DONATION_COLUMNS} FROM donations
        WHERE  donor_id = ?1 AND (?2 IS NULL OR campaign_id = ?2)
        ORDER  BY created_at DESC
        "#
    ))
    .bind(donor_id)
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    into_donations(rows)
}

pub async fn list_all(pool: &SqlitePool, window: PageWindow) -> Result<(Vec<Donation>, i64)> {
    let rows = sqlx::query_as::<_, DonationRow>(&format!(
        "SELECT {DONATION_COLUMNS} FROM donations ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
    ))
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool)
    .await?;
    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM donations")
        .fetch_one(pool)
        .await?;
    Ok((into_donations(rows)?, total))
}

/// Latest completed donations, newest first.
pub async fn recent_completed(pool: &SqlitePool, limit: i64) -> Result<Vec<Donation>> {
    let rows = sqlx::query_as::<_, DonationRow>(&format!(
        r#"
        SELECT {DONATION_COLUMNS} FROM donations
        WHERE  payment_status = 'completed'
        ORDER  BY created_at DESC
        LIMIT  ?1
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    into_donations(rows)
}

pub async fn count_for_campaign(pool: &SqlitePool, campaign_id: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM donations WHERE campaign_id = ?1")
        .bind(campaign_id)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Registered donors with at least one completed donation, optionally
/// restricted to one campaign.
pub async fn distinct_donors(pool: &SqlitePool, campaign_id: Option<&str>) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT donor_id FROM donations
        WHERE  donor_id IS NOT NULL AND payment_status = 'completed'
          AND  (?1 IS NULL OR campaign_id = ?1)
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(d,)| d).collect())
}
