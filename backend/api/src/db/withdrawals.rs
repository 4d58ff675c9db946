//! Withdrawal requests.

use crowdfund_protocol::{BeneficiaryDetails, ProtocolError, Withdrawal, WithdrawalStatus};
use sqlx::SqlitePool;

use super::{from_millis, from_millis_opt, money, parse_money, parse_wire, to_millis};
use crate::errors::{ApiError, Result};

#[derive(sqlx::FromRow)]
struct WithdrawalRow {
    id: String,
    campaign_id: String,
    requester_id: String,
    amount: String,
    reason: String,
    status: String,
    admin_notes: Option<String>,
    rejection_reason: Option<String>,
    approved_by: Option<String>,
    approved_at: Option<i64>,
    is_voting_campaign: bool,
    payout_id: Option<String>,
    payout_status: String,
    beneficiary_account: Option<String>,
    beneficiary_ifsc: Option<String>,
    beneficiary_name: Option<String>,
    beneficiary_phone: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<WithdrawalRow> for Withdrawal {
    type Error = ApiError;

    fn try_from(row: WithdrawalRow) -> Result<Self> {
        Ok(Withdrawal {
            id: row.id,
            campaign_id: row.campaign_id,
            requester_id: row.requester_id,
            amount: parse_money(&row.amount)?,
            reason: row.reason,
            status: parse_wire(&row.status)?,
            admin_notes: row.admin_notes,
            rejection_reason: row.rejection_reason,
            approved_by: row.approved_by,
            approved_at: from_millis_opt(row.approved_at)?,
            is_voting_campaign: row.is_voting_campaign,
            payout_id: row.payout_id,
            payout_status: parse_wire(&row.payout_status)?,
            beneficiary: BeneficiaryDetails {
                account_number: row.beneficiary_account,
                ifsc: row.beneficiary_ifsc,
                name: row.beneficiary_name,
                phone: row.beneficiary_phone,
            },
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

const WITHDRAWAL_COLUMNS: &str = r#"
    id, campaign_id, requester_id, amount, reason, status, admin_notes, rejection_reason,
    approved_by, approved_at, is_voting_campaign, payout_id, payout_status,
    beneficiary_account, beneficiary_ifsc, beneficiary_name, beneficiary_phone,
    created_at, updated_at
"#;

fn into_withdrawals(rows: Vec<WithdrawalRow>) -> Result<Vec<Withdrawal>> {
    rows.into_iter().map(Withdrawal::try_from).collect()
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

/// Insert a new `pending` request. The partial unique index on pending rows
/// turns a racing duplicate into the same error the pre-check reports.
pub async fn insert(pool: &SqlitePool, w: &Withdrawal) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO withdrawals
            (id, campaign_id, requester_id, amount, reason, status, is_voting_campaign,
             payout_status, beneficiary_account, beneficiary_ifsc, beneficiary_name,
             beneficiary_phone, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&w.id)
    .bind(&w.campaign_id)
    .bind(&w.requester_id)
    .bind(money(w.amount))
    .bind(&w.reason)
    .bind(w.status.as_str())
    .bind(w.is_voting_campaign)
    .bind(w.payout_status.as_str())
    .bind(&w.beneficiary.account_number)
    .bind(&w.beneficiary.ifsc)
    .bind(&w.beneficiary.name)
    .bind(&w.beneficiary.phone)
    .bind(to_millis(w.created_at))
    .bind(to_millis(w.updated_at))
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(ProtocolError::PendingWithdrawalExists.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Persist a decision or cancellation; only lands while the row is still
/// `pending`.
pub async fn save_decision(pool: &SqlitePool, w: &Withdrawal) -> Result<bool> {
    let done = sqlx::query(
        r#"
        UPDATE withdrawals
        SET    status = ?2, admin_notes = ?3, rejection_reason = ?4, approved_by = ?5,
               approved_at = ?6, updated_at = ?7
        WHERE  id = ?1 AND status = 'pending'
        "#,
    )
    .bind(&w.id)
    .bind(w.status.as_str())
    .bind(&w.admin_notes)
    .bind(&w.rejection_reason)
    .bind(&w.approved_by)
    .bind(w.approved_at.map(to_millis))
    .bind(to_millis(w.updated_at))
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn find(pool: &SqlitePool, id: &str) -> Result<Option<Withdrawal>> {
    let row = sqlx::query_as::<_, WithdrawalRow>(&format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(Withdrawal::try_from).transpose()
}

pub async fn has_pending(pool: &SqlitePool, campaign_id: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM withdrawals WHERE campaign_id = ?1 AND status = 'pending' LIMIT 1",
    )
    .bind(campaign_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn list_by_requester(pool: &SqlitePool, requester_id: &str) -> Result<Vec<Withdrawal>> {
    let rows = sqlx::query_as::<_, WithdrawalRow>(&format!(
        r#"
        SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals
        WHERE  requester_id = ?1
        ORDER  BY created_at DESC
        "#
    ))
    .bind(requester_id)
    .fetch_all(pool)
    .await?;
    into_withdrawals(rows)
}

/// Withdrawals of a campaign that were not raised under donor voting.
pub async fn list_non_voting_for_campaign(
    pool: &SqlitePool,
    campaign_id: &str,
) -> Result<Vec<Withdrawal>> {
    let rows = sqlx::query_as::<_, WithdrawalRow>(&format!(
        r#"
        SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals
        WHERE  campaign_id = ?1 AND is_voting_campaign = 0
        ORDER  BY created_at DESC
        "#
    ))
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    into_withdrawals(rows)
}

/// Admin queue; every status when `status` is `None`.
pub async fn list_by_status(
    pool: &SqlitePool,
    status: Option<WithdrawalStatus>,
) -> Result<Vec<Withdrawal>> {
    let rows = sqlx::query_as::<_, WithdrawalRow>(&format!(
        r#"
        SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals
        WHERE  ?1 IS NULL OR status = ?1
        ORDER  BY created_at DESC
        "#
    ))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;
    into_withdrawals(rows)
}
