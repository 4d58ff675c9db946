//! Campaign rows plus their vote and proof-document child tables.

use crowdfund_protocol::{
    voting::tally, Campaign, CampaignStatus, Category, ProofDocument, ProtocolError, Vote,
    VoteTally,
};
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::{
    from_millis, from_millis_opt, money, parse_json_list, parse_money, parse_wire, to_millis,
    PageWindow,
};
use crate::errors::{ApiError, Result};

#[derive(sqlx::FromRow)]
pub(crate) struct CampaignRow {
    id: String,
    creator_id: String,
    title: String,
    description: String,
    category: String,
    target_amount: String,
    pub(crate) current_amount: String,
    start_date: i64,
    end_date: i64,
    images: String,
    videos: String,
    is_organization: bool,
    organization_name: Option<String>,
    organization_details: Option<String>,
    is_voting_enabled: bool,
    voting_end_date: Option<i64>,
    approve_count: i64,
    reject_count: i64,
    total_votes: i64,
    status: String,
    funds_released: bool,
    rejection_reason: Option<String>,
    created_at: i64,
    updated_at: i64,
}

pub(crate) const CAMPAIGN_COLUMNS: &str = r#"
    id, creator_id, title, description, category, target_amount, current_amount,
    start_date, end_date, images, videos, is_organization, organization_name,
    organization_details, is_voting_enabled, voting_end_date, approve_count,
    reject_count, total_votes, status, funds_released, rejection_reason,
    created_at, updated_at
"#;

impl CampaignRow {
    /// Build the domain value. Child rows are attached by the caller.
    pub(crate) fn into_campaign(self) -> Result<Campaign> {
        Ok(Campaign {
            id: self.id,
            creator_id: self.creator_id,
            title: self.title,
            description: self.description,
            category: parse_wire(&self.category)?,
            target_amount: parse_money(&self.target_amount)?,
            current_amount: parse_money(&self.current_amount)?,
            start_date: from_millis(self.start_date)?,
            end_date: from_millis(self.end_date)?,
            images: parse_json_list(&self.images)?,
            videos: parse_json_list(&self.videos)?,
            is_organization: self.is_organization,
            organization_name: self.organization_name,
            organization_details: self.organization_details,
            is_voting_enabled: self.is_voting_enabled,
            voting_end_date: from_millis_opt(self.voting_end_date)?,
            proof_documents: Vec::new(),
            votes: Vec::new(),
            vote_results: VoteTally {
                approve_count: self.approve_count as u32,
                reject_count: self.reject_count as u32,
                total_votes: self.total_votes as u32,
            },
            status: parse_wire(&self.status)?,
            funds_released: self.funds_released,
            rejection_reason: self.rejection_reason,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VoteRow {
    voter_id: String,
    vote: String,
    comment: Option<String>,
    voted_at: i64,
}

impl TryFrom<VoteRow> for Vote {
    type Error = ApiError;

    fn try_from(row: VoteRow) -> Result<Self> {
        Ok(Vote {
            voter_id: row.voter_id,
            vote: parse_wire(&row.vote)?,
            comment: row.comment,
            voted_at: from_millis(row.voted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProofRow {
    title: String,
    description: Option<String>,
    file_url: String,
    uploaded_at: i64,
}

fn json_list(items: &[String]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

// ─────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────

pub async fn insert(pool: &SqlitePool, c: &Campaign) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO campaigns
            (id, creator_id, title, description, category, target_amount, current_amount,
             start_date, end_date, images, videos, is_organization, organization_name,
             organization_details, is_voting_enabled, voting_end_date, status,
             funds_released, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
        "#,
    )
    .bind(&c.id)
    .bind(&c.creator_id)
    .bind(&c.title)
    .bind(&c.description)
    .bind(c.category.as_str())
    .bind(money(c.target_amount))
    .bind(money(c.current_amount))
    .bind(to_millis(c.start_date))
    .bind(to_millis(c.end_date))
    .bind(json_list(&c.images)?)
    .bind(json_list(&c.videos)?)
    .bind(c.is_organization)
    .bind(&c.organization_name)
    .bind(&c.organization_details)
    .bind(c.is_voting_enabled)
    .bind(c.voting_end_date.map(to_millis))
    .bind(c.status.as_str())
    .bind(c.funds_released)
    .bind(to_millis(c.created_at))
    .bind(to_millis(c.updated_at))
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist creator-editable fields, guarded on the status the edit was
/// validated against. Returns `false` when the campaign moved in between.
pub async fn save_edit(pool: &SqlitePool, c: &Campaign, expected: CampaignStatus) -> Result<bool> {
    let done = sqlx::query(
        r#"
        UPDATE campaigns
        SET    title = ?2, description = ?3, category = ?4, target_amount = ?5,
               start_date = ?6, end_date = ?7, is_organization = ?8, organization_name = ?9,
               organization_details = ?10, is_voting_enabled = ?11, voting_end_date = ?12,
               status = ?13, rejection_reason = ?14, updated_at = ?15
        WHERE  id = ?1 AND status = ?16
        "#,
    )
    .bind(&c.id)
    .bind(&c.title)
    .bind(&c.description)
    .bind(c.category.as_str())
    .bind(money(c.target_amount))
    .bind(to_millis(c.start_date))
    .bind(to_millis(c.end_date))
    .bind(c.is_organization)
    .bind(&c.organization_name)
    .bind(&c.organization_details)
    .bind(c.is_voting_enabled)
    .bind(c.voting_end_date.map(to_millis))
    .bind(c.status.as_str())
    .bind(&c.rejection_reason)
    .bind(to_millis(c.updated_at))
    .bind(expected.as_str())
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Persist a status transition computed by the lifecycle rules. The write
/// only lands if the row still holds `expected` status and the amount the
/// transition was checked against.
pub async fn save_transition(
    pool: &SqlitePool,
    c: &Campaign,
    expected: CampaignStatus,
) -> Result<bool> {
    let done = sqlx::query(
        r#"
        UPDATE campaigns
        SET    status = ?2, rejection_reason = ?3, funds_released = ?4, updated_at = ?5
        WHERE  id = ?1 AND status = ?6 AND current_amount = ?7
        "#,
    )
    .bind(&c.id)
    .bind(c.status.as_str())
    .bind(&c.rejection_reason)
    .bind(c.funds_released)
    .bind(to_millis(c.updated_at))
    .bind(expected.as_str())
    .bind(money(c.current_amount))
    .execute(pool)
    .await?;
    Ok(done.rows_affected() == 1)
}

/// Record a vote and refresh the cached tally from the vote table.
pub async fn insert_vote(pool: &SqlitePool, campaign_id: &str, vote: &Vote) -> Result<VoteTally> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO campaign_votes (campaign_id, voter_id, vote, comment, voted_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(campaign_id)
    .bind(&vote.voter_id)
    .bind(vote.vote.as_str())
    .bind(&vote.comment)
    .bind(to_millis(vote.voted_at))
    .execute(&mut *tx)
    .await;
    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(ProtocolError::AlreadyVoted.into());
        }
        Err(e) => return Err(e.into()),
    }

    let votes = load_votes(&mut tx, campaign_id).await?;
    let results = tally(&votes);
    sqlx::query(
        r#"
        UPDATE campaigns
        SET    approve_count = ?2, reject_count = ?3, total_votes = ?4, updated_at = ?5
        WHERE  id = ?1
        "#,
    )
    .bind(campaign_id)
    .bind(i64::from(results.approve_count))
    .bind(i64::from(results.reject_count))
    .bind(i64::from(results.total_votes))
    .bind(to_millis(vote.voted_at))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(results)
}

pub async fn insert_proof(pool: &SqlitePool, campaign_id: &str, proof: &ProofDocument) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO proof_documents (campaign_id, title, description, file_url, uploaded_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(campaign_id)
    .bind(&proof.title)
    .bind(&proof.description)
    .bind(&proof.file_url)
    .bind(to_millis(proof.uploaded_at))
    .execute(pool)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

async fn load_votes(tx: &mut Transaction<'_, Sqlite>, campaign_id: &str) -> Result<Vec<Vote>> {
    let rows = sqlx::query_as::<_, VoteRow>(
        r#"
        SELECT voter_id, vote, comment, voted_at
        FROM   campaign_votes
        WHERE  campaign_id = ?1
        ORDER  BY voted_at ASC
        "#,
    )
    .bind(campaign_id)
    .fetch_all(&mut **tx)
    .await?;
    rows.into_iter().map(Vote::try_from).collect()
}

/// Full campaign with votes and proof documents.
pub async fn find(pool: &SqlitePool, id: &str) -> Result<Option<Campaign>> {
    let Some(row) = sqlx::query_as::<_, CampaignRow>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };
    let mut campaign = row.into_campaign()?;

    let votes = sqlx::query_as::<_, VoteRow>(
        r#"
        SELECT voter_id, vote, comment, voted_at
        FROM   campaign_votes
        WHERE  campaign_id = ?1
        ORDER  BY voted_at ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    campaign.votes = votes
        .into_iter()
        .map(Vote::try_from)
        .collect::<Result<Vec<_>>>()?;

    let proofs = sqlx::query_as::<_, ProofRow>(
        r#"
        SELECT title, description, file_url, uploaded_at
        FROM   proof_documents
        WHERE  campaign_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    campaign.proof_documents = proofs
        .into_iter()
        .map(|p| {
            Ok(ProofDocument {
                title: p.title,
                description: p.description,
                file_url: p.file_url,
                uploaded_at: from_millis(p.uploaded_at)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(campaign))
}

fn into_campaigns(rows: Vec<CampaignRow>) -> Result<Vec<Campaign>> {
    rows.into_iter().map(CampaignRow::into_campaign).collect()
}

/// Public listing: active campaigns, newest first. List reads skip child rows;
/// the cached tally is still present.
pub async fn list_active(
    pool: &SqlitePool,
    category: Option<Category>,
    search: Option<&str>,
    window: PageWindow,
) -> Result<(Vec<Campaign>, i64)> {
    let category = category.map(|c| c.as_str());
    let filter = r#"
        WHERE status = 'active'
          AND (?1 IS NULL OR category = ?1)
          AND (?2 IS NULL OR title LIKE '%' || ?2 || '%' OR description LIKE '%' || ?2 || '%')
    "#;

    let rows = sqlx::query_as::<_, CampaignRow>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns {filter} ORDER BY created_at DESC LIMIT ?3 OFFSET ?4"
    ))
    .bind(category)
    .bind(search)
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM campaigns {filter}"))
        .bind(category)
        .bind(search)
        .fetch_one(pool)
        .await?;

    Ok((into_campaigns(rows)?, total))
}

/// A creator's own campaigns in every status except `deleted`.
pub async fn list_by_creator(pool: &SqlitePool, creator_id: &str) -> Result<Vec<Campaign>> {
    let rows = sqlx::query_as::<_, CampaignRow>(&format!(
        r#"
        SELECT {CAMPAIGN_COLUMNS} FROM campaigns
        WHERE  creator_id = ?1 AND status != 'deleted'
        ORDER  BY created_at DESC
        "#
    ))
    .bind(creator_id)
    .fetch_all(pool)
    .await?;
    into_campaigns(rows)
}

/// Moderation queue; every status when `status` is `None`.
pub async fn list_by_status(
    pool: &SqlitePool,
    status: Option<CampaignStatus>,
    window: PageWindow,
) -> Result<(Vec<Campaign>, i64)> {
    let status = status.map(|s| s.as_str());
    let rows = sqlx::query_as::<_, CampaignRow>(&format!(
        r#"
        SELECT {CAMPAIGN_COLUMNS} FROM campaigns
        WHERE  ?1 IS NULL OR status = ?1
        ORDER  BY created_at DESC
        LIMIT  ?2 OFFSET ?3
        "#
    ))
    .bind(status)
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool)
    .await?;
    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE ?1 IS NULL OR status = ?1")
            .bind(status)
            .fetch_one(pool)
            .await?;
    Ok((into_campaigns(rows)?, total))
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM campaigns")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Campaign totals per status; statuses with no campaigns are absent.
pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(CampaignStatus, i64)>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM campaigns GROUP BY status")
            .fetch_all(pool)
            .await?;
    rows.into_iter()
        .map(|(status, n)| parse_wire(&status).map(|s| (s, n)))
        .collect()
}

/// Title lookup for notification texts.
pub async fn title_of(pool: &SqlitePool, id: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT title FROM campaigns WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(t,)| t))
}

