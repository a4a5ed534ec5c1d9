//! PostgreSQL store
//!
//! Each batch runs in one transaction with a local statement timeout. Updates
//! are `UPDATE ... WHERE id = $1 AND version = $expected`; zero affected rows
//! aborts the transaction, and dropping an unfinished transaction rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{
    postgres::PgArguments, query::Query, types::Json, PgPool, Postgres, Transaction,
};
use std::collections::BTreeMap;
use tracing::instrument;
use uuid::Uuid;

use super::{LifecycleStore, Record, StoreError, WriteBatch};
use crate::domain::{
    AttachmentRef, Bid, BidStatus, Budget, CompanyVerification, Milestone, Project,
    ProjectStatus, VerificationStatus,
};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

const OPEN_BID_INDEX: &str = "uniq_bids_open_per_company";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgStore {
    pub fn new(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

const PROJECT_COLUMNS: &str = "id, owner_id, title, description, status, budget_min, budget_max, \
     bid_ids, accepted_bid_id, is_invite_only, invited_company_ids, version, created_at, updated_at";

const BID_COLUMNS: &str = "id, project_id, company_id, amount, milestones, proposal, timeline_days, \
     status, rejection_reason, expires_at, version, submitted_at, updated_at";

const VERIFICATION_COLUMNS: &str = "company_id, status, documents, required_doc_keys, \
     rejection_reason, reviewed_by, reviewed_at, version, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    budget_min: Decimal,
    budget_max: Option<Decimal>,
    bid_ids: Vec<Uuid>,
    accepted_bid_id: Option<Uuid>,
    is_invite_only: bool,
    invited_company_ids: Vec<Uuid>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        let status = ProjectStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
            entity: "project",
            detail: format!("unknown status '{}'", row.status),
        })?;

        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            status,
            budget: Budget::new(row.budget_min, row.budget_max),
            bid_ids: row.bid_ids,
            accepted_bid_id: row.accepted_bid_id,
            is_invite_only: row.is_invite_only,
            invited_company_ids: row.invited_company_ids,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BidRow {
    id: Uuid,
    project_id: Uuid,
    company_id: Uuid,
    amount: Decimal,
    milestones: Json<Vec<Milestone>>,
    proposal: Option<String>,
    timeline_days: Option<i32>,
    status: String,
    rejection_reason: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    version: i64,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BidRow> for Bid {
    type Error = StoreError;

    fn try_from(row: BidRow) -> Result<Self, Self::Error> {
        let status = BidStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
            entity: "bid",
            detail: format!("unknown status '{}'", row.status),
        })?;

        Ok(Self {
            id: row.id,
            project_id: row.project_id,
            company_id: row.company_id,
            amount: row.amount,
            milestones: row.milestones.0,
            proposal: row.proposal,
            timeline_days: row.timeline_days,
            status,
            rejection_reason: row.rejection_reason,
            expires_at: row.expires_at,
            version: row.version,
            submitted_at: row.submitted_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VerificationRow {
    company_id: Uuid,
    status: String,
    documents: Json<BTreeMap<String, AttachmentRef>>,
    required_doc_keys: Vec<String>,
    rejection_reason: Option<String>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for CompanyVerification {
    type Error = StoreError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        let status =
            VerificationStatus::parse(&row.status).ok_or_else(|| StoreError::Corrupt {
                entity: "company_verification",
                detail: format!("unknown status '{}'", row.status),
            })?;

        Ok(Self {
            company_id: row.company_id,
            status,
            documents: row.documents.0,
            required_doc_keys: row.required_doc_keys,
            rejection_reason: row.rejection_reason,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Translate a unique violation into the store's conflict vocabulary
fn classify(err: sqlx::Error, record: &Record) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            if let Record::Bid(bid) = record {
                if db.constraint() == Some(OPEN_BID_INDEX) {
                    return StoreError::OpenBidExists {
                        project_id: bid.project_id,
                        company_id: bid.company_id,
                    };
                }
            }
            if db.constraint().map_or(false, |c| c.ends_with("_pkey")) {
                return StoreError::AlreadyExists {
                    entity: record.entity(),
                    id: record.id(),
                };
            }
            return StoreError::VersionConflict {
                entity: record.entity(),
                id: record.id(),
            };
        }
    }
    StoreError::Database(err)
}

/// Updates carry one extra parameter: the version the row must still have
fn with_expected(query: PgQuery<'_>, expected: Option<i64>) -> PgQuery<'_> {
    match expected {
        Some(version) => query.bind(version),
        None => query,
    }
}

async fn write_project(
    tx: &mut Transaction<'_, Postgres>,
    project: &Project,
    expected: Option<i64>,
) -> Result<u64, sqlx::Error> {
    let query = match expected {
        None => sqlx::query(
            r#"
            INSERT INTO projects (id, owner_id, title, description, status, budget_min, budget_max,
                bid_ids, accepted_bid_id, is_invite_only, invited_company_ids, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        ),
        Some(_) => sqlx::query(
            r#"
            UPDATE projects SET
                owner_id = $2, title = $3, description = $4, status = $5,
                budget_min = $6, budget_max = $7, bid_ids = $8, accepted_bid_id = $9,
                is_invite_only = $10, invited_company_ids = $11, version = $12,
                created_at = $13, updated_at = $14
            WHERE id = $1 AND version = $15
            "#,
        ),
    };

    let query = query
        .bind(project.id)
        .bind(project.owner_id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(project.budget.min)
        .bind(project.budget.max)
        .bind(&project.bid_ids)
        .bind(project.accepted_bid_id)
        .bind(project.is_invite_only)
        .bind(&project.invited_company_ids)
        .bind(project.version)
        .bind(project.created_at)
        .bind(project.updated_at);

    let result = with_expected(query, expected).execute(&mut **tx).await?;

    Ok(result.rows_affected())
}

async fn write_bid(
    tx: &mut Transaction<'_, Postgres>,
    bid: &Bid,
    expected: Option<i64>,
) -> Result<u64, sqlx::Error> {
    let query = match expected {
        None => sqlx::query(
            r#"
            INSERT INTO bids (id, project_id, company_id, amount, milestones, proposal, timeline_days,
                status, rejection_reason, expires_at, version, submitted_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        ),
        Some(_) => sqlx::query(
            r#"
            UPDATE bids SET
                project_id = $2, company_id = $3, amount = $4, milestones = $5,
                proposal = $6, timeline_days = $7, status = $8, rejection_reason = $9,
                expires_at = $10, version = $11, submitted_at = $12, updated_at = $13
            WHERE id = $1 AND version = $14
            "#,
        ),
    };

    let query = query
        .bind(bid.id)
        .bind(bid.project_id)
        .bind(bid.company_id)
        .bind(bid.amount)
        .bind(Json(&bid.milestones))
        .bind(&bid.proposal)
        .bind(bid.timeline_days)
        .bind(bid.status.as_str())
        .bind(&bid.rejection_reason)
        .bind(bid.expires_at)
        .bind(bid.version)
        .bind(bid.submitted_at)
        .bind(bid.updated_at);

    let result = with_expected(query, expected).execute(&mut **tx).await?;

    Ok(result.rows_affected())
}

async fn write_verification(
    tx: &mut Transaction<'_, Postgres>,
    verification: &CompanyVerification,
    expected: Option<i64>,
) -> Result<u64, sqlx::Error> {
    let query = match expected {
        None => sqlx::query(
            r#"
            INSERT INTO company_verifications (company_id, status, documents, required_doc_keys,
                rejection_reason, reviewed_by, reviewed_at, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        ),
        Some(_) => sqlx::query(
            r#"
            UPDATE company_verifications SET
                status = $2, documents = $3, required_doc_keys = $4, rejection_reason = $5,
                reviewed_by = $6, reviewed_at = $7, version = $8, created_at = $9, updated_at = $10
            WHERE company_id = $1 AND version = $11
            "#,
        ),
    };

    let query = query
        .bind(verification.company_id)
        .bind(verification.status.as_str())
        .bind(Json(&verification.documents))
        .bind(&verification.required_doc_keys)
        .bind(&verification.rejection_reason)
        .bind(verification.reviewed_by)
        .bind(verification.reviewed_at)
        .bind(verification.version)
        .bind(verification.created_at)
        .bind(verification.updated_at);

    let result = with_expected(query, expected).execute(&mut **tx).await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl LifecycleStore for PgStore {
    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Project::try_from).transpose()
    }

    async fn bid(&self, id: Uuid) -> Result<Option<Bid>, StoreError> {
        let row = sqlx::query_as::<_, BidRow>(&format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Bid::try_from).transpose()
    }

    async fn bids_for_project(&self, project_id: Uuid) -> Result<Vec<Bid>, StoreError> {
        let rows = sqlx::query_as::<_, BidRow>(&format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE project_id = $1 ORDER BY submitted_at ASC, id ASC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Bid::try_from).collect()
    }

    async fn open_bid(
        &self,
        project_id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<Bid>, StoreError> {
        let row = sqlx::query_as::<_, BidRow>(&format!(
            r#"
            SELECT {BID_COLUMNS} FROM bids
            WHERE project_id = $1 AND company_id = $2 AND status IN ('pending', 'under_review')
            "#
        ))
        .bind(project_id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Bid::try_from).transpose()
    }

    async fn expired_open_bids(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bid>, StoreError> {
        let rows = sqlx::query_as::<_, BidRow>(&format!(
            r#"
            SELECT {BID_COLUMNS} FROM bids
            WHERE status IN ('pending', 'under_review')
              AND expires_at IS NOT NULL AND expires_at < $1
            ORDER BY expires_at ASC, id ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Bid::try_from).collect()
    }

    async fn verification(
        &self,
        company_id: Uuid,
    ) -> Result<Option<CompanyVerification>, StoreError> {
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM company_verifications WHERE company_id = $1"
        ))
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CompanyVerification::try_from).transpose()
    }

    #[instrument(skip_all, fields(writes = batch.len()))]
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout_ms
        ))
        .execute(&mut *tx)
        .await?;

        for write in batch.writes() {
            let affected = match &write.record {
                Record::Project(p) => write_project(&mut tx, p, write.expected_version).await,
                Record::Bid(b) => write_bid(&mut tx, b, write.expected_version).await,
                Record::Verification(v) => {
                    write_verification(&mut tx, v, write.expected_version).await
                }
            }
            .map_err(|e| classify(e, &write.record))?;

            if affected == 0 {
                tracing::debug!(
                    entity = write.record.entity(),
                    id = %write.record.id(),
                    expected_version = ?write.expected_version,
                    "Conditional write matched no row"
                );
                return Err(StoreError::VersionConflict {
                    entity: write.record.entity(),
                    id: write.record.id(),
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
