//! Storage layer
//!
//! Lifecycle managers never hold locks across calls. They read entities with
//! their versions, compute the next state, and hand the store a [`WriteBatch`]
//! of version-checked writes that lands completely or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Bid, CompanyVerification, Project};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} was modified concurrently")]
    VersionConflict { entity: &'static str, id: Uuid },

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: Uuid },

    #[error("company {company_id} already holds an open bid on project {project_id}")]
    OpenBidExists { project_id: Uuid, company_id: Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("stored {entity} is malformed: {detail}")]
    Corrupt { entity: &'static str, detail: String },

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Any entity the store persists
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Project(Project),
    Bid(Bid),
    Verification(CompanyVerification),
}

impl Record {
    pub fn entity(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Bid(_) => "bid",
            Self::Verification(_) => "company_verification",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Project(p) => p.id,
            Self::Bid(b) => b.id,
            Self::Verification(v) => v.company_id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            Self::Project(p) => p.version,
            Self::Bid(b) => b.version,
            Self::Verification(v) => v.version,
        }
    }
}

impl From<Project> for Record {
    fn from(p: Project) -> Self {
        Self::Project(p)
    }
}

impl From<Bid> for Record {
    fn from(b: Bid) -> Self {
        Self::Bid(b)
    }
}

impl From<CompanyVerification> for Record {
    fn from(v: CompanyVerification) -> Self {
        Self::Verification(v)
    }
}

/// A single conditional write
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub record: Record,
    /// `None` for inserts; otherwise the version the stored row must still have
    pub expected_version: Option<i64>,
}

/// Writes committed as one atomic unit
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity; it must carry version 1
    pub fn insert(&mut self, record: impl Into<Record>) -> &mut Self {
        let record = record.into();
        debug_assert_eq!(record.version(), 1, "new entities start at version 1");
        self.writes.push(Write {
            record,
            expected_version: None,
        });
        self
    }

    /// Replace an entity that has already been `touch`ed to its next version
    pub fn update(&mut self, record: impl Into<Record>) -> &mut Self {
        let record = record.into();
        let expected = record.version() - 1;
        self.writes.push(Write {
            record,
            expected_version: Some(expected),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Storage seam shared by every lifecycle manager
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;

    async fn bid(&self, id: Uuid) -> Result<Option<Bid>, StoreError>;

    /// All bids on a project, oldest first
    async fn bids_for_project(&self, project_id: Uuid) -> Result<Vec<Bid>, StoreError>;

    /// The company's non-terminal bid on a project, if any
    async fn open_bid(&self, project_id: Uuid, company_id: Uuid)
        -> Result<Option<Bid>, StoreError>;

    /// Open bids whose deadline is before `now`, earliest first
    async fn expired_open_bids(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bid>, StoreError>;

    async fn verification(&self, company_id: Uuid)
        -> Result<Option<CompanyVerification>, StoreError>;

    /// Apply every write or none of them.
    ///
    /// Fails with [`StoreError::VersionConflict`] when any update's expected
    /// version no longer matches, [`StoreError::AlreadyExists`] when an insert
    /// collides, and [`StoreError::OpenBidExists`] when the batch would leave a
    /// company with two open bids on one project.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
