//! In-process store used for tests and local development.
//!
//! A single write lock covers each commit, so validation and application of a
//! batch are indivisible. No await point is reached while the lock is held.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

use super::{LifecycleStore, Record, StoreError, Write, WriteBatch};
use crate::domain::{Bid, CompanyVerification, Project};

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Default, Clone)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    bids: HashMap<Uuid, Bid>,
    verifications: HashMap<Uuid, CompanyVerification>,
    /// (project_id, company_id) -> open bid id
    open_bids: HashMap<(Uuid, Uuid), Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn stored_version(&self, record: &Record) -> Option<i64> {
        match record {
            Record::Project(p) => self.projects.get(&p.id).map(|p| p.version),
            Record::Bid(b) => self.bids.get(&b.id).map(|b| b.version),
            Record::Verification(v) => self.verifications.get(&v.company_id).map(|v| v.version),
        }
    }

    fn check(&self, write: &Write) -> Result<(), StoreError> {
        let record = &write.record;
        match (write.expected_version, self.stored_version(record)) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(StoreError::AlreadyExists {
                entity: record.entity(),
                id: record.id(),
            }),
            (Some(_), None) => Err(StoreError::NotFound {
                entity: record.entity(),
                id: record.id(),
            }),
            (Some(expected), Some(current)) if expected == current => Ok(()),
            (Some(_), Some(_)) => Err(StoreError::VersionConflict {
                entity: record.entity(),
                id: record.id(),
            }),
        }
    }

    /// Index of open bids as it would look after the batch
    fn staged_open_bids(
        &self,
        writes: &[Write],
    ) -> Result<HashMap<(Uuid, Uuid), Uuid>, StoreError> {
        let mut staged = self.open_bids.clone();
        for write in writes {
            let Record::Bid(bid) = &write.record else {
                continue;
            };
            let key = (bid.project_id, bid.company_id);
            if bid.status.is_open() {
                match staged.get(&key) {
                    Some(existing) if *existing != bid.id => {
                        return Err(StoreError::OpenBidExists {
                            project_id: bid.project_id,
                            company_id: bid.company_id,
                        });
                    }
                    _ => {
                        staged.insert(key, bid.id);
                    }
                }
            } else if staged.get(&key) == Some(&bid.id) {
                staged.remove(&key);
            }
        }
        Ok(staged)
    }

    fn apply(&mut self, record: Record) {
        match record {
            Record::Project(p) => {
                self.projects.insert(p.id, p);
            }
            Record::Bid(b) => {
                self.bids.insert(b.id, b);
            }
            Record::Verification(v) => {
                self.verifications.insert(v.company_id, v);
            }
        }
    }
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.inner.read().projects.get(&id).cloned())
    }

    async fn bid(&self, id: Uuid) -> Result<Option<Bid>, StoreError> {
        Ok(self.inner.read().bids.get(&id).cloned())
    }

    async fn bids_for_project(&self, project_id: Uuid) -> Result<Vec<Bid>, StoreError> {
        let tables = self.inner.read();
        let mut bids: Vec<Bid> = tables
            .bids
            .values()
            .filter(|b| b.project_id == project_id)
            .cloned()
            .collect();
        bids.sort_by_key(|b| (b.submitted_at, b.id));
        Ok(bids)
    }

    async fn open_bid(
        &self,
        project_id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<Bid>, StoreError> {
        let tables = self.inner.read();
        Ok(tables
            .open_bids
            .get(&(project_id, company_id))
            .and_then(|id| tables.bids.get(id))
            .cloned())
    }

    async fn expired_open_bids(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bid>, StoreError> {
        let tables = self.inner.read();
        let mut due: Vec<Bid> = tables
            .bids
            .values()
            .filter(|b| b.status.is_open() && b.is_past_deadline(now))
            .cloned()
            .collect();
        due.sort_by_key(|b| (b.expires_at, b.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn verification(
        &self,
        company_id: Uuid,
    ) -> Result<Option<CompanyVerification>, StoreError> {
        Ok(self.inner.read().verifications.get(&company_id).cloned())
    }

    #[instrument(skip_all, fields(writes = batch.len()))]
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tables = self.inner.write();

        for write in batch.writes() {
            tables.check(write)?;
        }
        let staged = tables.staged_open_bids(batch.writes())?;

        for write in batch.into_writes() {
            tables.apply(write.record);
        }
        tables.open_bids = staged;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
