//! Shared fixtures for lifecycle integration tests.
//!
//! Everything runs against the in-memory store. `ConflictingStore` wraps it to
//! inject version conflicts on chosen commits.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use bidmarket_backend::domain::{
    Actor, AttachmentRef, Bid, CompanyVerification, CreateProjectRequest, MilestoneInput,
    MilestoneMode, Project, ReviewDecision, SubmitBidRequest, REQUIRED_DOCUMENT_KEYS,
};
use bidmarket_backend::lifecycle::{LifecycleServices, RetryPolicy};
use bidmarket_backend::store::{LifecycleStore, MemoryStore, StoreError, WriteBatch};

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 8,
        initial_interval: Duration::from_millis(1),
        max_elapsed: Duration::from_secs(5),
    }
}

pub struct Harness {
    pub store: Arc<dyn LifecycleStore>,
    pub services: LifecycleServices,
    pub admin: Actor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn LifecycleStore>) -> Self {
        Self::with_store_and_retry(store, fast_retry())
    }

    pub fn with_store_and_retry(store: Arc<dyn LifecycleStore>, retry: RetryPolicy) -> Self {
        let services = LifecycleServices::new(store.clone(), retry);
        Self {
            store,
            services,
            admin: Actor::admin(Uuid::new_v4()),
        }
    }

    /// A client with a posted project over the given budget
    pub async fn posted_project(&self, min: i64, max: Option<i64>) -> (Actor, Project) {
        let client = Actor::client(Uuid::new_v4());
        let project = self
            .services
            .projects
            .create(&client, project_request(min, max))
            .await
            .expect("project created");
        (client, project)
    }

    /// A company that has registered, supplied every document and been approved
    pub async fn approved_company(&self) -> Actor {
        let company = self.registered_company().await;
        let company_id = company.company_id.expect("company actor");
        self.services
            .verification
            .submit_documents(&company, company_id, all_documents())
            .await
            .expect("documents submitted");
        self.services
            .verification
            .review(&self.admin, company_id, ReviewDecision::Approve, None)
            .await
            .expect("company approved");
        company
    }

    pub async fn registered_company(&self) -> Actor {
        let company_id = Uuid::new_v4();
        let company = Actor::company(Uuid::new_v4(), company_id);
        self.services
            .verification
            .register(&company, company_id)
            .await
            .expect("company registered");
        company
    }

    pub async fn submit(&self, company: &Actor, project_id: Uuid, amount: i64) -> Bid {
        self.services
            .bids
            .submit(
                company,
                project_id,
                company.company_id.expect("company actor"),
                bid_request(amount, &[amount]),
            )
            .await
            .expect("bid submitted")
    }

    pub async fn project(&self, id: Uuid) -> Project {
        self.store
            .project(id)
            .await
            .expect("store read")
            .expect("project exists")
    }

    pub async fn bid(&self, id: Uuid) -> Bid {
        self.store
            .bid(id)
            .await
            .expect("store read")
            .expect("bid exists")
    }
}

pub fn project_request(min: i64, max: Option<i64>) -> CreateProjectRequest {
    CreateProjectRequest {
        title: "Riverside warehouse re-roof".to_string(),
        description: Some("Replace 4,000 m2 of membrane roofing".to_string()),
        budget_min: Decimal::from(min),
        budget_max: max.map(Decimal::from),
        is_invite_only: false,
        invited_company_ids: Vec::new(),
        draft: false,
    }
}

/// Absolute-mode bid whose milestones are the given currency shares
pub fn bid_request(amount: i64, shares: &[i64]) -> SubmitBidRequest {
    SubmitBidRequest {
        amount: Decimal::from(amount),
        milestones: shares
            .iter()
            .enumerate()
            .map(|(i, share)| MilestoneInput {
                title: format!("Phase {}", i + 1),
                share: Decimal::from(*share),
                description: None,
            })
            .collect(),
        milestone_mode: MilestoneMode::Absolute,
        proposal: Some("Crew of six, twelve week programme".to_string()),
        timeline_days: Some(84),
        expires_at: None,
    }
}

pub fn documents(keys: &[&str]) -> BTreeMap<String, AttachmentRef> {
    keys.iter()
        .map(|key| (key.to_string(), AttachmentRef::new(format!("att_{key}_v1"))))
        .collect()
}

pub fn all_documents() -> BTreeMap<String, AttachmentRef> {
    documents(&REQUIRED_DOCUMENT_KEYS)
}

/// Store wrapper that fails the next `pending` commits with a version conflict
pub struct ConflictingStore {
    inner: MemoryStore,
    pending: AtomicU32,
    commits: AtomicU32,
}

impl ConflictingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            pending: AtomicU32::new(0),
            commits: AtomicU32::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.pending.store(n, Ordering::SeqCst);
    }

    /// Commit attempts seen, failed ones included
    pub fn commits(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LifecycleStore for ConflictingStore {
    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        self.inner.project(id).await
    }

    async fn bid(&self, id: Uuid) -> Result<Option<Bid>, StoreError> {
        self.inner.bid(id).await
    }

    async fn bids_for_project(&self, project_id: Uuid) -> Result<Vec<Bid>, StoreError> {
        self.inner.bids_for_project(project_id).await
    }

    async fn open_bid(
        &self,
        project_id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<Bid>, StoreError> {
        self.inner.open_bid(project_id, company_id).await
    }

    async fn expired_open_bids(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bid>, StoreError> {
        self.inner.expired_open_bids(now, limit).await
    }

    async fn verification(
        &self,
        company_id: Uuid,
    ) -> Result<Option<CompanyVerification>, StoreError> {
        self.inner.verification(company_id).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            let first = batch.writes().first().map(|w| (w.record.entity(), w.record.id()));
            let (entity, id) = first.unwrap_or(("batch", Uuid::nil()));
            return Err(StoreError::VersionConflict { entity, id });
        }
        self.inner.commit(batch).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}
