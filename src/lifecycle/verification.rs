//! Company verification workflow
//!
//! Owns the [`CompanyVerification`] record for each company and answers the
//! bidding-eligibility question for [`super::bids::BidLifecycle`].

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::access::{self, ensure};
use super::error::{LifecycleError, LifecycleResult};
use super::retry::{with_retry, RetryPolicy};
use crate::domain::{
    Actor, AttachmentRef, CompanyVerification, DocumentSubmission, ReviewDecision,
    VerificationStatus,
};
use crate::store::{LifecycleStore, WriteBatch};

#[derive(Clone)]
pub struct VerificationWorkflow {
    store: Arc<dyn LifecycleStore>,
    retry: RetryPolicy,
}

impl VerificationWorkflow {
    pub fn new(store: Arc<dyn LifecycleStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    async fn load(&self, company_id: Uuid) -> LifecycleResult<CompanyVerification> {
        self.store
            .verification(company_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("company_verification", company_id))
    }

    async fn save(&self, record: CompanyVerification) -> LifecycleResult<()> {
        let mut batch = WriteBatch::new();
        batch.update(record);
        self.store.commit(batch).await?;
        Ok(())
    }

    /// Create the pending record for a newly registered company
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn register(
        &self,
        actor: &Actor,
        company_id: Uuid,
    ) -> LifecycleResult<CompanyVerification> {
        ensure(
            access::can_manage_company(actor, company_id) || actor.is_admin(),
            "Only the company itself can register for verification",
        )?;

        if self.store.verification(company_id).await?.is_some() {
            return Err(LifecycleError::conflict(format!(
                "company {company_id} is already registered for verification"
            )));
        }

        let record = CompanyVerification::new(company_id, Utc::now());
        let mut batch = WriteBatch::new();
        batch.insert(record.clone());
        self.store.commit(batch).await?;

        tracing::info!(company_id = %company_id, "Company verification registered");
        Ok(record)
    }

    /// Merge documents into the record and move to review once complete.
    ///
    /// Allowed while pending or rejected. The submission is validated as a
    /// whole before anything is merged.
    #[instrument(skip(self, actor, documents), fields(actor_id = %actor.user_id, count = documents.len()))]
    pub async fn submit_documents(
        &self,
        actor: &Actor,
        company_id: Uuid,
        documents: BTreeMap<String, AttachmentRef>,
    ) -> LifecycleResult<DocumentSubmission> {
        ensure(
            access::can_manage_company(actor, company_id),
            "Only the company can submit its verification documents",
        )?;

        if documents.is_empty() {
            return Err(LifecycleError::validation(
                "documents",
                "at least one document is required",
            ));
        }
        if let Some((key, _)) = documents.iter().find(|(_, r)| r.is_blank()) {
            return Err(LifecycleError::validation(
                "documents",
                format!("document '{key}' has an empty reference"),
            ));
        }

        with_retry(&self.retry, "verification.submit_documents", || {
            let documents = documents.clone();
            async move {
                let mut record = self.load(company_id).await?;

                if let Some(key) = documents.keys().find(|k| !record.is_required(k)) {
                    return Err(LifecycleError::validation(
                        "documents",
                        format!("'{key}' is not a recognised document type"),
                    ));
                }
                if !record.status.accepts_documents() {
                    return Err(LifecycleError::conflict(format!(
                        "documents cannot be submitted while verification is {}",
                        record.status
                    )));
                }

                record.documents.extend(documents);
                let missing_required = record.missing_required();
                record.status = if missing_required.is_empty() {
                    VerificationStatus::UnderReview
                } else {
                    VerificationStatus::Pending
                };
                record.rejection_reason = None;
                record.touch(Utc::now());

                let status = record.status;
                self.save(record).await?;

                tracing::info!(
                    company_id = %company_id,
                    status = %status,
                    missing = missing_required.len(),
                    "Verification documents submitted"
                );
                Ok(DocumentSubmission {
                    status,
                    missing_required,
                })
            }
        })
        .await
    }

    /// Admin decision on a pending or under-review company
    #[instrument(skip(self, admin, reason), fields(actor_id = %admin.user_id))]
    pub async fn review(
        &self,
        admin: &Actor,
        company_id: Uuid,
        decision: ReviewDecision,
        reason: Option<String>,
    ) -> LifecycleResult<VerificationStatus> {
        ensure(
            access::can_review_verification(admin),
            "Only administrators can review companies",
        )?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if decision == ReviewDecision::Reject && reason.is_none() {
            return Err(LifecycleError::validation(
                "reason",
                "a reason is required when rejecting a company",
            ));
        }

        with_retry(&self.retry, "verification.review", || {
            let reason = reason.clone();
            async move {
                let mut record = self.load(company_id).await?;
                if !record.status.is_reviewable() {
                    return Err(LifecycleError::conflict(format!(
                        "verification is already {}",
                        record.status
                    )));
                }

                let now = Utc::now();
                match decision {
                    ReviewDecision::Approve => {
                        record.status = VerificationStatus::Approved;
                        record.rejection_reason = None;
                    }
                    ReviewDecision::Reject => {
                        record.status = VerificationStatus::Rejected;
                        record.rejection_reason = reason;
                    }
                }
                record.reviewed_by = Some(admin.user_id);
                record.reviewed_at = Some(now);
                record.touch(now);

                let status = record.status;
                self.save(record).await?;

                tracing::info!(company_id = %company_id, status = %status, "Company reviewed");
                Ok(status)
            }
        })
        .await
    }

    /// Send an approved or rejected company back to review
    #[instrument(skip(self, admin), fields(actor_id = %admin.user_id))]
    pub async fn reopen(
        &self,
        admin: &Actor,
        company_id: Uuid,
    ) -> LifecycleResult<VerificationStatus> {
        ensure(
            access::can_review_verification(admin),
            "Only administrators can re-open a verification",
        )?;

        with_retry(&self.retry, "verification.reopen", || async move {
            let mut record = self.load(company_id).await?;
            if !record.status.is_terminal() {
                return Err(LifecycleError::conflict(format!(
                    "verification is {} and cannot be re-opened",
                    record.status
                )));
            }

            record.status = VerificationStatus::UnderReview;
            record.rejection_reason = None;
            record.reviewed_by = None;
            record.reviewed_at = None;
            record.touch(Utc::now());
            self.save(record).await?;

            tracing::info!(company_id = %company_id, "Verification re-opened");
            Ok(VerificationStatus::UnderReview)
        })
        .await
    }

    /// A company may bid only while approved; unknown companies may not
    pub async fn is_eligible_to_bid(&self, company_id: Uuid) -> LifecycleResult<bool> {
        Ok(self
            .store
            .verification(company_id)
            .await?
            .map_or(false, |v| v.status == VerificationStatus::Approved))
    }

    /// The company itself or an administrator may read the record
    pub async fn get(
        &self,
        actor: &Actor,
        company_id: Uuid,
    ) -> LifecycleResult<CompanyVerification> {
        ensure(
            access::can_manage_company(actor, company_id) || actor.is_admin(),
            "Not allowed to view this verification",
        )?;
        self.load(company_id).await
    }
}
