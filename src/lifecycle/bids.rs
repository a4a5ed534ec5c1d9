//! Bid lifecycle
//!
//! Every transition reads the entities it depends on, decides, and commits a
//! single version-checked batch. Acceptance writes the project, the winning
//! bid and every open sibling together.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::access::{self, ensure};
use super::error::{LifecycleError, LifecycleResult};
use super::projects::activate;
use super::retry::{with_retry, RetryPolicy};
use super::verification::VerificationWorkflow;
use crate::domain::milestones::{self, Milestone};
use crate::domain::{
    is_storable_amount, AcceptOutcome, Actor, Bid, BidStatus, Project, ProjectStatus,
    SubmitBidRequest, MAX_AMOUNT, REASON_ANOTHER_BID_ACCEPTED, REASON_REJECTED_BY_CLIENT,
};
use crate::store::{LifecycleStore, WriteBatch};

/// Most bids a single sweep pass will expire
const SWEEP_BATCH: usize = 500;

/// Expiries in flight at once during a sweep
const SWEEP_CONCURRENCY: usize = 8;

/// Validated bid contents shared by submit and revise
struct BidTerms {
    amount: Decimal,
    milestones: Vec<Milestone>,
    proposal: Option<String>,
    timeline_days: Option<i32>,
    expires_at: Option<DateTime<Utc>>,
}

impl BidTerms {
    fn parse(req: SubmitBidRequest, now: DateTime<Utc>) -> LifecycleResult<Self> {
        if req.amount <= Decimal::ZERO {
            return Err(LifecycleError::validation("amount", "amount must be positive"));
        }
        if !is_storable_amount(req.amount) {
            return Err(LifecycleError::validation(
                "amount",
                format!("amount must have at most two decimal places and not exceed {MAX_AMOUNT}"),
            ));
        }
        if matches!(req.timeline_days, Some(days) if days <= 0) {
            return Err(LifecycleError::validation(
                "timeline_days",
                "timeline must be at least one day",
            ));
        }
        if matches!(req.expires_at, Some(deadline) if deadline <= now) {
            return Err(LifecycleError::validation(
                "expires_at",
                "expiry must be in the future",
            ));
        }

        let milestones = milestones::normalize(&req.milestones, req.amount, req.milestone_mode)?;

        Ok(Self {
            amount: req.amount,
            milestones,
            proposal: req
                .proposal
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            timeline_days: req.timeline_days,
            expires_at: req.expires_at,
        })
    }

    fn check_budget(&self, project: &Project) -> LifecycleResult<()> {
        if project.budget.contains(self.amount) {
            Ok(())
        } else {
            Err(LifecycleError::AmountOutOfRange {
                amount: self.amount,
                min: project.budget.min,
                max: project.budget.max,
            })
        }
    }
}

/// Move every open bid in `bids` (other than `except`) to rejected
pub(crate) fn reject_open_bids(
    bids: Vec<Bid>,
    except: Option<Uuid>,
    reason: &str,
    now: DateTime<Utc>,
) -> Vec<Bid> {
    bids.into_iter()
        .filter(|b| b.status.is_open() && Some(b.id) != except)
        .map(|b| b.rejected(reason, now))
        .collect()
}

#[derive(Clone)]
pub struct BidLifecycle {
    store: Arc<dyn LifecycleStore>,
    verification: VerificationWorkflow,
    retry: RetryPolicy,
}

impl BidLifecycle {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        verification: VerificationWorkflow,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            verification,
            retry,
        }
    }

    async fn load_project(&self, project_id: Uuid) -> LifecycleResult<Project> {
        self.store
            .project(project_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("project", project_id))
    }

    /// A bid addressed through a project it does not belong to is not found
    async fn load_bid(&self, project_id: Uuid, bid_id: Uuid) -> LifecycleResult<Bid> {
        match self.store.bid(bid_id).await? {
            Some(bid) if bid.project_id == project_id => Ok(bid),
            _ => Err(LifecycleError::not_found("bid", bid_id)),
        }
    }

    /// An open bid past its deadline is expired on the spot and the
    /// requested transition refused
    async fn expire_if_lapsed(&self, bid: &Bid, now: DateTime<Utc>) -> LifecycleResult<()> {
        if !bid.status.is_open() || !bid.is_past_deadline(now) {
            return Ok(());
        }

        let mut expired = bid.clone();
        expired.status = BidStatus::Expired;
        expired.touch(now);
        let mut batch = WriteBatch::new();
        batch.update(expired);
        self.store.commit(batch).await?;

        tracing::info!(project_id = %bid.project_id, bid_id = %bid.id, "Bid expired on access");
        Err(LifecycleError::conflict("bid has passed its deadline and is expired"))
    }

    async fn ensure_eligible(&self, company_id: Uuid) -> LifecycleResult<()> {
        if self.verification.is_eligible_to_bid(company_id).await? {
            Ok(())
        } else {
            Err(LifecycleError::CompanyNotVerified(company_id))
        }
    }

    /// Submit a new bid on behalf of `company_id`
    #[instrument(skip(self, actor, req), fields(actor_id = %actor.user_id))]
    pub async fn submit(
        &self,
        actor: &Actor,
        project_id: Uuid,
        company_id: Uuid,
        req: SubmitBidRequest,
    ) -> LifecycleResult<Bid> {
        ensure(
            access::can_manage_company(actor, company_id),
            "You can only bid on behalf of your own company",
        )?;

        let terms = BidTerms::parse(req, Utc::now())?;
        self.ensure_eligible(company_id).await?;

        with_retry(&self.retry, "bid.submit", || {
            let terms = &terms;
            async move {
                let mut project = self.load_project(project_id).await?;
                ensure(
                    access::can_submit_bid(actor, &project),
                    "Not allowed to bid on this project",
                )?;
                if !project.status.is_open_for_bids() {
                    return Err(LifecycleError::ProjectNotBiddable {
                        project_id,
                        status: project.status,
                    });
                }
                if !project.is_invited(company_id) {
                    return Err(LifecycleError::NotInvited {
                        project_id,
                        company_id,
                    });
                }
                if self.store.open_bid(project_id, company_id).await?.is_some() {
                    return Err(LifecycleError::DuplicateBid {
                        project_id,
                        company_id,
                    });
                }
                terms.check_budget(&project)?;

                let now = Utc::now();
                let bid = Bid {
                    id: Uuid::new_v4(),
                    project_id,
                    company_id,
                    amount: terms.amount,
                    milestones: terms.milestones.clone(),
                    proposal: terms.proposal.clone(),
                    timeline_days: terms.timeline_days,
                    status: BidStatus::Pending,
                    rejection_reason: None,
                    expires_at: terms.expires_at,
                    version: 1,
                    submitted_at: now,
                    updated_at: now,
                };

                project.bid_ids.push(bid.id);
                if project.status == ProjectStatus::Posted {
                    project.status = ProjectStatus::Bidding;
                }
                project.touch(now);

                let mut batch = WriteBatch::new();
                batch.update(project).insert(bid.clone());
                self.store.commit(batch).await?;

                tracing::info!(
                    project_id = %project_id,
                    bid_id = %bid.id,
                    company_id = %company_id,
                    amount = %bid.amount,
                    "Bid submitted"
                );
                Ok(bid)
            }
        })
        .await
    }

    /// Replace the terms of a pending bid
    #[instrument(skip(self, actor, req), fields(actor_id = %actor.user_id))]
    pub async fn revise(
        &self,
        actor: &Actor,
        project_id: Uuid,
        bid_id: Uuid,
        req: SubmitBidRequest,
    ) -> LifecycleResult<Bid> {
        let terms = BidTerms::parse(req, Utc::now())?;

        with_retry(&self.retry, "bid.revise", || {
            let terms = &terms;
            async move {
                let mut bid = self.load_bid(project_id, bid_id).await?;
                ensure(access::owns_bid(actor, &bid), "Only the bidder can revise a bid")?;
                let now = Utc::now();
                self.expire_if_lapsed(&bid, now).await?;
                if bid.status != BidStatus::Pending {
                    return Err(LifecycleError::conflict(format!(
                        "only pending bids can be revised, bid is {}",
                        bid.status
                    )));
                }

                let project = self.load_project(project_id).await?;
                if !project.status.is_open_for_bids() {
                    return Err(LifecycleError::ProjectNotBiddable {
                        project_id,
                        status: project.status,
                    });
                }
                self.ensure_eligible(bid.company_id).await?;
                terms.check_budget(&project)?;

                bid.amount = terms.amount;
                bid.milestones = terms.milestones.clone();
                bid.proposal = terms.proposal.clone();
                bid.timeline_days = terms.timeline_days;
                bid.expires_at = terms.expires_at;
                bid.touch(now);

                let mut batch = WriteBatch::new();
                batch.update(bid.clone());
                self.store.commit(batch).await?;

                tracing::info!(project_id = %project_id, bid_id = %bid_id, "Bid revised");
                Ok(bid)
            }
        })
        .await
    }

    /// Shortlist a pending bid
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn start_review(
        &self,
        actor: &Actor,
        project_id: Uuid,
        bid_id: Uuid,
    ) -> LifecycleResult<Bid> {
        with_retry(&self.retry, "bid.start_review", || async move {
            let project = self.load_project(project_id).await?;
            ensure(
                access::can_manage_project(actor, &project),
                "Only the project owner can review bids",
            )?;
            let mut bid = self.load_bid(project_id, bid_id).await?;
            let now = Utc::now();
            self.expire_if_lapsed(&bid, now).await?;
            if !bid.status.can_transition_to(BidStatus::UnderReview) {
                return Err(LifecycleError::conflict(format!(
                    "bid is {} and cannot be reviewed",
                    bid.status
                )));
            }
            if !project.status.is_open_for_bids() {
                return Err(LifecycleError::ProjectNotBiddable {
                    project_id,
                    status: project.status,
                });
            }

            bid.status = BidStatus::UnderReview;
            bid.touch(now);

            let mut batch = WriteBatch::new();
            batch.update(bid.clone());
            self.store.commit(batch).await?;

            tracing::info!(project_id = %project_id, bid_id = %bid_id, "Bid under review");
            Ok(bid)
        })
        .await
    }

    /// Bidder pulls an open bid. A second withdrawal is a conflict.
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn withdraw(
        &self,
        actor: &Actor,
        project_id: Uuid,
        bid_id: Uuid,
    ) -> LifecycleResult<Bid> {
        with_retry(&self.retry, "bid.withdraw", || async move {
            let mut bid = self.load_bid(project_id, bid_id).await?;
            ensure(access::owns_bid(actor, &bid), "Only the bidder can withdraw a bid")?;
            let now = Utc::now();
            self.expire_if_lapsed(&bid, now).await?;
            if !bid.status.is_open() {
                return Err(LifecycleError::conflict(format!(
                    "bid is already {}",
                    bid.status
                )));
            }

            bid.status = BidStatus::Withdrawn;
            bid.touch(now);

            let mut batch = WriteBatch::new();
            batch.update(bid.clone());
            self.store.commit(batch).await?;

            tracing::info!(
                project_id = %project_id,
                bid_id = %bid_id,
                company_id = %bid.company_id,
                "Bid withdrawn"
            );
            Ok(bid)
        })
        .await
    }

    /// Accept one bid, reject every other open bid and activate the project
    /// in a single batch
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn accept(
        &self,
        actor: &Actor,
        project_id: Uuid,
        bid_id: Uuid,
    ) -> LifecycleResult<AcceptOutcome> {
        with_retry(&self.retry, "bid.accept", || async move {
            let mut project = self.load_project(project_id).await?;
            ensure(
                access::can_accept_bid(actor, &project),
                "Only the project owner can accept bids",
            )?;
            let mut bid = self.load_bid(project_id, bid_id).await?;
            let now = Utc::now();
            self.expire_if_lapsed(&bid, now).await?;
            if !bid.status.can_transition_to(BidStatus::Accepted) {
                return Err(LifecycleError::conflict(format!(
                    "bid is {} and cannot be accepted",
                    bid.status
                )));
            }

            activate(&mut project, bid.id, now)?;
            bid.status = BidStatus::Accepted;
            bid.touch(now);

            let siblings = self.store.bids_for_project(project_id).await?;
            let rejected = reject_open_bids(siblings, Some(bid.id), REASON_ANOTHER_BID_ACCEPTED, now);
            let rejected_bid_ids: Vec<Uuid> = rejected.iter().map(|b| b.id).collect();
            let project_status = project.status;

            let mut batch = WriteBatch::new();
            batch.update(project).update(bid);
            for sibling in rejected {
                batch.update(sibling);
            }
            self.store.commit(batch).await?;

            tracing::info!(
                project_id = %project_id,
                bid_id = %bid_id,
                rejected = rejected_bid_ids.len(),
                "Bid accepted"
            );
            Ok(AcceptOutcome {
                accepted_bid_id: bid_id,
                rejected_bid_ids,
                project_status,
            })
        })
        .await
    }

    /// Project owner declines an open bid
    #[instrument(skip(self, actor, reason), fields(actor_id = %actor.user_id))]
    pub async fn reject(
        &self,
        actor: &Actor,
        project_id: Uuid,
        bid_id: Uuid,
        reason: Option<String>,
    ) -> LifecycleResult<Bid> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| REASON_REJECTED_BY_CLIENT.to_string());

        with_retry(&self.retry, "bid.reject", || {
            let reason = reason.as_str();
            async move {
                let project = self.load_project(project_id).await?;
                ensure(
                    access::can_accept_bid(actor, &project),
                    "Only the project owner can reject bids",
                )?;
                let bid = self.load_bid(project_id, bid_id).await?;
                let now = Utc::now();
                self.expire_if_lapsed(&bid, now).await?;
                if !bid.status.is_open() {
                    return Err(LifecycleError::conflict(format!(
                        "bid is {} and cannot be rejected",
                        bid.status
                    )));
                }

                let bid = bid.rejected(reason, now);
                let mut batch = WriteBatch::new();
                batch.update(bid.clone());
                self.store.commit(batch).await?;

                tracing::info!(project_id = %project_id, bid_id = %bid_id, "Bid rejected");
                Ok(bid)
            }
        })
        .await
    }

    /// Expire an open bid whose deadline has passed.
    ///
    /// Already expired bids are returned unchanged. Any other terminal bid,
    /// or one still inside its deadline, is a conflict.
    #[instrument(skip(self))]
    pub async fn expire(&self, bid_id: Uuid, now: DateTime<Utc>) -> LifecycleResult<Bid> {
        with_retry(&self.retry, "bid.expire", || async move {
            let mut bid = self
                .store
                .bid(bid_id)
                .await?
                .ok_or_else(|| LifecycleError::not_found("bid", bid_id))?;

            match bid.status {
                BidStatus::Expired => return Ok(bid),
                status if status.is_terminal() => {
                    return Err(LifecycleError::conflict(format!(
                        "bid is {status} and cannot expire"
                    )));
                }
                _ => {}
            }
            if !bid.is_past_deadline(now) {
                return Err(LifecycleError::conflict("bid has not reached its deadline"));
            }

            bid.status = BidStatus::Expired;
            bid.touch(now);

            let mut batch = WriteBatch::new();
            batch.update(bid.clone());
            self.store.commit(batch).await?;

            tracing::info!(project_id = %bid.project_id, bid_id = %bid_id, "Bid expired");
            Ok(bid)
        })
        .await
    }

    /// Expire every open bid past its deadline; returns the ids expired
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> LifecycleResult<Vec<Uuid>> {
        let due = self.store.expired_open_bids(now, SWEEP_BATCH).await?;

        let outcomes: Vec<(Uuid, LifecycleResult<Bid>)> = stream::iter(due)
            .map(|bid| async move { (bid.id, self.expire(bid.id, now).await) })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        let mut expired = Vec::with_capacity(outcomes.len());
        for (bid_id, outcome) in outcomes {
            match outcome {
                Ok(_) => expired.push(bid_id),
                // Another transition got there first
                Err(LifecycleError::StateConflict(_)) => {}
                Err(err) => {
                    tracing::warn!(bid_id = %bid_id, error = %err, "Failed to expire bid");
                }
            }
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue bids");
        }
        Ok(expired)
    }

    pub async fn get(&self, actor: &Actor, project_id: Uuid, bid_id: Uuid) -> LifecycleResult<Bid> {
        let project = self.load_project(project_id).await?;
        let bid = self.load_bid(project_id, bid_id).await?;
        ensure(
            access::can_view_bid(actor, &project, &bid),
            "Not allowed to view this bid",
        )?;
        Ok(bid)
    }

    /// Owners and admins see every bid; a company sees only its own
    pub async fn list_for_project(
        &self,
        actor: &Actor,
        project_id: Uuid,
    ) -> LifecycleResult<Vec<Bid>> {
        let project = self.load_project(project_id).await?;
        let bids = self.store.bids_for_project(project_id).await?;

        if actor.is_admin() || access::can_manage_project(actor, &project) {
            return Ok(bids);
        }
        ensure(
            actor.company_id.is_some(),
            "Only the project owner can list its bids",
        )?;
        Ok(bids
            .into_iter()
            .filter(|b| access::owns_bid(actor, b))
            .collect())
    }
}
