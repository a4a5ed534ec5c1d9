//! Project lifecycle
//!
//! Cancellation rejects every open bid in the same batch as the status change.
//! Activation is driven from bid acceptance through [`activate`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use super::access::{self, ensure};
use super::bids::reject_open_bids;
use super::error::{LifecycleError, LifecycleResult};
use super::retry::{with_retry, RetryPolicy};
use crate::domain::{
    is_storable_amount, Actor, Budget, CancelOutcome, CreateProjectRequest, Project, ProjectStatus,
    UpdateProjectRequest, MAX_AMOUNT, REASON_PROJECT_CANCELLED,
};
use crate::store::{LifecycleStore, WriteBatch};

/// Record the accepted bid and move the project to active.
///
/// The caller commits the project together with the bid cascade.
pub(crate) fn activate(
    project: &mut Project,
    bid_id: Uuid,
    now: DateTime<Utc>,
) -> LifecycleResult<()> {
    if !project.status.is_open_for_bids() || project.accepted_bid_id.is_some() {
        return Err(LifecycleError::conflict(format!(
            "project is {} and no longer accepts bids",
            project.status
        )));
    }
    project.status = ProjectStatus::Active;
    project.accepted_bid_id = Some(bid_id);
    project.touch(now);
    Ok(())
}

fn transition(project: &mut Project, next: ProjectStatus) -> LifecycleResult<()> {
    if !project.status.can_transition_to(next) {
        return Err(LifecycleError::conflict(format!(
            "project cannot move from {} to {}",
            project.status, next
        )));
    }
    project.status = next;
    Ok(())
}

fn checked_budget(min: Decimal, max: Option<Decimal>) -> LifecycleResult<Budget> {
    if !is_storable_amount(min) || !max.map_or(true, is_storable_amount) {
        return Err(LifecycleError::validation(
            "budget",
            format!("budget bounds must have at most two decimal places and not exceed {MAX_AMOUNT}"),
        ));
    }
    let budget = Budget::new(min, max);
    if budget.is_valid() {
        Ok(budget)
    } else {
        Err(LifecycleError::validation(
            "budget",
            "budget minimum must be non-negative and not above the maximum",
        ))
    }
}

fn checked_title(title: &str) -> LifecycleResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(LifecycleError::validation("title", "title is required"));
    }
    Ok(title.to_string())
}

#[derive(Clone)]
pub struct ProjectLifecycle {
    store: Arc<dyn LifecycleStore>,
    retry: RetryPolicy,
}

impl ProjectLifecycle {
    pub fn new(store: Arc<dyn LifecycleStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    async fn load(&self, project_id: Uuid) -> LifecycleResult<Project> {
        self.store
            .project(project_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found("project", project_id))
    }

    #[instrument(skip(self, actor, req), fields(actor_id = %actor.user_id))]
    pub async fn create(&self, actor: &Actor, req: CreateProjectRequest) -> LifecycleResult<Project> {
        ensure(
            access::can_create_project(actor),
            "Only client accounts can post projects",
        )?;

        let title = checked_title(&req.title)?;
        let budget = checked_budget(req.budget_min, req.budget_max)?;
        if req.is_invite_only && req.invited_company_ids.is_empty() {
            return Err(LifecycleError::validation(
                "invited_company_ids",
                "invite-only projects need at least one invited company",
            ));
        }

        let now = Utc::now();
        let mut invited = req.invited_company_ids;
        invited.sort();
        invited.dedup();

        let project = Project {
            id: Uuid::new_v4(),
            owner_id: actor.user_id,
            title,
            description: req.description,
            status: if req.draft {
                ProjectStatus::Draft
            } else {
                ProjectStatus::Posted
            },
            budget,
            bid_ids: Vec::new(),
            accepted_bid_id: None,
            is_invite_only: req.is_invite_only,
            invited_company_ids: invited,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let mut batch = WriteBatch::new();
        batch.insert(project.clone());
        self.store.commit(batch).await?;

        tracing::info!(project_id = %project.id, status = %project.status, "Project created");
        Ok(project)
    }

    /// Draft to posted
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn publish(&self, actor: &Actor, project_id: Uuid) -> LifecycleResult<Project> {
        with_retry(&self.retry, "project.publish", || async move {
            let mut project = self.load(project_id).await?;
            ensure(
                access::can_manage_project(actor, &project),
                "Only the owner can publish a project",
            )?;
            transition(&mut project, ProjectStatus::Posted)?;
            project.touch(Utc::now());

            let mut batch = WriteBatch::new();
            batch.update(project.clone());
            self.store.commit(batch).await?;

            tracing::info!(project_id = %project_id, "Project published");
            Ok(project)
        })
        .await
    }

    /// Owner edits while the project is posted and has no bids yet
    #[instrument(skip(self, actor, patch), fields(actor_id = %actor.user_id))]
    pub async fn update(
        &self,
        actor: &Actor,
        project_id: Uuid,
        patch: UpdateProjectRequest,
    ) -> LifecycleResult<Project> {
        let title = patch.title.as_deref().map(checked_title).transpose()?;

        with_retry(&self.retry, "project.update", || {
            let patch = &patch;
            let title = title.clone();
            async move {
                let mut project = self.load(project_id).await?;
                ensure(
                    access::can_edit_project(actor, &project),
                    "Only the owner can edit a project, and only while it is posted",
                )?;

                if let Some(title) = title {
                    project.title = title;
                }
                if let Some(description) = &patch.description {
                    project.description = Some(description.clone());
                }

                let min = patch.budget_min.unwrap_or(project.budget.min);
                let max = if patch.unbounded {
                    None
                } else {
                    patch.budget_max.or(project.budget.max)
                };
                project.budget = checked_budget(min, max)?;

                if let Some(invite_only) = patch.is_invite_only {
                    project.is_invite_only = invite_only;
                }
                if let Some(invited) = &patch.invited_company_ids {
                    let mut invited = invited.clone();
                    invited.sort();
                    invited.dedup();
                    project.invited_company_ids = invited;
                }
                if project.is_invite_only && project.invited_company_ids.is_empty() {
                    return Err(LifecycleError::validation(
                        "invited_company_ids",
                        "invite-only projects need at least one invited company",
                    ));
                }

                project.touch(Utc::now());
                let mut batch = WriteBatch::new();
                batch.update(project.clone());
                self.store.commit(batch).await?;

                tracing::info!(project_id = %project_id, "Project updated");
                Ok(project)
            }
        })
        .await
    }

    /// Cancel a posted or bidding project, rejecting every open bid with it
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn cancel(&self, actor: &Actor, project_id: Uuid) -> LifecycleResult<CancelOutcome> {
        with_retry(&self.retry, "project.cancel", || async move {
            let mut project = self.load(project_id).await?;
            ensure(
                access::can_manage_project(actor, &project),
                "Only the owner can cancel a project",
            )?;
            transition(&mut project, ProjectStatus::Cancelled)?;

            let now = Utc::now();
            project.touch(now);

            let bids = self.store.bids_for_project(project_id).await?;
            let rejected = reject_open_bids(bids, None, REASON_PROJECT_CANCELLED, now);
            let cascaded_rejections = rejected.len();

            let mut batch = WriteBatch::new();
            batch.update(project);
            for bid in rejected {
                batch.update(bid);
            }
            self.store.commit(batch).await?;

            tracing::info!(
                project_id = %project_id,
                cascaded_rejections,
                "Project cancelled"
            );
            Ok(CancelOutcome {
                status: ProjectStatus::Cancelled,
                cascaded_rejections,
            })
        })
        .await
    }

    /// Active to completed; the accepted bid stays as it was
    #[instrument(skip(self, actor), fields(actor_id = %actor.user_id))]
    pub async fn complete(&self, actor: &Actor, project_id: Uuid) -> LifecycleResult<Project> {
        with_retry(&self.retry, "project.complete", || async move {
            let mut project = self.load(project_id).await?;
            ensure(
                access::can_manage_project(actor, &project),
                "Only the owner can complete a project",
            )?;
            transition(&mut project, ProjectStatus::Completed)?;
            project.touch(Utc::now());

            let mut batch = WriteBatch::new();
            batch.update(project.clone());
            self.store.commit(batch).await?;

            tracing::info!(project_id = %project_id, "Project completed");
            Ok(project)
        })
        .await
    }

    /// Drafts are visible to their owner only
    pub async fn get(&self, actor: &Actor, project_id: Uuid) -> LifecycleResult<Project> {
        let project = self.load(project_id).await?;
        if project.status == ProjectStatus::Draft
            && !access::can_manage_project(actor, &project)
            && !actor.is_admin()
        {
            return Err(LifecycleError::not_found("project", project_id));
        }
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn project(status: ProjectStatus) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Clinic refurbishment".into(),
            description: None,
            status,
            budget: Budget::new(Decimal::from(10), None),
            bid_ids: vec![],
            accepted_bid_id: None,
            is_invite_only: false,
            invited_company_ids: vec![],
            version: 4,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn activation_sets_accepted_bid_and_bumps_version() {
        let mut p = project(ProjectStatus::Posted);
        let bid_id = Uuid::new_v4();
        activate(&mut p, bid_id, Utc::now()).unwrap();

        assert_eq!(p.status, ProjectStatus::Active);
        assert_eq!(p.accepted_bid_id, Some(bid_id));
        assert_eq!(p.version, 5);
        assert!(p.acceptance_consistent());
    }

    #[test]
    fn activation_refuses_closed_projects() {
        for status in [
            ProjectStatus::Draft,
            ProjectStatus::Active,
            ProjectStatus::Completed,
            ProjectStatus::Cancelled,
        ] {
            let mut p = project(status);
            assert_matches!(
                activate(&mut p, Uuid::new_v4(), Utc::now()),
                Err(LifecycleError::StateConflict(_))
            );
            assert_eq!(p.version, 4);
        }
    }

    #[test]
    fn budget_check_rejects_inverted_range() {
        assert_eq!(
            checked_budget(Decimal::from(10), Some(Decimal::from(5)))
                .unwrap_err()
                .field(),
            Some("budget")
        );
        assert!(checked_budget(Decimal::ZERO, None).is_ok());
    }

    #[test]
    fn budget_check_rejects_amounts_the_columns_cannot_hold() {
        let too_big = Decimal::new(1_000_000_000_000, 0);
        assert_matches!(
            checked_budget(Decimal::ZERO, Some(too_big)),
            Err(LifecycleError::Validation { field: "budget", .. })
        );
        assert_matches!(
            checked_budget(Decimal::new(10_001, 3), None),
            Err(LifecycleError::Validation { field: "budget", .. })
        );
    }
}
