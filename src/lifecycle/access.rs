//! Authorization predicates
//!
//! Pure functions of the actor and the entity as read; no I/O and no
//! mutation. Lifecycle managers call [`ensure`] with one of these before
//! computing any write.

use uuid::Uuid;

use super::error::{LifecycleError, LifecycleResult};
use crate::domain::{Actor, Bid, PlatformRole, Project, ProjectStatus};

pub fn can_create_project(actor: &Actor) -> bool {
    actor.role == PlatformRole::Client
}

/// Company accounts may bid on projects they do not own
pub fn can_submit_bid(actor: &Actor, project: &Project) -> bool {
    actor.role == PlatformRole::Company
        && actor.company_id.is_some()
        && project.owner_id != actor.user_id
}

/// Bid decisions belong to the project owner
pub fn can_accept_bid(actor: &Actor, project: &Project) -> bool {
    project.owner_id == actor.user_id
}

pub fn can_review_verification(actor: &Actor) -> bool {
    actor.is_admin()
}

/// Owner edits are only allowed before bidding starts
pub fn can_edit_project(actor: &Actor, project: &Project) -> bool {
    project.owner_id == actor.user_id && project.status == ProjectStatus::Posted
}

pub fn can_manage_project(actor: &Actor, project: &Project) -> bool {
    project.owner_id == actor.user_id
}

pub fn owns_bid(actor: &Actor, bid: &Bid) -> bool {
    actor.acts_for(bid.company_id)
}

pub fn can_manage_company(actor: &Actor, company_id: Uuid) -> bool {
    actor.acts_for(company_id)
}

/// Owner sees every bid on a project, a company only its own, admins all
pub fn can_view_bid(actor: &Actor, project: &Project, bid: &Bid) -> bool {
    actor.is_admin() || project.owner_id == actor.user_id || owns_bid(actor, bid)
}

pub fn ensure(allowed: bool, message: &str) -> LifecycleResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(LifecycleError::forbidden(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Budget;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn project(owner_id: Uuid, status: ProjectStatus) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            owner_id,
            title: "Warehouse roof".into(),
            description: None,
            status,
            budget: Budget::new(Decimal::from(1000), Some(Decimal::from(5000))),
            bid_ids: vec![],
            accepted_bid_id: None,
            is_invite_only: false,
            invited_company_ids: vec![],
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_company_accounts_submit_bids() {
        let owner = Uuid::new_v4();
        let p = project(owner, ProjectStatus::Posted);

        assert!(can_submit_bid(&Actor::company(Uuid::new_v4(), Uuid::new_v4()), &p));
        assert!(!can_submit_bid(&Actor::client(Uuid::new_v4()), &p));
        assert!(!can_submit_bid(&Actor::admin(Uuid::new_v4()), &p));
        // A company user cannot bid on a project they own
        assert!(!can_submit_bid(&Actor::company(owner, Uuid::new_v4()), &p));
    }

    #[test]
    fn only_owner_accepts() {
        let owner = Uuid::new_v4();
        let p = project(owner, ProjectStatus::Bidding);
        assert!(can_accept_bid(&Actor::client(owner), &p));
        assert!(!can_accept_bid(&Actor::client(Uuid::new_v4()), &p));
        assert!(!can_accept_bid(&Actor::admin(Uuid::new_v4()), &p));
    }

    #[test]
    fn editing_is_limited_to_posted_projects() {
        let owner = Uuid::new_v4();
        let actor = Actor::client(owner);
        assert!(can_edit_project(&actor, &project(owner, ProjectStatus::Posted)));
        assert!(!can_edit_project(&actor, &project(owner, ProjectStatus::Bidding)));
        assert!(!can_edit_project(
            &Actor::client(Uuid::new_v4()),
            &project(owner, ProjectStatus::Posted)
        ));
    }

    #[test]
    fn review_requires_admin() {
        assert!(can_review_verification(&Actor::admin(Uuid::new_v4())));
        assert!(!can_review_verification(&Actor::client(Uuid::new_v4())));
    }

    #[test]
    fn ensure_maps_denial_to_authorization_error() {
        let err = ensure(false, "nope").unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(ensure(true, "nope").is_ok());
    }
}
