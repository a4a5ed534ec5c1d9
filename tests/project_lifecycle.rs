//! Project creation, editing and the cancel/complete transitions.

mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use uuid::Uuid;

use bidmarket_backend::domain::{
    Actor, BidStatus, ProjectStatus, UpdateProjectRequest, REASON_PROJECT_CANCELLED,
};
use bidmarket_backend::lifecycle::LifecycleError;

use common::{project_request, Harness};

#[tokio::test]
async fn only_clients_create_projects() {
    let h = Harness::new();
    let company = Actor::company(Uuid::new_v4(), Uuid::new_v4());

    assert_matches!(
        h.services
            .projects
            .create(&company, project_request(1000, None))
            .await,
        Err(LifecycleError::Authorization(_))
    );
}

#[tokio::test]
async fn invalid_budget_and_blank_title_are_validation_errors() {
    let h = Harness::new();
    let client = Actor::client(Uuid::new_v4());

    let err = h
        .services
        .projects
        .create(&client, project_request(5000, Some(1000)))
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("budget"));

    let mut req = project_request(1000, None);
    req.title = "  ".into();
    let err = h.services.projects.create(&client, req).await.unwrap_err();
    assert_eq!(err.field(), Some("title"));
}

#[tokio::test]
async fn draft_is_published_by_owner_only() {
    let h = Harness::new();
    let client = Actor::client(Uuid::new_v4());
    let mut req = project_request(1000, None);
    req.draft = true;
    let project = h.services.projects.create(&client, req).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Draft);

    // Drafts are hidden from everyone but the owner
    assert_matches!(
        h.services
            .projects
            .get(&Actor::client(Uuid::new_v4()), project.id)
            .await,
        Err(LifecycleError::NotFound { .. })
    );

    assert_matches!(
        h.services
            .projects
            .publish(&Actor::client(Uuid::new_v4()), project.id)
            .await,
        Err(LifecycleError::Authorization(_))
    );

    let published = h.services.projects.publish(&client, project.id).await.unwrap();
    assert_eq!(published.status, ProjectStatus::Posted);

    assert_matches!(
        h.services.projects.publish(&client, project.id).await,
        Err(LifecycleError::StateConflict(_))
    );
}

#[tokio::test]
async fn owner_edits_only_while_posted() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, Some(5000)).await;

    let updated = h
        .services
        .projects
        .update(
            &client,
            project.id,
            UpdateProjectRequest {
                title: Some("Warehouse re-roof, phase one".into()),
                budget_max: Some(Decimal::from(8000)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Warehouse re-roof, phase one");
    assert_eq!(updated.budget.max, Some(Decimal::from(8000)));
    assert_eq!(updated.budget.min, Decimal::from(1000));

    let cleared = h
        .services
        .projects
        .update(
            &client,
            project.id,
            UpdateProjectRequest {
                unbounded: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.budget.max, None);

    // Once bidding starts the project is frozen
    let company = h.approved_company().await;
    h.submit(&company, project.id, 2000).await;
    assert_matches!(
        h.services
            .projects
            .update(&client, project.id, UpdateProjectRequest::default())
            .await,
        Err(LifecycleError::Authorization(_))
    );
}

#[tokio::test]
async fn cancel_rejects_all_open_bids_in_one_step() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;
    let a = h.approved_company().await;
    let b = h.approved_company().await;
    let c = h.approved_company().await;
    let bid_a = h.submit(&a, project.id, 2000).await;
    let bid_b = h.submit(&b, project.id, 2000).await;
    let bid_c = h.submit(&c, project.id, 2000).await;
    h.services
        .bids
        .withdraw(&c, project.id, bid_c.id)
        .await
        .unwrap();

    let outcome = h.services.projects.cancel(&client, project.id).await.unwrap();
    assert_eq!(outcome.status, ProjectStatus::Cancelled);
    assert_eq!(outcome.cascaded_rejections, 2);

    for id in [bid_a.id, bid_b.id] {
        let bid = h.bid(id).await;
        assert_eq!(bid.status, BidStatus::Rejected);
        assert_eq!(bid.rejection_reason.as_deref(), Some(REASON_PROJECT_CANCELLED));
    }
    assert_eq!(h.bid(bid_c.id).await.status, BidStatus::Withdrawn);

    // No new bids on a cancelled project
    let d = h.approved_company().await;
    assert_matches!(
        h.services
            .bids
            .submit(
                &d,
                project.id,
                d.company_id.unwrap(),
                common::bid_request(2000, &[2000]),
            )
            .await,
        Err(LifecycleError::ProjectNotBiddable { .. })
    );
}

#[tokio::test]
async fn active_project_cannot_be_cancelled_but_can_complete() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;
    let bid = h.submit(&company, project.id, 2000).await;
    h.services
        .bids
        .accept(&client, project.id, bid.id)
        .await
        .unwrap();

    assert_matches!(
        h.services.projects.cancel(&client, project.id).await,
        Err(LifecycleError::StateConflict(_))
    );

    let completed = h
        .services
        .projects
        .complete(&client, project.id)
        .await
        .unwrap();
    assert_eq!(completed.status, ProjectStatus::Completed);
    assert_eq!(completed.accepted_bid_id, Some(bid.id));
    assert!(completed.acceptance_consistent());

    assert_matches!(
        h.services.projects.complete(&client, project.id).await,
        Err(LifecycleError::StateConflict(_))
    );
}

#[tokio::test]
async fn posted_project_cannot_complete() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;

    assert_matches!(
        h.services.projects.complete(&client, project.id).await,
        Err(LifecycleError::StateConflict(_))
    );
}
