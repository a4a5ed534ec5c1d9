//! Bid submission and single-bid transitions driven through `BidLifecycle`.

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use bidmarket_backend::domain::{
    Actor, BidStatus, MilestoneInput, MilestoneMode, ProjectStatus, SubmitBidRequest,
    REASON_ANOTHER_BID_ACCEPTED, REASON_REJECTED_BY_CLIENT,
};
use bidmarket_backend::domain::milestones::MilestoneError;
use bidmarket_backend::lifecycle::LifecycleError;

use common::{bid_request, project_request, Harness};

#[tokio::test]
async fn first_bid_moves_posted_project_to_bidding() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, Some(5000)).await;
    let company = h.approved_company().await;

    let bid = h.submit(&company, project.id, 2500).await;

    assert_eq!(bid.status, BidStatus::Pending);
    assert_eq!(bid.version, 1);
    let stored = h.project(project.id).await;
    assert_eq!(stored.status, ProjectStatus::Bidding);
    assert_eq!(stored.bid_ids, vec![bid.id]);
    assert_eq!(stored.version, project.version + 1);
}

#[tokio::test]
async fn amounts_outside_a_bounded_budget_are_rejected() {
    let h = Harness::new();
    let (_, project) = h.posted_project(100000, Some(250000)).await;
    let company = h.approved_company().await;
    let company_id = company.company_id.unwrap();

    for amount in [99999, 250001] {
        let err = h
            .services
            .bids
            .submit(&company, project.id, company_id, bid_request(amount, &[amount]))
            .await
            .unwrap_err();
        assert_matches!(err, LifecycleError::AmountOutOfRange { .. });
        assert_eq!(err.code(), "AMOUNT_OUT_OF_RANGE");
    }

    // Nothing was written
    let stored = h.project(project.id).await;
    assert_eq!(stored.version, project.version);
    assert!(stored.bid_ids.is_empty());
}

#[tokio::test]
async fn unbounded_budget_accepts_amounts_below_the_minimum() {
    let h = Harness::new();
    let (_, project) = h.posted_project(50000, None).await;
    let company = h.approved_company().await;

    let bid = h.submit(&company, project.id, 10).await;
    assert_eq!(bid.amount, Decimal::from(10));
}

#[tokio::test]
async fn milestone_sum_must_match_amount() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, Some(200000)).await;
    let company = h.approved_company().await;

    let err = h
        .services
        .bids
        .submit(
            &company,
            project.id,
            company.company_id.unwrap(),
            bid_request(150000, &[60000, 89000]),
        )
        .await
        .unwrap_err();

    assert_matches!(
        err,
        LifecycleError::MilestoneMismatch(MilestoneError::SumMismatch { .. })
    );
    assert_eq!(err.field(), Some("milestones"));
}

#[tokio::test]
async fn percentage_milestones_are_stored_as_given() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, Some(200000)).await;
    let company = h.approved_company().await;

    let req = SubmitBidRequest {
        milestones: vec![
            MilestoneInput {
                title: "Mobilise".into(),
                share: Decimal::from(25),
                description: None,
            },
            MilestoneInput {
                title: "Handover".into(),
                share: Decimal::from(75),
                description: Some("After snagging".into()),
            },
        ],
        milestone_mode: MilestoneMode::Percentage,
        ..bid_request(80000, &[80000])
    };

    let bid = h
        .services
        .bids
        .submit(&company, project.id, company.company_id.unwrap(), req)
        .await
        .unwrap();

    assert_eq!(bid.milestones[0].percentage, Decimal::from(25));
    assert_eq!(bid.milestones[1].amount_of(bid.amount), Decimal::from(60000));
}

#[tokio::test]
async fn unverified_company_cannot_bid() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, None).await;
    let company = h.registered_company().await;

    let err = h
        .services
        .bids
        .submit(
            &company,
            project.id,
            company.company_id.unwrap(),
            bid_request(2000, &[2000]),
        )
        .await
        .unwrap_err();

    assert_matches!(err, LifecycleError::CompanyNotVerified(_));
    assert_eq!(err.code(), "COMPANY_NOT_VERIFIED");
}

#[tokio::test]
async fn company_cannot_bid_for_another_company() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;
    let other = h.approved_company().await;

    assert_matches!(
        h.services
            .bids
            .submit(
                &company,
                project.id,
                other.company_id.unwrap(),
                bid_request(2000, &[2000]),
            )
            .await,
        Err(LifecycleError::Authorization(_))
    );
}

#[tokio::test]
async fn invite_only_projects_refuse_uninvited_companies() {
    let h = Harness::new();
    let invited = h.approved_company().await;
    let outsider = h.approved_company().await;
    let client = Actor::client(Uuid::new_v4());

    let mut req = project_request(1000, None);
    req.is_invite_only = true;
    req.invited_company_ids = vec![invited.company_id.unwrap()];
    let project = h.services.projects.create(&client, req).await.unwrap();

    let err = h
        .services
        .bids
        .submit(
            &outsider,
            project.id,
            outsider.company_id.unwrap(),
            bid_request(2000, &[2000]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, LifecycleError::NotInvited { .. });

    h.submit(&invited, project.id, 2000).await;
}

#[tokio::test]
async fn draft_project_is_not_biddable() {
    let h = Harness::new();
    let client = Actor::client(Uuid::new_v4());
    let mut req = project_request(1000, None);
    req.draft = true;
    let project = h.services.projects.create(&client, req).await.unwrap();
    let company = h.approved_company().await;

    let err = h
        .services
        .bids
        .submit(
            &company,
            project.id,
            company.company_id.unwrap(),
            bid_request(2000, &[2000]),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        LifecycleError::ProjectNotBiddable {
            status: ProjectStatus::Draft,
            ..
        }
    );
}

#[tokio::test]
async fn second_open_bid_from_same_company_is_a_duplicate() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;
    let first = h.submit(&company, project.id, 2000).await;

    let err = h
        .services
        .bids
        .submit(
            &company,
            project.id,
            company.company_id.unwrap(),
            bid_request(2100, &[2100]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, LifecycleError::DuplicateBid { .. });

    // After withdrawing, the company may bid again
    h.services
        .bids
        .withdraw(&company, project.id, first.id)
        .await
        .unwrap();
    h.submit(&company, project.id, 2100).await;
}

#[tokio::test]
async fn withdrawing_twice_fails_without_changing_state() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;
    let bid = h.submit(&company, project.id, 2000).await;

    let withdrawn = h
        .services
        .bids
        .withdraw(&company, project.id, bid.id)
        .await
        .unwrap();
    assert_eq!(withdrawn.status, BidStatus::Withdrawn);

    let err = h
        .services
        .bids
        .withdraw(&company, project.id, bid.id)
        .await
        .unwrap_err();
    assert_matches!(err, LifecycleError::StateConflict(_));

    let stored = h.bid(bid.id).await;
    assert_eq!(stored.status, BidStatus::Withdrawn);
    assert_eq!(stored.version, withdrawn.version);
}

#[tokio::test]
async fn accept_rejects_every_open_sibling_and_activates_project() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;
    let a = h.approved_company().await;
    let b = h.approved_company().await;
    let c = h.approved_company().await;
    let d = h.approved_company().await;

    let bid_a = h.submit(&a, project.id, 2000).await;
    let bid_b = h.submit(&b, project.id, 2100).await;
    let bid_c = h.submit(&c, project.id, 2200).await;
    let bid_d = h.submit(&d, project.id, 2300).await;
    h.services
        .bids
        .withdraw(&d, project.id, bid_d.id)
        .await
        .unwrap();
    h.services
        .bids
        .start_review(&client, project.id, bid_b.id)
        .await
        .unwrap();

    let outcome = h
        .services
        .bids
        .accept(&client, project.id, bid_a.id)
        .await
        .unwrap();

    assert_eq!(outcome.accepted_bid_id, bid_a.id);
    assert_eq!(outcome.project_status, ProjectStatus::Active);
    let mut rejected = outcome.rejected_bid_ids.clone();
    rejected.sort();
    let mut expected = vec![bid_b.id, bid_c.id];
    expected.sort();
    assert_eq!(rejected, expected);

    let project = h.project(project.id).await;
    assert_eq!(project.status, ProjectStatus::Active);
    assert_eq!(project.accepted_bid_id, Some(bid_a.id));
    assert!(project.acceptance_consistent());

    assert_eq!(h.bid(bid_a.id).await.status, BidStatus::Accepted);
    for id in [bid_b.id, bid_c.id] {
        let sibling = h.bid(id).await;
        assert_eq!(sibling.status, BidStatus::Rejected);
        assert_eq!(
            sibling.rejection_reason.as_deref(),
            Some(REASON_ANOTHER_BID_ACCEPTED)
        );
    }
    // Withdrawn bids are left alone
    assert_eq!(h.bid(bid_d.id).await.status, BidStatus::Withdrawn);
}

#[tokio::test]
async fn only_the_owner_can_accept() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;
    let bid = h.submit(&company, project.id, 2000).await;

    for actor in [
        Actor::client(Uuid::new_v4()),
        company.clone(),
        h.admin.clone(),
    ] {
        assert_matches!(
            h.services.bids.accept(&actor, project.id, bid.id).await,
            Err(LifecycleError::Authorization(_))
        );
    }
    assert_eq!(h.bid(bid.id).await.status, BidStatus::Pending);
}

#[tokio::test]
async fn reject_without_reason_records_default() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;
    let bid = h.submit(&company, project.id, 2000).await;

    let rejected = h
        .services
        .bids
        .reject(&client, project.id, bid.id, Some("   ".into()))
        .await
        .unwrap();

    assert_eq!(rejected.status, BidStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some(REASON_REJECTED_BY_CLIENT)
    );
}

#[tokio::test]
async fn revise_replaces_terms_of_pending_bid_only() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, Some(10000)).await;
    let company = h.approved_company().await;
    let bid = h.submit(&company, project.id, 2000).await;

    let revised = h
        .services
        .bids
        .revise(&company, project.id, bid.id, bid_request(3000, &[1000, 2000]))
        .await
        .unwrap();
    assert_eq!(revised.amount, Decimal::from(3000));
    assert_eq!(revised.milestones.len(), 2);
    assert_eq!(revised.version, bid.version + 1);

    let err = h
        .services
        .bids
        .revise(&company, project.id, bid.id, bid_request(20000, &[20000]))
        .await
        .unwrap_err();
    assert_matches!(err, LifecycleError::AmountOutOfRange { .. });

    h.services
        .bids
        .start_review(&client, project.id, bid.id)
        .await
        .unwrap();
    assert_matches!(
        h.services
            .bids
            .revise(&company, project.id, bid.id, bid_request(3500, &[3500]))
            .await,
        Err(LifecycleError::StateConflict(_))
    );
}

#[tokio::test]
async fn bid_addressed_through_the_wrong_project_is_not_found() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;
    let (_, other) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;
    let bid = h.submit(&company, project.id, 2000).await;

    assert_matches!(
        h.services.bids.accept(&client, other.id, bid.id).await,
        Err(LifecycleError::NotFound { entity: "bid", .. })
    );
}

#[tokio::test]
async fn expiry_is_idempotent_and_respects_deadline() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;
    let deadline = Utc::now() + Duration::days(3);

    let req = SubmitBidRequest {
        expires_at: Some(deadline),
        ..bid_request(2000, &[2000])
    };
    let bid = h
        .services
        .bids
        .submit(&company, project.id, company.company_id.unwrap(), req)
        .await
        .unwrap();

    assert_matches!(
        h.services.bids.expire(bid.id, Utc::now()).await,
        Err(LifecycleError::StateConflict(_))
    );

    let later = deadline + Duration::hours(1);
    let expired = h.services.bids.expire(bid.id, later).await.unwrap();
    assert_eq!(expired.status, BidStatus::Expired);

    let again = h.services.bids.expire(bid.id, later).await.unwrap();
    assert_eq!(again.version, expired.version);

    // Terminal bids other than expired are left untouched
    let other = h.approved_company().await;
    let req = SubmitBidRequest {
        expires_at: Some(deadline),
        ..bid_request(2100, &[2100])
    };
    let rejected = h
        .services
        .bids
        .submit(&other, project.id, other.company_id.unwrap(), req)
        .await
        .unwrap();
    h.services
        .bids
        .reject(&client, project.id, rejected.id, None)
        .await
        .unwrap();
    assert_matches!(
        h.services.bids.expire(rejected.id, later).await,
        Err(LifecycleError::StateConflict(_))
    );
    assert_eq!(h.bid(rejected.id).await.status, BidStatus::Rejected);
}

#[tokio::test]
async fn sweep_expires_only_overdue_open_bids() {
    let h = Harness::new();
    let (_, project) = h.posted_project(1000, None).await;
    let now = Utc::now();

    let soon = h.approved_company().await;
    let late = h.approved_company().await;
    let open_ended = h.approved_company().await;

    let overdue = h
        .services
        .bids
        .submit(
            &soon,
            project.id,
            soon.company_id.unwrap(),
            SubmitBidRequest {
                expires_at: Some(now + Duration::days(1)),
                ..bid_request(2000, &[2000])
            },
        )
        .await
        .unwrap();
    let fresh = h
        .services
        .bids
        .submit(
            &late,
            project.id,
            late.company_id.unwrap(),
            SubmitBidRequest {
                expires_at: Some(now + Duration::days(30)),
                ..bid_request(2000, &[2000])
            },
        )
        .await
        .unwrap();
    let unbounded = h.submit(&open_ended, project.id, 2000).await;

    let swept = h
        .services
        .bids
        .sweep_expired(now + Duration::days(2))
        .await
        .unwrap();

    assert_eq!(swept, vec![overdue.id]);
    assert_eq!(h.bid(overdue.id).await.status, BidStatus::Expired);
    assert_eq!(h.bid(fresh.id).await.status, BidStatus::Pending);
    assert_eq!(h.bid(unbounded.id).await.status, BidStatus::Pending);
}

#[tokio::test]
async fn listing_shows_owner_everything_and_company_its_own() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;
    let a = h.approved_company().await;
    let b = h.approved_company().await;
    let bid_a = h.submit(&a, project.id, 2000).await;
    h.submit(&b, project.id, 2100).await;

    let all = h
        .services
        .bids
        .list_for_project(&client, project.id)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let own = h
        .services
        .bids
        .list_for_project(&a, project.id)
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id, bid_a.id);

    assert_matches!(
        h.services
            .bids
            .list_for_project(&Actor::client(Uuid::new_v4()), project.id)
            .await,
        Err(LifecycleError::Authorization(_))
    );
    assert_matches!(
        h.services.bids.get(&b, project.id, bid_a.id).await,
        Err(LifecycleError::Authorization(_))
    );
}

#[tokio::test]
async fn lapsed_bid_expires_instead_of_being_accepted() {
    let h = Harness::new();
    let (client, project) = h.posted_project(1000, None).await;
    let company = h.approved_company().await;

    let req = SubmitBidRequest {
        expires_at: Some(Utc::now() + Duration::milliseconds(100)),
        ..bid_request(2000, &[2000])
    };
    let bid = h
        .services
        .bids
        .submit(&company, project.id, company.company_id.unwrap(), req)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    assert_matches!(
        h.services.bids.accept(&client, project.id, bid.id).await,
        Err(LifecycleError::StateConflict(_))
    );
    let stored = h.bid(bid.id).await;
    assert_eq!(stored.status, BidStatus::Expired);
    assert_eq!(stored.version, bid.version + 1);

    let project = h.project(project.id).await;
    assert_eq!(project.status, ProjectStatus::Bidding);
    assert_eq!(project.accepted_bid_id, None);

    // Later transitions see a terminal bid
    assert_matches!(
        h.services.bids.withdraw(&company, project.id, bid.id).await,
        Err(LifecycleError::StateConflict(_))
    );
    assert_eq!(h.bid(bid.id).await.version, stored.version);
}
