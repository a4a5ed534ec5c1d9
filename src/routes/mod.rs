pub mod admin;
pub mod bids;
pub mod health;
pub mod me;
pub mod projects;
pub mod verification;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Public routes
        .route("/health", get(health::health_check))
        // Protected routes
        .route("/me", get(me::get_me))
        // Projects
        .route("/projects", post(projects::create_project))
        .route(
            "/projects/:project_id",
            get(projects::get_project).patch(projects::update_project),
        )
        .route("/projects/:project_id/publish", post(projects::publish_project))
        .route("/projects/:project_id/cancel", post(projects::cancel_project))
        .route("/projects/:project_id/complete", post(projects::complete_project))
        // Bids (nested under projects)
        .route(
            "/projects/:project_id/bids",
            post(bids::submit_bid).get(bids::list_bids),
        )
        .route(
            "/projects/:project_id/bids/:bid_id",
            get(bids::get_bid).put(bids::revise_bid),
        )
        .route(
            "/projects/:project_id/bids/:bid_id/review",
            post(bids::review_bid),
        )
        .route(
            "/projects/:project_id/bids/:bid_id/accept",
            post(bids::accept_bid),
        )
        .route(
            "/projects/:project_id/bids/:bid_id/reject",
            post(bids::reject_bid),
        )
        .route(
            "/projects/:project_id/bids/:bid_id/withdraw",
            post(bids::withdraw_bid),
        )
        // Company verification
        .route(
            "/companies/:company_id/verification",
            post(verification::register_company).get(verification::get_verification),
        )
        .route(
            "/companies/:company_id/verification/documents",
            put(verification::submit_documents),
        )
        // Admin
        .route(
            "/admin/verifications/:company_id/review",
            post(admin::review_company),
        )
        .route(
            "/admin/verifications/:company_id/reopen",
            post(admin::reopen_company),
        )
        .route("/admin/bids/sweep-expired", post(admin::sweep_expired_bids))
}
