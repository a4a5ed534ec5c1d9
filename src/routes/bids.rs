//! Bid routes
//!
//! Submission, revision and the owner/bidder transitions on a project's bids.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{
    BidResponse, BidStatusResponse, RejectBidRequest, SubmitBidRequest, SubmitBidResponse,
};
use crate::error::ApiError;
use crate::lifecycle::LifecycleError;

/// POST /projects/:project_id/bids
///
/// Submit a bid for the caller's company. Returns `{bid_id, status}`.
pub async fn submit_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    payload: Result<Json<SubmitBidRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let actor = auth.actor();
    let company_id = actor
        .company_id
        .ok_or_else(|| LifecycleError::forbidden("Only company accounts can submit bids"))?;

    let bid = state
        .services
        .bids
        .submit(&actor, project_id, company_id, req)
        .await?;

    Ok(Created::at(
        format!("/projects/{project_id}/bids/{}", bid.id),
        SubmitBidResponse {
            bid_id: bid.id,
            status: bid.status,
        },
    ))
}

/// GET /projects/:project_id/bids
///
/// The owner sees every bid; a company sees only its own.
pub async fn list_bids(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let bids = state
        .services
        .bids
        .list_for_project(&auth.actor(), project_id)
        .await?;

    let (page, total) = params.page_of(bids);
    let data: Vec<BidResponse> = page.into_iter().map(BidResponse::from).collect();
    Ok(Paginated::new(data, &params, total))
}

/// GET /projects/:project_id/bids/:bid_id
pub async fn get_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((project_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state
        .services
        .bids
        .get(&auth.actor(), project_id, bid_id)
        .await?;
    Ok(DataResponse::new(BidResponse::from(bid)))
}

/// PUT /projects/:project_id/bids/:bid_id
pub async fn revise_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((project_id, bid_id)): Path<(Uuid, Uuid)>,
    payload: Result<Json<SubmitBidRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let bid = state
        .services
        .bids
        .revise(&auth.actor(), project_id, bid_id, req)
        .await?;
    Ok(DataResponse::new(BidResponse::from(bid)))
}

/// POST /projects/:project_id/bids/:bid_id/review
pub async fn review_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((project_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state
        .services
        .bids
        .start_review(&auth.actor(), project_id, bid_id)
        .await?;
    Ok(Json(BidStatusResponse {
        bid_id: bid.id,
        status: bid.status,
    }))
}

/// POST /projects/:project_id/bids/:bid_id/accept
///
/// Returns `{accepted_bid_id, rejected_bid_ids, project_status}`.
pub async fn accept_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((project_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .bids
        .accept(&auth.actor(), project_id, bid_id)
        .await?;
    Ok(Json(outcome))
}

/// POST /projects/:project_id/bids/:bid_id/reject
///
/// An empty body records the default reason; a malformed one is refused.
pub async fn reject_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((project_id, bid_id)): Path<(Uuid, Uuid)>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let reason = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<RejectBidRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid reject body: {e}")))?
            .reason
    };
    let bid = state
        .services
        .bids
        .reject(&auth.actor(), project_id, bid_id, reason)
        .await?;
    Ok(Json(BidStatusResponse {
        bid_id: bid.id,
        status: bid.status,
    }))
}

/// POST /projects/:project_id/bids/:bid_id/withdraw
pub async fn withdraw_bid(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path((project_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let bid = state
        .services
        .bids
        .withdraw(&auth.actor(), project_id, bid_id)
        .await?;
    Ok(Json(BidStatusResponse {
        bid_id: bid.id,
        status: bid.status,
    }))
}
