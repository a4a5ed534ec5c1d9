//! Admin routes
//!
//! Company review and maintenance actions. Every handler requires
//! [`RequireAdmin`].

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::RequireAdmin;
use crate::domain::{ReviewVerificationRequest, VerificationStatusResponse};
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired_bid_ids: Vec<Uuid>,
}

/// POST /admin/verifications/:company_id/review
pub async fn review_company(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
    payload: Result<Json<ReviewVerificationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let status = state
        .services
        .verification
        .review(&admin.actor(), company_id, req.decision, req.reason)
        .await?;
    Ok(Json(VerificationStatusResponse { company_id, status }))
}

/// POST /admin/verifications/:company_id/reopen
pub async fn reopen_company(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .services
        .verification
        .reopen(&admin.actor(), company_id)
        .await?;
    Ok(Json(VerificationStatusResponse { company_id, status }))
}

/// POST /admin/bids/sweep-expired
///
/// Runs the expiry sweep immediately instead of waiting for the next tick.
pub async fn sweep_expired_bids(
    admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(actor_id = %admin.user_id, "Manual expiry sweep requested");
    let expired_bid_ids = state.services.bids.sweep_expired(Utc::now()).await?;
    Ok(Json(SweepResponse { expired_bid_ids }))
}
