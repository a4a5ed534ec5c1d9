//! Company verification routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::{SubmitDocumentsRequest, VerificationResponse};
use crate::error::ApiError;

/// POST /companies/:company_id/verification
pub async fn register_company(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .services
        .verification
        .register(&auth.actor(), company_id)
        .await?;
    Ok(Created::at(
        format!("/companies/{company_id}/verification"),
        DataResponse::new(VerificationResponse::from(record)),
    ))
}

/// GET /companies/:company_id/verification
pub async fn get_verification(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .services
        .verification
        .get(&auth.actor(), company_id)
        .await?;
    Ok(DataResponse::new(VerificationResponse::from(record)))
}

/// PUT /companies/:company_id/verification/documents
///
/// Returns `{status, missing_required}`.
pub async fn submit_documents(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<Uuid>,
    payload: Result<Json<SubmitDocumentsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let submission = state
        .services
        .verification
        .submit_documents(&auth.actor(), company_id, req.documents)
        .await?;
    Ok(Json(submission))
}
