//! Project routes
//!
//! Thin adapters from HTTP onto [`crate::lifecycle::ProjectLifecycle`].

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
use crate::domain::{CreateProjectRequest, ProjectResponse, UpdateProjectRequest};
use crate::error::ApiError;

/// POST /projects
pub async fn create_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let project = state.services.projects.create(&auth.actor(), req).await?;
    Ok(Created::at(
        format!("/projects/{}", project.id),
        DataResponse::new(ProjectResponse::from(project)),
    ))
}

/// GET /projects/:project_id
pub async fn get_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state.services.projects.get(&auth.actor(), project_id).await?;
    Ok(DataResponse::new(ProjectResponse::from(project)))
}

/// PATCH /projects/:project_id
pub async fn update_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(patch) = payload?;
    let project = state
        .services
        .projects
        .update(&auth.actor(), project_id, patch)
        .await?;
    Ok(DataResponse::new(ProjectResponse::from(project)))
}

/// POST /projects/:project_id/publish
pub async fn publish_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .services
        .projects
        .publish(&auth.actor(), project_id)
        .await?;
    Ok(DataResponse::new(ProjectResponse::from(project)))
}

/// POST /projects/:project_id/cancel
///
/// Returns `{status, cascaded_rejections}`.
pub async fn cancel_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .projects
        .cancel(&auth.actor(), project_id)
        .await?;
    Ok(Json(outcome))
}

/// POST /projects/:project_id/complete
pub async fn complete_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state
        .services
        .projects
        .complete(&auth.actor(), project_id)
        .await?;
    Ok(DataResponse::new(ProjectResponse::from(project)))
}
