//! Unified API error handling
//!
//! Provides consistent error responses across all endpoints.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::lifecycle::{ErrorKind, LifecycleError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Lifecycle(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::StateConflict | ErrorKind::Concurrency => StatusCode::CONFLICT,
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Lifecycle(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::NotFound(msg) | Self::BadRequest(msg) => msg.clone(),
            // Don't leak internal error details
            Self::Lifecycle(e) if e.kind() == ErrorKind::Internal => {
                "An internal error occurred".to_string()
            }
            Self::Lifecycle(e) => e.to_string(),
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    fn field(&self) -> Option<String> {
        match self {
            Self::Lifecycle(e) => e.field().map(str::to_string),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.public_message(),
            field: self.field(),
            request_id: None,
        }
    }
}

impl ErrorResponse {
    /// JSON response that also carries the body as an extension, so the
    /// request ID middleware can stamp it
    pub fn into_response_with(self, status: StatusCode) -> Response {
        let mut response = (status, Json(self.clone())).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Log internal errors
        match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, "Internal server error");
            }
            Self::Lifecycle(e) if e.kind() == ErrorKind::Internal => {
                tracing::error!(error = ?e, "Storage failure");
            }
            _ => {
                tracing::warn!(error = %self, code = self.error_code(), "API error");
            }
        }

        self.body().into_response_with(self.status_code())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
