use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::AuthContext;
use crate::app::AppState;
use crate::domain::PlatformRole;
use crate::error::ErrorResponse;

/// Extractor that requires a valid bearer token
#[derive(Debug, Clone)]
pub struct RequireAuth(pub AuthContext);

impl std::ops::Deref for RequireAuth {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken(String),
    NotAdmin,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing authorization token",
            ),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid authorization format",
            ),
            AuthError::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Rejected bearer token");
                (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Invalid or expired token",
                )
            }
            AuthError::NotAdmin => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Administrator access required",
            ),
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            field: None,
            request_id: None,
        };

        body.into_response_with(status)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        // Parse Bearer token
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?;

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        // Verify token
        let claims = state.jwks_cache.verify_token(token).await.map_err(|e| {
            tracing::warn!(error = %e, "JWT verification failed");
            AuthError::InvalidToken(e.to_string())
        })?;

        // Build auth context
        let context = AuthContext::from_claims(&claims).map_err(|e| {
            tracing::warn!(error = %e, "Failed to build auth context");
            AuthError::InvalidToken(e.to_string())
        })?;

        Ok(RequireAuth(context))
    }
}

/// Extractor for admin-only routes
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthContext);

impl std::ops::Deref for RequireAdmin {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<AuthContext> for RequireAdmin {
    type Error = AuthError;

    fn try_from(context: AuthContext) -> Result<Self, Self::Error> {
        if context.platform_role == PlatformRole::Admin {
            Ok(RequireAdmin(context))
        } else {
            Err(AuthError::NotAdmin)
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(context) = RequireAuth::from_request_parts(parts, state).await?;
        RequireAdmin::try_from(context).map_err(|e| {
            tracing::warn!("Non-admin caller rejected from admin route");
            e
        })
    }
}
