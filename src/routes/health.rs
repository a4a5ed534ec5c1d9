use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: StorageHealth,
}

#[derive(Debug, Serialize)]
pub struct StorageHealth {
    pub backend: &'static str,
    pub ok: bool,
    pub latency_ms: u128,
}

/// GET /health - public
///
/// 503 when the store cannot be reached; it is the only hard dependency.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let started = Instant::now();
    let ok = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            false
        }
    };

    let (status_code, status) = if ok {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            storage: StorageHealth {
                backend: state.settings.storage_backend.as_str(),
                ok,
                latency_ms: started.elapsed().as_millis(),
            },
        }),
    )
}
