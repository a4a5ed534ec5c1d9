use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION},
        HeaderName, HeaderValue, Method,
    },
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::auth::JwksCache;
use crate::config::Settings;
use crate::lifecycle::LifecycleServices;
use crate::middleware::{make_request_span, request_id_layer, stamp_error_request_id, X_REQUEST_ID};
use crate::routes;
use crate::store::LifecycleStore;

/// Largest JSON body accepted by any route
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LifecycleStore>,
    pub services: LifecycleServices,
    pub settings: Settings,
    pub jwks_cache: JwksCache,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        settings: Settings,
        jwks_cache: JwksCache,
    ) -> Arc<Self> {
        let services = LifecycleServices::new(store.clone(), settings.retry_policy());
        Arc::new(Self {
            store,
            services,
            settings,
            jwks_cache,
        })
    }
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.settings);

    // DEBUG spans keep INFO output to the lifecycle events themselves
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(make_request_span)
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    let (set_request_id, propagate_request_id) = request_id_layer();

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(stamp_error_request_id))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

/// Browser clients read `Location` after a create and the request ID on errors
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let request_id = HeaderName::from_static(X_REQUEST_ID);
    let preflight_ttl = Duration::from_secs(if settings.env.is_dev() { 86400 } else { 3600 });

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, request_id.clone()])
        .expose_headers([LOCATION, request_id])
        .allow_credentials(true)
        .max_age(preflight_ttl)
}
