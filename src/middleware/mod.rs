//! Request ID and tracing span middleware

use axum::{
    body::Body,
    http::{header::CONTENT_LENGTH, HeaderName, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::Span;

use crate::error::ErrorResponse;

/// Header name for request ID
pub const X_REQUEST_ID: &str = "x-request-id";

/// Sets a UUID request ID when the caller sent none and echoes it on the response
pub fn request_id_layer() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    let header_name = HeaderName::from_static(X_REQUEST_ID);

    (
        SetRequestIdLayer::new(header_name.clone(), MakeRequestUuid),
        PropagateRequestIdLayer::new(header_name),
    )
}

/// Span for one HTTP request, tagged with its request ID
pub fn make_request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::debug_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

/// Copy the request ID into JSON error bodies
pub async fn stamp_error_request_id(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;
    let Some(mut body) = response.extensions_mut().remove::<ErrorResponse>() else {
        return response;
    };
    let Some(request_id) = request_id else {
        return response;
    };

    body.request_id = Some(request_id);
    let (mut parts, _) = response.into_parts();
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Json(body).into_response().into_body())
}
