//! Axum middleware attached in front of the forwarding handler.
//!
//! Both layers are stateless: one correlates a request across the gateway and
//! its upstream through `X-Request-ID`, the other logs latency.
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::tracing_setup::create_request_span;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Log start/end of a request including latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    tracing::debug!("Started processing {} {} {:?}", method, uri, version);

    let response = next.run(req).await;

    tracing::info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Completed request"
    );

    response
}

/// Tag every request with an id, forward it upstream and echo it back.
///
/// A well-formed id supplied by the caller is kept; otherwise a UUID v4 is
/// generated.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let Ok(header_value) = HeaderValue::from_str(&request_id) else {
        return next.run(req).await;
    };
    req.headers_mut()
        .insert(REQUEST_ID_HEADER, header_value.clone());

    let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);
    let mut response = next.run(req).instrument(span).await;

    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, header_value);
    response
}
