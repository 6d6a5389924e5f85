//! CORS layer. Sits outermost, so `OPTIONS` preflights are answered with
//! `200` and an empty body before the size guard or rate limiter see them.

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

const ALLOW_HEADERS: [HeaderName; 5] = [
    header::CONTENT_TYPE,
    HeaderName::from_static("x-agent-id"),
    HeaderName::from_static("x-a2a-protocol"),
    HeaderName::from_static("x-a2a-signature"),
    HeaderName::from_static("x-a2a-timestamp"),
];

/// Build the CORS layer for `allowed` origins.
///
/// Allow-listed origins are echoed back; `"*"` echoes any origin. Anything
/// else gets no `Access-Control-Allow-Origin` header.
pub fn cors_layer(allowed: &[String]) -> CorsLayer {
    let origins: Vec<&str> = allowed
        .iter()
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .collect();

    let allow_origin = if origins.contains(&"*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins.into_iter().filter_map(|o| {
            HeaderValue::from_str(o)
                .inspect_err(|_| warn!(origin = %o, "Ignoring unparsable CORS origin"))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(ALLOW_HEADERS)
}
