//! Security gateway: the checks every wire request passes before it reaches
//! the capability bridge or the messenger.
//!
//! Order: CORS (see [`crate::cors`]) → size guard → rate limiter →
//! sanitizer → auth validator. [`guard`] runs as middleware: it rejects an
//! oversized declared `Content-Length` on every route and rate-limits the
//! management routes. `/rpc` and `/a2a` are admitted by their handlers right
//! after the capped body read, so a rejection can still echo the request id.

use crate::auth::{AuthValidator, Credentials};
use crate::rate_limiter::{client_key, peer_addr, FixedWindowLimiter};
use crate::sanitize;
use agentlink_types::clock::SharedClock;
use agentlink_types::config::SecurityConfig;
use agentlink_types::error::LinkError;
use agentlink_types::identity::SignatureVerifier;
use agentlink_types::rpc::RpcResponse;
use agentlink_wire::message::headers;
use agentlink_wire::A2aEnvelope;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, Extensions, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Paths whose handlers perform their own admission.
const SELF_ADMITTING: [&str; 2] = ["/rpc", "/a2a"];

/// Admission checks shared by every wire route.
pub struct SecurityGateway {
    agent_id: String,
    config: SecurityConfig,
    limiter: FixedWindowLimiter,
    auth: AuthValidator,
}

impl SecurityGateway {
    /// Gateway for `agent_id`, sized and timed by `config`.
    pub fn new(
        agent_id: impl Into<String>,
        config: &SecurityConfig,
        verifier: Arc<dyn SignatureVerifier>,
        clock: SharedClock,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            limiter: FixedWindowLimiter::new(config.rate_limit_max, config.rate_limit_window_secs)
                .with_clock(clock.clone()),
            auth: AuthValidator::new(config.replay_window_secs, verifier).with_clock(clock),
            config: config.clone(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// The limiter behind [`SecurityGateway::admit`].
    pub fn limiter(&self) -> &FixedWindowLimiter {
        &self.limiter
    }

    fn too_large(&self, size: u64) -> LinkError {
        LinkError::PayloadTooLarge {
            size,
            max: self.config.max_body_bytes,
        }
    }

    /// Reject a request whose declared `Content-Length` is over the limit.
    pub fn check_declared_size(&self, request_headers: &HeaderMap) -> Result<(), LinkError> {
        let declared = request_headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        match declared {
            Some(size) if size > self.config.max_body_bytes => Err(self.too_large(size)),
            _ => Ok(()),
        }
    }

    /// Read the body, stopping as soon as it exceeds the limit.
    pub async fn read_body(&self, body: Body) -> Result<Bytes, LinkError> {
        let limit = usize::try_from(self.config.max_body_bytes).unwrap_or(usize::MAX);
        axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| self.too_large(self.config.max_body_bytes.saturating_add(1)))
    }

    /// Count one request against the client's window.
    pub fn admit(&self, key: &str) -> Result<(), LinkError> {
        self.limiter.check(key)
    }

    /// Count one request against the window of the connection it came in on.
    pub fn admit_peer(&self, extensions: &Extensions) -> Result<(), LinkError> {
        self.admit(&client_key(peer_addr(extensions)))
    }

    /// Strip active content from every string and key in `body`.
    pub fn sanitize(&self, body: Value) -> Value {
        sanitize::sanitize(body)
    }

    /// Business RPC: credentials come from headers; the signature covers
    /// the request `params`.
    pub fn authenticate_rpc(&self, request_headers: &HeaderMap, body: &Value) -> Result<(), LinkError> {
        let timestamp = header_str(request_headers, headers::TIMESTAMP).map(Value::from);
        let creds = Credentials {
            agent_id: header_str(request_headers, headers::AGENT_ID).unwrap_or_default(),
            timestamp: timestamp.as_ref(),
            signature: header_str(request_headers, headers::SIGNATURE),
            payload: body.get("params").unwrap_or(&Value::Null),
        };
        self.auth.validate(&creds, self.config.require_timestamp_on_rpc)
    }

    /// A2A: envelope fields take precedence over headers; a timestamp is
    /// always required and the signature covers the envelope `payload`.
    pub fn authenticate_a2a(&self, request_headers: &HeaderMap, body: &Value) -> Result<(), LinkError> {
        let header_timestamp = header_str(request_headers, headers::TIMESTAMP).map(Value::from);
        let creds = Credentials {
            agent_id: body
                .get("from")
                .and_then(Value::as_str)
                .or_else(|| header_str(request_headers, headers::AGENT_ID))
                .unwrap_or_default(),
            timestamp: body
                .get("timestamp")
                .filter(|t| !t.is_null())
                .or(header_timestamp.as_ref()),
            signature: body
                .get("signature")
                .and_then(Value::as_str)
                .or_else(|| header_str(request_headers, headers::SIGNATURE)),
            payload: body.get("payload").unwrap_or(&Value::Null),
        };
        self.auth.validate(&creds, true)
    }
}

fn header_str<'a>(request_headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    request_headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// HTTP status for a gateway or envelope error.
pub fn status_for(err: &LinkError) -> StatusCode {
    match err {
        LinkError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        LinkError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        LinkError::Auth { .. } => StatusCode::UNAUTHORIZED,
        _ => StatusCode::OK,
    }
}

/// Respond with `body`, using the status (and `Retry-After`) that fits `err`.
pub fn error_response(err: &LinkError, body: Value) -> Response {
    let mut response = (status_for(err), Json(body)).into_response();
    if let LinkError::RateLimited { retry_after_secs } = err {
        if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

/// Error body in the shape the route expects.
fn shaped_error(gateway: &SecurityGateway, path: &str, err: &LinkError) -> Value {
    match path {
        "/rpc" => serde_json::to_value(RpcResponse::from_error(None, err)).unwrap_or_default(),
        "/a2a" => serde_json::to_value(A2aEnvelope::error_for_raw(
            gateway.agent_id(),
            &Value::Null,
            err,
        ))
        .unwrap_or_default(),
        _ => serde_json::json!({"error": err.public_message(), "code": err.code()}),
    }
}

/// Size guard on every route; rate limiter on the routes that do not admit
/// requests themselves.
pub async fn guard(
    State(gateway): State<Arc<SecurityGateway>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let mut checked = gateway.check_declared_size(request.headers());
    if checked.is_ok() && !SELF_ADMITTING.contains(&path.as_str()) {
        checked = gateway.admit_peer(request.extensions());
    }
    if let Err(err) = checked {
        let client = client_key(peer_addr(request.extensions()));
        warn!(client = %client, path = %path, code = err.code(), "Request rejected at gateway");
        return error_response(&err, shaped_error(&gateway, &path, &err));
    }

    next.run(request).await
}
