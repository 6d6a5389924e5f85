//! Route handlers for the API server.

use crate::gateway::{error_response, SecurityGateway};
use agentlink_kernel::AgentKernel;
use agentlink_types::error::LinkError;
use agentlink_types::rpc::{extract_id, RpcId, RpcResponse};
use agentlink_wire::message::headers;
use agentlink_wire::{A2aEnvelope, A2A_PROTOCOL};
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<AgentKernel>,
    pub gateway: Arc<SecurityGateway>,
}

fn rpc_error(id: Option<RpcId>, err: &LinkError) -> Response {
    let body = serde_json::to_value(RpcResponse::from_error(id, err)).unwrap_or_default();
    error_response(err, body)
}

fn a2a_error(state: &AppState, raw: &Value, err: &LinkError) -> Response {
    let envelope = A2aEnvelope::error_for_raw(state.kernel.agent_id(), raw, err);
    error_response(err, serde_json::to_value(envelope).unwrap_or_default())
}

/// POST /rpc: business RPC.
pub async fn rpc(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match state.gateway.read_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => return rpc_error(None, &e),
    };
    let parsed = serde_json::from_slice::<Value>(&bytes);
    if let Err(e) = state.gateway.admit_peer(&parts.extensions) {
        let id = parsed.as_ref().ok().and_then(extract_id);
        return rpc_error(id, &e);
    }
    let raw = match parsed {
        Ok(v) => v,
        Err(e) => return rpc_error(None, &LinkError::Protocol(format!("Invalid JSON: {e}"))),
    };

    let body = state.gateway.sanitize(raw);
    if let Err(e) = state.gateway.authenticate_rpc(&parts.headers, &body) {
        warn!(code = e.code(), "RPC request failed authentication");
        return rpc_error(extract_id(&body), &e);
    }

    Json(state.kernel.bridge().handle_value(body).await).into_response()
}

/// GET /rpc/methods
pub async fn list_methods(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "methods": state.kernel.bridge().list_methods() }))
}

/// POST /a2a: inbound peer envelope. Always answers with an envelope.
pub async fn a2a(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match state.gateway.read_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => return a2a_error(&state, &Value::Null, &e),
    };
    let parsed = serde_json::from_slice::<Value>(&bytes);
    if let Err(e) = state.gateway.admit_peer(&parts.extensions) {
        return a2a_error(&state, parsed.as_ref().unwrap_or(&Value::Null), &e);
    }
    let raw = match parsed {
        Ok(v) => v,
        Err(e) => {
            let err = LinkError::Protocol(format!("Invalid JSON: {e}"));
            return a2a_error(&state, &Value::Null, &err);
        }
    };

    let declared = parts
        .headers
        .get(headers::PROTOCOL)
        .and_then(|v| v.to_str().ok());
    if let Some(protocol) = declared.filter(|p| *p != A2A_PROTOCOL) {
        let err = LinkError::Protocol(format!("Unsupported protocol header: {protocol}"));
        return a2a_error(&state, &raw, &err);
    }

    let body = state.gateway.sanitize(raw);
    if let Err(e) = state.gateway.authenticate_a2a(&parts.headers, &body) {
        warn!(code = e.code(), from = ?body.get("from"), "A2A message failed authentication");
        return a2a_error(&state, &body, &e);
    }

    let envelope: A2aEnvelope = match serde_json::from_value(body.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            let err = LinkError::Protocol(format!("Malformed envelope: {e}"));
            return a2a_error(&state, &body, &err);
        }
    };

    Json(state.kernel.handle_a2a(envelope).await).into_response()
}

/// GET /.well-known/agent.json: capability manifest.
pub async fn agent_manifest(State(state): State<AppState>) -> impl IntoResponse {
    let mut manifest = state.kernel.messenger().manifest();
    manifest["methods"] = serde_json::json!(state.kernel.bridge().list_methods());
    Json(manifest)
}

/// GET /api/network
pub async fn network_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.kernel.messenger().network_status())
}

#[derive(Debug, Default, Deserialize)]
pub struct PeerQuery {
    pub capability: Option<String>,
}

/// GET /api/peers?capability=
pub async fn list_peers(
    State(state): State<AppState>,
    Query(query): Query<PeerQuery>,
) -> impl IntoResponse {
    let peers = state
        .kernel
        .messenger()
        .list_peers(query.capability.as_deref());
    Json(serde_json::json!({ "count": peers.len(), "peers": peers }))
}

/// POST /api/peers/discover?capability=
pub async fn discover_peers(
    State(state): State<AppState>,
    Query(query): Query<PeerQuery>,
) -> impl IntoResponse {
    match state
        .kernel
        .messenger()
        .discover_peers(query.capability.as_deref())
        .await
    {
        Ok(peers) => (
            StatusCode::OK,
            Json(serde_json::json!({ "count": peers.len(), "peers": peers })),
        ),
        Err(e) => {
            warn!(error = %e, "Discovery via API failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": "Peer discovery failed" })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HandshakeRequest {
    pub endpoint: String,
}

/// POST /api/peers/handshake
pub async fn handshake(
    State(state): State<AppState>,
    Json(req): Json<HandshakeRequest>,
) -> impl IntoResponse {
    let success = state.kernel.messenger().handshake(&req.endpoint).await;
    Json(serde_json::json!({ "success": success, "endpoint": req.endpoint }))
}

#[derive(Debug, Deserialize)]
pub struct TrustUpdate {
    #[serde(alias = "trustScore")]
    pub trust_score: u8,
}

/// PUT /api/peers/{agent_id}/trust
pub async fn set_trust(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(update): Json<TrustUpdate>,
) -> impl IntoResponse {
    match state
        .kernel
        .messenger()
        .set_trust_score(&agent_id, update.trust_score)
    {
        Ok(score) => (
            StatusCode::OK,
            Json(serde_json::json!({ "agentId": agent_id, "trustScore": score })),
        ),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": e.public_message() })),
        ),
    }
}

/// GET /api/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.kernel.messenger().conversation(&id) {
        Some(conversation) => (
            StatusCode::OK,
            Json(serde_json::to_value(conversation).unwrap_or_default()),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("Unknown conversation: {id}") })),
        ),
    }
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.kernel.heartbeat().status())
}

#[derive(Debug, Deserialize)]
pub struct PingRequest {
    pub endpoint: String,
}

/// POST /api/health/ping
pub async fn ping_agent(
    State(state): State<AppState>,
    Json(req): Json<PingRequest>,
) -> impl IntoResponse {
    Json(state.kernel.heartbeat().ping_agent(&req.endpoint).await)
}
