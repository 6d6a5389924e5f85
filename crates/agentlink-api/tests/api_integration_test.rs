//! End-to-end tests of the HTTP surface, driven through the router with
//! `tower::ServiceExt::oneshot`. Outbound calls go to an in-process echo
//! transport; time comes from a manual clock.

use agentlink_api::build_router;
use agentlink_kernel::{AgentKernel, KernelParts};
use agentlink_types::clock::{Clock, ManualClock};
use agentlink_types::config::{AgentConfig, CapabilityBackend};
use agentlink_types::error::LinkResult;
use agentlink_types::identity::{sign_payload, SharedSecretSigner};
use agentlink_wire::{PeerTransport, TransportResponse};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

/// Answers every outbound POST with the body it was sent.
struct EchoTransport;

#[async_trait]
impl PeerTransport for EchoTransport {
    async fn post_json(
        &self,
        _url: &str,
        _headers: &[(&str, String)],
        body: &Value,
    ) -> LinkResult<TransportResponse> {
        Ok(TransportResponse {
            status: 200,
            body: body.clone(),
        })
    }
}

fn base_config() -> AgentConfig {
    let mut config = AgentConfig {
        agent_id: "node-a".into(),
        ..AgentConfig::default()
    };
    config.backends.push(CapabilityBackend {
        namespace: "social_commerce".into(),
        url: "http://commerce.internal".into(),
        verbs: vec!["create_listing".into()],
        timeout_secs: 5,
    });
    config
}

fn app_with(config: AgentConfig, clock: &ManualClock) -> Router {
    let parts = KernelParts {
        transport: Arc::new(EchoTransport),
        registry: None,
        clock: Arc::new(clock.clone()),
    };
    let kernel = AgentKernel::boot_with(config, parts).unwrap();
    build_router(Arc::new(kernel))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn rpc(method: &str, params: Value, id: Value) -> Value {
    json!({"version": "2.0", "method": method, "params": params, "id": id})
}

fn handshake_from(peer: &str, clock: &ManualClock) -> Value {
    json!({
        "protocol": "a2a/1.0",
        "type": "handshake",
        "from": peer,
        "to": "*",
        "conversationId": "conv-hs",
        "messageId": "msg-hs",
        "timestamp": clock.now().to_rfc3339(),
        "payload": {"context": {"endpoint": "http://p.local", "capabilities": ["c1", "c2"]}},
    })
}

#[tokio::test]
async fn test_ping_round_trip_keeps_id() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);
    let (status, _, body) = send(&app, post("/rpc", &rpc("ping", json!({}), json!("abc")))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "2.0");
    assert_eq!(body["id"], "abc");
    assert_eq!(body["result"]["status"], "pong");
    assert_eq!(body["result"]["agentId"], "node-a");
}

#[tokio::test]
async fn test_unknown_method_without_id() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);
    let request = json!({"version": "2.0", "method": "trust_escrow.nope", "params": {}});
    let (status, _, body) = send(&app, post("/rpc", &request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32601);
    assert!(body.as_object().unwrap().contains_key("id"));
    assert!(body["id"].is_null());
}

#[tokio::test]
async fn test_bad_version_and_bad_json() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);
    let request = json!({"version": "1.0", "method": "ping", "id": 3});
    let (_, _, body) = send(&app, post("/rpc", &request)).await;
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 3);

    let raw = Request::builder()
        .method("POST")
        .uri("/rpc")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&app, raw).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_discover_agents_end_to_end() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);
    let request = rpc("multi_agent_orchestration.discover_agents", json!({}), json!(7));
    let (_, _, body) = send(&app, post("/rpc", &request)).await;
    assert_eq!(body["version"], "2.0");
    assert_eq!(body["id"], 7);
    assert_eq!(body["result"]["success"], true);
    assert_eq!(body["result"]["count"], 0);
    assert!(body["result"]["agents"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limit_window() {
    let clock = ManualClock::default();
    let mut config = base_config();
    config.security.rate_limit_max = 3;
    config.security.rate_limit_window_secs = 60;
    let app = app_with(config, &clock);

    for i in 0..3 {
        let (status, _, _) = send(&app, post("/rpc", &rpc("ping", json!({}), json!(i)))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, headers, body) = send(&app, post("/rpc", &rpc("ping", json!({}), json!(4)))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers["retry-after"], "60");
    assert_eq!(body["error"]["code"], -32099);
    assert_eq!(body["id"], 4);

    clock.advance(chrono::Duration::seconds(60));
    let (status, _, body) = send(&app, post("/rpc", &rpc("ping", json!({}), json!(5)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["status"], "pong");
}

fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn test_rate_limit_ignores_rotating_agent_id() {
    let clock = ManualClock::default();
    let mut config = base_config();
    config.security.rate_limit_max = 1;
    let app = app_with(config, &clock);

    let mut accepted = 0;
    for i in 0..5 {
        let mut request = post("/rpc", &rpc("ping", json!({}), json!(i)));
        request
            .headers_mut()
            .insert("x-agent-id", format!("caller-{i}").parse().unwrap());
        let (status, _, _) = send(&app, from_peer(request, "10.0.0.9:4000")).await;
        if status == StatusCode::OK {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);

    let other = from_peer(post("/rpc", &rpc("ping", json!({}), json!(9))), "10.0.0.10:4000");
    let (status, _, body) = send(&app, other).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 9);
}

#[tokio::test]
async fn test_rate_limited_a2a_and_management_routes() {
    let clock = ManualClock::default();
    let mut config = base_config();
    config.security.rate_limit_max = 1;
    let app = app_with(config, &clock);

    let envelope = handshake_from("peer-b", &clock);
    let (status, _, _) = send(&app, post("/a2a", &envelope)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, headers, reply) = send(&app, post("/a2a", &envelope)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key("retry-after"));
    assert_eq!(reply["to"], "peer-b");
    assert_eq!(reply["payload"]["error"]["code"], -32099);

    let health = |peer: &str| {
        from_peer(
            Request::builder().uri("/api/health").body(Body::empty()).unwrap(),
            peer,
        )
    };
    let (status, _, _) = send(&app, health("10.0.0.20:1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, body) = send(&app, health("10.0.0.20:2")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], -32099);
}

#[tokio::test]
async fn test_stale_timestamp_rejected_regardless_of_signature() {
    let clock = ManualClock::default();
    let mut config = base_config();
    config.security.shared_secret = "s3cret".into();
    let app = app_with(config, &clock);

    let params = json!({});
    let signature = sign_payload(&SharedSecretSigner::new("caller", "s3cret"), "caller", &params);
    let stale = (clock.now() - chrono::Duration::seconds(600)).to_rfc3339();
    let mut request = post("/rpc", &rpc("ping", params.clone(), json!(1)));
    request.headers_mut().insert("x-agent-id", "caller".parse().unwrap());
    request.headers_mut().insert("x-a2a-timestamp", stale.parse().unwrap());
    request.headers_mut().insert("x-a2a-signature", signature.parse().unwrap());
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], -32097);
    assert_eq!(body["id"], 1);

    let mut request = post("/rpc", &rpc("ping", params, json!(2)));
    request.headers_mut().insert("x-agent-id", "caller".parse().unwrap());
    request
        .headers_mut()
        .insert("x-a2a-timestamp", clock.now().to_rfc3339().parse().unwrap());
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["status"], "pong");
}

#[tokio::test]
async fn test_bad_signature_rejected() {
    let clock = ManualClock::default();
    let mut config = base_config();
    config.security.shared_secret = "s3cret".into();
    let app = app_with(config, &clock);

    let mut request = post("/rpc", &rpc("ping", json!({}), json!(1)));
    request.headers_mut().insert("x-agent-id", "caller".parse().unwrap());
    request
        .headers_mut()
        .insert("x-a2a-timestamp", clock.now().to_rfc3339().parse().unwrap());
    request.headers_mut().insert("x-a2a-signature", "deadbeef".parse().unwrap());
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], -32098);
}

#[tokio::test]
async fn test_params_are_sanitized_before_dispatch() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);
    let request = rpc(
        "social_commerce.create_listing",
        json!({"title": "<script>alert(1)</script>hello"}),
        json!(11),
    );
    let (_, _, body) = send(&app, post("/rpc", &request)).await;
    assert_eq!(body["result"], json!({"title": "hello"}));
}

#[tokio::test]
async fn test_handshake_then_discover_by_capability() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);

    let (status, _, reply) = send(&app, post("/a2a", &handshake_from("peer-p", &clock))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["to"], "peer-p");
    assert_eq!(reply["conversationId"], "conv-hs");
    assert_eq!(reply["payload"]["result"]["status"], "handshake_accepted");

    let request = rpc(
        "multi_agent_orchestration.discover_agents",
        json!({"capability": "c1"}),
        json!(8),
    );
    let (_, _, body) = send(&app, post("/rpc", &request)).await;
    let agents = body["result"]["agents"].as_array().unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0]["agentId"], "peer-p");
    assert_eq!(agents[0]["trustScore"], 50);
    assert_eq!(agents[0]["status"], "active");

    let request = rpc(
        "multi_agent_orchestration.discover_agents",
        json!({"capability": "c9"}),
        json!(9),
    );
    let (_, _, body) = send(&app, post("/rpc", &request)).await;
    assert_eq!(body["result"]["count"], 0);
}

#[tokio::test]
async fn test_a2a_requires_timestamp() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);
    let mut envelope = handshake_from("peer-p", &clock);
    envelope.as_object_mut().unwrap().remove("timestamp");

    let (status, _, reply) = send(&app, post("/a2a", &envelope)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["to"], "peer-p");
    assert_eq!(reply["payload"]["error"]["code"], -32097);
}

#[tokio::test]
async fn test_a2a_request_and_notification() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);

    let request = json!({
        "protocol": "a2a/1.0",
        "type": "request",
        "from": "peer-q",
        "to": "node-a",
        "conversationId": "c-1",
        "messageId": "m-1",
        "timestamp": clock.now().timestamp_millis(),
        "payload": {"method": "ping", "params": {}},
    });
    let (_, _, reply) = send(&app, post("/a2a", &request)).await;
    assert_eq!(reply["payload"]["result"]["status"], "pong");

    let mut notification = request.clone();
    notification["type"] = json!("notification");
    notification["payload"] = json!({"capability": "trust_escrow", "context": {"event": "funded"}});
    let (_, _, reply) = send(&app, post("/a2a", &notification)).await;
    assert_eq!(reply["payload"]["result"]["acknowledged"], true);

    let mut odd = request.clone();
    odd["type"] = json!("gossip");
    let (status, _, reply) = send(&app, post("/a2a", &odd)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["payload"]["error"]["code"], -32603);

    let mut misaddressed = request;
    misaddressed["to"] = json!("node-z");
    let (_, _, reply) = send(&app, post("/a2a", &misaddressed)).await;
    assert_eq!(reply["payload"]["error"]["code"], -32600);
}

#[tokio::test]
async fn test_cors_preflight_and_echo() {
    let clock = ManualClock::default();
    let mut config = base_config();
    config.security.allowed_origins = vec!["https://shop.example".into()];
    let app = app_with(config, &clock);

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/rpc")
        .header("origin", "https://shop.example")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, preflight).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
    assert_eq!(headers["access-control-allow-origin"], "https://shop.example");

    let mut request = post("/rpc", &rpc("ping", json!({}), json!(1)));
    request
        .headers_mut()
        .insert("origin", "https://evil.example".parse().unwrap());
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_oversize_body_rejected() {
    let clock = ManualClock::default();
    let mut config = base_config();
    config.security.max_body_bytes = 64;
    let app = app_with(config, &clock);

    let big = rpc("ping", json!({"blob": "x".repeat(200)}), json!(1));
    let (status, _, body) = send(&app, post("/rpc", &big)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], -32096);

    let mut declared = post("/a2a", &big);
    declared
        .headers_mut()
        .insert("content-length", big.to_string().len().to_string().parse().unwrap());
    let (status, _, body) = send(&app, declared).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["payload"]["error"]["code"], -32096);
}

#[tokio::test]
async fn test_methods_and_manifest() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);

    let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (_, _, body) = send(&app, get("/rpc/methods")).await;
    let methods: Vec<&str> = body["methods"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(methods.contains(&"ping"));
    assert!(methods.contains(&"social_commerce.create_listing"));

    let (_, _, manifest) = send(&app, get("/.well-known/agent.json")).await;
    assert_eq!(manifest["agentId"], "node-a");
    assert_eq!(manifest["protocol"], "a2a/1.0");

    let (_, _, health) = send(&app, get("/api/health")).await;
    assert_eq!(health["indicator"], "red");
}

#[tokio::test]
async fn test_trust_management() {
    let clock = ManualClock::default();
    let app = app_with(base_config(), &clock);

    let put = |uri: &str, body: Value| {
        Request::builder()
            .method("PUT")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };
    let (status, _, _) = send(&app, put("/api/peers/ghost/trust", json!({"trustScore": 90}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, post("/a2a", &handshake_from("peer-p", &clock))).await;
    let (status, _, body) = send(&app, put("/api/peers/peer-p/trust", json!({"trustScore": 90}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trustScore"], 90);

    let get = Request::builder()
        .uri("/api/peers?capability=c2")
        .body(Body::empty())
        .unwrap();
    let (_, _, body) = send(&app, get).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["peers"][0]["trustScore"], 90);
}
