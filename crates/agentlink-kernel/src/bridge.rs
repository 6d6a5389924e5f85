//! Capability bridge: the business RPC surface of an agent.
//!
//! Handlers are registered under `namespace.verb` through
//! [`CapabilityBridgeBuilder`]; the built [`CapabilityBridge`] is immutable.
//! Method names are parsed once into [`MethodName`] and dispatched through a
//! lookup table. `ping` is reserved and always answered by the bridge itself.
//!
//! Handler failures are shaped into stable codes:
//! - a [`LinkError::Capability`] keeps its code and message;
//! - internal failures (and panics) become `-32603` with a generic message;
//! - anything else becomes a `-32000` capability error.

use agentlink_types::clock::{system_clock, SharedClock};
use agentlink_types::error::{codes, LinkError, LinkResult};
use agentlink_types::rpc::{extract_id, MethodName, RpcRequest, RpcResponse, RPC_VERSION};
use agentlink_wire::LocalDispatch;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A business method implementation.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Run the method with the caller's params.
    async fn call(&self, params: Value) -> LinkResult<Value>;
}

/// Adapts an async closure into a [`CapabilityHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = LinkResult<Value>> + Send + 'static,
{
    async fn call(&self, params: Value) -> LinkResult<Value> {
        (self.0)(params).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn CapabilityHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LinkResult<Value>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Builds a [`CapabilityBridge`].
pub struct CapabilityBridgeBuilder {
    agent_id: String,
    clock: SharedClock,
    handlers: BTreeMap<MethodName, Arc<dyn CapabilityHandler>>,
}

impl CapabilityBridgeBuilder {
    /// Start a bridge for `agent_id`.
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            clock: system_clock(),
            handlers: BTreeMap::new(),
        }
    }

    /// Use `clock` for `ping` timestamps.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Register `namespace.verb`. A later registration replaces an earlier one.
    pub fn register(
        mut self,
        namespace: &str,
        verb: &str,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Self {
        let method = MethodName::capability(namespace, verb);
        if self.handlers.insert(method.clone(), handler).is_some() {
            warn!(method = %method, "Capability handler replaced");
        }
        self
    }

    /// Whether any handler is registered under `namespace`.
    pub fn serves(&self, namespace: &str) -> bool {
        self.handlers
            .keys()
            .any(|m| m.namespace() == Some(namespace))
    }

    /// Freeze the registry.
    pub fn build(self) -> CapabilityBridge {
        CapabilityBridge {
            agent_id: self.agent_id,
            clock: self.clock,
            handlers: self.handlers,
        }
    }
}

/// Read-only method registry and RPC front door.
pub struct CapabilityBridge {
    agent_id: String,
    clock: SharedClock,
    handlers: BTreeMap<MethodName, Arc<dyn CapabilityHandler>>,
}

impl CapabilityBridge {
    /// The agent this bridge answers for.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Answer an RPC request. Never fails: every error becomes an error
    /// envelope carrying the request id.
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        if request.version != RPC_VERSION {
            let err = LinkError::Protocol(format!(
                "Unsupported version '{}', expected '{RPC_VERSION}'",
                request.version
            ));
            return RpcResponse::from_error(id, &err);
        }
        match self.call(&request.method, request.params).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(e) => RpcResponse::from_error(id, &e),
        }
    }

    /// Answer a raw JSON body.
    ///
    /// A body that is not an RPC envelope yields `-32600`, keeping the `id`
    /// whenever one can be read.
    pub async fn handle_value(&self, body: Value) -> RpcResponse {
        if !body.is_object() {
            let err = LinkError::Protocol("Request body must be a JSON object".into());
            return RpcResponse::from_error(None, &err);
        }
        match serde_json::from_value::<RpcRequest>(body.clone()) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                let err = LinkError::Protocol(format!("Malformed request: {e}"));
                RpcResponse::from_error(extract_id(&body), &err)
            }
        }
    }

    /// Resolve and invoke `method`.
    pub async fn call(&self, method: &str, params: Value) -> LinkResult<Value> {
        let method = MethodName::parse(method)?;
        let handler = match &method {
            MethodName::Ping => return Ok(self.ping()),
            capability => self
                .handlers
                .get(capability)
                .ok_or_else(|| LinkError::NotFound(format!("Method not found: {capability}")))?,
        };

        debug!(method = %method, "Invoking capability");
        let outcome = AssertUnwindSafe(handler.call(params)).catch_unwind().await;
        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(shape_handler_error(&method, e)),
            Err(_) => {
                error!(method = %method, "Capability handler panicked");
                Err(LinkError::Internal(format!("{method} panicked")))
            }
        }
    }

    /// Result of the reserved `ping` method.
    pub fn ping(&self) -> Value {
        serde_json::json!({
            "status": "pong",
            "agentId": self.agent_id,
            "timestamp": self.clock.now().to_rfc3339(),
            "capabilities": self.capabilities(),
        })
    }

    /// `ping` plus every registered method, sorted.
    pub fn list_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = std::iter::once(MethodName::Ping)
            .chain(self.handlers.keys().cloned())
            .map(|m| m.to_string())
            .collect();
        methods.sort();
        methods
    }

    /// Distinct namespaces with at least one registered method.
    pub fn capabilities(&self) -> Vec<String> {
        self.handlers
            .keys()
            .filter_map(|m| m.namespace().map(str::to_string))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn shape_handler_error(method: &MethodName, err: LinkError) -> LinkError {
    match err {
        LinkError::Capability { .. } => err,
        LinkError::Internal(_)
        | LinkError::Transport(_)
        | LinkError::Config(_)
        | LinkError::Serialization(_) => {
            warn!(method = %method, error = %err, "Capability failed unexpectedly");
            err
        }
        other => LinkError::Capability {
            code: codes::CAPABILITY_ERROR,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl LocalDispatch for CapabilityBridge {
    async fn dispatch(&self, method: &str, params: Value) -> LinkResult<Value> {
        self.call(method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlink_types::rpc::RpcId;
    use serde_json::json;

    fn bridge() -> CapabilityBridge {
        CapabilityBridgeBuilder::new("agent-under-test")
            .register(
                "trust_escrow",
                "create_escrow",
                handler_fn(|params: Value| async move {
                    Ok(json!({"escrowId": "e-1", "amount": params["amount"]}))
                }),
            )
            .register(
                "trust_escrow",
                "release",
                handler_fn(|_| async { Err(LinkError::capability("Escrow not funded")) }),
            )
            .register(
                "peer_delivery",
                "quote",
                handler_fn(|_| async { Err(LinkError::Internal("db at 10.0.0.4 down".into())) }),
            )
            .register(
                "peer_delivery",
                "track",
                handler_fn(|_| async { Err(LinkError::NotFound("parcel p-9".into())) }),
            )
            .register(
                "social_commerce",
                "search",
                handler_fn(|_| async {
                    if true {
                        panic!("index corrupted");
                    }
                    Ok(Value::Null)
                }),
            )
            .build()
    }

    #[tokio::test]
    async fn test_ping_echoes_id() {
        let resp = bridge()
            .handle(RpcRequest::new("ping", json!({}), Some(RpcId::from(42))))
            .await;
        assert_eq!(resp.id, Some(RpcId::from(42)));
        let result = resp.result.unwrap();
        assert_eq!(result["status"], "pong");
        assert_eq!(result["agentId"], "agent-under-test");
        assert_eq!(
            result["capabilities"],
            json!(["peer_delivery", "social_commerce", "trust_escrow"])
        );
    }

    #[tokio::test]
    async fn test_unknown_method_preserves_null_id() {
        let resp = bridge()
            .handle_value(json!({"version": "2.0", "method": "nope.nothing"}))
            .await;
        assert_eq!(resp.error.unwrap().code, -32601);
        let resp = bridge()
            .handle_value(json!({"version": "2.0", "method": "bogus"}))
            .await;
        let out = serde_json::to_value(resp).unwrap();
        assert!(out["id"].is_null());
        assert_eq!(out["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_bad_version() {
        let resp = bridge()
            .handle_value(json!({"version": "1.0", "method": "ping", "id": "x"}))
            .await;
        assert_eq!(resp.error.unwrap().code, -32600);
        assert_eq!(resp.id, Some(RpcId::from("x")));
    }

    #[tokio::test]
    async fn test_malformed_body_keeps_id() {
        let resp = bridge()
            .handle_value(json!({"version": "2.0", "method": 12, "id": 5}))
            .await;
        assert_eq!(resp.error.unwrap().code, -32600);
        assert_eq!(resp.id, Some(RpcId::from(5)));

        let resp = bridge().handle_value(json!([1, 2, 3])).await;
        assert_eq!(resp.error.unwrap().code, -32600);
        assert!(resp.id.is_none());
    }

    #[tokio::test]
    async fn test_handler_success() {
        let resp = bridge()
            .handle(RpcRequest::new(
                "trust_escrow.create_escrow",
                json!({"amount": 25}),
                Some(RpcId::from(1)),
            ))
            .await;
        assert_eq!(resp.result.unwrap()["amount"], 25);
    }

    #[tokio::test]
    async fn test_handler_errors_are_shaped() {
        let b = bridge();
        let err = b.call("trust_escrow.release", json!({})).await.unwrap_err();
        assert_eq!(err.code(), -32000);
        assert_eq!(err.public_message(), "Escrow not funded");

        let err = b.call("peer_delivery.quote", json!({})).await.unwrap_err();
        assert_eq!(err.code(), -32603);
        assert!(!err.public_message().contains("10.0.0.4"));

        let err = b.call("peer_delivery.track", json!({})).await.unwrap_err();
        assert_eq!(err.code(), -32000);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_internal_error() {
        let resp = bridge()
            .handle(RpcRequest::new("social_commerce.search", json!({}), None))
            .await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, -32603);
        assert_eq!(error.message, "Internal error");
    }

    #[test]
    fn test_list_methods_sorted_with_ping() {
        let methods = bridge().list_methods();
        assert_eq!(
            methods,
            vec![
                "peer_delivery.quote",
                "peer_delivery.track",
                "ping",
                "social_commerce.search",
                "trust_escrow.create_escrow",
                "trust_escrow.release",
            ]
        );
        let empty = CapabilityBridgeBuilder::new("x").build();
        assert_eq!(empty.list_methods(), vec!["ping"]);
        assert!(empty.capabilities().is_empty());
    }

    #[tokio::test]
    async fn test_local_dispatch_reuses_bridge() {
        let b = bridge();
        let dispatch: &dyn LocalDispatch = &b;
        let result = dispatch.dispatch("ping", json!({})).await.unwrap();
        assert_eq!(result["status"], "pong");
    }

    #[test]
    fn test_builder_serves() {
        let builder = CapabilityBridgeBuilder::new("x").register(
            "travel_logistics",
            "parse_itinerary",
            handler_fn(|_| async { Ok(Value::Null) }),
        );
        assert!(builder.serves("travel_logistics"));
        assert!(!builder.serves("trust_escrow"));
    }
}
