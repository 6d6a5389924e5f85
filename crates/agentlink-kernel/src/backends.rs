//! HTTP capability backends.
//!
//! A namespace bound to an upstream service in config forwards `ns.verb` as
//! `POST {url}/{verb}` with the params as the JSON body. Any upstream failure
//! surfaces as a `-32000` capability error.

use crate::bridge::{CapabilityBridgeBuilder, CapabilityHandler};
use agentlink_types::config::CapabilityBackend;
use agentlink_types::error::{LinkError, LinkResult};
use agentlink_wire::PeerTransport;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Forwards one verb to an upstream service.
pub struct HttpCapabilityBackend {
    namespace: String,
    verb: String,
    url: String,
    timeout: Duration,
    transport: Arc<dyn PeerTransport>,
}

impl HttpCapabilityBackend {
    pub fn new(backend: &CapabilityBackend, verb: &str, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            namespace: backend.namespace.clone(),
            verb: verb.to_string(),
            url: format!("{}/{verb}", backend.url.trim_end_matches('/')),
            timeout: Duration::from_secs(backend.timeout_secs.max(1)),
            transport,
        }
    }

    /// Upstream URL this verb is forwarded to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Best-effort error message from an upstream body.
fn upstream_message(body: &Value) -> Option<String> {
    let error = body.get("error");
    error
        .and_then(|e| e.get("message"))
        .or(error)
        .or_else(|| body.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

#[async_trait]
impl CapabilityHandler for HttpCapabilityBackend {
    async fn call(&self, params: Value) -> LinkResult<Value> {
        let method = format!("{}.{}", self.namespace, self.verb);
        debug!(method = %method, url = %self.url, "Forwarding to capability backend");

        let send = self.transport.post_json(&self.url, &[], &params);
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| {
                warn!(method = %method, "Capability backend timed out");
                LinkError::capability(format!("{method} timed out"))
            })?
            .map_err(|e| {
                warn!(method = %method, error = %e, "Capability backend unreachable");
                LinkError::capability(format!("{method} is unavailable"))
            })?;

        if !response.is_success() {
            let message = upstream_message(&response.body)
                .unwrap_or_else(|| format!("{method} failed with HTTP {}", response.status));
            return Err(LinkError::capability(message));
        }
        Ok(response.body)
    }
}

/// Register every configured backend whose namespace is in `enabled`.
pub fn register(
    mut builder: CapabilityBridgeBuilder,
    backends: &[CapabilityBackend],
    enabled: &[String],
    transport: &Arc<dyn PeerTransport>,
) -> CapabilityBridgeBuilder {
    for backend in backends {
        if !enabled.iter().any(|ns| ns == &backend.namespace) {
            warn!(
                namespace = %backend.namespace,
                "Backend configured for a capability that is not enabled, skipping"
            );
            continue;
        }
        for verb in &backend.verbs {
            builder = builder.register(
                &backend.namespace,
                verb,
                Arc::new(HttpCapabilityBackend::new(backend, verb, transport.clone())),
            );
        }
    }
    builder
}
