//! Built-in `multi_agent_orchestration` capability, backed by the messenger.

use crate::bridge::{CapabilityBridgeBuilder, CapabilityHandler};
use agentlink_types::error::{LinkError, LinkResult};
use agentlink_wire::A2aMessenger;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// Namespace served by this module.
pub const NAMESPACE: &str = "multi_agent_orchestration";

/// Verbs of the orchestration capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationVerb {
    DiscoverAgents,
    NetworkStatus,
    SendMessage,
    GetConversation,
    Handshake,
    Broadcast,
}

impl OrchestrationVerb {
    pub const ALL: [OrchestrationVerb; 6] = [
        OrchestrationVerb::DiscoverAgents,
        OrchestrationVerb::NetworkStatus,
        OrchestrationVerb::SendMessage,
        OrchestrationVerb::GetConversation,
        OrchestrationVerb::Handshake,
        OrchestrationVerb::Broadcast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestrationVerb::DiscoverAgents => "discover_agents",
            OrchestrationVerb::NetworkStatus => "network_status",
            OrchestrationVerb::SendMessage => "send_message",
            OrchestrationVerb::GetConversation => "get_conversation",
            OrchestrationVerb::Handshake => "handshake",
            OrchestrationVerb::Broadcast => "broadcast",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiscoverParams {
    capability: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendParams {
    to: String,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationParams {
    #[serde(alias = "conversation_id", alias = "id")]
    conversation_id: String,
}

#[derive(Debug, Deserialize)]
struct HandshakeParams {
    endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BroadcastParams {
    capability: Option<String>,
    context: Value,
}

fn parse_params<T: DeserializeOwned>(params: Value) -> LinkResult<T> {
    // `null` and a missing body both mean "no params".
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| LinkError::capability(format!("Invalid params: {e}")))
}

/// One orchestration verb bound to the messenger.
pub struct OrchestrationHandler {
    messenger: Arc<A2aMessenger>,
    verb: OrchestrationVerb,
}

impl OrchestrationHandler {
    pub fn new(messenger: Arc<A2aMessenger>, verb: OrchestrationVerb) -> Self {
        Self { messenger, verb }
    }
}

#[async_trait]
impl CapabilityHandler for OrchestrationHandler {
    async fn call(&self, params: Value) -> LinkResult<Value> {
        match self.verb {
            OrchestrationVerb::DiscoverAgents => {
                let p: DiscoverParams = parse_params(params)?;
                let agents = self
                    .messenger
                    .discover_peers(p.capability.as_deref())
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "Peer discovery failed");
                        LinkError::capability("Peer discovery failed")
                    })?;
                Ok(json!({
                    "success": true,
                    "count": agents.len(),
                    "agents": agents,
                }))
            }
            OrchestrationVerb::NetworkStatus => {
                Ok(serde_json::to_value(self.messenger.network_status())?)
            }
            OrchestrationVerb::SendMessage => {
                let p: SendParams = parse_params(params)?;
                let result = self
                    .messenger
                    .send_message(&p.to, &p.method, p.params)
                    .await
                    .map_err(|e| match e {
                        LinkError::Transport(_) => {
                            LinkError::capability(format!("Peer {} is unreachable", p.to))
                        }
                        other => other,
                    })?;
                Ok(json!({ "success": true, "result": result }))
            }
            OrchestrationVerb::GetConversation => {
                let p: ConversationParams = parse_params(params)?;
                let conversation = self
                    .messenger
                    .conversation(&p.conversation_id)
                    .ok_or_else(|| {
                        LinkError::NotFound(format!("Unknown conversation: {}", p.conversation_id))
                    })?;
                Ok(serde_json::to_value(conversation)?)
            }
            OrchestrationVerb::Handshake => {
                let p: HandshakeParams = parse_params(params)?;
                let success = self.messenger.handshake(&p.endpoint).await;
                Ok(json!({ "success": success, "endpoint": p.endpoint }))
            }
            OrchestrationVerb::Broadcast => {
                let p: BroadcastParams = parse_params(params)?;
                let attempted = self.messenger.directory().active_count();
                let failures = self
                    .messenger
                    .broadcast_notification(p.capability.as_deref(), p.context)
                    .await;
                let failed: Vec<&str> = failures.iter().map(|(id, _)| id.as_str()).collect();
                Ok(json!({
                    "success": failed.is_empty(),
                    "delivered": attempted.saturating_sub(failed.len()),
                    "failed": failed,
                }))
            }
        }
    }
}

/// Register every orchestration verb.
pub fn register(
    mut builder: CapabilityBridgeBuilder,
    messenger: &Arc<A2aMessenger>,
) -> CapabilityBridgeBuilder {
    for verb in OrchestrationVerb::ALL {
        builder = builder.register(
            NAMESPACE,
            verb.as_str(),
            Arc::new(OrchestrationHandler::new(messenger.clone(), verb)),
        );
    }
    builder
}
