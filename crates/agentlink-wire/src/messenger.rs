//! A2A messenger: discovery, outbound requests and inbound envelope handling.
//!
//! The messenger owns the [`PeerDirectory`] and the [`ConversationStore`]. It
//! never answers a request itself; inbound `request` envelopes are resolved
//! through a [`LocalDispatch`] passed in by the caller, which keeps the
//! messenger and the capability bridge free of reference cycles.

use crate::conversation::{Conversation, ConversationStore};
use crate::message::{headers, A2aEnvelope, A2aMessageType, A2aPayload, A2A_PROTOCOL};
use crate::registry::{PeerDirectory, PeerRecord, PeerStatus, PeerUpdate};
use crate::registry_client::AgentRegistryClient;
use crate::transport::PeerTransport;
use agentlink_types::clock::{system_clock, SharedClock};
use agentlink_types::config::AgentConfig;
use agentlink_types::error::{codes, LinkError, LinkResult};
use agentlink_types::identity::{sign_payload, Signer};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Recipient accepted on an inbound handshake from a peer that does not yet
/// know our agent id.
pub const ANY_RECIPIENT: &str = "*";

/// Resolves a method call against local capabilities.
#[async_trait]
pub trait LocalDispatch: Send + Sync {
    /// Invoke `method` with `params`.
    async fn dispatch(&self, method: &str, params: serde_json::Value) -> LinkResult<serde_json::Value>;
}

/// Messenger settings.
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// This agent's id.
    pub agent_id: String,
    /// Base URL peers use to reach this agent.
    pub endpoint: String,
    /// Capability namespaces advertised in handshakes.
    pub capabilities: Vec<String>,
    /// Trust for peers first seen through discovery.
    pub discovery_trust_score: u8,
    /// Trust for peers first seen through an inbound handshake.
    pub handshake_trust_score: u8,
    /// Conversation time-to-live.
    pub conversation_ttl: Duration,
    /// Conversation table bound.
    pub max_conversations: usize,
}

impl MessengerConfig {
    /// Derive messenger settings from the node configuration.
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            agent_id: config.agent_id.clone(),
            endpoint: config.public_endpoint.clone(),
            capabilities: config.capabilities.clone(),
            discovery_trust_score: config.network.discovery_trust_score,
            handshake_trust_score: config.network.handshake_trust_score,
            conversation_ttl: Duration::seconds(config.network.conversation_ttl_secs),
            max_conversations: config.network.max_conversations,
        }
    }
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self::from_agent_config(&AgentConfig::default())
    }
}

/// An inbound notification, fanned out to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aEvent {
    /// Sending agent.
    pub from: String,
    /// Conversation the notification belongs to.
    pub conversation_id: String,
    /// Capability the event concerns, if any.
    pub capability: Option<String>,
    /// Event body.
    pub context: serde_json::Value,
    /// When it was received.
    pub received_at: DateTime<Utc>,
}

/// Snapshot of the peer network.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub total_peers: usize,
    pub active_peers: usize,
    pub available_capabilities: Vec<String>,
    pub conversations: usize,
    /// `active / max(total, 1)`.
    pub network_health: f64,
}

/// URL of a peer's A2A endpoint given its base URL.
pub fn a2a_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/a2a") {
        base.to_string()
    } else {
        format!("{base}/a2a")
    }
}

/// The A2A messenger.
pub struct A2aMessenger {
    config: MessengerConfig,
    directory: PeerDirectory,
    conversations: ConversationStore,
    transport: Arc<dyn PeerTransport>,
    registry: Option<Arc<dyn AgentRegistryClient>>,
    signer: Option<Arc<dyn Signer>>,
    clock: SharedClock,
    events: broadcast::Sender<A2aEvent>,
}

impl A2aMessenger {
    /// Create a messenger. Without a registry, discovery only reports the
    /// local directory.
    pub fn new(
        config: MessengerConfig,
        transport: Arc<dyn PeerTransport>,
        registry: Option<Arc<dyn AgentRegistryClient>>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let conversations = ConversationStore::new(config.max_conversations, config.conversation_ttl);
        Self {
            config,
            directory: PeerDirectory::new(),
            conversations,
            transport,
            registry,
            signer: None,
            clock: system_clock(),
            events,
        }
    }

    /// Sign outbound envelopes with `signer`.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Use `clock` for peer and conversation timestamps.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// This agent's id.
    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    /// Messenger settings.
    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    /// The peer directory.
    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Subscribe to inbound notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<A2aEvent> {
        self.events.subscribe()
    }

    /// This agent's capability manifest, as sent in handshakes.
    pub fn manifest(&self) -> serde_json::Value {
        serde_json::json!({
            "agentId": self.config.agent_id,
            "endpoint": self.config.endpoint,
            "capabilities": self.config.capabilities,
            "protocol": A2A_PROTOCOL,
        })
    }

    // -----------------------------------------------------------------------
    // Discovery and directory
    // -----------------------------------------------------------------------

    /// Query the registry once and merge its answer into the directory.
    ///
    /// Every agent the registry returns is marked `active`. Returns the
    /// directory view, filtered by `capability` when given.
    pub async fn discover_peers(&self, capability: Option<&str>) -> LinkResult<Vec<PeerRecord>> {
        let Some(registry) = &self.registry else {
            debug!("No registry configured, returning local peer view");
            return Ok(self.directory.list(capability));
        };

        let agents = registry.discover(capability).await?;
        let now = self.clock.now();
        let mut merged = 0usize;
        for agent in agents {
            if agent.agent_id.is_empty() || agent.agent_id == self.config.agent_id {
                continue;
            }
            self.directory.upsert(
                PeerUpdate {
                    agent_id: agent.agent_id,
                    endpoint: Some(agent.endpoint),
                    capabilities: Some(agent.capabilities.into_iter().collect()),
                    trust_score: agent.trust_score,
                    status: Some(PeerStatus::Active),
                },
                self.config.discovery_trust_score,
                now,
            );
            merged += 1;
        }
        info!(capability = ?capability, merged, "Peer discovery complete");
        Ok(self.directory.list(capability))
    }

    /// Directory view without contacting the registry.
    pub fn list_peers(&self, capability: Option<&str>) -> Vec<PeerRecord> {
        self.directory.list(capability)
    }

    /// A single peer.
    pub fn get_peer(&self, agent_id: &str) -> Option<PeerRecord> {
        self.directory.get(agent_id)
    }

    /// Set a peer's trust score, clamped to 100.
    pub fn set_trust_score(&self, agent_id: &str, score: u8) -> LinkResult<u8> {
        self.directory
            .set_trust_score(agent_id, score)
            .ok_or_else(|| LinkError::NotFound(format!("Unknown peer: {agent_id}")))
    }

    /// Snapshot of the peer network.
    pub fn network_status(&self) -> NetworkStatus {
        let total_peers = self.directory.total_count();
        let active_peers = self.directory.active_count();
        NetworkStatus {
            total_peers,
            active_peers,
            available_capabilities: self.directory.available_capabilities().into_iter().collect(),
            conversations: self.conversations.len(),
            network_health: active_peers as f64 / total_peers.max(1) as f64,
        }
    }

    /// A recorded conversation.
    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.conversations.get(conversation_id)
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    fn outbound_headers(&self, envelope: &mut A2aEnvelope) -> Vec<(&'static str, String)> {
        let mut out = vec![
            (headers::PROTOCOL, A2A_PROTOCOL.to_string()),
            (headers::AGENT_ID, self.config.agent_id.clone()),
            (headers::TIMESTAMP, envelope.timestamp.to_rfc3339()),
        ];
        if let Some(signer) = &self.signer {
            let signature = sign_payload(signer.as_ref(), &self.config.agent_id, &envelope.payload_value());
            envelope.signature = Some(signature.clone());
            out.push((headers::SIGNATURE, signature));
        }
        out
    }

    async fn post_envelope(
        &self,
        url: &str,
        envelope: &mut A2aEnvelope,
    ) -> LinkResult<crate::transport::TransportResponse> {
        envelope.timestamp = self.clock.now();
        let headers = self.outbound_headers(envelope);
        let body = serde_json::to_value(&*envelope)?;
        self.transport.post_json(url, &headers, &body).await
    }

    /// Send a request to a known peer and return its result.
    ///
    /// A transport failure marks the peer unreachable and is returned as is;
    /// there is no retry. An error payload from the peer comes back as
    /// [`LinkError::Capability`] carrying the peer's code.
    pub async fn send_message(
        &self,
        to: &str,
        method: &str,
        params: serde_json::Value,
    ) -> LinkResult<serde_json::Value> {
        let peer = self
            .directory
            .get(to)
            .ok_or_else(|| LinkError::NotFound(format!("Unknown peer: {to}")))?;

        let mut envelope = A2aEnvelope::request(&self.config.agent_id, to, method, params);
        let url = a2a_url(&peer.endpoint);
        debug!(peer = %to, method, conversation = %envelope.conversation_id, "Sending A2A request");

        let response = match self.post_envelope(&url, &mut envelope).await {
            Ok(r) => r,
            Err(e) => {
                warn!(peer = %to, error = %e, "A2A send failed, marking peer unreachable");
                self.directory.mark_unreachable(to);
                return Err(e);
            }
        };

        let reply: A2aEnvelope = match serde_json::from_value(response.body.clone()) {
            Ok(reply) => reply,
            Err(_) if !response.is_success() => {
                warn!(peer = %to, status = response.status, "Peer answered without an envelope");
                self.directory.mark_unreachable(to);
                return Err(LinkError::Transport(format!(
                    "peer {to} returned HTTP {}",
                    response.status
                )));
            }
            Err(e) => {
                return Err(LinkError::Protocol(format!(
                    "invalid A2A response from {to}: {e}"
                )))
            }
        };

        let conversation_id = envelope.conversation_id.clone();
        let timestamp = self.clock.now();
        if let Some(error) = reply.payload.error {
            self.conversations.insert(
                conversation_id,
                Conversation {
                    request: envelope,
                    result: serde_json::to_value(&error)?,
                    timestamp,
                },
            );
            return Err(LinkError::Capability {
                code: error.code,
                message: error.message,
            });
        }

        let result = reply.payload.result.unwrap_or(serde_json::Value::Null);
        self.conversations.insert(
            conversation_id,
            Conversation {
                request: envelope,
                result: result.clone(),
                timestamp,
            },
        );
        Ok(result)
    }

    /// Introduce this agent to the peer at `endpoint`.
    ///
    /// Success is exactly a 2xx from the transport. A manifest in the reply,
    /// if any, is merged into the directory.
    pub async fn handshake(&self, endpoint: &str) -> bool {
        let mut envelope = A2aEnvelope::new(
            A2aMessageType::Handshake,
            &self.config.agent_id,
            ANY_RECIPIENT,
            crate::message::new_id(),
            A2aPayload {
                context: Some(self.manifest()),
                ..Default::default()
            },
        );
        let response = match self.post_envelope(&a2a_url(endpoint), &mut envelope).await {
            Ok(r) => r,
            Err(e) => {
                warn!(endpoint, error = %e, "Handshake failed");
                return false;
            }
        };
        if !response.is_success() {
            warn!(endpoint, status = response.status, "Handshake rejected");
            return false;
        }

        if let Some(manifest) = response
            .body
            .get("payload")
            .and_then(|p| p.get("result"))
        {
            if let Some(agent_id) = manifest.get("agentId").and_then(|v| v.as_str()) {
                self.directory.upsert(
                    PeerUpdate {
                        agent_id: agent_id.to_string(),
                        endpoint: Some(
                            manifest
                                .get("endpoint")
                                .and_then(|v| v.as_str())
                                .unwrap_or(endpoint)
                                .to_string(),
                        ),
                        capabilities: Some(capability_set(manifest.get("capabilities"))),
                        trust_score: None,
                        status: Some(PeerStatus::Active),
                    },
                    self.config.handshake_trust_score,
                    self.clock.now(),
                );
            }
        }
        info!(endpoint, "Handshake accepted");
        true
    }

    /// Send a notification to every active peer. Returns the peers that
    /// could not be reached, each of which is marked unreachable.
    pub async fn broadcast_notification(
        &self,
        capability: Option<&str>,
        context: serde_json::Value,
    ) -> Vec<(String, LinkError)> {
        let peers = self.directory.active();
        let sends = peers.iter().map(|peer| {
            let mut envelope = A2aEnvelope::new(
                A2aMessageType::Notification,
                &self.config.agent_id,
                &peer.agent_id,
                crate::message::new_id(),
                A2aPayload {
                    capability: capability.map(str::to_string),
                    context: Some(context.clone()),
                    ..Default::default()
                },
            );
            let url = a2a_url(&peer.endpoint);
            async move {
                let outcome = match self.post_envelope(&url, &mut envelope).await {
                    Ok(r) if r.is_success() => Ok(()),
                    Ok(r) => Err(LinkError::Transport(format!("HTTP {}", r.status))),
                    Err(e) => Err(e),
                };
                (peer.agent_id.clone(), outcome)
            }
        });

        let mut failures = Vec::new();
        for (agent_id, outcome) in futures::future::join_all(sends).await {
            if let Err(e) = outcome {
                warn!(peer = %agent_id, error = %e, "Notification delivery failed");
                self.directory.mark_unreachable(&agent_id);
                failures.push((agent_id, e));
            }
        }
        failures
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Answer an inbound envelope.
    ///
    /// Always returns a `response` envelope addressed to the sender; every
    /// failure (including a panic further down) becomes an error payload.
    pub async fn handle_incoming(
        &self,
        envelope: A2aEnvelope,
        dispatch: &dyn LocalDispatch,
    ) -> A2aEnvelope {
        let outcome = AssertUnwindSafe(self.process_incoming(&envelope, dispatch))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(LinkError::Internal("handler panicked".into())));

        match outcome {
            Ok(payload) => envelope.reply(&self.config.agent_id, payload),
            Err(e) => {
                warn!(
                    from = %envelope.from,
                    kind = ?envelope.message_type,
                    error = %e,
                    "Inbound A2A message failed"
                );
                envelope.error_reply(&self.config.agent_id, &e)
            }
        }
    }

    async fn process_incoming(
        &self,
        envelope: &A2aEnvelope,
        dispatch: &dyn LocalDispatch,
    ) -> LinkResult<A2aPayload> {
        if envelope.protocol != A2A_PROTOCOL {
            return Err(LinkError::Protocol(format!(
                "Unsupported protocol: {}",
                envelope.protocol
            )));
        }
        let addressed_to_us = envelope.to == self.config.agent_id
            || (envelope.message_type == A2aMessageType::Handshake && envelope.to == ANY_RECIPIENT);
        if !addressed_to_us {
            return Err(LinkError::Protocol(format!(
                "Message addressed to '{}', this agent is '{}'",
                envelope.to, self.config.agent_id
            )));
        }

        match envelope.message_type {
            A2aMessageType::Handshake => self.accept_handshake(envelope),
            A2aMessageType::Request => {
                let method = envelope
                    .payload
                    .method
                    .as_deref()
                    .ok_or_else(|| LinkError::Protocol("request without method".into()))?;
                let params = envelope
                    .payload
                    .params
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({}));
                debug!(from = %envelope.from, method, "Dispatching inbound A2A request");
                let result = dispatch.dispatch(method, params).await?;
                Ok(A2aPayload::result(result))
            }
            A2aMessageType::Notification => {
                let event = A2aEvent {
                    from: envelope.from.clone(),
                    conversation_id: envelope.conversation_id.clone(),
                    capability: envelope.payload.capability.clone(),
                    context: envelope
                        .payload
                        .context
                        .clone()
                        .unwrap_or(serde_json::Value::Null),
                    received_at: self.clock.now(),
                };
                // No subscribers is not an error.
                let _ = self.events.send(event);
                Ok(A2aPayload::result(serde_json::json!({ "acknowledged": true })))
            }
            other => Err(LinkError::Capability {
                code: codes::INTERNAL_ERROR,
                message: format!("Unsupported message type: {other:?}"),
            }),
        }
    }

    fn accept_handshake(&self, envelope: &A2aEnvelope) -> LinkResult<A2aPayload> {
        if envelope.from.is_empty() {
            return Err(LinkError::Protocol("handshake without sender".into()));
        }
        let context = envelope
            .payload
            .context
            .as_ref()
            .ok_or_else(|| LinkError::Protocol("handshake without context".into()))?;

        let record = self.directory.upsert(
            PeerUpdate {
                agent_id: envelope.from.clone(),
                endpoint: context
                    .get("endpoint")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                capabilities: Some(capability_set(context.get("capabilities"))),
                trust_score: None,
                status: Some(PeerStatus::Active),
            },
            self.config.handshake_trust_score,
            self.clock.now(),
        );
        info!(
            peer = %record.agent_id,
            capabilities = record.capabilities.len(),
            trust = record.trust_score,
            "Handshake from peer accepted"
        );

        let mut manifest = self.manifest();
        manifest["status"] = serde_json::json!("handshake_accepted");
        Ok(A2aPayload::result(manifest))
    }
}

fn capability_set(value: Option<&serde_json::Value>) -> BTreeSet<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
