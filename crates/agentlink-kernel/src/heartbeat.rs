//! Heartbeat monitor: liveness toward the agent registry.
//!
//! The monitor periodically sends a signed heartbeat to the registry, can
//! probe any agent with a `ping` RPC, and derives a three-level health
//! indicator from the age of the last successful heartbeat and ping.
//!
//! The periodic loop runs as a spawned tokio task; [`HeartbeatMonitor::stop`]
//! aborts it. Ages are computed from an injectable [`Clock`], so the
//! indicator can be driven without waiting on wall-clock time.

use agentlink_types::clock::{system_clock, SharedClock};
use agentlink_types::error::LinkResult;
use agentlink_types::identity::{sign_payload, Signer};
use agentlink_types::rpc::{RpcId, RpcRequest, PING_METHOD};
use agentlink_wire::message::headers;
use agentlink_wire::{AgentRegistryClient, HeartbeatPayload, PeerTransport, RegistryAck, Registration};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Both ages below this are green (seconds).
pub const GREEN_THRESHOLD_SECS: i64 = 360;

/// A heartbeat age below this is at least yellow (seconds).
pub const YELLOW_THRESHOLD_SECS: i64 = 900;

/// Status string sent with every heartbeat.
const ACTIVE_STATUS: &str = "active";

/// Three-level health indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthIndicator {
    Green,
    Yellow,
    Red,
}

/// Derive the indicator from heartbeat and ping ages in whole seconds.
pub fn derive_indicator(heartbeat_age: Option<i64>, ping_age: Option<i64>) -> HealthIndicator {
    match (heartbeat_age, ping_age) {
        (Some(hb), Some(ping)) if hb < GREEN_THRESHOLD_SECS && ping < GREEN_THRESHOLD_SECS => {
            HealthIndicator::Green
        }
        (Some(hb), _) if hb < YELLOW_THRESHOLD_SECS => HealthIndicator::Yellow,
        _ => HealthIndicator::Red,
    }
}

/// Mutable monitor state.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatState {
    pub is_running: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_ping_success: Option<DateTime<Utc>>,
}

/// Health report; the indicator is derived on every read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub agent_id: String,
    pub identifier: String,
    pub is_running: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_ping_success: Option<DateTime<Utc>>,
    pub heartbeat_age_secs: Option<i64>,
    pub ping_age_secs: Option<i64>,
    pub indicator: HealthIndicator,
}

/// Result of one heartbeat attempt. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HeartbeatOutcome {
    /// The registry took the heartbeat.
    Accepted {
        asynchronous: bool,
        at: DateTime<Utc>,
    },
    /// The heartbeat did not go through.
    Failed { reason: String },
    /// No registry is configured.
    Disabled,
}

impl HeartbeatOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, HeartbeatOutcome::Accepted { .. })
    }
}

/// Result of a `ping` probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingOutcome {
    pub endpoint: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Whether a ping result counts as alive.
pub fn is_pong(result: &serde_json::Value) -> bool {
    if result.as_str() == Some("pong") {
        return true;
    }
    matches!(
        result.get("status").and_then(|s| s.as_str()),
        Some("ok") | Some("pong")
    )
}

fn rpc_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    if base.ends_with("/rpc") {
        base.to_string()
    } else {
        format!("{base}/rpc")
    }
}

/// Periodic registry heartbeat plus on-demand ping probes.
pub struct HeartbeatMonitor {
    agent_id: String,
    signer: Arc<dyn Signer>,
    registry: Option<Arc<dyn AgentRegistryClient>>,
    transport: Arc<dyn PeerTransport>,
    clock: SharedClock,
    interval: Duration,
    state: RwLock<HeartbeatState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new(
        agent_id: impl Into<String>,
        signer: Arc<dyn Signer>,
        registry: Option<Arc<dyn AgentRegistryClient>>,
        transport: Arc<dyn PeerTransport>,
        interval: Duration,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            signer,
            registry,
            transport,
            clock: system_clock(),
            interval,
            state: RwLock::new(HeartbeatState::default()),
            task: Mutex::new(None),
        }
    }

    /// Use `clock` for timestamps and ages.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Identity attached to heartbeats.
    pub fn identifier(&self) -> String {
        self.signer.identifier()
    }

    /// Copy of the current state.
    pub fn state(&self) -> HeartbeatState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Signature over `body`, keyed by this monitor's identity.
    fn sign(&self, body: &serde_json::Value) -> (String, String) {
        let identifier = self.signer.identifier();
        let signature = sign_payload(self.signer.as_ref(), &identifier, body);
        (identifier, signature)
    }

    /// Send one heartbeat.
    ///
    /// The signature covers `{agentId, status, timestamp}`. On acceptance
    /// (including the registry's asynchronous 5xx) `last_heartbeat` is set.
    pub async fn send_heartbeat(&self) -> HeartbeatOutcome {
        let Some(registry) = &self.registry else {
            debug!("No registry configured, heartbeat skipped");
            return HeartbeatOutcome::Disabled;
        };

        let now = self.clock.now();
        let signed = serde_json::json!({
            "agentId": self.agent_id,
            "status": ACTIVE_STATUS,
            "timestamp": now.to_rfc3339(),
        });
        let (identifier, signature) = self.sign(&signed);
        let payload = HeartbeatPayload {
            identifier,
            signature,
            timestamp: now,
            agent_id: self.agent_id.clone(),
            status: ACTIVE_STATUS.to_string(),
        };

        match registry.heartbeat(&payload).await {
            Ok(ack) => {
                self.state
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .last_heartbeat = Some(now);
                debug!(ack = ?ack, "Heartbeat accepted");
                HeartbeatOutcome::Accepted {
                    asynchronous: ack == RegistryAck::AcceptedAsync,
                    at: now,
                }
            }
            Err(e) => {
                warn!(error = %e, "Heartbeat failed");
                HeartbeatOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Register this agent with the registry.
    pub async fn register(&self, endpoint: &str, capabilities: &[String]) -> LinkResult<RegistryAck> {
        let Some(registry) = &self.registry else {
            return Ok(RegistryAck::Accepted);
        };
        let now = self.clock.now();
        let signed = serde_json::json!({
            "agentId": self.agent_id,
            "endpoint": endpoint,
            "capabilities": capabilities,
            "timestamp": now.to_rfc3339(),
        });
        let (identifier, signature) = self.sign(&signed);
        let registration = Registration {
            agent_id: self.agent_id.clone(),
            identifier,
            signature,
            timestamp: now,
            status: ACTIVE_STATUS.to_string(),
            endpoint: endpoint.to_string(),
            capabilities: capabilities.to_vec(),
        };
        let ack = registry.register(&registration).await?;
        info!(ack = ?ack, endpoint, "Registered with agent registry");
        Ok(ack)
    }

    /// Probe `endpoint` with a `ping` RPC.
    pub async fn ping_agent(&self, endpoint: &str) -> PingOutcome {
        let started = std::time::Instant::now();
        let request = RpcRequest::new(
            PING_METHOD,
            serde_json::json!({}),
            Some(RpcId::from(uuid::Uuid::new_v4().to_string().as_str())),
        );
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                return PingOutcome {
                    endpoint: endpoint.to_string(),
                    success: false,
                    latency_ms: 0,
                    detail: Some(e.to_string()),
                }
            }
        };
        let request_headers = [
            (headers::AGENT_ID, self.agent_id.clone()),
            (headers::TIMESTAMP, self.clock.now().to_rfc3339()),
        ];

        let outcome = self
            .transport
            .post_json(&rpc_url(endpoint), &request_headers, &body)
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (success, detail) = match outcome {
            Ok(response) => match response.body.get("result") {
                Some(result) if is_pong(result) => (true, None),
                Some(_) => (false, Some("unexpected ping result".to_string())),
                None => (
                    false,
                    Some(format!("no result (HTTP {})", response.status)),
                ),
            },
            Err(e) => (false, Some(e.to_string())),
        };

        if success {
            self.state
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .last_ping_success = Some(self.clock.now());
        } else {
            debug!(endpoint, detail = ?detail, "Ping failed");
        }
        PingOutcome {
            endpoint: endpoint.to_string(),
            success,
            latency_ms,
            detail,
        }
    }

    /// Current health, with the indicator derived from the clock.
    pub fn status(&self) -> HealthStatus {
        let state = self.state();
        let now = self.clock.now();
        let age = |t: Option<DateTime<Utc>>| t.map(|t| (now - t).num_seconds());
        let heartbeat_age_secs = age(state.last_heartbeat);
        let ping_age_secs = age(state.last_ping_success);
        HealthStatus {
            agent_id: self.agent_id.clone(),
            identifier: self.signer.identifier(),
            is_running: state.is_running,
            last_heartbeat: state.last_heartbeat,
            last_ping_success: state.last_ping_success,
            heartbeat_age_secs,
            ping_age_secs,
            indicator: derive_indicator(heartbeat_age_secs, ping_age_secs),
        }
    }

    /// Start the periodic heartbeat: one beat immediately, then one per
    /// interval. Returns `false` (and does nothing) if already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            info!("Heartbeat already running");
            return false;
        }

        let monitor = Arc::clone(self);
        let period = self.interval.max(Duration::from_secs(1));
        info!(interval_secs = period.as_secs(), "Starting heartbeat loop");
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.send_heartbeat().await;
            }
        }));
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .is_running = true;
        true
    }

    /// Cancel the periodic heartbeat.
    pub fn stop(&self) {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Heartbeat loop stopped");
        }
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .is_running = false;
    }
}
