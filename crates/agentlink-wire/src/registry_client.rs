//! Client for the external agent registry.
//!
//! The registry serves three calls: registration, heartbeats and
//! capability-filtered discovery. Registration and heartbeats are known to
//! answer `5xx` while still accepting the write asynchronously; that quirk is
//! surfaced as [`RegistryAck::AcceptedAsync`] for those two calls only.
//! Discovery treats every non-2xx as a failure.

use agentlink_types::error::LinkError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A peer as listed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryAgent {
    #[serde(alias = "agent_id", alias = "id")]
    pub agent_id: String,
    #[serde(default, alias = "url")]
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, alias = "trust_score", skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<u8>,
}

/// Signed liveness beacon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub identifier: String,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub status: String,
}

/// Signed registration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub agent_id: String,
    pub identifier: String,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
}

/// How the registry acknowledged a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryAck {
    /// 2xx.
    Accepted,
    /// 5xx, which this registry uses for "accepted, processing asynchronously".
    AcceptedAsync,
}

/// The external registry as seen by the messenger and heartbeat monitor.
#[async_trait]
pub trait AgentRegistryClient: Send + Sync {
    /// List agents, optionally restricted to one capability.
    async fn discover(&self, capability: Option<&str>) -> Result<Vec<RegistryAgent>, LinkError>;

    /// Send a heartbeat.
    async fn heartbeat(&self, payload: &HeartbeatPayload) -> Result<RegistryAck, LinkError>;

    /// Register this agent.
    async fn register(&self, registration: &Registration) -> Result<RegistryAck, LinkError>;
}

/// Interpret the status of a registration or heartbeat write.
pub fn write_ack(status: u16) -> Result<RegistryAck, LinkError> {
    match status {
        200..=299 => Ok(RegistryAck::Accepted),
        500..=599 => Ok(RegistryAck::AcceptedAsync),
        other => Err(LinkError::Transport(format!("registry returned {other}"))),
    }
}

/// Pull the agent list out of a discovery response, which is either a bare
/// array or `{"agents": [...]}`.
pub fn parse_agents(body: serde_json::Value) -> Result<Vec<RegistryAgent>, LinkError> {
    let list = match body {
        serde_json::Value::Array(items) => serde_json::Value::Array(items),
        serde_json::Value::Object(mut map) => map
            .remove("agents")
            .ok_or_else(|| LinkError::Protocol("registry response has no agents".into()))?,
        other => {
            return Err(LinkError::Protocol(format!(
                "unexpected registry response: {other}"
            )))
        }
    };
    Ok(serde_json::from_value(list)?)
}

/// reqwest-backed registry client.
pub struct HttpRegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRegistryClient {
    /// Create a client for the registry at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn post_write<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<RegistryAck, LinkError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LinkError::Transport(format!("registry {path} failed: {e}")))?;
        let ack = write_ack(response.status().as_u16())?;
        if ack == RegistryAck::AcceptedAsync {
            warn!(
                status = response.status().as_u16(),
                path, "Registry answered 5xx, treating write as accepted"
            );
        }
        Ok(ack)
    }
}

#[async_trait]
impl AgentRegistryClient for HttpRegistryClient {
    async fn discover(&self, capability: Option<&str>) -> Result<Vec<RegistryAgent>, LinkError> {
        let url = format!("{}/agents", self.base_url);
        debug!(url = %url, capability = ?capability, "Querying registry");
        let mut request = self.client.get(&url);
        if let Some(cap) = capability {
            request = request.query(&[("capability", cap)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| LinkError::Transport(format!("registry discovery failed: {e}")))?;
        if !response.status().is_success() {
            return Err(LinkError::Transport(format!(
                "registry discovery returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LinkError::Protocol(format!("invalid registry response: {e}")))?;
        parse_agents(body)
    }

    async fn heartbeat(&self, payload: &HeartbeatPayload) -> Result<RegistryAck, LinkError> {
        self.post_write("/agents/heartbeat", payload).await
    }

    async fn register(&self, registration: &Registration) -> Result<RegistryAck, LinkError> {
        self.post_write("/agents/register", registration).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_ack_leniency() {
        assert_eq!(write_ack(200).unwrap(), RegistryAck::Accepted);
        assert_eq!(write_ack(202).unwrap(), RegistryAck::Accepted);
        assert_eq!(write_ack(503).unwrap(), RegistryAck::AcceptedAsync);
        assert!(write_ack(404).is_err());
        assert!(write_ack(401).is_err());
    }

    #[test]
    fn test_parse_agents_shapes() {
        let bare = json!([{"agentId": "p1", "endpoint": "http://p1", "capabilities": ["a"]}]);
        assert_eq!(parse_agents(bare).unwrap()[0].agent_id, "p1");

        let wrapped = json!({"agents": [
            {"agent_id": "p2", "url": "http://p2", "trustScore": 90}
        ]});
        let agents = parse_agents(wrapped).unwrap();
        assert_eq!(agents[0].endpoint, "http://p2");
        assert_eq!(agents[0].trust_score, Some(90));
        assert!(agents[0].capabilities.is_empty());

        assert!(parse_agents(json!({"items": []})).is_err());
        assert!(parse_agents(json!("nope")).is_err());
    }

    #[test]
    fn test_heartbeat_payload_shape() {
        let payload = HeartbeatPayload {
            identifier: "did:key:ed25519:ab".into(),
            signature: "00".into(),
            timestamp: Utc::now(),
            agent_id: "me".into(),
            status: "active".into(),
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["agentId"], "me");
        assert!(v.get("identifier").is_some());
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_error() {
        let client = HttpRegistryClient::new("http://127.0.0.1:1/", Duration::from_millis(500));
        assert!(client.discover(None).await.is_err());
    }
}
