//! Configuration types for an AgentLink node.

use crate::rpc::KnownCapability;
use serde::{Deserialize, Serialize};

/// Top-level node configuration (`~/.agentlink/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// This agent's identifier on the network.
    pub agent_id: String,
    /// Address the HTTP API binds to.
    pub api_listen: String,
    /// Publicly reachable base URL advertised to peers and the registry.
    pub public_endpoint: String,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Capability namespaces this agent advertises.
    pub capabilities: Vec<String>,
    /// Wire boundary protection.
    pub security: SecurityConfig,
    /// External agent registry.
    pub registry: RegistryConfig,
    /// Peer-to-peer messaging.
    pub network: NetworkConfig,
    /// Namespaces served by an upstream HTTP service.
    pub backends: Vec<CapabilityBackend>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: "agentlink-node".to_string(),
            api_listen: "127.0.0.1:4300".to_string(),
            public_endpoint: "http://127.0.0.1:4300".to_string(),
            log_level: "info".to_string(),
            capabilities: KnownCapability::ALL
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            security: SecurityConfig::default(),
            registry: RegistryConfig::default(),
            network: NetworkConfig::default(),
            backends: Vec::new(),
        }
    }
}

/// Security gateway settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum accepted request body, in bytes.
    pub max_body_bytes: u64,
    /// Requests allowed per client per window.
    pub rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Accepted clock skew for request timestamps, in seconds (each way).
    pub replay_window_secs: i64,
    /// Origins echoed back in CORS responses. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
    /// Require a timestamp on business RPC calls (A2A always requires one).
    pub require_timestamp_on_rpc: bool,
    /// Pre-shared secret for HMAC request signatures. Empty disables
    /// shared-secret verification; `did:key` senders are still verified.
    pub shared_secret: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            rate_limit_max: 100,
            rate_limit_window_secs: 60,
            replay_window_secs: 300,
            allowed_origins: vec!["*".to_string()],
            require_timestamp_on_rpc: false,
            shared_secret: String::new(),
        }
    }
}

/// SECURITY: Custom Debug impl redacts the shared secret.
impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("max_body_bytes", &self.max_body_bytes)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("replay_window_secs", &self.replay_window_secs)
            .field("allowed_origins", &self.allowed_origins)
            .field("require_timestamp_on_rpc", &self.require_timestamp_on_rpc)
            .field(
                "shared_secret",
                &if self.shared_secret.is_empty() {
                    "<empty>"
                } else {
                    "<redacted>"
                },
            )
            .finish()
    }
}

/// External agent registry settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry base URL. Empty disables registration, discovery and heartbeats.
    pub url: String,
    /// Timeout for every registry call, in seconds.
    pub timeout_secs: u64,
    /// Interval between heartbeats, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Hex-encoded Ed25519 secret key for the heartbeat identity.
    /// Empty generates a fresh identity at boot.
    pub identity_key: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 10,
            heartbeat_interval_secs: 300,
            identity_key: String::new(),
        }
    }
}

/// SECURITY: Custom Debug impl redacts the identity key.
impl std::fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_secs)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field(
                "identity_key",
                &if self.identity_key.is_empty() {
                    "<generated>"
                } else {
                    "<redacted>"
                },
            )
            .finish()
    }
}

/// Peer messaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Hard timeout on every outbound peer call, in seconds.
    pub request_timeout_secs: u64,
    /// Trust assigned to peers first seen through discovery.
    pub discovery_trust_score: u8,
    /// Trust assigned to peers first seen through an inbound handshake.
    pub handshake_trust_score: u8,
    /// Conversations older than this are dropped on the next insert.
    pub conversation_ttl_secs: i64,
    /// Upper bound on retained conversations.
    pub max_conversations: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            discovery_trust_score: 75,
            handshake_trust_score: 50,
            conversation_ttl_secs: 3600,
            max_conversations: 1000,
        }
    }
}

/// Binds a capability namespace to an upstream HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityBackend {
    /// Namespace, e.g. `trust_escrow`.
    pub namespace: String,
    /// Base URL; `ns.verb` is sent as `POST {url}/{verb}`.
    pub url: String,
    /// Verbs exposed through the bridge.
    pub verbs: Vec<String>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

fn default_backend_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.security.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.security.replay_window_secs, 300);
        assert_eq!(config.network.discovery_trust_score, 75);
        assert_eq!(config.network.handshake_trust_score, 50);
        assert_eq!(config.capabilities.len(), 5);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            agent_id = "courier-7"

            [security]
            rate_limit_max = 5

            [[backends]]
            namespace = "trust_escrow"
            url = "http://localhost:9000/escrow"
            verbs = ["create_escrow", "release"]
        "#,
        )
        .unwrap();
        assert_eq!(config.agent_id, "courier-7");
        assert_eq!(config.security.rate_limit_max, 5);
        assert_eq!(config.security.rate_limit_window_secs, 60);
        assert_eq!(config.backends[0].timeout_secs, 10);
        assert_eq!(config.registry.heartbeat_interval_secs, 300);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = AgentConfig::default();
        config.security.shared_secret = "hunter2".to_string();
        config.registry.identity_key = "abcdef".to_string();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("abcdef"));
    }
}
