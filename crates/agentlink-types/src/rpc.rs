//! Business RPC envelope types.
//!
//! External callers speak a JSON-RPC style envelope:
//! `{"version":"2.0","method":"ns.verb","params":{...},"id":7}`. The response
//! echoes the request `id` verbatim (including `null`) and carries either a
//! `result` or an `error`.

use crate::error::{LinkError, LinkResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The only supported envelope version.
pub const RPC_VERSION: &str = "2.0";

/// Reserved zero-argument liveness method.
pub const PING_METHOD: &str = "ping";

/// Request identifier. `None` at the envelope level means `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    /// Numeric id, kept as a JSON number so it round-trips exactly.
    Number(serde_json::Number),
    /// String id.
    Str(String),
}

impl From<i64> for RpcId {
    fn from(n: i64) -> Self {
        RpcId::Number(n.into())
    }
}

impl From<&str> for RpcId {
    fn from(s: &str) -> Self {
        RpcId::Str(s.to_string())
    }
}

/// An inbound RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Envelope version, must equal [`RPC_VERSION`].
    #[serde(default, alias = "jsonrpc")]
    pub version: String,
    /// Fully qualified method name.
    #[serde(default)]
    pub method: String,
    /// Opaque parameters.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Caller-chosen id, echoed back verbatim.
    #[serde(default)]
    pub id: Option<RpcId>,
}

impl RpcRequest {
    /// Build a request with the current version.
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: Option<RpcId>) -> Self {
        Self {
            version: RPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// Error object inside an RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Stable numeric code (see [`crate::error::codes`]).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Build an error object without data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<&LinkError> for RpcError {
    fn from(err: &LinkError) -> Self {
        let data = match err {
            LinkError::RateLimited { retry_after_secs } => {
                Some(serde_json::json!({ "retryAfter": retry_after_secs }))
            }
            LinkError::PayloadTooLarge { max, .. } => Some(serde_json::json!({ "maxBytes": max })),
            _ => None,
        };
        Self {
            code: err.code(),
            message: err.public_message(),
            data,
        }
    }
}

/// An outbound RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Envelope version.
    pub version: String,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// The request id, `null` when the request had none.
    #[serde(default)]
    pub id: Option<RpcId>,
}

impl RpcResponse {
    /// Successful response.
    pub fn success(id: Option<RpcId>, result: serde_json::Value) -> Self {
        Self {
            version: RPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Error response.
    pub fn failure(id: Option<RpcId>, error: RpcError) -> Self {
        Self {
            version: RPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Error response built from a [`LinkError`].
    pub fn from_error(id: Option<RpcId>, err: &LinkError) -> Self {
        Self::failure(id, RpcError::from(err))
    }

    /// Whether this response carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Pull the `id` out of an arbitrary JSON body, if it is a valid id.
pub fn extract_id(body: &serde_json::Value) -> Option<RpcId> {
    body.get("id")
        .and_then(|v| serde_json::from_value::<RpcId>(v.clone()).ok())
}

/// A method name parsed once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodName {
    /// The reserved `ping` method.
    Ping,
    /// A capability method, `namespace.verb`.
    Capability {
        /// Capability namespace, e.g. `trust_escrow`.
        namespace: String,
        /// Verb within the namespace, e.g. `create_escrow`.
        verb: String,
    },
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl MethodName {
    /// Parse a wire method name.
    ///
    /// Anything that is neither `ping` nor exactly `namespace.verb` is
    /// reported as [`LinkError::NotFound`].
    pub fn parse(raw: &str) -> LinkResult<Self> {
        if raw == PING_METHOD {
            return Ok(MethodName::Ping);
        }
        match raw.split_once('.') {
            Some((namespace, verb)) if is_valid_segment(namespace) && is_valid_segment(verb) => {
                Ok(MethodName::Capability {
                    namespace: namespace.to_string(),
                    verb: verb.to_string(),
                })
            }
            _ => Err(LinkError::NotFound(format!("Method not found: {raw}"))),
        }
    }

    /// Build a capability method name.
    pub fn capability(namespace: impl Into<String>, verb: impl Into<String>) -> Self {
        MethodName::Capability {
            namespace: namespace.into(),
            verb: verb.into(),
        }
    }

    /// Capability namespace, `None` for `ping`.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            MethodName::Ping => None,
            MethodName::Capability { namespace, .. } => Some(namespace),
        }
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodName::Ping => write!(f, "{PING_METHOD}"),
            MethodName::Capability { namespace, verb } => write!(f, "{namespace}.{verb}"),
        }
    }
}

/// Capability namespaces known to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownCapability {
    SocialCommerce,
    TrustEscrow,
    PeerDelivery,
    TravelLogistics,
    MultiAgentOrchestration,
}

impl KnownCapability {
    /// Every known namespace.
    pub const ALL: [KnownCapability; 5] = [
        KnownCapability::SocialCommerce,
        KnownCapability::TrustEscrow,
        KnownCapability::PeerDelivery,
        KnownCapability::TravelLogistics,
        KnownCapability::MultiAgentOrchestration,
    ];

    /// Wire namespace string.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownCapability::SocialCommerce => "social_commerce",
            KnownCapability::TrustEscrow => "trust_escrow",
            KnownCapability::PeerDelivery => "peer_delivery",
            KnownCapability::TravelLogistics => "travel_logistics",
            KnownCapability::MultiAgentOrchestration => "multi_agent_orchestration",
        }
    }

    /// Look up a namespace string.
    pub fn from_namespace(ns: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == ns)
    }
}

impl fmt::Display for KnownCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
