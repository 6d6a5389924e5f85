//! A2A envelope types.
//!
//! All communication between AgentLink peers uses a single JSON envelope,
//! POSTed to the peer's `/a2a` endpoint:
//!
//! ```json
//! {"protocol":"a2a/1.0","type":"request","from":"agent-a","to":"agent-b",
//!  "conversationId":"...","messageId":"...","timestamp":"...",
//!  "payload":{"method":"trust_escrow.create_escrow","params":{}}}
//! ```

use agentlink_types::clock::parse_timestamp_value;
use agentlink_types::error::LinkError;
use agentlink_types::rpc::RpcError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Protocol tag carried by every envelope.
pub const A2A_PROTOCOL: &str = "a2a/1.0";

/// HTTP header names used on the A2A endpoint.
pub mod headers {
    /// Protocol tag, mirrors the envelope's `protocol`.
    pub const PROTOCOL: &str = "x-a2a-protocol";
    /// Sending agent's id.
    pub const AGENT_ID: &str = "x-agent-id";
    /// Optional signature over `(payload, agent_id)`.
    pub const SIGNATURE: &str = "x-a2a-signature";
    /// Send time, RFC 3339 or epoch milliseconds.
    pub const TIMESTAMP: &str = "x-a2a-timestamp";
}

/// The kind of an A2A envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum A2aMessageType {
    /// Introduce two agents and trade capability manifests.
    Handshake,
    /// Invoke a method on the receiving agent.
    Request,
    /// Answer to a handshake, request or notification.
    Response,
    /// One-way event; acknowledged but not answered.
    Notification,
    /// Any type this node does not understand.
    #[serde(other)]
    Unknown,
}

/// Envelope body. Which fields are set depends on the message type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct A2aPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl A2aPayload {
    /// Payload carrying a successful result.
    pub fn result(result: serde_json::Value) -> Self {
        Self {
            result: Some(result),
            ..Default::default()
        }
    }

    /// Payload carrying an error.
    pub fn error(error: RpcError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    parse_timestamp_value(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// An A2A protocol envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct A2aEnvelope {
    /// Protocol tag, must equal [`A2A_PROTOCOL`].
    #[serde(default)]
    pub protocol: String,
    /// Message kind.
    #[serde(rename = "type")]
    pub message_type: A2aMessageType,
    /// Sending agent id.
    #[serde(default)]
    pub from: String,
    /// Receiving agent id.
    #[serde(default)]
    pub to: String,
    /// Correlates a request with its response.
    #[serde(default)]
    pub conversation_id: String,
    /// Unique per envelope.
    #[serde(default)]
    pub message_id: String,
    /// Send time.
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Message body.
    #[serde(default)]
    pub payload: A2aPayload,
    /// Optional signature over `(payload, from)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Fresh random identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl A2aEnvelope {
    /// Build an envelope with a fresh message id and the current time.
    pub fn new(
        message_type: A2aMessageType,
        from: impl Into<String>,
        to: impl Into<String>,
        conversation_id: impl Into<String>,
        payload: A2aPayload,
    ) -> Self {
        Self {
            protocol: A2A_PROTOCOL.to_string(),
            message_type,
            from: from.into(),
            to: to.into(),
            conversation_id: conversation_id.into(),
            message_id: new_id(),
            timestamp: Utc::now(),
            payload,
            signature: None,
        }
    }

    /// A `request` that opens a new conversation.
    pub fn request(
        from: impl Into<String>,
        to: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self::new(
            A2aMessageType::Request,
            from,
            to,
            new_id(),
            A2aPayload {
                method: Some(method.into()),
                params: Some(params),
                ..Default::default()
            },
        )
    }

    /// A `response` to this envelope, addressed back to its sender.
    pub fn reply(&self, self_id: &str, payload: A2aPayload) -> Self {
        Self::new(
            A2aMessageType::Response,
            self_id,
            self.from.clone(),
            self.conversation_id.clone(),
            payload,
        )
    }

    /// An error `response` to this envelope.
    pub fn error_reply(&self, self_id: &str, err: &LinkError) -> Self {
        self.reply(self_id, A2aPayload::error(RpcError::from(err)))
    }

    /// An error `response` for a body that could not be parsed as an envelope.
    ///
    /// Whatever addressing information can be recovered from the raw JSON is
    /// reused so the sender can still correlate the failure.
    pub fn error_for_raw(self_id: &str, raw: &serde_json::Value, err: &LinkError) -> Self {
        let field = |name: &str| {
            raw.get(name)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let from = field("from");
        Self::new(
            A2aMessageType::Response,
            self_id,
            if from.is_empty() {
                "unknown".to_string()
            } else {
                from
            },
            field("conversationId"),
            A2aPayload::error(RpcError::from(err)),
        )
    }

    /// Whether this envelope carries an error payload.
    pub fn is_error(&self) -> bool {
        self.payload.error.is_some()
    }

    /// The payload as a JSON value, the input to signing.
    pub fn payload_value(&self) -> serde_json::Value {
        serde_json::to_value(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}
