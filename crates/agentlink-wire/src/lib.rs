//! AgentLink wire layer: agent-to-agent (A2A) networking over HTTP.
//!
//! ## Architecture
//!
//! - **A2aEnvelope**: the JSON peer-to-peer message format (`a2a/1.0`)
//! - **PeerDirectory**: in-memory table of known peers, their capabilities and liveness
//! - **ConversationStore**: request/result audit trail keyed by conversation id
//! - **PeerTransport**: outbound HTTP seam, with a `reqwest` implementation
//! - **AgentRegistryClient**: discovery, registration and heartbeat against an external registry
//! - **A2aMessenger**: builds, sends and answers A2A envelopes
//! - **LocalDispatch**: trait through which inbound requests reach the local capability bridge

pub mod conversation;
pub mod message;
pub mod messenger;
pub mod registry;
pub mod registry_client;
pub mod transport;

pub use conversation::{Conversation, ConversationStore};
pub use message::{A2aEnvelope, A2aMessageType, A2aPayload, A2A_PROTOCOL};
pub use messenger::{A2aEvent, A2aMessenger, LocalDispatch, MessengerConfig, NetworkStatus};
pub use registry::{PeerDirectory, PeerRecord, PeerStatus, PeerUpdate};
pub use registry_client::{
    AgentRegistryClient, HeartbeatPayload, HttpRegistryClient, RegistryAck, RegistryAgent,
    Registration,
};
pub use transport::{HttpTransport, PeerTransport, TransportResponse};
