//! Core kernel for AgentLink.
//!
//! Assembles the capability bridge, the A2A messenger and the heartbeat
//! monitor from configuration, and owns them for the lifetime of the node.

pub mod backends;
pub mod bridge;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod kernel;
pub mod orchestration;

pub use bridge::{CapabilityBridge, CapabilityBridgeBuilder, CapabilityHandler};
pub use error::{KernelError, KernelResult};
pub use heartbeat::{HealthIndicator, HealthStatus, HeartbeatMonitor, HeartbeatOutcome};
pub use kernel::{AgentKernel, KernelParts};
