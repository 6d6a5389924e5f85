//! HTTP API for the AgentLink daemon.
//!
//! Exposes the business RPC endpoint, the A2A endpoint and a small management
//! surface, all behind the security gateway.

pub mod auth;
pub mod cors;
pub mod gateway;
pub mod rate_limiter;
pub mod routes;
pub mod sanitize;
pub mod server;

pub use gateway::SecurityGateway;
pub use server::{build_router, run_daemon};
