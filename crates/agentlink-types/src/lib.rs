//! Core types and traits for AgentLink.
//!
//! This crate defines the data structures shared by the wire protocol, the
//! kernel and the API gateway: the business RPC envelope, the error taxonomy
//! with its stable numeric codes, configuration, the clock abstraction and
//! the identity/signer contract. It contains no I/O.

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod rpc;
