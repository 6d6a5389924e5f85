//! Clap CLI definitions for AgentLink.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  agentlink start                          Run the node (API + heartbeat)
  agentlink methods                        List the methods the node serves
  agentlink ping                           Ping the local node
  agentlink call trust_escrow.status -p '{\"id\":\"e-1\"}'
  agentlink peers --capability c1          Show known peers
  agentlink identity                       Generate a heartbeat identity key";

/// AgentLink: inter-agent communication for agent services.
#[derive(Parser, Debug)]
#[command(name = "agentlink", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of a running node (defaults to the configured listen address).
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node: API server, registry registration and heartbeat.
    Start,
    /// List the RPC methods a node serves.
    Methods,
    /// Send the reserved `ping` RPC.
    Ping,
    /// Call an RPC method.
    Call {
        /// Fully qualified method, e.g. `trust_escrow.create_escrow`.
        method: String,
        /// JSON params.
        #[arg(long, short = 'p', default_value = "{}")]
        params: String,
        /// Sign the request with the configured shared secret.
        #[arg(long)]
        sign: bool,
    },
    /// Show health and network status.
    Status,
    /// List known peers.
    Peers {
        /// Only peers advertising this capability.
        #[arg(long)]
        capability: Option<String>,
        /// Query the registry first.
        #[arg(long)]
        refresh: bool,
    },
    /// Generate an Ed25519 identity key for `registry.identity_key`.
    Identity,
}
