//! AgentLink CLI: run a node and talk to one.

mod cli;
mod client;

use agentlink_kernel::config::load_config;
use agentlink_types::config::AgentConfig;
use agentlink_types::identity::{Ed25519Signer, Signer};
use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use client::{node_url, signed_headers, NodeClient};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AgentConfig, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    init_tracing(&config, cli.json_logs);

    let base = cli.url.clone().unwrap_or_else(|| node_url(&config));
    let client = NodeClient::new(&base);

    match cli.command {
        Commands::Start => {
            info!(agent_id = %config.agent_id, listen = %config.api_listen, "Starting AgentLink node");
            agentlink_api::run_daemon(config)
                .await
                .map_err(|e| anyhow::anyhow!("daemon failed: {e}"))?;
        }
        Commands::Methods => print_json(&client.get("/rpc/methods").await?),
        Commands::Ping => print_json(&client.ping().await?),
        Commands::Call {
            method,
            params,
            sign,
        } => {
            let params: Value =
                serde_json::from_str(&params).context("--params must be valid JSON")?;
            let headers = if sign {
                signed_headers(&config, &params)?
            } else {
                Vec::new()
            };
            print_json(&client.rpc(&method, params, &headers).await?);
        }
        Commands::Status => {
            let health = client.get("/api/health").await?;
            let network = client.get("/api/network").await?;
            print_json(&serde_json::json!({ "health": health, "network": network }));
        }
        Commands::Peers {
            capability,
            refresh,
        } => {
            let peers = client.peers(capability.as_deref(), refresh).await?;
            print_json(&peers);
        }
        Commands::Identity => {
            let signer = Ed25519Signer::generate();
            print_json(&serde_json::json!({
                "identifier": signer.identifier(),
                "identity_key": signer.secret_hex(),
            }));
        }
    }
    Ok(())
}
