//! API server: router assembly and the daemon entry point.

use crate::cors::cors_layer;
use crate::gateway::{guard, SecurityGateway};
use crate::routes::{self, AppState};
use agentlink_kernel::AgentKernel;
use agentlink_types::config::AgentConfig;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the full API router around a booted kernel.
pub fn build_router(kernel: Arc<AgentKernel>) -> Router {
    let security = &kernel.config().security;
    let gateway = Arc::new(SecurityGateway::new(
        kernel.agent_id(),
        security,
        kernel.verifier().clone(),
        kernel.clock().clone(),
    ));
    let cors = cors_layer(&security.allowed_origins);

    let state = AppState {
        kernel,
        gateway: gateway.clone(),
    };

    Router::new()
        .route("/rpc", post(routes::rpc))
        .route("/rpc/methods", get(routes::list_methods))
        .route("/a2a", post(routes::a2a))
        .route("/.well-known/agent.json", get(routes::agent_manifest))
        .route("/api/network", get(routes::network_status))
        .route("/api/peers", get(routes::list_peers))
        .route("/api/peers/discover", post(routes::discover_peers))
        .route("/api/peers/handshake", post(routes::handshake))
        .route("/api/peers/{agent_id}/trust", put(routes::set_trust))
        .route("/api/conversations/{id}", get(routes::get_conversation))
        .route("/api/health", get(routes::health))
        .route("/api/health/ping", post(routes::ping_agent))
        .layer(middleware::from_fn_with_state(gateway, guard))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Boot the kernel and serve the API until Ctrl+C.
pub async fn run_daemon(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = config.api_listen.parse()?;
    let kernel = Arc::new(AgentKernel::boot(config)?);
    kernel.start_background().await;

    let app = build_router(kernel.clone());
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(
        agent_id = %kernel.agent_id(),
        "AgentLink API listening on http://{listen_addr}"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    kernel.shutdown();
    info!("AgentLink daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
