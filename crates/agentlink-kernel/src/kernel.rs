//! AgentKernel: assembles and owns the node's subsystems.

use crate::backends;
use crate::bridge::{CapabilityBridge, CapabilityBridgeBuilder};
use crate::error::{KernelError, KernelResult};
use crate::heartbeat::HeartbeatMonitor;
use crate::orchestration;
use agentlink_types::clock::{system_clock, SharedClock};
use agentlink_types::config::AgentConfig;
use agentlink_types::error::LinkResult;
use agentlink_types::identity::{
    AgentVerifier, Ed25519Signer, SharedSecretSigner, SignatureVerifier, Signer,
};
use agentlink_types::rpc::KnownCapability;
use agentlink_wire::{
    A2aEnvelope, A2aMessenger, AgentRegistryClient, HttpRegistryClient, HttpTransport,
    MessengerConfig, PeerTransport, RegistryAck,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outbound dependencies of the kernel. Tests swap these for mocks.
#[derive(Clone)]
pub struct KernelParts {
    pub transport: Arc<dyn PeerTransport>,
    pub registry: Option<Arc<dyn AgentRegistryClient>>,
    pub clock: SharedClock,
}

impl KernelParts {
    /// HTTP transport and, if a registry URL is set, an HTTP registry client.
    pub fn from_config(config: &AgentConfig) -> Self {
        let registry = (!config.registry.url.trim().is_empty()).then(|| {
            Arc::new(HttpRegistryClient::new(
                &config.registry.url,
                Duration::from_secs(config.registry.timeout_secs.max(1)),
            )) as Arc<dyn AgentRegistryClient>
        });
        Self {
            transport: Arc::new(HttpTransport::new(Duration::from_secs(
                config.network.request_timeout_secs.max(1),
            ))),
            registry,
            clock: system_clock(),
        }
    }
}

/// The running node.
pub struct AgentKernel {
    config: AgentConfig,
    bridge: Arc<CapabilityBridge>,
    messenger: Arc<A2aMessenger>,
    heartbeat: Arc<HeartbeatMonitor>,
    verifier: Arc<dyn SignatureVerifier>,
    clock: SharedClock,
}

fn validate(config: &AgentConfig) -> KernelResult<()> {
    let id = config.agent_id.trim();
    if id.is_empty() || id == agentlink_wire::messenger::ANY_RECIPIENT {
        return Err(KernelError::InvalidConfig(format!(
            "agent_id '{}' is not a usable identifier",
            config.agent_id
        )));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(KernelError::InvalidConfig(
            "agent_id must not contain whitespace".into(),
        ));
    }
    for backend in &config.backends {
        if backend.url.trim().is_empty() {
            return Err(KernelError::InvalidConfig(format!(
                "backend '{}' has no url",
                backend.namespace
            )));
        }
        if backend.verbs.is_empty() {
            return Err(KernelError::InvalidConfig(format!(
                "backend '{}' exposes no verbs",
                backend.namespace
            )));
        }
    }
    Ok(())
}

/// Enabled namespaces that will actually have handlers, in config order.
fn served_capabilities(config: &AgentConfig) -> Vec<String> {
    let mut served = Vec::new();
    for ns in &config.capabilities {
        if served.contains(ns) {
            continue;
        }
        if KnownCapability::from_namespace(ns).is_none() {
            warn!(namespace = %ns, "Enabled capability is not a known namespace");
        }
        let has_backend = config.backends.iter().any(|b| &b.namespace == ns);
        if ns == orchestration::NAMESPACE || has_backend {
            served.push(ns.clone());
        } else {
            warn!(namespace = %ns, "Capability enabled but no backend configured, not serving it");
        }
    }
    served
}

fn load_identity(config: &AgentConfig) -> KernelResult<Ed25519Signer> {
    let key = config.registry.identity_key.trim();
    if key.is_empty() {
        info!("No identity key configured, generating an ephemeral identity");
        return Ok(Ed25519Signer::generate());
    }
    Ed25519Signer::from_secret_hex(key).map_err(KernelError::Identity)
}

impl AgentKernel {
    /// Boot with HTTP transports built from `config`.
    pub fn boot(config: AgentConfig) -> KernelResult<Self> {
        let parts = KernelParts::from_config(&config);
        Self::boot_with(config, parts)
    }

    /// Boot with explicit outbound dependencies.
    pub fn boot_with(config: AgentConfig, parts: KernelParts) -> KernelResult<Self> {
        validate(&config)?;

        let identity: Arc<Ed25519Signer> = Arc::new(load_identity(&config)?);
        let identifier = identity.identifier();
        info!(agent_id = %config.agent_id, identifier = %identifier, "Booting AgentLink kernel");

        let served = served_capabilities(&config);

        let mut messenger_config = MessengerConfig::from_agent_config(&config);
        messenger_config.capabilities = served.clone();
        let mut messenger = A2aMessenger::new(
            messenger_config,
            parts.transport.clone(),
            parts.registry.clone(),
        )
        .with_clock(parts.clock.clone());
        if !config.security.shared_secret.is_empty() {
            messenger = messenger.with_signer(Arc::new(SharedSecretSigner::new(
                config.agent_id.clone(),
                config.security.shared_secret.clone(),
            )));
        } else if config.agent_id == identifier {
            messenger = messenger.with_signer(identity.clone());
        }
        let messenger = Arc::new(messenger);

        let mut builder = CapabilityBridgeBuilder::new(config.agent_id.clone())
            .clock(parts.clock.clone());
        if served.iter().any(|ns| ns == orchestration::NAMESPACE) {
            builder = orchestration::register(builder, &messenger);
        }
        builder = backends::register(builder, &config.backends, &served, &parts.transport);
        let bridge = Arc::new(builder.build());

        let heartbeat = Arc::new(
            HeartbeatMonitor::new(
                config.agent_id.clone(),
                identity,
                parts.registry,
                parts.transport,
                Duration::from_secs(config.registry.heartbeat_interval_secs.max(1)),
            )
            .with_clock(parts.clock.clone()),
        );

        let verifier: Arc<dyn SignatureVerifier> =
            Arc::new(AgentVerifier::new(&config.security.shared_secret));

        info!(
            capabilities = ?bridge.capabilities(),
            methods = bridge.list_methods().len(),
            "Kernel ready"
        );

        Ok(Self {
            config,
            bridge,
            messenger,
            heartbeat,
            verifier,
            clock: parts.clock,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn agent_id(&self) -> &str {
        &self.config.agent_id
    }

    pub fn bridge(&self) -> &Arc<CapabilityBridge> {
        &self.bridge
    }

    pub fn messenger(&self) -> &Arc<A2aMessenger> {
        &self.messenger
    }

    pub fn heartbeat(&self) -> &Arc<HeartbeatMonitor> {
        &self.heartbeat
    }

    pub fn verifier(&self) -> &Arc<dyn SignatureVerifier> {
        &self.verifier
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Answer an inbound A2A envelope against the local bridge.
    pub async fn handle_a2a(&self, envelope: A2aEnvelope) -> A2aEnvelope {
        self.messenger
            .handle_incoming(envelope, self.bridge.as_ref())
            .await
    }

    /// Announce this agent and its served capabilities to the registry.
    pub async fn register_with_registry(&self) -> LinkResult<RegistryAck> {
        let capabilities = self.bridge.capabilities();
        self.heartbeat
            .register(&self.config.public_endpoint, &capabilities)
            .await
    }

    /// Register (best effort) and start the heartbeat loop.
    pub async fn start_background(&self) {
        if let Err(e) = self.register_with_registry().await {
            warn!(error = %e, "Registry registration failed, continuing without it");
        }
        self.heartbeat.start();
    }

    /// Stop background work.
    pub fn shutdown(&self) {
        info!("Shutting down AgentLink kernel");
        self.heartbeat.stop();
    }
}
