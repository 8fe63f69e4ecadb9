//! Serve Command
//!
//! Wires the collaborators, warms up the upstream client, registers with the
//! service registry and serves HTTP until shutdown.
//!
//! Usage:
//!   chatrelay serve [--host 0.0.0.0] [--port 8000]

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::CredentialSupplier;
use crate::registry::{
    HeartbeatTask, NacosRegistry, RegistrationSpec, ServiceRegistry, register_backoff,
    register_with_retry,
};
use crate::relay::RequestOrchestrator;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, with_timeout};
use crate::server::{self, AppState};
use crate::session::{ContextReconciler, SessionManager};
use crate::storage::{ConversationStore, FileConversationStore, MediaStore};
use crate::upstream::{BridgeConnector, UpstreamConnector};

/// Build the orchestrator and its collaborators from configuration
pub fn build_orchestrator(config: &Config) -> crate::types::Result<RequestOrchestrator> {
    let store: Arc<dyn ConversationStore> =
        Arc::new(FileConversationStore::new(&config.storage.conversations_dir));
    let connector: Arc<dyn UpstreamConnector> = Arc::new(BridgeConnector::new(&config.upstream)?);

    Ok(RequestOrchestrator::new(
        Arc::new(CredentialSupplier::from_config(&config.credentials)),
        Arc::new(CircuitBreaker::new(
            "upstream",
            CircuitBreakerConfig::from(&config.breaker),
        )),
        Arc::new(SessionManager::new(connector, store.clone())),
        store,
        Arc::new(MediaStore::new(&config.storage.images_dir)),
        ContextReconciler::new(config.context.max_history_turns),
    ))
}

struct Registration {
    registry: Arc<dyn ServiceRegistry>,
    spec: RegistrationSpec,
    heartbeat: HeartbeatTask,
}

async fn register(config: &Config) -> Option<Registration> {
    let Some(addr) = config.registry.server_addr.as_deref() else {
        info!("No registry address configured, running unregistered");
        return None;
    };

    let registry: Arc<dyn ServiceRegistry> = match NacosRegistry::new(addr) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            warn!("Service registry disabled: {}", e);
            return None;
        }
    };

    let spec = RegistrationSpec::from_config(&config.registry, config.server.port);
    if !register_with_retry(registry.as_ref(), &spec, register_backoff()).await {
        return None;
    }

    let heartbeat = HeartbeatTask::spawn(
        registry.clone(),
        spec.clone(),
        Duration::from_secs(config.registry.heartbeat_interval_secs),
    );
    Some(Registration {
        registry,
        spec,
        heartbeat,
    })
}

pub async fn run(mut config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    let orchestrator = Arc::new(build_orchestrator(&config)?);
    orchestrator.warm_up().await;

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    let registration = register(&config).await;

    let state = AppState {
        orchestrator,
        public_base_url: config.server.public_base_url.clone(),
    };
    let served = server::run(listener, state).await;

    if let Some(Registration {
        registry,
        spec,
        heartbeat,
    }) = registration
    {
        let grace = Duration::from_secs(config.registry.shutdown_timeout_secs);
        heartbeat.shutdown(grace).await;
        match with_timeout(grace, registry.deregister(&spec), "deregistration").await {
            Ok(()) => info!("Deregistered {}", spec.endpoint()),
            Err(e) => warn!("Deregistration failed: {}", e),
        }
    }

    served
}
