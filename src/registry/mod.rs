//! Service Registry
//!
//! Instances register as ephemeral members of a named service and keep the
//! entry alive with periodic heartbeats. Registration is optional: without a
//! registry address the relay simply runs unregistered.
//!
//! ## Modules
//!
//! - `nacos`: Nacos open API client
//! - `heartbeat`: cancellable periodic heartbeat task

mod heartbeat;
mod nacos;

pub use heartbeat::HeartbeatTask;
pub use nacos::NacosRegistry;

use std::collections::BTreeMap;
use std::net::UdpSocket;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::constants::registry::REGISTER_MAX_RETRIES;
use crate::types::Result;

/// Instance description sent with every registry call
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSpec {
    pub service_name: String,
    pub namespace: String,
    pub group: String,
    pub ip: String,
    pub port: u16,
    pub metadata: BTreeMap<String, String>,
}

impl RegistrationSpec {
    /// Advertised address: configured external address, else detected, else loopback
    pub fn from_config(config: &RegistryConfig, server_port: u16) -> Self {
        let ip = config
            .external_ip
            .clone()
            .filter(|ip| !ip.trim().is_empty())
            .unwrap_or_else(detect_outbound_ip);

        let metadata = [("version", "1.0"), ("env", "prod"), ("weight", "1.0")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            service_name: config.service_name.clone(),
            namespace: config.namespace.clone(),
            group: config.group.clone(),
            ip,
            port: config.external_port.unwrap_or(server_port),
            metadata,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.service_name, self.ip, self.port)
    }
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register(&self, spec: &RegistrationSpec) -> Result<()>;

    async fn heartbeat(&self, spec: &RegistrationSpec) -> Result<()>;

    async fn deregister(&self, spec: &RegistrationSpec) -> Result<()>;
}

/// Default registration backoff
pub fn register_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(REGISTER_MAX_RETRIES)
}

/// Register with retries; returns whether the instance is registered
pub async fn register_with_retry(
    registry: &dyn ServiceRegistry,
    spec: &RegistrationSpec,
    backoff: ExponentialBuilder,
) -> bool {
    info!("Registering {} with service registry", spec.endpoint());

    let result = (|| async { registry.register(spec).await })
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .notify(|err: &crate::types::RelayError, delay: Duration| {
            warn!("Registration failed, retrying in {:?}: {}", delay, err);
        })
        .await;

    match result {
        Ok(()) => {
            info!("Registered {}", spec.endpoint());
            true
        }
        Err(e) => {
            error!(
                "Registration of {} failed, running unregistered: {}",
                spec.endpoint(),
                e
            );
            false
        }
    }
}

/// Local address of the outbound route (no packets are sent)
pub fn detect_outbound_ip() -> String {
    let detected = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string());

    match detected {
        Ok(ip) => ip,
        Err(e) => {
            debug!("Outbound IP detection failed, using loopback: {}", e);
            "127.0.0.1".to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records calls; fails the first `fail_registers` registrations
    #[derive(Default)]
    pub struct RecordingRegistry {
        pub calls: Mutex<Vec<&'static str>>,
        pub fail_registers: Mutex<usize>,
        pub fail_heartbeats: bool,
    }

    impl RecordingRegistry {
        pub fn count(&self, call: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
        }
    }

    #[async_trait]
    impl ServiceRegistry for RecordingRegistry {
        async fn register(&self, _spec: &RegistrationSpec) -> Result<()> {
            self.calls.lock().unwrap().push("register");
            let mut remaining = self.fail_registers.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(crate::types::RelayError::Registry("unavailable".into()));
            }
            Ok(())
        }

        async fn heartbeat(&self, _spec: &RegistrationSpec) -> Result<()> {
            self.calls.lock().unwrap().push("heartbeat");
            if self.fail_heartbeats {
                return Err(crate::types::RelayError::Registry("beat rejected".into()));
            }
            Ok(())
        }

        async fn deregister(&self, _spec: &RegistrationSpec) -> Result<()> {
            self.calls.lock().unwrap().push("deregister");
            Ok(())
        }
    }
}
