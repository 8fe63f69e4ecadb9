//! Heartbeat Task
//!
//! Keeps an ephemeral registration alive. Failures are logged and the loop
//! carries on; only the stop signal ends it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{RegistrationSpec, ServiceRegistry};

pub struct HeartbeatTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HeartbeatTask {
    pub fn spawn(
        registry: Arc<dyn ServiceRegistry>,
        spec: RegistrationSpec,
        interval: Duration,
    ) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!("Heartbeat started for {} every {:?}", spec.endpoint(), interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match registry.heartbeat(&spec).await {
                            Ok(()) => debug!("Heartbeat sent"),
                            Err(e) => warn!("Heartbeat failed: {}", e),
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("Heartbeat loop exited");
        });

        Self { stop, handle }
    }

    /// Signal the loop and wait up to `timeout`; returns whether it exited in time
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let _ = self.stop.send(true);
        let abort = self.handle.abort_handle();

        match tokio::time::timeout(timeout, self.handle).await {
            Ok(_) => {
                info!("Heartbeat stopped");
                true
            }
            Err(_) => {
                warn!("Heartbeat did not stop within {:?}, aborting", timeout);
                abort.abort();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::registry::testing::RecordingRegistry;
    use crate::types::Result;
    use async_trait::async_trait;

    fn spec() -> RegistrationSpec {
        RegistrationSpec::from_config(&RegistryConfig::default(), 8000)
    }

    #[tokio::test]
    async fn test_beats_until_stopped() {
        let registry = Arc::new(RecordingRegistry::default());
        let task = HeartbeatTask::spawn(registry.clone(), spec(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(task.shutdown(Duration::from_secs(2)).await);

        let beats = registry.count("heartbeat");
        assert!(beats >= 2, "only {} beats", beats);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(registry.count("heartbeat"), beats);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_loop() {
        let registry = Arc::new(RecordingRegistry {
            fail_heartbeats: true,
            ..Default::default()
        });
        let task = HeartbeatTask::spawn(registry.clone(), spec(), Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(registry.count("heartbeat") >= 2);
        assert!(task.shutdown(Duration::from_secs(2)).await);
    }

    struct StuckRegistry;

    #[async_trait]
    impl ServiceRegistry for StuckRegistry {
        async fn register(&self, _spec: &RegistrationSpec) -> Result<()> {
            Ok(())
        }

        async fn heartbeat(&self, _spec: &RegistrationSpec) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn deregister(&self, _spec: &RegistrationSpec) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded() {
        let task = HeartbeatTask::spawn(Arc::new(StuckRegistry), spec(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let start = std::time::Instant::now();
        assert!(!task.shutdown(Duration::from_millis(100)).await);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
