//! Layered Credential Supplier
//!
//! Resolution order for `obtain(false)`:
//! 1. Explicit override (config or `SECURE_1PSID`/`SECURE_1PSIDTS` env)
//! 2. Durable cache
//! 3. Live harvest, persisted to the cache on success
//!
//! `obtain(true)` is used after the current pair was rejected, so it goes
//! straight to the harvester.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use super::{CommandHarvester, CredentialCache, CredentialHarvester, CredentialPair, FileCredentialCache};
use crate::config::CredentialsConfig;

pub struct CredentialSupplier {
    override_pair: Option<CredentialPair>,
    cache: Arc<dyn CredentialCache>,
    harvester: Option<Arc<dyn CredentialHarvester>>,
}

impl CredentialSupplier {
    pub fn new(
        override_pair: Option<CredentialPair>,
        cache: Arc<dyn CredentialCache>,
        harvester: Option<Arc<dyn CredentialHarvester>>,
    ) -> Self {
        Self {
            override_pair,
            cache,
            harvester,
        }
    }

    /// File cache plus optional command harvester, as configured
    pub fn from_config(config: &CredentialsConfig) -> Self {
        let override_pair = CredentialPair::from_parts(
            config.primary.as_ref().map(|s| s.expose_secret()),
            config.secondary.as_ref().map(|s| s.expose_secret()),
        );
        let harvester = CommandHarvester::from_config(config)
            .map(|h| Arc::new(h) as Arc<dyn CredentialHarvester>);

        Self::new(
            override_pair,
            Arc::new(FileCredentialCache::new(&config.cache_file)),
            harvester,
        )
    }

    pub fn has_override(&self) -> bool {
        self.override_pair.is_some()
    }

    pub fn has_harvester(&self) -> bool {
        self.harvester.is_some()
    }

    /// Obtain a credential pair; never fails past this boundary
    pub async fn obtain(&self, force_refresh: bool) -> Option<CredentialPair> {
        if !force_refresh {
            if let Some(pair) = &self.override_pair {
                debug!("Using explicit credential override: {}", pair.preview());
                return Some(pair.clone());
            }

            if let Some(pair) = self.cache.read().await {
                info!("Using cached credentials: {}", pair.preview());
                return Some(pair);
            }
        } else {
            info!("Forced credential refresh, bypassing override and cache");
        }

        let Some(harvester) = &self.harvester else {
            warn!("No credential harvester configured; no credentials available");
            return None;
        };

        let Some(pair) = harvester.harvest().await else {
            warn!("Credential harvester '{}' produced nothing", harvester.name());
            return None;
        };

        if let Err(e) = self.cache.write(&pair).await {
            warn!("Failed to persist harvested credentials: {}", e);
        }

        Some(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::testing::{MemoryCache, QueueHarvester};
    use secrecy::SecretString;

    fn supplier(
        override_pair: Option<CredentialPair>,
        cache: Arc<MemoryCache>,
        harvester: Option<Arc<QueueHarvester>>,
    ) -> CredentialSupplier {
        CredentialSupplier::new(
            override_pair,
            cache,
            harvester.map(|h| h as Arc<dyn CredentialHarvester>),
        )
    }

    #[tokio::test]
    async fn test_override_wins() {
        let cache = Arc::new(MemoryCache::seeded("cached", "cached-ts"));
        let harvester = Arc::new(QueueHarvester::with(&[("fresh", "fresh-ts")]));
        let supplier = supplier(
            CredentialPair::new("explicit", "explicit-ts"),
            cache,
            Some(harvester.clone()),
        );

        let pair = supplier.obtain(false).await.unwrap();
        assert_eq!(pair.primary(), "explicit");
        assert_eq!(harvester.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_harvest() {
        let cache = Arc::new(MemoryCache::seeded("cached", "cached-ts"));
        let harvester = Arc::new(QueueHarvester::with(&[("fresh", "fresh-ts")]));
        let supplier = supplier(None, cache, Some(harvester.clone()));

        let pair = supplier.obtain(false).await.unwrap();
        assert_eq!(pair.primary(), "cached");
        assert_eq!(harvester.calls(), 0);
    }

    #[tokio::test]
    async fn test_force_refresh_never_returns_cached_pair() {
        let cache = Arc::new(MemoryCache::seeded("stale", "stale-ts"));
        let harvester = Arc::new(QueueHarvester::with(&[("fresh", "fresh-ts")]));
        let supplier = supplier(
            CredentialPair::new("explicit", "explicit-ts"),
            cache.clone(),
            Some(harvester),
        );

        let pair = supplier.obtain(true).await.unwrap();
        assert_eq!(pair.primary(), "fresh");
        assert_eq!(cache.current().unwrap().primary(), "fresh");
    }

    #[tokio::test]
    async fn test_force_refresh_without_harvest_is_none() {
        let cache = Arc::new(MemoryCache::seeded("stale", "stale-ts"));
        let harvester = Arc::new(QueueHarvester::default());

        assert!(supplier(None, cache.clone(), Some(harvester)).obtain(true).await.is_none());
        assert!(supplier(None, cache, None).obtain(true).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_fatal() {
        let cache = Arc::new(MemoryCache {
            fail_writes: true,
            ..Default::default()
        });
        let harvester = Arc::new(QueueHarvester::with(&[("fresh", "fresh-ts")]));
        let supplier = supplier(None, cache.clone(), Some(harvester));

        let pair = supplier.obtain(false).await.unwrap();
        assert_eq!(pair.secondary(), "fresh-ts");
        assert!(cache.current().is_none());
    }

    #[test]
    fn test_from_config_reads_override() {
        let config = CredentialsConfig {
            primary: Some(SecretString::from("cfg".to_string())),
            secondary: Some(SecretString::from("cfg-ts".to_string())),
            ..Default::default()
        };
        let supplier = CredentialSupplier::from_config(&config);
        assert!(supplier.has_override());
        assert!(!supplier.has_harvester());
    }
}
