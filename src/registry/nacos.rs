//! Nacos Open API Client
//!
//! Ephemeral instance lifecycle over the v1 naming API:
//! - register:   `POST   /nacos/v1/ns/instance`
//! - heartbeat:  `PUT    /nacos/v1/ns/instance/beat`
//! - deregister: `DELETE /nacos/v1/ns/instance`

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{RegistrationSpec, ServiceRegistry};
use crate::constants::network::REGISTRY_TIMEOUT_SECS;
use crate::types::{RelayError, Result};

const INSTANCE_PATH: &str = "/nacos/v1/ns/instance";
const BEAT_PATH: &str = "/nacos/v1/ns/instance/beat";

pub struct NacosRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl NacosRegistry {
    /// Accepts `host:port` or a full URL
    pub fn new(server_addr: &str) -> Result<Self> {
        let addr = server_addr.trim().trim_end_matches('/');
        let base_url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };
        url::Url::parse(&base_url).map_err(|e| {
            RelayError::Config(format!("Invalid registry address '{}': {}", server_addr, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REGISTRY_TIMEOUT_SECS))
            .build()
            .map_err(|e| RelayError::Registry(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn identity(spec: &RegistrationSpec) -> Vec<(&'static str, String)> {
        vec![
            ("serviceName", spec.service_name.clone()),
            ("groupName", spec.group.clone()),
            ("namespaceId", spec.namespace.clone()),
            ("ip", spec.ip.clone()),
            ("port", spec.port.to_string()),
            ("ephemeral", "true".to_string()),
        ]
    }

    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&'static str, String)],
        operation: &str,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .request(method, &url)
            .query(query)
            .send()
            .await
            .map_err(|e| RelayError::Registry(format!("{} request failed: {}", operation, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Registry(format!(
                "{} rejected ({}): {}",
                operation,
                status,
                body.trim()
            )));
        }
        debug!("Registry {} ok", operation);
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for NacosRegistry {
    async fn register(&self, spec: &RegistrationSpec) -> Result<()> {
        let mut query = Self::identity(spec);
        query.push(("metadata", serde_json::to_string(&spec.metadata)?));
        query.push(("weight", "1.0".to_string()));
        query.push(("healthy", "true".to_string()));
        query.push(("enabled", "true".to_string()));
        self.call(reqwest::Method::POST, INSTANCE_PATH, &query, "register")
            .await
    }

    async fn heartbeat(&self, spec: &RegistrationSpec) -> Result<()> {
        let beat = serde_json::json!({
            "serviceName": format!("{}@@{}", spec.group, spec.service_name),
            "ip": spec.ip,
            "port": spec.port,
            "cluster": "DEFAULT",
            "scheduled": true,
            "metadata": spec.metadata,
        });
        let mut query = Self::identity(spec);
        query.push(("beat", beat.to_string()));
        self.call(reqwest::Method::PUT, BEAT_PATH, &query, "heartbeat")
            .await
    }

    async fn deregister(&self, spec: &RegistrationSpec) -> Result<()> {
        let query = Self::identity(spec);
        self.call(reqwest::Method::DELETE, INSTANCE_PATH, &query, "deregister")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec() -> RegistrationSpec {
        let config = RegistryConfig {
            external_ip: Some("10.1.2.3".into()),
            ..Default::default()
        };
        RegistrationSpec::from_config(&config, 8000)
    }

    #[test]
    fn test_accepts_bare_host_port() {
        let registry = NacosRegistry::new("nacos:8848").unwrap();
        assert_eq!(registry.base_url(), "http://nacos:8848");

        let registry = NacosRegistry::new("https://nacos.internal/").unwrap();
        assert_eq!(registry.base_url(), "https://nacos.internal");
    }

    #[tokio::test]
    async fn test_instance_lifecycle() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(INSTANCE_PATH))
            .and(query_param("serviceName", "gemini-service"))
            .and(query_param("ip", "10.1.2.3"))
            .and(query_param("port", "8000"))
            .and(query_param("groupName", "DEFAULT_GROUP"))
            .and(query_param("ephemeral", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(BEAT_PATH))
            .and(query_param("serviceName", "gemini-service"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"clientBeatInterval":5000}"#))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(INSTANCE_PATH))
            .and(query_param("ip", "10.1.2.3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let registry = NacosRegistry::new(&server.uri()).unwrap();
        let spec = spec();
        registry.register(&spec).await.unwrap();
        registry.heartbeat(&spec).await.unwrap();
        registry.deregister(&spec).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejection_is_registry_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(INSTANCE_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("namespace missing"))
            .mount(&server)
            .await;

        let registry = NacosRegistry::new(&server.uri()).unwrap();
        let err = registry.register(&spec()).await.unwrap_err();
        assert!(matches!(err, RelayError::Registry(ref m) if m.contains("namespace missing")));
    }
}
