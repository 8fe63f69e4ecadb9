//! Bridge Connector
//!
//! Talks JSON over HTTP to a sidecar that hosts the actual backend library:
//!
//! - `POST {bridge}/v1/init {secure_1psid, secure_1psidts}` validates a pair
//! - `POST {bridge}/v1/send {secure_1psid, secure_1psidts, model, metadata?, text, files[]}`
//!   returns `{text, metadata, images: [{data: <base64>}]}`
//!
//! Non-2xx statuses are classified by status first, then by body text.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    GeneratedMedia, UpstreamClient, UpstreamConnector, UpstreamModel, UpstreamReply,
    UpstreamSession,
};
use crate::config::UpstreamConfig;
use crate::credentials::CredentialPair;
use crate::types::{ErrorClassifier, RelayError, Result, UpstreamError};

/// Connector for the upstream bridge sidecar
pub struct BridgeConnector {
    base_url: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for BridgeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConnector")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl BridgeConnector {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let parsed = url::Url::parse(&config.bridge_url).map_err(|e| {
            RelayError::Config(format!("Invalid bridge URL '{}': {}", config.bridge_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RelayError::Config(format!(
                "Bridge URL must be http(s): {}",
                config.bridge_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl UpstreamConnector for BridgeConnector {
    async fn connect(
        &self,
        pair: &CredentialPair,
    ) -> std::result::Result<Arc<dyn UpstreamClient>, UpstreamError> {
        let shared = Arc::new(BridgeShared {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            pair: pair.clone(),
        });

        let request = InitRequest {
            secure_1psid: pair.primary(),
            secure_1psidts: pair.secondary(),
        };
        shared.post::<_, Value>("/v1/init", &request).await?;

        info!("Upstream client initialized: {}", pair.preview());
        Ok(Arc::new(BridgeClient { shared }))
    }
}

// =============================================================================
// Transport
// =============================================================================

struct BridgeShared {
    base_url: String,
    http: reqwest::Client,
    pair: CredentialPair,
}

impl BridgeShared {
    async fn post<B, T>(&self, route: &str, body: &B) -> std::result::Result<T, UpstreamError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, route);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body, status.as_u16());
            return Err(ErrorClassifier::classify_http_status(status.as_u16(), &message));
        }

        response.json::<T>().await.map_err(|e| {
            UpstreamError::other(format!("Failed to parse bridge response: {}", e))
        })
    }
}

/// Full error chain text; reqwest's Display omits the io cause (resets, EOF)
fn transport_error(err: &reqwest::Error) -> UpstreamError {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    if err.is_timeout() {
        return UpstreamError::other(message);
    }
    ErrorClassifier::classify(&message)
}

/// Prefer a `detail` or `error` field from a JSON error body
fn error_message(body: &str, status: u16) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["detail", "error", "message"]
            .iter()
            .find_map(|key| v.get(*key).and_then(|d| d.as_str()).map(str::to_string))
    });
    match detail {
        Some(detail) => format!("Bridge error ({}): {}", status, detail),
        None if body.trim().is_empty() => format!("Bridge error ({})", status),
        None => format!("Bridge error ({}): {}", status, body.trim()),
    }
}

// =============================================================================
// Client & Session
// =============================================================================

struct BridgeClient {
    shared: Arc<BridgeShared>,
}

impl UpstreamClient for BridgeClient {
    fn start_session(
        &self,
        metadata: Option<Value>,
        model: UpstreamModel,
    ) -> Arc<dyn UpstreamSession> {
        Arc::new(BridgeSession {
            shared: self.shared.clone(),
            model,
            metadata: RwLock::new(metadata),
        })
    }

    fn credential_preview(&self) -> String {
        self.shared.pair.preview()
    }
}

struct BridgeSession {
    shared: Arc<BridgeShared>,
    model: UpstreamModel,
    metadata: RwLock<Option<Value>>,
}

#[async_trait]
impl UpstreamSession for BridgeSession {
    async fn send(
        &self,
        text: &str,
        attachments: &[String],
    ) -> std::result::Result<UpstreamReply, UpstreamError> {
        let metadata = self.metadata();
        let request = SendRequest {
            secure_1psid: self.shared.pair.primary(),
            secure_1psidts: self.shared.pair.secondary(),
            model: self.model,
            metadata: metadata.as_ref(),
            text,
            files: attachments,
        };

        let start = Instant::now();
        let response: SendResponse = self.shared.post("/v1/send", &request).await?;
        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            images = response.images.len(),
            "Bridge reply received"
        );

        let media = response
            .images
            .into_iter()
            .filter_map(|image| match BASE64.decode(image.data.as_bytes()) {
                Ok(bytes) => Some(GeneratedMedia { bytes }),
                Err(e) => {
                    warn!("Dropping undecodable image from bridge: {}", e);
                    None
                }
            })
            .collect();

        if let Some(updated) = &response.metadata {
            *self
                .metadata
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(updated.clone());
        }

        Ok(UpstreamReply {
            text: response.text.unwrap_or_default(),
            media,
            metadata: response.metadata,
        })
    }

    fn metadata(&self) -> Option<Value> {
        self.metadata
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

// Request/Response types

#[derive(Serialize)]
struct InitRequest<'a> {
    secure_1psid: &'a str,
    secure_1psidts: &'a str,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    secure_1psid: &'a str,
    secure_1psidts: &'a str,
    model: UpstreamModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Value>,
    text: &'a str,
    files: &'a [String],
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    images: Vec<ImagePayload>,
}

#[derive(Deserialize)]
struct ImagePayload {
    data: String,
}
