//! Request Orchestrator
//!
//! Per-request state machine:
//!
//! ```text
//! admission ─► acquisition ─► reconcile ─► send ─┬─► success ─► persist + media
//!                                                ├─► hard limit ─► CRITICAL, 429
//!                                                ├─► auth ─► refresh ─► resend once
//!                                                └─► other ─► passthrough
//! ```
//!
//! The orchestrator is the only writer of breaker state and the only caller
//! of `SessionManager::replace_client`.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use super::completion::{ChatCompletion, ChatRequest, media_links};
use crate::credentials::CredentialSupplier;
use crate::resilience::{Admission, CircuitBreaker, Severity};
use crate::session::{ContextReconciler, OutboundPayload, SessionManager};
use crate::storage::{ConversationStore, MediaStore};
use crate::types::{ConversationId, RelayError, Result, UpstreamError, UpstreamErrorKind};
use crate::upstream::{UpstreamModel, UpstreamReply, UpstreamSession};

pub struct RequestOrchestrator {
    supplier: Arc<CredentialSupplier>,
    breaker: Arc<CircuitBreaker>,
    sessions: Arc<SessionManager>,
    store: Arc<dyn ConversationStore>,
    media: Arc<MediaStore>,
    reconciler: ContextReconciler,
    refresh_lock: Mutex<()>,
}

impl RequestOrchestrator {
    pub fn new(
        supplier: Arc<CredentialSupplier>,
        breaker: Arc<CircuitBreaker>,
        sessions: Arc<SessionManager>,
        store: Arc<dyn ConversationStore>,
        media: Arc<MediaStore>,
        reconciler: ContextReconciler,
    ) -> Self {
        Self {
            supplier,
            breaker,
            sessions,
            store,
            media,
            reconciler,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn store(&self) -> &dyn ConversationStore {
        self.store.as_ref()
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Best-effort client initialization at startup; breaker untouched
    pub async fn warm_up(&self) -> bool {
        let Some(pair) = self.supplier.obtain(false).await else {
            warn!("Warm-up: no credentials available; first request will retry");
            return false;
        };
        match self.sessions.replace_client(&pair).await {
            Ok(()) => {
                info!("Warm-up: upstream client ready");
                true
            }
            Err(e) => {
                warn!("Warm-up: upstream client init failed: {}", e);
                false
            }
        }
    }

    /// Serve one chat completion request
    #[instrument(
        skip(self, request, base_url),
        fields(model = %request.model, conversation_id = ?request.conversation_id)
    )]
    pub async fn complete(&self, request: ChatRequest, base_url: &str) -> Result<ChatCompletion> {
        request.validate()?;
        let conversation_id = request.conversation_id()?;

        let probing = self.admit().await?;

        let model = UpstreamModel::resolve(&request.model);
        let acquired = match self.sessions.get_or_create(conversation_id, model).await {
            Ok(acquired) => acquired,
            Err(e) => {
                if probing {
                    self.breaker.release_probe();
                }
                return Err(e);
            }
        };
        let payload =
            self.reconciler
                .reconcile(acquired.origin, &request.messages, request.attachments());

        info!(
            conversation_id = %acquired.id,
            origin = ?acquired.origin,
            reconstructed = payload.reconstructed,
            attachments = payload.attachments.len(),
            "Sending to upstream"
        );

        let start = Instant::now();
        let (session, reply) = match acquired.session.send(&payload.text, &payload.attachments).await {
            Ok(reply) => {
                self.breaker.record_success();
                (acquired.session, reply)
            }
            Err(e) => {
                self.handle_failure(&acquired.id, model, &payload, e, start, probing)
                    .await?
            }
        };

        info!(
            conversation_id = %acquired.id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Upstream reply received"
        );

        let content = self.finish(&acquired.id, session.as_ref(), reply, base_url).await;
        Ok(ChatCompletion::new(request.model, acquired.id, content))
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Returns whether this request holds the breaker's single probe
    async fn admit(&self) -> Result<bool> {
        let has_client = self.sessions.has_client().await;
        if has_client && !self.breaker.is_open() {
            return Ok(false);
        }

        let admission = self.breaker.admit();
        match admission {
            Admission::Rejected {
                remaining,
                severity,
            } => {
                warn!(
                    failure_count = self.breaker.failure_count(),
                    severity = %severity,
                    remaining_secs = remaining.as_secs(),
                    "Request rejected: circuit open"
                );
                return Err(RelayError::admission_rejected(
                    remaining,
                    rejection_reason(severity),
                ));
            }
            Admission::Probe if has_client => {
                info!(
                    failure_count = self.breaker.failure_count(),
                    "Cool-down elapsed, probing upstream"
                );
            }
            _ => {}
        }

        let probing = admission == Admission::Probe;
        if !has_client {
            self.initialize().await?;
        }
        Ok(probing && self.breaker.is_open())
    }

    /// Cold start: obtain credentials and build the client
    async fn initialize(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        // Another request may have initialized while we waited
        if self.sessions.has_client().await {
            return Ok(());
        }

        let Some(pair) = self.supplier.obtain(false).await else {
            self.breaker.record_failure(Severity::Normal);
            error!(
                failure_count = self.breaker.failure_count(),
                "Upstream init failed: no credentials available"
            );
            return Err(RelayError::InitializationFailed(
                "no credentials available".into(),
            ));
        };

        if let Err(e) = self.sessions.replace_client(&pair).await {
            self.breaker.record_failure(Severity::Normal);
            error!(
                failure_count = self.breaker.failure_count(),
                "Upstream init failed: {}", e
            );
            return Err(RelayError::InitializationFailed(e.message));
        }

        if self.breaker.clear_unless_critical() {
            info!("Upstream client initialized, failure count cleared");
        }
        Ok(())
    }

    // =========================================================================
    // Failure Handling
    // =========================================================================

    async fn handle_failure(
        &self,
        id: &ConversationId,
        model: UpstreamModel,
        payload: &OutboundPayload,
        err: UpstreamError,
        start: Instant,
        probing: bool,
    ) -> Result<(Arc<dyn UpstreamSession>, UpstreamReply)> {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match err.kind {
            UpstreamErrorKind::HardLimit => {
                self.breaker.record_failure(Severity::Critical);
                let retry_after_secs = self.breaker.config().critical_cooldown.as_secs();
                error!(
                    conversation_id = %id,
                    elapsed_ms,
                    failure_count = self.breaker.failure_count(),
                    "Upstream hard rate limit: {}", err
                );
                Err(RelayError::HardLimited { retry_after_secs })
            }
            UpstreamErrorKind::Auth => {
                warn!(
                    conversation_id = %id,
                    elapsed_ms,
                    "Upstream session rejected, refreshing credentials: {}", err
                );
                self.recover(id, model, payload).await
            }
            UpstreamErrorKind::Other => {
                // Passthrough leaves failure history alone, but the probe slot is freed
                if probing {
                    self.breaker.release_probe();
                }
                error!(conversation_id = %id, elapsed_ms, "Upstream error: {}", err);
                Err(RelayError::Upstream(err))
            }
        }
    }

    /// Refresh credentials, rebuild the session and resend once
    async fn recover(
        &self,
        id: &ConversationId,
        model: UpstreamModel,
        payload: &OutboundPayload,
    ) -> Result<(Arc<dyn UpstreamSession>, UpstreamReply)> {
        let session = match self.refresh(id, model).await {
            Ok(session) => session,
            Err(message) => return Err(self.auth_exhausted(id, message)),
        };

        match session.send(&payload.text, &payload.attachments).await {
            Ok(reply) => {
                self.breaker.record_success();
                info!(conversation_id = %id, "Resend after credential refresh succeeded");
                Ok((session, reply))
            }
            Err(e) => Err(self.auth_exhausted(id, e.message)),
        }
    }

    async fn refresh(
        &self,
        id: &ConversationId,
        model: UpstreamModel,
    ) -> std::result::Result<Arc<dyn UpstreamSession>, String> {
        let _guard = self.refresh_lock.lock().await;

        let pair = self
            .supplier
            .obtain(true)
            .await
            .ok_or_else(|| "credential refresh produced no credentials".to_string())?;
        self.sessions
            .replace_client(&pair)
            .await
            .map_err(|e| e.message)?;
        self.sessions
            .rederive(id, model)
            .await
            .map_err(|e| e.to_string())
    }

    fn auth_exhausted(&self, id: &ConversationId, message: String) -> RelayError {
        self.breaker.record_failure(Severity::Normal);
        let failure_count = self.breaker.failure_count();
        error!(
            conversation_id = %id,
            failure_count,
            "Credential recovery failed: {}", message
        );
        RelayError::AuthExhausted {
            failure_count,
            message,
        }
    }

    // =========================================================================
    // Success Path
    // =========================================================================

    /// Persist metadata and store media; returns the assistant content
    async fn finish(
        &self,
        id: &ConversationId,
        session: &dyn UpstreamSession,
        reply: UpstreamReply,
        base_url: &str,
    ) -> String {
        if let Some(metadata) = session.metadata().or(reply.metadata)
            && let Err(e) = self.store.put(id, &metadata).await
        {
            error!(conversation_id = %id, "Failed to persist conversation metadata: {}", e);
        }

        let mut content = reply.text;
        if reply.media.is_empty() {
            return content;
        }

        // Links keep the upstream numbering even when a save fails
        let mut stored = Vec::with_capacity(reply.media.len());
        for (idx, item) in reply.media.iter().enumerate() {
            match self.media.save(&item.bytes).await {
                Ok(relative) => stored.push((idx + 1, relative)),
                Err(e) => warn!(conversation_id = %id, "Failed to store generated image: {}", e),
            }
        }
        info!(conversation_id = %id, images = stored.len(), "Stored generated images");
        content.push_str(&media_links(base_url, &stored));
        content
    }
}

fn rejection_reason(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Upstream hard rate limit (429) protection",
        Severity::Normal => "Authentication failure protection",
    }
}
