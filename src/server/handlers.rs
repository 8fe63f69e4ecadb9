//! Route Handlers
//!
//! Errors render as `{"detail": "...", "code": "<kind>"}` with the status from
//! `RelayError::status_code`, plus `Retry-After` when a wait hint exists.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::error;

use super::AppState;
use crate::relay::{ChatCompletion, ChatRequest};
use crate::types::{ConversationId, RelayError, Result};
use crate::upstream::MODEL_CATALOGUE;

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() && !matches!(self, RelayError::AdmissionRejected { .. }) {
            error!(code = self.code(), "Request failed: {}", self);
        }

        let retry_after = self.retry_after_secs();
        let body = Json(json!({ "detail": self.to_string(), "code": self.code() }));
        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

/// Scheme and authority for media links
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let scheme = header_str("x-forwarded-proto").unwrap_or("http");
    let host = header_str(header::HOST.as_str()).unwrap_or("localhost");
    format!("{}://{}", scheme, host)
}

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatCompletion>> {
    let base = base_url(&state, &headers);
    let completion = state.orchestrator.complete(request, &base).await?;
    Ok(Json(completion))
}

pub async fn list_models() -> Json<Value> {
    let data: Vec<Value> = MODEL_CATALOGUE
        .iter()
        .map(|(name, _)| json!({ "id": name, "object": "model", "owned_by": "google" }))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

pub async fn list_conversations(State(state): State<AppState>) -> Result<Json<Value>> {
    let conversations = state.orchestrator.store().list().await?;
    Ok(Json(json!({
        "total": conversations.len(),
        "conversations": conversations,
    })))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id = ConversationId::parse(id)?;
    let metadata = state
        .orchestrator
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| RelayError::NotFound("Conversation".into()))?;
    Ok(Json(json!({ "conversation_id": id, "metadata": metadata })))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id = ConversationId::parse(id)?;
    state.orchestrator.sessions().forget(&id);
    if !state.orchestrator.store().delete(&id).await? {
        return Err(RelayError::NotFound("Conversation".into()));
    }
    Ok(Json(json!({ "message": "Conversation deleted" })))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path((year_month, date, file)): Path<(String, String, String)>,
) -> Result<Response> {
    let path = state
        .orchestrator
        .media()
        .resolve(&year_month, &date, &file)
        .await?;
    let bytes = tokio::fs::read(&path).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

pub async fn health(State(state): State<AppState>) -> Result<Json<Value>> {
    let orchestrator = &state.orchestrator;
    let total_images = orchestrator.media().count().await?;
    let total_conversations = orchestrator.store().list().await?.len();

    Ok(Json(json!({
        "status": "ok",
        "storage": { "total_images": total_images },
        "conversations": {
            "total": total_conversations,
            "active_in_memory": orchestrator.sessions().active_count(),
        },
        "upstream": { "client_ready": orchestrator.sessions().has_client().await },
        "circuit_breaker": orchestrator.breaker().stats(),
    })))
}
