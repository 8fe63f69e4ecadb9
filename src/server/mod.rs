//! HTTP Surface
//!
//! axum router over the orchestrator and the storage collaborators.
//! Graceful shutdown on Ctrl+C (SIGINT) and SIGTERM (Unix); in-flight
//! requests complete before `run` returns.

mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::relay::RequestOrchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RequestOrchestrator>,
    /// Base for media links; the request Host header is used when unset
    pub public_base_url: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/conversations", get(handlers::list_conversations))
        .route(
            "/conversations/{id}",
            get(handlers::get_conversation).delete(handlers::delete_conversation),
        )
        .route("/images/{year_month}/{date}/{file}", get(handlers::get_image))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serve until a shutdown signal arrives
pub async fn run(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("chatrelay listening on {} (Ctrl+C/SIGTERM to stop)", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM, Ctrl+C only: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received");
}
