//! chatrelay - Resilient Session-Continuity Proxy
//!
//! An OpenAI-shaped HTTP relay in front of a session-authenticated chat
//! backend that has no stable API. Credentials are short-lived cookie pairs
//! obtained out-of-band; instances behind a load balancer share no memory.
//!
//! ## Core Features
//!
//! - **Circuit Breaker**: severity-aware cool-downs with jitter
//! - **Credential Refresh**: layered supplier with forced re-harvest and one resend
//! - **Session Continuity**: persisted metadata recovery and history preamble replay
//! - **Service Registry**: ephemeral registration with periodic heartbeats
//!
//! ## Quick Start
//!
//! ```ignore
//! use chatrelay::{ConfigLoader, server};
//! use chatrelay::cli::commands::serve::build_orchestrator;
//!
//! let config = ConfigLoader::load()?;
//! let orchestrator = Arc::new(build_orchestrator(&config)?);
//! orchestrator.warm_up().await;
//! let listener = TcpListener::bind(("0.0.0.0", 8000)).await?;
//! server::run(listener, server::AppState { orchestrator, public_base_url: None }).await?;
//! ```
//!
//! ## Modules
//!
//! - [`relay`]: per-request orchestration and wire types
//! - [`resilience`]: circuit breaker and bounded waits
//! - [`credentials`]: credential pair and its source chain
//! - [`session`]: session map and context reconciliation
//! - [`upstream`]: backend seams and the bridge connector
//! - [`storage`]: conversation records and generated media
//! - [`registry`]: service registration and heartbeat
//! - [`server`]: axum routes

pub mod cli;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod registry;
pub mod relay;
pub mod resilience;
pub mod server;
pub mod session;
pub mod storage;
pub mod types;
pub mod upstream;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{
    ErrorClassifier, RelayError, Result, ResultExt, UpstreamError, UpstreamErrorKind,
};
pub use types::ConversationId;

// =============================================================================
// Relay Re-exports
// =============================================================================

pub use credentials::{CredentialPair, CredentialSupplier};
pub use relay::{ChatCompletion, ChatRequest, RequestOrchestrator};
pub use resilience::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState, Severity};
pub use session::{ContextReconciler, SessionManager, SessionOrigin};
pub use upstream::{UpstreamClient, UpstreamConnector, UpstreamSession};
