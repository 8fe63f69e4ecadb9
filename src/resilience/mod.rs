//! Resilience Layer
//!
//! Failure-history gating for the upstream backend.
//!
//! ## Modules
//!
//! - `circuit_breaker`: severity-aware breaker with jittered cool-downs
//! - `timeout`: bounded waits for collaborator calls

mod circuit_breaker;
pub mod timeout;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, Severity,
};
pub use timeout::{with_timeout, with_timeout_map};
