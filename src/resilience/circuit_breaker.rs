//! Circuit Breaker Pattern for Upstream Resilience
//!
//! Stops calling the upstream backend once failures accumulate, so an
//! eroded session or a rate-limited account is not hammered further.
//!
//! ## States
//!
//! - **Closed**: Normal operation, requests flow through
//! - **Open**: Consecutive failures reached the threshold; requests are
//!   rejected until the cool-down elapses, after which a single probe is
//!   admitted. Everyone else keeps being rejected while the probe is out.
//!
//! ## Transitions
//!
//! ```text
//! Closed --[failure_threshold reached]--> Open
//! Open   --[cool-down elapsed]----------> Open (one probe admitted)
//! Open   --[probe failure]--------------> Open (cool-down restarts)
//! Open   --[success]--------------------> Closed
//! ```
//!
//! ## Severity
//!
//! A hard rate limit marks the breaker CRITICAL. CRITICAL pins the failure
//! counter at the threshold, selects the long cool-down and survives later
//! NORMAL failures; only a success clears it.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

use crate::config::BreakerConfig;
use crate::constants::circuit_breaker as cb_constants;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests flow through
    Closed,
    /// Upstream is failing - requests rejected until cool-down elapses
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
        }
    }
}

/// Severity of the failure that most recently tripped the circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Normal,
    /// Hard rate limit from upstream
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Cool-down after NORMAL failures
    pub normal_cooldown: Duration,
    /// Cool-down after a CRITICAL failure
    pub critical_cooldown: Duration,
    /// Exclusive upper bound of the random jitter added to each cool-down
    pub jitter_max: Duration,
    /// Longest a probe may hold the gate before another one is let through
    pub probe_lease: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: cb_constants::FAILURE_THRESHOLD,
            normal_cooldown: Duration::from_secs(cb_constants::NORMAL_COOLDOWN_SECS),
            critical_cooldown: Duration::from_secs(cb_constants::CRITICAL_COOLDOWN_SECS),
            jitter_max: Duration::from_secs(cb_constants::JITTER_SECS),
            probe_lease: Duration::from_secs(cb_constants::PROBE_LEASE_SECS),
        }
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            normal_cooldown: Duration::from_secs(config.normal_cooldown_secs),
            critical_cooldown: Duration::from_secs(config.critical_cooldown_secs),
            jitter_max: Duration::from_secs(config.jitter_secs),
            probe_lease: Duration::from_secs(config.probe_lease_secs),
        }
    }
}

impl CircuitBreakerConfig {
    /// Base cool-down for a severity, before jitter
    pub fn base_cooldown(&self, severity: Severity) -> Duration {
        match severity {
            Severity::Normal => self.normal_cooldown,
            Severity::Critical => self.critical_cooldown,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed
    Allowed,
    /// Circuit open but cool-down elapsed; this caller holds the single probe
    Probe,
    /// Circuit open and cooling down
    Rejected {
        remaining: Duration,
        severity: Severity,
    },
}

impl Admission {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Unified internal state - all mutable state in single struct
/// to ensure atomicity of state transitions
#[derive(Debug)]
struct CircuitBreakerInner {
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    severity: Severity,
    blocked_count: u64,
    probe_started_at: Option<Instant>,
}

impl CircuitBreakerInner {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_at: None,
            severity: Severity::Normal,
            blocked_count: 0,
            probe_started_at: None,
        }
    }
}

/// Thread-safe circuit breaker with unified state management.
///
/// All state is protected by a single RwLock to ensure consistency
/// between failure counts and state transitions. The lock is never held
/// across an await point.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    name: String,
    inner: RwLock<CircuitBreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            name: name.into(),
            inner: RwLock::new(CircuitBreakerInner::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.state_of(&inner)
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .consecutive_failures
    }

    pub fn severity(&self) -> Severity {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .severity
    }

    /// Check if a request may reach the upstream.
    ///
    /// An elapsed cool-down admits one probe without closing the circuit;
    /// only `record_success` does that. Until the probe reports an outcome
    /// (or calls `release_probe`), further callers are rejected.
    pub fn admit(&self) -> Admission {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.state_of(&inner) == CircuitState::Closed {
            return Admission::Allowed;
        }

        if let Some(started) = inner.probe_started_at {
            if started.elapsed() < self.config.probe_lease {
                inner.blocked_count += 1;
                tracing::debug!(
                    "Circuit breaker [{}]: Request blocked (probe in flight)",
                    self.name
                );
                // The probe outcome decides; callers only need to back off briefly
                return Admission::Rejected {
                    remaining: PROBE_RETRY_HINT,
                    severity: inner.severity,
                };
            }
            tracing::warn!(
                "Circuit breaker [{}]: Probe lease expired without an outcome",
                self.name
            );
            inner.probe_started_at = None;
        }

        let elapsed = inner
            .last_failure_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::MAX);
        let jitter = random_jitter(self.config.jitter_max);
        let admission = self.evaluate(inner.severity, elapsed, jitter);

        match admission {
            Admission::Rejected { remaining, .. } => {
                inner.blocked_count += 1;
                tracing::debug!(
                    "Circuit breaker [{}]: Request blocked (circuit OPEN, {}s remaining)",
                    self.name,
                    remaining.as_secs()
                );
            }
            Admission::Probe => {
                inner.probe_started_at = Some(Instant::now());
                tracing::info!(
                    "Circuit breaker [{}]: Cool-down elapsed, admitting probe (failures={}, severity={})",
                    self.name,
                    inner.consecutive_failures,
                    inner.severity
                );
            }
            Admission::Allowed => {}
        }

        admission
    }

    /// Give up a probe without recording an outcome
    pub fn release_probe(&self) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.probe_started_at.take().is_some() {
            tracing::debug!("Circuit breaker [{}]: Probe released", self.name);
        }
    }

    /// Decide admission for an open circuit given elapsed time and a jitter draw
    pub(crate) fn evaluate(&self, severity: Severity, elapsed: Duration, jitter: Duration) -> Admission {
        let cooldown = self.config.base_cooldown(severity) + jitter;
        if elapsed < cooldown {
            Admission::Rejected {
                remaining: cooldown - elapsed,
                severity,
            }
        } else {
            Admission::Probe
        }
    }

    /// Record a successful request
    pub fn record_success(&self) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if inner.consecutive_failures > 0 || inner.severity == Severity::Critical {
            tracing::info!(
                "Circuit breaker [{}]: Closed (upstream recovered after {} failures)",
                self.name,
                inner.consecutive_failures
            );
        }

        inner.consecutive_failures = 0;
        inner.severity = Severity::Normal;
        inner.probe_started_at = None;
    }

    /// Record a failed request
    pub fn record_failure(&self, severity: Severity) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let was_open = self.state_of(&inner) == CircuitState::Open;

        if severity == Severity::Critical || inner.severity == Severity::Critical {
            // Sticky: pinned at the threshold until a success
            inner.severity = Severity::Critical;
            inner.consecutive_failures = self.config.failure_threshold;
        } else {
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        }
        inner.last_failure_at = Some(Instant::now());
        inner.probe_started_at = None;

        if !was_open && self.state_of(&inner) == CircuitState::Open {
            tracing::warn!(
                "Circuit breaker [{}]: Opened after {} failures (severity: {}, cool-down: {:?} + jitter)",
                self.name,
                inner.consecutive_failures,
                inner.severity,
                self.config.base_cooldown(inner.severity)
            );
        }
    }

    /// Clear the failure count after a successful cold-start initialization.
    ///
    /// A CRITICAL lock is left untouched. Returns whether the count was cleared.
    pub fn clear_unless_critical(&self) -> bool {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if inner.severity == Severity::Critical {
            return false;
        }
        inner.consecutive_failures = 0;
        inner.probe_started_at = None;
        true
    }

    /// Get statistics for monitoring
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        CircuitBreakerStats {
            name: self.name.clone(),
            state: self.state_of(&inner),
            consecutive_failures: inner.consecutive_failures,
            severity: inner.severity,
            blocked_count: inner.blocked_count,
            since_last_failure_secs: inner.last_failure_at.map(|t| t.elapsed().as_secs()),
            probe_in_flight: inner.probe_started_at.is_some(),
        }
    }

    fn state_of(&self, inner: &CircuitBreakerInner) -> CircuitState {
        if inner.consecutive_failures >= self.config.failure_threshold {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }
}

const PROBE_RETRY_HINT: Duration = Duration::from_secs(1);

/// Draw a jitter in `[0, max)` using the thread-local RNG
fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

/// Statistics for monitoring circuit breaker state
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub severity: Severity,
    pub blocked_count: u64,
    pub since_last_failure_secs: Option<u64>,
    pub probe_in_flight: bool,
}
