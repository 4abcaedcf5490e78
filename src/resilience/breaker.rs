//! Circuit breaker registry
//!
//! Failure counters keyed by `(job_type, error_pattern)`. Once a key reaches
//! the failure threshold its circuit opens and further failures of that kind
//! are not retried until the cooldown has elapsed since the last failure.
//!
//! State is process-local and resets on restart. The orchestrator only sees
//! the [`CircuitBreakerRegistry`] trait, so a shared-store implementation can
//! replace [`InMemoryCircuitBreaker`] without touching it.
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `failure_threshold` | 5 | Consecutive failures before the circuit opens |
//! | `cooldown_secs` | 300 | Seconds after the last failure before half-open |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::models::JobType;

// ============================================================================
// Configuration
// ============================================================================

/// Thresholds shared by every job type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open a circuit
    pub failure_threshold: u32,

    /// Seconds after the last failure before an open circuit half-opens
    pub cooldown_secs: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 300,
        }
    }
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, cooldown_secs: i64) -> Self {
        Self {
            failure_threshold,
            cooldown_secs,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs)
    }
}

// ============================================================================
// Circuit State
// ============================================================================

/// Failure bookkeeping for one `(job_type, pattern)` key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub open: bool,
}

impl CircuitState {
    fn record_failure(&mut self, now: DateTime<Utc>, threshold: u32) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_at = Some(now);
        self.open = self.consecutive_failures >= threshold;
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open = false;
    }

    /// Whether an open circuit has cooled down at `now`
    fn cooled_down(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_failure_at {
            Some(last) => now - last > cooldown,
            None => true,
        }
    }
}

/// Point-in-time view of one circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub job_type: JobType,
    pub pattern: String,
    pub state: CircuitState,
}

// ============================================================================
// Registry Trait
// ============================================================================

/// Failure-counting guard injected into the orchestrator
pub trait CircuitBreakerRegistry: Send + Sync {
    /// Count a failure; returns the state after recording
    fn record_failure(&self, job_type: JobType, pattern: &str) -> CircuitState;

    /// Reset the counter for one key and close its circuit
    fn record_success(&self, job_type: JobType, pattern: &str);

    /// Reset every circuit of a job type
    fn record_success_for_type(&self, job_type: JobType);

    /// Whether the circuit is open. An open circuit whose cooldown has
    /// elapsed is closed and its counter reset as a side effect, letting the
    /// next attempt through.
    fn is_open(&self, job_type: JobType, pattern: &str) -> bool;

    /// All tracked circuits
    fn snapshot(&self) -> Vec<CircuitSnapshot>;
}

// ============================================================================
// In-memory Registry
// ============================================================================

type CircuitKey = (JobType, String);

/// Process-local circuit breaker registry
pub struct InMemoryCircuitBreaker {
    config: BreakerConfig,
    circuits: Mutex<HashMap<CircuitKey, CircuitState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create with a custom clock (for testing)
    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BreakerConfig::default())
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state for a key without the self-healing side effect
    pub fn state(&self, job_type: JobType, pattern: &str) -> Option<CircuitState> {
        self.circuits()
            .get(&(job_type, pattern.to_string()))
            .cloned()
    }

    fn circuits(&self) -> MutexGuard<'_, HashMap<CircuitKey, CircuitState>> {
        // Counters stay meaningful even if a holder panicked
        self.circuits.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryCircuitBreaker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CircuitBreakerRegistry for InMemoryCircuitBreaker {
    fn record_failure(&self, job_type: JobType, pattern: &str) -> CircuitState {
        let now = self.clock.now();
        let mut circuits = self.circuits();
        let state = circuits
            .entry((job_type, pattern.to_string()))
            .or_default();

        let was_open = state.open;
        state.record_failure(now, self.config.failure_threshold);

        if state.open && !was_open {
            tracing::warn!(
                job_type = %job_type,
                pattern = pattern,
                failures = state.consecutive_failures,
                cooldown_secs = self.config.cooldown_secs,
                "Circuit opened"
            );
        }

        state.clone()
    }

    fn record_success(&self, job_type: JobType, pattern: &str) {
        let mut circuits = self.circuits();
        if let Some(state) = circuits.get_mut(&(job_type, pattern.to_string())) {
            state.record_success();
        }
    }

    fn record_success_for_type(&self, job_type: JobType) {
        let mut circuits = self.circuits();
        for ((t, pattern), state) in circuits.iter_mut() {
            if *t == job_type && state.consecutive_failures > 0 {
                tracing::debug!(job_type = %job_type, pattern = %pattern, "Circuit reset after success");
                state.record_success();
            }
        }
    }

    fn is_open(&self, job_type: JobType, pattern: &str) -> bool {
        let now = self.clock.now();
        let mut circuits = self.circuits();

        let Some(state) = circuits.get_mut(&(job_type, pattern.to_string())) else {
            return false;
        };

        if state.open && state.cooled_down(now, self.config.cooldown()) {
            state.record_success();
            tracing::info!(
                job_type = %job_type,
                pattern = pattern,
                "Circuit half-open after cooldown"
            );
        }

        state.open
    }

    fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut snapshot: Vec<_> = self
            .circuits()
            .iter()
            .map(|((job_type, pattern), state)| CircuitSnapshot {
                job_type: *job_type,
                pattern: pattern.clone(),
                state: state.clone(),
            })
            .collect();
        snapshot.sort_by(|a, b| (a.job_type, &a.pattern).cmp(&(b.job_type, &b.pattern)));
        snapshot
    }
}

// ============================================================================
// Tests
// ============================================================================
