//! Failure handling for job executions
//!
//! - [`classifier`] - Decides retryable / non-retryable / circuit-open
//! - [`breaker`] - Per `(job_type, error_pattern)` circuit breakers
//! - [`backoff`] - Exponential delay used for durable retry scheduling

pub mod backoff;
pub mod breaker;
pub mod classifier;

pub use backoff::{RetryPolicy, MAX_RETRY_DELAY_SECS};
pub use breaker::{
    BreakerConfig, CircuitBreakerRegistry, CircuitSnapshot, CircuitState, InMemoryCircuitBreaker,
};
pub use classifier::{
    extract_pattern, is_transient, Classification, ClassifiedError, ErrorClassifier, Signature,
};
