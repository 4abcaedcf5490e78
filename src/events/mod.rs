//! Lifecycle events emitted during a run
//!
//! The orchestrator reports batch boundaries and per-job outcomes to an
//! [`EventSink`]. Delivery is fire-and-forget: a failing sink is logged and
//! never affects job processing.

pub mod sinks;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ExecutionOutcome, JobRecord, JobType, PriorityTier};

pub use sinks::{BroadcastEventSink, FanoutEventSink, MetricsEventSink, TracingEventSink};

/// Result type for sink operations
pub type EventResult<T> = Result<T, EventError>;

/// Errors a sink may report
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Downstream receiver went away
    #[error("Event channel closed")]
    Closed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("Event sink error: {0}")]
    Other(String),
}

// ============================================================================
// Events
// ============================================================================

/// One lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    BatchStarted {
        tier: PriorityTier,
        batch: usize,
        size: usize,
        at: DateTime<Utc>,
    },

    BatchCompleted {
        tier: PriorityTier,
        batch: usize,
        size: usize,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    JobStarted {
        job_id: String,
        tenant_id: String,
        job_type: JobType,
        attempt: u32,
        at: DateTime<Utc>,
    },

    JobCompleted {
        job_id: String,
        tenant_id: String,
        job_type: JobType,
        attempt: u32,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    JobFailed {
        job_id: String,
        tenant_id: String,
        job_type: JobType,
        attempt: u32,
        outcome: ExecutionOutcome,
        error: String,
        /// Set when the job was rescheduled
        retry_at: Option<DateTime<Utc>>,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_started(job: &JobRecord, at: DateTime<Utc>) -> Self {
        Self::JobStarted {
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            job_type: job.job_type,
            attempt: job.attempts,
            at,
        }
    }

    pub fn job_completed(job: &JobRecord, duration_ms: u64, at: DateTime<Utc>) -> Self {
        Self::JobCompleted {
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            job_type: job.job_type,
            attempt: job.attempts,
            duration_ms,
            at,
        }
    }

    pub fn job_failed(
        job: &JobRecord,
        outcome: ExecutionOutcome,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) -> Self {
        let retry_at = (outcome == ExecutionOutcome::Retrying).then_some(job.scheduled_at);
        Self::JobFailed {
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            job_type: job.job_type,
            attempt: job.attempts,
            outcome,
            error: job.error.clone().unwrap_or_default(),
            retry_at,
            duration_ms,
            at,
        }
    }

    /// Short event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchStarted { .. } => "batch_started",
            Self::BatchCompleted { .. } => "batch_completed",
            Self::JobStarted { .. } => "job_started",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
        }
    }

    /// Job id for job-level events
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}

// ============================================================================
// Sink Trait
// ============================================================================

/// Receiver of lifecycle events
///
/// Implement this trait to forward events to an external system.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Get the sink name
    fn name(&self) -> &str;

    /// Deliver one event
    async fn emit(&self, event: &JobEvent) -> EventResult<()>;
}

/// Deliver an event, logging and swallowing sink errors
pub async fn publish(sink: &dyn EventSink, event: JobEvent) {
    if let Err(e) = sink.emit(&event).await {
        tracing::warn!(
            sink = sink.name(),
            event = event.name(),
            error = %e,
            "Failed to deliver event"
        );
    }
}
