//! Job state machine
//!
//! ```text
//!            claim                success
//! pending ──────────▶ processing ─────────▶ completed
//!    ▲                  │   │
//!    │ (re-claim after  │   │ non_retryable | circuit_open
//!    │  scheduled_at)   │   │ | retryable with attempts >= max
//!  retry ◀──────────────┘   └─────────────▶ failed
//!        retryable, attempts < max
//! ```
//!
//! Transitions are plain functions over [`JobRecord`] so that the rules can
//! be exercised without a store. The claim itself happens in the store; the
//! functions here only apply the in-memory side of each transition.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::{ExecutionOutcome, JobRecord, JobStatus};
use crate::resilience::Classification;

/// Rejected transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot {action} job {job_id} in status '{status}'")]
    InvalidState {
        job_id: String,
        status: JobStatus,
        action: &'static str,
    },

    #[error("Job {job_id} has exhausted its {max_attempts} attempts")]
    AttemptsExhausted { job_id: String, max_attempts: u32 },
}

fn invalid(job: &JobRecord, action: &'static str) -> TransitionError {
    TransitionError::InvalidState {
        job_id: job.id.clone(),
        status: job.status,
        action,
    }
}

/// Start an execution attempt on a job the caller has just claimed.
///
/// Accepts `pending`/`retry` (the local copy fetched before the claim) or
/// `processing` (the store's view after the claim).
pub fn begin_attempt(job: &mut JobRecord, now: DateTime<Utc>) -> Result<(), TransitionError> {
    if !(job.status.is_claimable() || job.status == JobStatus::Processing) {
        return Err(invalid(job, "start"));
    }
    if job.attempts >= job.max_attempts {
        return Err(TransitionError::AttemptsExhausted {
            job_id: job.id.clone(),
            max_attempts: job.max_attempts,
        });
    }

    job.status = JobStatus::Processing;
    job.attempts += 1;
    job.started_at = Some(now);
    job.completed_at = None;
    Ok(())
}

/// `processing --success--> completed`
pub fn complete(
    job: &mut JobRecord,
    result: Value,
    now: DateTime<Utc>,
) -> Result<ExecutionOutcome, TransitionError> {
    if job.status != JobStatus::Processing {
        return Err(invalid(job, "complete"));
    }

    job.status = JobStatus::Completed;
    job.result = Some(result);
    job.error = None;
    job.completed_at = Some(now);
    Ok(ExecutionOutcome::Succeeded)
}

/// Apply a classified failure to a processing job
pub fn fail(
    job: &mut JobRecord,
    error: impl Into<String>,
    classification: Classification,
    now: DateTime<Utc>,
) -> Result<ExecutionOutcome, TransitionError> {
    if job.status != JobStatus::Processing {
        return Err(invalid(job, "fail"));
    }

    job.error = Some(error.into());

    // An instant past chrono's range fails the job instead of retrying it
    let retry_at = match classification {
        Classification::Retryable { delay } if job.attempts < job.max_attempts => {
            now.checked_add_signed(delay)
        }
        _ => None,
    };

    let outcome = match (classification, retry_at) {
        (_, Some(at)) => {
            job.status = JobStatus::Retry;
            job.scheduled_at = at;
            ExecutionOutcome::Retrying
        }
        (Classification::CircuitOpen, None) => {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            ExecutionOutcome::CircuitOpen
        }
        (_, None) => {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            ExecutionOutcome::Failed
        }
    };

    Ok(outcome)
}

/// Terminal failure for a job that cannot be started at all
pub fn abandon(job: &mut JobRecord, reason: impl Into<String>, now: DateTime<Utc>) {
    job.status = JobStatus::Failed;
    job.error = Some(reason.into());
    job.completed_at = Some(now);
}
