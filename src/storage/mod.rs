//! Job record storage
//!
//! The orchestration core talks to persistent job state only through the
//! [`JobStore`] trait, which keeps business logic decoupled from the backing
//! store:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Orchestrator / Dependency Resolver               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     JobStore trait                          │
//! │   fetch_candidate_jobs · claim · persist · append_execution │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                             │
//!                 ▼                             ▼
//!        ┌─────────────────┐           ┌─────────────────┐
//!        │     SQLite      │           │    In-memory    │
//!        │ SqliteJobStore  │           │ MemoryJobStore  │
//!        └─────────────────┘           └─────────────────┘
//! ```
//!
//! # Claim contract
//!
//! [`JobStore::claim`] must be an atomic compare-and-swap
//! (`pending | retry -> processing`) against the caller's fetched snapshot:
//! same status, same attempt count, and due at the claim instant. A run
//! holding a stale snapshot of a job another run already executed loses
//! the claim.
//! The orchestrator holds no locks of its own; "at most one worker per job"
//! rests entirely on this primitive.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{ExecutionRecord, JobRecord, JobStatus, JobType};

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by job store implementations
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Payload or result column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while opening the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A lock guarding store state was poisoned
    #[error("Store lock poisoned: {0}")]
    Lock(String),

    /// A stored value could not be mapped back to the model
    #[error("Corrupt value '{value}' in column '{column}'")]
    Corrupt { column: String, value: String },

    /// The store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn corrupt(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Corrupt {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Transient failures worth retrying at the next run
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Unavailable(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}

/// Per-status job counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub retry: usize,
}

impl StatusCounts {
    /// Add `n` jobs in `status`
    pub fn add(&mut self, status: JobStatus, n: usize) {
        match status {
            JobStatus::Pending => self.pending += n,
            JobStatus::Processing => self.processing += n,
            JobStatus::Completed => self.completed += n,
            JobStatus::Failed => self.failed += n,
            JobStatus::Retry => self.retry += n,
        }
    }

    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Retry => self.retry,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed + self.retry
    }

    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Job Status\n");
        output.push_str(&format!("{:-<30}\n", ""));
        for status in JobStatus::all() {
            output.push_str(&format!("{:<11} {}\n", status.as_str(), self.get(status)));
        }
        output.push_str(&format!("{:<11} {}\n", "total", self.total()));
        output
    }
}

/// Typed access to the persistent job table
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs whose status is in `statuses`, optionally for one tenant,
    /// ordered by creation time
    async fn fetch_candidate_jobs(
        &self,
        statuses: &[JobStatus],
        tenant_id: Option<&str>,
    ) -> StoreResult<Vec<JobRecord>>;

    /// Atomically move a job from `pending | retry` to `processing`.
    ///
    /// `job` is the snapshot the caller fetched. The swap only succeeds while
    /// the stored row still has the snapshot's status and attempt count and
    /// is due at `now`. Returns `false` when the job was claimed or changed
    /// by someone else, is not yet due, or does not exist.
    async fn claim(&self, job: &JobRecord, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Full-record upsert
    async fn persist(&self, job: &JobRecord) -> StoreResult<()>;

    /// Append an audit entry; callers treat failures as non-fatal
    async fn append_execution(&self, record: &ExecutionRecord) -> StoreResult<()>;

    /// Most recently created record of `job_type` for a tenant
    async fn latest_for(&self, tenant_id: &str, job_type: JobType)
        -> StoreResult<Option<JobRecord>>;

    /// Look up a single job
    async fn get(&self, job_id: &str) -> StoreResult<Option<JobRecord>>;

    /// Count jobs per status
    async fn status_counts(&self, tenant_id: Option<&str>) -> StoreResult<StatusCounts>;

    /// Insert a freshly created job
    async fn enqueue(&self, job: JobRecord) -> StoreResult<JobRecord> {
        self.persist(&job).await?;
        tracing::debug!(
            job_id = %job.id,
            tenant_id = %job.tenant_id,
            job_type = %job.job_type,
            "Job enqueued"
        );
        Ok(job)
    }
}
