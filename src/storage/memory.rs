//! In-memory job store
//!
//! Useful for tests and dry runs without database dependencies. Claims are
//! serialized through a single write lock, which gives the same
//! compare-and-swap guarantee the SQLite store provides.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{JobStore, StatusCounts, StoreError, StoreResult};
use crate::models::{ExecutionRecord, JobRecord, JobStatus, JobType};

/// Job store backed by a `HashMap`
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
    executions: RwLock<Vec<ExecutionRecord>>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            executions: RwLock::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Create a store pre-seeded with jobs
    pub fn with_jobs(jobs: impl IntoIterator<Item = JobRecord>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.jobs.write() {
            map.extend(jobs.into_iter().map(|job| (job.id.clone(), job)));
        }
        store
    }

    /// Simulate an outage: every subsequent call fails until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Audit entries appended so far
    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions
            .read()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Number of stored jobs
    pub fn len(&self) -> usize {
        self.jobs.read().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Lock(err.to_string())
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn fetch_candidate_jobs(
        &self,
        statuses: &[JobStatus],
        tenant_id: Option<&str>,
    ) -> StoreResult<Vec<JobRecord>> {
        self.check_available()?;
        let jobs = self.jobs.read().map_err(poisoned)?;

        let mut matching: Vec<JobRecord> = jobs
            .values()
            .filter(|job| statuses.contains(&job.status))
            .filter(|job| tenant_id.map_or(true, |t| job.tenant_id == t))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matching)
    }

    async fn claim(&self, snapshot: &JobRecord, now: DateTime<Utc>) -> StoreResult<bool> {
        self.check_available()?;
        let mut jobs = self.jobs.write().map_err(poisoned)?;

        match jobs.get_mut(&snapshot.id) {
            Some(job)
                if job.is_due(now)
                    && job.status == snapshot.status
                    && job.attempts == snapshot.attempts =>
            {
                job.status = JobStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn persist(&self, job: &JobRecord) -> StoreResult<()> {
        self.check_available()?;
        let mut stored = job.clone();
        stored.priority_tier = None;
        self.jobs
            .write()
            .map_err(poisoned)?
            .insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn append_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        self.check_available()?;
        self.executions
            .write()
            .map_err(poisoned)?
            .push(record.clone());
        Ok(())
    }

    async fn latest_for(
        &self,
        tenant_id: &str,
        job_type: JobType,
    ) -> StoreResult<Option<JobRecord>> {
        self.check_available()?;
        let jobs = self.jobs.read().map_err(poisoned)?;

        Ok(jobs
            .values()
            .filter(|job| job.tenant_id == tenant_id && job.job_type == job_type)
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned())
    }

    async fn get(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        self.check_available()?;
        Ok(self.jobs.read().map_err(poisoned)?.get(job_id).cloned())
    }

    async fn status_counts(&self, tenant_id: Option<&str>) -> StoreResult<StatusCounts> {
        self.check_available()?;
        let jobs = self.jobs.read().map_err(poisoned)?;

        let mut counts = StatusCounts::default();
        for job in jobs
            .values()
            .filter(|job| tenant_id.map_or(true, |t| job.tenant_id == t))
        {
            counts.add(job.status, 1);
        }
        Ok(counts)
    }
}
