//! SQLite job store
//!
//! Jobs live in a single `jobs` table; execution attempts are appended to
//! `job_executions`. Timestamps are stored as fixed-width RFC 3339 UTC
//! strings so that lexical comparison matches chronological order.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{JobStore, StatusCounts, StoreError, StoreResult};
use crate::models::{ExecutionRecord, JobRecord, JobStatus, JobType};

const JOB_COLUMNS: &str = "id, tenant_id, job_type, status, attempts, max_attempts, payload, \
                           result, error, scheduled_at, created_at, started_at, completed_at";

/// SQLite implementation of [`JobStore`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection. Claims are
/// a single conditional `UPDATE`, so several processes sharing the same
/// database file still see exactly one winner.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) a store at `path`
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite job store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn create_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    job_type TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    attempts INTEGER NOT NULL DEFAULT 0,
                    max_attempts INTEGER NOT NULL DEFAULT 3,
                    payload TEXT NOT NULL DEFAULT '{}',
                    result TEXT,
                    error TEXT,
                    scheduled_at TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    started_at TEXT,
                    completed_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_status_scheduled
                    ON jobs(status, scheduled_at);

                CREATE INDEX IF NOT EXISTS idx_jobs_tenant_type_created
                    ON jobs(tenant_id, job_type, created_at);

                CREATE TABLE IF NOT EXISTS job_executions (
                    id TEXT PRIMARY KEY,
                    job_id TEXT NOT NULL,
                    tenant_id TEXT NOT NULL,
                    job_type TEXT NOT NULL,
                    attempt INTEGER NOT NULL,
                    outcome TEXT NOT NULL,
                    error TEXT,
                    started_at TEXT NOT NULL,
                    finished_at TEXT NOT NULL,
                    duration_ms INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_job_executions_job
                    ON job_executions(job_id);
                "#,
        )?;
        Ok(())
    }

    /// Audit entries recorded for a job, oldest first
    pub fn executions_for(&self, job_id: &str) -> StoreResult<Vec<(u32, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT attempt, outcome FROM job_executions WHERE job_id = ?1 ORDER BY started_at, attempt",
        )?;
        let rows = stmt
            .query_map(params![job_id], |row| {
                Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("invalid timestamp '{value}': {e}")))
}

fn parse_opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, v)).transpose()
}

fn parse_json(idx: usize, value: String) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(&value).map_err(|e| conversion_error(idx, e.to_string()))
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let job_type: String = row.get(2)?;
    let status: String = row.get(3)?;

    Ok(JobRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        job_type: JobType::parse(&job_type)
            .ok_or_else(|| conversion_error(2, format!("unknown job type '{job_type}'")))?,
        status: JobStatus::parse(&status)
            .ok_or_else(|| conversion_error(3, format!("unknown status '{status}'")))?,
        priority_tier: None,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        payload: parse_json(6, row.get(6)?)?,
        result: row
            .get::<_, Option<String>>(7)?
            .map(|v| parse_json(7, v))
            .transpose()?,
        error: row.get(8)?,
        scheduled_at: parse_ts(9, row.get(9)?)?,
        created_at: parse_ts(10, row.get(10)?)?,
        started_at: parse_opt_ts(11, row.get(11)?)?,
        completed_at: parse_opt_ts(12, row.get(12)?)?,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn fetch_candidate_jobs(
        &self,
        statuses: &[JobStatus],
        tenant_id: Option<&str>,
    ) -> StoreResult<Vec<JobRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let placeholders: String = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let mut query =
            format!("SELECT {JOB_COLUMNS} FROM jobs WHERE status IN ({placeholders})");

        let mut values: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        if let Some(tenant) = tenant_id {
            query.push_str(" AND tenant_id = ?");
            values.push(tenant.to_string());
        }
        query.push_str(" ORDER BY created_at ASC, id ASC");

        let mut stmt = conn.prepare(&query)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

        let jobs = stmt
            .query_map(params.as_slice(), row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    async fn claim(&self, snapshot: &JobRecord, now: DateTime<Utc>) -> StoreResult<bool> {
        if !snapshot.status.is_claimable() {
            return Ok(false);
        }

        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE jobs SET status = 'processing'
             WHERE id = ?1
               AND status IN ('pending', 'retry')
               AND status = ?2
               AND attempts = ?3
               AND scheduled_at <= ?4",
            params![
                snapshot.id,
                snapshot.status.as_str(),
                snapshot.attempts,
                format_ts(&now)
            ],
        )?;
        Ok(changed == 1)
    }

    async fn persist(&self, job: &JobRecord) -> StoreResult<()> {
        let payload = serde_json::to_string(&job.payload)?;
        let result = job.result.as_ref().map(serde_json::to_string).transpose()?;

        let conn = self.lock()?;
        conn.execute(
            r#"
                INSERT INTO jobs (id, tenant_id, job_type, status, attempts, max_attempts,
                                  payload, result, error, scheduled_at, created_at,
                                  started_at, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(id) DO UPDATE SET
                    tenant_id = excluded.tenant_id,
                    job_type = excluded.job_type,
                    status = excluded.status,
                    attempts = excluded.attempts,
                    max_attempts = excluded.max_attempts,
                    payload = excluded.payload,
                    result = excluded.result,
                    error = excluded.error,
                    scheduled_at = excluded.scheduled_at,
                    created_at = excluded.created_at,
                    started_at = excluded.started_at,
                    completed_at = excluded.completed_at
                "#,
            params![
                job.id,
                job.tenant_id,
                job.job_type.as_str(),
                job.status.as_str(),
                job.attempts,
                job.max_attempts,
                payload,
                result,
                job.error,
                format_ts(&job.scheduled_at),
                format_ts(&job.created_at),
                job.started_at.as_ref().map(format_ts),
                job.completed_at.as_ref().map(format_ts),
            ],
        )?;
        Ok(())
    }

    async fn append_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
                INSERT INTO job_executions (id, job_id, tenant_id, job_type, attempt, outcome,
                                            error, started_at, finished_at, duration_ms)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            params![
                record.id,
                record.job_id,
                record.tenant_id,
                record.job_type.as_str(),
                record.attempt,
                record.outcome.as_str(),
                record.error,
                format_ts(&record.started_at),
                format_ts(&record.finished_at),
                record.duration_ms as i64,
            ],
        )?;
        Ok(())
    }

    async fn latest_for(
        &self,
        tenant_id: &str,
        job_type: JobType,
    ) -> StoreResult<Option<JobRecord>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE tenant_id = ?1 AND job_type = ?2
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                params![tenant_id, job_type.as_str()],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    async fn get(&self, job_id: &str) -> StoreResult<Option<JobRecord>> {
        let conn = self.lock()?;
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![job_id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    async fn status_counts(&self, tenant_id: Option<&str>) -> StoreResult<StatusCounts> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM jobs
             WHERE (?1 IS NULL OR tenant_id = ?1)
             GROUP BY status",
        )?;

        let rows = stmt
            .query_map(params![tenant_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let status =
                JobStatus::parse(&status).ok_or_else(|| StoreError::corrupt("status", status))?;
            counts.add(status, count as usize);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionOutcome;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn job(tenant: &str, job_type: JobType) -> JobRecord {
        JobRecord::new(tenant, job_type, json!({"dealer_code": tenant}), 3)
    }

    #[tokio::test]
    async fn test_persist_and_get_roundtrip() {
        let store = SqliteJobStore::in_memory().unwrap();
        let mut record = job("dealer-1", JobType::EnrichmentFeed);
        record.result = Some(json!({"vehicles": 12}));
        record.started_at = Some(Utc::now());

        store.persist(&record).await.unwrap();
        let loaded = store.get(&record.id).await.unwrap().unwrap();

        assert_eq!(loaded.job_type, JobType::EnrichmentFeed);
        assert_eq!(loaded.payload, record.payload);
        assert_eq!(loaded.result, record.result);
        assert!(loaded.started_at.is_some());
        assert!(loaded.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_persist_is_upsert() {
        let store = SqliteJobStore::in_memory().unwrap();
        let mut record = job("dealer-1", JobType::PrimaryFeed);
        store.persist(&record).await.unwrap();

        record.status = JobStatus::Failed;
        record.error = Some("boom".to_string());
        store.persist(&record).await.unwrap();

        let counts = store.status_counts(None).await.unwrap();
        assert_eq!(counts.total(), 1);
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn test_claim_is_conditional() {
        let store = SqliteJobStore::in_memory().unwrap();
        let record = job("dealer-1", JobType::PrimaryFeed);
        store.persist(&record).await.unwrap();

        let now = Utc::now();
        assert!(!store
            .claim(&record, record.scheduled_at - ChronoDuration::seconds(1))
            .await
            .unwrap());
        assert!(store.claim(&record, now).await.unwrap());
        assert!(!store.claim(&record, now).await.unwrap());
        assert!(!store
            .claim(&job("dealer-1", JobType::PrimaryFeed), now)
            .await
            .unwrap());

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_fetch_candidates_by_status_and_tenant() {
        let store = SqliteJobStore::in_memory().unwrap();
        let base = Utc::now();

        let a = job("dealer-1", JobType::PrimaryFeed).created(base - ChronoDuration::minutes(3));
        let mut b = job("dealer-1", JobType::DetailScrape).created(base - ChronoDuration::minutes(2));
        b.status = JobStatus::Retry;
        let mut c = job("dealer-1", JobType::LinkShorten).created(base - ChronoDuration::minutes(1));
        c.status = JobStatus::Completed;
        let d = job("dealer-2", JobType::PrimaryFeed).created(base);

        for record in [&d, &c, &b, &a] {
            store.persist(record).await.unwrap();
        }

        let all = store
            .fetch_candidate_jobs(&[JobStatus::Pending, JobStatus::Retry], None)
            .await
            .unwrap();
        let ids: Vec<_> = all.iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone(), d.id.clone()]);

        let tenant = store
            .fetch_candidate_jobs(&[JobStatus::Pending], Some("dealer-1"))
            .await
            .unwrap();
        assert_eq!(tenant.len(), 1);
        assert_eq!(tenant[0].id, a.id);
    }

    #[tokio::test]
    async fn test_latest_for() {
        let store = SqliteJobStore::in_memory().unwrap();
        let base = Utc::now();

        let mut old = job("dealer-1", JobType::PrimaryFeed).created(base - ChronoDuration::days(1));
        old.status = JobStatus::Completed;
        let new = job("dealer-1", JobType::PrimaryFeed).created(base);
        store.persist(&old).await.unwrap();
        store.persist(&new).await.unwrap();

        let latest = store
            .latest_for("dealer-1", JobType::PrimaryFeed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, new.id);
        assert_eq!(latest.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_append_execution() {
        let store = SqliteJobStore::in_memory().unwrap();
        let mut record = job("dealer-1", JobType::PrimaryFeed);
        record.attempts = 1;
        store.persist(&record).await.unwrap();

        let started = Utc::now();
        let entry = ExecutionRecord::for_job(
            &record,
            ExecutionOutcome::Succeeded,
            started,
            started + ChronoDuration::milliseconds(40),
        );
        store.append_execution(&entry).await.unwrap();

        let executions = store.executions_for(&record.id).unwrap();
        assert_eq!(executions, vec![(1, "succeeded".to_string())]);
    }

    #[tokio::test]
    async fn test_status_counts_per_tenant() {
        let store = SqliteJobStore::in_memory().unwrap();
        store.persist(&job("dealer-1", JobType::PrimaryFeed)).await.unwrap();
        store.persist(&job("dealer-1", JobType::DetailScrape)).await.unwrap();
        store.persist(&job("dealer-2", JobType::PrimaryFeed)).await.unwrap();

        assert_eq!(store.status_counts(None).await.unwrap().pending, 3);
        assert_eq!(
            store.status_counts(Some("dealer-1")).await.unwrap().pending,
            2
        );
    }
}
