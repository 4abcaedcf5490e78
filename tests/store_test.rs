//! Job store contract tests
//!
//! The same behaviour is checked against `MemoryJobStore` and a file-backed
//! `SqliteJobStore`.

mod common;

use chrono::Duration;
use serde_json::json;

use common::{job_at, start_instant};
use dealerflow::models::{ExecutionOutcome, ExecutionRecord};
use dealerflow::storage::{JobStore, MemoryJobStore, SqliteJobStore};
use dealerflow::{JobStatus, JobType};

// ============================================================================
// Shared Contract
// ============================================================================

async fn fetch_orders_by_creation_and_filters(store: &dyn JobStore) {
    let now = start_instant();
    let late = job_at("dealer-1", JobType::PrimaryFeed, now);
    let early = job_at("dealer-1", JobType::DetailScrape, now - Duration::hours(1));
    let other_tenant = job_at("dealer-2", JobType::PrimaryFeed, now - Duration::minutes(30));
    let mut done = job_at("dealer-1", JobType::LinkShorten, now - Duration::hours(2));
    done.status = JobStatus::Completed;
    let mut retry = job_at("dealer-1", JobType::EnrichmentFeed, now - Duration::minutes(10));
    retry.status = JobStatus::Retry;

    for job in [&late, &early, &other_tenant, &done, &retry] {
        store.enqueue(job.clone()).await.unwrap();
    }

    let all = store
        .fetch_candidate_jobs(&[JobStatus::Pending, JobStatus::Retry], None)
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec![&early.id, &other_tenant.id, &retry.id, &late.id]);

    let tenant = store
        .fetch_candidate_jobs(&[JobStatus::Pending], Some("dealer-1"))
        .await
        .unwrap();
    let ids: Vec<_> = tenant.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec![&early.id, &late.id]);
}

async fn claim_is_compare_and_swap(store: &dyn JobStore) {
    let now = start_instant();
    let pending = store
        .enqueue(job_at("dealer-1", JobType::PrimaryFeed, now))
        .await
        .unwrap();
    let mut completed = job_at("dealer-1", JobType::DetailScrape, now);
    completed.status = JobStatus::Completed;
    store.enqueue(completed.clone()).await.unwrap();

    assert!(store.claim(&pending, now).await.unwrap());
    assert!(!store.claim(&pending, now).await.unwrap());
    assert!(!store.claim(&completed, now).await.unwrap());
    assert!(!store
        .claim(&job_at("dealer-1", JobType::PrimaryFeed, now), now)
        .await
        .unwrap());

    // Claiming changes nothing but the status
    let stored = store.get(&pending.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert_eq!(stored.attempts, 0);
    assert!(stored.started_at.is_none());

    let mut retry = stored;
    retry.status = JobStatus::Retry;
    retry.attempts = 1;
    retry.scheduled_at = now + Duration::minutes(5);
    store.persist(&retry).await.unwrap();

    // Not due yet
    assert!(!store.claim(&retry, now).await.unwrap());
    // Stale snapshot from before the first attempt
    assert!(!store.claim(&pending, now + Duration::minutes(5)).await.unwrap());
    assert!(store.claim(&retry, now + Duration::minutes(5)).await.unwrap());
}

async fn latest_for_picks_newest(store: &dyn JobStore) {
    let now = start_instant();
    let mut old = job_at("dealer-1", JobType::PrimaryFeed, now - Duration::days(1));
    old.status = JobStatus::Completed;
    let new = job_at("dealer-1", JobType::PrimaryFeed, now);
    let other = job_at("dealer-2", JobType::PrimaryFeed, now + Duration::minutes(1));

    for job in [&old, &new, &other] {
        store.enqueue(job.clone()).await.unwrap();
    }

    let latest = store
        .latest_for("dealer-1", JobType::PrimaryFeed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, new.id);
    assert_eq!(latest.status, JobStatus::Pending);

    assert!(store
        .latest_for("dealer-1", JobType::EnrichmentFeed)
        .await
        .unwrap()
        .is_none());
}

async fn persist_roundtrips_every_field(store: &dyn JobStore) {
    let now = start_instant();
    let mut job = job_at("dealer-1", JobType::EnrichmentFeed, now - Duration::minutes(5))
        .scheduled_for(now + Duration::seconds(30));
    job.status = JobStatus::Retry;
    job.attempts = 2;
    job.max_attempts = 4;
    job.payload = json!({"feed_url": "https://feeds.example.com/dealer-1.xml"});
    job.result = Some(json!({"vehicles": 42}));
    job.error = Some("HTTP 503: service unavailable".to_string());
    job.started_at = Some(now - Duration::minutes(1));
    job.completed_at = Some(now);

    store.persist(&job).await.unwrap();
    let stored = store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored, job);
}

async fn counts_by_status(store: &dyn JobStore) {
    let now = start_instant();
    let statuses = [
        ("dealer-1", JobStatus::Pending),
        ("dealer-1", JobStatus::Pending),
        ("dealer-1", JobStatus::Failed),
        ("dealer-2", JobStatus::Completed),
        ("dealer-2", JobStatus::Retry),
    ];
    for (tenant, status) in statuses {
        let mut job = job_at(tenant, JobType::PrimaryFeed, now);
        job.status = status;
        store.enqueue(job).await.unwrap();
    }

    let all = store.status_counts(None).await.unwrap();
    assert_eq!(all.pending, 2);
    assert_eq!(all.failed, 1);
    assert_eq!(all.completed, 1);
    assert_eq!(all.retry, 1);
    assert_eq!(all.total(), 5);

    let tenant = store.status_counts(Some("dealer-2")).await.unwrap();
    assert_eq!(tenant.pending, 0);
    assert_eq!(tenant.total(), 2);
}

macro_rules! store_contract {
    ($name:ident, $make:expr) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn fetch_order_and_filters() {
                let (_guard, store) = $make;
                fetch_orders_by_creation_and_filters(&store).await;
            }

            #[tokio::test]
            async fn claim_compare_and_swap() {
                let (_guard, store) = $make;
                claim_is_compare_and_swap(&store).await;
            }

            #[tokio::test]
            async fn latest_for_newest() {
                let (_guard, store) = $make;
                latest_for_picks_newest(&store).await;
            }

            #[tokio::test]
            async fn persist_roundtrip() {
                let (_guard, store) = $make;
                persist_roundtrips_every_field(&store).await;
            }

            #[tokio::test]
            async fn status_counts() {
                let (_guard, store) = $make;
                counts_by_status(&store).await;
            }
        }
    };
}

fn sqlite_store() -> (tempfile::TempDir, SqliteJobStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteJobStore::new(dir.path().join("jobs.db")).unwrap();
    (dir, store)
}

store_contract!(memory, ((), MemoryJobStore::new()));
store_contract!(sqlite, sqlite_store());

// ============================================================================
// SQLite Specifics
// ============================================================================

#[tokio::test]
async fn test_sqlite_data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("jobs.db");

    let job = job_at("dealer-1", JobType::PrimaryFeed, start_instant());
    {
        let store = SqliteJobStore::new(&path).unwrap();
        store.enqueue(job.clone()).await.unwrap();
        assert!(store.claim(&job, start_instant()).await.unwrap());
    }

    let reopened = SqliteJobStore::new(&path).unwrap();
    let stored = reopened.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert!(!reopened.claim(&job, start_instant()).await.unwrap());
}

#[tokio::test]
async fn test_sqlite_execution_audit_trail() {
    let (_dir, store) = sqlite_store();
    let now = start_instant();
    let mut job = job_at("dealer-1", JobType::DetailScrape, now);
    store.enqueue(job.clone()).await.unwrap();

    for (attempt, outcome) in [
        (1, ExecutionOutcome::Retrying),
        (2, ExecutionOutcome::Succeeded),
    ] {
        job.attempts = attempt;
        let started = now + Duration::minutes(attempt as i64);
        let record = ExecutionRecord::for_job(&job, outcome, started, started + Duration::seconds(2));
        assert_eq!(record.duration_ms, 2000);
        store.append_execution(&record).await.unwrap();
    }

    assert_eq!(
        store.executions_for(&job.id).unwrap(),
        vec![(1, "retrying".to_string()), (2, "succeeded".to_string())]
    );
    assert!(store.executions_for("unknown").unwrap().is_empty());
}
