//! One scheduling pass over the job table
//!
//! ```text
//! fetch {pending, retry} due ──▶ dependency gate ──▶ run-window gate
//!                                   │ blocked           │ deferred
//!                                   ▼                   ▼
//!                              (left as is)        (left as is)
//!
//!   ready jobs ──▶ tiers ──▶ batches ──▶ per job:
//!       claim ─▶ execute ─▶ classify ─▶ transition ─▶ persist ─▶ audit ─▶ event
//! ```
//!
//! A job's failure never aborts its batch or the run. The only run-level
//! failure is being unable to fetch candidates, reported through
//! [`RunSummary::error`].
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `default_max_attempts` | 3 | Attempts given to newly enqueued jobs |
//! | `inter_batch_pause_ms` | 250 | Pause between consecutive batches |
//! | `window_tolerance_mins` | 10 | Run window either side of a tenant's run instant |
//! | `concurrency` | 10 / 5 / 2 | Batch size for premium / standard / economy |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::events::{
    publish, EventSink, FanoutEventSink, JobEvent, MetricsEventSink, TracingEventSink,
};
use crate::executor::{ExecutorRegistry, WebhookExecutor};
use crate::lifecycle::{self, TransitionError};
use crate::metrics;
use crate::models::{
    ExecutionOutcome, ExecutionRecord, JobRecord, JobStatus, JobType, RunOptions, RunSummary,
};
use crate::resilience::{
    BreakerConfig, Classification, CircuitBreakerRegistry, ErrorClassifier, InMemoryCircuitBreaker,
    RetryPolicy,
};
use crate::scheduler::{
    ConcurrencyScheduler, DependencyGraph, DependencyResolver, FileTenantProvider,
    ScheduleDecision, StaticTenantProvider, TenantConfigProvider, TenantSchedule, TierLimits,
    TimezoneScheduler,
};
use crate::storage::{JobStore, SqliteJobStore, StoreResult};

// ============================================================================
// Configuration
// ============================================================================

/// Orchestrator tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub default_max_attempts: u32,
    pub inter_batch_pause_ms: u64,
    pub window_tolerance_mins: i64,
    pub concurrency: TierLimits,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            inter_batch_pause_ms: 250,
            window_tolerance_mins: 10,
            concurrency: TierLimits::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new config builder
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_max_attempts == 0 {
            return Err("default_max_attempts must be greater than 0".to_string());
        }
        if self.window_tolerance_mins < 0 {
            return Err("window_tolerance_mins cannot be negative".to_string());
        }
        for (tier, limit) in [
            ("premium", self.concurrency.premium),
            ("standard", self.concurrency.standard),
            ("economy", self.concurrency.economy),
        ] {
            if limit == 0 {
                return Err(format!("concurrency.{tier} must be greater than 0"));
            }
        }
        Ok(())
    }

    pub fn inter_batch_pause(&self) -> StdDuration {
        StdDuration::from_millis(self.inter_batch_pause_ms)
    }

    pub fn window_tolerance(&self) -> Duration {
        Duration::minutes(self.window_tolerance_mins)
    }
}

/// Builder for OrchestratorConfig
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    default_max_attempts: Option<u32>,
    inter_batch_pause_ms: Option<u64>,
    window_tolerance_mins: Option<i64>,
    concurrency: Option<TierLimits>,
}

impl OrchestratorConfigBuilder {
    pub fn default_max_attempts(mut self, attempts: u32) -> Self {
        self.default_max_attempts = Some(attempts);
        self
    }

    pub fn inter_batch_pause_ms(mut self, millis: u64) -> Self {
        self.inter_batch_pause_ms = Some(millis);
        self
    }

    pub fn window_tolerance_mins(mut self, minutes: i64) -> Self {
        self.window_tolerance_mins = Some(minutes);
        self
    }

    pub fn concurrency(mut self, limits: TierLimits) -> Self {
        self.concurrency = Some(limits);
        self
    }

    /// Build the config
    pub fn build(self) -> Result<OrchestratorConfig, String> {
        let defaults = OrchestratorConfig::default();
        let config = OrchestratorConfig {
            default_max_attempts: self
                .default_max_attempts
                .unwrap_or(defaults.default_max_attempts),
            inter_batch_pause_ms: self
                .inter_batch_pause_ms
                .unwrap_or(defaults.inter_batch_pause_ms),
            window_tolerance_mins: self
                .window_tolerance_mins
                .unwrap_or(defaults.window_tolerance_mins),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Per-job Outcome
// ============================================================================

/// What happened to one job handed to the batch executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobDisposition {
    /// Another worker claimed it first, or the claim could not be made
    Skipped,
    /// Executed and persisted with this outcome
    Finished(ExecutionOutcome),
    /// Executed but the new state could not be stored
    PersistFailed,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Ties store, schedulers, executors and failure handling into runs
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    executors: ExecutorRegistry,
    classifier: ErrorClassifier,
    resolver: DependencyResolver,
    timezones: TimezoneScheduler,
    tenants: Arc<dyn TenantConfigProvider>,
    batches: ConcurrencyScheduler,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Start building an orchestrator around a store and its executors
    pub fn builder(store: Arc<dyn JobStore>, executors: ExecutorRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder::new(store, executors)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn breaker(&self) -> &Arc<dyn CircuitBreakerRegistry> {
        self.classifier.breaker()
    }

    /// Dependency graph in use
    pub fn graph(&self) -> &DependencyGraph {
        self.resolver.graph()
    }

    /// Create a pending job using the configured attempt budget
    pub async fn enqueue(
        &self,
        tenant_id: &str,
        job_type: JobType,
        payload: Value,
        max_attempts: Option<u32>,
    ) -> StoreResult<JobRecord> {
        let now = self.clock.now();
        let job = JobRecord::new(
            tenant_id,
            job_type,
            payload,
            max_attempts.unwrap_or(self.config.default_max_attempts),
        )
        .created(now)
        .scheduled_for(now);

        self.store.enqueue(job).await
    }

    /// Schedules of every configured tenant with their window state
    pub async fn tenant_schedules(&self) -> Vec<(TenantSchedule, bool)> {
        let now = self.clock.now();
        let tenants = match self.tenants.all().await {
            Ok(tenants) => tenants,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list tenants");
                return Vec::new();
            }
        };

        let mut schedules = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            match self.timezones.schedule_for(&tenant, now) {
                Ok(schedule) => {
                    let on_time = self.timezones.is_on_time(&schedule, now);
                    schedules.push((schedule, on_time));
                }
                Err(e) => {
                    tracing::warn!(tenant_id = %tenant.tenant_id, error = %e, "Invalid tenant schedule");
                }
            }
        }
        schedules
    }

    /// Execute one scheduling pass
    pub async fn run(&self, options: RunOptions) -> RunSummary {
        let now = self.clock.now();
        let mut summary = RunSummary::default();

        let candidates = match self
            .store
            .fetch_candidate_jobs(
                &[JobStatus::Pending, JobStatus::Retry],
                options.tenant_id.as_deref(),
            )
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch candidate jobs");
                return RunSummary::aborted(e.to_string());
            }
        };

        let due: Vec<JobRecord> = candidates
            .into_iter()
            .filter(|job| job.is_due(now))
            .filter(|job| options.job_type.map_or(true, |t| job.job_type == t))
            .collect();

        tracing::info!(
            candidates = due.len(),
            force = options.force,
            tenant_id = ?options.tenant_id,
            job_type = ?options.job_type,
            "Run started"
        );

        let ready = self.select_ready(due, now, options.force, &mut summary).await;

        let dispositions = self
            .batches
            .execute(ready, self.events.as_ref(), move |job| self.process(job))
            .await;

        for disposition in dispositions {
            match disposition {
                JobDisposition::Skipped => summary.skipped += 1,
                JobDisposition::PersistFailed => {
                    summary.processed += 1;
                    summary.failed += 1;
                }
                JobDisposition::Finished(outcome) => {
                    summary.processed += 1;
                    match outcome {
                        ExecutionOutcome::Succeeded => summary.succeeded += 1,
                        ExecutionOutcome::Retrying => summary.retried += 1,
                        ExecutionOutcome::Failed | ExecutionOutcome::CircuitOpen => {
                            summary.failed += 1
                        }
                    }
                }
            }
        }

        metrics::record_run(summary.processed, summary.blocked, summary.deferred);

        tracing::info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            retried = summary.retried,
            blocked = summary.blocked,
            deferred = summary.deferred,
            skipped = summary.skipped,
            "Run finished"
        );

        summary
    }

    /// Apply the dependency and run-window gates, tagging survivors with
    /// their tenant's tier
    async fn select_ready(
        &self,
        jobs: Vec<JobRecord>,
        now: DateTime<Utc>,
        force: bool,
        summary: &mut RunSummary,
    ) -> Vec<JobRecord> {
        let mut decisions: HashMap<String, Option<ScheduleDecision>> = HashMap::new();
        let mut ready = Vec::with_capacity(jobs.len());

        for mut job in jobs {
            match self
                .resolver
                .blocking_prerequisites(&job, self.store.as_ref())
                .await
            {
                Ok(blocking) if blocking.is_empty() && !self.graph().in_cycle(job.job_type) => {}
                Ok(blocking) => {
                    tracing::debug!(
                        job_id = %job.id,
                        tenant_id = %job.tenant_id,
                        job_type = %job.job_type,
                        blocking = ?blocking,
                        "Job blocked by prerequisites"
                    );
                    summary.blocked += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.id,
                        error = %e,
                        "Dependency check failed; treating job as blocked"
                    );
                    summary.blocked += 1;
                    continue;
                }
            }

            if !decisions.contains_key(&job.tenant_id) {
                let decision = match self
                    .timezones
                    .decide(self.tenants.as_ref(), &job.tenant_id, now, force)
                    .await
                {
                    Ok(decision) => Some(decision),
                    Err(e) => {
                        tracing::warn!(
                            tenant_id = %job.tenant_id,
                            error = %e,
                            "Tenant schedule unavailable; deferring its jobs"
                        );
                        None
                    }
                };
                decisions.insert(job.tenant_id.clone(), decision);
            }

            match decisions.get(&job.tenant_id).copied().flatten() {
                Some(decision) if decision.on_time => {
                    job.priority_tier = Some(decision.priority_tier);
                    ready.push(job);
                }
                _ => {
                    tracing::debug!(
                        job_id = %job.id,
                        tenant_id = %job.tenant_id,
                        "Job outside its tenant's run window"
                    );
                    summary.deferred += 1;
                }
            }
        }

        ready
    }

    /// claim -> execute -> classify -> transition -> persist -> audit -> event
    async fn process(&self, mut job: JobRecord) -> JobDisposition {
        match self.store.claim(&job, self.clock.now()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    job_id = %job.short_id(),
                    "Job claimed or changed elsewhere since fetch"
                );
                return JobDisposition::Skipped;
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to claim job");
                return JobDisposition::Skipped;
            }
        }

        let started_at = self.clock.now();

        if let Err(e) = lifecycle::begin_attempt(&mut job, started_at) {
            return self.abandon(job, e, started_at).await;
        }

        tracing::debug!(
            job_id = %job.short_id(),
            tenant_id = %job.tenant_id,
            job_type = %job.job_type,
            attempt = job.attempts,
            attempts_left = job.attempts_left(),
            "Job claimed"
        );
        publish(self.events.as_ref(), JobEvent::job_started(&job, started_at)).await;

        let timer = Instant::now();
        let result = self.executors.execute(&job).await;
        let finished_at = self.clock.now();
        let duration_ms = timer.elapsed().as_millis() as u64;

        let transition = match result {
            Ok(value) => {
                self.breaker().record_success_for_type(job.job_type);
                lifecycle::complete(&mut job, value, finished_at)
            }
            Err(e) => {
                let classified = self.classifier.classify(&e, job.job_type, job.attempts);
                match classified.classification {
                    Classification::CircuitOpen => {
                        tracing::warn!(
                            job_id = %job.id,
                            job_type = %job.job_type,
                            pattern = %classified.pattern,
                            "Circuit open; failing job without retry"
                        );
                    }
                    _ => {
                        self.breaker()
                            .record_failure(job.job_type, &classified.pattern);
                    }
                }
                lifecycle::fail(&mut job, e.to_string(), classified.classification, finished_at)
            }
        };

        let outcome = match transition {
            Ok(outcome) => outcome,
            Err(e) => {
                // Only reachable if the job left `processing` during execution
                tracing::error!(job_id = %job.id, error = %e, "Invalid transition");
                lifecycle::abandon(&mut job, e.to_string(), finished_at);
                ExecutionOutcome::Failed
            }
        };

        self.finish(job, outcome, started_at, finished_at, duration_ms)
            .await
    }

    /// A claimed job that cannot start is failed without executing
    async fn abandon(
        &self,
        mut job: JobRecord,
        reason: TransitionError,
        now: DateTime<Utc>,
    ) -> JobDisposition {
        tracing::warn!(job_id = %job.id, error = %reason, "Cannot start claimed job");
        lifecycle::abandon(&mut job, reason.to_string(), now);
        self.finish(job, ExecutionOutcome::Failed, now, now, 0).await
    }

    async fn finish(
        &self,
        job: JobRecord,
        outcome: ExecutionOutcome,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> JobDisposition {
        if let Err(e) = self.store.persist(&job).await {
            tracing::error!(
                job_id = %job.id,
                tenant_id = %job.tenant_id,
                status = %job.status,
                error = %e,
                "Failed to persist job state"
            );
            return JobDisposition::PersistFailed;
        }

        let record = ExecutionRecord::for_job(&job, outcome, started_at, finished_at);
        if let Err(e) = self.store.append_execution(&record).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to append execution record");
        }

        let event = match outcome {
            ExecutionOutcome::Succeeded => JobEvent::job_completed(&job, duration_ms, finished_at),
            _ => JobEvent::job_failed(&job, outcome, duration_ms, finished_at),
        };
        publish(self.events.as_ref(), event).await;

        JobDisposition::Finished(outcome)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Orchestrator`]; every collaborator except the store and the
/// executors has an in-process default
pub struct OrchestratorBuilder {
    store: Arc<dyn JobStore>,
    executors: ExecutorRegistry,
    config: OrchestratorConfig,
    retry: RetryPolicy,
    breaker: Option<Arc<dyn CircuitBreakerRegistry>>,
    breaker_config: BreakerConfig,
    resolver: Option<DependencyResolver>,
    tenants: Option<Arc<dyn TenantConfigProvider>>,
    events: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl OrchestratorBuilder {
    fn new(store: Arc<dyn JobStore>, executors: ExecutorRegistry) -> Self {
        Self {
            store,
            executors,
            config: OrchestratorConfig::default(),
            retry: RetryPolicy::default(),
            breaker: None,
            breaker_config: BreakerConfig::default(),
            resolver: None,
            tenants: None,
            events: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Thresholds for the default in-memory breaker
    pub fn breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Use an existing breaker registry instead of a fresh in-memory one
    pub fn breaker(mut self, breaker: Arc<dyn CircuitBreakerRegistry>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn resolver(mut self, resolver: DependencyResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn tenants(mut self, tenants: Arc<dyn TenantConfigProvider>) -> Self {
        self.tenants = Some(tenants);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Orchestrator {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let breaker = self.breaker.unwrap_or_else(|| {
            Arc::new(InMemoryCircuitBreaker::with_clock(
                self.breaker_config,
                clock.clone(),
            ))
        });

        let missing = self.executors.missing();
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "No executor registered for some job types");
        }

        Orchestrator {
            store: self.store,
            executors: self.executors,
            classifier: ErrorClassifier::new(self.retry, breaker),
            resolver: self.resolver.unwrap_or_default(),
            timezones: TimezoneScheduler::new(self.config.window_tolerance()),
            tenants: self
                .tenants
                .unwrap_or_else(|| Arc::new(StaticTenantProvider::default())),
            batches: ConcurrencyScheduler::new(
                self.config.concurrency,
                self.config.inter_batch_pause(),
            ),
            events: self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
            clock,
            config: self.config,
        }
    }
}

// ============================================================================
// Wiring from Configuration
// ============================================================================

impl Orchestrator {
    /// Build a production orchestrator from configuration: SQLite store,
    /// webhook executors, file-based tenants (when the file exists), and
    /// tracing plus metrics event sinks
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        config.validate()?;

        let store = SqliteJobStore::new(&config.database.sqlite_path)?;

        let mut executors = ExecutorRegistry::new();
        for (job_type, webhook) in config.executors.webhook_configs()? {
            let executor = WebhookExecutor::new(job_type.as_str(), webhook)?;
            executors.register(job_type, Arc::new(executor));
        }

        let tenants_path = &config.tenants.config_path;
        let tenants: Arc<dyn TenantConfigProvider> = if tenants_path.exists() {
            Arc::new(FileTenantProvider::load(tenants_path)?)
        } else {
            tracing::warn!(
                path = %tenants_path.display(),
                "Tenant file not found; every tenant runs on time at standard tier"
            );
            Arc::new(StaticTenantProvider::default())
        };

        let events: Arc<dyn EventSink> = Arc::new(
            FanoutEventSink::new()
                .with(Arc::new(TracingEventSink))
                .with(Arc::new(MetricsEventSink)),
        );

        Ok(Orchestrator::builder(Arc::new(store), executors)
            .config(config.orchestrator.clone())
            .retry_policy(config.retry)
            .breaker_config(config.breaker)
            .tenants(tenants)
            .events(events)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::executor::{ExecutorError, ExecutorResult, JobExecutor};
    use crate::storage::MemoryJobStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedExecutor(Result<Value, ExecutorError>);

    #[async_trait]
    impl JobExecutor for FixedExecutor {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn execute(&self, _job: &JobRecord) -> ExecutorResult<Value> {
            self.0.clone()
        }
    }

    fn orchestrator(
        store: Arc<MemoryJobStore>,
        result: Result<Value, ExecutorError>,
    ) -> Orchestrator {
        let registry =
            ExecutorRegistry::new().with(JobType::PrimaryFeed, Arc::new(FixedExecutor(result)));
        Orchestrator::builder(store, registry)
            .config(
                OrchestratorConfig::builder()
                    .inter_batch_pause_ms(0)
                    .build()
                    .unwrap(),
            )
            .clock(Arc::new(FakeClock::new(Utc::now() + Duration::seconds(1))))
            .build()
    }

    #[test]
    fn test_config_builder_validates() {
        assert!(OrchestratorConfig::builder()
            .default_max_attempts(0)
            .build()
            .is_err());
        assert!(OrchestratorConfig::builder()
            .concurrency(TierLimits::new(1, 0, 1))
            .build()
            .is_err());

        let config = OrchestratorConfig::builder()
            .window_tolerance_mins(5)
            .build()
            .unwrap();
        assert_eq!(config.window_tolerance(), Duration::minutes(5));
        assert_eq!(config.default_max_attempts, 3);
    }

    #[tokio::test]
    async fn test_success_path() {
        let store = Arc::new(MemoryJobStore::new());
        let orchestrator = orchestrator(store.clone(), Ok(json!({"vehicles": 12})));

        let job = orchestrator
            .enqueue("dealer-1", JobType::PrimaryFeed, json!({}), None)
            .await
            .unwrap();
        assert_eq!(job.max_attempts, 3);

        let summary = orchestrator.run(RunOptions::default()).await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.succeeded, 1);

        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.result, Some(json!({"vehicles": 12})));
        assert_eq!(store.executions().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_executor_fails_without_retry() {
        let store = Arc::new(MemoryJobStore::new());
        let orchestrator = orchestrator(store.clone(), Ok(json!({})));

        let job = orchestrator
            .enqueue("dealer-1", JobType::EnrichmentFeed, json!({}), Some(5))
            .await
            .unwrap();
        store
            .enqueue(
                JobRecord::new("dealer-1", JobType::PrimaryFeed, json!({}), 3)
                    .created(job.created_at - Duration::hours(1))
                    .scheduled_for(job.created_at),
            )
            .await
            .unwrap();

        // First pass completes the prerequisite, second runs the enrichment
        orchestrator.run(RunOptions::default()).await;
        let summary = orchestrator.run(RunOptions::default()).await;
        assert_eq!(summary.failed, 1);

        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_abandoned() {
        let mut job = JobRecord::new("dealer-1", JobType::PrimaryFeed, json!({}), 2);
        job.attempts = 2;
        let store = Arc::new(MemoryJobStore::with_jobs([job.clone()]));
        let orchestrator = orchestrator(store.clone(), Ok(json!({})));

        let summary = orchestrator.run(RunOptions::default()).await;
        assert_eq!(summary.failed, 1);

        let stored = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_run() {
        let store = Arc::new(MemoryJobStore::new());
        store.set_unavailable(true);
        let orchestrator = orchestrator(store, Ok(json!({})));

        let summary = orchestrator.run(RunOptions::default()).await;
        assert_eq!(summary.processed, 0);
        assert!(summary.error.is_some());
    }
}
