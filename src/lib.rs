//! dealerflow - Multi-tenant dealer inventory job orchestration
//!
//! Decides which inventory jobs run for which dealer, when, and how many at a
//! time, then drives each job through its lifecycle with classified retries
//! and circuit breaking.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Job records, statuses, tiers, run options and summaries
//! - [`lifecycle`] - Job state machine transitions
//! - [`storage`] - Job store trait with SQLite and in-memory implementations
//! - [`executor`] - Per-job-type executors and the webhook executor
//! - [`resilience`] - Error classification, circuit breakers, backoff
//! - [`scheduler`] - Dependency gating, tenant run windows, tiered batching
//! - [`orchestrator`] - One run over the job table
//! - [`events`] - Lifecycle events and sinks
//! - [`metrics`] - Prometheus metrics
//! - [`config`] - Configuration management and settings
//! - [`clock`] - Injectable time source
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dealerflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteJobStore::new("data/jobs.db")?);
//!     let orchestrator = Orchestrator::builder(store, ExecutorRegistry::new()).build();
//!     let summary = orchestrator.run(RunOptions::default()).await;
//!     println!("{}", summary.display());
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod resilience;
pub mod scheduler;
pub mod storage;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, FakeClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::events::{
        BroadcastEventSink, EventSink, FanoutEventSink, JobEvent, MetricsEventSink,
        TracingEventSink,
    };
    pub use crate::executor::{
        ExecutorError, ExecutorRegistry, ExecutorResult, JobExecutor, WebhookExecutor,
        WebhookExecutorConfig,
    };
    pub use crate::models::{
        ExecutionOutcome, ExecutionRecord, JobRecord, JobStatus, JobType, PriorityTier,
        RunOptions, RunSummary,
    };
    pub use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    pub use crate::resilience::{
        BreakerConfig, CircuitBreakerRegistry, Classification, ErrorClassifier,
        InMemoryCircuitBreaker, RetryPolicy,
    };
    pub use crate::scheduler::{
        DependencyResolver, FileTenantProvider, StaticTenantProvider, TenantConfig,
        TenantConfigProvider, TierLimits, TimezoneScheduler,
    };
    pub use crate::storage::{JobStore, MemoryJobStore, SqliteJobStore, StoreError};
}

pub use models::{JobRecord, JobStatus, JobType, PriorityTier, RunOptions, RunSummary};
pub use orchestrator::Orchestrator;
