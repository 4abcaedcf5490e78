//! Deciding which jobs run, when, and how many at once
//!
//! # Overview
//!
//! Every candidate job passes two independent gates before it is executed:
//! its prerequisites must have completed for the same tenant, and the
//! tenant's local run window must be open (unless the run is forced). Jobs
//! that pass are grouped by the tenant's priority tier and executed in
//! bounded batches.
//!
//! ```text
//!   candidates ──▶ DependencyResolver ──▶ TimezoneScheduler ──▶ ConcurrencyScheduler
//!                  (per-tenant graph)     (run window, tier)    (tiers → batches)
//! ```
//!
//! # Modules
//!
//! - [`dependency`] - Job-type dependency graph and readiness checks
//! - [`timezone`] - Tenant-local run instants, run windows, tenant config
//! - [`concurrency`] - Tiered batch execution with per-tier limits
//! - [`error`] - Scheduler error types

pub mod concurrency;
pub mod dependency;
pub mod error;
pub mod timezone;

pub use concurrency::{partition_by_tier, ConcurrencyScheduler, TierLimits};
pub use dependency::{DependencyGraph, DependencyResolver, DEFAULT_EDGES};
pub use error::{SchedulerError, SchedulerResult};
pub use timezone::{
    parse_local_time, resolve_local, FileTenantProvider, ScheduleDecision, StaticTenantProvider,
    TenantConfig, TenantConfigProvider, TenantSchedule, TimezoneScheduler,
};
