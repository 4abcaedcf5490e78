//! Tenant-local run times
//!
//! Each tenant names an IANA timezone and a preferred local wall-clock time.
//! The scheduler turns that into the UTC instant of the next occurrence and
//! decides whether "now" falls inside the run window around it.
//!
//! ```text
//!        previous occurrence              next occurrence
//!   ─────────┬──────────────── 24h ──────────────┬─────────▶ UTC
//!      [ -tol | +tol ]                      [ -tol | +tol ]
//!            ▲ on time                            ▲ on time
//! ```
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `window_tolerance_mins` | 10 | Minutes either side of the run instant |
//!
//! DST gaps resolve to the first valid instant after the gap; folds resolve
//! to the earlier of the two instants.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::error::{SchedulerError, SchedulerResult};
use crate::models::PriorityTier;

/// Upper bound when stepping out of a DST gap
const MAX_GAP_MINUTES: i64 = 24 * 60;

// ============================================================================
// Tenant Configuration
// ============================================================================

/// Scheduling preferences for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: String,

    /// IANA timezone name (e.g., "America/Chicago")
    pub timezone: String,

    /// Local wall-clock time in `HH:MM`
    pub preferred_local_time: String,

    #[serde(default)]
    pub priority_tier: PriorityTier,
}

impl TenantConfig {
    pub fn new(
        tenant_id: impl Into<String>,
        timezone: impl Into<String>,
        preferred_local_time: impl Into<String>,
        priority_tier: PriorityTier,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            timezone: timezone.into(),
            preferred_local_time: preferred_local_time.into(),
            priority_tier,
        }
    }

    pub fn tz(&self) -> SchedulerResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| SchedulerError::invalid_timezone(&self.timezone))
    }

    pub fn local_time(&self) -> SchedulerResult<NaiveTime> {
        parse_local_time(&self.preferred_local_time)
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(SchedulerError::tenant_config(
                &self.tenant_id,
                "tenant_id cannot be empty",
            ));
        }
        self.tz()?;
        self.local_time()?;
        Ok(())
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`)
pub fn parse_local_time(value: &str) -> SchedulerResult<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| SchedulerError::invalid_time(value))
}

// ============================================================================
// Tenant Config Providers
// ============================================================================

/// Source of tenant scheduling preferences
#[async_trait]
pub trait TenantConfigProvider: Send + Sync {
    /// Configuration for one tenant, `None` when unknown
    async fn get(&self, tenant_id: &str) -> SchedulerResult<Option<TenantConfig>>;

    /// Every configured tenant, sorted by id
    async fn all(&self) -> SchedulerResult<Vec<TenantConfig>>;
}

/// Tenants held in memory
#[derive(Debug, Default)]
pub struct StaticTenantProvider {
    tenants: RwLock<HashMap<String, TenantConfig>>,
}

impl StaticTenantProvider {
    pub fn new(tenants: impl IntoIterator<Item = TenantConfig>) -> Self {
        Self {
            tenants: RwLock::new(
                tenants
                    .into_iter()
                    .map(|t| (t.tenant_id.clone(), t))
                    .collect(),
            ),
        }
    }

    /// Add or replace a tenant
    pub fn insert(&self, tenant: TenantConfig) {
        let mut tenants = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        tenants.insert(tenant.tenant_id.clone(), tenant);
    }

    fn replace_all(&self, tenants: Vec<TenantConfig>) {
        let mut map = self.tenants.write().unwrap_or_else(|e| e.into_inner());
        *map = tenants.into_iter().map(|t| (t.tenant_id.clone(), t)).collect();
    }

    pub fn len(&self) -> usize {
        self.tenants.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TenantConfigProvider for StaticTenantProvider {
    async fn get(&self, tenant_id: &str) -> SchedulerResult<Option<TenantConfig>> {
        let tenants = self.tenants.read().unwrap_or_else(|e| e.into_inner());
        Ok(tenants.get(tenant_id).cloned())
    }

    async fn all(&self) -> SchedulerResult<Vec<TenantConfig>> {
        let tenants = self.tenants.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = tenants.values().cloned().collect();
        all.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(all)
    }
}

/// On-disk layout of the tenants file
///
/// ```toml
/// [[tenant]]
/// tenant_id = "dealer-chicago"
/// timezone = "America/Chicago"
/// preferred_local_time = "02:00"
/// priority_tier = "premium"
/// ```
#[derive(Debug, Default, Deserialize)]
struct TenantFile {
    #[serde(default, rename = "tenant")]
    tenants: Vec<TenantConfig>,
}

/// Tenants loaded from a TOML file
#[derive(Debug)]
pub struct FileTenantProvider {
    path: PathBuf,
    inner: StaticTenantProvider,
}

impl FileTenantProvider {
    /// Load and validate every tenant in `path`
    pub fn load(path: impl AsRef<Path>) -> SchedulerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tenants = Self::read(&path)?;
        tracing::info!(path = %path.display(), tenants = tenants.len(), "Loaded tenant config");

        Ok(Self {
            path,
            inner: StaticTenantProvider::new(tenants),
        })
    }

    /// Parse tenants from TOML text
    pub fn parse(content: &str) -> SchedulerResult<Vec<TenantConfig>> {
        let file: TenantFile = toml::from_str(content)?;
        for tenant in &file.tenants {
            tenant.validate()?;
        }
        Ok(file.tenants)
    }

    /// Re-read the file, keeping the previous tenants on failure
    pub fn reload(&self) -> SchedulerResult<usize> {
        let tenants = Self::read(&self.path)?;
        let count = tenants.len();
        self.inner.replace_all(tenants);
        tracing::info!(path = %self.path.display(), tenants = count, "Reloaded tenant config");
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> SchedulerResult<Vec<TenantConfig>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SchedulerError::io_error(format!("read {}", path.display()), e.to_string()))?;
        Self::parse(&content)
    }
}

#[async_trait]
impl TenantConfigProvider for FileTenantProvider {
    async fn get(&self, tenant_id: &str) -> SchedulerResult<Option<TenantConfig>> {
        self.inner.get(tenant_id).await
    }

    async fn all(&self) -> SchedulerResult<Vec<TenantConfig>> {
        self.inner.all().await
    }
}

// ============================================================================
// Tenant Schedule
// ============================================================================

/// Derived run times for one tenant at a given instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantSchedule {
    pub tenant_id: String,
    pub timezone: Tz,
    pub preferred_local_time: NaiveTime,

    /// Next UTC instant at which the local clock reads the preferred time
    pub optimal_run_instant: DateTime<Utc>,

    /// Occurrence one local day before `optimal_run_instant`
    pub previous_run_instant: DateTime<Utc>,

    pub priority_tier: PriorityTier,
}

impl TenantSchedule {
    /// Distance from `now` to the nearest occurrence
    pub fn distance_from(&self, now: DateTime<Utc>) -> Duration {
        let next = (self.optimal_run_instant - now).abs();
        let previous = (now - self.previous_run_instant).abs();
        next.min(previous)
    }

    /// Display schedule summary
    pub fn display(&self, now: DateTime<Utc>) -> String {
        let local = self.optimal_run_instant.with_timezone(&self.timezone);
        let until = self.optimal_run_instant - now;
        format!(
            "{:<24} {:<20} {} local  next {} ({}h {:02}m)  tier {}",
            self.tenant_id,
            self.timezone.name(),
            self.preferred_local_time.format("%H:%M"),
            local.format("%Y-%m-%d %H:%M %Z"),
            until.num_hours(),
            until.num_minutes() % 60,
            self.priority_tier
        )
    }
}

/// Outcome of a timing check for one tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDecision {
    pub priority_tier: PriorityTier,
    pub on_time: bool,
}

// ============================================================================
// Timezone Scheduler
// ============================================================================

/// Computes tenant run instants and run windows
#[derive(Debug, Clone, Copy)]
pub struct TimezoneScheduler {
    tolerance: Duration,
}

impl Default for TimezoneScheduler {
    fn default() -> Self {
        Self::new(Duration::minutes(10))
    }
}

impl TimezoneScheduler {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Next instant at or after `now` when the local clock in `tz` reads
    /// `local_time`. A time already passed today rolls to tomorrow.
    pub fn next_run_instant(
        &self,
        tz: Tz,
        local_time: NaiveTime,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let today = now.with_timezone(&tz).date_naive();
        let candidate = resolve_local(tz, today.and_time(local_time));
        if candidate >= now {
            return candidate;
        }

        let tomorrow = today.succ_opt().unwrap_or(today);
        resolve_local(tz, tomorrow.and_time(local_time))
    }

    /// Build the schedule for a tenant at `now`
    pub fn schedule_for(
        &self,
        config: &TenantConfig,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TenantSchedule> {
        let tz = config.tz()?;
        let local_time = config.local_time()?;

        let optimal = self.next_run_instant(tz, local_time, now);
        let optimal_date: NaiveDate = optimal.with_timezone(&tz).date_naive();
        let previous_date = optimal_date.pred_opt().unwrap_or(optimal_date);
        let previous = resolve_local(tz, previous_date.and_time(local_time));

        Ok(TenantSchedule {
            tenant_id: config.tenant_id.clone(),
            timezone: tz,
            preferred_local_time: local_time,
            optimal_run_instant: optimal,
            previous_run_instant: previous,
            priority_tier: config.priority_tier,
        })
    }

    /// Whether `now` is within tolerance of the nearest occurrence
    pub fn is_on_time(&self, schedule: &TenantSchedule, now: DateTime<Utc>) -> bool {
        schedule.distance_from(now) <= self.tolerance
    }

    /// Timing decision for a tenant. Unknown tenants run at the standard
    /// tier whenever they are due; `force` bypasses the window, including
    /// for tenants whose timezone or preferred time cannot be parsed.
    pub async fn decide(
        &self,
        provider: &dyn TenantConfigProvider,
        tenant_id: &str,
        now: DateTime<Utc>,
        force: bool,
    ) -> SchedulerResult<ScheduleDecision> {
        let Some(config) = provider.get(tenant_id).await? else {
            return Ok(ScheduleDecision {
                priority_tier: PriorityTier::default(),
                on_time: true,
            });
        };

        let schedule = match self.schedule_for(&config, now) {
            Ok(schedule) => schedule,
            Err(e) if force => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Invalid tenant schedule; forced run uses configured tier"
                );
                return Ok(ScheduleDecision {
                    priority_tier: config.priority_tier,
                    on_time: true,
                });
            }
            Err(e) => return Err(e),
        };
        let on_time = force || self.is_on_time(&schedule, now);

        tracing::debug!(
            tenant_id = %tenant_id,
            optimal = %schedule.optimal_run_instant,
            tier = %schedule.priority_tier,
            on_time,
            force,
            "Schedule evaluated"
        );

        Ok(ScheduleDecision {
            priority_tier: schedule.priority_tier,
            on_time,
        })
    }
}

/// Map a local wall-clock time to UTC, resolving DST folds to the earlier
/// instant and gaps to the first valid instant after the gap
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(a, b) => a.min(b).with_timezone(&Utc),
        LocalResult::None => {
            for minute in 1..=MAX_GAP_MINUTES {
                let shifted = local + Duration::minutes(minute);
                if let Some(dt) = tz.from_local_datetime(&shifted).earliest() {
                    return dt.with_timezone(&Utc);
                }
            }
            local.and_utc()
        }
    }
}
