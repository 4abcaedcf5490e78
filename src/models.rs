// Core data structures for the dealerflow job queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Job Type
// ============================================================================

/// Category of work; selects the executor and the dependency rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Main inventory feed ingestion
    PrimaryFeed,
    /// Secondary feed that enriches primary inventory
    EnrichmentFeed,
    /// Vehicle detail page scraping
    DetailScrape,
    /// Short link generation for vehicle detail URLs
    LinkShorten,
}

impl JobType {
    /// Get string representation (matches the stored column value)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryFeed => "primary_feed",
            Self::EnrichmentFeed => "enrichment_feed",
            Self::DetailScrape => "detail_scrape",
            Self::LinkShorten => "link_shorten",
        }
    }

    /// Parse from the stored or user-supplied representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "primary_feed" | "primary" => Some(Self::PrimaryFeed),
            "enrichment_feed" | "enrichment" => Some(Self::EnrichmentFeed),
            "detail_scrape" | "scrape" => Some(Self::DetailScrape),
            "link_shorten" | "shorten" => Some(Self::LinkShorten),
            _ => None,
        }
    }

    /// All job types in declaration order
    pub fn all() -> Vec<Self> {
        vec![
            Self::PrimaryFeed,
            Self::EnrichmentFeed,
            Self::DetailScrape,
            Self::LinkShorten,
        ]
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job Status
// ============================================================================

/// Lifecycle state of a job record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retry,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retry => "retry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }

    /// Statuses a worker may claim from
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }

    /// No further transitions leave a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Processing,
            Self::Completed,
            Self::Failed,
            Self::Retry,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Priority Tier
// ============================================================================

/// Tenant service tier; controls execution order and concurrency allocation
///
/// Ordering follows execution order: `Premium < Standard < Economy`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Premium,
    #[default]
    Standard,
    Economy,
}

impl PriorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Premium => "premium",
            Self::Standard => "standard",
            Self::Economy => "economy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "premium" => Some(Self::Premium),
            "standard" => Some(Self::Standard),
            "economy" => Some(Self::Economy),
            _ => None,
        }
    }

    /// Tiers in the fixed order they are executed
    pub fn execution_order() -> [Self; 3] {
        [Self::Premium, Self::Standard, Self::Economy]
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job Record
// ============================================================================

/// One row per unit of scheduled work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub tenant_id: String,
    pub job_type: JobType,
    pub status: JobStatus,

    /// Derived at scheduling time from the tenant schedule; never stored
    #[serde(skip)]
    pub priority_tier: Option<PriorityTier>,

    pub attempts: u32,
    pub max_attempts: u32,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Earliest instant the job may be claimed
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a new pending job that may run immediately
    pub fn new(
        tenant_id: impl Into<String>,
        job_type: JobType,
        payload: Value,
        max_attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            job_type,
            status: JobStatus::Pending,
            priority_tier: None,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            payload,
            result: None,
            error: None,
            scheduled_at: now,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Override the earliest claim instant
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = at;
        self
    }

    /// Override the creation instant (controls fetch order)
    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Whether the job may be claimed at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.scheduled_at <= now
    }

    /// Remaining execution budget
    pub fn attempts_left(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Short identifier for log lines
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

// ============================================================================
// Execution Audit Record
// ============================================================================

/// Outcome of a single execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded,
    Retrying,
    Failed,
    CircuitOpen,
}

impl ExecutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
            Self::CircuitOpen => "circuit_open",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(Self::Succeeded),
            "retrying" => Some(Self::Retrying),
            "failed" => Some(Self::Failed),
            "circuit_open" => Some(Self::CircuitOpen),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit trail entry appended after each execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub job_id: String,
    pub tenant_id: String,
    pub job_type: JobType,
    pub attempt: u32,
    pub outcome: ExecutionOutcome,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionRecord {
    /// Build an audit entry for a job that just finished an attempt
    pub fn for_job(
        job: &JobRecord,
        outcome: ExecutionOutcome,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            job_type: job.job_type,
            attempt: job.attempts,
            outcome,
            error: job.error.clone(),
            started_at,
            finished_at,
            duration_ms,
        }
    }
}

// ============================================================================
// Run Options & Summary
// ============================================================================

/// Filter accepted from the run trigger surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Bypass schedule-window checks (dependencies still apply)
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub job_type: Option<JobType>,
}

impl RunOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }

    pub fn for_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn for_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }
}

/// Aggregate counters reported back to the caller of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Jobs claimed and executed
    pub processed: usize,
    pub succeeded: usize,
    /// Jobs that ended in the terminal `failed` state
    pub failed: usize,
    /// Jobs rescheduled for a later attempt
    pub retried: usize,
    /// Jobs held back by unmet prerequisites
    pub blocked: usize,
    /// Jobs outside their tenant's run window
    pub deferred: usize,
    /// Jobs lost to a concurrent claim
    pub skipped: usize,
    /// Set when the run could not fetch candidates at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// Summary for a run aborted before any job was considered
    pub fn aborted(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.failed == 0
    }

    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Run Summary\n");
        output.push_str(&format!("{:-<30}\n", ""));
        output.push_str(&format!("Processed: {}\n", self.processed));
        output.push_str(&format!("Succeeded: {}\n", self.succeeded));
        output.push_str(&format!("Failed:    {}\n", self.failed));
        output.push_str(&format!("Retried:   {}\n", self.retried));
        output.push_str(&format!("Blocked:   {}\n", self.blocked));
        output.push_str(&format!("Deferred:  {}\n", self.deferred));
        output.push_str(&format!("Skipped:   {}\n", self.skipped));
        if let Some(ref error) = self.error {
            output.push_str(&format!("Error: {error}\n"));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_type_parse() {
        assert_eq!(JobType::parse("primary_feed"), Some(JobType::PrimaryFeed));
        assert_eq!(JobType::parse("detail-scrape"), Some(JobType::DetailScrape));
        assert_eq!(JobType::parse("Link_Shorten"), Some(JobType::LinkShorten));
        assert_eq!(JobType::parse("unknown"), None);

        for job_type in JobType::all() {
            assert_eq!(JobType::parse(job_type.as_str()), Some(job_type));
        }
    }

    #[test]
    fn test_job_type_serde_name() {
        let json = serde_json::to_string(&JobType::EnrichmentFeed).unwrap();
        assert_eq!(json, "\"enrichment_feed\"");
    }

    #[test]
    fn test_status_claimable_and_terminal() {
        assert!(JobStatus::Pending.is_claimable());
        assert!(JobStatus::Retry.is_claimable());
        assert!(!JobStatus::Processing.is_claimable());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Retry.is_terminal());
    }

    #[test]
    fn test_tier_ordering() {
        let mut tiers = vec![
            PriorityTier::Economy,
            PriorityTier::Premium,
            PriorityTier::Standard,
        ];
        tiers.sort();
        assert_eq!(tiers, PriorityTier::execution_order().to_vec());
        assert_eq!(PriorityTier::default(), PriorityTier::Standard);
    }

    #[test]
    fn test_new_job_defaults() {
        let job = JobRecord::new("dealer-1", JobType::PrimaryFeed, json!({"feed": "x"}), 3);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
        assert!(job.priority_tier.is_none());
        assert!(job.is_due(Utc::now()));
        assert_eq!(job.short_id().len(), 8);
    }

    #[test]
    fn test_zero_max_attempts_clamped() {
        let job = JobRecord::new("dealer-1", JobType::PrimaryFeed, json!({}), 0);
        assert_eq!(job.max_attempts, 1);
        assert_eq!(job.attempts_left(), 1);
    }

    #[test]
    fn test_attempts_left_saturates() {
        let mut job = JobRecord::new("dealer-1", JobType::PrimaryFeed, json!({}), 3);
        job.attempts = 2;
        assert_eq!(job.attempts_left(), 1);
        job.attempts = 5;
        assert_eq!(job.attempts_left(), 0);
    }

    #[test]
    fn test_future_job_not_due() {
        let job = JobRecord::new("dealer-1", JobType::PrimaryFeed, json!({}), 3)
            .scheduled_for(Utc::now() + chrono::Duration::minutes(5));
        assert!(!job.is_due(Utc::now()));
    }

    #[test]
    fn test_run_summary_display() {
        let summary = RunSummary {
            processed: 3,
            succeeded: 2,
            failed: 1,
            ..Default::default()
        };
        let display = summary.display();
        assert!(display.contains("Processed: 3"));
        assert!(!summary.is_clean());

        let aborted = RunSummary::aborted("store unavailable");
        assert_eq!(aborted.processed, 0);
        assert!(aborted.display().contains("store unavailable"));
    }
}
