//! Priority-tiered batch execution
//!
//! ```text
//!  premium  [b1: ≤10 jobs]──pause──[b2]──pause──┐
//!                                                │
//!  standard [b1: ≤5 jobs]──pause──[b2]──pause────┤
//!                                                │
//!  economy  [b1: ≤2 jobs]──pause──[b2] ...  ◀────┘
//! ```
//!
//! Jobs in a batch run concurrently on the current task; a batch is awaited
//! in full before the next one starts. Nothing is spawned.
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `premium` | 10 | Jobs per premium batch |
//! | `standard` | 5 | Jobs per standard batch |
//! | `economy` | 2 | Jobs per economy batch |
//! | `inter_batch_pause_ms` | 250 | Pause between consecutive batches |

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::events::{publish, EventSink, JobEvent};
use crate::models::{JobRecord, PriorityTier};

// ============================================================================
// Limits
// ============================================================================

/// Batch size per priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    pub premium: usize,
    pub standard: usize,
    pub economy: usize,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            premium: 10,
            standard: 5,
            economy: 2,
        }
    }
}

impl TierLimits {
    pub fn new(premium: usize, standard: usize, economy: usize) -> Self {
        Self {
            premium,
            standard,
            economy,
        }
    }

    /// Batch size for a tier, never below one
    pub fn for_tier(&self, tier: PriorityTier) -> usize {
        let limit = match tier {
            PriorityTier::Premium => self.premium,
            PriorityTier::Standard => self.standard,
            PriorityTier::Economy => self.economy,
        };
        limit.max(1)
    }
}

/// Group jobs by their resolved tier, keeping fetch order within a tier.
/// Jobs without a tier count as standard.
pub fn partition_by_tier(jobs: Vec<JobRecord>) -> BTreeMap<PriorityTier, Vec<JobRecord>> {
    let mut tiers: BTreeMap<PriorityTier, Vec<JobRecord>> = BTreeMap::new();
    for job in jobs {
        tiers
            .entry(job.priority_tier.unwrap_or_default())
            .or_default()
            .push(job);
    }
    tiers
}

// ============================================================================
// Concurrency Scheduler
// ============================================================================

/// Runs jobs tier by tier in bounded batches
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyScheduler {
    limits: TierLimits,
    pause: Duration,
}

impl Default for ConcurrencyScheduler {
    fn default() -> Self {
        Self::new(TierLimits::default(), Duration::from_millis(250))
    }
}

impl ConcurrencyScheduler {
    pub fn new(limits: TierLimits, pause: Duration) -> Self {
        Self { limits, pause }
    }

    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    /// Execute `process` for every job.
    ///
    /// Tiers run strictly in `premium -> standard -> economy` order. Results
    /// are returned in execution order.
    pub async fn execute<F, Fut, T>(
        &self,
        jobs: Vec<JobRecord>,
        sink: &dyn EventSink,
        process: F,
    ) -> Vec<T>
    where
        F: Fn(JobRecord) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut tiers = partition_by_tier(jobs);
        let mut results = Vec::new();
        let mut batches_run = 0usize;

        for tier in PriorityTier::execution_order() {
            let Some(mut jobs) = tiers.remove(&tier) else {
                continue;
            };
            let limit = self.limits.for_tier(tier);
            let mut batch_no = 0usize;

            while !jobs.is_empty() {
                if batches_run > 0 && !self.pause.is_zero() {
                    tokio::time::sleep(self.pause).await;
                }

                let rest = jobs.split_off(limit.min(jobs.len()));
                let batch = std::mem::replace(&mut jobs, rest);
                let size = batch.len();
                batch_no += 1;
                batches_run += 1;

                publish(
                    sink,
                    JobEvent::BatchStarted {
                        tier,
                        batch: batch_no,
                        size,
                        at: Utc::now(),
                    },
                )
                .await;

                let started = Instant::now();
                let outcomes = join_all(batch.into_iter().map(&process)).await;
                results.extend(outcomes);

                publish(
                    sink,
                    JobEvent::BatchCompleted {
                        tier,
                        batch: batch_no,
                        size,
                        duration_ms: started.elapsed().as_millis() as u64,
                        at: Utc::now(),
                    },
                )
                .await;
            }
        }

        results
    }
}
