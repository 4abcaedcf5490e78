//! Common test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use dealerflow::clock::FakeClock;
use dealerflow::events::{EventResult, EventSink, JobEvent};
use dealerflow::executor::{ExecutorError, ExecutorResult, JobExecutor};
use dealerflow::orchestrator::OrchestratorConfig;
use dealerflow::{JobRecord, JobType};

/// Fixed starting instant: 2024-06-15 12:00:00 UTC
pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

pub fn fake_clock() -> Arc<FakeClock> {
    Arc::new(FakeClock::new(start_instant()))
}

/// A pending job created and due at `at`
pub fn job_at(tenant_id: &str, job_type: JobType, at: DateTime<Utc>) -> JobRecord {
    JobRecord::new(tenant_id, job_type, json!({"tenant": tenant_id}), 3)
        .created(at)
        .scheduled_for(at)
}

/// Orchestrator config without inter-batch pauses
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::builder()
        .inter_batch_pause_ms(0)
        .build()
        .unwrap()
}

// ============================================================================
// Event Sink
// ============================================================================

/// Keeps every event it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(JobEvent::name).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn emit(&self, event: &JobEvent) -> EventResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// Executors
// ============================================================================

/// Returns scripted results in order, then the fallback forever
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<ExecutorResult<Value>>>,
    fallback: ExecutorResult<Value>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn always(result: ExecutorResult<Value>) -> Arc<Self> {
        Self::scripted(Vec::new(), result)
    }

    pub fn succeeding() -> Arc<Self> {
        Self::always(Ok(json!({"ok": true})))
    }

    pub fn failing(error: ExecutorError) -> Arc<Self> {
        Self::always(Err(error))
    }

    pub fn scripted(script: Vec<ExecutorResult<Value>>, fallback: ExecutorResult<Value>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, _job: &JobRecord) -> ExecutorResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Tracks how many executions overlap
pub struct InstrumentedExecutor {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    order: Mutex<Vec<String>>,
    delay: StdDuration,
}

impl InstrumentedExecutor {
    pub fn new(delay: StdDuration) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tenant ids in the order executions started
    pub fn tenant_order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobExecutor for InstrumentedExecutor {
    fn name(&self) -> &str {
        "instrumented"
    }

    async fn execute(&self, job: &JobRecord) -> ExecutorResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(job.tenant_id.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"tenant": job.tenant_id}))
    }
}
