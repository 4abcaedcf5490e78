//! Built-in event sinks

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{EventResult, EventSink, JobEvent};
use crate::metrics;

// ============================================================================
// Tracing
// ============================================================================

/// Writes events as structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn emit(&self, event: &JobEvent) -> EventResult<()> {
        match event {
            JobEvent::BatchStarted { tier, batch, size, .. } => {
                tracing::info!(tier = %tier, batch, size, "Batch started");
            }
            JobEvent::BatchCompleted {
                tier,
                batch,
                size,
                duration_ms,
                ..
            } => {
                tracing::info!(tier = %tier, batch, size, duration_ms, "Batch completed");
            }
            JobEvent::JobStarted {
                job_id,
                tenant_id,
                job_type,
                attempt,
                ..
            } => {
                tracing::debug!(
                    job_id = %job_id,
                    tenant_id = %tenant_id,
                    job_type = %job_type,
                    attempt,
                    "Job started"
                );
            }
            JobEvent::JobCompleted {
                job_id,
                tenant_id,
                job_type,
                attempt,
                duration_ms,
                ..
            } => {
                tracing::info!(
                    job_id = %job_id,
                    tenant_id = %tenant_id,
                    job_type = %job_type,
                    attempt,
                    duration_ms,
                    "Job completed"
                );
            }
            JobEvent::JobFailed {
                job_id,
                tenant_id,
                job_type,
                attempt,
                outcome,
                error,
                retry_at,
                ..
            } => {
                tracing::warn!(
                    job_id = %job_id,
                    tenant_id = %tenant_id,
                    job_type = %job_type,
                    attempt,
                    outcome = %outcome,
                    retry_at = ?retry_at,
                    error = %error,
                    "Job failed"
                );
            }
        }
        Ok(())
    }
}

// ============================================================================
// Broadcast
// ============================================================================

/// Publishes events on a tokio broadcast channel
///
/// Events sent while nobody is subscribed are dropped. Slow subscribers
/// lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<JobEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to live events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn emit(&self, event: &JobEvent) -> EventResult<()> {
        // No subscribers is not an error
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Feeds the prometheus counters
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsEventSink;

#[async_trait]
impl EventSink for MetricsEventSink {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn emit(&self, event: &JobEvent) -> EventResult<()> {
        match event {
            JobEvent::BatchStarted { tier, .. } => metrics::record_batch(tier.as_str()),
            JobEvent::JobCompleted {
                job_type,
                duration_ms,
                ..
            } => metrics::record_job(
                job_type.as_str(),
                "succeeded",
                *duration_ms as f64 / 1000.0,
            ),
            JobEvent::JobFailed {
                job_type,
                outcome,
                duration_ms,
                ..
            } => metrics::record_job(
                job_type.as_str(),
                outcome.as_str(),
                *duration_ms as f64 / 1000.0,
            ),
            JobEvent::BatchCompleted { .. } | JobEvent::JobStarted { .. } => {}
        }
        Ok(())
    }
}

// ============================================================================
// Fanout
// ============================================================================

/// Forwards every event to several sinks
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink (builder style)
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("FanoutEventSink")
            .field("sinks", &names)
            .finish()
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn emit(&self, event: &JobEvent) -> EventResult<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(event).await {
                tracing::warn!(
                    sink = sink.name(),
                    event = event.name(),
                    error = %e,
                    "Failed to deliver event"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventError;
    use crate::models::PriorityTier;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        count: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn emit(&self, _event: &JobEvent) -> EventResult<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EventError::Closed);
            }
            Ok(())
        }
    }

    fn batch_started() -> JobEvent {
        JobEvent::BatchStarted {
            tier: PriorityTier::Premium,
            batch: 1,
            size: 3,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        sink.emit(&batch_started()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name(), "batch_started");
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let sink = BroadcastEventSink::default();
        assert_eq!(sink.receiver_count(), 0);
        assert!(sink.emit(&batch_started()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fanout_continues_after_failure() {
        let failing = Arc::new(CountingSink {
            fail: true,
            ..Default::default()
        });
        let healthy = Arc::new(CountingSink::default());

        let fanout = FanoutEventSink::new()
            .with(failing.clone())
            .with(healthy.clone());
        assert_eq!(fanout.len(), 2);

        assert!(fanout.emit(&batch_started()).await.is_ok());
        assert_eq!(failing.count.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tracing_and_metrics_sinks_accept_all_events() {
        let event = batch_started();
        assert!(TracingEventSink.emit(&event).await.is_ok());
        assert!(MetricsEventSink.emit(&event).await.is_ok());
    }
}
