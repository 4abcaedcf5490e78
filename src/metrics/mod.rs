//! Prometheus metrics for job orchestration
//!
//! This module tracks:
//! - Job executions by type and outcome, with execution duration
//! - Batches started per priority tier
//! - Circuit-open outcomes per job type
//! - Run-level counters (processed, blocked, deferred)
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all orchestrator metrics
struct JobMetrics {
    jobs_total: CounterVec,
    job_duration: HistogramVec,
    batches_total: CounterVec,
    circuit_open_total: CounterVec,
    run_jobs: CounterVec,
}

/// Global storage for orchestrator metrics
static JOB_METRICS: OnceLock<JobMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once. If registration fails, errors are returned
/// once and subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = dealerflow::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = JobMetrics {
        jobs_total: register_counter_vec!(
            "dealerflow_jobs_total",
            "Total job executions by type and outcome",
            &["job_type", "outcome"]
        )?,
        job_duration: register_histogram_vec!(
            "dealerflow_job_duration_seconds",
            "Job execution duration in seconds",
            &["job_type"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
        )?,
        batches_total: register_counter_vec!(
            "dealerflow_batches_total",
            "Total batches started per priority tier",
            &["tier"]
        )?,
        circuit_open_total: register_counter_vec!(
            "dealerflow_circuit_open_total",
            "Total jobs failed because their circuit was open",
            &["job_type"]
        )?,
        run_jobs: register_counter_vec!(
            "dealerflow_run_jobs_total",
            "Jobs seen by orchestrator runs, by disposition",
            &["disposition"]
        )?,
    };

    JOB_METRICS
        .set(metrics)
        .map_err(|_| "Job metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    JOB_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a finished job execution
pub fn record_job(job_type: &str, outcome: &str, duration_secs: f64) {
    let Some(m) = JOB_METRICS.get() else {
        return;
    };

    m.jobs_total.with_label_values(&[job_type, outcome]).inc();
    m.job_duration
        .with_label_values(&[job_type])
        .observe(duration_secs);

    if outcome == "circuit_open" {
        m.circuit_open_total.with_label_values(&[job_type]).inc();
    }
}

/// Record a batch start
pub fn record_batch(tier: &str) {
    if let Some(m) = JOB_METRICS.get() {
        m.batches_total.with_label_values(&[tier]).inc();
    }
}

/// Record the dispositions of one run
pub fn record_run(processed: usize, blocked: usize, deferred: usize) {
    let Some(m) = JOB_METRICS.get() else {
        return;
    };

    for (disposition, count) in [
        ("processed", processed),
        ("blocked", blocked),
        ("deferred", deferred),
    ] {
        if count > 0 {
            m.run_jobs
                .with_label_values(&[disposition])
                .inc_by(count as f64);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());
        // Idempotent
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_metrics_initialized() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_gather_metrics() {
        ensure_metrics_initialized();
        record_job("primary_feed", "succeeded", 1.5);
        record_batch("premium");

        let text = gather_metrics().unwrap();
        assert!(text.contains("dealerflow_jobs_total"));
        assert!(text.contains("dealerflow_batches_total"));
    }

    #[test]
    fn test_circuit_open_recorded() {
        ensure_metrics_initialized();
        record_job("detail_scrape", "circuit_open", 0.1);

        let text = gather_metrics().unwrap();
        assert!(text.contains("dealerflow_circuit_open_total"));
    }

    #[test]
    fn test_metrics_noop_safe() {
        record_job("link_shorten", "failed", 0.2);
        record_batch("economy");
        record_run(3, 1, 0);
    }
}
