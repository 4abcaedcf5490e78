pub mod enqueue;
pub mod inspect;
pub mod run;

use anyhow::{Context, Result};

use dealerflow::config::Config;
use dealerflow::metrics;
use dealerflow::orchestrator::Orchestrator;

// Re-export command functions for convenience
pub use enqueue::enqueue;
pub use inspect::{graph, schedule, status};
pub use run::run;

/// Wire the orchestrator's collaborators from configuration
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registry unavailable");
    }

    Orchestrator::from_config(config)
        .map_err(|e| {
            tracing::error!(
                category = e.category().as_str(),
                recoverable = e.is_recoverable(),
                error = %e,
                "Failed to set up orchestrator"
            );
            e
        })
        .context("Failed to set up orchestrator")
}

/// Parse a job type argument or list the accepted names
pub fn parse_job_type(value: &str) -> Result<dealerflow::JobType> {
    dealerflow::JobType::parse(value).with_context(|| {
        let names: Vec<&str> = dealerflow::JobType::all()
            .iter()
            .map(|t| t.as_str())
            .collect();
        format!("Unknown job type '{value}' (expected one of: {})", names.join(", "))
    })
}
