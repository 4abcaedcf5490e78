use anyhow::{Context, Result};
use serde_json::Value;

use dealerflow::config::Config;

use super::{build_orchestrator, parse_job_type};

pub async fn enqueue(
    config: &Config,
    tenant: String,
    job_type: String,
    payload: String,
    max_attempts: Option<u32>,
) -> Result<()> {
    let job_type = parse_job_type(&job_type)?;
    let payload: Value = serde_json::from_str(&payload).context("Payload is not valid JSON")?;

    let orchestrator = build_orchestrator(config)?;
    let job = orchestrator
        .enqueue(&tenant, job_type, payload, max_attempts)
        .await
        .context("Failed to enqueue job")?;

    println!("Enqueued job {}", job.id);
    println!("  Tenant:       {}", job.tenant_id);
    println!("  Type:         {}", job.job_type);
    println!("  Max attempts: {}", job.max_attempts);
    println!("  Scheduled at: {}", job.scheduled_at.to_rfc3339());

    Ok(())
}
