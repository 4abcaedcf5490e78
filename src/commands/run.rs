use anyhow::{bail, Result};

use dealerflow::config::Config;
use dealerflow::metrics;
use dealerflow::RunOptions;

use super::{build_orchestrator, parse_job_type};

pub async fn run(
    config: &Config,
    force: bool,
    tenant: Option<String>,
    job_type: Option<String>,
    show_metrics: bool,
) -> Result<()> {
    let job_type = job_type.as_deref().map(parse_job_type).transpose()?;
    let orchestrator = build_orchestrator(config)?;

    let options = RunOptions {
        force,
        tenant_id: tenant,
        job_type,
    };

    println!("Starting run");
    println!("================================");
    if force {
        println!("Force: run windows ignored, dependencies still apply");
    }
    if let Some(tenant) = &options.tenant_id {
        println!("Tenant: {tenant}");
    }
    if let Some(job_type) = options.job_type {
        println!("Job type: {job_type}");
    }

    let summary = orchestrator.run(options).await;

    println!();
    print!("{}", summary.display());

    if show_metrics {
        match metrics::gather_metrics() {
            Ok(text) => {
                println!();
                print!("{text}");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to gather metrics"),
        }
    }

    if let Some(error) = summary.error {
        bail!("Run aborted: {error}");
    }

    Ok(())
}
