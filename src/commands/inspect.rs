use anyhow::{Context, Result};
use chrono::Utc;

use dealerflow::config::Config;
use dealerflow::scheduler::DependencyResolver;

use super::build_orchestrator;

/// Print the built-in dependency graph
pub fn graph() -> Result<()> {
    let resolver = DependencyResolver::default();
    let graph = resolver.graph();

    println!("Job Dependency Graph");
    println!("================================");
    print!("{}", graph.display());

    if graph.has_cycles() {
        println!();
        println!("Job types on a cycle are never scheduled.");
    }

    Ok(())
}

/// Print every configured tenant's next run and window state
pub async fn schedule(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let schedules = orchestrator.tenant_schedules().await;
    let now = Utc::now();

    println!("Tenant Schedules ({})", now.format("%Y-%m-%d %H:%M UTC"));
    println!("================================");

    if schedules.is_empty() {
        println!(
            "No tenants configured. Add [[tenant]] entries to {}",
            config.tenants.config_path.display()
        );
        return Ok(());
    }

    let open = schedules.iter().filter(|(_, on_time)| *on_time).count();
    for (schedule, on_time) in &schedules {
        let marker = if *on_time { "OPEN  " } else { "closed" };
        println!("[{marker}] {}", schedule.display(now));
    }
    println!();
    println!("{open}/{} tenants inside their run window", schedules.len());

    Ok(())
}

/// Print job counts per status
pub async fn status(config: &Config, tenant: Option<String>) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let counts = orchestrator
        .store()
        .status_counts(tenant.as_deref())
        .await
        .context("Failed to count jobs")?;

    if let Some(tenant) = &tenant {
        println!("Tenant: {tenant}");
    }
    print!("{}", counts.display());

    Ok(())
}
