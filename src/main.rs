use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dealerflow::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "dealerflow",
    version,
    about = "Multi-tenant dealer inventory job orchestrator",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); DEALERFLOW_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scheduling pass over pending and retry jobs
    Run {
        /// Ignore tenant run windows (dependencies still apply)
        #[arg(long, default_value = "false")]
        force: bool,

        /// Only consider jobs of this tenant
        #[arg(short, long)]
        tenant: Option<String>,

        /// Only consider jobs of this type
        #[arg(short, long)]
        job_type: Option<String>,

        /// Print Prometheus metrics after the run
        #[arg(long, default_value = "false")]
        metrics: bool,
    },

    /// Create a pending job
    Enqueue {
        /// Tenant (dealer) id
        #[arg(short, long)]
        tenant: String,

        /// Job type (primary_feed, enrichment_feed, detail_scrape, link_shorten)
        #[arg(short, long)]
        job_type: String,

        /// JSON payload handed to the executor
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Attempt budget (defaults to the configured value)
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Print the job-type dependency graph
    Graph,

    /// Print tenant schedules and whether each run window is open
    Schedule,

    /// Print job counts per status
    Status {
        /// Only count jobs of this tenant
        #[arg(short, long)]
        tenant: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!("dealerflow starting");

    match cli.command {
        Commands::Run {
            force,
            tenant,
            job_type,
            metrics,
        } => {
            tracing::info!(
                force = %force,
                tenant = ?tenant,
                job_type = ?job_type,
                "Starting run command"
            );
            commands::run(&config, force, tenant, job_type, metrics).await?;
        }

        Commands::Enqueue {
            tenant,
            job_type,
            payload,
            max_attempts,
        } => {
            tracing::info!(
                tenant = %tenant,
                job_type = %job_type,
                max_attempts = ?max_attempts,
                "Starting enqueue command"
            );
            commands::enqueue(&config, tenant, job_type, payload, max_attempts).await?;
        }

        Commands::Graph => {
            commands::graph()?;
        }

        Commands::Schedule => {
            commands::schedule(&config).await?;
        }

        Commands::Status { tenant } => {
            commands::status(&config, tenant).await?;
        }
    }

    tracing::info!("dealerflow completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("dealerflow=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("dealerflow={level},warn")))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
