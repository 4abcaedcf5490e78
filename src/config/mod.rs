//! Configuration management for dealerflow
//!
//! Configuration is read from a TOML file, from `DEALERFLOW_*` environment
//! variables, or both (environment overrides the file). Every section and
//! field is optional and falls back to its default.
//!
//! ```toml
//! [orchestrator]
//! default_max_attempts = 3
//! inter_batch_pause_ms = 250
//! window_tolerance_mins = 10
//!
//! [orchestrator.concurrency]
//! premium = 10
//! standard = 5
//! economy = 2
//!
//! [retry]
//! base_delay_secs = 30
//! max_delay_secs = 3600
//!
//! [breaker]
//! failure_threshold = 5
//! cooldown_secs = 300
//!
//! [executors.webhooks]
//! primary_feed = "https://connectors.internal/feeds/primary"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::executor::WebhookExecutorConfig;
use crate::models::JobType;
use crate::orchestrator::OrchestratorConfig;
use crate::resilience::{BreakerConfig, RetryPolicy, MAX_RETRY_DELAY_SECS};

/// Rejected configuration value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run behaviour: attempts, pacing, run window, tier limits
    pub orchestrator: OrchestratorConfig,

    /// Backoff for retryable failures
    pub retry: RetryPolicy,

    /// Circuit breaker thresholds
    pub breaker: BreakerConfig,

    /// Job store configuration
    pub database: DatabaseConfig,

    /// Tenant schedule source
    pub tenants: TenantsConfig,

    /// Executor endpoints
    pub executors: ExecutorsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/jobs.db"),
        }
    }
}

/// Tenant configuration source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantsConfig {
    /// TOML file with `[[tenant]]` entries
    pub config_path: PathBuf,
}

impl Default for TenantsConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/tenants.toml"),
        }
    }
}

/// Webhook executors keyed by job type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorsConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Bearer token sent to every endpoint
    pub auth_token: Option<String>,

    /// Job type name -> endpoint URL
    pub webhooks: BTreeMap<String, String>,
}

impl Default for ExecutorsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            auth_token: None,
            webhooks: BTreeMap::new(),
        }
    }
}

impl ExecutorsConfig {
    /// Resolve configured webhooks into executor configs
    pub fn webhook_configs(&self) -> std::result::Result<Vec<(JobType, WebhookExecutorConfig)>, ConfigError> {
        let mut configs = Vec::with_capacity(self.webhooks.len());

        for (name, url) in &self.webhooks {
            let field = format!("executors.webhooks.{name}");
            let job_type = JobType::parse(name)
                .ok_or_else(|| ConfigError::invalid(&field, "unknown job type"))?;

            let mut config = WebhookExecutorConfig::new(url).with_timeout(self.timeout_secs);
            if let Some(token) = &self.auth_token {
                config = config.with_auth_token(token);
            }
            config
                .validate()
                .map_err(|reason| ConfigError::invalid(&field, reason))?;

            configs.push((job_type, config));
        }

        Ok(configs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// File (when given) overridden by the environment, then validated
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `DEALERFLOW_*` variables supplied by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let orchestrator = &mut self.orchestrator;
        set_parsed(&lookup, "DEALERFLOW_MAX_ATTEMPTS", &mut orchestrator.default_max_attempts)?;
        set_parsed(&lookup, "DEALERFLOW_INTER_BATCH_PAUSE_MS", &mut orchestrator.inter_batch_pause_ms)?;
        set_parsed(&lookup, "DEALERFLOW_WINDOW_TOLERANCE_MINS", &mut orchestrator.window_tolerance_mins)?;
        set_parsed(&lookup, "DEALERFLOW_CONCURRENCY_PREMIUM", &mut orchestrator.concurrency.premium)?;
        set_parsed(&lookup, "DEALERFLOW_CONCURRENCY_STANDARD", &mut orchestrator.concurrency.standard)?;
        set_parsed(&lookup, "DEALERFLOW_CONCURRENCY_ECONOMY", &mut orchestrator.concurrency.economy)?;

        set_parsed(&lookup, "DEALERFLOW_RETRY_BASE_SECS", &mut self.retry.base_delay_secs)?;
        set_parsed(&lookup, "DEALERFLOW_RETRY_MAX_SECS", &mut self.retry.max_delay_secs)?;

        set_parsed(&lookup, "DEALERFLOW_BREAKER_THRESHOLD", &mut self.breaker.failure_threshold)?;
        set_parsed(&lookup, "DEALERFLOW_BREAKER_COOLDOWN_SECS", &mut self.breaker.cooldown_secs)?;

        if let Some(path) = lookup("DEALERFLOW_SQLITE_PATH") {
            self.database.sqlite_path = path.into();
        }
        if let Some(path) = lookup("DEALERFLOW_TENANTS_PATH") {
            self.tenants.config_path = path.into();
        }

        set_parsed(&lookup, "DEALERFLOW_EXECUTOR_TIMEOUT_SECS", &mut self.executors.timeout_secs)?;
        if let Some(token) = lookup("DEALERFLOW_EXECUTOR_TOKEN") {
            self.executors.auth_token = Some(token);
        }
        for job_type in JobType::all() {
            let key = format!("DEALERFLOW_WEBHOOK_{}", job_type.as_str().to_uppercase());
            if let Some(url) = lookup(&key) {
                self.executors
                    .webhooks
                    .insert(job_type.as_str().to_string(), url);
            }
        }

        if let Some(level) = lookup("DEALERFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("DEALERFLOW_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.orchestrator
            .validate()
            .map_err(|reason| ConfigError::invalid("orchestrator", reason))?;

        if self.retry.base_delay_secs == 0 {
            return Err(ConfigError::invalid(
                "retry.base_delay_secs",
                "must be greater than 0",
            ));
        }
        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(ConfigError::invalid(
                "retry.max_delay_secs",
                "must not be smaller than base_delay_secs",
            ));
        }
        if self.retry.max_delay_secs > MAX_RETRY_DELAY_SECS {
            return Err(ConfigError::invalid(
                "retry.max_delay_secs",
                format!("must not exceed {MAX_RETRY_DELAY_SECS} (one year)"),
            ));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "breaker.failure_threshold",
                "must be greater than 0",
            ));
        }
        if self.breaker.cooldown_secs < 0 {
            return Err(ConfigError::invalid(
                "breaker.cooldown_secs",
                "cannot be negative",
            ));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("expected 'text' or 'json', got '{}'", self.logging.format),
            ));
        }

        self.executors.webhook_configs()?;
        Ok(())
    }
}

fn set_parsed<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {key}='{raw}': {e}"))?;
    }
    Ok(())
}
