//! Job executors
//!
//! A [`JobExecutor`] is the unit of work behind one [`JobType`]. Concrete
//! connectors (inventory feeds, scrapers, link shorteners) live outside the
//! orchestration core and are plugged in through an [`ExecutorRegistry`].
//! The core treats an executor as an opaque async function plus its error.

pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{JobRecord, JobType};

pub use webhook::{WebhookExecutor, WebhookExecutorConfig};

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors returned by executors
///
/// The variants carry enough structure for the error classifier to decide
/// between retrying and failing without parsing free text where avoidable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// Request or operation timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Connection could not be established or was reset
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote service answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The job payload could not be used
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// No executor is registered for the job type
    #[error("No executor registered for job type '{0}'")]
    NotRegistered(JobType),

    /// Anything else, classified by its message
    #[error("{0}")]
    Other(String),
}

impl ExecutorError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code carried by the error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExecutorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            Self::http(status.as_u16(), err.to_string())
        } else if err.is_decode() || err.is_body() {
            Self::InvalidPayload(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// The per-job-type unit of work
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run the job; the returned value is stored as the job result
    async fn execute(&self, job: &JobRecord) -> ExecutorResult<Value>;
}

/// Map from job type to its executor
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for a job type
    pub fn register(&mut self, job_type: JobType, executor: Arc<dyn JobExecutor>) -> &mut Self {
        if let Some(previous) = self.executors.insert(job_type, executor) {
            tracing::debug!(
                job_type = %job_type,
                previous = previous.name(),
                "Replaced registered executor"
            );
        }
        self
    }

    /// Builder-style registration
    pub fn with(mut self, job_type: JobType, executor: Arc<dyn JobExecutor>) -> Self {
        self.register(job_type, executor);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<&Arc<dyn JobExecutor>> {
        self.executors.get(&job_type)
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.executors.contains_key(&job_type)
    }

    /// Job types with no executor registered
    pub fn missing(&self) -> Vec<JobType> {
        JobType::all()
            .into_iter()
            .filter(|t| !self.executors.contains_key(t))
            .collect()
    }

    /// Run a job through its executor
    pub async fn execute(&self, job: &JobRecord) -> ExecutorResult<Value> {
        match self.executors.get(&job.job_type) {
            Some(executor) => executor.execute(job).await,
            None => Err(ExecutorError::NotRegistered(job.job_type)),
        }
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self
            .executors
            .iter()
            .map(|(t, e)| (t.as_str(), e.name().to_string()))
            .collect();
        names.sort();
        f.debug_struct("ExecutorRegistry")
            .field("executors", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoExecutor;

    #[async_trait]
    impl JobExecutor for EchoExecutor {
        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, job: &JobRecord) -> ExecutorResult<Value> {
            Ok(job.payload.clone())
        }
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let registry = ExecutorRegistry::new().with(JobType::PrimaryFeed, Arc::new(EchoExecutor));

        let job = JobRecord::new("dealer-1", JobType::PrimaryFeed, json!({"vin": "1HG"}), 3);
        let result = registry.execute(&job).await.unwrap();
        assert_eq!(result, json!({"vin": "1HG"}));
    }

    #[tokio::test]
    async fn test_registry_missing_executor() {
        let registry = ExecutorRegistry::new().with(JobType::PrimaryFeed, Arc::new(EchoExecutor));

        let job = JobRecord::new("dealer-1", JobType::LinkShorten, json!({}), 3);
        let err = registry.execute(&job).await.unwrap_err();
        assert_eq!(err, ExecutorError::NotRegistered(JobType::LinkShorten));

        assert!(registry.contains(JobType::PrimaryFeed));
        assert_eq!(registry.missing().len(), 3);
    }

    #[test]
    fn test_error_status_code() {
        assert_eq!(ExecutorError::http(503, "busy").status_code(), Some(503));
        assert_eq!(ExecutorError::other("x").status_code(), None);
        assert_eq!(
            ExecutorError::http(429, "slow down").to_string(),
            "HTTP 429: slow down"
        );
    }
}
