//! Webhook executor
//!
//! Delegates a job to an external connector service by POSTing the job as
//! JSON. The connector's JSON response becomes the job result. Failures are
//! mapped onto [`ExecutorError`] variants so the classifier can tell a
//! timeout or a 503 from a rejected payload.
//!
//! No in-process retries happen here: retry scheduling is durable and owned
//! by the orchestrator through `scheduled_at`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use super::{ExecutorError, ExecutorResult, JobExecutor};
use crate::models::JobRecord;

/// Webhook executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookExecutorConfig {
    /// Connector endpoint URL
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    60
}

impl WebhookExecutorConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| format!("Invalid webhook URL '{}': {e}", self.url))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "Webhook URL must use http or https, got '{}'",
                parsed.scheme()
            ));
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Executor that forwards jobs to an HTTP connector
pub struct WebhookExecutor {
    name: String,
    config: WebhookExecutorConfig,
    client: Client,
}

impl WebhookExecutor {
    pub fn new(name: impl Into<String>, config: WebhookExecutorConfig) -> ExecutorResult<Self> {
        config.validate().map_err(ExecutorError::InvalidPayload)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExecutorError::other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_body(&self, job: &JobRecord) -> Value {
        serde_json::json!({
            "job_id": job.id,
            "tenant_id": job.tenant_id,
            "job_type": job.job_type.as_str(),
            "attempt": job.attempts,
            "max_attempts": job.max_attempts,
            "payload": job.payload,
        })
    }
}

#[async_trait]
impl JobExecutor for WebhookExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, job: &JobRecord) -> ExecutorResult<Value> {
        let mut request = self.client.post(&self.config.url);

        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.json(&self.build_body(job)).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            tracing::debug!(
                executor = %self.name,
                job_id = %job.id,
                status = status.as_u16(),
                "Connector rejected job"
            );
            return Err(ExecutorError::http(status.as_u16(), body));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::json!({ "status": status.as_u16() }));
        }

        serde_json::from_str(&text).or_else(|_| Ok(serde_json::json!({ "body": text })))
    }
}
