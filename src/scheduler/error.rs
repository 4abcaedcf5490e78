//! Error types for the scheduler module

use thiserror::Error;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Unknown IANA timezone name
    #[error("Invalid timezone: {tz}")]
    InvalidTimezone { tz: String },

    /// Preferred local time is not `HH:MM`
    #[error("Invalid time '{value}'. Expected HH:MM")]
    InvalidTime { value: String },

    /// Tenant configuration could not be used
    #[error("Tenant config error for '{tenant_id}': {reason}")]
    TenantConfig { tenant_id: String, reason: String },

    /// Tenant configuration file could not be parsed
    #[error("Failed to parse tenant config: {0}")]
    Parse(#[from] toml::de::Error),

    /// IO error
    #[error("IO error during '{operation}': {reason}")]
    Io { operation: String, reason: String },

    /// Store lookup failed while checking readiness
    #[error("Store error: {0}")]
    Store(#[from] crate::storage::StoreError),
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    /// Create an invalid timezone error
    pub fn invalid_timezone(tz: impl Into<String>) -> Self {
        Self::InvalidTimezone { tz: tz.into() }
    }

    /// Create an invalid time error
    pub fn invalid_time(value: impl Into<String>) -> Self {
        Self::InvalidTime {
            value: value.into(),
        }
    }

    /// Create a tenant config error
    pub fn tenant_config(tenant_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TenantConfig {
            tenant_id: tenant_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an IO error with context
    pub fn io_error(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Io {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Store(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
