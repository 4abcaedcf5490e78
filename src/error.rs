//! Unified error handling for the dealerflow crate
//!
//! This module provides a unified error type that consolidates all domain-specific
//! errors into a single `Error` enum, while maintaining the ability to use
//! domain-specific errors when needed.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Job-level failures never surface here: executor errors are classified and
//! recorded on the job. This type covers setup and surrounding plumbing.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dealerflow::error::{Error, ErrorCategory};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Retrying: {}", err);
//!     } else {
//!         tracing::error!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::config::ConfigError;
pub use crate::events::EventError;
pub use crate::executor::ExecutorError;
pub use crate::lifecycle::TransitionError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::storage::StoreError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Job store and I/O errors
    Store,
    /// Executor and HTTP errors
    Executor,
    /// Scheduling, timezone and tenant configuration errors
    Scheduler,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Executor => "executor",
            Self::Scheduler => "scheduler",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the dealerflow crate
#[derive(Error, Debug)]
pub enum Error {
    /// Job store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Executor errors
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Scheduler and timing errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Rejected state transition
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// Event delivery errors
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            Self::Executor(e) => matches!(
                e,
                ExecutorError::Timeout(_) | ExecutorError::Connection(_)
            ),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Transition(_) => false,
            Self::Event(_) => true,
            Self::Config(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(_) | Self::Io(_) => ErrorCategory::Store,
            Self::Executor(_) => ErrorCategory::Executor,
            Self::Scheduler(_) | Self::Transition(_) => ErrorCategory::Scheduler,
            Self::Config(_) => ErrorCategory::Config,
            Self::Event(_) | Self::Json(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobType;

    #[test]
    fn test_error_category() {
        let store_err = Error::from(StoreError::Unavailable("down".to_string()));
        assert_eq!(store_err.category(), ErrorCategory::Store);

        let tz_err = Error::from(SchedulerError::invalid_timezone("Nowhere"));
        assert_eq!(tz_err.category(), ErrorCategory::Scheduler);

        let exec_err = Error::from(ExecutorError::NotRegistered(JobType::LinkShorten));
        assert_eq!(exec_err.category(), ErrorCategory::Executor);
    }

    #[test]
    fn test_is_recoverable() {
        let timeout = Error::from(ExecutorError::Timeout("read".to_string()));
        assert!(timeout.is_recoverable());

        let payload = Error::from(ExecutorError::InvalidPayload("missing feed_url".to_string()));
        assert!(!payload.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::from(ConfigError::invalid("retry.base_delay_secs", "must be > 0"));
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("retry.base_delay_secs"));
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(ErrorCategory::Other.as_str(), "other");
    }
}
