//! Error classification
//!
//! Maps an executor error, the job type and the attempt count to one of
//! three outcomes:
//!
//! - `Retryable { delay }`: a known transient failure (timeouts, resets,
//!   HTTP 429/5xx, job-type specific signatures)
//! - `NonRetryable`: anything else (validation, auth, malformed payload)
//! - `CircuitOpen`: too many recent failures of the same pattern for the
//!   same job type; checked first, before any text matching
//!
//! Matching is a declarative lookup over [`Signature`] tables rather than an
//! exception hierarchy, so every rule is visible and testable in one place.

use chrono::Duration;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};

use super::backoff::RetryPolicy;
use super::breaker::CircuitBreakerRegistry;
use crate::executor::ExecutorError;
use crate::models::JobType;

// ============================================================================
// Signature Tables
// ============================================================================

/// A substring identifying a transient failure, and the breaker pattern it
/// maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub needle: &'static str,
    pub pattern: &'static str,
}

const fn sig(needle: &'static str, pattern: &'static str) -> Signature {
    Signature { needle, pattern }
}

/// Transient signatures shared by every job type
const COMMON_SIGNATURES: &[Signature] = &[
    sig("timed out", "timeout"),
    sig("timeout", "timeout"),
    sig("etimedout", "timeout"),
    sig("connection reset", "connection"),
    sig("connection refused", "connection"),
    sig("econnreset", "connection"),
    sig("econnrefused", "connection"),
    sig("socket hang up", "connection"),
    sig("broken pipe", "connection"),
    sig("temporarily unavailable", "unavailable"),
    sig("service unavailable", "http_5xx"),
    sig("too many requests", "rate_limited"),
    sig("rate limit", "rate_limited"),
];

const FEED_SIGNATURES: &[Signature] = &[sig("soap fault: server busy", "soap_busy")];

const SCRAPE_SIGNATURES: &[Signature] = &[
    sig("navigation timeout", "navigation_timeout"),
    sig("target closed", "browser_crash"),
];

const SHORTEN_SIGNATURES: &[Signature] = &[sig("quota", "quota")];

/// HTTP status codes treated as transient
pub const RETRYABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

/// Job-type specific signatures; consulted before the common table
pub fn extra_signatures(job_type: JobType) -> &'static [Signature] {
    match job_type {
        JobType::PrimaryFeed | JobType::EnrichmentFeed => FEED_SIGNATURES,
        JobType::DetailScrape => SCRAPE_SIGNATURES,
        JobType::LinkShorten => SHORTEN_SIGNATURES,
    }
}

/// Full signature list for a job type, in match order
pub fn signatures_for(job_type: JobType) -> impl Iterator<Item = &'static Signature> {
    extra_signatures(job_type)
        .iter()
        .chain(COMMON_SIGNATURES.iter())
}

fn match_signature(job_type: JobType, message: &str) -> Option<&'static Signature> {
    let lowered = message.to_lowercase();
    signatures_for(job_type).find(|s| lowered.contains(s.needle))
}

/// Pull an HTTP status code out of free text such as "HTTP 503" or
/// "status code: 429"
fn status_in_text(message: &str) -> Option<u16> {
    static STATUS_RE: OnceLock<Option<Regex>> = OnceLock::new();

    let re = STATUS_RE
        .get_or_init(|| Regex::new(r"(?i)\b(?:http|status(?:\s+code)?)\b[\s:=/]*(\d{3})\b").ok())
        .as_ref()?;

    re.captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn status_pattern(status: u16) -> String {
    match status {
        429 => "rate_limited".to_string(),
        500..=599 => "http_5xx".to_string(),
        other => format!("http_{other}"),
    }
}

/// Collapse a free-text message into a stable pattern token: lowercase,
/// digits replaced, first few words joined by `_`
fn normalize_message(message: &str) -> String {
    const MAX_WORDS: usize = 6;
    const MAX_LEN: usize = 48;

    let words: Vec<String> = message
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            w.chars()
                .map(|c| if c.is_ascii_digit() { '#' } else { c })
                .collect::<String>()
                .to_lowercase()
        })
        .take(MAX_WORDS)
        .collect();

    if words.is_empty() {
        return "unknown".to_string();
    }

    let mut pattern = words.join("_");
    if pattern.len() > MAX_LEN {
        let cut = pattern
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_LEN)
            .last()
            .unwrap_or(0);
        pattern.truncate(cut);
    }
    pattern
}

/// Breaker key for an error: which failures count as "the same kind"
pub fn extract_pattern(error: &ExecutorError, job_type: JobType) -> String {
    match error {
        ExecutorError::Timeout(_) => "timeout".to_string(),
        ExecutorError::Connection(_) => "connection".to_string(),
        ExecutorError::Http { status, .. } => status_pattern(*status),
        ExecutorError::InvalidPayload(_) => "invalid_payload".to_string(),
        ExecutorError::NotRegistered(_) => "not_registered".to_string(),
        ExecutorError::Other(message) => match_signature(job_type, message)
            .map(|s| s.pattern.to_string())
            .or_else(|| status_in_text(message).map(status_pattern))
            .unwrap_or_else(|| normalize_message(message)),
    }
}

/// Whether an error is a known transient failure for the job type
pub fn is_transient(error: &ExecutorError, job_type: JobType) -> bool {
    match error {
        ExecutorError::Timeout(_) | ExecutorError::Connection(_) => true,
        ExecutorError::Http { status, .. } => RETRYABLE_STATUS_CODES.contains(status),
        ExecutorError::InvalidPayload(_) | ExecutorError::NotRegistered(_) => false,
        ExecutorError::Other(message) => {
            match_signature(job_type, message).is_some()
                || status_in_text(message).is_some_and(|s| RETRYABLE_STATUS_CODES.contains(&s))
        }
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Outcome of classifying a failed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    Retryable {
        #[serde(skip)]
        delay: Duration,
    },
    NonRetryable,
    CircuitOpen,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retryable { .. } => "retryable",
            Self::NonRetryable => "non_retryable",
            Self::CircuitOpen => "circuit_open",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification together with the breaker pattern it was derived for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub classification: Classification,
    pub pattern: String,
}

/// Decides how a failed job proceeds
pub struct ErrorClassifier {
    policy: RetryPolicy,
    breaker: Arc<dyn CircuitBreakerRegistry>,
}

impl ErrorClassifier {
    pub fn new(policy: RetryPolicy, breaker: Arc<dyn CircuitBreakerRegistry>) -> Self {
        Self { policy, breaker }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> &Arc<dyn CircuitBreakerRegistry> {
        &self.breaker
    }

    /// Classify an executor error for a job that has run `attempts` times
    pub fn classify(
        &self,
        error: &ExecutorError,
        job_type: JobType,
        attempts: u32,
    ) -> ClassifiedError {
        let pattern = extract_pattern(error, job_type);

        let classification = if self.breaker.is_open(job_type, &pattern) {
            Classification::CircuitOpen
        } else if is_transient(error, job_type) {
            Classification::Retryable {
                delay: self.policy.delay_for(attempts),
            }
        } else {
            Classification::NonRetryable
        };

        tracing::debug!(
            job_type = %job_type,
            pattern = %pattern,
            attempts = attempts,
            classification = %classification,
            "Classified executor error"
        );

        ClassifiedError {
            classification,
            pattern,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
