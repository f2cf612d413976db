use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or unparsable configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong.
        message: String,
    },

    /// Report store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Model fallback failure, including cancellation.
    #[error("{0}")]
    Selector(#[from] SelectorError),

    /// Caller input rejected before any model call.
    #[error("Validation failed: {field} - {reason}")]
    Validation {
        /// Offending input field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A model answered but the answer lacks required assessment data.
    #[error("Extraction incomplete: {message}")]
    ExtractionIncomplete {
        /// First problem found in the answer.
        message: String,
    },

    /// Fewer than two distinct years were requested.
    #[error("Insufficient years for comparison: {distinct} distinct year(s), at least 2 required")]
    InsufficientYears {
        /// Distinct years in the request.
        distinct: usize,
    },
}

impl AppError {
    /// True when the call was aborted through its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Selector(SelectorError::Cancelled))
    }

    /// True when the requested `(organization, year)` has no stored report.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Storage(StorageError::ReportNotFound { .. }))
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database could not be opened.
    #[error("Database connection failed: {message}")]
    Connection {
        /// Driver message.
        message: String,
    },

    /// No report is stored under the key.
    #[error("Report not found: {organization} ({year})")]
    ReportNotFound {
        /// Organization, exact case.
        organization: String,
        /// Reporting year.
        year: i32,
    },

    /// Schema migration failed.
    #[error("Migration failed: {message}")]
    Migration {
        /// Driver message.
        message: String,
    },

    /// A stored JSON column could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other database error.
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// How a single model attempt failed, which decides what the selector does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network blip, timeout or 5xx. Retried on the same candidate.
    Transient,
    /// Quota or rate limit exhausted. Advance without retry.
    QuotaExceeded,
    /// Model missing, disabled or not permitted for this key. Advance without retry.
    Unavailable,
    /// Response did not match the expected schema. Advance without retry.
    Malformed,
}

impl FailureKind {
    /// Get the kind as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from a single call to a model backend
#[derive(Debug, Error)]
pub enum ModelError {
    /// Quota or rate limit hit.
    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        /// Backend message.
        message: String,
    },

    /// Model missing, disabled or not permitted.
    #[error("Model unavailable: {message}")]
    Unavailable {
        /// Backend message.
        message: String,
    },

    /// Any other non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The answer could not be used.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// What was wrong with it.
        message: String,
    },

    /// The attempt ran past its deadline.
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Deadline that was exceeded.
        timeout_ms: u64,
    },

    /// Connection-level failure.
    #[error("Network error: {message}")]
    Network {
        /// Transport message.
        message: String,
    },

    /// Error raised by the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ModelError {
    /// Classify this error for the fallback policy.
    pub fn kind(&self) -> FailureKind {
        match self {
            ModelError::QuotaExceeded { .. } => FailureKind::QuotaExceeded,
            ModelError::Unavailable { .. } => FailureKind::Unavailable,
            ModelError::InvalidResponse { .. } => FailureKind::Malformed,
            ModelError::Timeout { .. } | ModelError::Network { .. } => FailureKind::Transient,
            ModelError::Api { status, .. } => match *status {
                429 => FailureKind::QuotaExceeded,
                408 | 500..=599 => FailureKind::Transient,
                _ => FailureKind::Unavailable,
            },
            ModelError::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    FailureKind::Transient
                } else if e.is_decode() {
                    FailureKind::Malformed
                } else {
                    FailureKind::Unavailable
                }
            }
        }
    }
}

/// Why one candidate in the fallback chain was given up on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    /// Model identifier of the candidate.
    pub model: String,
    /// Classification of the last failure.
    pub kind: FailureKind,
    /// Message of the last failure.
    pub message: String,
    /// Number of attempts made against this candidate.
    pub attempts: u32,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{} after {} attempt(s)]: {}",
            self.model, self.kind, self.attempts, self.message
        )
    }
}

/// Model selector errors
#[derive(Debug, Error)]
pub enum SelectorError {
    /// The candidate chain is empty or mis-ordered.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// What was wrong.
        message: String,
    },

    /// Every candidate failed; one entry per candidate, in trial order.
    #[error("All model candidates exhausted: {}", format_failures(.failures))]
    AllCandidatesExhausted {
        /// Why each candidate was given up on.
        failures: Vec<CandidateFailure>,
    },

    /// The caller's cancellation token fired.
    #[error("Cancelled")]
    Cancelled,
}

fn format_failures(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for a single model call
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type alias for selector operations
pub type SelectorResult<T> = Result<T, SelectorError>;
