//! Error types for the query layer.
//!
//! [`QueryError`] is what every fallible operation in this crate returns.
//! [`ErrorCategory`] is the flat taxonomy reported to callers in result
//! envelopes; it folds request-side failures (bad time expressions, bad
//! ranges, bad selectors) together with the transport [`ErrorKind`]s.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::ErrorKind;

/// Errors that can occur while resolving, building or executing a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A time expression matched none of the accepted grammars.
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// The resolved start instant is after the resolved end instant.
    #[error("invalid time range: start ({start}) is after end ({end})")]
    InvalidRange {
        /// Resolved start, RFC 3339.
        start: String,
        /// Resolved end, RFC 3339.
        end: String,
    },

    /// Malformed selector, keywords or parameters, or a constraint
    /// violation reported by the store.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation failed against the store after retries stopped.
    #[error("{kind} error after {attempts} attempt(s): {message}")]
    Failed {
        /// Classified kind of the last failure.
        kind: ErrorKind,
        /// Number of attempts made.
        attempts: u32,
        /// Last underlying message.
        message: String,
        /// Whether the overall deadline ended the retries.
        deadline_exceeded: bool,
    },

    /// The circuit breaker is open and the call was not attempted.
    #[error("circuit breaker is open: too many recent failures")]
    CircuitOpen,
}

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Error taxonomy reported in result envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Unparseable time expression.
    InvalidTimeFormat,
    /// Start after end.
    InvalidRange,
    /// Malformed input or store-reported constraint violation.
    Validation,
    /// Credentials rejected.
    Authentication,
    /// Store throttled the request.
    RateLimit,
    /// Store unreachable or timed out.
    Connection,
    /// Store returned a 5xx.
    ServerError,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    /// Returns the string representation of this category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTimeFormat => "invalid_time_format",
            Self::InvalidRange => "invalid_range",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Connection => "connection",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }
}

impl From<ErrorKind> for ErrorCategory {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Authentication => Self::Authentication,
            ErrorKind::Connection => Self::Connection,
            ErrorKind::RateLimit => Self::RateLimit,
            ErrorKind::Validation => Self::Validation,
            ErrorKind::ServerError => Self::ServerError,
            ErrorKind::Unknown => Self::Unknown,
        }
    }
}

impl QueryError {
    /// Category of this error in the reported taxonomy.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidTimeFormat(_) => ErrorCategory::InvalidTimeFormat,
            Self::InvalidRange { .. } => ErrorCategory::InvalidRange,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Failed { kind, .. } => (*kind).into(),
            Self::CircuitOpen => ErrorCategory::Connection,
        }
    }

    /// Number of store attempts made before this error surfaced.
    ///
    /// Errors raised before any network call report zero.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Whether retrying the same call later could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { kind, .. } => kind.is_retryable(),
            Self::CircuitOpen => true,
            _ => false,
        }
    }

    /// A short, user-facing hint for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::InvalidTimeFormat => {
                "Use an RFC 3339 timestamp, Unix seconds, 'now', or a relative time such as '5m' or 'now-1h'"
            }
            ErrorCategory::InvalidRange => "Make sure the start time is before or equal to the end time",
            ErrorCategory::Validation => "Check the label filters, keywords and LogQL syntax",
            ErrorCategory::Authentication => {
                "Check the Loki credentials (username/password or bearer token)"
            }
            ErrorCategory::RateLimit => "Reduce request frequency or wait before retrying",
            ErrorCategory::Connection => "Check the Loki URL and network connectivity",
            ErrorCategory::ServerError => "Loki is experiencing issues, try again later",
            ErrorCategory::Unknown => "Check the logs for more details and try again",
        }
    }
}
