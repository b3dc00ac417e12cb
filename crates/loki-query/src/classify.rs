//! Failure classification.
//!
//! Raw failures from the transport ([`Failure`]) are mapped to an
//! [`ErrorKind`] by [`ErrorClassifier`]. The kind decides whether a retry
//! is worthwhile and how long to wait before it.

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of a store-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 401 or 403.
    Authentication,
    /// Refused, timed out or unresolvable at the transport.
    Connection,
    /// 429.
    RateLimit,
    /// 400 describing a selector or parse constraint.
    Validation,
    /// Any 5xx.
    ServerError,
    /// Everything else.
    Unknown,
}

impl ErrorKind {
    /// Returns the string representation of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Connection => "connection",
            Self::RateLimit => "rate_limit",
            Self::Validation => "validation",
            Self::ServerError => "server_error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection | Self::RateLimit | Self::ServerError | Self::Unknown
        )
    }

    /// Minimum delay before retrying this kind.
    #[must_use]
    pub const fn suggested_backoff(&self) -> Duration {
        match self {
            Self::RateLimit => Duration::from_secs(1),
            Self::ServerError => Duration::from_millis(500),
            Self::Connection | Self::Unknown => Duration::from_millis(250),
            Self::Authentication | Self::Validation => Duration::ZERO,
        }
    }

    /// Maximum number of retries for this kind, if tighter than the policy.
    #[must_use]
    pub const fn retry_budget(&self) -> Option<u32> {
        match self {
            Self::Unknown => Some(1),
            Self::Authentication | Self::Validation => Some(0),
            Self::Connection | Self::RateLimit | Self::ServerError => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a failure that never produced an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFailure {
    /// The connection could not be established, whether refused or unresolvable.
    ConnectRefused,
    /// Connecting or reading timed out.
    Timeout,
    /// Any other transport problem.
    Other,
}

/// A raw failure reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The store answered with a non-success status.
    Status {
        /// HTTP status code.
        code: u16,
        /// Error message from the body, or the raw body.
        message: String,
        /// `Retry-After` hint, if the store sent one.
        retry_after: Option<Duration>,
    },
    /// No response was received.
    Transport {
        /// What went wrong.
        category: TransportFailure,
        /// Underlying message.
        message: String,
    },
    /// A response arrived but its body could not be decoded.
    Decode {
        /// Underlying message.
        message: String,
    },
}

impl Failure {
    /// Shorthand for a status failure without a `Retry-After` hint.
    #[must_use]
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Shorthand for a transport failure.
    #[must_use]
    pub fn transport(category: TransportFailure, message: impl Into<String>) -> Self {
        Self::Transport {
            category,
            message: message.into(),
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Status { code, message, .. } if message.is_empty() => format!("HTTP {code}"),
            Self::Status { code, message, .. } => format!("HTTP {code}: {message}"),
            Self::Transport { message, .. } | Self::Decode { message } => message.clone(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Outcome of classifying a [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Failure kind.
    pub kind: ErrorKind,
    /// Whether a retry may help.
    pub retryable: bool,
    /// Server-provided delay hint.
    pub retry_after: Option<Duration>,
}

static SELECTOR_CONSTRAINT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(empty[- ]compatible|at least one (equality )?matcher|queries require at least one|selector|parse error|syntax error)",
    )
    .unwrap_or_else(|_| unreachable!())
});

/// Maps raw failures to [`Classification`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Creates a classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies a failure.
    #[must_use]
    pub fn classify(&self, failure: &Failure) -> Classification {
        let (kind, retry_after) = match failure {
            Failure::Status {
                code,
                message,
                retry_after,
            } => (Self::kind_for_status(*code, message), *retry_after),
            Failure::Transport { category, .. } => match category {
                TransportFailure::ConnectRefused | TransportFailure::Timeout => {
                    (ErrorKind::Connection, None)
                }
                TransportFailure::Other => (ErrorKind::Unknown, None),
            },
            Failure::Decode { .. } => (ErrorKind::Unknown, None),
        };

        Classification {
            kind,
            retryable: kind.is_retryable(),
            retry_after,
        }
    }

    fn kind_for_status(code: u16, message: &str) -> ErrorKind {
        match code {
            401 | 403 => ErrorKind::Authentication,
            429 => ErrorKind::RateLimit,
            400 if Self::is_selector_constraint_violation(message) => ErrorKind::Validation,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether a 400 message describes a selector or query-parse constraint.
    #[must_use]
    pub fn is_selector_constraint_violation(message: &str) -> bool {
        SELECTOR_CONSTRAINT_REGEX.is_match(message)
    }
}
