//! # loki-query
//!
//! Query and resilience layer for Grafana Loki.
//!
//! This crate provides:
//!
//! - [`TimeResolver`]: Relative, absolute, epoch and `now` time expressions
//! - [`QueryBuilder`]: LogQL from label selectors, keywords or raw pipelines
//! - [`ErrorClassifier`]: Maps store failures to an [`ErrorKind`]
//! - [`RetryExecutor`]: Bounded retry with backoff, deadline and circuit breaker
//! - [`LabelCache`]: TTL cache for label discovery
//! - [`QueryService`]: Range query, keyword search and label discovery
//! - [`HttpTransport`]: The [`LokiTransport`] over the Loki HTTP API
//!
//! ## Example
//!
//! ```rust
//! use loki_query::{KeywordOperator, KeywordSpec, LabelMatcher, LabelSelector, QueryBuilder};
//!
//! let selector = LabelSelector::new().with(LabelMatcher::equals("job", "api"));
//! let keywords = KeywordSpec::new(["error", "timeout"], KeywordOperator::And, false);
//!
//! let query = QueryBuilder::new()
//!     .build(&selector, None, Some(&keywords))
//!     .expect("valid query");
//! assert_eq!(query, r#"{job="api"} |~ "(?i)error" |~ "(?i)timeout""#);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod circuit;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod rate_limit;
pub mod response;
pub mod retry;
pub mod search;
pub mod service;
pub mod stats;
pub mod time;
pub mod transport;
pub mod types;

// Re-export main types
pub use cache::{CacheKey, CacheStats, LabelCache};
pub use circuit::{CircuitBreaker, CircuitConfig, CircuitState, CircuitStatus};
pub use classify::{Classification, ErrorClassifier, ErrorKind, Failure, TransportFailure};
pub use client::HttpTransport;
pub use config::{ConfigError, Credentials, LokiConfig, LokiConfigBuilder};
pub use error::{ErrorCategory, QueryError, Result};
pub use query::QueryBuilder;
pub use rate_limit::RateLimiter;
pub use response::{QueryData, QueryEntry};
pub use retry::{RetryExecutor, RetryPolicy};
pub use search::{KeywordContext, KeywordMatcher};
pub use service::{
    ErrorReport, KeywordSearchRequest, KeywordSearchResult, LabelDiscoveryRequest,
    LabelDiscoveryResult, LabelType, QueryService, QuerySource, RangeQueryRequest,
    RangeQueryResult, ResultStatus, SearchEntry, ServiceStatistics, TimeRangeInfo,
};
pub use stats::{ErrorStatistics, OperationStats};
pub use time::{ResolvedWindow, TimeResolver};
pub use transport::{InstantRequest, LokiTransport, RangeRequest};
pub use types::{
    Direction, KeywordOperator, KeywordSpec, LabelMatcher, LabelSelector, MatchMode, TimeRange,
    TimeWindow,
};
