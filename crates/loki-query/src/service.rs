//! The composition root.
//!
//! [`QueryService`] wires time resolution, query construction, retries and
//! the label cache into three operations:
//!
//! - [`QueryService::range_query`]: run a LogQL query over a window
//! - [`QueryService::keyword_search`]: search for keywords, with hit context
//! - [`QueryService::label_discovery`]: list label names or values, cached
//!
//! Each returns an envelope with `status` set to `success` or `error`. Failures
//! never escape as `Err`; the envelope carries an [`ErrorReport`] and empty
//! data instead.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::cache::{CacheKey, CacheStats, LabelCache};
use crate::circuit::{CircuitBreaker, CircuitConfig, CircuitStatus};
use crate::classify::ErrorClassifier;
use crate::client::HttpTransport;
use crate::config::{ConfigError, LokiConfig};
use crate::error::{ErrorCategory, QueryError, Result};
use crate::query::{QueryBuilder, check_balanced, is_valid_label_name};
use crate::response::{QueryData, QueryEntry, normalize};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::search::{KeywordContext, KeywordMatcher};
use crate::stats::{ErrorStatistics, OperationStats};
use crate::time::{DEFAULT_LOOKBACK_SECS, ResolvedWindow, TimeResolver};
use crate::transport::{InstantRequest, LokiTransport, RangeRequest};
use crate::types::{
    Direction, KeywordOperator, KeywordSpec, LabelSelector, TimeRange, TimeWindow, to_rfc3339,
};

/// Entries returned when no limit is given.
pub const DEFAULT_LIMIT: u32 = 100;

/// Largest accepted limit.
pub const MAX_LIMIT: u32 = 5000;

// ===========================================
// Requests
// ===========================================

/// Where the query text of a range query comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    /// Caller-authored LogQL, used as is.
    Raw(String),
    /// A selector, optionally followed by a caller-authored pipeline.
    Selector {
        /// Stream selector.
        selector: LabelSelector,
        /// Pipeline appended after the selector.
        #[serde(default)]
        fragment: Option<String>,
    },
}

/// Parameters of [`QueryService::range_query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeQueryRequest {
    /// Query text or selector.
    pub source: QuerySource,
    /// Time bounds.
    #[serde(default)]
    pub window: TimeWindow,
    /// Maximum entries; defaults to [`DEFAULT_LIMIT`].
    #[serde(default)]
    pub limit: Option<u32>,
    /// Ordering; defaults to newest first.
    #[serde(default)]
    pub direction: Direction,
}

impl RangeQueryRequest {
    /// A request for raw LogQL.
    #[must_use]
    pub fn raw(query: impl Into<String>) -> Self {
        Self::from_source(QuerySource::Raw(query.into()))
    }

    /// A request built from a selector.
    #[must_use]
    pub fn selector(selector: LabelSelector, fragment: Option<String>) -> Self {
        Self::from_source(QuerySource::Selector { selector, fragment })
    }

    fn from_source(source: QuerySource) -> Self {
        Self {
            source,
            window: TimeWindow::default(),
            limit: None,
            direction: Direction::default(),
        }
    }

    /// Sets the window.
    #[must_use]
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Sets the limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// Parameters of [`QueryService::keyword_search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSearchRequest {
    /// Keywords in caller order.
    pub keywords: Vec<String>,
    /// Equality label filters.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Time bounds.
    #[serde(default)]
    pub window: TimeWindow,
    /// Whether keyword matching is case sensitive.
    #[serde(default)]
    pub case_sensitive: bool,
    /// How keywords combine.
    #[serde(default)]
    pub operator: KeywordOperator,
    /// Maximum entries; defaults to [`DEFAULT_LIMIT`].
    #[serde(default)]
    pub limit: Option<u32>,
}

impl KeywordSearchRequest {
    /// A case-insensitive AND search for `keywords`.
    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            labels: BTreeMap::new(),
            window: TimeWindow::default(),
            case_sensitive: false,
            operator: KeywordOperator::default(),
            limit: None,
        }
    }

    /// Adds an equality label filter.
    #[must_use]
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Sets the window.
    #[must_use]
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Sets the keyword operator.
    #[must_use]
    pub const fn with_operator(mut self, operator: KeywordOperator) -> Self {
        self.operator = operator;
        self
    }

    /// Sets case sensitivity.
    #[must_use]
    pub const fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Sets the limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

const fn default_true() -> bool {
    true
}

/// Parameters of [`QueryService::label_discovery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDiscoveryRequest {
    /// Label whose values to list; `None` lists label names.
    #[serde(default)]
    pub label: Option<String>,
    /// Time bounds; unbounded means the last hour.
    #[serde(default)]
    pub window: TimeWindow,
    /// Whether to read and populate the cache.
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl LabelDiscoveryRequest {
    /// Lists label names.
    #[must_use]
    pub fn names() -> Self {
        Self {
            label: None,
            window: TimeWindow::default(),
            use_cache: true,
        }
    }

    /// Lists the values of `label`.
    #[must_use]
    pub fn values(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::names()
        }
    }

    /// Sets the window.
    #[must_use]
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Bypasses the cache.
    #[must_use]
    pub const fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

// ===========================================
// Results
// ===========================================

/// Outcome flag of every envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// The operation succeeded.
    #[default]
    Success,
    /// The operation failed; see the error report.
    Error,
}

/// Failure details carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error category.
    pub error_type: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Store attempts made.
    pub attempts: u32,
    /// Whether retrying later could succeed.
    pub retryable: bool,
    /// How to resolve it.
    pub suggestion: String,
}

impl From<&QueryError> for ErrorReport {
    fn from(err: &QueryError) -> Self {
        Self {
            error_type: err.category(),
            message: err.to_string(),
            attempts: err.attempts(),
            retryable: err.is_retryable(),
            suggestion: err.suggestion().to_string(),
        }
    }
}

/// The resolved window reported back to callers, RFC 3339.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeInfo {
    /// Resolved start; absent for instant queries.
    pub start: Option<String>,
    /// Resolved end, or the evaluation instant.
    pub end: Option<String>,
}

impl TimeRangeInfo {
    fn from_range(range: &TimeRange) -> Self {
        Self {
            start: Some(to_rfc3339(range.start)),
            end: Some(to_rfc3339(range.end)),
        }
    }
}

impl From<&ResolvedWindow> for TimeRangeInfo {
    fn from(window: &ResolvedWindow) -> Self {
        match window {
            ResolvedWindow::Range(range) => Self::from_range(range),
            ResolvedWindow::Instant(at) => Self {
                start: None,
                end: Some(to_rfc3339(*at)),
            },
        }
    }
}

/// Envelope of [`QueryService::range_query`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeQueryResult {
    /// Outcome.
    pub status: ResultStatus,
    /// `streams`, `matrix`, `vector` or `scalar`; empty on error.
    pub result_type: String,
    /// Normalized entries.
    pub entries: Vec<QueryEntry>,
    /// Number of entries.
    pub total_entries: usize,
    /// Query text sent to the store.
    pub query: String,
    /// Resolved window.
    pub time_range: TimeRangeInfo,
    /// Failure details.
    pub error: Option<ErrorReport>,
}

impl RangeQueryResult {
    fn fail(&mut self, err: &QueryError) {
        self.status = ResultStatus::Error;
        self.result_type.clear();
        self.entries.clear();
        self.total_entries = 0;
        self.error = Some(err.into());
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEntry {
    /// The entry.
    #[serde(flatten)]
    pub entry: QueryEntry,
    /// Keywords present in the line.
    pub matched_keywords: Vec<String>,
    /// Snippets around each hit.
    pub keyword_contexts: Vec<KeywordContext>,
}

/// Envelope of [`QueryService::keyword_search`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSearchResult {
    /// Outcome.
    pub status: ResultStatus,
    /// Hits.
    pub entries: Vec<SearchEntry>,
    /// Number of hits.
    pub total_entries: usize,
    /// Keywords searched for, blanks dropped.
    pub search_terms: Vec<String>,
    /// Label filters applied.
    pub labels_filter: BTreeMap<String, String>,
    /// Resolved window.
    pub time_range: TimeRangeInfo,
    /// Query text sent to the store.
    pub query_used: String,
    /// Failure details.
    pub error: Option<ErrorReport>,
}

impl KeywordSearchResult {
    fn fail(&mut self, err: &QueryError) {
        self.status = ResultStatus::Error;
        self.entries.clear();
        self.total_entries = 0;
        self.error = Some(err.into());
    }
}

/// What a label discovery listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    /// Label names.
    #[default]
    Names,
    /// Values of one label.
    Values,
}

/// Envelope of [`QueryService::label_discovery`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDiscoveryResult {
    /// Outcome.
    pub status: ResultStatus,
    /// Names or values.
    pub label_type: LabelType,
    /// Label whose values were listed.
    pub label_name: Option<String>,
    /// Sorted, de-duplicated names or values.
    pub labels: Vec<String>,
    /// Number of labels.
    pub total_count: usize,
    /// Resolved window.
    pub time_range: TimeRangeInfo,
    /// Whether the labels came from the cache.
    pub cached: bool,
    /// Failure details.
    pub error: Option<ErrorReport>,
}

impl LabelDiscoveryResult {
    fn fail(&mut self, err: &QueryError) {
        self.status = ResultStatus::Error;
        self.labels.clear();
        self.total_count = 0;
        self.cached = false;
        self.error = Some(err.into());
    }
}

/// Health snapshot of a service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatistics {
    /// Per-operation counters.
    pub operations: BTreeMap<String, OperationStats>,
    /// Circuit breaker state.
    pub circuit: CircuitStatus,
    /// Label cache occupancy.
    pub cache: CacheStats,
}

// ===========================================
// Service
// ===========================================

/// Runs log queries against a [`LokiTransport`].
#[derive(Debug)]
pub struct QueryService<T> {
    transport: T,
    resolver: TimeResolver,
    builder: QueryBuilder,
    classifier: ErrorClassifier,
    executor: RetryExecutor,
    cache: Arc<LabelCache>,
    stats: Arc<ErrorStatistics>,
    breaker: Arc<CircuitBreaker>,
    clock: fn() -> DateTime<Utc>,
}

impl QueryService<HttpTransport> {
    /// Builds a service talking HTTP to the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn from_config(config: &LokiConfig) -> std::result::Result<Self, ConfigError> {
        let transport = HttpTransport::new(config)?;
        let cache = Arc::new(LabelCache::new(config.cache_ttl));
        Ok(Self::with_policy(transport, cache, config.retry_policy()))
    }
}

impl<T: LokiTransport> QueryService<T> {
    /// Creates a service with the default retry policy.
    #[must_use]
    pub fn new(transport: T, cache: Arc<LabelCache>) -> Self {
        Self::with_policy(transport, cache, RetryPolicy::default())
    }

    /// Creates a service with a custom retry policy.
    #[must_use]
    pub fn with_policy(transport: T, cache: Arc<LabelCache>, policy: RetryPolicy) -> Self {
        let stats = Arc::new(ErrorStatistics::new());
        let breaker = Arc::new(CircuitBreaker::default());
        let executor = RetryExecutor::new(policy)
            .with_breaker(Arc::clone(&breaker))
            .with_stats(Arc::clone(&stats));
        Self {
            transport,
            resolver: TimeResolver::new(),
            builder: QueryBuilder::new(),
            classifier: ErrorClassifier::new(),
            executor,
            cache,
            stats,
            breaker,
            clock: Utc::now,
        }
    }

    /// Replaces the circuit breaker thresholds.
    #[must_use]
    pub fn with_circuit_config(mut self, config: CircuitConfig) -> Self {
        self.breaker = Arc::new(CircuitBreaker::new(config));
        self.executor = RetryExecutor::new(*self.executor.policy())
            .with_breaker(Arc::clone(&self.breaker))
            .with_stats(Arc::clone(&self.stats));
        self
    }

    /// Replaces the source of "now".
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// The shared label cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<LabelCache> {
        &self.cache
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Failure counters, breaker state and cache occupancy.
    #[must_use]
    pub fn statistics(&self) -> ServiceStatistics {
        ServiceStatistics {
            operations: self.stats.snapshot(),
            circuit: self.breaker.status(),
            cache: self.cache.stats(),
        }
    }

    /// Runs a LogQL query over a window.
    pub async fn range_query(&self, request: &RangeQueryRequest) -> RangeQueryResult {
        info!(limit = ?request.limit, direction = request.direction.as_str(), "range query");
        let mut result = RangeQueryResult::default();
        if let QuerySource::Raw(query) = &request.source {
            result.query.clone_from(query);
        }

        if let Err(err) = self.try_range_query(request, &mut result).await {
            error!(operation = "range_query", error = %err, "operation failed");
            result.fail(&err);
        }
        result
    }

    async fn try_range_query(
        &self,
        request: &RangeQueryRequest,
        result: &mut RangeQueryResult,
    ) -> Result<()> {
        let limit = check_limit(request.limit)?;
        let window = self.resolver.resolve_window(&request.window, (self.clock)())?;
        result.time_range = TimeRangeInfo::from(&window);

        result.query = match &request.source {
            QuerySource::Raw(query) => raw_query(query)?,
            QuerySource::Selector { selector, fragment } => {
                self.builder.build(selector, fragment.as_deref(), None)?
            }
        };

        let data = self.fetch(&result.query, &window, limit, request.direction).await?;
        result.result_type = data.result_type().to_string();
        result.entries = normalize(data, request.direction, limit as usize);
        result.total_entries = result.entries.len();
        Ok(())
    }

    /// Searches for keywords and reports where each one matched.
    pub async fn keyword_search(&self, request: &KeywordSearchRequest) -> KeywordSearchResult {
        info!(keywords = request.keywords.len(), operator = ?request.operator, "keyword search");
        let mut result = KeywordSearchResult {
            labels_filter: request.labels.clone(),
            ..KeywordSearchResult::default()
        };

        if let Err(err) = self.try_keyword_search(request, &mut result).await {
            error!(operation = "keyword_search", error = %err, "operation failed");
            result.fail(&err);
        }
        result
    }

    async fn try_keyword_search(
        &self,
        request: &KeywordSearchRequest,
        result: &mut KeywordSearchResult,
    ) -> Result<()> {
        let spec = KeywordSpec::new(
            request.keywords.iter().cloned(),
            request.operator,
            request.case_sensitive,
        );
        result.search_terms = spec
            .effective_keywords()
            .into_iter()
            .map(str::to_string)
            .collect();

        let limit = check_limit(request.limit)?;
        let window = self.resolver.resolve_window(&request.window, (self.clock)())?;
        result.time_range = TimeRangeInfo::from(&window);

        let selector = LabelSelector::from_labels(&request.labels);
        result.query_used = self.builder.build(&selector, None, Some(&spec))?;
        let matcher = KeywordMatcher::new(&spec)?;

        let direction = Direction::Backward;
        let data = self.fetch(&result.query_used, &window, limit, direction).await?;

        let mut entries = normalize(data, direction, usize::MAX);
        let mut seen = HashSet::new();
        entries.retain(|e| seen.insert((e.timestamp_ns, e.line.clone())));
        entries.truncate(limit as usize);

        result.entries = entries
            .into_iter()
            .map(|entry| {
                let found = matcher.find(&entry.line);
                SearchEntry {
                    entry,
                    matched_keywords: found.matched_keywords,
                    keyword_contexts: found.contexts,
                }
            })
            .collect();
        result.total_entries = result.entries.len();
        Ok(())
    }

    /// Lists label names, or the values of one label, using the cache.
    pub async fn label_discovery(&self, request: &LabelDiscoveryRequest) -> LabelDiscoveryResult {
        info!(label = ?request.label, use_cache = request.use_cache, "label discovery");
        let mut result = LabelDiscoveryResult::default();

        if let Err(err) = self.try_label_discovery(request, &mut result).await {
            error!(operation = "label_discovery", error = %err, "operation failed");
            result.fail(&err);
        }
        result
    }

    async fn try_label_discovery(
        &self,
        request: &LabelDiscoveryRequest,
        result: &mut LabelDiscoveryResult,
    ) -> Result<()> {
        let label = request
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());
        if let Some(name) = label {
            if !is_valid_label_name(name) {
                return Err(QueryError::Validation(format!("invalid label name: {name:?}")));
            }
            result.label_type = LabelType::Values;
            result.label_name = Some(name.to_string());
        }

        let range = match self.resolver.resolve_window(&request.window, (self.clock)())? {
            ResolvedWindow::Range(range) => range,
            ResolvedWindow::Instant(end) => {
                let start = end
                    .checked_sub_signed(TimeDelta::seconds(DEFAULT_LOOKBACK_SECS))
                    .ok_or_else(|| QueryError::InvalidTimeFormat(to_rfc3339(end)))?;
                TimeRange::new(start, end)?
            }
        };
        result.time_range = TimeRangeInfo::from_range(&range);

        let key = CacheKey::new(label, &request.window);
        if request.use_cache {
            if let Some(labels) = self.cache.get(&key) {
                debug!(?key, "label cache hit");
                result.total_count = labels.len();
                result.labels = labels;
                result.cached = true;
                return Ok(());
            }
            debug!(?key, "label cache miss");
        }

        let mut labels = match label {
            Some(name) => {
                self.executor
                    .execute("label_values", &self.classifier, || {
                        self.transport.label_values(name, &range)
                    })
                    .await?
            }
            None => {
                self.executor
                    .execute("label_names", &self.classifier, || {
                        self.transport.label_names(&range)
                    })
                    .await?
            }
        };
        labels.sort();
        labels.dedup();

        if request.use_cache {
            self.cache.put(key, labels.clone(), None);
        }
        result.total_count = labels.len();
        result.labels = labels;
        result.cached = false;
        Ok(())
    }

    async fn fetch(
        &self,
        query: &str,
        window: &ResolvedWindow,
        limit: u32,
        direction: Direction,
    ) -> Result<QueryData> {
        match window {
            ResolvedWindow::Range(range) => {
                let request = RangeRequest {
                    query: query.to_string(),
                    range: *range,
                    limit,
                    direction,
                };
                self.executor
                    .execute("query_range", &self.classifier, || {
                        self.transport.query_range(&request)
                    })
                    .await
            }
            ResolvedWindow::Instant(time) => {
                let request = InstantRequest {
                    query: query.to_string(),
                    time: *time,
                    limit,
                    direction,
                };
                self.executor
                    .execute("query_instant", &self.classifier, || {
                        self.transport.query_instant(&request)
                    })
                    .await
            }
        }
    }
}

fn check_limit(limit: Option<u32>) -> Result<u32> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(QueryError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )))
    }
}

fn raw_query(query: &str) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(QueryError::Validation("query must not be empty".to_string()));
    }
    check_balanced(query)?;
    Ok(query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(None => Ok(100) ; "default")]
    #[test_case(Some(1) => Ok(1) ; "minimum")]
    #[test_case(Some(5000) => Ok(5000) ; "maximum")]
    fn accepted_limits(limit: Option<u32>) -> Result<u32> {
        check_limit(limit)
    }

    #[test_case(0 ; "zero")]
    #[test_case(5001 ; "above maximum")]
    fn rejected_limits(limit: u32) {
        assert!(matches!(check_limit(Some(limit)), Err(QueryError::Validation(_))));
    }

    #[test]
    fn raw_query_is_trimmed_and_checked() {
        assert_eq!(raw_query("  {job=\"a\"} ").expect("valid"), "{job=\"a\"}");
        assert!(raw_query("   ").is_err());
        assert!(raw_query("{job=\"a\"").is_err());
    }

    #[test]
    fn error_report_from_query_error() {
        let report = ErrorReport::from(&QueryError::Validation("bad".into()));
        assert_eq!(report.error_type, ErrorCategory::Validation);
        assert_eq!(report.attempts, 0);
        assert!(!report.retryable);
        assert!(!report.suggestion.is_empty());
    }

    #[test]
    fn envelopes_serialize_with_status() {
        let mut result = LabelDiscoveryResult::default();
        result.fail(&QueryError::InvalidTimeFormat("5x".into()));
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["status"], "error");
        assert_eq!(json["labels"], serde_json::json!([]));
        assert_eq!(json["error"]["error_type"], "invalid_time_format");
    }

    #[test]
    fn requests_deserialize_with_defaults() {
        let request: LabelDiscoveryRequest =
            serde_json::from_str(r#"{"label":"job"}"#).expect("decode");
        assert!(request.use_cache);
        assert_eq!(request.window, TimeWindow::default());

        let request: KeywordSearchRequest =
            serde_json::from_str(r#"{"keywords":["error"],"operator":"OR"}"#).expect("decode");
        assert_eq!(request.operator, KeywordOperator::Or);
        assert!(!request.case_sensitive);

        let request: RangeQueryRequest =
            serde_json::from_str(r#"{"source":{"raw":"{job=\"api\"}"},"direction":"forward"}"#)
                .expect("decode");
        assert_eq!(request.source, QuerySource::Raw("{job=\"api\"}".into()));
        assert_eq!(request.direction, Direction::Forward);
    }

    #[test]
    fn search_entry_flattens_entry_fields() {
        let entry = SearchEntry {
            entry: QueryEntry {
                timestamp: "2024-08-17T13:00:00.000Z".into(),
                timestamp_ns: 1,
                line: "boom".into(),
                labels: BTreeMap::new(),
            },
            matched_keywords: vec!["boom".into()],
            keyword_contexts: vec![],
        };
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["line"], "boom");
        assert_eq!(json["matched_keywords"][0], "boom");
    }
}
