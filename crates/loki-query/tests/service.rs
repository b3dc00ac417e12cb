//! Service-level tests against a scripted in-memory transport.
//!
//! These tests verify:
//! 1. Label discovery caching and its bypass
//! 2. Range query building, normalization and instant fallback
//! 3. Keyword search hits and de-duplication
//! 4. Retry, failure envelopes and statistics

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use loki_query::{
    Direction, ErrorCategory, ErrorKind, Failure, InstantRequest, KeywordOperator,
    KeywordSearchRequest, LabelCache, LabelDiscoveryRequest, LabelMatcher, LabelSelector,
    LabelType, LokiTransport, QueryData, QueryService, RangeQueryRequest, RangeRequest,
    ResultStatus, TimeRange, TimeWindow,
};
use parking_lot::Mutex;
use serde_json::json;

// ============================================================================
// Fake Transport
// ============================================================================

#[derive(Default)]
struct FakeTransport {
    range_calls: AtomicU32,
    instant_calls: AtomicU32,
    label_calls: AtomicU32,
    queries: Mutex<Vec<String>>,
    label_requests: Mutex<Vec<Option<String>>>,
    failures: Mutex<VecDeque<Failure>>,
    data: Option<QueryData>,
    labels: Vec<String>,
}

impl FakeTransport {
    fn with_data(data: QueryData) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    fn with_labels(labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|s| (*s).to_string()).collect(),
            ..Self::default()
        }
    }

    fn failing_first(self, failures: impl IntoIterator<Item = Failure>) -> Self {
        self.failures.lock().extend(failures);
        self
    }

    fn next_failure(&self) -> Option<Failure> {
        self.failures.lock().pop_front()
    }

    fn query_result(&self, query: &str) -> Result<QueryData, Failure> {
        self.queries.lock().push(query.to_string());
        if let Some(failure) = self.next_failure() {
            return Err(failure);
        }
        Ok(self.data.clone().unwrap_or_default())
    }

    fn label_result(&self, label: Option<&str>) -> Result<Vec<String>, Failure> {
        self.label_calls.fetch_add(1, Ordering::SeqCst);
        self.label_requests.lock().push(label.map(str::to_string));
        if let Some(failure) = self.next_failure() {
            return Err(failure);
        }
        Ok(self.labels.clone())
    }
}

impl LokiTransport for FakeTransport {
    async fn query_range(&self, request: &RangeRequest) -> Result<QueryData, Failure> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        self.query_result(&request.query)
    }

    async fn query_instant(&self, request: &InstantRequest) -> Result<QueryData, Failure> {
        self.instant_calls.fetch_add(1, Ordering::SeqCst);
        self.query_result(&request.query)
    }

    async fn label_names(&self, _range: &TimeRange) -> Result<Vec<String>, Failure> {
        self.label_result(None)
    }

    async fn label_values(&self, label: &str, _range: &TimeRange) -> Result<Vec<String>, Failure> {
        self.label_result(Some(label))
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 17, 13, 0, 0)
        .single()
        .expect("valid date")
}

fn service(transport: FakeTransport) -> QueryService<FakeTransport> {
    QueryService::new(transport, Arc::new(LabelCache::default())).with_clock(fixed_now)
}

fn streams() -> QueryData {
    serde_json::from_value(json!({
        "resultType": "streams",
        "result": [
            {"stream": {"job": "api"}, "values": [
                ["1723899500000000000", "ERROR: connection timeout to db"],
                ["1723899400000000000", "info: started"]
            ]},
            {"stream": {"job": "api"}, "values": [
                ["1723899500000000000", "ERROR: connection timeout to db"],
                ["1723899450000000000", "warn: slow timeout"]
            ]}
        ]
    }))
    .expect("valid streams")
}

// ============================================================================
// Label Discovery
// ============================================================================

#[tokio::test]
async fn label_discovery_twice_issues_one_transport_call() {
    let svc = service(FakeTransport::with_labels(&["web", "api", "web", "db"]));
    let request = LabelDiscoveryRequest::values("job");

    let first = svc.label_discovery(&request).await;
    assert_eq!(first.status, ResultStatus::Success);
    assert!(!first.cached);
    assert_eq!(first.labels, vec!["api", "db", "web"]);
    assert_eq!(first.total_count, 3);
    assert_eq!(first.label_type, LabelType::Values);
    assert_eq!(first.label_name.as_deref(), Some("job"));

    let second = svc.label_discovery(&request).await;
    assert!(second.cached);
    assert_eq!(second.labels, first.labels);
    assert_eq!(svc.transport().label_calls.load(Ordering::SeqCst), 1);
}

/// Unix seconds behind [`moving_now`]; only one test advances it.
static MOVING_SECS: AtomicI64 = AtomicI64::new(0);

fn moving_now() -> DateTime<Utc> {
    Utc.timestamp_opt(MOVING_SECS.load(Ordering::SeqCst), 0)
        .single()
        .expect("valid timestamp")
}

#[tokio::test]
async fn label_discovery_hits_cache_across_a_minute_boundary() {
    MOVING_SECS.store(fixed_now().timestamp() + 59, Ordering::SeqCst);
    let svc = QueryService::new(
        FakeTransport::with_labels(&["api"]),
        Arc::new(LabelCache::default()),
    )
    .with_clock(moving_now);

    for request in [
        LabelDiscoveryRequest::values("job"),
        LabelDiscoveryRequest::values("job").with_window(TimeWindow::since("1h")),
    ] {
        let first = svc.label_discovery(&request).await;
        MOVING_SECS.fetch_add(2, Ordering::SeqCst);
        let second = svc.label_discovery(&request).await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.labels, vec!["api"]);
    }
    assert_eq!(svc.transport().label_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn label_discovery_without_cache_always_calls_store() {
    let svc = service(FakeTransport::with_labels(&["job"]));
    let request = LabelDiscoveryRequest::names().without_cache();

    svc.label_discovery(&request).await;
    let second = svc.label_discovery(&request).await;

    assert!(!second.cached);
    assert_eq!(second.label_type, LabelType::Names);
    assert_eq!(svc.transport().label_calls.load(Ordering::SeqCst), 2);
    assert!(svc.cache().is_empty());
}

#[tokio::test]
async fn label_names_and_values_are_cached_separately() {
    let svc = service(FakeTransport::with_labels(&["a"]));
    svc.label_discovery(&LabelDiscoveryRequest::names()).await;
    svc.label_discovery(&LabelDiscoveryRequest::values("job")).await;

    assert_eq!(svc.transport().label_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        *svc.transport().label_requests.lock(),
        vec![None, Some("job".to_string())]
    );
    assert_eq!(svc.cache().len(), 2);
}

#[tokio::test]
async fn unbounded_label_discovery_covers_last_hour() {
    let svc = service(FakeTransport::with_labels(&[]));
    let result = svc.label_discovery(&LabelDiscoveryRequest::names()).await;
    assert_eq!(result.time_range.start.as_deref(), Some("2024-08-17T12:00:00Z"));
    assert_eq!(result.time_range.end.as_deref(), Some("2024-08-17T13:00:00Z"));
}

#[tokio::test]
async fn invalid_label_name_is_rejected_before_calling_store() {
    let svc = service(FakeTransport::with_labels(&["x"]));
    let result = svc
        .label_discovery(&LabelDiscoveryRequest::values("bad-name"))
        .await;

    assert_eq!(result.status, ResultStatus::Error);
    let error = result.error.expect("error report");
    assert_eq!(error.error_type, ErrorCategory::Validation);
    assert_eq!(svc.transport().label_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_discovery_leaves_cache_untouched() {
    let transport = FakeTransport::with_labels(&["api"])
        .failing_first([Failure::status(401, "unauthorized")]);
    let svc = service(transport);
    let request = LabelDiscoveryRequest::values("job");

    let failed = svc.label_discovery(&request).await;
    assert_eq!(failed.status, ResultStatus::Error);
    assert!(failed.labels.is_empty());
    assert!(svc.cache().is_empty());

    let ok = svc.label_discovery(&request).await;
    assert_eq!(ok.status, ResultStatus::Success);
    assert!(!ok.cached);
    assert_eq!(svc.cache().len(), 1);
}

#[tokio::test]
async fn concurrent_discovery_is_consistent() {
    let svc = Arc::new(service(FakeTransport::with_labels(&["b", "a"])));
    let mut handles = Vec::new();
    for i in 0..16 {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move {
            let label = if i % 2 == 0 { "job" } else { "env" };
            svc.label_discovery(&LabelDiscoveryRequest::values(label)).await
        }));
    }

    for handle in handles {
        let result = handle.await.expect("task completes");
        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.labels, vec!["a", "b"]);
    }
    assert_eq!(svc.cache().len(), 2);
}

// ============================================================================
// Range Query
// ============================================================================

#[tokio::test]
async fn range_query_from_selector() {
    let svc = service(FakeTransport::with_data(streams()));
    let selector = LabelSelector::new().with(LabelMatcher::equals("job", "api"));
    let request = RangeQueryRequest::selector(selector, Some("|= \"timeout\"".into()))
        .with_window(TimeWindow::since("1h"))
        .with_limit(10);

    let result = svc.range_query(&request).await;

    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.query, r#"{job="api"} |= "timeout""#);
    assert_eq!(result.result_type, "streams");
    assert_eq!(result.time_range.start.as_deref(), Some("2024-08-17T12:00:00Z"));
    assert_eq!(result.time_range.end.as_deref(), Some("2024-08-17T13:00:00Z"));
    assert_eq!(result.total_entries, 4);
    assert_eq!(result.entries[0].timestamp_ns, 1_723_899_500_000_000_000);
    assert_eq!(result.entries[3].line, "info: started");
    assert_eq!(svc.transport().range_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn range_query_forward_and_limit() {
    let svc = service(FakeTransport::with_data(streams()));
    let request = RangeQueryRequest::raw(r#"{job="api"}"#)
        .with_window(TimeWindow::since("1h"))
        .with_direction(Direction::Forward)
        .with_limit(2);

    let result = svc.range_query(&request).await;
    let lines: Vec<_> = result.entries.iter().map(|e| e.line.as_str()).collect();
    assert_eq!(lines, vec!["info: started", "warn: slow timeout"]);
}

#[tokio::test]
async fn range_query_without_window_is_instant() {
    let svc = service(FakeTransport::with_data(streams()));
    let result = svc.range_query(&RangeQueryRequest::raw(r#"{job="api"}"#)).await;

    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.time_range.start, None);
    assert_eq!(result.time_range.end.as_deref(), Some("2024-08-17T13:00:00Z"));
    assert_eq!(svc.transport().instant_calls.load(Ordering::SeqCst), 1);
    assert_eq!(svc.transport().range_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_time_fails_before_any_call() {
    let svc = service(FakeTransport::with_data(streams()));
    let request = RangeQueryRequest::raw(r#"{job="api"}"#).with_window(TimeWindow::since("5x"));

    let result = svc.range_query(&request).await;

    assert_eq!(result.status, ResultStatus::Error);
    assert!(result.entries.is_empty());
    let error = result.error.expect("error report");
    assert_eq!(error.error_type, ErrorCategory::InvalidTimeFormat);
    assert_eq!(error.attempts, 0);
    assert!(!error.retryable);
    assert_eq!(svc.transport().range_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn inverted_window_is_invalid_range() {
    let svc = service(FakeTransport::with_data(streams()));
    let request = RangeQueryRequest::raw(r#"{job="api"}"#)
        .with_window(TimeWindow::new(Some("now"), Some("1h")));

    let result = svc.range_query(&request).await;
    let error = result.error.expect("error report");
    assert_eq!(error.error_type, ErrorCategory::InvalidRange);
}

#[tokio::test]
async fn out_of_range_limit_is_rejected() {
    let svc = service(FakeTransport::with_data(streams()));
    let result = svc
        .range_query(&RangeQueryRequest::raw(r#"{job="api"}"#).with_limit(0))
        .await;
    assert_eq!(result.status, ResultStatus::Error);
    assert_eq!(svc.transport().instant_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Keyword Search
// ============================================================================

#[tokio::test]
async fn keyword_search_reports_hits() {
    let svc = service(FakeTransport::with_data(streams()));
    let request = KeywordSearchRequest::new(["timeout", "error"])
        .with_label("job", "api")
        .with_label("env", "prod")
        .with_operator(KeywordOperator::Or)
        .with_window(TimeWindow::since("30m"));

    let result = svc.keyword_search(&request).await;

    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(
        result.query_used,
        r#"{env="prod", job="api"} |~ "(?i)timeout|error""#
    );
    assert_eq!(result.search_terms, vec!["timeout", "error"]);
    assert_eq!(result.labels_filter.len(), 2);

    // The duplicated line across streams is reported once.
    assert_eq!(result.total_entries, 3);
    let newest = &result.entries[0];
    assert_eq!(newest.matched_keywords, vec!["timeout", "error"]);
    assert_eq!(newest.keyword_contexts[0].position, 18);
    assert_eq!(newest.keyword_contexts[1].keyword, "error");
    assert_eq!(newest.keyword_contexts[1].position, 0);

    let info = &result.entries[2];
    assert!(info.matched_keywords.is_empty());
}

#[tokio::test]
async fn keyword_search_without_keywords_fails_validation() {
    let svc = service(FakeTransport::with_data(streams()));
    let result = svc
        .keyword_search(&KeywordSearchRequest::new(["", "   "]))
        .await;

    assert_eq!(result.status, ResultStatus::Error);
    assert_eq!(
        result.error.expect("error report").error_type,
        ErrorCategory::Validation
    );
    assert_eq!(svc.transport().instant_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Retries and Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let transport = FakeTransport::with_data(streams())
        .failing_first([Failure::status(503, ""), Failure::status(502, "")]);
    let svc = service(transport);

    let result = svc.range_query(&RangeQueryRequest::raw(r#"{job="api"}"#)).await;

    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(svc.transport().instant_calls.load(Ordering::SeqCst), 3);

    let stats = svc.statistics();
    let op = stats.operations.get("query_instant").expect("recorded");
    assert_eq!(op.retries, 2);
    assert_eq!(op.successes, 1);
    assert_eq!(op.by_kind.get(&ErrorKind::ServerError), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_is_reported_after_one_attempt() {
    let transport = FakeTransport::with_data(streams())
        .failing_first([Failure::status(403, "forbidden")]);
    let svc = service(transport);

    let result = svc.range_query(&RangeQueryRequest::raw(r#"{job="api"}"#)).await;

    assert_eq!(result.status, ResultStatus::Error);
    assert_eq!(result.query, r#"{job="api"}"#);
    let error = result.error.expect("error report");
    assert_eq!(error.error_type, ErrorCategory::Authentication);
    assert_eq!(error.attempts, 1);
    assert!(!error.retryable);
    assert!(error.message.contains("forbidden"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_last_failure() {
    let transport = FakeTransport::with_data(streams()).failing_first(
        std::iter::repeat_with(|| Failure::status(500, "ingester unavailable")).take(5),
    );
    let svc = service(transport);

    let result = svc.range_query(&RangeQueryRequest::raw(r#"{job="api"}"#)).await;

    let error = result.error.expect("error report");
    assert_eq!(error.error_type, ErrorCategory::ServerError);
    assert_eq!(error.attempts, 3);
    assert!(error.retryable);
    assert!(error.message.contains("ingester unavailable"));
    assert_eq!(svc.transport().instant_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn store_constraint_violation_is_validation() {
    let transport = FakeTransport::with_data(streams()).failing_first([Failure::status(
        400,
        "queries require at least one regexp or equality matcher that does not have an empty-compatible value",
    )]);
    let svc = service(transport);

    let result = svc.range_query(&RangeQueryRequest::raw(r#"{job=~".*"}"#)).await;
    let error = result.error.expect("error report");
    assert_eq!(error.error_type, ErrorCategory::Validation);
    assert_eq!(error.attempts, 1);
}
