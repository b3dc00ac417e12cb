//! The seam between the query layer and the store.
//!
//! [`LokiTransport`] performs exactly one call per invocation and reports
//! failures as raw [`Failure`]s; retrying and classification happen above
//! it. [`crate::client::HttpTransport`] is the production implementation.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::classify::Failure;
use crate::response::QueryData;
use crate::types::{Direction, TimeRange};

/// Parameters of a range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// LogQL query.
    pub query: String,
    /// Resolved window.
    pub range: TimeRange,
    /// Maximum entries to return.
    pub limit: u32,
    /// Result ordering.
    pub direction: Direction,
}

/// Parameters of an instant query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantRequest {
    /// LogQL query.
    pub query: String,
    /// Evaluation instant.
    pub time: DateTime<Utc>,
    /// Maximum entries to return.
    pub limit: u32,
    /// Result ordering.
    pub direction: Direction,
}

/// A single-shot client for the Loki HTTP API.
///
/// Implementations must be safe to share between concurrent callers.
pub trait LokiTransport: Send + Sync {
    /// Runs a range query.
    fn query_range(
        &self,
        request: &RangeRequest,
    ) -> impl Future<Output = Result<QueryData, Failure>> + Send;

    /// Runs an instant query.
    fn query_instant(
        &self,
        request: &InstantRequest,
    ) -> impl Future<Output = Result<QueryData, Failure>> + Send;

    /// Lists label names seen in `range`.
    fn label_names(
        &self,
        range: &TimeRange,
    ) -> impl Future<Output = Result<Vec<String>, Failure>> + Send;

    /// Lists values of `label` seen in `range`.
    fn label_values(
        &self,
        label: &str,
        range: &TimeRange,
    ) -> impl Future<Output = Result<Vec<String>, Failure>> + Send;
}
