//! Loki HTTP API response bodies and their normalization.
//!
//! This module provides:
//! - [`QueryResponse`] / [`QueryData`]: Decoded `query` and `query_range` bodies
//! - [`LabelsResponse`]: Decoded label name/value bodies
//! - [`QueryEntry`]: The uniform entry every result shape is flattened to
//! - [`normalize`]: Flattening, ordering and truncation

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Direction, to_millis_iso};

/// Body of a successful `query` / `query_range` call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryResponse {
    /// `"success"` on success.
    pub status: String,
    /// Result payload.
    pub data: QueryData,
}

/// Result payload, tagged by `resultType`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryData {
    /// Log streams.
    Streams(Vec<Stream>),
    /// Metric series over time.
    Matrix(Vec<Series>),
    /// Metric samples at one instant.
    Vector(Vec<Sample>),
    /// A single scalar value.
    Scalar(SamplePoint),
}

impl QueryData {
    /// The `resultType` of this payload.
    #[must_use]
    pub const fn result_type(&self) -> &'static str {
        match self {
            Self::Streams(_) => "streams",
            Self::Matrix(_) => "matrix",
            Self::Vector(_) => "vector",
            Self::Scalar(_) => "scalar",
        }
    }
}

impl Default for QueryData {
    fn default() -> Self {
        Self::Streams(Vec::new())
    }
}

/// One log stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Stream {
    /// Stream labels.
    #[serde(default)]
    pub stream: BTreeMap<String, String>,
    /// Entries in the stream.
    #[serde(default)]
    pub values: Vec<StreamValue>,
}

/// A log line with its nanosecond timestamp.
///
/// Extra trailing elements (structured metadata) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<Value>")]
pub struct StreamValue {
    /// Unix nanoseconds.
    pub timestamp_ns: i64,
    /// Log line.
    pub line: String,
}

impl TryFrom<Vec<Value>> for StreamValue {
    type Error = String;

    fn try_from(items: Vec<Value>) -> Result<Self, Self::Error> {
        let mut items = items.into_iter();
        let timestamp_ns = match items.next() {
            Some(Value::String(s)) => s
                .parse::<i64>()
                .map_err(|e| format!("invalid stream timestamp {s:?}: {e}"))?,
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| format!("invalid stream timestamp {n}"))?,
            other => return Err(format!("missing stream timestamp: {other:?}")),
        };
        let line = match items.next() {
            Some(Value::String(s)) => s,
            other => return Err(format!("missing log line: {other:?}")),
        };
        Ok(Self { timestamp_ns, line })
    }
}

/// `[<unix seconds>, "<value>"]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplePoint(pub f64, pub String);

/// A metric series.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Series {
    /// Series labels.
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// Points in the series.
    #[serde(default)]
    pub values: Vec<SamplePoint>,
}

/// A metric sample.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sample {
    /// Sample labels.
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// The sample.
    pub value: SamplePoint,
}

/// Body of a label names or label values call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelsResponse {
    /// `"success"` on success.
    pub status: String,
    /// Names or values; absent when the store has none.
    #[serde(default)]
    pub data: Vec<String>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    /// Error message.
    #[serde(default)]
    pub error: Option<String>,
    /// Alternative message field.
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Extracts the message from a raw body, falling back to the trimmed text.
    #[must_use]
    pub fn message_from(body: &str) -> String {
        serde_json::from_str::<Self>(body)
            .ok()
            .and_then(|b| b.error.or(b.message))
            .unwrap_or_else(|| body.trim().to_string())
    }
}

/// A normalized log entry or metric sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEntry {
    /// Millisecond-precision ISO 8601 timestamp with `Z`.
    pub timestamp: String,
    /// Unix nanoseconds.
    pub timestamp_ns: i64,
    /// Log line or sample value.
    pub line: String,
    /// Stream or series labels.
    pub labels: BTreeMap<String, String>,
}

impl QueryEntry {
    fn new(timestamp_ns: i64, line: String, labels: BTreeMap<String, String>) -> Self {
        Self {
            timestamp: format_nanos(timestamp_ns),
            timestamp_ns,
            line,
            labels,
        }
    }
}

/// Formats Unix nanoseconds as a millisecond ISO timestamp.
#[must_use]
pub fn format_nanos(timestamp_ns: i64) -> String {
    let secs = timestamp_ns.div_euclid(1_000_000_000);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = timestamp_ns.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nanos).map_or_else(|| timestamp_ns.to_string(), to_millis_iso)
}

#[allow(clippy::cast_possible_truncation)]
fn seconds_to_nanos(seconds: f64) -> i64 {
    (seconds * 1e9).round() as i64
}

/// Flattens `data` into entries ordered by `direction`, keeping at most `limit`.
#[must_use]
pub fn normalize(data: QueryData, direction: Direction, limit: usize) -> Vec<QueryEntry> {
    let mut entries: Vec<QueryEntry> = match data {
        QueryData::Streams(streams) => streams
            .into_iter()
            .flat_map(|s| {
                let labels = s.stream;
                s.values
                    .into_iter()
                    .map(move |v| QueryEntry::new(v.timestamp_ns, v.line, labels.clone()))
            })
            .collect(),
        QueryData::Matrix(series) => series
            .into_iter()
            .flat_map(|s| {
                let labels = s.metric;
                s.values
                    .into_iter()
                    .map(move |p| QueryEntry::new(seconds_to_nanos(p.0), p.1, labels.clone()))
            })
            .collect(),
        QueryData::Vector(samples) => samples
            .into_iter()
            .map(|s| QueryEntry::new(seconds_to_nanos(s.value.0), s.value.1, s.metric))
            .collect(),
        QueryData::Scalar(point) => vec![QueryEntry::new(
            seconds_to_nanos(point.0),
            point.1,
            BTreeMap::new(),
        )],
    };

    match direction {
        Direction::Forward => entries.sort_by_key(|e| e.timestamp_ns),
        Direction::Backward => entries.sort_by_key(|e| std::cmp::Reverse(e.timestamp_ns)),
    }
    entries.truncate(limit);
    entries
}
