//! Per-operation failure statistics.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::classify::ErrorKind;

/// Counters for a single operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStats {
    /// Calls that ended successfully.
    pub successes: u64,
    /// Calls that ended in failure.
    pub failures: u64,
    /// Retries performed (attempts beyond the first).
    pub retries: u64,
    /// Failed attempts by kind.
    pub by_kind: BTreeMap<ErrorKind, u64>,
    /// Message of the most recent failed attempt.
    pub last_error: Option<String>,
}

impl OperationStats {
    /// Fraction of calls that failed, or zero when nothing ran.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            0.0
        } else {
            self.failures as f64 / total as f64
        }
    }
}

/// Thread-safe failure counters keyed by operation name.
#[derive(Debug, Default)]
pub struct ErrorStatistics {
    operations: RwLock<BTreeMap<String, OperationStats>>,
}

impl ErrorStatistics {
    /// Creates empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed attempt.
    pub fn record_attempt_failure(&self, operation: &str, kind: ErrorKind, message: &str) {
        let mut ops = self.operations.write();
        let entry = ops.entry(operation.to_string()).or_default();
        *entry.by_kind.entry(kind).or_default() += 1;
        entry.last_error = Some(message.to_string());
    }

    /// Records a retry.
    pub fn record_retry(&self, operation: &str) {
        self.operations
            .write()
            .entry(operation.to_string())
            .or_default()
            .retries += 1;
    }

    /// Records the final outcome of a call.
    pub fn record_outcome(&self, operation: &str, success: bool) {
        let mut ops = self.operations.write();
        let entry = ops.entry(operation.to_string()).or_default();
        if success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
    }

    /// Stats for one operation.
    #[must_use]
    pub fn operation(&self, operation: &str) -> Option<OperationStats> {
        self.operations.read().get(operation).cloned()
    }

    /// Snapshot of every operation.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, OperationStats> {
        self.operations.read().clone()
    }

    /// Clears all counters.
    pub fn reset(&self) {
        self.operations.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_per_operation() {
        let stats = ErrorStatistics::new();
        stats.record_attempt_failure("range_query", ErrorKind::ServerError, "HTTP 503");
        stats.record_retry("range_query");
        stats.record_outcome("range_query", true);
        stats.record_outcome("labels", false);

        let range = stats.operation("range_query").expect("recorded");
        assert_eq!(range.successes, 1);
        assert_eq!(range.retries, 1);
        assert_eq!(range.by_kind.get(&ErrorKind::ServerError), Some(&1));
        assert_eq!(range.last_error.as_deref(), Some("HTTP 503"));
        assert!((range.failure_rate() - 0.0).abs() < f64::EPSILON);

        let labels = stats.operation("labels").expect("recorded");
        assert!((labels.failure_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reset_clears() {
        let stats = ErrorStatistics::new();
        stats.record_outcome("x", true);
        stats.reset();
        assert!(stats.snapshot().is_empty());
    }
}
