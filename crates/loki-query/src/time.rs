//! Time expression resolution.
//!
//! [`TimeResolver`] turns the time expressions callers use into UTC
//! instants. Accepted grammars, tried in order:
//!
//! 1. `now` (any case)
//! 2. `now-<N><unit>`: compound relative
//! 3. `<N><unit>`: bare relative, unit one of `s m h d w`
//! 4. decimal digits: Unix epoch seconds
//! 5. RFC 3339 / ISO-8601 literal; a literal without offset is UTC
//!
//! [`TimeResolver::resolve_window`] applies the start/end defaulting rules
//! used by the query operations.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QueryError, Result};
use crate::types::{TimeRange, TimeWindow};

/// Default upper bound for epoch timestamps, relative to now.
pub const DEFAULT_MAX_FUTURE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Lookback applied when only an end time is supplied, in seconds.
pub const DEFAULT_LOOKBACK_SECS: i64 = 60 * 60;

/// `now-<N><unit>` or `<N><unit>`.
static RELATIVE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(now-)?([0-9]+)([smhdw])$").unwrap_or_else(|_| unreachable!())
});

static EPOCH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap_or_else(|_| unreachable!()));

/// Offset-less layouts, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A time window after resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedWindow {
    /// A start/end range.
    Range(TimeRange),
    /// No bounds were supplied: an instantaneous query at this instant.
    Instant(DateTime<Utc>),
}

impl ResolvedWindow {
    /// The range, if this window has one.
    #[must_use]
    pub const fn range(&self) -> Option<TimeRange> {
        match self {
            Self::Range(range) => Some(*range),
            Self::Instant(_) => None,
        }
    }
}

/// Converts time expressions into UTC instants.
#[derive(Debug, Clone)]
pub struct TimeResolver {
    max_future: Duration,
}

impl Default for TimeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeResolver {
    /// Creates a resolver with the default epoch upper bound.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_future: DEFAULT_MAX_FUTURE,
        }
    }

    /// Sets how far past `now` an epoch timestamp may lie.
    #[must_use]
    pub const fn with_max_future(mut self, max_future: Duration) -> Self {
        self.max_future = max_future;
        self
    }

    /// Resolves a single expression against `now`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidTimeFormat`] when the expression matches
    /// none of the accepted grammars, or when an epoch value lies beyond the
    /// configured future bound.
    pub fn resolve(&self, expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let expr = expr.trim();

        if expr.eq_ignore_ascii_case("now") {
            return Ok(now);
        }

        if let Some(caps) = RELATIVE_REGEX.captures(expr) {
            let amount = &caps[2];
            let unit = &caps[3];
            let delta = relative_delta(amount, unit).ok_or_else(|| invalid(expr))?;
            return now.checked_sub_signed(delta).ok_or_else(|| invalid(expr));
        }

        if EPOCH_REGEX.is_match(expr) {
            return self.resolve_epoch(expr, now);
        }

        parse_literal(expr).ok_or_else(|| invalid(expr))
    }

    fn resolve_epoch(&self, expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let seconds: i64 = expr.parse().map_err(|_| invalid(expr))?;
        let instant = DateTime::from_timestamp(seconds, 0).ok_or_else(|| invalid(expr))?;

        let horizon = TimeDelta::from_std(self.max_future)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if instant > horizon {
            return Err(QueryError::InvalidTimeFormat(format!(
                "{expr} (epoch timestamp is too far in the future)"
            )));
        }
        Ok(instant)
    }

    /// Resolves a caller-supplied window.
    ///
    /// - only start: end defaults to `now`
    /// - only end: start defaults to one hour before end
    /// - neither: an instantaneous query at `now`
    ///
    /// Blank expressions count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidTimeFormat`] for unparseable bounds and
    /// [`QueryError::InvalidRange`] when the resolved start is after the end.
    pub fn resolve_window(&self, window: &TimeWindow, now: DateTime<Utc>) -> Result<ResolvedWindow> {
        let start = non_blank(window.start.as_deref());
        let end = non_blank(window.end.as_deref());

        let (start, end) = match (start, end) {
            (None, None) => return Ok(ResolvedWindow::Instant(now)),
            (Some(start), None) => (self.resolve(start, now)?, now),
            (None, Some(end)) => {
                let end = self.resolve(end, now)?;
                let start = end
                    .checked_sub_signed(TimeDelta::seconds(DEFAULT_LOOKBACK_SECS))
                    .ok_or_else(|| QueryError::InvalidTimeFormat(end.to_rfc3339()))?;
                (start, end)
            }
            (Some(start), Some(end)) => (self.resolve(start, now)?, self.resolve(end, now)?),
        };

        TimeRange::new(start, end).map(ResolvedWindow::Range)
    }
}

fn non_blank(expr: Option<&str>) -> Option<&str> {
    expr.map(str::trim).filter(|e| !e.is_empty())
}

fn invalid(expr: &str) -> QueryError {
    QueryError::InvalidTimeFormat(format!(
        "{expr} (expected RFC 3339, Unix seconds, 'now', or a relative time like '5m' or 'now-1h')"
    ))
}

fn relative_delta(amount: &str, unit: &str) -> Option<TimeDelta> {
    let amount: i64 = amount.parse().ok()?;
    match unit {
        "s" => TimeDelta::try_seconds(amount),
        "m" => TimeDelta::try_minutes(amount),
        "h" => TimeDelta::try_hours(amount),
        "d" => TimeDelta::try_days(amount),
        "w" => TimeDelta::try_weeks(amount),
        _ => None,
    }
}

fn parse_literal(expr: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(expr) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(expr, fmt).ok())
        .map(|naive| naive.and_utc())
}
