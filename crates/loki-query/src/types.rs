//! Core types shared by the query layer.
//!
//! This module provides:
//! - [`TimeRange`]: A validated `start <= end` window
//! - [`MatchMode`] / [`LabelMatcher`] / [`LabelSelector`]: Stream selectors
//! - [`KeywordOperator`] / [`KeywordSpec`]: Keyword line filters
//! - [`Direction`]: Result ordering
//! - [`TimeWindow`]: Unresolved start/end expressions as supplied by callers

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

/// A resolved, validated time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a time range, failing when `start > end`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] if start is after end.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(QueryError::InvalidRange {
                start: to_rfc3339(start),
                end: to_rfc3339(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// Formats an instant the way Loki expects it on the wire.
#[must_use]
pub fn to_rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Formats an instant with millisecond precision, for display.
#[must_use]
pub fn to_millis_iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Unresolved time expressions exactly as a caller supplied them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start expression, if any.
    pub start: Option<String>,
    /// End expression, if any.
    pub end: Option<String>,
}

impl TimeWindow {
    /// Creates a window from optional start and end expressions.
    #[must_use]
    pub fn new(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    /// A window with neither bound.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A window starting at `start` and ending now.
    #[must_use]
    pub fn since(start: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: None,
        }
    }
}

/// How a label matcher compares its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// `name="value"`
    Equals,
    /// `name=~"regex"`
    Regex,
    /// `name!="value"`
    NotEquals,
    /// `name!~"regex"`
    NotRegex,
}

impl MatchMode {
    /// The LogQL operator for this mode.
    #[must_use]
    pub const fn operator(&self) -> &'static str {
        match self {
            Self::Equals => "=",
            Self::Regex => "=~",
            Self::NotEquals => "!=",
            Self::NotRegex => "!~",
        }
    }

    /// Whether the value is interpreted as a regular expression.
    #[must_use]
    pub const fn is_regex(&self) -> bool {
        matches!(self, Self::Regex | Self::NotRegex)
    }
}

/// A single label matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelMatcher {
    /// Label name.
    pub name: String,
    /// Value or pattern.
    pub value: String,
    /// Comparison mode.
    pub mode: MatchMode,
}

impl LabelMatcher {
    /// Creates a matcher.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            mode,
        }
    }

    /// `name="value"`
    #[must_use]
    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, MatchMode::Equals)
    }

    /// `name=~"pattern"`
    #[must_use]
    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(name, pattern, MatchMode::Regex)
    }

    /// `name!="value"`
    #[must_use]
    pub fn not_equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, MatchMode::NotEquals)
    }

    /// `name!~"pattern"`
    #[must_use]
    pub fn not_regex(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(name, pattern, MatchMode::NotRegex)
    }
}

/// An ordered set of label matchers.
///
/// Order only affects the generated text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelSelector {
    /// Matchers in caller order.
    pub matchers: Vec<LabelMatcher>,
}

impl LabelSelector {
    /// Creates an empty selector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a matcher.
    #[must_use]
    pub fn with(mut self, matcher: LabelMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Builds an equality selector from label pairs, sorted by label name.
    #[must_use]
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut pairs: Vec<_> = labels.into_iter().collect();
        pairs.sort();
        Self {
            matchers: pairs
                .into_iter()
                .map(|(name, value)| LabelMatcher::equals(name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Returns true if the selector has no matchers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// How multiple keywords combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeywordOperator {
    /// Every keyword must appear.
    #[default]
    And,
    /// Any keyword may appear.
    Or,
}

/// Keywords to compile into line filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordSpec {
    /// Keywords in caller order.
    pub keywords: Vec<String>,
    /// Combination operator.
    pub operator: KeywordOperator,
    /// Whether matching is case sensitive.
    pub case_sensitive: bool,
}

impl KeywordSpec {
    /// Creates a spec.
    #[must_use]
    pub fn new<I, S>(keywords: I, operator: KeywordOperator, case_sensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            operator,
            case_sensitive,
        }
    }

    /// Keywords with blanks dropped and surrounding whitespace trimmed.
    #[must_use]
    pub fn effective_keywords(&self) -> Vec<&str> {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Oldest first.
    Forward,
    /// Newest first.
    #[default]
    Backward,
}

impl Direction {
    /// The wire value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 17, h, 0, 0)
            .single()
            .expect("valid date")
    }

    // ===========================================
    // TimeRange Tests
    // ===========================================

    #[test]
    fn time_range_accepts_ordered_bounds() {
        let range = TimeRange::new(at(12), at(13)).expect("ordered");
        assert_eq!(range.duration(), chrono::Duration::hours(1));
    }

    #[test]
    fn time_range_accepts_equal_bounds() {
        assert!(TimeRange::new(at(12), at(12)).is_ok());
    }

    #[test]
    fn time_range_rejects_inverted_bounds() {
        let err = TimeRange::new(at(13), at(12));
        assert!(matches!(err, Err(QueryError::InvalidRange { .. })));
    }

    #[test]
    fn rfc3339_uses_z_suffix() {
        assert_eq!(to_rfc3339(at(12)), "2024-08-17T12:00:00Z");
        assert_eq!(to_millis_iso(at(12)), "2024-08-17T12:00:00.000Z");
    }

    // ===========================================
    // Matcher Tests
    // ===========================================

    #[test]
    fn match_mode_operators() {
        assert_eq!(MatchMode::Equals.operator(), "=");
        assert_eq!(MatchMode::Regex.operator(), "=~");
        assert_eq!(MatchMode::NotEquals.operator(), "!=");
        assert_eq!(MatchMode::NotRegex.operator(), "!~");
        assert!(MatchMode::NotRegex.is_regex());
        assert!(!MatchMode::NotEquals.is_regex());
    }

    #[test]
    fn selector_from_labels_is_sorted() {
        let mut labels = HashMap::new();
        labels.insert("level".to_string(), "error".to_string());
        labels.insert("app".to_string(), "web".to_string());
        labels.insert("job".to_string(), "api".to_string());

        let selector = LabelSelector::from_labels(&labels);
        let names: Vec<_> = selector.matchers.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["app", "job", "level"]);
        assert!(selector.matchers.iter().all(|m| m.mode == MatchMode::Equals));
    }

    // ===========================================
    // KeywordSpec Tests
    // ===========================================

    #[test]
    fn effective_keywords_drop_blanks() {
        let spec = KeywordSpec::new(["error", "  ", "", " timeout "], KeywordOperator::And, false);
        assert_eq!(spec.effective_keywords(), vec!["error", "timeout"]);
    }

    #[test]
    fn operator_serializes_uppercase() {
        let json = serde_json::to_string(&KeywordOperator::Or).expect("serialize");
        assert_eq!(json, "\"OR\"");
        assert_eq!(KeywordOperator::default(), KeywordOperator::And);
    }

    #[test]
    fn direction_defaults_to_backward() {
        assert_eq!(Direction::default(), Direction::Backward);
        assert_eq!(Direction::Forward.as_str(), "forward");
    }
}
