//! LogQL query construction.
//!
//! [`QueryBuilder`] renders a [`LabelSelector`] plus either a caller-authored
//! pipeline fragment or a [`KeywordSpec`] into a LogQL string.
//!
//! Loki rejects selectors in which every matcher also matches the empty
//! string (`{app=~".*"}`, `{}`), so rendering always keeps at least one
//! matcher that cannot match the empty string, adding
//! `__name__=~".+"` when the caller supplied none.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QueryError, Result};
use crate::types::{KeywordOperator, KeywordSpec, LabelMatcher, LabelSelector, MatchMode};

/// Label used for the synthetic non-empty matcher.
pub const SYNTHETIC_LABEL: &str = "__name__";

/// Pattern of the synthetic matcher; cannot match the empty string.
pub const NON_EMPTY_PATTERN: &str = ".+";

static LABEL_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap_or_else(|_| unreachable!())
});

/// Builds LogQL query strings.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Creates a builder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds a query from a selector and either a raw fragment or keywords.
    ///
    /// When `raw_fragment` is non-blank it is appended verbatim and
    /// `keywords` is ignored. Output is deterministic for identical input.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] for invalid label names, values
    /// that cannot be written as string literals, regexes that do not
    /// compile, a keyword spec without any non-blank keyword, or a result
    /// with unbalanced delimiters.
    pub fn build(
        &self,
        selector: &LabelSelector,
        raw_fragment: Option<&str>,
        keywords: Option<&KeywordSpec>,
    ) -> Result<String> {
        let mut query = self.render_selector(selector)?;

        if let Some(fragment) = raw_fragment.map(str::trim).filter(|f| !f.is_empty()) {
            query.push(' ');
            query.push_str(fragment);
            check_balanced(&query)?;
            return Ok(query);
        }

        if let Some(spec) = keywords {
            for filter in compile_keywords(spec)? {
                query.push(' ');
                query.push_str(&filter);
            }
        }

        Ok(query)
    }

    /// Renders only the stream selector.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] for malformed matchers.
    pub fn render_selector(&self, selector: &LabelSelector) -> Result<String> {
        let mut parts = Vec::with_capacity(selector.matchers.len() + 1);
        let mut has_non_empty = false;

        for matcher in &selector.matchers {
            let matcher = normalize(matcher);
            validate(&matcher)?;
            if !matches_empty(&matcher)? {
                has_non_empty = true;
            }
            parts.push(format!(
                "{}{}{}",
                matcher.name,
                matcher.mode.operator(),
                quote(&matcher.value)?
            ));
        }

        if !has_non_empty {
            parts.push(format!("{SYNTHETIC_LABEL}=~\"{NON_EMPTY_PATTERN}\""));
        }

        Ok(format!("{{{}}}", parts.join(", ")))
    }
}

/// Rewrites equality matchers that would match anything into `=~".+"`.
fn normalize(matcher: &LabelMatcher) -> LabelMatcher {
    let wildcard = matcher.value.is_empty() || matcher.value == ".*";
    if matcher.mode == MatchMode::Equals && wildcard {
        LabelMatcher::regex(matcher.name.clone(), NON_EMPTY_PATTERN)
    } else {
        matcher.clone()
    }
}

/// Whether `name` is a valid label name.
#[must_use]
pub fn is_valid_label_name(name: &str) -> bool {
    LABEL_NAME_REGEX.is_match(name)
}

fn validate(matcher: &LabelMatcher) -> Result<()> {
    if !is_valid_label_name(&matcher.name) {
        return Err(QueryError::Validation(format!(
            "invalid label name: {:?}",
            matcher.name
        )));
    }
    Ok(())
}

/// Whether the matcher accepts a stream whose label value is empty.
fn matches_empty(matcher: &LabelMatcher) -> Result<bool> {
    Ok(match matcher.mode {
        MatchMode::Equals => matcher.value.is_empty(),
        MatchMode::NotEquals => !matcher.value.is_empty(),
        MatchMode::Regex => anchored(matcher)?.is_match(""),
        MatchMode::NotRegex => !anchored(matcher)?.is_match(""),
    })
}

fn anchored(matcher: &LabelMatcher) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", matcher.value)).map_err(|e| {
        QueryError::Validation(format!(
            "invalid regex for label {}: {e}",
            matcher.name
        ))
    })
}

/// Writes `value` as a double-quoted LogQL string literal.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] for control characters that have no
/// escape sequence.
pub fn quote(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                return Err(QueryError::Validation(format!(
                    "value contains an unescapable control character: {:?}",
                    c
                )));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    Ok(out)
}

/// Compiles keywords into line filters, in keyword order.
fn compile_keywords(spec: &KeywordSpec) -> Result<Vec<String>> {
    let keywords = spec.effective_keywords();
    if keywords.is_empty() {
        return Err(QueryError::Validation(
            "at least one non-empty keyword must be provided".to_string(),
        ));
    }

    match spec.operator {
        KeywordOperator::And => keywords
            .iter()
            .map(|keyword| {
                if spec.case_sensitive {
                    Ok(format!("|= {}", quote(keyword)?))
                } else {
                    Ok(format!("|~ {}", quote(&format!("(?i){}", regex::escape(keyword)))?))
                }
            })
            .collect(),
        KeywordOperator::Or => {
            let alternation = keywords
                .iter()
                .map(|keyword| regex::escape(keyword))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = if spec.case_sensitive {
                alternation
            } else {
                format!("(?i){alternation}")
            };
            Ok(vec![format!("|~ {}", quote(&pattern)?)])
        }
    }
}

/// Checks that brackets balance outside string literals and that every
/// string literal is terminated.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] describing the first problem found.
pub fn check_balanced(query: &str) -> Result<()> {
    let mut stack = Vec::new();
    let mut chars = query.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => loop {
                match chars.next() {
                    Some('\\') => {
                        chars.next();
                    }
                    Some('"') => break,
                    Some(_) => {}
                    None => {
                        return Err(QueryError::Validation(
                            "unterminated string literal in query".to_string(),
                        ));
                    }
                }
            },
            '`' => {
                if !chars.by_ref().any(|c| c == '`') {
                    return Err(QueryError::Validation(
                        "unterminated raw string literal in query".to_string(),
                    ));
                }
            }
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Err(QueryError::Validation(format!(
                        "unbalanced '{ch}' in query"
                    )));
                }
            }
            _ => {}
        }
    }

    match stack.last() {
        Some(open) => Err(QueryError::Validation(format!("unclosed '{open}' in query"))),
        None => Ok(()),
    }
}
