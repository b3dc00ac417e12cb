//! Keyword hit extraction for search results.
//!
//! Loki has already filtered the lines; this module reports which keywords
//! each line contains and where, with a short snippet around each hit.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::types::KeywordSpec;

/// Characters of context kept on each side of a hit.
pub const CONTEXT_CHARS: usize = 40;

/// Maximum snippets reported per keyword per line.
pub const MAX_SNIPPETS_PER_KEYWORD: usize = 5;

/// Marker for text cut from a snippet.
pub const ELLIPSIS: &str = "...";

/// One keyword hit with surrounding text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordContext {
    /// Keyword that matched.
    pub keyword: String,
    /// Snippet around the hit.
    pub context: String,
    /// Character offset of the hit in the line.
    pub position: usize,
}

/// Keywords found in one line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMatches {
    /// Keywords present in the line, in keyword order.
    pub matched_keywords: Vec<String>,
    /// Snippets, grouped by keyword in keyword order.
    pub contexts: Vec<KeywordContext>,
}

#[derive(Debug, Clone)]
struct Compiled {
    keyword: String,
    regex: Regex,
}

/// Finds keyword hits in log lines.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<Compiled>,
}

impl KeywordMatcher {
    /// Compiles matchers for the non-blank keywords of `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Validation`] if a keyword cannot be compiled.
    pub fn new(spec: &KeywordSpec) -> Result<Self> {
        let keywords = spec
            .effective_keywords()
            .into_iter()
            .map(|keyword| {
                RegexBuilder::new(&regex::escape(keyword))
                    .case_insensitive(!spec.case_sensitive)
                    .build()
                    .map(|regex| Compiled {
                        keyword: keyword.to_string(),
                        regex,
                    })
                    .map_err(|e| QueryError::Validation(format!("invalid keyword {keyword:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keywords })
    }

    /// Reports the keywords present in `line` with context snippets.
    #[must_use]
    pub fn find(&self, line: &str) -> LineMatches {
        let mut matches = LineMatches::default();
        let total_chars = line.chars().count();

        for compiled in &self.keywords {
            let mut found = false;
            for hit in compiled.regex.find_iter(line).take(MAX_SNIPPETS_PER_KEYWORD) {
                found = true;
                let position = line[..hit.start()].chars().count();
                let hit_chars = hit.as_str().chars().count();
                matches.contexts.push(KeywordContext {
                    keyword: compiled.keyword.clone(),
                    context: snippet(line, total_chars, position, hit_chars),
                    position,
                });
            }
            if found {
                matches.matched_keywords.push(compiled.keyword.clone());
            }
        }

        matches
    }
}

fn snippet(line: &str, total_chars: usize, position: usize, hit_chars: usize) -> String {
    let start = position.saturating_sub(CONTEXT_CHARS);
    let end = (position + hit_chars + CONTEXT_CHARS).min(total_chars);

    let mut out = String::new();
    if start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.extend(line.chars().skip(start).take(end - start));
    if end < total_chars {
        out.push_str(ELLIPSIS);
    }
    out
}
