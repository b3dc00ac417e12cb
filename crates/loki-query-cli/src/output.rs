//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::collections::BTreeMap;
use std::io::Write;

use loki_query::{
    ErrorReport, KeywordSearchResult, LabelDiscoveryResult, LabelType, RangeQueryResult,
    TimeRangeInfo,
};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Widest label column in table output.
const LABELS_WIDTH: usize = 32;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        if self.is_json() {
            serde_json::to_writer_pretty(&mut *writer, value)
                .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
            writeln!(writer)?;
        } else {
            value.write_table(writer)?;
        }
        Ok(())
    }

    /// Write a value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

impl TableDisplay for RangeQueryResult {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if let Some(ref error) = self.error {
            return write_error(writer, error);
        }
        if self.entries.is_empty() {
            writeln!(writer, "No entries in {}", describe_range(&self.time_range))?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<24}  {:<width$}  LINE",
            "TIMESTAMP",
            "LABELS",
            width = LABELS_WIDTH
        )?;
        writeln!(writer, "{}", "─".repeat(96))?;
        for entry in &self.entries {
            writeln!(
                writer,
                "{:<24}  {:<width$}  {}",
                entry.timestamp,
                truncate(&format_labels(&entry.labels), LABELS_WIDTH),
                entry.line,
                width = LABELS_WIDTH
            )?;
        }

        writeln!(writer)?;
        writeln!(
            writer,
            "Total: {} {} entr{}",
            self.total_entries,
            self.result_type,
            if self.total_entries == 1 { "y" } else { "ies" }
        )?;
        Ok(())
    }
}

impl TableDisplay for KeywordSearchResult {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if let Some(ref error) = self.error {
            return write_error(writer, error);
        }
        writeln!(writer, "Query: {}", self.query_used)?;
        writeln!(writer)?;
        if self.entries.is_empty() {
            writeln!(writer, "No matches in {}", describe_range(&self.time_range))?;
            return Ok(());
        }

        for hit in &self.entries {
            writeln!(writer, "{}  {}", hit.entry.timestamp, hit.entry.line)?;
            if !hit.matched_keywords.is_empty() {
                writeln!(writer, "    matched: {}", hit.matched_keywords.join(", "))?;
            }
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} match(es)", self.total_entries)?;
        Ok(())
    }
}

impl TableDisplay for LabelDiscoveryResult {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if let Some(ref error) = self.error {
            return write_error(writer, error);
        }
        let heading = match (self.label_type, &self.label_name) {
            (LabelType::Values, Some(name)) => format!("Values of {name}"),
            _ => "Label names".to_string(),
        };
        writeln!(writer, "{heading}")?;
        writeln!(writer, "══════════════════════════════════")?;
        for label in &self.labels {
            writeln!(writer, "  {label}")?;
        }

        writeln!(writer)?;
        write!(writer, "Total: {}", self.total_count)?;
        if self.cached {
            write!(writer, " (cached)")?;
        }
        writeln!(writer)?;
        Ok(())
    }
}

fn write_error<W: Write>(writer: &mut W, error: &ErrorReport) -> Result<(), CliError> {
    writeln!(writer, "Error ({}): {}", error.error_type.as_str(), error.message)?;
    if error.attempts > 0 {
        writeln!(writer, "  Attempts:   {}", error.attempts)?;
    }
    writeln!(writer, "  Retryable:  {}", if error.retryable { "yes" } else { "no" })?;
    writeln!(writer, "  Suggestion: {}", error.suggestion)?;
    Ok(())
}

fn describe_range(range: &TimeRangeInfo) -> String {
    match (&range.start, &range.end) {
        (Some(start), Some(end)) => format!("{start} .. {end}"),
        (None, Some(at)) => format!("instant {at}"),
        _ => "the requested window".to_string(),
    }
}

fn format_labels(labels: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v:?}")).collect();
    format!("{{{}}}", pairs.join(", "))
}

/// Truncate to `max_chars` characters, marking the cut with `...`.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else if max_chars > 3 {
        let kept: String = s.chars().take(max_chars - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_chars).collect()
    }
}
