//! Command dispatch.
//!
//! Turns parsed arguments into service requests, runs them and renders the
//! resulting envelope. The returned [`ResultStatus`] drives the exit code.

use std::io::Write;

use loki_query::{
    KeywordSearchRequest, LabelDiscoveryRequest, LokiTransport, QueryService, RangeQueryRequest,
    ResultStatus, TimeWindow,
};
use tracing::debug;

use crate::cli::{Commands, LabelsArgs, QueryArgs, SearchArgs, WindowArgs};
use crate::error::CliError;
use crate::output::OutputFormat;

impl WindowArgs {
    /// The window as the service expects it.
    #[must_use]
    pub fn to_window(&self) -> TimeWindow {
        TimeWindow::new(self.start.as_deref(), self.end.as_deref())
    }
}

impl QueryArgs {
    /// Builds the range query request.
    #[must_use]
    pub fn to_request(&self) -> RangeQueryRequest {
        let mut request = RangeQueryRequest::raw(self.logql.as_str())
            .with_window(self.window.to_window())
            .with_direction(self.direction.into());
        if let Some(limit) = self.limit {
            request = request.with_limit(limit);
        }
        request
    }
}

impl SearchArgs {
    /// Builds the keyword search request.
    #[must_use]
    pub fn to_request(&self) -> KeywordSearchRequest {
        let mut request = KeywordSearchRequest::new(self.keywords.iter().cloned())
            .with_window(self.window.to_window())
            .with_operator(self.operator.into())
            .with_case_sensitive(self.case_sensitive);
        for (name, value) in &self.labels {
            request = request.with_label(name.as_str(), value.as_str());
        }
        if let Some(limit) = self.limit {
            request = request.with_limit(limit);
        }
        request
    }
}

impl LabelsArgs {
    /// Builds the label discovery request.
    #[must_use]
    pub fn to_request(&self) -> LabelDiscoveryRequest {
        let request = match self.name {
            Some(ref name) => LabelDiscoveryRequest::values(name.as_str()),
            None => LabelDiscoveryRequest::names(),
        }
        .with_window(self.window.to_window());
        if self.no_cache {
            request.without_cache()
        } else {
            request
        }
    }
}

/// Runs `command` against `service` and writes the envelope to `out`.
///
/// # Errors
///
/// Returns an error only if rendering fails; operation failures are part
/// of the envelope and reported through the returned status.
pub async fn execute<T, W>(
    service: &QueryService<T>,
    command: &Commands,
    out: &mut W,
    format: &OutputFormat,
) -> Result<ResultStatus, CliError>
where
    T: LokiTransport,
    W: Write,
{
    match command {
        Commands::Query(args) => {
            let request = args.to_request();
            debug!(?request, "running range query");
            let result = service.range_query(&request).await;
            format.write(out, &result)?;
            Ok(result.status)
        }
        Commands::Search(args) => {
            let request = args.to_request();
            debug!(?request, "running keyword search");
            let result = service.keyword_search(&request).await;
            format.write(out, &result)?;
            Ok(result.status)
        }
        Commands::Labels(args) => {
            let request = args.to_request();
            debug!(?request, "running label discovery");
            let result = service.label_discovery(&request).await;
            format.write(out, &result)?;
            Ok(result.status)
        }
    }
}
