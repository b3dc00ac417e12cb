//! HTTP transport over `reqwest`.

use std::error::Error as _;
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::classify::{Failure, TransportFailure};
use crate::config::{ConfigError, Credentials, LokiConfig};
use crate::rate_limit::RateLimiter;
use crate::response::{ErrorBody, LabelsResponse, QueryData, QueryResponse};
use crate::transport::{InstantRequest, LokiTransport, RangeRequest};
use crate::types::{TimeRange, to_rfc3339};

/// `User-Agent` sent with every request.
pub const USER_AGENT: &str = concat!("loki-query/", env!("CARGO_PKG_VERSION"));

const API_PREFIX: [&str; 3] = ["loki", "api", "v1"];

/// [`LokiTransport`] backed by the Loki HTTP API.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
    credentials: Credentials,
    limiter: RateLimiter,
}

impl HttpTransport {
    /// Creates a transport from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be
    /// initialized.
    pub fn new(config: &LokiConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base: config.url.clone(),
            credentials: config.credentials.clone(),
            limiter: RateLimiter::new(config.rate_limit_requests, config.rate_limit_period),
        })
    }

    /// Builds the URL of an API endpoint below the base URL.
    ///
    /// # Errors
    ///
    /// Returns a transport failure if the base URL cannot carry a path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, Failure> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Failure::transport(TransportFailure::Other, "base URL cannot carry a path")
            })?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<T, Failure> {
        self.limiter.acquire().await;
        debug!(url = %url, "sending request");

        let mut request = self
            .client
            .get(url)
            .query(params)
            .header(ACCEPT, "application/json");
        request = match &self.credentials {
            Credentials::None => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::Bearer(token) => request.bearer_auth(token),
        };

        let response = request.send().await.map_err(|e| map_reqwest_error(&e))?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::Status {
                code: status.as_u16(),
                message: ErrorBody::message_from(&body),
                retry_after,
            });
        }

        let bytes = response.bytes().await.map_err(|e| map_reqwest_error(&e))?;
        serde_json::from_slice(&bytes).map_err(|e| Failure::Decode {
            message: format!("invalid response body: {e}"),
        })
    }
}

fn check_status(status: &str) -> Result<(), Failure> {
    if status == "success" {
        Ok(())
    } else {
        Err(Failure::Decode {
            message: format!("unexpected response status {status:?}"),
        })
    }
}

fn range_params(range: &TimeRange) -> Vec<(&'static str, String)> {
    vec![
        ("start", to_rfc3339(range.start)),
        ("end", to_rfc3339(range.end)),
    ]
}

impl LokiTransport for HttpTransport {
    async fn query_range(&self, request: &RangeRequest) -> Result<QueryData, Failure> {
        let url = self.endpoint(&["query_range"])?;
        let mut params = vec![("query", request.query.clone())];
        params.extend(range_params(&request.range));
        params.push(("limit", request.limit.to_string()));
        params.push(("direction", request.direction.as_str().to_string()));

        let body: QueryResponse = self.get(url, &params).await?;
        check_status(&body.status)?;
        Ok(body.data)
    }

    async fn query_instant(&self, request: &InstantRequest) -> Result<QueryData, Failure> {
        let url = self.endpoint(&["query"])?;
        let params = [
            ("query", request.query.clone()),
            ("time", to_rfc3339(request.time)),
            ("limit", request.limit.to_string()),
            ("direction", request.direction.as_str().to_string()),
        ];

        let body: QueryResponse = self.get(url, &params).await?;
        check_status(&body.status)?;
        Ok(body.data)
    }

    async fn label_names(&self, range: &TimeRange) -> Result<Vec<String>, Failure> {
        let url = self.endpoint(&["labels"])?;
        let body: LabelsResponse = self.get(url, &range_params(range)).await?;
        check_status(&body.status)?;
        Ok(body.data)
    }

    async fn label_values(&self, label: &str, range: &TimeRange) -> Result<Vec<String>, Failure> {
        let url = self.endpoint(&["label", label, "values"])?;
        let body: LabelsResponse = self.get(url, &range_params(range)).await?;
        check_status(&body.status)?;
        Ok(body.data)
    }
}

/// Reads a `Retry-After` header given in seconds.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn map_reqwest_error(error: &reqwest::Error) -> Failure {
    let message = error_chain(error);
    let category = if error.is_timeout() {
        TransportFailure::Timeout
    } else if error.is_connect() {
        TransportFailure::ConnectRefused
    } else if error.is_decode() || error.is_body() {
        return Failure::Decode { message };
    } else {
        TransportFailure::Other
    };
    Failure::transport(category, message)
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
