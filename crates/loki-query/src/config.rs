//! Client configuration.
//!
//! [`LokiConfig`] is assembled through [`LokiConfigBuilder`], which checks
//! every field before handing out a config. A built config is always valid.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::cache::DEFAULT_TTL;
use crate::retry::RetryPolicy;

/// Errors raised while building a [`LokiConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No URL was given.
    #[error("Loki URL is required")]
    MissingUrl,

    /// The URL did not parse.
    #[error("invalid Loki URL {url:?}: {reason}")]
    InvalidUrl {
        /// URL as given.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The URL scheme is neither http nor https.
    #[error("unsupported URL scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),

    /// Only one of username and password was given.
    #[error("username and password must be provided together")]
    IncompleteBasicAuth,

    /// Both basic auth and a bearer token were given.
    #[error("basic auth and bearer token cannot be used together")]
    ConflictingAuth,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    /// A numeric setting is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Setting name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Credentials sent with every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// No authentication.
    #[default]
    None,
    /// HTTP basic auth.
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

/// Validated client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LokiConfig {
    /// Base URL of the Loki server.
    pub url: Url,
    /// Authentication.
    pub credentials: Credentials,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Requests allowed per rate-limit period.
    pub rate_limit_requests: u32,
    /// Rate-limit window.
    pub rate_limit_period: Duration,
    /// Label cache TTL.
    pub cache_ttl: Duration,
    /// Budget across all attempts of one operation.
    pub deadline: Option<Duration>,
}

impl LokiConfig {
    /// Starts building a config for `url`.
    #[must_use]
    pub fn builder(url: impl Into<String>) -> LokiConfigBuilder {
        LokiConfigBuilder::new(url)
    }

    /// Retry policy derived from this config.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.saturating_add(1),
            deadline: self.deadline,
            ..RetryPolicy::default()
        }
    }
}

/// Builder for [`LokiConfig`].
#[derive(Debug, Clone)]
pub struct LokiConfigBuilder {
    url: String,
    username: Option<String>,
    password: Option<String>,
    bearer_token: Option<String>,
    timeout: Duration,
    max_retries: u32,
    rate_limit_requests: u32,
    rate_limit_period: Duration,
    cache_ttl: Duration,
    deadline: Option<Duration>,
}

impl LokiConfigBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            bearer_token: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            rate_limit_requests: 100,
            rate_limit_period: Duration::from_secs(60),
            cache_ttl: DEFAULT_TTL,
            deadline: Some(Duration::from_secs(30)),
        }
    }

    /// Sets the basic-auth username.
    #[must_use]
    pub fn username(mut self, username: Option<String>) -> Self {
        self.username = username.filter(|s| !s.is_empty());
        self
    }

    /// Sets the basic-auth password.
    #[must_use]
    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|s| !s.is_empty());
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|s| !s.is_empty());
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the client-side rate limit.
    #[must_use]
    pub const fn rate_limit(mut self, requests: u32, period: Duration) -> Self {
        self.rate_limit_requests = requests;
        self.rate_limit_period = period;
        self
    }

    /// Sets the label cache TTL.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the overall operation deadline; `None` disables it.
    #[must_use]
    pub const fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Validates and builds the config.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid setting.
    pub fn build(self) -> Result<LokiConfig, ConfigError> {
        let url = parse_url(&self.url)?;

        let credentials = match (self.username, self.password, self.bearer_token) {
            (Some(_), Some(_), Some(_)) => return Err(ConfigError::ConflictingAuth),
            (Some(_), None, _) | (None, Some(_), _) => return Err(ConfigError::IncompleteBasicAuth),
            (Some(username), Some(password), None) => Credentials::Basic { username, password },
            (None, None, Some(token)) => Credentials::Bearer(token),
            (None, None, None) => Credentials::None,
        };

        positive("timeout", self.timeout)?;
        positive("rate_limit_period", self.rate_limit_period)?;
        positive("cache_ttl", self.cache_ttl)?;
        if self.rate_limit_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit_requests",
                reason: "must be positive",
            });
        }
        if let Some(deadline) = self.deadline {
            positive("deadline", deadline)?;
        }

        Ok(LokiConfig {
            url,
            credentials,
            timeout: self.timeout,
            max_retries: self.max_retries,
            rate_limit_requests: self.rate_limit_requests,
            rate_limit_period: self.rate_limit_period,
            cache_ttl: self.cache_ttl,
            deadline: self.deadline,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::MissingUrl);
    }
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

const fn positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        Err(ConfigError::InvalidValue {
            field,
            reason: "must be positive",
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults() {
        let config = LokiConfig::builder("http://localhost:3100").build().expect("valid");
        assert_eq!(config.url.as_str(), "http://localhost:3100/");
        assert_eq!(config.credentials, Credentials::None);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.rate_limit_requests, 100);
        assert_eq!(config.rate_limit_period, Duration::from_secs(60));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn retry_policy_counts_first_attempt() {
        let config = LokiConfig::builder("https://loki.example.com")
            .max_retries(0)
            .build()
            .expect("valid");
        assert_eq!(config.retry_policy().max_attempts, 1);
    }

    #[test_case("" => ConfigError::MissingUrl ; "empty")]
    #[test_case("ftp://loki" => ConfigError::UnsupportedScheme("ftp".into()) ; "ftp scheme")]
    fn bad_urls(url: &str) -> ConfigError {
        LokiConfig::builder(url).build().expect_err("invalid")
    }

    #[test]
    fn unparseable_url() {
        let err = LokiConfig::builder("not a url").build().expect_err("invalid");
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn basic_auth_needs_both_parts() {
        let err = LokiConfig::builder("http://loki:3100")
            .username(Some("admin".into()))
            .build()
            .expect_err("invalid");
        assert_eq!(err, ConfigError::IncompleteBasicAuth);

        let err = LokiConfig::builder("http://loki:3100")
            .password(Some("secret".into()))
            .build()
            .expect_err("invalid");
        assert_eq!(err, ConfigError::IncompleteBasicAuth);
    }

    #[test]
    fn basic_and_bearer_conflict() {
        let err = LokiConfig::builder("http://loki:3100")
            .username(Some("admin".into()))
            .password(Some("secret".into()))
            .bearer_token(Some("tok".into()))
            .build()
            .expect_err("invalid");
        assert_eq!(err, ConfigError::ConflictingAuth);
    }

    #[test]
    fn credentials_are_built() {
        let basic = LokiConfig::builder("http://loki:3100")
            .username(Some("admin".into()))
            .password(Some("secret".into()))
            .build()
            .expect("valid");
        assert!(matches!(basic.credentials, Credentials::Basic { .. }));

        let bearer = LokiConfig::builder("http://loki:3100")
            .bearer_token(Some("tok".into()))
            .build()
            .expect("valid");
        assert_eq!(bearer.credentials, Credentials::Bearer("tok".into()));
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let config = LokiConfig::builder("http://loki:3100")
            .username(Some(String::new()))
            .bearer_token(Some(String::new()))
            .build()
            .expect("valid");
        assert_eq!(config.credentials, Credentials::None);
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let creds = Credentials::Basic {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
        assert!(!format!("{:?}", Credentials::Bearer("tok".into())).contains("tok"));
    }

    #[test]
    fn zero_values_rejected() {
        let err = LokiConfig::builder("http://loki:3100")
            .timeout(Duration::ZERO)
            .build()
            .expect_err("invalid");
        assert!(matches!(err, ConfigError::InvalidValue { field: "timeout", .. }));

        let err = LokiConfig::builder("http://loki:3100")
            .rate_limit(0, Duration::from_secs(60))
            .build()
            .expect_err("invalid");
        assert!(matches!(err, ConfigError::InvalidValue { field: "rate_limit_requests", .. }));
    }
}
