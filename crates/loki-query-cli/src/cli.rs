//! Command-line argument parsing with clap.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use loki_query::{ConfigError, Direction, KeywordOperator, LokiConfig};

/// Query Grafana Loki from the command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "loki-query")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Connection settings.
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Where and how to reach Loki.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Loki base URL.
    #[arg(short, long, env = "LOKI_URL", default_value = "http://localhost:3100")]
    pub url: String,

    /// Basic-auth username.
    #[arg(long, env = "LOKI_USERNAME")]
    pub username: Option<String>,

    /// Basic-auth password.
    #[arg(long, env = "LOKI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Bearer token.
    #[arg(long, env = "LOKI_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "LOKI_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Retries after the first attempt.
    #[arg(long, env = "LOKI_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Requests allowed per rate-limit period.
    #[arg(long, env = "LOKI_RATE_LIMIT_REQUESTS", default_value_t = 100)]
    pub rate_limit_requests: u32,

    /// Rate-limit period in seconds.
    #[arg(long, env = "LOKI_RATE_LIMIT_PERIOD", default_value_t = 60)]
    pub rate_limit_period: u64,
}

impl ConnectionArgs {
    /// Builds a validated client config.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a setting is invalid.
    pub fn to_config(&self) -> Result<LokiConfig, ConfigError> {
        LokiConfig::builder(self.url.as_str())
            .username(self.username.clone())
            .password(self.password.clone())
            .bearer_token(self.bearer_token.clone())
            .timeout(Duration::from_secs(self.timeout))
            .max_retries(self.max_retries)
            .rate_limit(
                self.rate_limit_requests,
                Duration::from_secs(self.rate_limit_period),
            )
            .build()
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a LogQL query over a time range.
    Query(QueryArgs),

    /// Search log lines for keywords.
    Search(SearchArgs),

    /// List label names, or the values of one label.
    Labels(LabelsArgs),
}

/// Time bounds shared by every subcommand.
///
/// Accepts `now`, `now-15m`, `15m`, epoch seconds or an RFC 3339 timestamp.
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Start of the window.
    #[arg(long)]
    pub start: Option<String>,

    /// End of the window.
    #[arg(long)]
    pub end: Option<String>,
}

/// Arguments for the query command.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// LogQL query text.
    pub logql: String,

    /// Time bounds. With neither bound the query is evaluated at now.
    #[command(flatten)]
    pub window: WindowArgs,

    /// Maximum entries to return.
    #[arg(long)]
    pub limit: Option<u32>,

    /// Result ordering.
    #[arg(long, value_enum, default_value_t = DirectionArg::Backward)]
    pub direction: DirectionArg,
}

/// Arguments for the search command.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Keywords to look for.
    #[arg(required = true)]
    pub keywords: Vec<String>,

    /// Equality label filter, repeatable.
    #[arg(short, long = "label", value_name = "KEY=VALUE", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,

    /// Time bounds.
    #[command(flatten)]
    pub window: WindowArgs,

    /// Maximum entries to return.
    #[arg(long)]
    pub limit: Option<u32>,

    /// Match keywords case sensitively.
    #[arg(long)]
    pub case_sensitive: bool,

    /// How keywords combine.
    #[arg(long, value_enum, default_value_t = OperatorArg::And)]
    pub operator: OperatorArg,
}

/// Arguments for the labels command.
#[derive(Args, Debug, Clone)]
pub struct LabelsArgs {
    /// Label whose values to list; omit to list label names.
    pub name: Option<String>,

    /// Time bounds. Unbounded means the last hour.
    #[command(flatten)]
    pub window: WindowArgs,

    /// Skip the label cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Result ordering argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    /// Oldest first.
    Forward,
    /// Newest first.
    #[default]
    Backward,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Forward => Self::Forward,
            DirectionArg::Backward => Self::Backward,
        }
    }
}

/// Keyword operator argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OperatorArg {
    /// Every keyword must appear.
    #[default]
    And,
    /// Any keyword may appear.
    Or,
}

impl From<OperatorArg> for KeywordOperator {
    fn from(arg: OperatorArg) -> Self {
        match arg {
            OperatorArg::And => Self::And,
            OperatorArg::Or => Self::Or,
        }
    }
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty label name in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}
