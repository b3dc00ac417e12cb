//! CLI error types.

use loki_query::ConfigError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Connection settings were rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Output formatting failed.
    #[error("format error: {0}")]
    Format(String),

    /// Writing output failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
