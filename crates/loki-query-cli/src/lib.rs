//! # loki-query-cli
//!
//! Command-line front end for `loki-query`.
//!
//! Provides commands for:
//! - Range and instant LogQL queries
//! - Keyword search with per-line hit context
//! - Label name and value discovery
//!
//! Connection settings come from flags or `LOKI_*` environment variables.
//! Results print as a table or as the JSON envelope the service returns.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format};
pub use commands::execute;
pub use error::CliError;
pub use output::OutputFormat;
