//! `loki-query` binary entrypoint.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use loki_query::{QueryService, ResultStatus};
use loki_query_cli::{Cli, OutputFormat, execute};

/// Exit code when the command could not run at all.
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(ResultStatus::Success) => ExitCode::SUCCESS,
        Ok(ResultStatus::Error) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<ResultStatus> {
    let config = cli
        .connection
        .to_config()
        .context("invalid connection settings")?;
    let service = QueryService::from_config(&config).context("failed to create Loki client")?;

    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();
    let status = execute(&service, &cli.command, &mut stdout, &format).await?;
    Ok(status)
}
