//! fieldlog CLI binary entrypoint.
//!
//! This is the main entry point for the `fieldlog` command-line tool.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use fieldlog_cli::cli::{Cli, Format};
use fieldlog_cli::error::CliError;
use fieldlog_cli::session::run_cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = cli.format;

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(format, &e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut stdout = io::stdout().lock();
    run_cli(&cli, &mut stdout, tokio::io::stdin(), &cancel)
        .await
        .with_context(|| format!("{} failed", cli.command.name()))
}

fn report_error(format: Format, err: &anyhow::Error) {
    if format == Format::Json {
        if let Some(cli_err) = err.downcast_ref::<CliError>() {
            if let Ok(body) = serde_json::to_string(&cli_err.to_body()) {
                eprintln!("{body}");
                return;
            }
        }
    }
    eprintln!("Error: {err:#}");
}
