// src/bin/cmdtree.rs

use anyhow::{Context, Result};
use clap::Parser;
use cmdtree::{
    CancellationToken,
    cli::{self, Cli},
    constants::EXIT_FAILURE,
    core::{
        commons,
        graph_display::{self, DisplayOptions},
    },
};
use colored::*;
use std::{sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    env_logger::init();
    let cancellation_token = commons::new_cancellation_token();

    // First Ctrl+C cancels the running command; a second one exits immediately.
    let signal_token = Arc::clone(&cancellation_token);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::debug!("Ctrl+C received, cancelling.");
            commons::cancel(&signal_token);
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    match run_cli(Cli::parse(), &cancellation_token).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_FAILURE),
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(EXIT_FAILURE);
        }
    }
}

/// Runs the request described by the CLI. Returns whether every command succeeded.
async fn run_cli(cli: Cli, cancellation_token: &CancellationToken) -> Result<bool> {
    log::debug!("CLI args parsed: {:?}", cli);
    let service = cli::build_service(&cli)?;

    if cli.tree {
        print!(
            "{}",
            graph_display::render_tree(service.tree(), &DisplayOptions::default())
        );
        return Ok(true);
    }

    if !cli.command.is_empty() {
        let input = cli::join_words(&cli.command)?;
        let outcome = service.resolve_and_execute(&input, cancellation_token).await;
        cli::print_outcome(&input, &outcome);
        return Ok(outcome.is_successful());
    }

    // --- Line mode: one command per stdin line ---
    let poll = Duration::from_millis(service.options().cancellation_poll_ms.max(1));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut all_successful = true;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            _ = commons::wait_for_cancellation(cancellation_token, poll) => None,
        };
        let Some(line) = line else { break };

        let input = line.trim();
        if input.is_empty() || input.starts_with('#') {
            continue;
        }
        let outcome = service.resolve_and_execute(input, cancellation_token).await;
        cli::print_outcome(input, &outcome);
        all_successful &= outcome.is_successful();

        if commons::check_for_cancellation(cancellation_token).is_err() {
            break;
        }
    }

    if commons::check_for_cancellation(cancellation_token).is_err() {
        return Ok(false);
    }
    Ok(all_successful)
}
