// src/cli/mod.rs

use crate::core::{
    manifest::{self, AmbiguityPolicy, ServiceOptions},
    service::CommandService,
    tree::CommandTree,
};
use crate::models::ExecutionOutcome;
use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::*;
use std::path::Path;

pub mod builtins;

/// cmdtree: resolves command lines against a tree of command modules.
///
/// Without a COMMAND, one command line is read from each line of stdin.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// TOML manifest declaring the command modules. Defaults to the built-in demo tree.
    #[arg(long, short)]
    pub manifest: Option<String>,

    /// Print the command tree and exit.
    #[arg(long)]
    pub tree: bool,

    /// Report ambiguous input instead of running the first command that fits.
    #[arg(long)]
    pub strict: bool,

    /// The command line to resolve, e.g. `math sum 1 2 3`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Builds the command service described by the CLI flags: the manifest (or the
/// demo tree), environment overrides, then `--strict`.
pub fn build_service(cli: &Cli) -> Result<CommandService> {
    let (modules, options) = match &cli.manifest {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            let manifest = manifest::load_manifest(Path::new(expanded.as_ref()))?;
            (manifest.modules, manifest.options)
        }
        None => (builtins::demo_modules(), ServiceOptions::default()),
    };

    let mut options = options.apply_env_overrides()?;
    if cli.strict {
        options.ambiguity = AmbiguityPolicy::Reject;
    }

    let tree = CommandTree::build(&modules).context("Invalid command tree")?;
    CommandService::new(tree, builtins::parsers(), builtins::handlers(), options)
        .context("Failed to assemble the command service")
}

/// Joins argv words back into one command line, quoting words the shell had
/// already split on whitespace.
///
/// The command syntax has no escapes, so a word holding both whitespace and a
/// double quote cannot be expressed and is rejected.
pub fn join_words(words: &[String]) -> Result<String> {
    let quoted = words
        .iter()
        .map(|word| quote_word(word))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(" "))
}

fn quote_word(word: &str) -> Result<String> {
    if word.is_empty() {
        return Ok("\"\"".to_string());
    }
    if !word.contains(char::is_whitespace) {
        return Ok(word.to_string());
    }
    if word.contains('"') {
        bail!(
            "The argument '{}' mixes whitespace and double quotes, which a command line cannot express.",
            word
        );
    }
    // Keep `--name=` outside the quotes so the option is still recognised.
    if word.starts_with('-')
        && let Some((name, value)) = word.split_once('=')
        && !name.contains(char::is_whitespace)
    {
        return Ok(format!("{}=\"{}\"", name, value));
    }
    Ok(format!("\"{}\"", word))
}

/// Prints an outcome for a human reader: results to stdout, problems to stderr.
pub fn print_outcome(input: &str, outcome: &ExecutionOutcome) {
    match outcome {
        ExecutionOutcome::Successful(output) => {
            if let Some(message) = &output.message {
                println!("{}", message);
            }
            if let Some(data) = &output.data {
                match serde_json::to_string_pretty(data) {
                    Ok(json) => println!("{}", json.dimmed()),
                    Err(e) => log::warn!("Could not render output data: {}", e),
                }
            }
        }
        ExecutionOutcome::Failed(reason) => {
            eprintln!("{}: {}", "Failed".yellow().bold(), reason);
        }
        ExecutionOutcome::Faulted(fault) => {
            eprintln!("{}: {}", "Fault".red().bold(), fault);
        }
        ExecutionOutcome::Ambiguous(names) => {
            eprintln!(
                "{}: '{}' could run any of:",
                "Ambiguous".yellow().bold(),
                input
            );
            for name in names {
                eprintln!("  - {}", name.cyan());
            }
        }
        ExecutionOutcome::NotFound => {
            eprintln!(
                "{}: no command matches '{}'.",
                "Not found".red().bold(),
                input
            );
        }
    }
}
