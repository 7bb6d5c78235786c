// src/cli/builtins.rs

//! Demo commands shipped with the binary. A manifest may refer to any of these
//! handler ids (`echo`, `fail`, `crash`, `sum`, `wait`) and to the `case` type.

use crate::{
    CancellationToken,
    core::{
        handlers::{HandlerError, HandlerRegistry},
        parsers::ParserRegistry,
    },
    models::{
        Arguments, CommandDescriptor, CommandOutput, ModuleDescriptor, ParameterDescriptor,
        Value,
    },
};
use anyhow::anyhow;
use std::time::Duration;

/// Parsers for the demo types: the `case` enumeration on top of the built-ins.
pub fn parsers() -> ParserRegistry {
    let mut parsers = ParserRegistry::new();
    parsers.register_enum("case", ["keep", "upper", "lower"]);
    parsers
}

/// Handlers behind the demo commands, keyed by handler id.
pub fn handlers() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers
        .register_fn("echo", |args, _| async move { echo(&args) })
        .register_fn("sum", |args, _| async move { sum(&args) })
        .register_fn("fail", |args, _| async move {
            let reason: String = args.get("reason")?;
            Err::<CommandOutput, _>(HandlerError::Failed(reason))
        })
        .register_fn("crash", |_, _| async move {
            Err::<CommandOutput, _>(HandlerError::Fault(anyhow!(
                "the crash command always crashes"
            )))
        })
        .register_fn("wait", wait);
    handlers
}

/// The command tree used when no manifest is given.
pub fn demo_modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::ungrouped().command(
            CommandDescriptor::new("echo", "echo")
                .alias("say")
                .describe("Print the given words")
                .param(ParameterDescriptor::positional("words").collection(None, None))
                .param(
                    ParameterDescriptor::named("case")
                        .short('c')
                        .of_type("case")
                        .default_text("keep"),
                ),
        ),
        ModuleDescriptor::group("math")
            .alias("m")
            .describe("Arithmetic")
            .command(
                CommandDescriptor::new("sum", "sum")
                    .describe("Add integers")
                    .param(
                        ParameterDescriptor::positional("values")
                            .of_type("i64")
                            .collection(Some(1), None),
                    )
                    .param(ParameterDescriptor::switch("verbose").short('v')),
            ),
        ModuleDescriptor::group("debug")
            .describe("Commands that misbehave on purpose")
            .command(
                CommandDescriptor::new("fail", "fail")
                    .describe("Report a domain failure")
                    .param(
                        ParameterDescriptor::positional("reason").default_text("requested failure"),
                    ),
            )
            .command(CommandDescriptor::new("crash", "crash").describe("Raise an error"))
            .command(
                CommandDescriptor::new("wait", "wait")
                    .describe("Sleep until done or cancelled")
                    .param(
                        ParameterDescriptor::positional("millis")
                            .of_type("u64")
                            .default_text("1000"),
                    ),
            ),
    ]
}

fn echo(args: &Arguments) -> Result<CommandOutput, HandlerError> {
    let words: Vec<String> = args.get("words")?;
    let line = words.join(" ");
    let line = match args.value("case") {
        Some(Value::Enum { variant, .. }) if variant == "upper" => line.to_uppercase(),
        Some(Value::Enum { variant, .. }) if variant == "lower" => line.to_lowercase(),
        _ => line,
    };
    Ok(CommandOutput::text(line))
}

fn sum(args: &Arguments) -> Result<CommandOutput, HandlerError> {
    let values: Vec<i64> = args.get("values")?;
    let verbose: bool = args.get("verbose")?;

    let total = values
        .iter()
        .try_fold(0i64, |acc, value| acc.checked_add(*value))
        .ok_or_else(|| HandlerError::failed("the sum overflows a 64-bit integer"))?;

    let output = CommandOutput::text(total.to_string());
    if verbose {
        Ok(output.with_data(serde_json::json!({ "values": values, "total": total })))
    } else {
        Ok(output)
    }
}

async fn wait(
    args: Arguments,
    cancellation: CancellationToken,
) -> Result<CommandOutput, HandlerError> {
    let millis: u64 = args.get("millis")?;
    log::debug!("Waiting {} ms", millis);
    tokio::time::sleep(Duration::from_millis(millis)).await;
    // The service aborts this task on cancellation; a direct caller may not.
    if crate::core::commons::check_for_cancellation(&cancellation).is_err() {
        return Err(HandlerError::Fault(anyhow!("wait was cancelled")));
    }
    Ok(CommandOutput::text(format!("waited {} ms", millis)))
}
