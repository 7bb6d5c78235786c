// src/core/service.rs

//! # Command Service
//!
//! Entry point of the resolution pipeline: tokenize the input, find candidate
//! commands in the tree, materialize their arguments, and invoke the chosen
//! handler. Every request ends in exactly one [`ExecutionOutcome`].
//!
//! The service only reads its tree and registries, so one instance can be
//! shared (behind an `Arc`) by any number of concurrent resolutions. It must be
//! driven from inside a tokio runtime, since handlers run on spawned tasks.

use crate::{
    CancellationToken,
    core::{
        commons,
        handlers::{HandlerError, HandlerRegistry, HandlerResult},
        manifest::{AmbiguityPolicy, ServiceOptions},
        materializer::{self, BindingError},
        matcher::{self, NamedValues},
        parsers::ParserRegistry,
        tree::{BuildError, CommandTree},
    },
    models::{Arguments, BoundCommand, CommandNode, ExecutionOutcome, Fault},
};
use anyhow::anyhow;
use std::{any::Any, sync::Arc, time::Duration};
use tokio::task::JoinError;

/// Resolves command lines against one tree with one set of registries.
#[derive(Debug, Clone)]
pub struct CommandService {
    tree: Arc<CommandTree>,
    parsers: Arc<ParserRegistry>,
    handlers: Arc<HandlerRegistry>,
    options: ServiceOptions,
}

impl CommandService {
    /// Assembles a service, checking that every command's handler is registered
    /// and every parameter type has a parser.
    pub fn new(
        tree: CommandTree,
        parsers: ParserRegistry,
        handlers: HandlerRegistry,
        options: ServiceOptions,
    ) -> Result<Self, BuildError> {
        let commands = tree.commands();
        for command in &commands {
            if !handlers.contains(&command.handler) {
                return Err(BuildError::UnknownHandler {
                    command: command.qualified_name(),
                    handler: command.handler.clone(),
                });
            }
            for shape in &command.parameters {
                if let Some(value_type) = shape.value_type()
                    && !parsers.contains(value_type)
                {
                    return Err(BuildError::UnknownType {
                        command: command.qualified_name(),
                        parameter: shape.name.clone(),
                        value_type: value_type.to_string(),
                    });
                }
            }
        }
        log::debug!(
            "Command service ready: {} command(s), ambiguity policy {:?}.",
            commands.len(),
            options.ambiguity
        );

        Ok(Self {
            tree: Arc::new(tree),
            parsers: Arc::new(parsers),
            handlers: Arc::new(handlers),
            options,
        })
    }

    /// The tree this service resolves against.
    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    /// The options the service was assembled with.
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Resolves a raw command line and runs the command it addresses.
    pub async fn resolve_and_execute(
        &self,
        input: &str,
        cancellation: &CancellationToken,
    ) -> ExecutionOutcome {
        let candidates = matcher::search(&self.tree, input);
        let outcome = self.execute_candidates(candidates, cancellation).await;
        log::debug!("'{}' -> {}", input, outcome.label());
        outcome
    }

    /// Runs the command at an explicit path, with parameters supplied by name.
    pub async fn execute_path<S: AsRef<str> + Sync>(
        &self,
        path: &[S],
        named: &NamedValues,
        cancellation: &CancellationToken,
    ) -> ExecutionOutcome {
        let candidates = matcher::search_path(&self.tree, path, named);
        let outcome = self.execute_candidates(candidates, cancellation).await;
        log::debug!(
            "path '{}' -> {}",
            path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" "),
            outcome.label()
        );
        outcome
    }

    async fn execute_candidates(
        &self,
        candidates: Vec<BoundCommand<'_>>,
        cancellation: &CancellationToken,
    ) -> ExecutionOutcome {
        match self.options.ambiguity {
            AmbiguityPolicy::FirstMatch => {
                for candidate in &candidates {
                    match self.prepare(candidate, cancellation).await {
                        Ok(Some(args)) => {
                            return self.invoke(candidate.command, args, cancellation).await;
                        }
                        Ok(None) => continue,
                        Err(fault) => return ExecutionOutcome::Faulted(fault),
                    }
                }
                ExecutionOutcome::NotFound
            }
            AmbiguityPolicy::Reject => {
                let mut ready = Vec::new();
                for candidate in &candidates {
                    match self.prepare(candidate, cancellation).await {
                        Ok(Some(args)) => ready.push((candidate.command, args)),
                        Ok(None) => continue,
                        Err(fault) => return ExecutionOutcome::Faulted(fault),
                    }
                }
                if ready.len() > 1 {
                    let names = ready
                        .iter()
                        .map(|(command, _)| command.qualified_name())
                        .collect();
                    return ExecutionOutcome::Ambiguous(names);
                }
                match ready.pop() {
                    Some((command, args)) => self.invoke(command, args, cancellation).await,
                    None => ExecutionOutcome::NotFound,
                }
            }
        }
    }

    /// Materializes one candidate. `Ok(None)` drops the candidate; an error is
    /// terminal for the whole request.
    async fn prepare(
        &self,
        candidate: &BoundCommand<'_>,
        cancellation: &CancellationToken,
    ) -> Result<Option<Arguments>, Fault> {
        match materializer::materialize(candidate, &self.parsers, cancellation).await {
            Ok(args) => Ok(Some(args)),
            Err(BindingError::Fault { parameter, error }) => {
                Err(Fault::Conversion { parameter, error })
            }
            Err(BindingError::Cancelled) => Err(Fault::Cancelled),
            Err(error) => {
                log::debug!(
                    "Dropping candidate '{}': {}",
                    candidate.command.qualified_name(),
                    error
                );
                Ok(None)
            }
        }
    }

    /// Runs the handler on its own task and waits for it, checking the
    /// cancellation flag every `cancellation_poll_ms`. The task is aborted if
    /// this future is dropped before the handler finishes.
    async fn invoke(
        &self,
        command: &CommandNode,
        args: Arguments,
        cancellation: &CancellationToken,
    ) -> ExecutionOutcome {
        if commons::check_for_cancellation(cancellation).is_err() {
            return ExecutionOutcome::Faulted(Fault::Cancelled);
        }
        let Some(handler) = self.handlers.get(&command.handler) else {
            return ExecutionOutcome::Faulted(Fault::Handler(anyhow!(
                "Handler '{}' is not registered.",
                command.handler
            )));
        };

        log::debug!(
            "Invoking '{}' with {} argument(s).",
            command.qualified_name(),
            args.len()
        );
        let task_token = Arc::clone(cancellation);
        let task = tokio::spawn(async move { handler.invoke(args, task_token).await });
        let mut task = scopeguard::guard(task, |task| task.abort());
        let poll = Duration::from_millis(self.options.cancellation_poll_ms.max(1));

        tokio::select! {
            joined = &mut *task => classify(joined),
            _ = commons::wait_for_cancellation(cancellation, poll) => {
                log::debug!(
                    "Cancellation requested, aborting '{}'.",
                    command.qualified_name()
                );
                task.abort();
                ExecutionOutcome::Faulted(Fault::Cancelled)
            }
        }
    }
}

fn classify(joined: Result<HandlerResult, JoinError>) -> ExecutionOutcome {
    match joined {
        Ok(Ok(output)) => ExecutionOutcome::Successful(output),
        Ok(Err(HandlerError::Failed(reason))) => ExecutionOutcome::Failed(reason),
        Ok(Err(HandlerError::Fault(error))) => ExecutionOutcome::Faulted(Fault::Handler(error)),
        Err(join_error) if join_error.is_panic() => ExecutionOutcome::Faulted(Fault::Panicked(
            panic_message(join_error.into_panic()),
        )),
        Err(_) => ExecutionOutcome::Faulted(Fault::Cancelled),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::commons::{cancel, new_cancellation_token},
        models::{CommandDescriptor, CommandOutput, ModuleDescriptor, ParameterDescriptor, Value},
    };
    use crate::{
        core::parsers::{ConversionError, ValueParser},
        models::ValueType,
    };
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicBool, Ordering},
    };

    fn handlers() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("ping", |_, _| async { Ok(CommandOutput::text("pong")) })
            .register_fn("say", |args: Arguments, _| async move {
                let text: String = args.get("text")?;
                Ok::<_, HandlerError>(CommandOutput::text(text))
            })
            .register_fn("count", |args: Arguments, _| async move {
                let count: i32 = args.get("count")?;
                Ok::<_, HandlerError>(CommandOutput::text(format!("count {}", count)))
            })
            .register_fn("bare", |_, _| async { Ok(CommandOutput::text("bare")) })
            .register_fn("refuse", |_, _| async {
                Err(HandlerError::failed("quota exceeded"))
            })
            .register_fn("explode", |_, _| async {
                Err(HandlerError::Fault(anyhow!("disk on fire")))
            })
            .register_fn("panic", |_, _| async {
                if true {
                    panic!("handler blew up");
                }
                Ok(CommandOutput::ok())
            })
            .register_fn("slow", |_, _| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(CommandOutput::text("too late"))
            });
        registry
    }

    fn modules() -> Vec<ModuleDescriptor> {
        vec![
            ModuleDescriptor::ungrouped()
                .command(CommandDescriptor::new("ping", "ping"))
                .command(CommandDescriptor::new("refuse", "refuse"))
                .command(CommandDescriptor::new("explode", "explode"))
                .command(CommandDescriptor::new("panic", "panic"))
                .command(CommandDescriptor::new("slow", "slow")),
            ModuleDescriptor::group("over")
                .command(CommandDescriptor::new("cmd", "bare"))
                .command(
                    CommandDescriptor::new("cmd", "say")
                        .param(ParameterDescriptor::positional("text")),
                ),
            ModuleDescriptor::group("num")
                .command(
                    CommandDescriptor::new("show", "count")
                        .param(ParameterDescriptor::positional("count").of_type("i32")),
                )
                .command(
                    CommandDescriptor::new("show", "say")
                        .param(ParameterDescriptor::positional("text")),
                ),
        ]
    }

    fn service(ambiguity: AmbiguityPolicy) -> CommandService {
        let tree = CommandTree::build(&modules()).unwrap();
        let options = ServiceOptions {
            ambiguity,
            cancellation_poll_ms: 5,
        };
        CommandService::new(tree, ParserRegistry::new(), handlers(), options).unwrap()
    }

    fn message(outcome: &ExecutionOutcome) -> Option<&str> {
        match outcome {
            ExecutionOutcome::Successful(output) => output.message.as_deref(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_found_and_not_found() {
        let service = service(AmbiguityPolicy::FirstMatch);
        let ct = new_cancellation_token();

        let outcome = service.resolve_and_execute("ping", &ct).await;
        assert_eq!(message(&outcome), Some("pong"));

        let outcome = service.resolve_and_execute("pong", &ct).await;
        assert!(matches!(outcome, ExecutionOutcome::NotFound));

        let outcome = service.resolve_and_execute("", &ct).await;
        assert!(matches!(outcome, ExecutionOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_handler_failures_are_classified() {
        let service = service(AmbiguityPolicy::FirstMatch);
        let ct = new_cancellation_token();

        match service.resolve_and_execute("refuse", &ct).await {
            ExecutionOutcome::Failed(reason) => assert_eq!(reason, "quota exceeded"),
            other => panic!("expected Failed, got {:?}", other),
        }

        match service.resolve_and_execute("explode", &ct).await {
            ExecutionOutcome::Faulted(Fault::Handler(error)) => {
                assert_eq!(error.to_string(), "disk on fire")
            }
            other => panic!("expected Faulted, got {:?}", other),
        }

        match service.resolve_and_execute("panic", &ct).await {
            ExecutionOutcome::Faulted(Fault::Panicked(message)) => {
                assert_eq!(message, "handler blew up")
            }
            other => panic!("expected a panic fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overloads_pick_by_arguments() {
        let service = service(AmbiguityPolicy::FirstMatch);
        let ct = new_cancellation_token();

        let outcome = service.resolve_and_execute("over cmd", &ct).await;
        assert_eq!(message(&outcome), Some("bare"));

        let outcome = service.resolve_and_execute("over cmd hello", &ct).await;
        assert_eq!(message(&outcome), Some("hello"));

        let outcome = service.resolve_and_execute("over cmd hello again", &ct).await;
        assert!(matches!(outcome, ExecutionOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_conversion_failure_falls_through_to_next_candidate() {
        let service = service(AmbiguityPolicy::FirstMatch);
        let ct = new_cancellation_token();

        let outcome = service.resolve_and_execute("num show 7", &ct).await;
        assert_eq!(message(&outcome), Some("count 7"));

        let outcome = service.resolve_and_execute("num show seven", &ct).await;
        assert_eq!(message(&outcome), Some("seven"));
    }

    #[tokio::test]
    async fn test_reject_policy_reports_every_runnable_candidate() {
        let service = service(AmbiguityPolicy::Reject);
        let ct = new_cancellation_token();

        match service.resolve_and_execute("num show 7", &ct).await {
            ExecutionOutcome::Ambiguous(names) => {
                assert_eq!(names, vec!["num show".to_string(), "num show".to_string()])
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }

        // Only the text overload materializes, so there is nothing to choose.
        let outcome = service.resolve_and_execute("num show seven", &ct).await;
        assert_eq!(message(&outcome), Some("seven"));
    }

    #[tokio::test]
    async fn test_cancellation_before_resolution() {
        let service = service(AmbiguityPolicy::FirstMatch);
        let ct = new_cancellation_token();
        cancel(&ct);

        let outcome = service.resolve_and_execute("ping", &ct).await;
        assert!(matches!(outcome, ExecutionOutcome::Faulted(Fault::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_running_handler() {
        let service = service(AmbiguityPolicy::FirstMatch);
        let ct = new_cancellation_token();

        let trigger = Arc::clone(&ct);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel(&trigger);
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            service.resolve_and_execute("slow", &ct),
        )
        .await
        .expect("cancellation should end the request");
        assert!(matches!(outcome, ExecutionOutcome::Faulted(Fault::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_request_aborts_its_handler() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let tree = CommandTree::build(&[
            ModuleDescriptor::ungrouped().command(CommandDescriptor::new("side", "side"))
        ])
        .unwrap();
        let mut handlers = HandlerRegistry::new();
        handlers.register_fn("side", move |_, _| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, HandlerError>(CommandOutput::ok())
            }
        });
        let service =
            CommandService::new(tree, ParserRegistry::new(), handlers, ServiceOptions::default())
                .unwrap();
        let ct = new_cancellation_token();

        let result = tokio::time::timeout(
            Duration::from_millis(10),
            service.resolve_and_execute("side", &ct),
        )
        .await;
        assert!(result.is_err(), "the request should have timed out");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    struct OfflineParser;

    #[async_trait]
    impl ValueParser for OfflineParser {
        async fn parse(
            &self,
            _text: &str,
            _target: &ValueType,
            _cancellation: &CancellationToken,
        ) -> Result<Value, ConversionError> {
            Err(ConversionError::Fault(anyhow!("user directory offline")))
        }
    }

    #[tokio::test]
    async fn test_parser_fault_ends_the_request_without_trying_later_overloads() {
        let tree = CommandTree::build(&[ModuleDescriptor::group("user")
            .command(
                CommandDescriptor::new("kick", "ping")
                    .param(ParameterDescriptor::positional("who").of_type("user")),
            )
            .command(
                CommandDescriptor::new("kick", "say")
                    .param(ParameterDescriptor::positional("text")),
            )])
        .unwrap();
        let mut parsers = ParserRegistry::new();
        parsers.register(ValueType::named("user"), OfflineParser);

        for ambiguity in [AmbiguityPolicy::FirstMatch, AmbiguityPolicy::Reject] {
            let options = ServiceOptions {
                ambiguity,
                ..ServiceOptions::default()
            };
            let service =
                CommandService::new(tree.clone(), parsers.clone(), handlers(), options).unwrap();

            match service
                .resolve_and_execute("user kick bob", &new_cancellation_token())
                .await
            {
                ExecutionOutcome::Faulted(Fault::Conversion { parameter, error }) => {
                    assert_eq!(parameter, "who");
                    assert_eq!(error.to_string(), "user directory offline");
                }
                other => panic!("expected a conversion fault, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_execute_path() {
        let service = service(AmbiguityPolicy::FirstMatch);
        let ct = new_cancellation_token();

        let mut named = HashMap::new();
        named.insert("text".to_string(), vec!["from a form".to_string()]);
        let outcome = service.execute_path(&["over", "cmd"], &named, &ct).await;
        assert_eq!(message(&outcome), Some("from a form"));

        let outcome = service.execute_path(&["over", "cmd"], &HashMap::new(), &ct).await;
        assert_eq!(message(&outcome), Some("bare"));

        let outcome = service.execute_path(&["over"], &HashMap::new(), &ct).await;
        assert!(matches!(outcome, ExecutionOutcome::NotFound));
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_share_one_service() {
        let service = Arc::new(service(AmbiguityPolicy::FirstMatch));
        let mut tasks = Vec::new();
        for i in 0..8 {
            let service = Arc::clone(&service);
            tasks.push(tokio::spawn(async move {
                let ct = new_cancellation_token();
                let outcome = service
                    .resolve_and_execute(&format!("over cmd word{}", i), &ct)
                    .await;
                message(&outcome).map(str::to_string)
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap(), Some(format!("word{}", i)));
        }
    }

    #[test]
    fn test_unknown_handler_is_a_build_error() {
        let tree = CommandTree::build(&[
            ModuleDescriptor::ungrouped().command(CommandDescriptor::new("ghost", "nobody"))
        ])
        .unwrap();
        let error = CommandService::new(
            tree,
            ParserRegistry::new(),
            HandlerRegistry::new(),
            ServiceOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            error,
            BuildError::UnknownHandler {
                command: "ghost".to_string(),
                handler: "nobody".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_a_build_error() {
        let tree = CommandTree::build(&[ModuleDescriptor::ungrouped().command(
            CommandDescriptor::new("paint", "ping")
                .param(ParameterDescriptor::positional("color").of_type("color")),
        )])
        .unwrap();
        let error =
            CommandService::new(tree, ParserRegistry::new(), handlers(), ServiceOptions::default())
                .unwrap_err();
        assert!(matches!(error, BuildError::UnknownType { ref value_type, .. } if value_type == "color"));
    }

    #[tokio::test]
    async fn test_custom_parser_values_reach_the_handler() {
        #[derive(Debug, PartialEq)]
        struct Rgb(u8, u8, u8);

        let tree = CommandTree::build(&[ModuleDescriptor::ungrouped().command(
            CommandDescriptor::new("paint", "paint")
                .param(ParameterDescriptor::positional("color").of_type("color")),
        )])
        .unwrap();
        let mut parsers = ParserRegistry::new();
        parsers.register_fn("color", |text| match text {
            "red" => Ok(Value::custom(Rgb(255, 0, 0))),
            other => Err(format!("unknown color '{}'", other)),
        });
        let mut handlers = HandlerRegistry::new();
        handlers.register_fn("paint", |args: Arguments, _| async move {
            let value = args.value("color").and_then(|v| v.downcast_ref::<Rgb>());
            Ok(CommandOutput::text(format!("{:?}", value)))
        });
        let service =
            CommandService::new(tree, parsers, handlers, ServiceOptions::default()).unwrap();
        let ct = new_cancellation_token();

        let outcome = service.resolve_and_execute("paint red", &ct).await;
        assert_eq!(message(&outcome), Some("Some(Rgb(255, 0, 0))"));

        let outcome = service.resolve_and_execute("paint mauve", &ct).await;
        assert!(matches!(outcome, ExecutionOutcome::NotFound));
    }
}
