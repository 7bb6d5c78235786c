// src/core/handlers.rs

//! Handler registry: maps a stable handler id to a statically typed async
//! invocation. Commands refer to handlers by id; the service checks every id
//! against the registry once, when it is assembled.

use crate::{
    CancellationToken,
    models::{ArgumentError, Arguments, CommandOutput},
};
use async_trait::async_trait;
use std::{collections::HashMap, fmt, future::Future, marker::PhantomData, sync::Arc};
use thiserror::Error;

/// How a handler reports that it did not succeed.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A structured domain failure; the reason is surfaced verbatim.
    #[error("{0}")]
    Failed(String),
    /// An uncontrolled error. `?` on any `anyhow`-compatible error lands here.
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl HandlerError {
    /// A domain failure with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed(reason.into())
    }
}

impl From<ArgumentError> for HandlerError {
    fn from(error: ArgumentError) -> Self {
        HandlerError::Fault(error.into())
    }
}

/// What every handler returns.
pub type HandlerResult = Result<CommandOutput, HandlerError>;

/// The code behind a command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command. Long-running handlers should watch `cancellation`.
    async fn invoke(&self, args: Arguments, cancellation: CancellationToken) -> HandlerResult;
}

/// Adapts an async closure into a [`CommandHandler`].
pub struct FnHandler<F, Fut> {
    handler: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(Arguments, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Wraps `handler`.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _future: PhantomData,
        }
    }
}

impl<F, Fut> fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

#[async_trait]
impl<F, Fut> CommandHandler for FnHandler<F, Fut>
where
    F: Fn(Arguments, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn invoke(&self, args: Arguments, cancellation: CancellationToken) -> HandlerResult {
        (self.handler)(args, cancellation).await
    }
}

/// Handlers keyed by id.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler stored under `id`.
    pub fn register(&mut self, id: &str, handler: impl CommandHandler + 'static) -> &mut Self {
        log::debug!("Registering handler '{}'", id);
        self.handlers.insert(id.to_string(), Arc::new(handler));
        self
    }

    /// Registers an async closure under `id`.
    pub fn register_fn<F, Fut>(&mut self, id: &str, handler: F) -> &mut Self
    where
        F: Fn(Arguments, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(id, FnHandler::new(handler))
    }

    /// The handler stored under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(id).cloned()
    }

    /// Whether a handler is stored under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("HandlerRegistry").field("ids", &ids).finish()
    }
}
