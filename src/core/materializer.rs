// src/core/materializer.rs

use crate::{
    CancellationToken,
    core::{
        commons,
        parsers::{ConversionError, ParserRegistry},
    },
    models::{
        Arguments, Arity, BoundCommand, BoundParameter, DefaultValue, ParameterShape, ShapeKind,
        Value, ValueType,
    },
};
use anyhow::anyhow;
use thiserror::Error;

/// Why a candidate's arguments could not be materialized.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum BindingError {
    #[error("Required parameter '{0}' is unbound.")]
    Unbound(String),
    #[error("Parameter '{parameter}': '{value}' is not a valid {target}: {reason}")]
    Conversion {
        parameter: String,
        value: String,
        target: ValueType,
        reason: String,
    },
    #[error(
        "Parameter '{parameter}' received {count} value(s), outside the accepted range (min: {min:?}, max: {max:?})."
    )]
    Arity {
        parameter: String,
        count: usize,
        min: Option<u32>,
        max: Option<u32>,
    },
    #[error("Parameter '{parameter}': {error:#}")]
    Fault {
        parameter: String,
        error: anyhow::Error,
    },
    #[error("Materialization was cancelled.")]
    Cancelled,
}

impl BindingError {
    /// Whether the failure only rules out the current candidate.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BindingError::Unbound(_) | BindingError::Conversion { .. } | BindingError::Arity { .. }
        )
    }
}

/// Converts a candidate's raw tokens into the typed argument list of its command.
///
/// # Logic:
/// - A switch materializes as its default, inverted when its flag was given.
/// - A parameter with no tokens takes its default, or fails as unbound.
///   Collections without tokens or default start empty and are held to their bounds.
/// - A single value is converted through the parser registered for its type.
/// - A collection converts each token in order; the first failing element wins,
///   then the element count is checked against `min`/`max`.
pub async fn materialize(
    bound: &BoundCommand<'_>,
    parsers: &ParserRegistry,
    cancellation: &CancellationToken,
) -> Result<Arguments, BindingError> {
    commons::check_for_cancellation(cancellation).map_err(|_| BindingError::Cancelled)?;

    let mut arguments = Arguments::new();
    for parameter in &bound.parameters {
        let value = materialize_parameter(parameter, parsers, cancellation).await?;
        arguments.push(parameter.shape.name.clone(), value);
    }
    Ok(arguments)
}

async fn materialize_parameter(
    parameter: &BoundParameter<'_>,
    parsers: &ParserRegistry,
    cancellation: &CancellationToken,
) -> Result<Value, BindingError> {
    let shape = parameter.shape;
    let (value_type, arity) = match &shape.kind {
        ShapeKind::Switch { default, .. } => {
            let given = !parameter.raw_tokens.is_empty();
            return Ok(Value::Bool(*default != given));
        }
        ShapeKind::Positional {
            value_type, arity, ..
        }
        | ShapeKind::Named {
            value_type, arity, ..
        } => (value_type, *arity),
    };

    let texts: Vec<&str> = if parameter.raw_tokens.is_empty() {
        match &shape.default {
            Some(DefaultValue::Null) => return Ok(Value::Null),
            Some(DefaultValue::Flag(flag)) => return Ok(Value::Bool(*flag)),
            Some(DefaultValue::Text(text)) => vec![text.as_str()],
            Some(DefaultValue::List(items)) => items.iter().map(String::as_str).collect(),
            None if arity.is_collection() => Vec::new(),
            None => return Err(BindingError::Unbound(shape.name.clone())),
        }
    } else {
        parameter.raw_tokens.iter().map(String::as_str).collect()
    };

    match arity {
        Arity::Single => match texts.as_slice() {
            [text] => convert(shape, value_type, text, parsers, cancellation).await,
            _ => Err(BindingError::Arity {
                parameter: shape.name.clone(),
                count: texts.len(),
                min: Some(1),
                max: Some(1),
            }),
        },
        Arity::Collection { min, max } => {
            let mut items = Vec::with_capacity(texts.len());
            for text in &texts {
                items.push(convert(shape, value_type, text, parsers, cancellation).await?);
            }
            if !arity.accepts_count(items.len()) {
                return Err(BindingError::Arity {
                    parameter: shape.name.clone(),
                    count: items.len(),
                    min,
                    max,
                });
            }
            Ok(Value::List(items))
        }
    }
}

async fn convert(
    shape: &ParameterShape,
    value_type: &ValueType,
    text: &str,
    parsers: &ParserRegistry,
    cancellation: &CancellationToken,
) -> Result<Value, BindingError> {
    parsers
        .convert(text, value_type, cancellation)
        .await
        .map_err(|error| match error {
            ConversionError::Invalid {
                value,
                target,
                reason,
            } => BindingError::Conversion {
                parameter: shape.name.clone(),
                value,
                target,
                reason,
            },
            ConversionError::Cancelled => BindingError::Cancelled,
            ConversionError::Unsupported(target) => BindingError::Fault {
                parameter: shape.name.clone(),
                error: anyhow!("no parser is registered for type '{}'", target),
            },
            ConversionError::Fault(error) => BindingError::Fault {
                parameter: shape.name.clone(),
                error,
            },
        })
}
