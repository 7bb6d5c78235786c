// src/core/matcher.rs

//! # Tree Matcher
//!
//! Depth-first search over the command tree. The cursor into the token list is
//! a plain index passed by value down the recursion, so every sibling branch
//! starts from the position its parent level started from.
//!
//! A command whose key matches is bound against the remaining tokens. A failed
//! bind silently drops that candidate; it is never an error of the search.

use crate::{
    core::{tokenizer, tree::CommandTree},
    models::{
        BoundCommand, BoundParameter, CommandNode, Node, ParameterShape, ShapeKind, Token,
        TokenKind,
    },
};
use std::collections::HashMap;
use thiserror::Error;

/// Parameter values keyed by parameter name, for path-based invocation.
pub type NamedValues = HashMap<String, Vec<String>>;

/// Why a command candidate could not take the remaining input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
enum BindFailure {
    #[error("unknown option '{0}'")]
    UnknownOption(String),
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("option '{0}' expects a value")]
    MissingValue(String),
    #[error("option '{0}' given more often than it accepts")]
    Repeated(String),
    #[error("switch '{0}' does not take a value")]
    ValueOnSwitch(String),
    #[error("unexpected value '{0}'")]
    UnexpectedValue(String),
    #[error("parameter '{0}' takes a single value")]
    TooManyValues(String),
}

/// Finds every command the raw input could address, in registration order.
pub fn search<'t>(tree: &'t CommandTree, input: &str) -> Vec<BoundCommand<'t>> {
    let tokens = tokenizer::tokenize(input);
    let mut candidates = Vec::new();
    search_level(tree.children(), &tokens, 0, &mut candidates);

    log::debug!(
        "Search for '{}' produced {} candidate(s).",
        input,
        candidates.len()
    );
    candidates
}

fn search_level<'t>(
    children: &'t [Node],
    tokens: &[Token<'_>],
    cursor: usize,
    out: &mut Vec<BoundCommand<'t>>,
) {
    let Some(token) = tokens.get(cursor) else {
        return;
    };
    if !token.is_value() {
        return;
    }

    for child in children {
        match child {
            Node::Group(group) if group.matches(token.text) => {
                search_level(&group.children, tokens, cursor + 1, out);
            }
            Node::Command(command) if command.matches(token.text) => {
                let rest = tokens.get(cursor + 1..).unwrap_or_default();
                match bind_tokens(command, rest) {
                    Ok(bound) => out.push(bound),
                    Err(failure) => log::trace!(
                        "Dropping candidate '{}': {}",
                        command.qualified_name(),
                        failure
                    ),
                }
            }
            _ => {}
        }
    }
}

fn option_display(token: &Token<'_>) -> String {
    match token.kind {
        TokenKind::LongName => format!("--{}", token.text),
        TokenKind::ShortName => format!("-{}", token.text),
        TokenKind::Value => token.text.to_string(),
    }
}

fn into_bound<'t>(
    command: &'t CommandNode,
    slots: impl IntoIterator<Item = (&'t ParameterShape, Vec<String>)>,
) -> BoundCommand<'t> {
    let parameters = slots
        .into_iter()
        .map(|(shape, raw_tokens)| BoundParameter { shape, raw_tokens })
        .collect();
    BoundCommand {
        command,
        parameters,
    }
}

/// Assigns the tokens following a command key to the command's parameters.
///
/// Values fill positionals in declaration order; a positional is left behind
/// once its arity has no room. Options bind to the shape they name.
fn bind_tokens<'t>(
    command: &'t CommandNode,
    tokens: &[Token<'_>],
) -> Result<BoundCommand<'t>, BindFailure> {
    let mut slots: Vec<(&'t ParameterShape, Vec<String>)> = command
        .parameters
        .iter()
        .map(|shape| (shape, Vec::new()))
        .collect();
    let mut tokens = tokens.iter().peekable();

    while let Some(token) = tokens.next() {
        if token.is_value() {
            let Some((_, slot)) = slots
                .iter_mut()
                .find(|(shape, slot)| shape.is_positional() && shape.arity().has_room(slot.len()))
            else {
                return Err(BindFailure::UnexpectedValue(token.text.to_string()));
            };
            slot.push(token.text.to_string());
            continue;
        }

        let Some((shape, slot)) = slots
            .iter_mut()
            .find(|(shape, _)| shape.matches_option(token))
        else {
            return Err(BindFailure::UnknownOption(option_display(token)));
        };

        match &shape.kind {
            ShapeKind::Switch { .. } => {
                if token.inline_value.is_some() {
                    return Err(BindFailure::ValueOnSwitch(option_display(token)));
                }
                if !slot.is_empty() {
                    return Err(BindFailure::Repeated(option_display(token)));
                }
                slot.push(option_display(token));
            }
            ShapeKind::Named { arity, .. } => {
                let mut taken = 0;
                if let Some(inline) = token.inline_value {
                    if !arity.has_room(slot.len()) {
                        return Err(BindFailure::Repeated(option_display(token)));
                    }
                    slot.push(inline.to_string());
                    taken += 1;
                }

                if arity.is_collection() {
                    while arity.has_room(slot.len())
                        && let Some(next) = tokens.next_if(|next| next.is_value())
                    {
                        slot.push(next.text.to_string());
                        taken += 1;
                    }
                } else if taken == 0 {
                    if !slot.is_empty() {
                        return Err(BindFailure::Repeated(option_display(token)));
                    }
                    if let Some(next) = tokens.next_if(|next| next.is_value()) {
                        slot.push(next.text.to_string());
                        taken += 1;
                    }
                }

                if taken == 0 {
                    return Err(BindFailure::MissingValue(option_display(token)));
                }
            }
            ShapeKind::Positional { .. } => {
                return Err(BindFailure::UnknownOption(option_display(token)));
            }
        }
    }

    Ok(into_bound(command, slots))
}

/// Finds every command addressed by an explicit path, binding parameters from
/// a map keyed by parameter name. Used by front-ends that submit structured
/// forms rather than a command line.
pub fn search_path<'t, S: AsRef<str>>(
    tree: &'t CommandTree,
    path: &[S],
    named: &NamedValues,
) -> Vec<BoundCommand<'t>> {
    let mut candidates = Vec::new();
    path_level(tree.children(), path, named, &mut candidates);

    log::debug!(
        "Path search for '{}' produced {} candidate(s).",
        path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" "),
        candidates.len()
    );
    candidates
}

fn path_level<'t, S: AsRef<str>>(
    children: &'t [Node],
    path: &[S],
    named: &NamedValues,
    out: &mut Vec<BoundCommand<'t>>,
) {
    let Some((segment, rest)) = path.split_first() else {
        return;
    };
    let segment = segment.as_ref();

    for child in children {
        match child {
            Node::Group(group) if !rest.is_empty() && group.matches(segment) => {
                path_level(&group.children, rest, named, out);
            }
            Node::Command(command) if rest.is_empty() && command.matches(segment) => {
                match bind_named(command, named) {
                    Ok(bound) => out.push(bound),
                    Err(failure) => log::trace!(
                        "Dropping candidate '{}': {}",
                        command.qualified_name(),
                        failure
                    ),
                }
            }
            _ => {}
        }
    }
}

fn bind_named<'t>(
    command: &'t CommandNode,
    named: &NamedValues,
) -> Result<BoundCommand<'t>, BindFailure> {
    if let Some(unknown) = named
        .keys()
        .find(|key| !command.parameters.iter().any(|shape| &shape.name == *key))
    {
        return Err(BindFailure::UnknownParameter(unknown.clone()));
    }

    let slots = command
        .parameters
        .iter()
        .map(|shape| named_slot(shape, named.get(&shape.name)).map(|slot| (shape, slot)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(into_bound(command, slots))
}

fn named_slot(
    shape: &ParameterShape,
    values: Option<&Vec<String>>,
) -> Result<Vec<String>, BindFailure> {
    let values = values.cloned().unwrap_or_default();

    match &shape.kind {
        ShapeKind::Switch { default, .. } => match values.as_slice() {
            [] => Ok(Vec::new()),
            [value] => {
                let flag = if value.eq_ignore_ascii_case("true") {
                    true
                } else if value.eq_ignore_ascii_case("false") {
                    false
                } else {
                    return Err(BindFailure::ValueOnSwitch(shape.name.clone()));
                };
                // Only a value differing from the default counts as the flag being given.
                if flag != *default {
                    Ok(values)
                } else {
                    Ok(Vec::new())
                }
            }
            _ => Err(BindFailure::TooManyValues(shape.name.clone())),
        },
        _ if !shape.arity().is_collection() && values.len() > 1 => {
            Err(BindFailure::TooManyValues(shape.name.clone()))
        }
        _ => Ok(values),
    }
}
