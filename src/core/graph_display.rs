// src/core/graph_display.rs

use crate::{
    core::tree::CommandTree,
    models::{CommandNode, Node, ParameterShape, ShapeKind},
};
use std::fmt::Write;

/// What [`render_tree`] draws.
#[derive(Debug, Clone, Copy)]
pub struct DisplayOptions {
    /// Append `(alias, ...)` after keys.
    pub show_aliases: bool,
    /// Append descriptions after keys.
    pub show_descriptions: bool,
    /// Levels below the root to draw; `None` draws everything.
    pub max_depth: Option<usize>,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_aliases: true,
            show_descriptions: true,
            max_depth: None,
        }
    }
}

/// Renders an ASCII tree of every group and command.
pub fn render_tree(tree: &CommandTree, options: &DisplayOptions) -> String {
    let mut out = String::new();
    if tree.is_empty() {
        out.push_str("No commands registered.\n");
        return out;
    }
    render_level(tree.children(), options, "", 1, &mut out);
    out
}

fn render_level(
    children: &[Node],
    options: &DisplayOptions,
    prefix: &str,
    depth: usize,
    out: &mut String,
) {
    for (i, node) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;
        let connector = if is_last { "└─" } else { "├─" };

        let (label, aliases, description) = match node {
            Node::Group(group) => (
                format!("{}/", group.key),
                &group.aliases,
                group.description.as_deref(),
            ),
            Node::Command(command) => (
                usage(command),
                &command.aliases,
                command.description.as_deref(),
            ),
        };

        let _ = write!(out, "{}{}{}", prefix, connector, label);
        if options.show_aliases && !aliases.is_empty() {
            let _ = write!(out, " (aliases: {})", aliases.join(", "));
        }
        if options.show_descriptions
            && let Some(description) = description
        {
            let _ = write!(out, "  # {}", description);
        }
        out.push('\n');

        if let Node::Group(group) = node
            && options.max_depth.is_none_or(|max| depth < max)
        {
            let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });
            render_level(&group.children, options, &child_prefix, depth + 1, out);
        }
    }
}

/// One-line usage of a command: its key followed by each parameter in
/// declaration order.
pub fn usage(command: &CommandNode) -> String {
    let mut line = command.key.clone();
    for shape in &command.parameters {
        line.push(' ');
        line.push_str(&parameter_usage(shape));
    }
    line
}

fn parameter_usage(shape: &ParameterShape) -> String {
    let arity = shape.arity();
    let ellipsis = if arity.is_collection() { "..." } else { "" };
    let optional = !shape.is_required() || (arity.is_collection() && arity.accepts_count(0));

    match &shape.kind {
        ShapeKind::Positional { .. } => {
            if optional {
                format!("[{}{}]", shape.name, ellipsis)
            } else {
                format!("<{}{}>", shape.name, ellipsis)
            }
        }
        ShapeKind::Named { .. } => {
            let body = format!("{} <value{}>", option_names(shape), ellipsis);
            if optional { format!("[{}]", body) } else { body }
        }
        ShapeKind::Switch { .. } => format!("[{}]", option_names(shape)),
    }
}

fn option_names(shape: &ParameterShape) -> String {
    let mut names = Vec::new();
    if let Some(long) = shape.long_name() {
        names.push(format!("--{}", long));
    }
    if let Some(short) = shape.short_name() {
        names.push(format!("-{}", short));
    }
    names.join("|")
}
