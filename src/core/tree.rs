// src/core/tree.rs

//! # Command Tree
//!
//! Builds the immutable hierarchy of groups and commands from a list of module
//! descriptors. Building happens once; afterwards the tree is only read, so it
//! can be shared between any number of concurrent resolutions.
//!
//! Modules without a group name attach their commands and nested modules to the
//! enclosing level. Modules sharing a group name at one level are merged into a
//! single group node. Every declaration error is reported here, naming the
//! offending command and parameter, so nothing malformed reaches resolution.

use crate::{
    core::parsers,
    models::{
        Arity, CommandDescriptor, CommandNode, DefaultValue, GroupNode, ModuleDescriptor, Node,
        ParameterDescriptor, ParameterKind, ParameterShape, ShapeKind, ValueType,
    },
};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

lazy_static! {
    /// Keys, aliases and long option names: no whitespace, quotes or `=`, and
    /// no leading dash.
    static ref NAME_RE: Regex =
        Regex::new(r#"^[^\s"=\-][^\s"=]*$"#).expect("valid name pattern");
}

/// A malformed declaration, found while building a tree or assembling a service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BuildError {
    #[error("Invalid key '{key}' under '{path}'.")]
    InvalidKey { path: String, key: String },
    #[error("Command '{command}', parameter '{parameter}': {reason}")]
    InvalidParameter {
        command: String,
        parameter: String,
        reason: String,
    },
    #[error("Command '{command}' refers to unregistered handler '{handler}'.")]
    UnknownHandler { command: String, handler: String },
    #[error(
        "Command '{command}', parameter '{parameter}': no parser is registered for type '{value_type}'."
    )]
    UnknownType {
        command: String,
        parameter: String,
        value_type: String,
    },
}

/// The root of the command hierarchy.
#[derive(Debug, Clone, Default)]
pub struct CommandTree {
    children: Vec<Node>,
}

/// A child of some level, waiting to be built. Groups collect every module
/// that declared their name so they can be merged into one node.
enum Pending<'m> {
    Command(&'m CommandDescriptor),
    Group {
        key: &'m str,
        aliases: Vec<&'m str>,
        description: Option<&'m str>,
        members: Vec<&'m ModuleDescriptor>,
    },
}

impl CommandTree {
    /// Builds the tree from the declared modules, validating every command.
    pub fn build(modules: &[ModuleDescriptor]) -> Result<Self, BuildError> {
        let mut level = Vec::new();
        collect_level(&[], modules, &mut level);
        let children = build_level(level, &[])?;

        let tree = Self { children };
        log::debug!(
            "Command tree built: {} top-level nodes, {} commands.",
            tree.children.len(),
            tree.commands().len()
        );
        Ok(tree)
    }

    /// Top-level nodes in declaration order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Whether the tree declares nothing.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Every command node, depth-first in declaration order.
    pub fn commands(&self) -> Vec<&CommandNode> {
        fn walk<'t>(nodes: &'t [Node], out: &mut Vec<&'t CommandNode>) {
            for node in nodes {
                match node {
                    Node::Group(group) => walk(&group.children, out),
                    Node::Command(command) => out.push(command),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.children, &mut out);
        out
    }
}

fn collect_level<'m>(
    commands: &'m [CommandDescriptor],
    modules: &'m [ModuleDescriptor],
    level: &mut Vec<Pending<'m>>,
) {
    level.extend(commands.iter().map(Pending::Command));

    for module in modules {
        let Some(name) = module.group.as_deref() else {
            // Ungrouped: flatten into the current level.
            collect_level(&module.commands, &module.modules, level);
            continue;
        };

        let existing = level
            .iter_mut()
            .find(|pending| matches!(pending, Pending::Group { key, .. } if *key == name));

        if let Some(Pending::Group {
            aliases,
            description,
            members,
            ..
        }) = existing
        {
            for alias in &module.aliases {
                if !aliases.contains(&alias.as_str()) {
                    aliases.push(alias);
                }
            }
            if description.is_none() {
                *description = module.description.as_deref();
            }
            members.push(module);
        } else {
            level.push(Pending::Group {
                key: name,
                aliases: module.aliases.iter().map(String::as_str).collect(),
                description: module.description.as_deref(),
                members: vec![module],
            });
        }
    }
}

fn build_level(level: Vec<Pending<'_>>, path: &[String]) -> Result<Vec<Node>, BuildError> {
    level
        .into_iter()
        .map(|pending| match pending {
            Pending::Command(descriptor) => build_command(descriptor, path).map(Node::Command),
            Pending::Group {
                key,
                aliases,
                description,
                members,
            } => {
                validate_key(key, path)?;
                for alias in &aliases {
                    validate_key(alias, path)?;
                }

                let mut child_path = path.to_vec();
                child_path.push(key.to_string());

                let mut child_level = Vec::new();
                for member in members {
                    collect_level(&member.commands, &member.modules, &mut child_level);
                }

                Ok(Node::Group(GroupNode {
                    key: key.to_string(),
                    aliases: aliases.into_iter().map(str::to_string).collect(),
                    description: description.map(str::to_string),
                    children: build_level(child_level, &child_path)?,
                }))
            }
        })
        .collect()
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.join(" ")
    }
}

fn validate_key(key: &str, path: &[String]) -> Result<(), BuildError> {
    if NAME_RE.is_match(key) {
        Ok(())
    } else {
        Err(BuildError::InvalidKey {
            path: display_path(path),
            key: key.to_string(),
        })
    }
}

fn build_command(descriptor: &CommandDescriptor, path: &[String]) -> Result<CommandNode, BuildError> {
    validate_key(&descriptor.name, path)?;
    for alias in &descriptor.aliases {
        validate_key(alias, path)?;
    }

    let mut command_path = path.to_vec();
    command_path.push(descriptor.name.clone());
    let command_name = command_path.join(" ");

    let parameters = build_shapes(&descriptor.parameters, &command_name)?;

    Ok(CommandNode {
        key: descriptor.name.clone(),
        aliases: descriptor.aliases.clone(),
        description: descriptor.description.clone(),
        path: command_path,
        handler: descriptor.handler.clone(),
        parameters,
    })
}

/// Derives the parameter shapes of one command, in declaration order.
fn build_shapes(
    parameters: &[ParameterDescriptor],
    command: &str,
) -> Result<Vec<ParameterShape>, BuildError> {
    let mut shapes = Vec::with_capacity(parameters.len());
    let mut ordinal = 0;
    let mut unbounded_positional: Option<&str> = None;
    let mut seen_names: HashSet<&str> = HashSet::new();
    let mut seen_long: HashSet<String> = HashSet::new();
    let mut seen_short: HashSet<char> = HashSet::new();

    for param in parameters {
        let fail = |reason: String| BuildError::InvalidParameter {
            command: command.to_string(),
            parameter: param.name.clone(),
            reason,
        };

        if param.name.trim().is_empty() {
            return Err(fail("parameter name must not be empty".to_string()));
        }
        if !seen_names.insert(param.name.as_str()) {
            return Err(fail("parameter name is declared twice".to_string()));
        }
        if !param.collection && (param.min.is_some() || param.max.is_some()) {
            return Err(fail("`min`/`max` require a collection parameter".to_string()));
        }
        if let (Some(min), Some(max)) = (param.min, param.max)
            && min > max
        {
            return Err(fail(format!("`min` ({}) is greater than `max` ({})", min, max)));
        }

        let arity = if param.collection {
            Arity::Collection {
                min: param.min,
                max: param.max,
            }
        } else {
            Arity::Single
        };

        let (kind, default) = match param.kind {
            ParameterKind::Positional => {
                if param.long.is_some() || param.short.is_some() {
                    return Err(fail(
                        "positional parameters cannot declare option names".to_string(),
                    ));
                }
                if let Some(previous) = unbounded_positional {
                    return Err(fail(format!(
                        "unreachable: it follows the unbounded collection '{}'",
                        previous
                    )));
                }
                if param.collection && param.max.is_none() {
                    unbounded_positional = Some(param.name.as_str());
                }

                let value_type = param.value_type.clone().unwrap_or(ValueType::String);
                let default = value_default(param, &value_type, arity).map_err(fail)?;
                let kind = ShapeKind::Positional {
                    ordinal,
                    value_type,
                    arity,
                };
                ordinal += 1;
                (kind, default)
            }
            ParameterKind::Named => {
                let (long_name, short_name) = option_names(param).map_err(fail)?;
                let value_type = param.value_type.clone().unwrap_or(ValueType::String);
                let default = value_default(param, &value_type, arity).map_err(fail)?;
                let kind = ShapeKind::Named {
                    long_name,
                    short_name,
                    value_type,
                    arity,
                };
                (kind, default)
            }
            ParameterKind::Switch => {
                if param.collection {
                    return Err(fail("a switch cannot be a collection".to_string()));
                }
                if let Some(value_type) = &param.value_type
                    && *value_type != ValueType::Bool
                {
                    return Err(fail(format!(
                        "a switch is always a bool, not '{}'",
                        value_type
                    )));
                }
                let (long_name, short_name) = option_names(param).map_err(fail)?;
                let flag = switch_default(param).map_err(fail)?;
                let kind = ShapeKind::Switch {
                    long_name,
                    short_name,
                    default: flag,
                };
                (kind, Some(DefaultValue::Flag(flag)))
            }
        };

        let shape = ParameterShape {
            name: param.name.clone(),
            kind,
            default,
            description: param.description.clone(),
        };

        if let Some(long) = shape.long_name()
            && !seen_long.insert(long.to_string())
        {
            return Err(fail(format!("option '--{}' is declared twice", long)));
        }
        if let Some(short) = shape.short_name()
            && !seen_short.insert(short)
        {
            return Err(fail(format!("option '-{}' is declared twice", short)));
        }

        shapes.push(shape);
    }

    Ok(shapes)
}

/// Resolves the option names of a named parameter or switch. The parameter name
/// is the long name unless `long` overrides it; a short name is only an alias.
fn option_names(param: &ParameterDescriptor) -> Result<(Option<String>, Option<char>), String> {
    let long = param.long.clone().unwrap_or_else(|| param.name.clone());
    if !NAME_RE.is_match(&long) {
        return Err(format!("'{}' is not a valid long option name", long));
    }
    if let Some(short) = param.short
        && (short.is_whitespace() || matches!(short, '-' | '=' | '"'))
    {
        return Err(format!("'{}' is not a valid short option name", short));
    }

    Ok((Some(long), param.short))
}

fn switch_default(param: &ParameterDescriptor) -> Result<bool, String> {
    match &param.default {
        None => Ok(false),
        Some(DefaultValue::Flag(flag)) => Ok(*flag),
        Some(DefaultValue::Text(text)) if text.eq_ignore_ascii_case("true") => Ok(true),
        Some(DefaultValue::Text(text)) if text.eq_ignore_ascii_case("false") => Ok(false),
        Some(_) => Err("a switch default must be 'true' or 'false'".to_string()),
    }
}

/// Normalizes and validates the default of a positional or named parameter.
fn value_default(
    param: &ParameterDescriptor,
    value_type: &ValueType,
    arity: Arity,
) -> Result<Option<DefaultValue>, String> {
    let default = match &param.default {
        None if param.optional => return Ok(Some(DefaultValue::Null)),
        None => return Ok(None),
        Some(DefaultValue::Flag(flag)) if *value_type == ValueType::Bool => {
            DefaultValue::Text(flag.to_string())
        }
        Some(DefaultValue::Flag(_)) => {
            return Err(format!("a boolean default does not fit type '{}'", value_type));
        }
        Some(other) => other.clone(),
    };

    let texts: Vec<&str> = match &default {
        DefaultValue::Text(text) => vec![text.as_str()],
        DefaultValue::List(items) => {
            if !arity.is_collection() {
                return Err("a list default requires a collection parameter".to_string());
            }
            items.iter().map(String::as_str).collect()
        }
        DefaultValue::Null | DefaultValue::Flag(_) => Vec::new(),
    };
    // A text default on a collection binds as a one-element list.
    if arity.is_collection()
        && matches!(default, DefaultValue::Text(_) | DefaultValue::List(_))
        && !arity.accepts_count(texts.len())
    {
        return Err(format!(
            "the default has {} element(s), outside the declared bounds",
            texts.len()
        ));
    }

    // Named types are checked when their parser runs; built-ins are checked now.
    if value_type.is_builtin() {
        for text in texts {
            parsers::parse_builtin(text, value_type)
                .map_err(|e| format!("invalid default: {}", e))?;
        }
    }

    Ok(Some(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str) -> CommandDescriptor {
        CommandDescriptor::new(name, "noop")
    }

    fn group_keys(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(Node::key).collect()
    }

    #[test]
    fn test_build_group_with_command() {
        let modules = [ModuleDescriptor::group("a").command(command("b"))];
        let tree = CommandTree::build(&modules).unwrap();

        assert_eq!(group_keys(tree.children()), vec!["a"]);
        let Node::Group(group) = &tree.children()[0] else {
            panic!("Expected a group");
        };
        assert_eq!(group_keys(&group.children), vec!["b"]);

        let commands = tree.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].path, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(commands[0].qualified_name(), "a b");
    }

    #[test]
    fn test_modules_sharing_a_group_name_are_merged() {
        let modules = [
            ModuleDescriptor::group("remote")
                .alias("r")
                .describe("Remote management")
                .command(command("add")),
            ModuleDescriptor::ungrouped().command(command("status")),
            ModuleDescriptor::group("remote")
                .alias("rem")
                .command(command("remove")),
        ];
        let tree = CommandTree::build(&modules).unwrap();

        assert_eq!(group_keys(tree.children()), vec!["remote", "status"]);
        let Node::Group(remote) = &tree.children()[0] else {
            panic!("Expected a group");
        };
        assert_eq!(remote.aliases, vec!["r".to_string(), "rem".to_string()]);
        assert_eq!(remote.description.as_deref(), Some("Remote management"));
        assert_eq!(group_keys(&remote.children), vec!["add", "remove"]);
    }

    #[test]
    fn test_ungrouped_modules_flatten_into_parent() {
        let modules = [ModuleDescriptor::group("outer").module(
            ModuleDescriptor::ungrouped()
                .command(command("inner"))
                .module(ModuleDescriptor::group("deep").command(command("leaf"))),
        )];
        let tree = CommandTree::build(&modules).unwrap();

        let Node::Group(outer) = &tree.children()[0] else {
            panic!("Expected a group");
        };
        assert_eq!(group_keys(&outer.children), vec!["inner", "deep"]);
        let leaf = tree
            .commands()
            .into_iter()
            .find(|c| c.key == "leaf")
            .unwrap();
        assert_eq!(leaf.qualified_name(), "outer deep leaf");
    }

    #[test]
    fn test_nested_groups_merge_per_level() {
        let modules = [
            ModuleDescriptor::group("a").module(ModuleDescriptor::group("b").command(command("x"))),
            ModuleDescriptor::group("a").module(ModuleDescriptor::group("b").command(command("y"))),
        ];
        let tree = CommandTree::build(&modules).unwrap();
        let names: Vec<String> = tree.commands().iter().map(|c| c.qualified_name()).collect();
        assert_eq!(names, vec!["a b x", "a b y"]);
        assert_eq!(tree.children().len(), 1);
    }

    #[test]
    fn test_overloads_are_kept_side_by_side() {
        let modules = [ModuleDescriptor::ungrouped()
            .command(command("cmd"))
            .command(command("cmd").param(ParameterDescriptor::positional("text")))];
        let tree = CommandTree::build(&modules).unwrap();
        assert_eq!(group_keys(tree.children()), vec!["cmd", "cmd"]);
    }

    #[test]
    fn test_shapes_follow_declaration_order() {
        let modules = [ModuleDescriptor::ungrouped().command(
            command("copy")
                .param(ParameterDescriptor::positional("from"))
                .param(ParameterDescriptor::named("mode").short('m'))
                .param(ParameterDescriptor::positional("to").of_type(ValueType::U32))
                .param(ParameterDescriptor::switch("force").short('f')),
        )];
        let tree = CommandTree::build(&modules).unwrap();
        let shapes = &tree.commands()[0].parameters;

        assert_eq!(shapes.len(), 4);
        assert!(matches!(shapes[0].kind, ShapeKind::Positional { ordinal: 0, .. }));
        assert_eq!(shapes[1].long_name(), Some("mode"));
        assert_eq!(shapes[1].short_name(), Some('m'));
        assert!(matches!(
            &shapes[2].kind,
            ShapeKind::Positional { ordinal: 1, value_type: ValueType::U32, .. }
        ));
        assert!(matches!(shapes[3].kind, ShapeKind::Switch { default: false, .. }));
        assert!(!shapes[3].is_required());
    }

    #[test]
    fn test_short_name_keeps_implicit_long_name() {
        let params = [
            ParameterDescriptor::named("level").short('l'),
            ParameterDescriptor::switch("dry_run").long("dry-run").short('n'),
        ];
        let shapes = build_shapes(&params, "cmd").unwrap();
        assert_eq!(shapes[0].long_name(), Some("level"));
        assert_eq!(shapes[0].short_name(), Some('l'));
        assert_eq!(shapes[1].long_name(), Some("dry-run"));
        assert_eq!(shapes[1].short_name(), Some('n'));
    }

    #[test]
    fn test_optional_parameter_defaults_to_null() {
        let params = [ParameterDescriptor::positional("maybe").optional()];
        let shapes = build_shapes(&params, "cmd").unwrap();
        assert_eq!(shapes[0].default, Some(DefaultValue::Null));
        assert!(!shapes[0].is_required());
    }

    #[test]
    fn test_rejects_invalid_keys() {
        for key in ["", "has space", "-dash", "a=b"] {
            let modules = [ModuleDescriptor::ungrouped().command(command(key))];
            let result = CommandTree::build(&modules);
            assert!(
                matches!(result, Err(BuildError::InvalidKey { .. })),
                "Key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_rejects_switch_with_value_type() {
        let modules = [ModuleDescriptor::group("g").command(
            command("cmd").param(ParameterDescriptor::switch("verbose").of_type(ValueType::I32)),
        )];
        let err = CommandTree::build(&modules).unwrap_err();
        match err {
            BuildError::InvalidParameter {
                command, parameter, ..
            } => {
                assert_eq!(command, "g cmd");
                assert_eq!(parameter, "verbose");
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_structural_parameter_errors() {
        let cases = vec![
            vec![
                ParameterDescriptor::positional("a"),
                ParameterDescriptor::positional("a"),
            ],
            vec![ParameterDescriptor::positional("a").long("alpha")],
            vec![ParameterDescriptor {
                min: Some(1),
                ..ParameterDescriptor::positional("a")
            }],
            vec![ParameterDescriptor::positional("a").collection(Some(3), Some(1))],
            vec![
                ParameterDescriptor::positional("rest").collection(None, None),
                ParameterDescriptor::positional("after"),
            ],
            vec![
                ParameterDescriptor::named("one").short('x'),
                ParameterDescriptor::switch("two").short('x'),
            ],
            vec![ParameterDescriptor::switch("s").collection(None, None)],
            vec![ParameterDescriptor::named("bad").long("--bad")],
        ];

        for params in cases {
            let result = build_shapes(&params, "cmd");
            assert!(
                matches!(result, Err(BuildError::InvalidParameter { .. })),
                "Expected rejection for {:?}",
                params
            );
        }
    }

    #[test]
    fn test_bounded_positional_collection_may_be_followed() {
        let params = [
            ParameterDescriptor::positional("pair").collection(Some(2), Some(2)),
            ParameterDescriptor::positional("last"),
        ];
        assert!(build_shapes(&params, "cmd").is_ok());
    }

    #[test]
    fn test_rejects_defaults_that_do_not_fit() {
        let cases = vec![
            ParameterDescriptor::positional("n")
                .of_type(ValueType::U8)
                .default_text("300"),
            ParameterDescriptor::positional("n").default_list(["a", "b"]),
            ParameterDescriptor::named("n")
                .of_type(ValueType::I32)
                .default_flag(true),
            ParameterDescriptor::switch("s").default_text("maybe"),
            ParameterDescriptor::named("xs")
                .collection(Some(1), Some(1))
                .default_list(["a", "b"]),
        ];
        for param in cases {
            let result = build_shapes(std::slice::from_ref(&param), "cmd");
            assert!(
                matches!(result, Err(BuildError::InvalidParameter { .. })),
                "Expected rejection for {:?}",
                param
            );
        }
    }

    #[test]
    fn test_collection_text_default_must_satisfy_bounds() {
        let too_few = [ParameterDescriptor::positional("items")
            .collection(Some(2), None)
            .default_text("a")];
        assert!(matches!(
            build_shapes(&too_few, "xs"),
            Err(BuildError::InvalidParameter { .. })
        ));

        let empty_list = [ParameterDescriptor::positional("items")
            .collection(Some(1), None)
            .default_list(Vec::<String>::new())];
        assert!(build_shapes(&empty_list, "xs").is_err());

        let fits = [ParameterDescriptor::positional("items")
            .collection(None, Some(3))
            .default_text("a")];
        assert!(build_shapes(&fits, "xs").is_ok());
    }

    #[test]
    fn test_named_type_defaults_are_deferred() {
        let params = [ParameterDescriptor::named("color")
            .of_type(ValueType::named("Color"))
            .default_text("Red")];
        assert!(build_shapes(&params, "cmd").is_ok());
    }

    #[test]
    fn test_build_error_message_names_command_and_parameter() {
        let params = [ParameterDescriptor::positional("n")
            .of_type(ValueType::U8)
            .default_text("x")];
        let message = build_shapes(&params, "math add").unwrap_err().to_string();
        assert!(message.contains("math add"), "Message was: {}", message);
        assert!(message.contains("'n'"), "Message was: {}", message);
    }
}
