// src/models.rs

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// --- LEXICAL MODELS ---

/// The lexical class of a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A plain word or quoted run.
    Value,
    /// `-n` or `-n=value`.
    ShortName,
    /// `--name` or `--name=value`.
    LongName,
}

/// One lexical unit borrowed from the raw input.
///
/// For `LongName` and `ShortName` tokens, `text` holds the name without its
/// dashes and `inline_value` holds whatever followed an `=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Lexical class.
    pub kind: TokenKind,
    /// The word itself, or the option name without dashes.
    pub text: &'a str,
    /// Text after `=` on an option token.
    pub inline_value: Option<&'a str>,
}

impl<'a> Token<'a> {
    /// A `Value` token holding `text`.
    pub fn value(text: &'a str) -> Self {
        Self {
            kind: TokenKind::Value,
            text,
            inline_value: None,
        }
    }

    /// Whether this token is a plain value rather than an option name.
    pub fn is_value(&self) -> bool {
        self.kind == TokenKind::Value
    }
}

// --- VALUE TYPES ---

/// The declared target type of a parameter.
///
/// Scalar types have built-in conversions. `Named` covers enumerations and any
/// caller-registered type; its conversion must be registered before the tree
/// is handed to a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[allow(missing_docs)]
pub enum ValueType {
    String,
    Char,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// An enumeration or caller-registered type, looked up by name.
    Named(String),
}

impl ValueType {
    /// Shorthand for [`ValueType::Named`].
    pub fn named(name: impl Into<String>) -> Self {
        ValueType::Named(name.into())
    }

    /// Whether the type converts without a registered parser.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, ValueType::Named(_))
    }

    /// The name used in manifests and usage text.
    pub fn as_str(&self) -> &str {
        match self {
            ValueType::String => "string",
            ValueType::Char => "char",
            ValueType::Bool => "bool",
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::U8 => "u8",
            ValueType::U16 => "u16",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Named(name) => name,
        }
    }
}

impl From<&str> for ValueType {
    fn from(name: &str) -> Self {
        match name {
            "string" | "str" => ValueType::String,
            "char" => ValueType::Char,
            "bool" => ValueType::Bool,
            "i8" => ValueType::I8,
            "i16" => ValueType::I16,
            "i32" => ValueType::I32,
            "i64" => ValueType::I64,
            "u8" => ValueType::U8,
            "u16" => ValueType::U16,
            "u32" => ValueType::U32,
            "u64" => ValueType::U64,
            "f32" => ValueType::F32,
            "f64" => ValueType::F64,
            other => ValueType::Named(other.to_string()),
        }
    }
}

impl From<String> for ValueType {
    fn from(name: String) -> Self {
        ValueType::from(name.as_str())
    }
}

impl From<ValueType> for String {
    fn from(value_type: ValueType) -> Self {
        value_type.as_str().to_string()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A materialized argument value.
#[derive(Clone)]
#[allow(missing_docs)]
pub enum Value {
    /// An absent optional argument.
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    /// A variant of a registered enumeration, in its declared spelling.
    Enum { type_name: String, variant: String },
    List(Vec<Value>),
    /// Output of a caller-registered parser; see [`Value::downcast_ref`].
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wraps a caller-defined value.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Value::Custom(Arc::new(value))
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A short label for the variant, used in error messages.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::Int(_) => "signed integer",
            Value::UInt(_) => "unsigned integer",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
            Value::Enum { .. } => "enum",
            Value::List(_) => "list",
            Value::Custom(_) => "custom value",
        }
    }

    /// Borrows a [`Value::Custom`] payload as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Custom(inner) => inner.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Renders the value as JSON for structured output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Char(c) => serde_json::Value::String(c.to_string()),
            Value::Int(i) => serde_json::json!(i),
            Value::UInt(u) => serde_json::json!(u),
            Value::Float(f) => serde_json::json!(f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Enum { variant, .. } => serde_json::Value::String(variant.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Custom(_) => serde_json::Value::String("<custom>".to_string()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Char(c) => f.debug_tuple("Char").field(c).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::UInt(u) => f.debug_tuple("UInt").field(u).finish(),
            Value::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::Enum { type_name, variant } => f
                .debug_struct("Enum")
                .field("type_name", type_name)
                .field("variant", variant)
                .finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (
                Value::Enum { type_name: ta, variant: va },
                Value::Enum { type_name: tb, variant: vb },
            ) => ta == tb && va == vb,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Custom(a), Value::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Extraction of a Rust value out of a materialized [`Value`].
pub trait FromValue: Sized {
    /// Returns `None` when the value holds a different kind.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s.clone()),
            Value::Enum { variant, .. } => Some(variant.clone()),
            Value::Char(c) => Some(c.to_string()),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for char {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }
}

macro_rules! integer_from_value {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::Int(i) => <$t>::try_from(*i).ok(),
                        Value::UInt(u) => <$t>::try_from(*u).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

integer_from_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => narrow_float(*x),
            _ => None,
        }
    }
}

/// Rounds to the nearest `f32`; finite values outside its range are rejected.
#[allow(clippy::cast_possible_truncation)]
fn narrow_float(x: f64) -> Option<f32> {
    if x.is_finite() && x.abs() > f64::from(f32::MAX) {
        None
    } else {
        Some(x as f32)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

// --- PARAMETER SHAPES ---

/// How many tokens a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one token.
    Single,
    /// Any count within the optional bounds.
    Collection {
        /// Fewest tokens accepted.
        min: Option<u32>,
        /// Most tokens accepted.
        max: Option<u32>,
    },
}

impl Arity {
    /// Whether this is [`Arity::Collection`].
    pub fn is_collection(&self) -> bool {
        matches!(self, Arity::Collection { .. })
    }

    /// Whether another token may still be bound when `bound` are already held.
    pub fn has_room(&self, bound: usize) -> bool {
        match self {
            Arity::Single => bound == 0,
            Arity::Collection { max: Some(max), .. } => bound < bound_of(*max),
            Arity::Collection { max: None, .. } => true,
        }
    }

    /// Whether exactly `count` tokens satisfy this arity.
    pub fn accepts_count(&self, count: usize) -> bool {
        match self {
            Arity::Single => count == 1,
            Arity::Collection { min, max } => {
                min.is_none_or(|min| count >= bound_of(min))
                    && max.is_none_or(|max| count <= bound_of(max))
            }
        }
    }
}

fn bound_of(limit: u32) -> usize {
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// A declared default, stored as text and converted like any bound token.
///
/// Manifests may write numbers (`default = 3`, `default = [1, 2]`); they are
/// kept as their text and parsed against the parameter type at build time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawDefault")]
pub enum DefaultValue {
    /// Set implicitly on optional parameters; binds [`Value::Null`].
    Null,
    /// A switch default.
    Flag(bool),
    /// One token's worth of text.
    Text(String),
    /// Several tokens, for collection parameters.
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDefault {
    Flag(bool),
    Scalar(RawScalar),
    List(Vec<RawScalar>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<RawScalar> for String {
    fn from(scalar: RawScalar) -> Self {
        match scalar {
            RawScalar::Bool(b) => b.to_string(),
            RawScalar::Int(i) => i.to_string(),
            RawScalar::Float(x) => x.to_string(),
            RawScalar::Text(text) => text,
        }
    }
}

impl From<RawDefault> for DefaultValue {
    fn from(raw: RawDefault) -> Self {
        match raw {
            RawDefault::Flag(flag) => DefaultValue::Flag(flag),
            RawDefault::Scalar(scalar) => DefaultValue::Text(scalar.into()),
            RawDefault::List(items) => {
                DefaultValue::List(items.into_iter().map(String::from).collect())
            }
        }
    }
}

/// How a parameter is addressed in the input.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum ShapeKind {
    /// Bound by order among the positional parameters.
    Positional {
        ordinal: usize,
        value_type: ValueType,
        arity: Arity,
    },
    /// Bound by `--long`/`-s`, followed by its value.
    Named {
        long_name: Option<String>,
        short_name: Option<char>,
        value_type: ValueType,
        arity: Arity,
    },
    /// A boolean flag that takes no value.
    Switch {
        long_name: Option<String>,
        short_name: Option<char>,
        default: bool,
    },
}

/// The binding contract of one command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterShape {
    /// Name handlers read the argument by.
    pub name: String,
    /// Addressing mode, type and arity.
    pub kind: ShapeKind,
    /// Used when no token binds; `None` makes the parameter required.
    pub default: Option<DefaultValue>,
    /// Help text.
    pub description: Option<String>,
}

impl ParameterShape {
    /// Whether a token must bind for the command to match.
    pub fn is_required(&self) -> bool {
        !matches!(self.kind, ShapeKind::Switch { .. }) && self.default.is_none()
    }

    /// Whether this is a positional parameter.
    pub fn is_positional(&self) -> bool {
        matches!(self.kind, ShapeKind::Positional { .. })
    }

    /// Whether this is a switch.
    pub fn is_switch(&self) -> bool {
        matches!(self.kind, ShapeKind::Switch { .. })
    }

    /// The target type; switches are always `bool` and report `None`.
    pub fn value_type(&self) -> Option<&ValueType> {
        match &self.kind {
            ShapeKind::Positional { value_type, .. } | ShapeKind::Named { value_type, .. } => {
                Some(value_type)
            }
            ShapeKind::Switch { .. } => None,
        }
    }

    /// How many tokens this parameter accepts.
    pub fn arity(&self) -> Arity {
        match &self.kind {
            ShapeKind::Positional { arity, .. } | ShapeKind::Named { arity, .. } => *arity,
            ShapeKind::Switch { .. } => Arity::Single,
        }
    }

    /// The `--long` name of a named parameter or switch.
    pub fn long_name(&self) -> Option<&str> {
        match &self.kind {
            ShapeKind::Named { long_name, .. } | ShapeKind::Switch { long_name, .. } => {
                long_name.as_deref()
            }
            ShapeKind::Positional { .. } => None,
        }
    }

    /// The `-s` name of a named parameter or switch.
    pub fn short_name(&self) -> Option<char> {
        match &self.kind {
            ShapeKind::Named { short_name, .. } | ShapeKind::Switch { short_name, .. } => {
                *short_name
            }
            ShapeKind::Positional { .. } => None,
        }
    }

    /// Checks a `LongName`/`ShortName` token against this shape's option names.
    pub fn matches_option(&self, token: &Token<'_>) -> bool {
        match token.kind {
            TokenKind::LongName => self.long_name() == Some(token.text),
            TokenKind::ShortName => {
                let mut chars = token.text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => self.short_name() == Some(c),
                    _ => false,
                }
            }
            TokenKind::Value => false,
        }
    }
}

// --- MODULE DESCRIPTORS (build-time input) ---

/// The declared addressing mode of a parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ParameterKind {
    #[default]
    Positional,
    Named,
    Switch,
}

/// Declaration of one command parameter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(default)]
    pub kind: ParameterKind,
    #[serde(rename = "type")]
    pub value_type: Option<ValueType>,
    /// Overrides the long option name, which is otherwise `name`.
    pub long: Option<String>,
    pub short: Option<char>,
    #[serde(default)]
    pub collection: bool,
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub default: Option<DefaultValue>,
    /// Shorthand for a `Null` default.
    #[serde(default)]
    pub optional: bool,
    pub description: Option<String>,
}

impl ParameterDescriptor {
    fn with_kind(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    /// A positional parameter of type `string`.
    pub fn positional(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::Positional)
    }

    /// A named parameter of type `string`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::Named)
    }

    /// A boolean switch.
    pub fn switch(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::Switch)
    }

    /// Sets the target type.
    pub fn of_type(mut self, value_type: impl Into<ValueType>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }

    /// Sets the long option name.
    pub fn long(mut self, long: impl Into<String>) -> Self {
        self.long = Some(long.into());
        self
    }

    /// Sets the short option name.
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Accepts several tokens, bounded by `min` and `max`.
    pub fn collection(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.collection = true;
        self.min = min;
        self.max = max;
        self
    }

    /// Defaults to one token of text.
    pub fn default_text(mut self, text: impl Into<String>) -> Self {
        self.default = Some(DefaultValue::Text(text.into()));
        self
    }

    /// Defaults to several tokens.
    pub fn default_list<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default = Some(DefaultValue::List(items.into_iter().map(Into::into).collect()));
        self
    }

    /// Sets a switch default.
    pub fn default_flag(mut self, flag: bool) -> Self {
        self.default = Some(DefaultValue::Flag(flag));
        self
    }

    /// Makes the parameter optional with a `Null` default.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the help text.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Declaration of one command: a name, a handler id and its parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct CommandDescriptor {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub description: Option<String>,
    /// Id of the handler in the service's handler registry.
    pub handler: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
}

impl CommandDescriptor {
    /// A command named `name` that runs handler `handler`.
    pub fn new(name: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: handler.into(),
            ..Default::default()
        }
    }

    /// Adds an alternative name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Sets the help text.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a parameter.
    pub fn param(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// Declaration of a module: an optional group name plus commands and nested modules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(missing_docs)]
pub struct ModuleDescriptor {
    pub group: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub commands: Vec<CommandDescriptor>,
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

impl ModuleDescriptor {
    /// A module without a group name; its contents attach to the enclosing level.
    pub fn ungrouped() -> Self {
        Self::default()
    }

    /// A module whose contents sit under the group `name`.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            group: Some(name.into()),
            ..Default::default()
        }
    }

    /// Adds an alternative name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Sets the help text.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a command.
    pub fn command(mut self, command: CommandDescriptor) -> Self {
        self.commands.push(command);
        self
    }

    /// Nests a module.
    pub fn module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.push(module);
        self
    }
}

// --- COMMAND TREE NODES ---

/// A child of a tree level.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub enum Node {
    Group(GroupNode),
    Command(CommandNode),
}

impl Node {
    /// The literal key the node is reached by.
    pub fn key(&self) -> &str {
        match self {
            Node::Group(group) => &group.key,
            Node::Command(command) => &command.key,
        }
    }
}

/// A literal path segment owning an ordered list of children.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct GroupNode {
    pub key: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    pub children: Vec<Node>,
}

impl GroupNode {
    /// Whether `text` is the key or one of the aliases.
    pub fn matches(&self, text: &str) -> bool {
        self.key == text || self.aliases.iter().any(|alias| alias == text)
    }
}

/// A leaf: one invocable command overload.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct CommandNode {
    pub key: String,
    pub aliases: Vec<String>,
    pub description: Option<String>,
    /// Group keys leading to this command, followed by its own key.
    pub path: Vec<String>,
    pub handler: String,
    pub parameters: Vec<ParameterShape>,
}

impl CommandNode {
    /// Whether `text` is the key or one of the aliases.
    pub fn matches(&self, text: &str) -> bool {
        self.key == text || self.aliases.iter().any(|alias| alias == text)
    }

    /// The space-separated path, e.g. `math sum`.
    pub fn qualified_name(&self) -> String {
        self.path.join(" ")
    }
}

// --- BINDING MODELS ---

/// Raw tokens assigned to one parameter by the matcher.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct BoundParameter<'t> {
    pub shape: &'t ParameterShape,
    pub raw_tokens: Vec<String>,
}

/// One candidate interpretation of the input.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct BoundCommand<'t> {
    pub command: &'t CommandNode,
    pub parameters: Vec<BoundParameter<'t>>,
}

/// Raised by handlers reading their [`Arguments`].
#[derive(Debug, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ArgumentError {
    #[error("No argument named '{0}'.")]
    Missing(String),
    #[error("No argument at position {0}.")]
    OutOfRange(usize),
    #[error("Argument '{name}' holds a {found}, which cannot be read as the requested type.")]
    TypeMismatch { name: String, found: &'static str },
}

/// The typed argument list handed to a handler, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    entries: Vec<(String, Value)>,
}

impl Arguments {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The raw value of the argument called `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, value)| value)
    }

    /// Reads the argument called `name` as `T`.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, ArgumentError> {
        let value = self
            .value(name)
            .ok_or_else(|| ArgumentError::Missing(name.to_string()))?;
        T::from_value(value).ok_or_else(|| ArgumentError::TypeMismatch {
            name: name.to_string(),
            found: value.kind_label(),
        })
    }

    /// Reads the argument at declaration `index` as `T`.
    pub fn at<T: FromValue>(&self, index: usize) -> Result<T, ArgumentError> {
        let (name, value) = self
            .entries
            .get(index)
            .ok_or(ArgumentError::OutOfRange(index))?;
        T::from_value(value).ok_or_else(|| ArgumentError::TypeMismatch {
            name: name.clone(),
            found: value.kind_label(),
        })
    }

    /// Iterates over `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Renders the arguments as a JSON object keyed by name.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

// --- EXECUTION OUTCOMES ---

/// What a handler hands back on success.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandOutput {
    /// Human-readable result.
    pub message: Option<String>,
    /// Structured result.
    pub data: Option<serde_json::Value>,
}

impl CommandOutput {
    /// An empty success.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A success carrying a message.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            data: None,
        }
    }

    /// Attaches structured data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An uncontrolled error observed while resolving or invoking a command.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Fault {
    #[error("Handler raised an error: {0:#}")]
    Handler(anyhow::Error),
    #[error("Handler panicked: {0}")]
    Panicked(String),
    #[error("Converting parameter '{parameter}' raised an error: {error:#}")]
    Conversion {
        parameter: String,
        error: anyhow::Error,
    },
    #[error("Operation was cancelled.")]
    Cancelled,
}

/// The terminal classification of one resolution request.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The handler completed.
    Successful(CommandOutput),
    /// The handler reported a domain failure with this reason.
    Failed(String),
    /// Something broke; see [`Fault`].
    Faulted(Fault),
    /// More than one candidate could run; holds their qualified names.
    Ambiguous(Vec<String>),
    /// No command accepts the input.
    NotFound,
}

impl ExecutionOutcome {
    /// Whether this is [`ExecutionOutcome::Successful`].
    pub fn is_successful(&self) -> bool {
        matches!(self, ExecutionOutcome::Successful(_))
    }

    /// A lowercase name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Successful(_) => "successful",
            ExecutionOutcome::Failed(_) => "failed",
            ExecutionOutcome::Faulted(_) => "faulted",
            ExecutionOutcome::Ambiguous(_) => "ambiguous",
            ExecutionOutcome::NotFound => "not found",
        }
    }
}
