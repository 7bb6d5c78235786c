// src/core/parsers.rs

use crate::{
    CancellationToken,
    core::commons,
    models::{Value, ValueType},
};
use async_trait::async_trait;
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};
use thiserror::Error;

/// Scalar types that ship with a conversion.
pub const BUILTIN_TYPES: [ValueType; 13] = [
    ValueType::String,
    ValueType::Char,
    ValueType::Bool,
    ValueType::I8,
    ValueType::I16,
    ValueType::I32,
    ValueType::I64,
    ValueType::U8,
    ValueType::U16,
    ValueType::U32,
    ValueType::U64,
    ValueType::F32,
    ValueType::F64,
];

/// Why a token's text did not become a value.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConversionError {
    /// The text is not a valid value of the target type. Recoverable: the
    /// candidate being bound is skipped.
    #[error("'{value}' is not a valid {target}: {reason}")]
    Invalid {
        value: String,
        target: ValueType,
        reason: String,
    },
    /// No parser exists for the type. A fault for the request.
    #[error("No parser is registered for type '{0}'.")]
    Unsupported(ValueType),
    #[error("Conversion was cancelled.")]
    Cancelled,
    /// The parser itself broke down.
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl ConversionError {
    /// Builds an [`ConversionError::Invalid`].
    pub fn invalid(value: &str, target: &ValueType, reason: impl Into<String>) -> Self {
        ConversionError::Invalid {
            value: value.to_string(),
            target: target.clone(),
            reason: reason.into(),
        }
    }
}

/// Converts one token's text into a typed [`Value`].
#[async_trait]
pub trait ValueParser: Send + Sync {
    /// Parses `text` as a value of `target`.
    async fn parse(
        &self,
        text: &str,
        target: &ValueType,
        cancellation: &CancellationToken,
    ) -> Result<Value, ConversionError>;
}

/// Conversions for every entry of [`BUILTIN_TYPES`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinParser;

#[async_trait]
impl ValueParser for BuiltinParser {
    async fn parse(
        &self,
        text: &str,
        target: &ValueType,
        _cancellation: &CancellationToken,
    ) -> Result<Value, ConversionError> {
        parse_builtin(text, target)
    }
}

/// Synchronous conversion for built-in scalar types.
/// Parses `text` as one of the built-in scalar types.
pub fn parse_builtin(text: &str, target: &ValueType) -> Result<Value, ConversionError> {
    let result = match target {
        ValueType::String => Ok(Value::Text(text.to_string())),
        ValueType::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err("expected exactly one character".to_string()),
            }
        }
        ValueType::Bool => {
            if text.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err("expected 'true' or 'false'".to_string())
            }
        }
        ValueType::I8 => signed::<i8>(text),
        ValueType::I16 => signed::<i16>(text),
        ValueType::I32 => signed::<i32>(text),
        ValueType::I64 => signed::<i64>(text),
        ValueType::U8 => unsigned::<u8>(text),
        ValueType::U16 => unsigned::<u16>(text),
        ValueType::U32 => unsigned::<u32>(text),
        ValueType::U64 => unsigned::<u64>(text),
        ValueType::F32 => text
            .parse::<f32>()
            .map(|v| Value::Float(f64::from(v)))
            .map_err(|e| e.to_string()),
        ValueType::F64 => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| e.to_string()),
        ValueType::Named(_) => return Err(ConversionError::Unsupported(target.clone())),
    };
    result.map_err(|reason| ConversionError::invalid(text, target, reason))
}

fn signed<T>(text: &str) -> Result<Value, String>
where
    T: FromStr + Into<i64>,
    T::Err: fmt::Display,
{
    text.parse::<T>()
        .map(|v| Value::Int(v.into()))
        .map_err(|e| e.to_string())
}

fn unsigned<T>(text: &str) -> Result<Value, String>
where
    T: FromStr + Into<u64>,
    T::Err: fmt::Display,
{
    text.parse::<T>()
        .map(|v| Value::UInt(v.into()))
        .map_err(|e| e.to_string())
}

/// Matches a closed set of variant names, ignoring ASCII case, and yields the
/// declared spelling.
#[derive(Debug, Clone)]
pub struct EnumParser {
    type_name: String,
    variants: Vec<String>,
}

impl EnumParser {
    /// A parser for `type_name` accepting `variants`.
    pub fn new<I, S>(type_name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ValueParser for EnumParser {
    async fn parse(
        &self,
        text: &str,
        target: &ValueType,
        _cancellation: &CancellationToken,
    ) -> Result<Value, ConversionError> {
        self.variants
            .iter()
            .find(|variant| variant.eq_ignore_ascii_case(text))
            .map(|variant| Value::Enum {
                type_name: self.type_name.clone(),
                variant: variant.clone(),
            })
            .ok_or_else(|| {
                ConversionError::invalid(
                    text,
                    target,
                    format!("expected one of: {}", self.variants.join(", ")),
                )
            })
    }
}

/// Adapts a synchronous closure into a parser. An `Err(reason)` from the
/// closure is an invalid value, not a fault.
pub struct FnParser<F>(F);

impl<F> fmt::Debug for FnParser<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnParser")
    }
}

#[async_trait]
impl<F> ValueParser for FnParser<F>
where
    F: Fn(&str) -> Result<Value, String> + Send + Sync,
{
    async fn parse(
        &self,
        text: &str,
        target: &ValueType,
        _cancellation: &CancellationToken,
    ) -> Result<Value, ConversionError> {
        (self.0)(text).map_err(|reason| ConversionError::invalid(text, target, reason))
    }
}

/// Lookup from a declared value type to its conversion capability.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<ValueType, Arc<dyn ValueParser>>,
}

impl ParserRegistry {
    /// A registry pre-populated with the built-in scalar conversions.
    pub fn new() -> Self {
        let builtin: Arc<dyn ValueParser> = Arc::new(BuiltinParser);
        let parsers = BUILTIN_TYPES
            .iter()
            .cloned()
            .map(|value_type| (value_type, Arc::clone(&builtin)))
            .collect();
        Self { parsers }
    }

    /// A registry with no conversions at all.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registers (or replaces) the parser for `value_type`.
    pub fn register(
        &mut self,
        value_type: ValueType,
        parser: impl ValueParser + 'static,
    ) -> &mut Self {
        log::debug!("Registering parser for type '{}'", value_type);
        self.parsers.insert(value_type, Arc::new(parser));
        self
    }

    /// Registers an enumeration named `type_name`.
    pub fn register_enum<I, S>(&mut self, type_name: &str, variants: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(
            ValueType::named(type_name),
            EnumParser::new(type_name, variants),
        )
    }

    /// Registers a closure as the parser for `type_name`.
    pub fn register_fn<F>(&mut self, type_name: &str, convert: F) -> &mut Self
    where
        F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(ValueType::named(type_name), FnParser(convert))
    }

    /// Whether `value_type` has a parser.
    pub fn contains(&self, value_type: &ValueType) -> bool {
        self.parsers.contains_key(value_type)
    }

    /// Converts `text` into a value of `target`, checking for cancellation first.
    pub async fn convert(
        &self,
        text: &str,
        target: &ValueType,
        cancellation: &CancellationToken,
    ) -> Result<Value, ConversionError> {
        commons::check_for_cancellation(cancellation).map_err(|_| ConversionError::Cancelled)?;
        let parser = self
            .parsers
            .get(target)
            .ok_or_else(|| ConversionError::Unsupported(target.clone()))?;
        parser.parse(text, target, cancellation).await
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.parsers.keys().map(ValueType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("ParserRegistry").field("types", &types).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commons::{cancel, new_cancellation_token};

    #[test]
    fn test_parse_builtin_scalars() {
        assert_eq!(
            parse_builtin("hello", &ValueType::String).unwrap(),
            Value::Text("hello".to_string())
        );
        assert_eq!(parse_builtin("TRUE", &ValueType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(parse_builtin("x", &ValueType::Char).unwrap(), Value::Char('x'));
        assert_eq!(parse_builtin("-42", &ValueType::I32).unwrap(), Value::Int(-42));
        assert_eq!(parse_builtin("200", &ValueType::U8).unwrap(), Value::UInt(200));
        assert_eq!(parse_builtin("1.5", &ValueType::F64).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_parse_builtin_rejects_out_of_range_and_garbage() {
        assert!(matches!(
            parse_builtin("300", &ValueType::U8),
            Err(ConversionError::Invalid { .. })
        ));
        assert!(matches!(
            parse_builtin("-1", &ValueType::U32),
            Err(ConversionError::Invalid { .. })
        ));
        assert!(matches!(
            parse_builtin("yes", &ValueType::Bool),
            Err(ConversionError::Invalid { .. })
        ));
        assert!(matches!(
            parse_builtin("ab", &ValueType::Char),
            Err(ConversionError::Invalid { .. })
        ));
    }

    #[test]
    fn test_invalid_error_names_value_and_target() {
        let err = parse_builtin("abc", &ValueType::I64).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'abc'"), "Message was: {}", message);
        assert!(message.contains("i64"), "Message was: {}", message);
    }

    #[test]
    fn test_parse_builtin_does_not_handle_named_types() {
        assert!(matches!(
            parse_builtin("red", &ValueType::named("Color")),
            Err(ConversionError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_converts_builtins() {
        let registry = ParserRegistry::new();
        let token = new_cancellation_token();
        for value_type in BUILTIN_TYPES.iter() {
            assert!(registry.contains(value_type));
        }
        let value = registry.convert("7", &ValueType::U16, &token).await.unwrap();
        assert_eq!(value, Value::UInt(7));
    }

    #[tokio::test]
    async fn test_enum_parser_is_case_insensitive_and_canonical() {
        let mut registry = ParserRegistry::new();
        registry.register_enum("Color", ["Red", "Green"]);
        let token = new_cancellation_token();
        let color = ValueType::named("Color");

        let value = registry.convert("green", &color, &token).await.unwrap();
        assert_eq!(
            value,
            Value::Enum {
                type_name: "Color".to_string(),
                variant: "Green".to_string(),
            }
        );

        let err = registry.convert("blue", &color, &token).await.unwrap_err();
        assert!(err.to_string().contains("Red, Green"));
    }

    #[tokio::test]
    async fn test_custom_fn_parser() {
        let mut registry = ParserRegistry::new();
        registry.register_fn("Percent", |text| {
            let number = text
                .strip_suffix('%')
                .ok_or_else(|| "missing '%'".to_string())?;
            number
                .parse::<u8>()
                .map(|v| Value::UInt(u64::from(v)))
                .map_err(|e| e.to_string())
        });
        let token = new_cancellation_token();
        let percent = ValueType::named("Percent");

        assert_eq!(
            registry.convert("50%", &percent, &token).await.unwrap(),
            Value::UInt(50)
        );
        assert!(matches!(
            registry.convert("50", &percent, &token).await,
            Err(ConversionError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregistered_type_is_unsupported() {
        let registry = ParserRegistry::empty();
        let token = new_cancellation_token();
        let result = registry.convert("1", &ValueType::I32, &token).await;
        assert!(matches!(result, Err(ConversionError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_convert_observes_cancellation() {
        let registry = ParserRegistry::new();
        let token = new_cancellation_token();
        cancel(&token);
        let result = registry.convert("1", &ValueType::I32, &token).await;
        assert!(matches!(result, Err(ConversionError::Cancelled)));
    }
}
