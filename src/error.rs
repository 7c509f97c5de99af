use crate::formatter::ErrorReport;
use crate::schema::NodeKind;
use crate::value::{Map, Value};
use miette::Diagnostic;
use serde::{Serialize, Serializer};
use std::fmt::{self, Display};
use thiserror::Error;

/// Boxed error returned by user supplied transformers and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Invalid(#[from] ValidationFailed),
}

/// A misconfigured schema. These are never produced by bad input data and are
/// never folded into a [`NodeValidationError`].
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    #[error("Unknown class `{name}`")]
    #[diagnostic(
        code(schema::unknown_class),
        help("Every class referenced by the schema tree must be registered in the type cache.")
    )]
    UnknownClass { name: String },

    #[error("Intersection constituent must be a class, found `{found}`")]
    #[diagnostic(
        code(schema::invalid_intersection),
        help("Intersections can only merge class-like nodes.")
    )]
    InvalidIntersection { found: NodeKind },

    #[error("Malformed `{kind}` node: {message}")]
    #[diagnostic(code(schema::invalid_schema))]
    InvalidSchema { kind: NodeKind, message: String },

    #[error("Recursion limit of {limit} exceeded")]
    #[diagnostic(
        code(schema::recursion_limit),
        help(
            "The value is nested deeper than `maxDepth` allows. \
             Raise the limit or check for cyclic input."
        )
    )]
    RecursionLimit { limit: usize },

    #[error("No factory registered for class `{name}`")]
    #[diagnostic(
        code(schema::missing_factory),
        help("Register a factory for this class or disable `strictFactories`.")
    )]
    MissingFactory { name: String },

    #[error("Invalid pattern")]
    #[diagnostic(code(schema::invalid_pattern))]
    InvalidPattern(#[from] regex::Error),

    #[error("Transformer for `{property}` aborted")]
    #[diagnostic(
        code(schema::transformer_aborted),
        help("Transformers should reject bad input with a structured failure instead of an error.")
    )]
    TransformerAborted {
        property: String,
        #[source]
        source: BoxError,
    },

    #[error("Factory for `{class}` aborted")]
    #[diagnostic(code(schema::factory_aborted))]
    FactoryAborted {
        class: String,
        #[source]
        source: BoxError,
    },
}

#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read configuration file")]
    #[diagnostic(code(config::io))]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration")]
    #[diagnostic(code(config::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON configuration")]
    #[diagnostic(code(config::json))]
    Json(#[from] serde_json::Error),

    #[error("Unsupported configuration format `{extension}`")]
    #[diagnostic(
        code(config::unsupported_format),
        help("Use a `.yaml`, `.yml` or `.json` file.")
    )]
    UnsupportedFormat { extension: String },
}

/// Raised by the opt-in `check`/`*_or_err` helpers when data does not conform.
#[derive(Error, Debug, Diagnostic)]
#[error("Validation failed with {} error(s)", .report.len())]
#[diagnostic(code(schema::validation_failed))]
pub struct ValidationFailed {
    pub error: NodeValidationError,
    pub report: ErrorReport,
}

/// Why a value failed to match a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reason {
    ValueRequired,
    NotAString,
    NotANumber,
    NotABoolean,
    NotNull,
    NotUndefined,
    LiteralNotMatching,
    NotAnEnum,
    NoUnionMatch,
    NotAnArray,
    /// A single array or tuple element failed; `context.element` holds the index.
    ElementTypeFailed,
    /// One or more array elements failed to transform.
    ArrayItemFailed,
    NoLengthMatch,
    NotAnObject,
    /// A record entry failed; `context.key` holds the offending key.
    EntryTypeFailed,
    ObjectPropertyFailed,
    UnknownField,
    TooShort,
    TooLong,
    TooSmall,
    TooLarge,
    PatternMismatch,
    /// Reason code chosen by a user supplied decorator or transformer.
    Custom(String),
}

impl Reason {
    pub fn custom(code: impl Into<String>) -> Self {
        Reason::Custom(code.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Reason::ValueRequired => "VALUE_REQUIRED",
            Reason::NotAString => "NOT_A_STRING",
            Reason::NotANumber => "NOT_A_NUMBER",
            Reason::NotABoolean => "NOT_A_BOOLEAN",
            Reason::NotNull => "NOT_NULL",
            Reason::NotUndefined => "NOT_UNDEFINED",
            Reason::LiteralNotMatching => "LITERAL_NOT_MATCHING",
            Reason::NotAnEnum => "NOT_AN_ENUM",
            Reason::NoUnionMatch => "NO_UNION_MATCH",
            Reason::NotAnArray => "NOT_AN_ARRAY",
            Reason::ElementTypeFailed => "ELEMENT_TYPE_FAILED",
            Reason::ArrayItemFailed => "ARRAY_ITEM_FAILED",
            Reason::NoLengthMatch => "NO_LENGTH_MATCH",
            Reason::NotAnObject => "NOT_AN_OBJECT",
            Reason::EntryTypeFailed => "ENTRY_TYPE_FAILED",
            Reason::ObjectPropertyFailed => "OBJECT_PROPERTY_FAILED",
            Reason::UnknownField => "UNKNOWN_FIELD",
            Reason::TooShort => "TOO_SHORT",
            Reason::TooLong => "TOO_LONG",
            Reason::TooSmall => "TOO_SMALL",
            Reason::TooLarge => "TOO_LARGE",
            Reason::PatternMismatch => "PATTERN_MISMATCH",
            Reason::Custom(code) => code,
        }
    }

    /// Wrapping reasons only point at nested errors; the formatter descends
    /// through them instead of reporting them.
    #[must_use]
    pub fn is_wrapping(&self) -> bool {
        matches!(
            self,
            Reason::ElementTypeFailed
                | Reason::ArrayItemFailed
                | Reason::EntryTypeFailed
                | Reason::ObjectPropertyFailed
        )
    }
}

impl Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Reason {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// A structured refusal returned by a decorator predicate or a transformer.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: Reason,
    pub context: Option<Map>,
}

impl Rejection {
    pub fn new(reason: Reason) -> Self {
        Self {
            reason,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// Turns the refusal into a data error reported against a node of `kind`.
    pub fn into_error(self, kind: NodeKind, value: Value) -> NodeValidationError {
        NodeValidationError {
            kind,
            value,
            reason: self.reason,
            context: self.context,
            previous_errors: Vec::new(),
        }
    }
}

/// A data error: the value did not conform to the node of kind `kind`.
///
/// The shape of `previous_errors` follows the schema tree at the point of
/// failure, so the formatter can rebuild property paths from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeValidationError {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub value: Value,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map>,
    pub previous_errors: Vec<NodeValidationError>,
}

impl NodeValidationError {
    pub fn new(kind: NodeKind, value: Value, reason: Reason) -> Self {
        Self {
            kind,
            value,
            reason,
            context: None,
            previous_errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_context(key, value);
        self
    }

    #[must_use]
    pub fn with_previous(mut self, previous_errors: Vec<NodeValidationError>) -> Self {
        self.previous_errors = previous_errors;
        self
    }

    pub fn set_context(&mut self, key: &str, value: impl Into<Value>) {
        self.context
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
    }

    /// Reads a context entry, `None` when absent.
    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.as_ref().and_then(|ctx| ctx.get(key))
    }

    /// The property this error was reported for, if it came from a class.
    #[must_use]
    pub fn property(&self) -> Option<&str> {
        self.context_value("property").and_then(Value::as_str)
    }

    /// Serializes the failure into the `{success: false, ...}` wire shape.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(map) = &mut json {
            map.insert("success".to_string(), serde_json::Value::Bool(false));
        }
        json
    }
}

impl Display for NodeValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) for value {}", self.reason, self.kind, self.value)
    }
}
