//! Flattens an error tree into a `path -> {message, context}` report.
//!
//! Wrapping failures (class properties, array/tuple elements, record entries)
//! only contribute a path segment. Every other reason is a leaf and is turned
//! into a message through the reason's template, where `{key}` placeholders are
//! filled from the error context. `{value}` and `{valueType}` always refer to
//! the failing value.

use crate::error::{ConfigError, NodeValidationError, Reason};
use crate::schema::NodeKind;
use crate::utils::{index_path, property_path, ROOT_PATH};
use crate::value::{Map, Value};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

const FALLBACK_MESSAGE: &str = "Invalid value";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("VALUE_REQUIRED", "A value is required"),
    ("NOT_A_STRING", "Expected a string but received {valueType}"),
    ("NOT_A_NUMBER", "Expected a number but received {valueType}"),
    ("NOT_A_BOOLEAN", "Expected a boolean but received {valueType}"),
    ("NOT_NULL", "Expected null but received {valueType}"),
    ("NOT_UNDEFINED", "Expected no value but received {valueType}"),
    ("LITERAL_NOT_MATCHING", "Expected {expected} but received {value}"),
    ("NOT_AN_ENUM", "Expected one of {allowed} ({name}) but received {value}"),
    ("NO_UNION_MATCH", "Expected one of {types} but received {valueType}"),
    ("NOT_AN_ARRAY", "Expected an array but received {valueType}"),
    ("ELEMENT_TYPE_FAILED", "Invalid element at index {element}"),
    ("ARRAY_ITEM_FAILED", "Invalid array items"),
    ("NO_LENGTH_MATCH", "Expected {expected} elements but received {found}"),
    ("NOT_AN_OBJECT", "Expected an object but received {valueType}"),
    ("ENTRY_TYPE_FAILED", "Invalid entry {key}"),
    ("OBJECT_PROPERTY_FAILED", "Invalid properties in {type}"),
    ("UNKNOWN_FIELD", "Unknown field {property}"),
    ("TOO_SHORT", "Length must be at least {min}"),
    ("TOO_LONG", "Length must be at most {max}"),
    ("TOO_SMALL", "Must be at least {min}"),
    ("TOO_LARGE", "Must be at most {max}"),
    ("PATTERN_MISMATCH", "Must match the pattern {pattern}"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedError {
    pub message: String,
    pub context: Map,
}

/// Path-addressed errors, in the order they were found.
pub type ErrorReport = IndexMap<String, FormattedError>;

/// Reason code to message template table.
#[derive(Debug, Clone)]
pub struct Translations {
    templates: HashMap<String, String>,
    fallback: String,
}

impl Default for Translations {
    fn default() -> Self {
        Self {
            templates: BUILTIN_TEMPLATES
                .iter()
                .map(|(code, template)| ((*code).to_string(), (*template).to_string()))
                .collect(),
            fallback: FALLBACK_MESSAGE.to_string(),
        }
    }
}

impl Translations {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table, overridden and extended by a YAML mapping of
    /// reason code to template.
    ///
    /// # Errors
    /// Returns `ConfigError::Yaml` if the document is not a string mapping.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let mut translations = Self::default();
        let overrides: HashMap<String, String> = serde_yaml::from_str(source)?;
        translations.templates.extend(overrides);
        Ok(translations)
    }

    /// Registers a template for a custom reason, or replaces a built-in one.
    pub fn insert(&mut self, code: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(code.into(), template.into());
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn template(&self, reason: &Reason) -> &str {
        self.templates
            .get(reason.as_str())
            .map_or(self.fallback.as_str(), String::as_str)
    }

    /// Fills the template for `reason`. Placeholders without a matching
    /// context entry are left as written.
    pub fn render(&self, reason: &Reason, value: &Value, context: &Map) -> String {
        let template = self.template(reason);
        let mut message = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            message.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                message.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let key = &after[..end];
            match lookup(key, value, context) {
                Some(text) => message.push_str(&text),
                None => message.push_str(&rest[start..start + end + 2]),
            }
            rest = &after[end + 1..];
        }
        message.push_str(rest);
        message
    }

    /// Flattens `error` into a report rooted at `$`.
    pub fn format(&self, error: &NodeValidationError) -> ErrorReport {
        let mut report = ErrorReport::new();
        self.walk(error, ROOT_PATH, &mut report);
        report
    }

    fn walk(&self, error: &NodeValidationError, path: &str, report: &mut ErrorReport) {
        if error.reason.is_wrapping() && !error.previous_errors.is_empty() {
            let child_path = match error.reason {
                Reason::ElementTypeFailed => error
                    .context_value("element")
                    .and_then(Value::as_f64)
                    .map(|index| index_path(path, index as usize)),
                Reason::EntryTypeFailed => error
                    .context_value("key")
                    .and_then(Value::as_str)
                    .map(|key| property_path(path, key)),
                _ => None,
            };
            let child_path = child_path.as_deref().unwrap_or(path);
            for child in &error.previous_errors {
                match child.property() {
                    Some(property) if error.reason == Reason::ObjectPropertyFailed => {
                        self.walk(child, &property_path(child_path, property), report);
                    }
                    _ => self.walk(child, child_path, report),
                }
            }
            return;
        }

        let mut context = error.context.clone().unwrap_or_default();
        if error.reason == Reason::NoUnionMatch {
            let types = error.previous_errors.iter().map(|e| Value::String(type_name(e)));
            context.insert("types".to_string(), Value::Array(types.collect()));
        }
        let message = self.render(&error.reason, &error.value, &context);
        report
            .entry(path.to_string())
            .or_insert(FormattedError { message, context });
    }
}

/// Flattens `error` with the built-in templates.
pub fn format(error: &NodeValidationError) -> ErrorReport {
    Translations::default().format(error)
}

/// Derives a display name for the type a failed node expected. A `type`
/// context entry, as recorded for union branches, wins over the derivation.
pub fn type_name(error: &NodeValidationError) -> String {
    let named = |key: &str| {
        error
            .context_value(key)
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    };
    if let Some(name) = named("type") {
        return name;
    }
    match error.kind {
        NodeKind::Enum => named("name").unwrap_or_else(|| error.kind.to_string()),
        NodeKind::Literal => error
            .context_value("expected")
            .map_or_else(|| error.kind.to_string(), ToString::to_string),
        NodeKind::Array => match error.previous_errors.first() {
            Some(element) if element.kind == NodeKind::Union => {
                format!("({})[]", type_name(element))
            }
            Some(element) => format!("{}[]", type_name(element)),
            None => "array".to_string(),
        },
        NodeKind::Union => {
            if error.previous_errors.is_empty() {
                "never".to_string()
            } else {
                error
                    .previous_errors
                    .iter()
                    .map(type_name)
                    .collect::<Vec<_>>()
                    .join(" | ")
            }
        }
        NodeKind::Root => "value".to_string(),
        kind => kind.to_string(),
    }
}

fn lookup(key: &str, value: &Value, context: &Map) -> Option<String> {
    if let Some(entry) = context.get(key) {
        return Some(render_value(entry));
    }
    match key {
        "value" => Some(render_value(value)),
        "valueType" => Some(value.type_name().to_string()),
        _ => None,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
