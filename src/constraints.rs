//! Ready-made decorator nodes for common constraints.
//!
//! Each constructor returns a decorator `SchemaNode` meant to be chained onto
//! a base node with [`SchemaNode::with`]. Values of a kind the constraint does
//! not understand are accepted; the base node is responsible for the kind.

use crate::error::{Reason, Rejection, SchemaError};
use crate::schema::SchemaNode;
use crate::validator::ValidationContext;
use crate::value::Value;
use regex::Regex;

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Strings by character count, arrays by item count.
pub fn min_length(min: usize) -> SchemaNode {
    SchemaNode::decorator("minLength", move |value, _| match length_of(value) {
        Some(len) if len < min => Err(Rejection::new(Reason::TooShort)
            .with_context("min", min)
            .with_context("length", len)),
        _ => Ok(()),
    })
}

pub fn max_length(max: usize) -> SchemaNode {
    SchemaNode::decorator("maxLength", move |value, _| match length_of(value) {
        Some(len) if len > max => Err(Rejection::new(Reason::TooLong)
            .with_context("max", max)
            .with_context("length", len)),
        _ => Ok(()),
    })
}

pub fn minimum(min: f64) -> SchemaNode {
    SchemaNode::decorator("minimum", move |value, _| match value.as_f64() {
        Some(n) if n < min => Err(Rejection::new(Reason::TooSmall).with_context("min", min)),
        _ => Ok(()),
    })
}

pub fn maximum(max: f64) -> SchemaNode {
    SchemaNode::decorator("maximum", move |value, _| match value.as_f64() {
        Some(n) if n > max => Err(Rejection::new(Reason::TooLarge).with_context("max", max)),
        _ => Ok(()),
    })
}

/// # Errors
/// Returns `SchemaError::InvalidPattern` if `pattern` is not a valid regex.
pub fn pattern(pattern: &str) -> Result<SchemaNode, SchemaError> {
    let regex = Regex::new(pattern)?;
    Ok(SchemaNode::decorator("pattern", move |value, _| {
        match value.as_str() {
            Some(s) if !regex.is_match(s) => Err(Rejection::new(Reason::PatternMismatch)
                .with_context("pattern", regex.as_str())),
            _ => Ok(()),
        }
    }))
}

/// A named business rule; `predicate` returning `false` rejects with `reason`.
pub fn rule<F>(name: &str, reason: &str, predicate: F) -> SchemaNode
where
    F: Fn(&Value, &ValidationContext<'_>) -> bool + Send + Sync + 'static,
{
    let reason = Reason::custom(reason);
    SchemaNode::decorator(name, move |value, ctx| {
        if predicate(value, ctx) {
            Ok(())
        } else {
            Err(Rejection::new(reason.clone()))
        }
    })
}
