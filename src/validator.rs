use crate::error::{NodeValidationError, Reason, SchemaError};
use crate::options::Options;
use crate::schema::{ClassDef, NodeKind, SchemaNode, Shape, TypeCache};
use crate::value::{Map, Value, UNDEFINED};
use log::trace;
use std::fmt::{self, Debug};

/// Ambient state threaded through one validation call.
pub struct ValidationContext<'a> {
    values: &'a Value,
    options: &'a Options,
    cache: &'a TypeCache,
    depth: usize,
}

impl<'a> ValidationContext<'a> {
    pub fn new(values: &'a Value, cache: &'a TypeCache, options: &'a Options) -> Self {
        Self {
            values,
            options,
            cache,
            depth: 0,
        }
    }

    /// The whole top-level value being validated.
    pub fn values(&self) -> &'a Value {
        self.values
    }

    pub fn options(&self) -> &'a Options {
        self.options
    }

    pub fn cache(&self) -> &'a TypeCache {
        self.cache
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// One step of the match trace: `node` accepted `value`.
///
/// `previous_matches` holds the children's own matches: the winning branch of
/// a union, one match per array/tuple element or record entry, one per class
/// property, one per intersection constituent.
#[derive(Clone)]
pub struct Match<'a> {
    pub node: &'a SchemaNode,
    pub value: &'a Value,
    pub context: Map,
    pub previous_matches: Vec<Match<'a>>,
}

impl<'a> Match<'a> {
    pub fn new(node: &'a SchemaNode, value: &'a Value) -> Self {
        Self {
            node,
            value,
            context: Map::new(),
            previous_matches: Vec::new(),
        }
    }

    fn with_previous(mut self, previous_matches: Vec<Match<'a>>) -> Self {
        self.previous_matches = previous_matches;
        self
    }

    /// The class property this match was recorded for.
    pub fn property(&self) -> Option<&str> {
        self.context.get("property").and_then(Value::as_str)
    }
}

impl PartialEq for Match<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.node, other.node)
            && self.value == other.value
            && self.context == other.context
            && self.previous_matches == other.previous_matches
    }
}

impl Debug for Match<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("kind", &self.node.kind())
            .field("value", self.value)
            .field("context", &self.context)
            .field("previous_matches", &self.previous_matches)
            .finish()
    }
}

/// Outcome of matching a value against a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation<'a> {
    Success(Match<'a>),
    Failure(NodeValidationError),
}

impl<'a> Validation<'a> {
    pub fn is_success(&self) -> bool {
        matches!(self, Validation::Success(_))
    }

    pub fn error(&self) -> Option<&NodeValidationError> {
        match self {
            Validation::Failure(error) => Some(error),
            Validation::Success(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Match<'a>, NodeValidationError> {
        match self {
            Validation::Success(m) => Ok(m),
            Validation::Failure(error) => Err(error),
        }
    }

    /// `{"success": true}` or the failure wire shape.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Validation::Success(_) => serde_json::json!({ "success": true }),
            Validation::Failure(error) => error.to_json(),
        }
    }
}

/// Validates `value` against `node`.
///
/// Non-conforming data is reported as `Validation::Failure`. An `Err` always
/// means the schema itself is broken or the recursion limit was hit.
///
/// # Errors
/// Returns a `SchemaError` for unknown classes, malformed nodes, non-class
/// intersection constituents and values nested deeper than `max_depth`.
pub fn validate<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    cache: &'a TypeCache,
    options: &'a Options,
) -> Result<Validation<'a>, SchemaError> {
    let mut ctx = ValidationContext::new(value, cache, options);
    validate_node(node, value, &mut ctx)
}

/// Validates `value` against `node` inside an ongoing validation.
///
/// # Errors
/// See [`validate`].
pub fn validate_node<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    ctx.depth += 1;
    if ctx.depth > ctx.options.max_depth {
        return Err(SchemaError::RecursionLimit {
            limit: ctx.options.max_depth,
        });
    }
    trace!("validating {} at depth {}", node.kind(), ctx.depth);

    let result = match node.shape() {
        Shape::Root { optional } => validate_root(node, *optional, value, ctx),
        Shape::String => primitive(node, value, ctx, Reason::NotAString, |v| {
            matches!(v, Value::String(_))
        }),
        Shape::Number => primitive(node, value, ctx, Reason::NotANumber, |v| {
            matches!(v, Value::Number(_))
        }),
        Shape::Boolean => primitive(node, value, ctx, Reason::NotABoolean, |v| {
            matches!(v, Value::Boolean(_))
        }),
        Shape::Null => primitive(node, value, ctx, Reason::NotNull, |v| {
            matches!(v, Value::Null)
        }),
        Shape::Undefined => primitive(node, value, ctx, Reason::NotUndefined, |v| {
            matches!(v, Value::Undefined)
        }),
        Shape::Any => run_decorators(node, value, Match::new(node, value), ctx),
        Shape::Literal(expected) => {
            if value == expected {
                run_decorators(node, value, Match::new(node, value), ctx)
            } else {
                Ok(Validation::Failure(
                    fail(node, value, Reason::LiteralNotMatching)
                        .with_context("expected", expected.clone()),
                ))
            }
        }
        Shape::Enum { name, values } => {
            if values.contains(value) {
                run_decorators(node, value, Match::new(node, value), ctx)
            } else {
                Ok(Validation::Failure(
                    fail(node, value, Reason::NotAnEnum)
                        .with_context("name", name.as_str())
                        .with_context("allowed", Value::Array(values.clone())),
                ))
            }
        }
        Shape::Union => validate_union(node, value, ctx),
        Shape::Intersection => validate_intersection(node, value, ctx),
        Shape::Array => validate_array(node, value, ctx),
        Shape::Tuple => validate_tuple(node, value, ctx),
        Shape::Record => validate_record(node, value, ctx),
        Shape::Class { name } => validate_class(node, name, value, ctx),
        Shape::Decorator { .. } => run_decorator(node, value, ctx).map(|rejected| match rejected {
            Some(error) => Validation::Failure(error),
            None => Validation::Success(Match::new(node, value)),
        }),
    };

    ctx.depth -= 1;
    result
}

fn fail(node: &SchemaNode, value: &Value, reason: Reason) -> NodeValidationError {
    NodeValidationError::new(node.kind(), value.clone(), reason)
}

fn malformed(node: &SchemaNode, message: &str) -> SchemaError {
    SchemaError::InvalidSchema {
        kind: node.kind(),
        message: message.to_string(),
    }
}

fn primitive<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
    reason: Reason,
    is_kind: fn(&Value) -> bool,
) -> Result<Validation<'a>, SchemaError> {
    if is_kind(value) {
        run_decorators(node, value, Match::new(node, value), ctx)
    } else {
        Ok(Validation::Failure(fail(node, value, reason)))
    }
}

/// Runs a single decorator node. `Ok(None)` means the predicate accepted the value.
fn run_decorator(
    decorator: &SchemaNode,
    value: &Value,
    ctx: &ValidationContext<'_>,
) -> Result<Option<NodeValidationError>, SchemaError> {
    let validator = decorator
        .annotations()
        .validator()
        .ok_or_else(|| malformed(decorator, "decorator has no validator annotation"))?;
    match validator(value, ctx) {
        Ok(()) => Ok(None),
        Err(rejection) => {
            let mut error = rejection.into_error(NodeKind::Decorator, value.clone());
            if let Shape::Decorator { name } = decorator.shape() {
                error.set_context("decorator", name.as_str());
            }
            Ok(Some(error))
        }
    }
}

/// Applies the decorator children of `node` once its own check passed.
/// The first rejecting decorator decides the outcome.
fn run_decorators<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    matched: Match<'a>,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    for decorator in node.decorators() {
        if let Some(mut error) = run_decorator(decorator, value, ctx)? {
            if error.context_value("type").is_none() {
                error.set_context("type", node.display_name());
            }
            return Ok(Validation::Failure(error));
        }
    }
    Ok(Validation::Success(matched))
}

fn validate_root<'a>(
    node: &'a SchemaNode,
    optional: bool,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    if value.is_undefined() {
        if optional {
            return Ok(Validation::Success(Match::new(node, value)));
        }
        return Ok(Validation::Failure(fail(node, value, Reason::ValueRequired)));
    }
    let child = node
        .structural_children()
        .next()
        .ok_or_else(|| malformed(node, "root has no child"))?;
    match validate_node(child, value, ctx)? {
        Validation::Success(m) => {
            let matched = Match::new(node, value).with_previous(vec![m]);
            run_decorators(node, value, matched, ctx)
        }
        failure => Ok(failure),
    }
}

fn validate_union<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    let mut errors = Vec::new();
    for branch in node.structural_children() {
        match validate_node(branch, value, ctx)? {
            Validation::Success(m) => {
                let matched = Match::new(node, value).with_previous(vec![m]);
                return run_decorators(node, value, matched, ctx);
            }
            Validation::Failure(mut error) => {
                if error.context_value("type").is_none() {
                    error.set_context("type", branch.display_name());
                }
                errors.push(error);
            }
        }
    }
    Ok(Validation::Failure(
        fail(node, value, Reason::NoUnionMatch).with_previous(errors),
    ))
}

fn validate_array<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    let Value::Array(items) = value else {
        return Ok(Validation::Failure(fail(node, value, Reason::NotAnArray)));
    };
    let element = node
        .structural_children()
        .next()
        .ok_or_else(|| malformed(node, "array has no element type"))?;

    let mut matches = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match validate_node(element, item, ctx)? {
            Validation::Success(m) => matches.push(m),
            Validation::Failure(error) => {
                return Ok(Validation::Failure(
                    fail(node, value, Reason::ElementTypeFailed)
                        .with_context("element", index)
                        .with_previous(vec![error]),
                ));
            }
        }
    }
    let matched = Match::new(node, value).with_previous(matches);
    run_decorators(node, value, matched, ctx)
}

fn validate_tuple<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    let Value::Array(items) = value else {
        return Ok(Validation::Failure(fail(node, value, Reason::NotAnArray)));
    };
    let elements: Vec<&SchemaNode> = node.structural_children().collect();
    if items.len() != elements.len() {
        return Ok(Validation::Failure(
            fail(node, value, Reason::NoLengthMatch)
                .with_context("expected", elements.len())
                .with_context("found", items.len()),
        ));
    }

    let mut matches = Vec::with_capacity(items.len());
    for (index, (element, item)) in elements.into_iter().zip(items).enumerate() {
        match validate_node(element, item, ctx)? {
            Validation::Success(m) => matches.push(m),
            Validation::Failure(error) => {
                return Ok(Validation::Failure(
                    fail(node, value, Reason::ElementTypeFailed)
                        .with_context("element", index)
                        .with_previous(vec![error]),
                ));
            }
        }
    }
    let matched = Match::new(node, value).with_previous(matches);
    run_decorators(node, value, matched, ctx)
}

fn validate_record<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    let Value::Object(entries) = value else {
        return Ok(Validation::Failure(fail(node, value, Reason::NotAnObject)));
    };
    // `record(key, value)`: only the value type constrains entries.
    let value_type = node
        .structural_children()
        .last()
        .ok_or_else(|| malformed(node, "record has no value type"))?;

    let mut matches = Vec::with_capacity(entries.len());
    for (key, entry) in entries {
        match validate_node(value_type, entry, ctx)? {
            Validation::Success(mut m) => {
                m.context.insert("key".to_string(), Value::String(key.clone()));
                matches.push(m);
            }
            Validation::Failure(error) => {
                return Ok(Validation::Failure(
                    fail(node, value, Reason::EntryTypeFailed)
                        .with_context("key", key.as_str())
                        .with_previous(vec![error]),
                ));
            }
        }
    }
    let matched = Match::new(node, value).with_previous(matches);
    run_decorators(node, value, matched, ctx)
}

/// Validates every declared property of `class` against `value`, collecting
/// all matches and all failures.
fn validate_properties<'a>(
    class: &'a ClassDef,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<(Vec<Match<'a>>, Vec<NodeValidationError>), SchemaError> {
    let mut matches = Vec::new();
    let mut errors = Vec::new();
    for property in class.properties() {
        let property_value = value
            .as_object()
            .and_then(|map| map.get(&property.name))
            .unwrap_or(&UNDEFINED);
        match validate_node(&property.tree, property_value, ctx)? {
            Validation::Success(mut m) => {
                m.context.insert(
                    "property".to_string(),
                    Value::String(property.name.clone()),
                );
                matches.push(m);
            }
            Validation::Failure(mut error) => {
                error.set_context("property", property.name.as_str());
                error.set_context("owner", class.name());
                errors.push(error);
            }
        }
    }
    Ok((matches, errors))
}

fn unknown_fields(
    node: &SchemaNode,
    owner: &str,
    value: &Value,
    is_declared: impl Fn(&str) -> bool,
) -> Vec<NodeValidationError> {
    let Some(map) = value.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(key, _)| !is_declared(key))
        .map(|(key, field)| {
            fail(node, field, Reason::UnknownField)
                .with_context("property", key.as_str())
                .with_context("owner", owner)
        })
        .collect()
}

fn validate_class<'a>(
    node: &'a SchemaNode,
    name: &str,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    let class = ctx.cache.class(name)?;
    if !matches!(value, Value::Object(_)) {
        return Ok(Validation::Failure(
            fail(node, value, Reason::NotAnObject).with_context("type", name),
        ));
    }

    let (matches, mut errors) = validate_properties(class, value, ctx)?;
    if !ctx.options.allow_unknown_fields {
        errors.extend(unknown_fields(node, name, value, |key| {
            class.has_property(key)
        }));
    }

    if errors.is_empty() {
        let matched = Match::new(node, value).with_previous(matches);
        run_decorators(node, value, matched, ctx)
    } else {
        log::debug!("class `{name}` failed on {} propert(ies)", errors.len());
        Ok(Validation::Failure(
            fail(node, value, Reason::ObjectPropertyFailed)
                .with_context("type", name)
                .with_previous(errors),
        ))
    }
}

fn validate_intersection<'a>(
    node: &'a SchemaNode,
    value: &'a Value,
    ctx: &mut ValidationContext<'a>,
) -> Result<Validation<'a>, SchemaError> {
    let mut classes = Vec::new();
    for constituent in node.structural_children() {
        let name = constituent
            .class_name()
            .ok_or(SchemaError::InvalidIntersection {
                found: constituent.kind(),
            })?;
        classes.push((constituent, ctx.cache.class(name)?));
    }

    let type_name = node.display_name();
    if !matches!(value, Value::Object(_)) {
        return Ok(Validation::Failure(
            fail(node, value, Reason::NotAnObject).with_context("type", type_name),
        ));
    }

    let mut matches = Vec::with_capacity(classes.len());
    let mut errors = Vec::new();
    for &(constituent, class) in &classes {
        let (properties, failed) = validate_properties(class, value, ctx)?;
        if !failed.is_empty() {
            errors.extend(failed);
            continue;
        }
        let matched = Match::new(constituent, value).with_previous(properties);
        match run_decorators(constituent, value, matched, ctx)? {
            Validation::Success(m) => matches.push(m),
            Validation::Failure(error) => errors.push(error),
        }
    }
    if !ctx.options.allow_unknown_fields {
        errors.extend(unknown_fields(node, &type_name, value, |key| {
            classes.iter().any(|(_, class)| class.has_property(key))
        }));
    }

    if errors.is_empty() {
        let matched = Match::new(node, value).with_previous(matches);
        run_decorators(node, value, matched, ctx)
    } else {
        log::debug!("intersection `{type_name}` failed on {} propert(ies)", errors.len());
        Ok(Validation::Failure(
            fail(node, value, Reason::ObjectPropertyFailed)
                .with_context("type", type_name)
                .with_previous(errors),
        ))
    }
}
