//! Second pass: turns a validated value into output objects.
//!
//! The engine does not look at the schema again. It replays the match trace
//! recorded by the validator, so every structural question was already
//! answered; the only new failures come from user transformers.

use crate::error::{BoxError, NodeValidationError, Reason, Rejection, SchemaError};
use crate::options::Options;
use crate::schema::{SchemaNode, Shape, TypeCache};
use crate::validator::{validate, Match, Validation};
use crate::value::Value;
use futures::future::{self, BoxFuture, FutureExt};
use indexmap::IndexMap;
use log::{debug, trace, warn};
use serde::{Serialize, Serializer};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

/// Assembled property values handed to a factory, in declaration order.
pub type Fields = IndexMap<String, Output>;

/// A typed object built by a factory.
#[derive(Clone)]
pub struct Instance {
    class: String,
    inner: Arc<dyn Any + Send + Sync>,
    fields: Fields,
}

impl Instance {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// The fields the instance was built from.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl Serialize for Instance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.fields.serialize(serializer)
    }
}

/// A transformed value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Output {
    Value(Value),
    Array(Vec<Output>),
    Object(Fields),
    Instance(Instance),
}

impl Output {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Output::Value(value) => Some(value),
            _ => None,
        }
    }

    /// A field of an object or instance.
    pub fn get(&self, key: &str) -> Option<&Output> {
        match self {
            Output::Object(fields) => fields.get(key),
            Output::Instance(instance) => instance.fields.get(key),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Output]> {
        match self {
            Output::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Output::Instance(instance) => instance.downcast_ref(),
            _ => None,
        }
    }

    /// Serializes into JSON; instances are written as their fields.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Value(value)
    }
}

/// What a transformer made of its input.
#[derive(Debug, Clone)]
pub enum Conversion {
    Value(Output),
    /// A data failure, reported like a validation error for the property.
    Rejected(Rejection),
}

type TransformFn =
    dyn Fn(Value, Value) -> BoxFuture<'static, Result<Conversion, BoxError>> + Send + Sync;

/// A custom per-property conversion, attached through annotations.
///
/// The function receives the raw property value and the object that owns the
/// property. Returning `Err` aborts the whole transformation.
#[derive(Clone)]
pub struct Transformer {
    func: Arc<TransformFn>,
    nullable: bool,
}

impl Transformer {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Conversion, BoxError>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |value, parent| func(value, parent).boxed()),
            nullable: false,
        }
    }

    /// Wraps a synchronous conversion.
    pub fn sync<F>(func: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<Conversion, BoxError> + Send + Sync + 'static,
    {
        Self::new(move |value, parent| future::ready(func(&value, &parent)))
    }

    /// `null` inputs bypass the transformer and stay `null`.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// # Errors
    /// Propagates the transformer's own error.
    pub async fn apply(&self, value: Value, parent: Value) -> Result<Conversion, BoxError> {
        (self.func)(value, parent).await
    }
}

/// Builds an output object from assembled fields.
pub type Factory = Arc<dyn Fn(Fields) -> Result<Output, BoxError> + Send + Sync>;

/// Factories keyed by class name.
#[derive(Clone, Default)]
pub struct Factories {
    factories: HashMap<String, Factory>,
}

impl Factories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(Fields) -> Result<Output, BoxError> + Send + Sync + 'static,
    {
        self.factories.insert(class.into(), Arc::new(factory));
    }

    /// Registers a factory producing a typed instance of `T`.
    pub fn register_instance<T, F>(&mut self, class: impl Into<String>, build: F)
    where
        T: Any + Send + Sync,
        F: Fn(&Fields) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let class = class.into();
        let name = class.clone();
        self.register(class, move |fields| {
            let inner = build(&fields)?;
            Ok(Output::Instance(Instance {
                class: name.clone(),
                inner: Arc::new(inner),
                fields,
            }))
        });
    }

    pub fn get(&self, class: &str) -> Option<&Factory> {
        self.factories.get(class)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }
}

impl Debug for Factories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// Outcome of a transformation.
#[derive(Debug, Clone)]
pub enum Transformation {
    Success(Output),
    Failure(NodeValidationError),
}

impl Transformation {
    pub fn is_success(&self) -> bool {
        matches!(self, Transformation::Success(_))
    }

    pub fn error(&self) -> Option<&NodeValidationError> {
        match self {
            Transformation::Failure(error) => Some(error),
            Transformation::Success(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Output, NodeValidationError> {
        match self {
            Transformation::Success(output) => Ok(output),
            Transformation::Failure(error) => Err(error),
        }
    }

    /// `{"success": true, "value": ...}`, or the failure wire shape with a
    /// `null` value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Transformation::Success(output) => {
                serde_json::json!({ "success": true, "value": output.to_json() })
            }
            Transformation::Failure(error) => {
                let mut json = error.to_json();
                if let serde_json::Value::Object(map) = &mut json {
                    map.insert("value".to_string(), serde_json::Value::Null);
                }
                json
            }
        }
    }
}

/// Validates `values` against `node` and, if it conforms, builds the output.
///
/// A validation failure is returned unchanged. Properties are transformed in
/// declaration order, each transformer awaited before the next one starts.
///
/// # Errors
/// Returns a `SchemaError` for broken schemas, missing factories under
/// `strict_factories`, and transformers or factories that return `Err`.
pub async fn transform(
    node: &SchemaNode,
    values: &Value,
    cache: &TypeCache,
    factories: &Factories,
    options: &Options,
) -> Result<Transformation, SchemaError> {
    let matched = match validate(node, values, cache, options)? {
        Validation::Success(matched) => matched,
        Validation::Failure(error) => {
            debug!("transformation skipped, value failed validation with {}", error.reason);
            return Ok(Transformation::Failure(error));
        }
    };
    let engine = TransformEngine { factories, options };
    engine.transform_match(&matched).await
}

struct TransformEngine<'e> {
    factories: &'e Factories,
    options: &'e Options,
}

impl TransformEngine<'_> {
    fn transform_match<'m>(
        &'m self,
        matched: &'m Match<'_>,
    ) -> BoxFuture<'m, Result<Transformation, SchemaError>> {
        async move {
            trace!("transforming {}", matched.node.kind());
            match matched.node.shape() {
                Shape::Root { .. } | Shape::Union => match matched.previous_matches.first() {
                    Some(inner) => self.transform_match(inner).await,
                    None => Ok(Transformation::Success(Output::Value(matched.value.clone()))),
                },
                Shape::Array | Shape::Tuple => self.transform_elements(matched).await,
                Shape::Class { name } => self.transform_class(name, matched).await,
                Shape::Intersection => self.transform_intersection(matched).await,
                _ => Ok(Transformation::Success(Output::Value(matched.value.clone()))),
            }
        }
        .boxed()
    }

    async fn transform_elements(&self, matched: &Match<'_>) -> Result<Transformation, SchemaError> {
        let mut items = Vec::with_capacity(matched.previous_matches.len());
        let mut errors = Vec::new();
        for (index, element) in matched.previous_matches.iter().enumerate() {
            match self.transform_match(element).await? {
                Transformation::Success(output) => items.push(output),
                Transformation::Failure(error) => errors.push(
                    NodeValidationError::new(
                        matched.node.kind(),
                        matched.value.clone(),
                        Reason::ElementTypeFailed,
                    )
                    .with_context("element", index)
                    .with_previous(vec![error]),
                ),
            }
        }
        if errors.is_empty() {
            return Ok(Transformation::Success(Output::Array(items)));
        }
        Ok(Transformation::Failure(
            NodeValidationError::new(
                matched.node.kind(),
                matched.value.clone(),
                Reason::ArrayItemFailed,
            )
            .with_previous(errors),
        ))
    }

    async fn transform_class(
        &self,
        name: &str,
        matched: &Match<'_>,
    ) -> Result<Transformation, SchemaError> {
        match self.assemble(name, matched).await? {
            Ok(fields) => Ok(Transformation::Success(self.construct(name, fields)?)),
            Err(errors) => Ok(Transformation::Failure(
                NodeValidationError::new(
                    matched.node.kind(),
                    matched.value.clone(),
                    Reason::ObjectPropertyFailed,
                )
                .with_context("type", name)
                .with_previous(errors),
            )),
        }
    }

    async fn transform_intersection(
        &self,
        matched: &Match<'_>,
    ) -> Result<Transformation, SchemaError> {
        let mut merged = Fields::new();
        let mut errors = Vec::new();
        for constituent in &matched.previous_matches {
            let owner = constituent.node.class_name().unwrap_or_default();
            match self.assemble(owner, constituent).await? {
                Ok(fields) => merged.extend(fields),
                Err(failed) => errors.extend(failed),
            }
        }
        if errors.is_empty() {
            return Ok(Transformation::Success(Output::Object(merged)));
        }
        Ok(Transformation::Failure(
            NodeValidationError::new(
                matched.node.kind(),
                matched.value.clone(),
                Reason::ObjectPropertyFailed,
            )
            .with_context("type", matched.node.display_name())
            .with_previous(errors),
        ))
    }

    /// Transforms the matched properties of one class, strictly one after the
    /// other. Absent optional properties are left out of the fields.
    async fn assemble(
        &self,
        owner: &str,
        matched: &Match<'_>,
    ) -> Result<Result<Fields, Vec<NodeValidationError>>, SchemaError> {
        let mut fields = Fields::new();
        let mut errors = Vec::new();
        for property in &matched.previous_matches {
            let Some(name) = property.property() else {
                continue;
            };
            if property.value.is_undefined() {
                continue;
            }

            let outcome = match transformer_of(property) {
                Some(transformer)
                    if transformer.is_nullable() && *property.value == Value::Null =>
                {
                    Transformation::Success(Output::Value(Value::Null))
                }
                Some(transformer) => {
                    trace!("running transformer for `{owner}.{name}`");
                    match transformer
                        .apply(property.value.clone(), matched.value.clone())
                        .await
                    {
                        Ok(Conversion::Value(output)) => Transformation::Success(output),
                        Ok(Conversion::Rejected(rejection)) => Transformation::Failure(
                            rejection.into_error(property.node.kind(), property.value.clone()),
                        ),
                        Err(source) => {
                            warn!("transformer for `{owner}.{name}` aborted: {source}");
                            return Err(SchemaError::TransformerAborted {
                                property: format!("{owner}.{name}"),
                                source,
                            });
                        }
                    }
                }
                None => self.transform_match(property).await?,
            };

            match outcome {
                Transformation::Success(output) => {
                    fields.insert(name.to_string(), output);
                }
                Transformation::Failure(mut error) => {
                    error.set_context("property", name);
                    error.set_context("owner", owner);
                    errors.push(error);
                }
            }
        }
        if errors.is_empty() {
            Ok(Ok(fields))
        } else {
            Ok(Err(errors))
        }
    }

    fn construct(&self, class: &str, fields: Fields) -> Result<Output, SchemaError> {
        match self.factories.get(class) {
            Some(factory) => factory(fields).map_err(|source| SchemaError::FactoryAborted {
                class: class.to_string(),
                source,
            }),
            None if self.options.strict_factories => Err(SchemaError::MissingFactory {
                name: class.to_string(),
            }),
            None => Ok(Output::Object(fields)),
        }
    }
}

/// A property's transformer sits on the property root or on its type node.
fn transformer_of<'a>(property: &Match<'a>) -> Option<&'a Transformer> {
    property.node.annotations().transformer().or_else(|| {
        property
            .previous_matches
            .first()
            .and_then(|inner| inner.node.annotations().transformer())
    })
}
