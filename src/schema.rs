use crate::error::{Rejection, SchemaError};
use crate::transformer::Transformer;
use crate::validator::ValidationContext;
use crate::value::Value;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

/// Annotation key holding a decorator node's predicate.
pub const VALIDATOR: &str = "validator";
/// Annotation key holding a property's custom transformer.
pub const TRANSFORMER: &str = "transformer";
/// Annotation key holding free-form documentation.
pub const DOC: &str = "doc";

/// The tag selecting a node's validation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Any,
    Literal,
    Enum,
    Union,
    Intersection,
    Array,
    Tuple,
    Record,
    Class,
    Decorator,
}

impl NodeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::String => "string",
            NodeKind::Number => "number",
            NodeKind::Boolean => "boolean",
            NodeKind::Null => "null",
            NodeKind::Undefined => "undefined",
            NodeKind::Any => "any",
            NodeKind::Literal => "literal",
            NodeKind::Enum => "enum",
            NodeKind::Union => "union",
            NodeKind::Intersection => "intersection",
            NodeKind::Array => "array",
            NodeKind::Tuple => "tuple",
            NodeKind::Record => "record",
            NodeKind::Class => "class",
            NodeKind::Decorator => "decorator",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Root { optional: bool },
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Any,
    Literal(Value),
    Enum { name: String, values: Vec<Value> },
    Union,
    Intersection,
    Array,
    Tuple,
    Record,
    /// A reference to a class registered in the [`TypeCache`].
    Class { name: String },
    Decorator { name: String },
}

/// Predicate run by a decorator node once its parent's base check passed.
pub type ValidatorFn =
    dyn Fn(&Value, &ValidationContext<'_>) -> Result<(), Rejection> + Send + Sync;

#[derive(Clone)]
pub enum Annotation {
    Value(Value),
    Validator(Arc<ValidatorFn>),
    Transformer(Transformer),
}

impl Debug for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Value(value) => write!(f, "Value({value})"),
            Annotation::Validator(_) => write!(f, "Validator(..)"),
            Annotation::Transformer(t) => write!(f, "Transformer(nullable: {})", t.is_nullable()),
        }
    }
}

/// Metadata attached to a node while the schema is built. Read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Annotations(IndexMap<String, Annotation>);

impl Annotations {
    pub fn insert(&mut self, key: impl Into<String>, annotation: Annotation) {
        self.0.insert(key.into(), annotation);
    }

    pub fn get(&self, key: &str) -> Option<&Annotation> {
        self.0.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            Some(Annotation::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn validator(&self) -> Option<&Arc<ValidatorFn>> {
        match self.0.get(VALIDATOR) {
            Some(Annotation::Validator(f)) => Some(f),
            _ => None,
        }
    }

    pub fn transformer(&self) -> Option<&Transformer> {
        match self.0.get(TRANSFORMER) {
            Some(Annotation::Transformer(t)) => Some(t),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A node of the schema tree.
///
/// Children are interpreted per kind: a root has one child, an array one
/// element child, a tuple one child per position, a record a key and a value
/// child, unions and intersections one child per branch. Decorator children
/// can be chained onto any node and run after the node's own check passes.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    shape: Shape,
    children: Vec<SchemaNode>,
    annotations: Annotations,
}

impl SchemaNode {
    pub fn new(shape: Shape, children: Vec<SchemaNode>) -> Self {
        Self {
            shape,
            children,
            annotations: Annotations::default(),
        }
    }

    fn leaf(shape: Shape) -> Self {
        Self::new(shape, Vec::new())
    }

    /// A required root around `child`.
    pub fn root(child: SchemaNode) -> Self {
        Self::new(Shape::Root { optional: false }, vec![child])
    }

    /// A root that accepts `undefined` without looking at `child`.
    pub fn optional(child: SchemaNode) -> Self {
        Self::new(Shape::Root { optional: true }, vec![child])
    }

    pub fn string() -> Self {
        Self::leaf(Shape::String)
    }

    pub fn number() -> Self {
        Self::leaf(Shape::Number)
    }

    pub fn boolean() -> Self {
        Self::leaf(Shape::Boolean)
    }

    pub fn null() -> Self {
        Self::leaf(Shape::Null)
    }

    pub fn undefined() -> Self {
        Self::leaf(Shape::Undefined)
    }

    pub fn any() -> Self {
        Self::leaf(Shape::Any)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::leaf(Shape::Literal(value.into()))
    }

    pub fn enumeration(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self::leaf(Shape::Enum {
            name: name.into(),
            values,
        })
    }

    pub fn union(branches: Vec<SchemaNode>) -> Self {
        Self::new(Shape::Union, branches)
    }

    pub fn intersection(constituents: Vec<SchemaNode>) -> Self {
        Self::new(Shape::Intersection, constituents)
    }

    pub fn array(element: SchemaNode) -> Self {
        Self::new(Shape::Array, vec![element])
    }

    pub fn tuple(elements: Vec<SchemaNode>) -> Self {
        Self::new(Shape::Tuple, elements)
    }

    pub fn record(key: SchemaNode, value: SchemaNode) -> Self {
        Self::new(Shape::Record, vec![key, value])
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::leaf(Shape::Class { name: name.into() })
    }

    /// A standalone decorator node running `predicate`.
    pub fn decorator<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value, &ValidationContext<'_>) -> Result<(), Rejection> + Send + Sync + 'static,
    {
        let mut node = Self::leaf(Shape::Decorator { name: name.into() });
        node.annotations
            .insert(VALIDATOR, Annotation::Validator(Arc::new(predicate)));
        node
    }

    /// Chains a decorator node onto this node's children.
    #[must_use]
    pub fn with(mut self, decorator: SchemaNode) -> Self {
        self.children.push(decorator);
        self
    }

    #[must_use]
    pub fn annotate(mut self, key: impl Into<String>, annotation: Annotation) -> Self {
        self.annotations.insert(key, annotation);
        self
    }

    #[must_use]
    pub fn with_doc(self, doc: impl Into<String>) -> Self {
        self.annotate(DOC, Annotation::Value(Value::String(doc.into())))
    }

    #[must_use]
    pub fn with_transformer(self, transformer: Transformer) -> Self {
        self.annotate(TRANSFORMER, Annotation::Transformer(transformer))
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match &self.shape {
            Shape::Root { .. } => NodeKind::Root,
            Shape::String => NodeKind::String,
            Shape::Number => NodeKind::Number,
            Shape::Boolean => NodeKind::Boolean,
            Shape::Null => NodeKind::Null,
            Shape::Undefined => NodeKind::Undefined,
            Shape::Any => NodeKind::Any,
            Shape::Literal(_) => NodeKind::Literal,
            Shape::Enum { .. } => NodeKind::Enum,
            Shape::Union => NodeKind::Union,
            Shape::Intersection => NodeKind::Intersection,
            Shape::Array => NodeKind::Array,
            Shape::Tuple => NodeKind::Tuple,
            Shape::Record => NodeKind::Record,
            Shape::Class { .. } => NodeKind::Class,
            Shape::Decorator { .. } => NodeKind::Decorator,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn children(&self) -> &[SchemaNode] {
        &self.children
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Children that take part in the node's own algorithm.
    pub fn structural_children(&self) -> impl Iterator<Item = &SchemaNode> {
        self.children
            .iter()
            .filter(|c| c.kind() != NodeKind::Decorator)
    }

    /// Decorator children, in the order they were chained.
    pub fn decorators(&self) -> impl Iterator<Item = &SchemaNode> {
        self.children
            .iter()
            .filter(|c| c.kind() == NodeKind::Decorator)
    }

    /// The class name for class nodes.
    pub fn class_name(&self) -> Option<&str> {
        match &self.shape {
            Shape::Class { name } => Some(name),
            _ => None,
        }
    }

    /// A short type name such as `string[]` or `Record<string, number>`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let structural: Vec<&SchemaNode> = self.structural_children().collect();
        match &self.shape {
            Shape::Root { optional } => {
                let inner = structural
                    .first()
                    .map_or_else(|| "unknown".to_string(), |c| c.display_name());
                if *optional {
                    format!("{inner}?")
                } else {
                    inner
                }
            }
            Shape::Literal(value) => value.to_string(),
            Shape::Enum { name, .. } | Shape::Class { name } | Shape::Decorator { name } => {
                name.clone()
            }
            Shape::Union => join_names(&structural, " | "),
            Shape::Intersection => join_names(&structural, " & "),
            Shape::Array => match structural.first() {
                Some(element) if element.kind() == NodeKind::Union => {
                    format!("({})[]", element.display_name())
                }
                Some(element) => format!("{}[]", element.display_name()),
                None => "array".to_string(),
            },
            Shape::Tuple => format!("[{}]", join_names(&structural, ", ")),
            Shape::Record => format!("Record<{}>", join_names(&structural, ", ")),
            _ => self.kind().as_str().to_string(),
        }
    }
}

fn join_names(nodes: &[&SchemaNode], separator: &str) -> String {
    nodes
        .iter()
        .map(|n| n.display_name())
        .collect::<Vec<_>>()
        .join(separator)
}

/// A declared class property: its name and the root of its type tree.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub tree: SchemaNode,
}

impl Property {
    pub fn new(name: impl Into<String>, tree: SchemaNode) -> Self {
        Self {
            name: name.into(),
            tree,
        }
    }
}

type PropertyProvider = Box<dyn Fn() -> Vec<Property> + Send + Sync>;

/// A class whose property list is produced on first access and memoized.
///
/// Deferring the property list is what lets a class refer to itself: the
/// provider only builds `SchemaNode::class(..)` references, which are looked
/// up again through the [`TypeCache`] when a value is validated.
pub struct ClassDef {
    name: String,
    provider: PropertyProvider,
    properties: OnceCell<Vec<Property>>,
}

impl ClassDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared properties, in declaration order.
    pub fn properties(&self) -> &[Property] {
        self.properties.get_or_init(|| {
            let properties = (self.provider)();
            log::debug!(
                "resolved class tree for `{}` ({} properties)",
                self.name,
                properties.len()
            );
            properties
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.properties.get().is_some()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties().iter().any(|p| p.name == name)
    }
}

impl Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// All classes known to a schema, keyed by their stable name.
#[derive(Debug, Default)]
pub struct TypeCache {
    classes: IndexMap<String, ClassDef>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with a lazy property provider. Re-registering a name
    /// replaces the previous definition.
    pub fn register<F>(&mut self, name: impl Into<String>, provider: F)
    where
        F: Fn() -> Vec<Property> + Send + Sync + 'static,
    {
        let name = name.into();
        self.classes.insert(
            name.clone(),
            ClassDef {
                name,
                provider: Box::new(provider),
                properties: OnceCell::new(),
            },
        );
    }

    /// # Errors
    /// Returns `SchemaError::UnknownClass` if `name` was never registered.
    pub fn class(&self, name: &str) -> Result<&ClassDef, SchemaError> {
        self.classes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownClass {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
