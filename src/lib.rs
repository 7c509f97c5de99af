pub mod api;
pub mod constraints;
pub mod error;
pub mod formatter;
pub mod options;
pub mod schema;
pub mod transformer;
pub mod utils;
pub mod validator;
pub mod value;

pub use api::SchemaEngine;
pub use error::{Error, NodeValidationError, Reason, Rejection, SchemaError};
pub use formatter::{format, ErrorReport, FormattedError, Translations};
pub use options::Options;
pub use schema::{NodeKind, Property, SchemaNode, TypeCache};
pub use transformer::{transform, Conversion, Factories, Output, Transformation, Transformer};
pub use validator::{validate, Match, Validation, ValidationContext};
pub use value::Value;
