use crate::error::{Error, SchemaError, ValidationFailed};
use crate::formatter::{ErrorReport, Translations};
use crate::options::Options;
use crate::schema::{SchemaNode, TypeCache};
use crate::transformer::{transform, Factories, Output, Transformation};
use crate::validator::{validate, Match, Validation};
use crate::value::Value;

/// Everything needed to check and convert values against one schema: the
/// registered classes, their factories, the options and the message table.
///
/// The engine is read-only once built and can serve any number of calls.
#[derive(Debug, Default)]
pub struct SchemaEngine {
    pub cache: TypeCache,
    pub factories: Factories,
    pub options: Options,
    pub translations: Translations,
}

impl SchemaEngine {
    pub fn new(cache: TypeCache) -> Self {
        Self {
            cache,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_factories(mut self, factories: Factories) -> Self {
        self.factories = factories;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_translations(mut self, translations: Translations) -> Self {
        self.translations = translations;
        self
    }

    /// Validates `value` against `node`.
    ///
    /// # Errors
    /// Returns a `SchemaError` if the schema is broken; bad data is a
    /// `Validation::Failure`.
    pub fn validate<'a>(
        &'a self,
        node: &'a SchemaNode,
        value: &'a Value,
    ) -> Result<Validation<'a>, SchemaError> {
        validate(node, value, &self.cache, &self.options)
    }

    /// Validates and turns a failure into `Error::Invalid` carrying the report.
    ///
    /// # Errors
    /// Returns `Error::Invalid` for non-conforming data and `Error::Schema`
    /// for a broken schema.
    pub fn check<'a>(&'a self, node: &'a SchemaNode, value: &'a Value) -> Result<Match<'a>, Error> {
        match self.validate(node, value)? {
            Validation::Success(matched) => Ok(matched),
            Validation::Failure(error) => {
                let report = self.translations.format(&error);
                Err(ValidationFailed { error, report }.into())
            }
        }
    }

    /// The formatted report for `value`, or `None` when it conforms.
    ///
    /// # Errors
    /// Returns a `SchemaError` if the schema is broken.
    pub fn report(
        &self,
        node: &SchemaNode,
        value: &Value,
    ) -> Result<Option<ErrorReport>, SchemaError> {
        Ok(self
            .validate(node, value)?
            .error()
            .map(|error| self.translations.format(error)))
    }

    /// Validates and transforms `value`.
    ///
    /// # Errors
    /// See [`transform`].
    pub async fn transform(
        &self,
        node: &SchemaNode,
        value: &Value,
    ) -> Result<Transformation, SchemaError> {
        transform(node, value, &self.cache, &self.factories, &self.options).await
    }

    /// Like [`SchemaEngine::transform`], with failures raised as `Error::Invalid`.
    ///
    /// # Errors
    /// Returns `Error::Invalid` for non-conforming data or rejected
    /// conversions and `Error::Schema` for setup problems.
    pub async fn transform_or_err(
        &self,
        node: &SchemaNode,
        value: &Value,
    ) -> Result<Output, Error> {
        match self.transform(node, value).await? {
            Transformation::Success(output) => Ok(output),
            Transformation::Failure(error) => {
                let report = self.translations.format(&error);
                Err(ValidationFailed { error, report }.into())
            }
        }
    }
}
