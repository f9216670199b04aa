//! Field registry and schema assembly.
//!
//! A [`Schema`] is built in two phases. Every extension first registers its
//! producers; the resulting [`ProducerRegistry`] is frozen before any field
//! pipeline is compiled against it. Every configuration error found along the
//! way is collected so one build reports all of them.

use std::{fmt, sync::Arc};

use gqlcompose_types::{PipelineSpec, SchemaConfiguration, SchemaDocument, split_field_key};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
    error::{ConfigurationError, SchemaBuildError},
    pipeline::{Pipeline, compile_pipeline},
    producer::{ProducerRegistry, ProducerRegistryBuilder},
};

/// Contributes producers and field pipelines to a schema.
///
/// Extensions are registered explicitly at startup; there is no discovery.
pub trait SchemaExtension: Send + Sync {
    fn id(&self) -> &str;

    /// Entity types that must be enabled in the schema configuration.
    fn entity_type_dependencies(&self) -> &[&str] {
        &[]
    }

    fn register_producers(&self, _producers: &mut ProducerRegistryBuilder) -> Result<(), ConfigurationError> {
        Ok(())
    }

    fn register_resolvers(&self, registry: &mut FieldRegistryBuilder, configuration: &SchemaConfiguration) -> Result<(), ConfigurationError>;
}

/// Collects compiled field pipelines. Later registrations of the same key win.
pub struct FieldRegistryBuilder {
    producers: ProducerRegistry,
    fields: IndexMap<String, IndexMap<String, Pipeline>>,
    errors: Vec<ConfigurationError>,
}

impl FieldRegistryBuilder {
    pub fn new(producers: ProducerRegistry) -> Self {
        Self {
            producers,
            fields: IndexMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn producers(&self) -> &ProducerRegistry {
        &self.producers
    }

    /// Compiles `spec` and registers it for `parent_type.field_name`.
    ///
    /// Compile failures are recorded and reported by [`FieldRegistryBuilder::build`].
    pub fn add_field_resolver(&mut self, parent_type: &str, field_name: &str, spec: &PipelineSpec) -> &mut Self {
        match compile_pipeline(&self.producers, parent_type, field_name, spec) {
            Ok(pipeline) => self.register(parent_type, field_name, pipeline),
            Err(error) => {
                debug!(parent_type, field_name, error = %error, "field pipeline rejected");
                self.errors.push(error);
                self
            }
        }
    }

    /// Registers an already compiled pipeline.
    pub fn register(&mut self, parent_type: &str, field_name: &str, pipeline: Pipeline) -> &mut Self {
        let previous = self
            .fields
            .entry(parent_type.to_string())
            .or_default()
            .insert(field_name.to_string(), pipeline);
        if previous.is_some() {
            warn!(parent_type, field_name, "field resolver replaced by a later registration");
        }
        self
    }

    /// Registers every `Type.field` pipeline of a schema document.
    pub fn add_document(&mut self, document: &SchemaDocument) -> &mut Self {
        for (key, spec) in &document.fields {
            match split_field_key(key) {
                Some((parent_type, field_name)) => {
                    self.add_field_resolver(parent_type, field_name, spec);
                }
                None => self.errors.push(ConfigurationError::InvalidFieldKey { key: key.clone() }),
            }
        }
        self
    }

    pub fn record_error(&mut self, error: ConfigurationError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[ConfigurationError] {
        &self.errors
    }

    pub fn build(self) -> Result<FieldRegistry, SchemaBuildError> {
        if !self.errors.is_empty() {
            return Err(SchemaBuildError { errors: self.errors });
        }
        Ok(FieldRegistry { fields: self.fields })
    }
}

/// Lookup from `(parent type, field name)` to a compiled pipeline.
#[derive(Default)]
pub struct FieldRegistry {
    fields: IndexMap<String, IndexMap<String, Pipeline>>,
}

impl fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRegistry").field("field_count", &self.len()).finish()
    }
}

impl FieldRegistry {
    /// `None` means the field falls back to default property resolution.
    pub fn resolve(&self, parent_type: &str, field_name: &str) -> Option<&Pipeline> {
        self.fields.get(parent_type)?.get(field_name)
    }

    /// Registered pipelines in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Pipeline)> {
        self.fields.iter().flat_map(|(parent_type, fields)| {
            fields
                .iter()
                .map(move |(field_name, pipeline)| (parent_type.as_str(), field_name.as_str(), pipeline))
        })
    }

    pub fn len(&self) -> usize {
        self.fields.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extension that serves the pipelines of a declarative schema document.
#[derive(Debug, Clone)]
pub struct DocumentSchemaExtension {
    id: String,
    document: SchemaDocument,
}

impl DocumentSchemaExtension {
    pub fn new(id: impl Into<String>, document: SchemaDocument) -> Self {
        Self { id: id.into(), document }
    }
}

impl SchemaExtension for DocumentSchemaExtension {
    fn id(&self) -> &str {
        &self.id
    }

    fn register_resolvers(&self, registry: &mut FieldRegistryBuilder, _configuration: &SchemaConfiguration) -> Result<(), ConfigurationError> {
        registry.add_document(&self.document);
        Ok(())
    }
}

/// Immutable schema: the producer registry plus every compiled field pipeline.
#[derive(Debug)]
pub struct Schema {
    producers: ProducerRegistry,
    fields: FieldRegistry,
}

impl Schema {
    /// Builds a schema from extensions applied in order.
    pub fn build(extensions: &[Arc<dyn SchemaExtension>], configuration: &SchemaConfiguration) -> Result<Self, SchemaBuildError> {
        let mut errors = Vec::new();

        for extension in extensions {
            for entity_type in extension.entity_type_dependencies() {
                if !configuration.is_entity_type_enabled(entity_type) {
                    errors.push(ConfigurationError::MissingEntityTypeDependency {
                        extension: extension.id().to_string(),
                        entity_type: entity_type.to_string(),
                    });
                }
            }
        }

        let mut producer_builder = ProducerRegistryBuilder::new();
        for extension in extensions {
            if let Err(error) = extension.register_producers(&mut producer_builder) {
                errors.push(error);
            }
        }
        let producers = producer_builder.build();

        let mut field_builder = FieldRegistryBuilder::new(producers.clone());
        for extension in extensions {
            if let Err(error) = extension.register_resolvers(&mut field_builder, configuration) {
                field_builder.record_error(error);
            }
        }

        let fields = match field_builder.build() {
            Ok(fields) => fields,
            Err(build_error) => {
                errors.extend(build_error.errors);
                FieldRegistry::default()
            }
        };

        if !errors.is_empty() {
            warn!(error_count = errors.len(), "schema build failed");
            return Err(SchemaBuildError { errors });
        }

        info!(
            extension_count = extensions.len(),
            producer_count = producers.len(),
            field_count = fields.len(),
            "schema built"
        );
        Ok(Self { producers, fields })
    }

    pub fn producers(&self) -> &ProducerRegistry {
        &self.producers
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub fn resolve(&self, parent_type: &str, field_name: &str) -> Option<&Pipeline> {
        self.fields.resolve(parent_type, field_name)
    }
}
