use std::sync::Arc;

use async_trait::async_trait;
use gqlcompose_engine::{
    ConfigurationError, FieldContext, FieldRegistryBuilder, Producer, ProducerError, ProducerInputs, ProducerRegistryBuilder,
    SchemaExtension, cache::LANGUAGE_INTERFACE_CONTEXT, context::LANGUAGE_CONTEXT,
};
use gqlcompose_types::{OutputType, ProducerDefinition, SchemaConfiguration};
use serde_json::Value;

/// Resolves the language fields are rendered in.
///
/// A `language` context value set by an earlier producer wins over the
/// negotiated interface language of the request.
#[derive(Debug)]
pub struct CurrentLanguage {
    definition: ProducerDefinition,
}

impl CurrentLanguage {
    pub const ID: &'static str = "current_language";

    pub fn new() -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID)
                .with_description("The current interface language")
                .returns(OutputType::scalar("String")),
        }
    }
}

impl Default for CurrentLanguage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for CurrentLanguage {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, _inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        context.add_cache_context(LANGUAGE_INTERFACE_CONTEXT);
        Ok(context.context_value(LANGUAGE_CONTEXT))
    }
}

/// Registers the language producers every other extension may bind.
///
/// Contributes no fields of its own.
#[derive(Debug, Default)]
pub struct LanguageExtension;

impl LanguageExtension {
    pub const ID: &'static str = "language";
}

impl SchemaExtension for LanguageExtension {
    fn id(&self) -> &str {
        Self::ID
    }

    fn register_producers(&self, producers: &mut ProducerRegistryBuilder) -> Result<(), ConfigurationError> {
        producers.register(Arc::new(CurrentLanguage::new()))
    }

    fn register_resolvers(&self, _registry: &mut FieldRegistryBuilder, _configuration: &SchemaConfiguration) -> Result<(), ConfigurationError> {
        Ok(())
    }
}
