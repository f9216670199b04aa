use std::sync::Arc;

use async_trait::async_trait;
use gqlcompose_engine::{
    ConfigurationError, FieldContext, FieldRegistryBuilder, Producer, ProducerError, ProducerInputs, ProducerRegistryBuilder,
    ResolverBuilder, SchemaExtension, cache::USER_PERMISSIONS_CONTEXT,
};
use gqlcompose_types::{EnvironmentIndicator, OutputType, ProducerDefinition, SchemaConfiguration};
use serde_json::{Value, json};

pub const ACCESS_ENVIRONMENT_INDICATOR: &str = "access environment indicator";

/// The configured environment indicator, visible to principals allowed to see it.
pub struct ActiveEnvironment {
    definition: ProducerDefinition,
    indicator: Option<EnvironmentIndicator>,
}

impl ActiveEnvironment {
    pub const ID: &'static str = "active_environment";

    pub fn new(indicator: Option<EnvironmentIndicator>) -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID).returns(OutputType::object("EnvironmentIndicator")),
            indicator,
        }
    }
}

#[async_trait]
impl Producer for ActiveEnvironment {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, _inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        let Some(indicator) = self.indicator.as_ref().filter(|indicator| !indicator.name.is_empty()) else {
            return Ok(Value::Null);
        };

        context.add_cache_context(USER_PERMISSIONS_CONTEXT);
        context.add_cache_tag("config:environment_indicator.indicator");
        if !context.has_capability(ACCESS_ENVIRONMENT_INDICATOR) {
            return Ok(Value::Null);
        }

        Ok(json!({
            "__typename": "EnvironmentIndicator",
            "name": indicator.name,
            "fgColor": indicator.fg_color,
            "bgColor": indicator.bg_color,
        }))
    }
}

/// `Query.activeEnvironment`.
pub struct EnvironmentIndicatorExtension {
    indicator: Option<EnvironmentIndicator>,
}

impl EnvironmentIndicatorExtension {
    pub const ID: &'static str = "environment_indicator";

    pub fn new(indicator: Option<EnvironmentIndicator>) -> Self {
        Self { indicator }
    }
}

impl SchemaExtension for EnvironmentIndicatorExtension {
    fn id(&self) -> &str {
        Self::ID
    }

    fn register_producers(&self, producers: &mut ProducerRegistryBuilder) -> Result<(), ConfigurationError> {
        producers.register(Arc::new(ActiveEnvironment::new(self.indicator.clone())))
    }

    fn register_resolvers(&self, registry: &mut FieldRegistryBuilder, _configuration: &SchemaConfiguration) -> Result<(), ConfigurationError> {
        let builder = ResolverBuilder::new();
        registry.add_field_resolver("Query", "activeEnvironment", &builder.compose(builder.produce(ActiveEnvironment::ID)));
        Ok(())
    }
}
