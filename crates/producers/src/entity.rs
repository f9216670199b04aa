//! Entity producers and the core entity schema.

use std::sync::Arc;

use async_trait::async_trait;
use gqlcompose_engine::{
    ConfigurationError, FieldContext, FieldRegistryBuilder, Producer, ProducerError, ProducerInputs, ProducerRegistryBuilder,
    ResolverBuilder, SchemaExtension, cache::USER_PERMISSIONS_CONTEXT, context::LANGUAGE_CONTEXT,
};
use gqlcompose_types::{BindingSpec, ProducerDefinition, SchemaConfiguration};
use heck::ToLowerCamelCase;
use serde_json::Value;
use tracing::debug;

use crate::{
    date::DateTimeValue,
    store::{DateStorage, EntityStore, type_name},
};

/// Base properties stored as unix timestamps.
const TIMESTAMP_PROPERTIES: [&str; 2] = ["created", "changed"];

/// Loads an entity by type and id, switching to the requested translation.
///
/// An entity carrying a view capability resolves to null for principals
/// without it.
pub struct EntityLoad {
    definition: ProducerDefinition,
    store: Arc<dyn EntityStore>,
}

impl EntityLoad {
    pub const ID: &'static str = "entity_load";

    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID)
                .with_description("Loads a single entity")
                .required("type")
                .required("id")
                .optional_with_default("language", BindingSpec::context(LANGUAGE_CONTEXT))
                .memoized(),
            store,
        }
    }
}

#[async_trait]
impl Producer for EntityLoad {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        let entity_type = inputs.require_str("type")?;
        let id = inputs.require_identifier("id")?;

        let Some(mut entity) = self.store.load(entity_type, &id).await? else {
            debug!(entity_type, entity_id = %id, "entity not found");
            return Ok(Value::Null);
        };

        if let Some(capability) = entity.capability.as_deref() {
            context.add_cache_context(USER_PERMISSIONS_CONTEXT);
            if !context.has_capability(capability) {
                debug!(entity_type, entity_id = %id, capability, "entity view access denied");
                return Ok(Value::Null);
            }
        }

        if let Some(language) = inputs.str("language")
            && let Some(translation) = entity.translation(language)
        {
            entity = translation;
            context.add_cache_context(format!("static:language:{language}"));
        }

        context.add_cache_tag(entity.cache_tag());
        Ok(entity.to_value())
    }
}

/// Reads a base property of an entity value.
#[derive(Debug)]
pub struct EntityProperty {
    definition: ProducerDefinition,
}

impl EntityProperty {
    pub const ID: &'static str = "entity_property";

    pub fn new() -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID).required("entity").required("property"),
        }
    }
}

impl Default for EntityProperty {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for EntityProperty {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, _context: &mut FieldContext) -> Result<Value, ProducerError> {
        let Some(entity) = inputs.require("entity")?.as_object() else {
            return Err(ProducerError::invalid_argument(Self::ID, "input 'entity' must be an entity"));
        };
        let property = inputs.require_str("property")?;

        let value = match property {
            // Loaded entities are always persisted.
            "isNew" => Value::Bool(false),
            "getConfigTarget" => entity.get("uuid").or_else(|| entity.get("id")).cloned().unwrap_or(Value::Null),
            _ => entity.get(property).cloned().unwrap_or(Value::Null),
        };
        Ok(value)
    }
}

/// Reads a configurable field of an entity value.
///
/// With `value_only` the item list collapses to its `value` properties: null
/// for an empty field, the single value for one item, a list otherwise.
#[derive(Debug)]
pub struct EntityField {
    definition: ProducerDefinition,
}

impl EntityField {
    pub const ID: &'static str = "entity_field";

    pub fn new() -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID)
                .required("entity")
                .required("field")
                .optional_with_default("value_only", BindingSpec::value(false)),
        }
    }
}

impl Default for EntityField {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for EntityField {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, _context: &mut FieldContext) -> Result<Value, ProducerError> {
        let entity = inputs.require("entity")?;
        let field = inputs.require_str("field")?;
        let items = entity.get("fields").and_then(|fields| fields.get(field)).cloned().unwrap_or(Value::Null);
        if !inputs.bool("value_only") {
            return Ok(items);
        }

        let values: Vec<Value> = match items {
            Value::Array(items) => items.into_iter().map(item_value).collect(),
            Value::Null => Vec::new(),
            single => vec![item_value(single)],
        };
        Ok(collapse_items(values))
    }
}

/// Null for no items, the item itself for one, a list otherwise.
pub(crate) fn collapse_items(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    }
}

fn item_value(item: Value) -> Value {
    match item {
        Value::Object(mut object) => object.remove("value").unwrap_or(Value::Object(object)),
        other => other,
    }
}

/// Entity loaders plus base, configurable and value fields for every enabled
/// entity type and bundle.
pub struct CoreEntitySchemaExtension {
    store: Arc<dyn EntityStore>,
}

impl CoreEntitySchemaExtension {
    pub const ID: &'static str = "core_entity";

    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

impl SchemaExtension for CoreEntitySchemaExtension {
    fn id(&self) -> &str {
        Self::ID
    }

    fn register_producers(&self, producers: &mut ProducerRegistryBuilder) -> Result<(), ConfigurationError> {
        producers.register(Arc::new(EntityLoad::new(Arc::clone(&self.store))))?;
        producers.register(Arc::new(EntityProperty::new()))?;
        producers.register(Arc::new(EntityField::new()))?;
        producers.register(Arc::new(DateTimeValue::new()))
    }

    fn register_resolvers(&self, registry: &mut FieldRegistryBuilder, configuration: &SchemaConfiguration) -> Result<(), ConfigurationError> {
        let builder = ResolverBuilder::new();

        registry.add_field_resolver(
            "Query",
            "entityById",
            &builder.compose(
                builder
                    .produce(EntityLoad::ID)
                    .map("type", builder.from_argument("entityType"))
                    .map("id", builder.from_argument("id"))
                    .map("language", builder.from_argument("langcode")),
            ),
        );

        let base_fields = configuration.enabled_entity_fields();
        for entity_type in configuration.enabled_entity_types() {
            registry.add_field_resolver(
                "Query",
                &format!("{}ById", entity_type.to_lower_camel_case()),
                &builder.compose(
                    builder
                        .produce(EntityLoad::ID)
                        .map("type", builder.from_value(entity_type))
                        .map("id", builder.from_argument("id"))
                        .map("language", builder.from_argument("langcode")),
                ),
            );

            let mut type_names = vec![type_name(entity_type, None)];
            type_names.extend(
                configuration
                    .enabled_bundles(entity_type)
                    .into_iter()
                    .filter(|bundle| *bundle != entity_type)
                    .map(|bundle| type_name(entity_type, Some(bundle))),
            );

            let fields = configuration.fields.get(entity_type).cloned().unwrap_or_default();
            for parent_type in &type_names {
                for property in &base_fields {
                    let read = builder
                        .produce(EntityProperty::ID)
                        .map("entity", builder.from_parent())
                        .map("property", builder.from_value(*property));
                    let call = if TIMESTAMP_PROPERTIES.contains(property) {
                        builder.produce(DateTimeValue::ID).map("value", read)
                    } else {
                        read
                    };
                    registry.add_field_resolver(parent_type, property, &builder.compose(call));
                }

                for field in &fields {
                    let field_name = field.to_lower_camel_case();
                    let raw = builder
                        .produce(EntityField::ID)
                        .map("entity", builder.from_parent())
                        .map("field", builder.from_value(field.as_str()));
                    if let Some(storage) = self.store.date_storage(entity_type, field) {
                        let dates = builder
                            .produce(DateTimeValue::ID)
                            .map("value", raw.clone())
                            .map("range", builder.from_value(storage == DateStorage::Daterange));
                        registry.add_field_resolver(parent_type, &field_name, &builder.compose(dates));
                        if configuration.should_generate_value_fields() {
                            registry.add_field_resolver(parent_type, &format!("{field_name}RawField"), &builder.compose(raw));
                        }
                    } else if configuration.should_generate_value_fields() {
                        registry.add_field_resolver(
                            parent_type,
                            &field_name,
                            &builder.compose(raw.clone().map("value_only", builder.from_value(true))),
                        );
                        registry.add_field_resolver(parent_type, &format!("{field_name}RawField"), &builder.compose(raw));
                    } else {
                        registry.add_field_resolver(parent_type, &field_name, &builder.compose(raw));
                    }
                }
            }
        }

        debug!(
            entity_type_count = configuration.enabled_entity_types().len(),
            value_fields = configuration.should_generate_value_fields(),
            "core entity resolvers registered"
        );
        Ok(())
    }
}
