use std::sync::Arc;

use async_trait::async_trait;
use gqlcompose_engine::{
    ConfigurationError, FieldContext, FieldRegistryBuilder, Producer, ProducerError, ProducerInputs, ProducerRegistryBuilder,
    ResolverBuilder, SchemaExtension,
};
use gqlcompose_types::{OutputType, ProducerDefinition, SchemaConfiguration};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::store::{ViewConfig, ViewDisplay, ViewStore};

pub const DEFAULT_DISPLAY: &str = "default";

/// A view prepared for one display with its handlers initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewExecutable {
    pub view_id: String,
    pub label: Option<String>,
    pub display_id: String,
    pub display: ViewDisplay,
}

impl ViewExecutable {
    /// Selects `display_id`, or the default display when none is given.
    ///
    /// An unknown display leaves the default display selected. Only a view
    /// without a default display is rejected.
    pub fn new(view: &ViewConfig, display_id: Option<&str>) -> Result<Self, String> {
        let requested = display_id.unwrap_or(DEFAULT_DISPLAY);
        let (display_id, display) = match view.displays.get(requested) {
            Some(display) => (requested, display),
            None => {
                let Some(display) = view.displays.get(DEFAULT_DISPLAY) else {
                    return Err(format!("view '{}' has no display '{requested}'", view.id));
                };
                warn!(view = %view.id, display = requested, "unknown view display, keeping the default display");
                (DEFAULT_DISPLAY, display)
            }
        };
        let fallback = view.displays.get(DEFAULT_DISPLAY);

        let initialised = ViewDisplay {
            title: display.title.clone().or_else(|| fallback.and_then(|default| default.title.clone())),
            plugin: display.plugin.clone(),
            fields: inherited(&display.fields, fallback.map(|default| default.fields.as_slice())),
            filters: inherited(&display.filters, fallback.map(|default| default.filters.as_slice())),
            sorts: inherited(&display.sorts, fallback.map(|default| default.sorts.as_slice())),
            cache_contexts: inherited(&display.cache_contexts, fallback.map(|default| default.cache_contexts.as_slice())),
        };

        Ok(Self {
            view_id: view.id.clone(),
            label: view.label.clone(),
            display_id: display_id.to_string(),
            display: initialised,
        })
    }

    pub fn cache_tag(&self) -> String {
        format!("config:views.view.{}", self.view_id)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "__typename": "ViewExecutable",
            "id": self.view_id,
            "label": self.label,
            "displayId": self.display_id,
            "title": self.display.title,
            "handlers": {
                "field": self.display.fields,
                "filter": self.display.filters,
                "sort": self.display.sorts,
            },
        })
    }
}

// Handlers and cache contexts a display leaves empty come from the default display.
fn inherited(own: &[String], fallback: Option<&[String]>) -> Vec<String> {
    match fallback {
        Some(shared) if own.is_empty() => shared.to_vec(),
        _ => own.to_vec(),
    }
}

pub struct GetViewExecutable {
    definition: ProducerDefinition,
    store: Arc<dyn ViewStore>,
}

impl GetViewExecutable {
    pub const ID: &'static str = "view_executable";

    pub fn new(store: Arc<dyn ViewStore>) -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID)
                .with_description("Prepares a view display for execution")
                .required("view")
                .optional("displayId")
                .returns(OutputType::object("ViewExecutable")),
            store,
        }
    }
}

#[async_trait]
impl Producer for GetViewExecutable {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        let view_id = inputs.require_identifier("view")?;
        let Some(view) = self.store.load_view(&view_id).await? else {
            debug!(view = %view_id, "view not found");
            return Ok(Value::Null);
        };

        let executable =
            ViewExecutable::new(&view, inputs.str("displayId")).map_err(|message| ProducerError::invalid_argument(Self::ID, message))?;
        context.add_cache_tag(executable.cache_tag());
        for cache_context in &executable.display.cache_contexts {
            context.add_cache_context(cache_context.clone());
        }
        Ok(executable.to_value())
    }
}

/// `Query.view(id, displayId)`.
pub struct ViewsExtension {
    store: Arc<dyn ViewStore>,
}

impl ViewsExtension {
    pub const ID: &'static str = "views";

    pub fn new(store: Arc<dyn ViewStore>) -> Self {
        Self { store }
    }
}

impl SchemaExtension for ViewsExtension {
    fn id(&self) -> &str {
        Self::ID
    }

    fn entity_type_dependencies(&self) -> &[&str] {
        &["view"]
    }

    fn register_producers(&self, producers: &mut ProducerRegistryBuilder) -> Result<(), ConfigurationError> {
        producers.register(Arc::new(GetViewExecutable::new(Arc::clone(&self.store))))
    }

    fn register_resolvers(&self, registry: &mut FieldRegistryBuilder, _configuration: &SchemaConfiguration) -> Result<(), ConfigurationError> {
        let builder = ResolverBuilder::new();
        registry.add_field_resolver(
            "Query",
            "view",
            &builder.compose(
                builder
                    .produce(GetViewExecutable::ID)
                    .map("view", builder.from_argument("id"))
                    .map("displayId", builder.from_argument("displayId")),
            ),
        );
        Ok(())
    }
}
