//! Translatable config pages exposed as `Query.globalConfig`.

use std::sync::Arc;

use async_trait::async_trait;
use gqlcompose_engine::{
    ConfigurationError, FieldContext, FieldRegistryBuilder, Producer, ProducerError, ProducerInputs, ProducerRegistryBuilder,
    ResolverBuilder, SchemaExtension, context::LANGUAGE_CONTEXT,
};
use gqlcompose_types::{ProducerDefinition, SchemaConfiguration};
use serde_json::Value;
use tracing::debug;

use crate::{
    language::CurrentLanguage,
    store::{CONFIG_PAGES_ENTITY_TYPE, ConfigPageStore},
};

/// Loads the config page of a type in the requested language.
///
/// The requested language (or the page's own language when none is given)
/// becomes the `language` context value, so fields below the page resolve in
/// that language even when the page itself is untranslated.
pub struct TranslatableConfigPage {
    definition: ProducerDefinition,
    store: Arc<dyn ConfigPageStore>,
}

impl TranslatableConfigPage {
    pub const ID: &'static str = "translatable_config_page";

    pub fn new(store: Arc<dyn ConfigPageStore>) -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID)
                .with_description("Loads a translatable config page by type")
                .required("type")
                .required("language"),
            store,
        }
    }
}

#[async_trait]
impl Producer for TranslatableConfigPage {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        let page_type = inputs.require_str("type")?;
        let Some(mut page) = self.store.load_config(page_type).await? else {
            debug!(page_type, "config page not found");
            return Ok(Value::Null);
        };

        let language = inputs.str("language");
        if let Some(language) = language
            && let Some(translation) = page.translation(language)
        {
            page = translation;
            context.add_cache_context(format!("static:language:{language}"));
        }

        let context_language = language.map(str::to_string).unwrap_or_else(|| page.langcode.clone());
        context.set_context_value(LANGUAGE_CONTEXT, Value::String(context_language));
        context.add_cache_tag(page.cache_tag());
        Ok(page.to_value())
    }
}

/// `Query.globalConfig`: the `global` config page in the current language.
pub struct TranslatableConfigPagesExtension {
    store: Arc<dyn ConfigPageStore>,
}

impl TranslatableConfigPagesExtension {
    pub const ID: &'static str = "translatable_config_pages";

    pub fn new(store: Arc<dyn ConfigPageStore>) -> Self {
        Self { store }
    }
}

impl SchemaExtension for TranslatableConfigPagesExtension {
    fn id(&self) -> &str {
        Self::ID
    }

    fn entity_type_dependencies(&self) -> &[&str] {
        &[CONFIG_PAGES_ENTITY_TYPE]
    }

    fn register_producers(&self, producers: &mut ProducerRegistryBuilder) -> Result<(), ConfigurationError> {
        producers.register(Arc::new(TranslatableConfigPage::new(Arc::clone(&self.store))))
    }

    fn register_resolvers(&self, registry: &mut FieldRegistryBuilder, _configuration: &SchemaConfiguration) -> Result<(), ConfigurationError> {
        let builder = ResolverBuilder::new();
        registry.add_field_resolver(
            "Query",
            "globalConfig",
            &builder.compose(
                builder
                    .produce(TranslatableConfigPage::ID)
                    .map("type", builder.from_value("global"))
                    .map("language", builder.produce(CurrentLanguage::ID)),
            ),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Entity, MemoryStore};
    use gqlcompose_engine::{GrantedCapabilities, Principal, RequestContext};
    use serde_json::json;

    fn store() -> Arc<MemoryStore> {
        let page: Entity = serde_json::from_value(json!({
            "entity_type": "translatable_config_pages",
            "id": "4",
            "bundle": "global",
            "langcode": "en",
            "label": "Global",
            "fields": { "field_footer": [{ "value": "Footer" }] },
            "translations": { "de": { "fields": { "field_footer": [{ "value": "Fusszeile" }] } } }
        }))
        .expect("page");
        Arc::new(MemoryStore {
            entities: vec![page],
            ..MemoryStore::default()
        })
    }

    fn context() -> FieldContext {
        FieldContext::new(Arc::new(RequestContext::new(Principal::anonymous(), "en")), Arc::new(GrantedCapabilities))
    }

    fn inputs(page_type: &str, language: Value) -> ProducerInputs {
        ProducerInputs::new(TranslatableConfigPage::ID)
            .with("type", json!(page_type))
            .with("language", language)
    }

    #[tokio::test]
    async fn switches_to_translation_and_sets_context_language() {
        let producer = TranslatableConfigPage::new(store());
        let mut context = context();

        let page = producer.invoke(&inputs("global", json!("de")), &mut context).await.expect("page");
        assert_eq!(page["fields"]["field_footer"][0]["value"], json!("Fusszeile"));
        assert_eq!(context.context_value(LANGUAGE_CONTEXT), json!("de"));
        assert!(context.cache.cache_contexts.contains("static:language:de"));
        assert!(context.cache.cache_tags.contains("translatable_config_pages:4"));
    }

    #[tokio::test]
    async fn untranslated_language_still_becomes_context_language() {
        let producer = TranslatableConfigPage::new(store());
        let mut context = context();

        let page = producer.invoke(&inputs("global", json!("fr")), &mut context).await.expect("page");
        assert_eq!(page["langcode"], json!("en"));
        assert_eq!(context.context_value(LANGUAGE_CONTEXT), json!("fr"));
        assert!(!context.cache.cache_contexts.iter().any(|context| context.starts_with("static:language")));
    }

    #[tokio::test]
    async fn missing_page_resolves_to_null() {
        let producer = TranslatableConfigPage::new(store());
        let mut context = context();
        let page = producer.invoke(&inputs("footer", json!("en")), &mut context).await.expect("page");
        assert_eq!(page, Value::Null);
        assert_eq!(context.context_value(LANGUAGE_CONTEXT), json!("en"));
        assert!(context.cache.is_empty());
    }
}
