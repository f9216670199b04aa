//! Collaborator services the built-in producers read from, plus an in-memory
//! implementation backed by a JSON fixture.

use std::{fs, path::Path};

use anyhow::Context;
use async_trait::async_trait;
use gqlcompose_engine::UpstreamError;
use heck::ToUpperCamelCase;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Entity type holding translatable config pages; the bundle is the page type.
pub const CONFIG_PAGES_ENTITY_TYPE: &str = "translatable_config_pages";

/// A content or config entity with its stored field values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub entity_type: String,
    pub id: String,
    #[serde(default)]
    pub bundle: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default = "default_langcode")]
    pub langcode: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Unix timestamps of creation and last change.
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub changed: Option<i64>,
    /// Capability a principal needs to view the entity.
    #[serde(default)]
    pub capability: Option<String>,
    /// Field item lists keyed by machine name, e.g. `body: [{ value: ... }]`.
    #[serde(default)]
    pub fields: IndexMap<String, Value>,
    #[serde(default)]
    pub translations: IndexMap<String, EntityTranslation>,
}

fn default_langcode() -> String {
    "en".to_string()
}

/// Values overridden by one translation of an entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityTranslation {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, Value>,
}

impl Entity {
    /// Schema type name: entity type plus bundle, e.g. `NodeArticle`.
    pub fn type_name(&self) -> String {
        match self.bundle.as_deref() {
            Some(bundle) if bundle != self.entity_type => type_name(&self.entity_type, Some(bundle)),
            _ => type_name(&self.entity_type, None),
        }
    }

    pub fn has_translation(&self, language: &str) -> bool {
        self.langcode == language || self.translations.contains_key(language)
    }

    /// The entity as seen in `language`; untranslated values fall back to the original.
    pub fn translation(&self, language: &str) -> Option<Entity> {
        if self.langcode == language {
            return Some(self.clone());
        }
        let translation = self.translations.get(language)?;
        let mut translated = self.clone();
        translated.langcode = language.to_string();
        if translation.label.is_some() {
            translated.label = translation.label.clone();
        }
        for (field, value) in &translation.fields {
            translated.fields.insert(field.clone(), value.clone());
        }
        translated.translations.clear();
        Some(translated)
    }

    pub fn cache_tag(&self) -> String {
        format!("{}:{}", self.entity_type, self.id)
    }

    /// JSON shape handed to pipelines and returned to clients.
    pub fn to_value(&self) -> Value {
        let mut object = JsonMap::new();
        object.insert("__typename".into(), Value::String(self.type_name()));
        object.insert("id".into(), Value::String(self.id.clone()));
        object.insert("entityTypeId".into(), Value::String(self.entity_type.clone()));
        if let Some(bundle) = &self.bundle {
            object.insert("bundle".into(), Value::String(bundle.clone()));
        }
        if let Some(uuid) = &self.uuid {
            object.insert("uuid".into(), Value::String(uuid.clone()));
        }
        object.insert("langcode".into(), Value::String(self.langcode.clone()));
        object.insert("label".into(), self.label.clone().map(Value::String).unwrap_or(Value::Null));
        for (property, timestamp) in [("created", self.created), ("changed", self.changed)] {
            if let Some(timestamp) = timestamp {
                object.insert(property.into(), Value::from(timestamp));
            }
        }
        object.insert(
            "fields".into(),
            Value::Object(self.fields.iter().map(|(name, value)| (name.clone(), value.clone())).collect()),
        );
        Value::Object(object)
    }
}

/// Schema type name for an entity type, optionally narrowed to a bundle.
pub fn type_name(entity_type: &str, bundle: Option<&str>) -> String {
    match bundle {
        Some(bundle) => format!("{}{}", entity_type.to_upper_camel_case(), bundle.to_upper_camel_case()),
        None => entity_type.to_upper_camel_case(),
    }
}

/// How a date field stores its items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DateStorage {
    /// Unix timestamps, e.g. `created`.
    Timestamp,
    /// `value` holding a date (`2025-05-25`) or a UTC date-time.
    Datetime,
    /// `value` and `end_value`, each stored like [`DateStorage::Datetime`].
    Daterange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Menu {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuLink {
    pub id: String,
    pub menu: String,
    #[serde(default)]
    pub parent: Option<String>,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub weight: i64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub expanded: bool,
    /// Capability a principal needs to see the link.
    #[serde(default)]
    pub capability: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

/// View configuration: displays keyed by id, `default` holding shared handlers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewConfig {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub displays: IndexMap<String, ViewDisplay>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewDisplay {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub sorts: Vec<String>,
    #[serde(default)]
    pub cache_contexts: Vec<String>,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn load(&self, entity_type: &str, id: &str) -> Result<Option<Entity>, UpstreamError>;

    /// Known bundles per entity type.
    fn bundles(&self) -> IndexMap<String, Vec<String>>;

    /// Storage of `field` when it is a date field.
    fn date_storage(&self, _entity_type: &str, _field: &str) -> Option<DateStorage> {
        None
    }
}

#[async_trait]
pub trait ConfigPageStore: Send + Sync {
    async fn load_config(&self, page_type: &str) -> Result<Option<Entity>, UpstreamError>;
}

#[async_trait]
pub trait MenuLinkStore: Send + Sync {
    async fn load_menu(&self, menu_id: &str) -> Result<Option<Menu>, UpstreamError>;

    async fn load_links(&self, menu_id: &str) -> Result<Vec<MenuLink>, UpstreamError>;
}

#[async_trait]
pub trait ViewStore: Send + Sync {
    async fn load_view(&self, view_id: &str) -> Result<Option<ViewConfig>, UpstreamError>;
}

/// Fixture-backed store implementing every collaborator trait.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryStore {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub menus: Vec<Menu>,
    #[serde(default)]
    pub menu_links: Vec<MenuLink>,
    #[serde(default)]
    pub views: Vec<ViewConfig>,
    /// Date field storage keyed by entity type, then field name.
    #[serde(default)]
    pub date_fields: IndexMap<String, IndexMap<String, DateStorage>>,
    /// Makes every lookup fail as an unavailable upstream service.
    #[serde(default)]
    pub offline: bool,
}

impl MemoryStore {
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("failed to read fixture {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid fixture JSON in {}", path.display()))
    }

    fn ensure_online(&self, service: &str) -> Result<(), UpstreamError> {
        if self.offline {
            return Err(UpstreamError::new(service, "store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load(&self, entity_type: &str, id: &str) -> Result<Option<Entity>, UpstreamError> {
        self.ensure_online("entity store")?;
        Ok(self
            .entities
            .iter()
            .find(|entity| entity.entity_type == entity_type && entity.id == id)
            .cloned())
    }

    fn bundles(&self) -> IndexMap<String, Vec<String>> {
        let mut bundles: IndexMap<String, Vec<String>> = IndexMap::new();
        for entity in &self.entities {
            let Some(bundle) = &entity.bundle else {
                continue;
            };
            let known = bundles.entry(entity.entity_type.clone()).or_default();
            if !known.contains(bundle) {
                known.push(bundle.clone());
            }
        }
        bundles
    }

    fn date_storage(&self, entity_type: &str, field: &str) -> Option<DateStorage> {
        self.date_fields.get(entity_type)?.get(field).copied()
    }
}

#[async_trait]
impl ConfigPageStore for MemoryStore {
    async fn load_config(&self, page_type: &str) -> Result<Option<Entity>, UpstreamError> {
        self.ensure_online("config pages")?;
        Ok(self
            .entities
            .iter()
            .find(|entity| entity.entity_type == CONFIG_PAGES_ENTITY_TYPE && entity.bundle.as_deref() == Some(page_type))
            .cloned())
    }
}

#[async_trait]
impl MenuLinkStore for MemoryStore {
    async fn load_menu(&self, menu_id: &str) -> Result<Option<Menu>, UpstreamError> {
        self.ensure_online("menu tree")?;
        Ok(self.menus.iter().find(|menu| menu.id == menu_id).cloned())
    }

    async fn load_links(&self, menu_id: &str) -> Result<Vec<MenuLink>, UpstreamError> {
        self.ensure_online("menu tree")?;
        Ok(self.menu_links.iter().filter(|link| link.menu == menu_id).cloned().collect())
    }
}

#[async_trait]
impl ViewStore for MemoryStore {
    async fn load_view(&self, view_id: &str) -> Result<Option<ViewConfig>, UpstreamError> {
        self.ensure_online("views")?;
        Ok(self.views.iter().find(|view| view.id == view_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article() -> Entity {
        serde_json::from_value(json!({
            "entity_type": "node",
            "id": "1",
            "bundle": "article",
            "label": "Hello",
            "fields": { "body": [{ "value": "Body" }] },
            "translations": { "de": { "label": "Hallo" } }
        }))
        .expect("entity")
    }

    #[test]
    fn type_names_combine_entity_type_and_bundle() {
        assert_eq!(article().type_name(), "NodeArticle");
        assert_eq!(type_name("translatable_config_pages", None), "TranslatableConfigPages");
    }

    #[test]
    fn translation_overrides_label_and_keeps_untranslated_fields() {
        let entity = article();
        assert!(entity.has_translation("de"));
        assert!(!entity.has_translation("fr"));

        let german = entity.translation("de").expect("translation");
        assert_eq!(german.langcode, "de");
        assert_eq!(german.label.as_deref(), Some("Hallo"));
        assert_eq!(german.fields["body"], json!([{ "value": "Body" }]));
        assert!(entity.translation("fr").is_none());
    }

    #[test]
    fn value_carries_typename_and_fields() {
        let value = article().to_value();
        assert_eq!(value["__typename"], json!("NodeArticle"));
        assert_eq!(value["entityTypeId"], json!("node"));
        assert_eq!(value["fields"]["body"][0]["value"], json!("Body"));
    }

    #[tokio::test]
    async fn offline_store_reports_upstream_errors() {
        let store = MemoryStore {
            offline: true,
            ..MemoryStore::default()
        };
        let error = EntityStore::load(&store, "node", "1").await.expect_err("offline");
        assert_eq!(error.service, "entity store");
    }

    #[test]
    fn fixture_file_loads_and_reports_bad_json() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("fixture.json");
        fs::write(&path, r#"{ "menus": [{ "id": "main" }] }"#).expect("write fixture");
        let store = MemoryStore::load_from_path(&path).expect("fixture");
        assert_eq!(store.menus[0].id, "main");
        assert!(store.entities.is_empty());

        fs::write(&path, "{").expect("write fixture");
        let error = MemoryStore::load_from_path(&path).expect_err("invalid fixture");
        assert!(error.to_string().contains("invalid fixture JSON"));
    }

    #[test]
    fn bundles_are_collected_per_entity_type() {
        let store = MemoryStore {
            entities: vec![article(), article()],
            ..MemoryStore::default()
        };
        assert_eq!(store.bundles()["node"], vec!["article".to_string()]);
    }
}
