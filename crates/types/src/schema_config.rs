//! Composable schema configuration: which entity types, bundles and fields are exposed.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Base fields enabled by the first configuration migration.
pub const DEFAULT_ENTITY_BASE_FIELDS: [&str; 9] = [
    "uuid",
    "label",
    "langcode",
    "getConfigTarget",
    "uriRelationships",
    "referencedEntities",
    "entityTypeId",
    "isNew",
    "accessCheck",
];

/// Revision a freshly written configuration is at.
pub const CURRENT_REVISION: u32 = 2;

/// Configuration of the composable core schema.
///
/// Checkbox style maps (`name -> bool`) keep unchecked entries around so an
/// exported configuration round-trips without losing options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaConfiguration {
    /// Number of upgrade migrations already applied.
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub enabled_entity_types: IndexMap<String, bool>,
    /// Enabled fields per entity type.
    #[serde(default)]
    pub fields: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub entity_base_fields: EntityBaseFields,
    /// Enabled bundles per entity type.
    #[serde(default)]
    pub bundles: IndexMap<String, IndexMap<String, bool>>,
    #[serde(default)]
    pub generate_value_fields: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntityBaseFields {
    #[serde(default)]
    pub fields: IndexMap<String, bool>,
}

impl SchemaConfiguration {
    pub fn enabled_entity_types(&self) -> Vec<&str> {
        checked(&self.enabled_entity_types)
    }

    /// Enabled base fields of the shared entity interface; `id` is always present.
    pub fn enabled_entity_fields(&self) -> Vec<&str> {
        let mut fields = checked(&self.entity_base_fields.fields);
        if !fields.contains(&"id") {
            fields.push("id");
        }
        fields
    }

    pub fn is_entity_type_enabled(&self, entity_type_id: &str) -> bool {
        self.enabled_entity_types.get(entity_type_id).copied().unwrap_or(false)
    }

    pub fn is_bundle_enabled(&self, entity_type_id: &str, bundle: &str) -> bool {
        self.bundles
            .get(entity_type_id)
            .and_then(|bundles| bundles.get(bundle))
            .copied()
            .unwrap_or(false)
    }

    pub fn enabled_bundles(&self, entity_type_id: &str) -> Vec<&str> {
        self.bundles.get(entity_type_id).map(checked).unwrap_or_default()
    }

    pub fn field_is_enabled(&self, entity_type_id: &str, field_name: &str) -> bool {
        self.fields
            .get(entity_type_id)
            .is_some_and(|fields| fields.iter().any(|field| field == field_name))
    }

    pub fn should_generate_value_fields(&self) -> bool {
        self.generate_value_fields
    }

    /// Applies every pending migration and returns the names of those that ran.
    ///
    /// `content_bundles` lists the known bundles of each content entity type; config
    /// entity types are expected to be absent from it.
    pub fn upgrade(&mut self, content_bundles: &IndexMap<String, Vec<String>>) -> Vec<&'static str> {
        let mut applied = Vec::new();
        if self.revision < 1 {
            self.apply_base_field_defaults();
            self.revision = 1;
            applied.push("new_configuration");
        }
        if self.revision < 2 {
            self.enable_all_bundles(content_bundles);
            self.revision = 2;
            applied.push("enable_all_bundles");
        }
        applied
    }

    fn apply_base_field_defaults(&mut self) {
        self.entity_base_fields.fields = DEFAULT_ENTITY_BASE_FIELDS
            .iter()
            .map(|field| (field.to_string(), true))
            .collect();
        self.generate_value_fields = true;
    }

    // Earlier revisions exposed every bundle implicitly.
    fn enable_all_bundles(&mut self, content_bundles: &IndexMap<String, Vec<String>>) {
        let enabled: Vec<String> = self.enabled_entity_types().into_iter().map(str::to_string).collect();
        for entity_type_id in enabled {
            let Some(bundles) = content_bundles.get(&entity_type_id) else {
                continue;
            };
            self.bundles.insert(
                entity_type_id,
                bundles.iter().map(|bundle| (bundle.clone(), true)).collect(),
            );
        }
    }
}

fn checked(map: &IndexMap<String, bool>) -> Vec<&str> {
    map.iter()
        .filter(|(_, enabled)| **enabled)
        .map(|(name, _)| name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn sample_configuration() -> SchemaConfiguration {
        serde_yaml::from_str(
            r#"
enabled_entity_types:
  node: true
  menu: true
  user: false
fields:
  node: [body, field_tags]
entity_base_fields:
  fields:
    label: true
    uuid: false
bundles:
  node:
    page: true
    article: false
"#,
        )
        .expect("parse configuration")
    }

    #[test]
    fn checkbox_maps_only_report_checked_entries() {
        let configuration = sample_configuration();

        assert_eq!(configuration.enabled_entity_types(), vec!["node", "menu"]);
        assert!(configuration.is_entity_type_enabled("node"));
        assert!(!configuration.is_entity_type_enabled("user"));
        assert!(configuration.is_bundle_enabled("node", "page"));
        assert!(!configuration.is_bundle_enabled("node", "article"));
        assert_eq!(configuration.enabled_bundles("node"), vec!["page"]);
        assert!(configuration.field_is_enabled("node", "body"));
        assert!(!configuration.field_is_enabled("menu", "body"));
    }

    #[test]
    fn entity_fields_always_include_id() {
        let configuration = sample_configuration();
        assert_eq!(configuration.enabled_entity_fields(), vec!["label", "id"]);
    }

    #[test]
    fn upgrade_applies_migrations_in_order_once() {
        let mut configuration = sample_configuration();
        let content_bundles = indexmap! {
            "node".to_string() => vec!["page".to_string(), "article".to_string()],
        };

        let applied = configuration.upgrade(&content_bundles);
        assert_eq!(applied, vec!["new_configuration", "enable_all_bundles"]);
        assert_eq!(configuration.revision, CURRENT_REVISION);
        assert!(configuration.should_generate_value_fields());
        assert!(configuration.enabled_entity_fields().contains(&"entityTypeId"));
        assert!(configuration.is_bundle_enabled("node", "article"));
        // Config entity types have no bundle info and stay untouched.
        assert!(!configuration.bundles.contains_key("menu"));

        let applied_again = configuration.upgrade(&content_bundles);
        assert!(applied_again.is_empty());
    }
}
