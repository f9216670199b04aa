//! Built-in producers and schema extensions for gqlcompose.
//!
//! Every extension talks to its data through a collaborator trait from
//! [`store`]; [`MemoryStore`] implements all of them from a JSON fixture.
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use gqlcompose_engine::Schema;
//! use gqlcompose_producers::{MemoryStore, builtin_extensions};
//! use gqlcompose_types::SchemaConfiguration;
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStore::load_from_path(Path::new("fixture.json"))?);
//! let schema = Schema::build(&builtin_extensions(store, None), &SchemaConfiguration::default())?;
//! # let _ = schema;
//! # Ok(())
//! # }
//! ```

pub mod config_pages;
pub mod date;
pub mod entity;
pub mod environment;
pub mod language;
pub mod menu;
pub mod store;
pub mod views;

use std::sync::Arc;

use gqlcompose_engine::SchemaExtension;
use gqlcompose_types::EnvironmentIndicator;

pub use config_pages::{TranslatableConfigPage, TranslatableConfigPagesExtension};
pub use date::{DateTimeValue, date_time_value, parse_stored_date};
pub use entity::{CoreEntitySchemaExtension, EntityField, EntityLoad, EntityProperty};
pub use environment::{ACCESS_ENVIRONMENT_INDICATOR, ActiveEnvironment, EnvironmentIndicatorExtension};
pub use language::{CurrentLanguage, LanguageExtension};
pub use menu::{MAX_MENU_DEPTH, MenuExtension, MenuLinksWithParams, MenuLoad, MenuTreeElement, MenuTreeParameters};
pub use store::{
    CONFIG_PAGES_ENTITY_TYPE, ConfigPageStore, DateStorage, Entity, EntityStore, Menu, MenuLink, MenuLinkStore, MemoryStore, ViewConfig,
    ViewDisplay, ViewStore,
};
pub use views::{GetViewExecutable, ViewExecutable, ViewsExtension};

/// Ids of every built-in extension, in registration order.
pub const BUILTIN_EXTENSION_IDS: [&str; 6] = [
    LanguageExtension::ID,
    CoreEntitySchemaExtension::ID,
    TranslatableConfigPagesExtension::ID,
    EnvironmentIndicatorExtension::ID,
    MenuExtension::ID,
    ViewsExtension::ID,
];

/// All built-in extensions backed by one fixture store.
pub fn builtin_extensions(store: Arc<MemoryStore>, indicator: Option<EnvironmentIndicator>) -> Vec<Arc<dyn SchemaExtension>> {
    vec![
        Arc::new(LanguageExtension),
        Arc::new(CoreEntitySchemaExtension::new(store.clone())),
        Arc::new(TranslatableConfigPagesExtension::new(store.clone())),
        Arc::new(EnvironmentIndicatorExtension::new(indicator)),
        Arc::new(MenuExtension::new(store.clone())),
        Arc::new(ViewsExtension::new(store)),
    ]
}

/// Built-in extensions restricted to `enabled` ids; `None` keeps all of them.
///
/// The language extension is always kept since other extensions bind its
/// producers.
pub fn select_extensions(
    store: Arc<MemoryStore>,
    indicator: Option<EnvironmentIndicator>,
    enabled: Option<&[String]>,
) -> Vec<Arc<dyn SchemaExtension>> {
    let extensions = builtin_extensions(store, indicator);
    match enabled {
        Some(enabled) => extensions
            .into_iter()
            .filter(|extension| extension.id() == LanguageExtension::ID || enabled.iter().any(|id| id == extension.id()))
            .collect(),
        None => extensions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gqlcompose_engine::Schema;
    use gqlcompose_types::SchemaConfiguration;

    #[test]
    fn builtin_ids_match_registration_order() {
        let ids: Vec<String> = builtin_extensions(Arc::new(MemoryStore::default()), None)
            .iter()
            .map(|extension| extension.id().to_string())
            .collect();
        assert_eq!(ids, BUILTIN_EXTENSION_IDS);
    }

    #[test]
    fn selection_keeps_only_enabled_extensions() {
        let enabled = vec![MenuExtension::ID.to_string(), "unknown".to_string()];
        let extensions = select_extensions(Arc::new(MemoryStore::default()), None, Some(&enabled));
        let ids: Vec<&str> = extensions.iter().map(|extension| extension.id()).collect();
        assert_eq!(ids, [LanguageExtension::ID, MenuExtension::ID]);
    }

    #[test]
    fn config_pages_build_without_the_core_entity_extension() {
        let configuration: SchemaConfiguration = serde_json::from_value(serde_json::json!({
            "enabled_entity_types": { "translatable_config_pages": true }
        }))
        .expect("configuration");
        let enabled = vec![TranslatableConfigPagesExtension::ID.to_string()];
        let extensions = select_extensions(Arc::new(MemoryStore::default()), None, Some(&enabled));

        let schema = Schema::build(&extensions, &configuration).expect("schema");
        assert!(schema.resolve("Query", "globalConfig").is_some());
        assert!(schema.resolve("Query", "nodeById").is_none());
    }
}
