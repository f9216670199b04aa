//! Menus and menu link trees.
//!
//! Link trees are loaded with optional tree parameters, then filtered to the
//! links the principal may access, sorted by weight, title and id, and
//! stripped of disabled links.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use gqlcompose_engine::{
    ConfigurationError, FieldContext, FieldRegistryBuilder, Producer, ProducerError, ProducerInputs, ProducerRegistryBuilder,
    ResolverBuilder, SchemaExtension, cache::USER_PERMISSIONS_CONTEXT,
};
use gqlcompose_types::{OutputType, ProducerDefinition, SchemaConfiguration};
use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::debug;

use crate::store::{MenuLink, MenuLinkStore};

/// Deepest level a menu tree is loaded to.
pub const MAX_MENU_DEPTH: usize = 9;

/// Restrictions applied when loading a menu tree.
///
/// With a root, depth 1 is the root's direct children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MenuTreeParameters {
    pub root: Option<String>,
    pub min_depth: Option<usize>,
    pub max_depth: Option<usize>,
    pub active_trail: Vec<String>,
}

impl MenuTreeParameters {
    /// Reads parameters from producer inputs; empty values leave a parameter unset.
    pub fn from_inputs(inputs: &ProducerInputs) -> Self {
        let depth = |name: &str| inputs.i64(name).filter(|depth| *depth > 0).map(|depth| depth as usize);
        Self {
            root: inputs.str("root").map(str::to_string),
            min_depth: depth("minDepth"),
            max_depth: depth("maxDepth"),
            active_trail: inputs.string_list("activeTrailIds"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuTreeElement {
    pub link: MenuLink,
    pub depth: usize,
    pub in_active_trail: bool,
    pub subtree: Vec<MenuTreeElement>,
}

impl MenuTreeElement {
    pub fn to_value(&self) -> Value {
        json!({
            "__typename": "MenuLinkTreeElement",
            "depth": self.depth,
            "inActiveTrail": self.in_active_trail,
            "hasChildren": !self.subtree.is_empty(),
            "link": {
                "__typename": "MenuLink",
                "id": self.link.id,
                "label": self.link.title,
                "url": self.link.url,
                "weight": self.link.weight,
                "expanded": self.link.expanded,
                "enabled": self.link.enabled,
            },
            "subtree": self.subtree.iter().map(MenuTreeElement::to_value).collect::<Vec<_>>(),
        })
    }
}

/// Builds the tree of `links` below the parameter root (or the menu top level).
pub fn build_tree(links: &[MenuLink], parameters: &MenuTreeParameters) -> Vec<MenuTreeElement> {
    let known: HashSet<&str> = links.iter().map(|link| link.id.as_str()).collect();
    let mut children: IndexMap<Option<&str>, Vec<&MenuLink>> = IndexMap::new();
    for link in links {
        // Links pointing at a parent outside the menu are top-level links.
        let parent = link.parent.as_deref().filter(|parent| known.contains(parent));
        children.entry(parent).or_default().push(link);
    }

    let max_depth = parameters.max_depth.unwrap_or(MAX_MENU_DEPTH).min(MAX_MENU_DEPTH);
    let active_trail: HashSet<&str> = parameters.active_trail.iter().map(String::as_str).collect();
    let mut visited = HashSet::new();
    let tree = build_level(&children, parameters.root.as_deref(), 1, max_depth, &active_trail, &mut visited);

    match parameters.min_depth {
        Some(min_depth) if min_depth > 1 => at_depth(tree, min_depth),
        _ => tree,
    }
}

fn build_level<'a>(
    children: &IndexMap<Option<&'a str>, Vec<&'a MenuLink>>,
    parent: Option<&'a str>,
    depth: usize,
    max_depth: usize,
    active_trail: &HashSet<&str>,
    visited: &mut HashSet<&'a str>,
) -> Vec<MenuTreeElement> {
    if depth > max_depth {
        return Vec::new();
    }
    let Some(links) = children.get(&parent) else {
        return Vec::new();
    };

    let mut level = Vec::with_capacity(links.len());
    for &link in links {
        if !visited.insert(link.id.as_str()) {
            continue;
        }
        level.push(MenuTreeElement {
            link: link.clone(),
            depth,
            in_active_trail: active_trail.contains(link.id.as_str()),
            subtree: build_level(children, Some(link.id.as_str()), depth + 1, max_depth, active_trail, visited),
        });
    }
    level
}

fn at_depth(tree: Vec<MenuTreeElement>, depth: usize) -> Vec<MenuTreeElement> {
    let mut found = Vec::new();
    for element in tree {
        if element.depth == depth {
            found.push(element);
        } else if element.depth < depth {
            found.extend(at_depth(element.subtree, depth));
        }
    }
    found
}

/// Drops links the principal may not access, together with their subtrees.
pub fn check_access(tree: Vec<MenuTreeElement>, context: &FieldContext) -> Vec<MenuTreeElement> {
    tree.into_iter()
        .filter(|element| {
            element
                .link
                .capability
                .as_deref()
                .is_none_or(|capability| context.has_capability(capability))
        })
        .map(|mut element| {
            element.subtree = check_access(element.subtree, context);
            element
        })
        .collect()
}

/// Sorts every level by weight, then title, then id.
pub fn sort_tree(tree: &mut [MenuTreeElement]) {
    tree.sort_by(|left, right| {
        (left.link.weight, &left.link.title, &left.link.id).cmp(&(right.link.weight, &right.link.title, &right.link.id))
    });
    for element in tree.iter_mut() {
        sort_tree(&mut element.subtree);
    }
}

/// Drops disabled links at every level, not only the top level, so a
/// disabled child never appears inside an enabled parent's subtree.
fn enabled_only(tree: Vec<MenuTreeElement>) -> Vec<MenuTreeElement> {
    tree.into_iter()
        .filter(|element| element.link.enabled)
        .map(|mut element| {
            element.subtree = enabled_only(element.subtree);
            element
        })
        .collect()
}

fn menu_cache_tag(menu_id: &str) -> String {
    format!("config:system.menu.{menu_id}")
}

/// Loads a menu by machine name.
pub struct MenuLoad {
    definition: ProducerDefinition,
    store: Arc<dyn MenuLinkStore>,
}

impl MenuLoad {
    pub const ID: &'static str = "menu_load";

    pub fn new(store: Arc<dyn MenuLinkStore>) -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID)
                .required("name")
                .returns(OutputType::object("Menu"))
                .memoized(),
            store,
        }
    }
}

#[async_trait]
impl Producer for MenuLoad {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        let name = inputs.require_str("name")?;
        let Some(menu) = self.store.load_menu(name).await? else {
            debug!(menu = name, "menu not found");
            return Ok(Value::Null);
        };
        context.add_cache_tag(menu_cache_tag(&menu.id));
        Ok(json!({
            "__typename": "Menu",
            "id": menu.id,
            "label": menu.label,
            "description": menu.description,
        }))
    }
}

/// Menu link tree of a menu, honoring tree parameters and link access.
pub struct MenuLinksWithParams {
    definition: ProducerDefinition,
    store: Arc<dyn MenuLinkStore>,
}

impl MenuLinksWithParams {
    pub const ID: &'static str = "menu_links_with_params";

    pub fn new(store: Arc<dyn MenuLinkStore>) -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID)
                .with_description("Menu link tree filtered by root, depth and access")
                .required("menu")
                .optional("root")
                .optional("activeTrailIds")
                .optional("minDepth")
                .optional("maxDepth")
                .returns(OutputType::list_of(OutputType::object("MenuLinkTreeElement"))),
            store,
        }
    }
}

#[async_trait]
impl Producer for MenuLinksWithParams {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        let menu_id = inputs.require_identifier("menu")?;
        let parameters = MenuTreeParameters::from_inputs(inputs);
        let links = self.store.load_links(&menu_id).await?;

        let tree = build_tree(&links, &parameters);
        context.add_cache_context(USER_PERMISSIONS_CONTEXT);
        context.add_cache_tag(menu_cache_tag(&menu_id));
        let mut tree = check_access(tree, context);
        sort_tree(&mut tree);
        let tree = enabled_only(tree);

        debug!(menu = %menu_id, link_count = links.len(), top_level = tree.len(), "menu tree built");
        Ok(Value::Array(tree.iter().map(MenuTreeElement::to_value).collect()))
    }
}

/// `Query.menu(name)` and `Menu.links(root, minDepth, maxDepth, activeTrailIds)`.
pub struct MenuExtension {
    store: Arc<dyn MenuLinkStore>,
}

impl MenuExtension {
    pub const ID: &'static str = "menu";

    pub fn new(store: Arc<dyn MenuLinkStore>) -> Self {
        Self { store }
    }
}

impl SchemaExtension for MenuExtension {
    fn id(&self) -> &str {
        Self::ID
    }

    fn entity_type_dependencies(&self) -> &[&str] {
        &["menu"]
    }

    fn register_producers(&self, producers: &mut ProducerRegistryBuilder) -> Result<(), ConfigurationError> {
        producers.register(Arc::new(MenuLoad::new(Arc::clone(&self.store))))?;
        producers.register(Arc::new(MenuLinksWithParams::new(Arc::clone(&self.store))))
    }

    fn register_resolvers(&self, registry: &mut FieldRegistryBuilder, _configuration: &SchemaConfiguration) -> Result<(), ConfigurationError> {
        let builder = ResolverBuilder::new();
        registry.add_field_resolver(
            "Query",
            "menu",
            &builder.compose(builder.produce(MenuLoad::ID).map("name", builder.from_argument("name"))),
        );
        registry.add_field_resolver(
            "Menu",
            "links",
            &builder.compose(
                builder
                    .produce(MenuLinksWithParams::ID)
                    .map("menu", builder.from_parent())
                    .map("root", builder.from_argument("root"))
                    .map("activeTrailIds", builder.from_argument("activeTrailIds"))
                    .map("minDepth", builder.from_argument("minDepth"))
                    .map("maxDepth", builder.from_argument("maxDepth")),
            ),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use gqlcompose_engine::{GrantedCapabilities, Principal, RequestContext};

    fn link(id: &str, parent: Option<&str>, weight: i64) -> MenuLink {
        MenuLink {
            id: id.into(),
            menu: "main".into(),
            parent: parent.map(str::to_string),
            title: id.to_uppercase(),
            url: Some(format!("/{id}")),
            weight,
            enabled: true,
            expanded: false,
            capability: None,
        }
    }

    fn links() -> Vec<MenuLink> {
        let mut admin = link("admin", None, 5);
        admin.capability = Some("administer site".into());
        let mut hidden = link("hidden", None, 0);
        hidden.enabled = false;
        vec![
            link("news", None, 10),
            link("about", None, 0),
            link("team", Some("about"), 1),
            link("history", Some("about"), 0),
            link("founders", Some("history"), 0),
            admin,
            hidden,
        ]
    }

    fn ids(tree: &[MenuTreeElement]) -> Vec<&str> {
        tree.iter().map(|element| element.link.id.as_str()).collect()
    }

    fn context(principal: Principal) -> FieldContext {
        FieldContext::new(Arc::new(RequestContext::new(principal, "en")), Arc::new(GrantedCapabilities))
    }

    #[test]
    fn root_children_start_at_depth_one() {
        let parameters = MenuTreeParameters {
            root: Some("about".into()),
            ..MenuTreeParameters::default()
        };
        let mut tree = build_tree(&links(), &parameters);
        sort_tree(&mut tree);

        assert_eq!(ids(&tree), vec!["history", "team"]);
        assert_eq!(tree[0].depth, 1);
        assert_eq!(ids(&tree[0].subtree), vec!["founders"]);
    }

    #[test]
    fn depth_limits_trim_and_promote_levels() {
        let shallow = build_tree(
            &links(),
            &MenuTreeParameters {
                max_depth: Some(1),
                ..MenuTreeParameters::default()
            },
        );
        assert!(shallow.iter().all(|element| element.subtree.is_empty()));

        let mut second_level = build_tree(
            &links(),
            &MenuTreeParameters {
                min_depth: Some(2),
                ..MenuTreeParameters::default()
            },
        );
        sort_tree(&mut second_level);
        assert_eq!(ids(&second_level), vec!["history", "team"]);
    }

    #[test]
    fn parent_cycles_do_not_recurse_forever() {
        let looping = vec![link("a", Some("b"), 0), link("b", Some("a"), 0), link("c", None, 0)];
        let tree = build_tree(&looping, &MenuTreeParameters::default());
        assert_eq!(ids(&tree), vec!["c"]);
    }

    #[tokio::test]
    async fn producer_applies_access_sort_and_enabled_filter() {
        let store = Arc::new(MemoryStore {
            menu_links: links(),
            ..MemoryStore::default()
        });
        let producer = MenuLinksWithParams::new(store);
        let inputs = ProducerInputs::new(MenuLinksWithParams::ID)
            .with("menu", json!({ "id": "main" }))
            .with("activeTrailIds", json!(["about", "history"]))
            .with("maxDepth", json!(0));

        let mut anonymous = context(Principal::anonymous());
        let tree = producer.invoke(&inputs, &mut anonymous).await.expect("tree");
        let top: Vec<&str> = tree
            .as_array()
            .expect("list")
            .iter()
            .map(|element| element["link"]["id"].as_str().expect("id"))
            .collect();
        assert_eq!(top, vec!["about", "news"]);
        assert_eq!(tree[0]["inActiveTrail"], json!(true));
        assert_eq!(tree[0]["subtree"][0]["link"]["label"], json!("HISTORY"));
        assert_eq!(tree[0]["subtree"][0]["subtree"][0]["link"]["id"], json!("founders"));
        assert!(anonymous.cache.cache_contexts.contains(USER_PERMISSIONS_CONTEXT));

        let mut admin = context(Principal::new("root").with_capability("administer site"));
        let tree = producer.invoke(&inputs, &mut admin).await.expect("tree");
        assert_eq!(tree.as_array().expect("list").len(), 3);
    }

    #[test]
    fn disabled_children_are_dropped_below_the_top_level() {
        let mut archived = link("archive", Some("about"), 2);
        archived.enabled = false;
        let mut all = links();
        all.push(archived);

        let tree = enabled_only(build_tree(&all, &MenuTreeParameters::default()));
        let about = tree.iter().find(|element| element.link.id == "about").expect("about");
        assert!(about.subtree.iter().all(|element| element.link.id != "archive"));
        assert!(tree.iter().all(|element| element.link.id != "hidden"));
    }
}
