//! Explicit route table for the GraphQL endpoints.
//!
//! Routes are built from the configured servers up front. Each route carries a
//! set of requirements that [`Route::authorize`] evaluates before a request is
//! handed to the executor.

use gqlcompose_types::ServerDefinition;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    access::{AccessDecision, AccessGate},
    context::{PermissionService, RequestContext},
};

/// Requirement delegating to the [`AccessGate`].
pub const QUERY_ACCESS_REQUIREMENT: &str = "_graphql_security_query_access";
pub const FORMAT_REQUIREMENT: &str = "_format";
pub const PERMISSION_REQUIREMENT: &str = "_permission";

pub const CONFIG_PAGES_COLLECTION_ROUTE: &str = "entity.translatable_config_pages.collection";
pub const MANAGE_CONFIG_PAGES_PERMISSION: &str = "manage translatable config pages";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: String,
    pub path: String,
    pub requirements: IndexMap<String, String>,
}

impl Route {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            requirements: IndexMap::new(),
        }
    }

    pub fn with_requirement(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.insert(key.into(), value.into());
        self
    }

    /// Evaluates every requirement; all must pass. Unknown requirements deny.
    pub fn authorize(&self, request: &RequestContext, gate: &AccessGate, permissions: &dyn PermissionService) -> AccessDecision {
        for (key, value) in &self.requirements {
            let passed = match key.as_str() {
                QUERY_ACCESS_REQUIREMENT => value != "TRUE" || gate.check(&request.principal, &request.headers).is_allowed(),
                FORMAT_REQUIREMENT => value.split('|').any(|format| format == request.format()),
                PERMISSION_REQUIREMENT => permission_requirement_met(value, request, permissions),
                _ => {
                    warn!(route = %self.name, requirement = %key, "unknown route requirement");
                    false
                }
            };
            if !passed {
                debug!(route = %self.name, requirement = %key, "route requirement failed");
                return AccessDecision::Forbidden;
            }
        }
        AccessDecision::Allowed
    }
}

// `a+b` grants when any permission is held, `a,b` only when all are.
fn permission_requirement_met(value: &str, request: &RequestContext, permissions: &dyn PermissionService) -> bool {
    let holds = |permission: &str| permissions.has_capability(&request.principal, permission.trim());
    if value.contains('+') {
        value.split('+').any(holds)
    } else {
        value.split(',').all(holds)
    }
}

#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    servers: Vec<ServerDefinition>,
    config_pages_collection: Option<String>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn servers(mut self, servers: &[ServerDefinition]) -> Self {
        self.servers.extend_from_slice(servers);
        self
    }

    /// Adds the config pages administration listing at `path`.
    pub fn with_config_pages_collection(mut self, path: impl Into<String>) -> Self {
        self.config_pages_collection = Some(path.into());
        self
    }

    pub fn build(self) -> RouteTable {
        let mut routes = IndexMap::new();
        for server in &self.servers {
            let route = Route::new(format!("graphql.query.{}", server.id), server.endpoint());
            let route = if server.uses_core_composable_schema() {
                route
                    .with_requirement(QUERY_ACCESS_REQUIREMENT, "TRUE")
                    .with_requirement(FORMAT_REQUIREMENT, "json")
            } else {
                route.with_requirement(PERMISSION_REQUIREMENT, format!("execute {} arbitrary graphql requests", server.id))
            };
            debug!(route = %route.name, path = %route.path, "route registered");
            routes.insert(route.name.clone(), route);
        }

        if let Some(path) = self.config_pages_collection {
            let route =
                Route::new(CONFIG_PAGES_COLLECTION_ROUTE, path).with_requirement(PERMISSION_REQUIREMENT, MANAGE_CONFIG_PAGES_PERMISSION);
            routes.insert(route.name.clone(), route);
        }

        RouteTable { routes }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RouteTable {
    routes: IndexMap<String, Route>,
}

impl RouteTable {
    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    pub fn match_path(&self, path: &str) -> Option<&Route> {
        self.routes.values().find(|route| route.path == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
