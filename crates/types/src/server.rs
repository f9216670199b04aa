use serde::{Deserialize, Serialize};

/// Schema identifier whose endpoints are guarded by the query access gate.
pub const CORE_COMPOSABLE_SCHEMA: &str = "core_composable";

/// A GraphQL server exposed under its own endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerDefinition {
    pub id: String,
    /// Schema plugin the server is built from.
    pub schema: String,
    /// Request path, defaults to `/graphql/<id>` when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ServerDefinition {
    pub fn endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| format!("/graphql/{}", self.id))
    }

    pub fn uses_core_composable_schema(&self) -> bool {
        self.schema == CORE_COMPOSABLE_SCHEMA
    }
}

/// Environment indicator settings surfaced through the schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentIndicator {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fg_color: Option<String>,
    #[serde(default)]
    pub bg_color: Option<String>,
}
