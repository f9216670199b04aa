//! Per-request identity and the field context producers read from and write to.

use std::{collections::BTreeSet, fmt, sync::Arc};

use indexmap::IndexMap;
use serde_json::Value;

use crate::cache::CacheMetadata;

/// Context variable holding the language fields resolve in.
pub const LANGUAGE_CONTEXT: &str = "language";
/// Context variable holding the current principal's identifier.
pub const USER_CONTEXT: &str = "user";

/// The identity a request is made as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub capabilities: BTreeSet<String>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            id: "anonymous".into(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }
}

/// Answers capability checks for a principal.
pub trait PermissionService: Send + Sync {
    fn has_capability(&self, principal: &Principal, capability: &str) -> bool;
}

/// Permission service that trusts the capabilities carried by the principal itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantedCapabilities;

impl PermissionService for GrantedCapabilities {
    fn has_capability(&self, principal: &Principal, capability: &str) -> bool {
        principal.capabilities.contains(capability)
    }
}

/// Request headers with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: IndexMap<String, String>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the executor knows about the incoming request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    /// Negotiated interface language, e.g. `en`.
    pub language: String,
    pub headers: RequestHeaders,
    /// Requested response format (`json` when absent).
    pub format: Option<String>,
}

impl RequestContext {
    pub fn new(principal: Principal, language: impl Into<String>) -> Self {
        Self {
            principal,
            language: language.into(),
            headers: RequestHeaders::new(),
            format: None,
        }
    }

    pub fn with_headers(mut self, headers: RequestHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or("json")
    }
}

/// Mutable state threaded through the producers resolving one field.
///
/// Cache metadata appended here is merged into the response. Context values set
/// here are visible to the remaining steps and to child fields.
pub struct FieldContext {
    request: Arc<RequestContext>,
    permissions: Arc<dyn PermissionService>,
    values: IndexMap<String, Value>,
    pub cache: CacheMetadata,
}

impl fmt::Debug for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldContext")
            .field("principal", &self.request.principal.id)
            .field("values", &self.values)
            .field("cache", &self.cache)
            .finish()
    }
}

impl FieldContext {
    pub fn new(request: Arc<RequestContext>, permissions: Arc<dyn PermissionService>) -> Self {
        Self {
            request,
            permissions,
            values: IndexMap::new(),
            cache: CacheMetadata::new(),
        }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn principal(&self) -> &Principal {
        &self.request.principal
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.permissions.has_capability(&self.request.principal, capability)
    }

    /// Resolves a named context variable.
    ///
    /// Values set by producers win over the request defaults for `language` and `user`.
    pub fn context_value(&self, name: &str) -> Value {
        if let Some(value) = self.values.get(name) {
            return value.clone();
        }
        match name {
            LANGUAGE_CONTEXT => Value::String(self.request.language.clone()),
            USER_CONTEXT => Value::String(self.request.principal.id.clone()),
            _ => Value::Null,
        }
    }

    pub fn set_context_value(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn add_cache_context(&mut self, context: impl Into<String>) {
        self.cache.add_context(context);
    }

    pub fn add_cache_tag(&mut self, tag: impl Into<String>) {
        self.cache.add_tag(tag);
    }

    /// Context for a nested field: inherits context values, starts with empty cache metadata.
    pub fn child(&self) -> Self {
        Self {
            request: Arc::clone(&self.request),
            permissions: Arc::clone(&self.permissions),
            values: self.values.clone(),
            cache: CacheMetadata::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_context(principal: Principal) -> FieldContext {
        FieldContext::new(Arc::new(RequestContext::new(principal, "de")), Arc::new(GrantedCapabilities))
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = RequestHeaders::new().with("X-Drupal-GraphQL-Token", "abc");
        assert_eq!(headers.get("x-drupal-graphql-token"), Some("abc"));
        assert_eq!(headers.get("X-DRUPAL-GRAPHQL-TOKEN"), Some("abc"));
        assert_eq!(headers.get("authorization"), None);
    }

    #[test]
    fn context_values_override_request_language() {
        let mut context = field_context(Principal::anonymous());
        assert_eq!(context.context_value(LANGUAGE_CONTEXT), json!("de"));
        assert_eq!(context.context_value(USER_CONTEXT), json!("anonymous"));
        assert_eq!(context.context_value("unknown"), Value::Null);

        context.set_context_value(LANGUAGE_CONTEXT, json!("fr"));
        assert_eq!(context.context_value(LANGUAGE_CONTEXT), json!("fr"));
    }

    #[test]
    fn child_inherits_values_but_not_cache_metadata() {
        let mut context = field_context(Principal::anonymous());
        context.set_context_value(LANGUAGE_CONTEXT, json!("fr"));
        context.add_cache_context("static:language:fr");

        let child = context.child();
        assert_eq!(child.context_value(LANGUAGE_CONTEXT), json!("fr"));
        assert!(child.cache.is_empty());
    }

    #[test]
    fn capability_checks_use_permission_service() {
        let context = field_context(Principal::new("editor").with_capability("access environment indicator"));
        assert!(context.has_capability("access environment indicator"));
        assert!(!context.has_capability("administer site"));
    }
}
