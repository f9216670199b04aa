//! Per-request admission gate evaluated before any field is resolved.
//!
//! Two independent paths admit a request: the principal holds the configured
//! capability, or the request carries the configured shared secret in a header.
//! The secret is compared in constant time.

use std::{fmt, sync::Arc};

use subtle::ConstantTimeEq;
use tracing::debug;

use crate::context::{PermissionService, Principal, RequestHeaders};

pub const DEFAULT_ACCESS_CAPABILITY: &str = "execute graphql_compose_server arbitrary graphql requests";
pub const DEFAULT_TOKEN_HEADER: &str = "x-drupal-graphql-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Forbidden,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        self == AccessDecision::Allowed
    }
}

/// What the gate accepts.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub capability: String,
    pub header: String,
    secret: Option<String>,
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("capability", &self.capability)
            .field("header", &self.header)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            capability: DEFAULT_ACCESS_CAPABILITY.to_string(),
            header: DEFAULT_TOKEN_HEADER.to_string(),
            secret: None,
        }
    }
}

impl AccessPolicy {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// An empty secret disables the header path.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.secret = (!secret.is_empty()).then_some(secret);
        self
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }
}

/// Admission gate shared by every request.
#[derive(Clone)]
pub struct AccessGate {
    policy: AccessPolicy,
    permissions: Arc<dyn PermissionService>,
}

impl fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGate").field("policy", &self.policy).finish()
    }
}

impl AccessGate {
    pub fn new(policy: AccessPolicy, permissions: Arc<dyn PermissionService>) -> Self {
        Self { policy, permissions }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn permissions(&self) -> &Arc<dyn PermissionService> {
        &self.permissions
    }

    pub fn check(&self, principal: &Principal, headers: &RequestHeaders) -> AccessDecision {
        if self.permissions.has_capability(principal, &self.policy.capability) {
            debug!(principal = %principal.id, admitted_by = "capability", "access allowed");
            return AccessDecision::Allowed;
        }

        let provided = headers.get(&self.policy.header).filter(|token| !token.is_empty());
        if let (Some(secret), Some(provided)) = (&self.policy.secret, provided)
            && bool::from(secret.as_bytes().ct_eq(provided.as_bytes()))
        {
            debug!(principal = %principal.id, admitted_by = "shared_secret", "access allowed");
            return AccessDecision::Allowed;
        }

        debug!(
            principal = %principal.id,
            token_present = provided.is_some(),
            "access forbidden"
        );
        AccessDecision::Forbidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GrantedCapabilities;

    fn gate(policy: AccessPolicy) -> AccessGate {
        AccessGate::new(policy, Arc::new(GrantedCapabilities))
    }

    fn token(value: &str) -> RequestHeaders {
        RequestHeaders::new().with(DEFAULT_TOKEN_HEADER, value)
    }

    #[test]
    fn default_policy_reads_the_graphql_compose_token_header() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.capability, "execute graphql_compose_server arbitrary graphql requests");
        assert_eq!(policy.header, "x-drupal-graphql-token");

        let gate = gate(policy.with_secret("s3cr3t"));
        let headers = RequestHeaders::new().with("X-Drupal-GraphQL-Token", "s3cr3t");
        assert!(gate.check(&Principal::anonymous(), &headers).is_allowed());
    }

    #[test]
    fn shared_secret_must_match_exactly() {
        let gate = gate(AccessPolicy::default().with_secret("s3cr3t"));
        let anonymous = Principal::anonymous();

        assert_eq!(gate.check(&anonymous, &token("s3cr3t")), AccessDecision::Allowed);
        assert_eq!(gate.check(&anonymous, &token("s3cr3t ")), AccessDecision::Forbidden);
        assert_eq!(gate.check(&anonymous, &token("S3CR3T")), AccessDecision::Forbidden);
        assert_eq!(gate.check(&anonymous, &RequestHeaders::new()), AccessDecision::Forbidden);
    }

    #[test]
    fn capability_alone_is_sufficient() {
        let gate = gate(AccessPolicy::default().with_secret("s3cr3t"));
        let editor = Principal::new("editor").with_capability(DEFAULT_ACCESS_CAPABILITY);

        assert_eq!(gate.check(&editor, &RequestHeaders::new()), AccessDecision::Allowed);
        assert_eq!(gate.check(&editor, &token("wrong")), AccessDecision::Allowed);
    }

    #[test]
    fn empty_secret_disables_header_path() {
        let gate = gate(AccessPolicy::default().with_secret(""));
        assert!(!gate.policy().has_secret());
        assert_eq!(gate.check(&Principal::anonymous(), &token("")), AccessDecision::Forbidden);
    }

    #[test]
    fn custom_header_name_is_case_insensitive() {
        let gate = gate(AccessPolicy::new("use api").with_header("X-Api-Key").with_secret("k"));
        let headers = RequestHeaders::new().with("x-api-key", "k");
        assert!(gate.check(&Principal::anonymous(), &headers).is_allowed());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let policy = AccessPolicy::default().with_secret("s3cr3t");
        let rendered = format!("{policy:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("<redacted>"));
    }
}
