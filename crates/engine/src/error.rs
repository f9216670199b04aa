//! Error taxonomy for schema building and request resolution.

use std::fmt;

use thiserror::Error;

/// Problems detected while registering producers or compiling field pipelines.
///
/// Any of these prevents the schema from being published.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("producer '{producer}' is already registered")]
    DuplicateProducer { producer: String },

    #[error("field {field}: unknown producer '{producer}'")]
    UnknownProducer { field: String, producer: String },

    #[error("field {field}: producer '{producer}' has no input slot '{slot}'")]
    UnknownSlot { field: String, producer: String, slot: String },

    #[error("field {field}: required input '{slot}' of producer '{producer}' is not bound")]
    UnboundSlot { field: String, producer: String, slot: String },

    #[error("field {field}: invalid binding for '{slot}' of producer '{producer}': {reason}")]
    InvalidBinding {
        field: String,
        producer: String,
        slot: String,
        reason: String,
    },

    #[error("field {field}: step '{step}' references unknown step '{reference}'")]
    UnknownStep { field: String, step: String, reference: String },

    #[error("field {field}: duplicate step identifier '{step}'")]
    DuplicateStep { field: String, step: String },

    #[error("field {field}: cycle detected between steps: {}", .steps.join(", "))]
    Cycle { field: String, steps: Vec<String> },

    #[error("field {field}: pipeline has no output step")]
    MissingOutput { field: String },

    #[error("extension '{extension}' requires entity type '{entity_type}' which is not enabled")]
    MissingEntityTypeDependency { extension: String, entity_type: String },

    #[error("invalid field key '{key}', expected 'Type.field'")]
    InvalidFieldKey { key: String },
}

impl ConfigurationError {
    /// The producer identifier the error refers to, when there is one.
    pub fn producer(&self) -> Option<&str> {
        match self {
            Self::DuplicateProducer { producer }
            | Self::UnknownProducer { producer, .. }
            | Self::UnknownSlot { producer, .. }
            | Self::UnboundSlot { producer, .. }
            | Self::InvalidBinding { producer, .. } => Some(producer),
            _ => None,
        }
    }
}

/// Every configuration error found during one schema build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaBuildError {
    pub errors: Vec<ConfigurationError>,
}

impl fmt::Display for SchemaBuildError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(
            formatter,
            "schema build failed with {} configuration error(s): {}",
            self.errors.len(),
            summary.join("; ")
        )
    }
}

impl std::error::Error for SchemaBuildError {}

/// A collaborator service (entity store, menu tree, ...) failed or was unavailable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{service} unavailable: {message}")]
pub struct UpstreamError {
    pub service: String,
    pub message: String,
}

impl UpstreamError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

/// Failure of a single producer invocation.
///
/// `InvalidArgument` and `NotFound` stay local to the field; `Upstream` aborts the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProducerError {
    #[error("producer '{producer}': invalid argument: {message}")]
    InvalidArgument { producer: String, message: String },

    #[error("producer '{producer}': {message}")]
    NotFound { producer: String, message: String },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ProducerError {
    pub fn invalid_argument(producer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            producer: producer.into(),
            message: message.into(),
        }
    }

    pub fn not_found(producer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            producer: producer.into(),
            message: message.into(),
        }
    }

    pub fn is_request_fatal(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}

/// Request-level failures: no partial data is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("access to the GraphQL endpoint is forbidden")]
    Forbidden,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_slot_message_names_producer_and_slot() {
        let error = ConfigurationError::UnboundSlot {
            field: "Query.item".into(),
            producer: "P2".into(),
            slot: "id".into(),
        };
        let message = error.to_string();
        assert!(message.contains("P2"), "unexpected message: {message}");
        assert!(message.contains("'id'"), "unexpected message: {message}");
        assert_eq!(error.producer(), Some("P2"));
    }

    #[test]
    fn build_error_summarizes_every_error() {
        let error = SchemaBuildError {
            errors: vec![
                ConfigurationError::InvalidFieldKey { key: "nope".into() },
                ConfigurationError::DuplicateProducer { producer: "p".into() },
            ],
        };
        let message = error.to_string();
        assert!(message.contains("2 configuration error(s)"), "unexpected message: {message}");
        assert!(message.contains("'nope'"), "unexpected message: {message}");
    }

    #[test]
    fn only_upstream_failures_are_request_fatal() {
        assert!(ProducerError::from(UpstreamError::new("entity store", "down")).is_request_fatal());
        assert!(!ProducerError::not_found("entity_load", "missing").is_request_fatal());
    }
}
