//! # gqlcompose engine
//!
//! Declarative field resolution for GraphQL schemas: schema fields map to
//! pipelines composed from small single-purpose producers.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use gqlcompose_engine::{
//!     FieldRegistryBuilder, FnProducer, ProducerRegistryBuilder, ResolverBuilder,
//! };
//! use gqlcompose_types::{BindingSpec, ProducerDefinition};
//! use serde_json::json;
//!
//! let mut producers = ProducerRegistryBuilder::new();
//! producers.register(Arc::new(FnProducer::new(
//!     ProducerDefinition::new("greet").optional_with_default("lang", BindingSpec::value("en")),
//!     |inputs, _| Ok(json!(format!("hello ({})", inputs.str("lang").unwrap_or_default()))),
//! )))?;
//!
//! let builder = ResolverBuilder::new();
//! let mut fields = FieldRegistryBuilder::new(producers.build());
//! fields.add_field_resolver("Query", "greeting", &builder.compose(builder.produce("greet")));
//! let fields = fields.build()?;
//! assert!(fields.resolve("Query", "greeting").is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`producer`**: the producer trait and the immutable producer registry
//! - **`pipeline`**: builder, compiler and runtime of per-field pipelines
//! - **`registry`**: field registry, schema extensions and two-phase schema build
//! - **`access`**: the per-request admission gate
//! - **`routing`**: explicit route table and route requirements
//! - **`executor`**: request lifecycle and selection resolution
//! - **`cache`**: cache context and tag accumulation
//! - **`config`**: settings loading

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod access;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod producer;
pub mod registry;
pub mod routing;

pub use access::{AccessDecision, AccessGate, AccessPolicy, DEFAULT_ACCESS_CAPABILITY, DEFAULT_TOKEN_HEADER};
pub use cache::CacheMetadata;
pub use config::{
    AccessSettings, Settings, default_settings_path, load_settings, load_settings_from_path, read_settings_file, save_settings,
};
pub use context::{FieldContext, GrantedCapabilities, PermissionService, Principal, RequestContext, RequestHeaders};
pub use error::{ConfigurationError, ProducerError, RequestError, SchemaBuildError, UpstreamError};
pub use executor::{Executor, Operation, RequestPhase, Response, ResponseError, Selection};
pub use pipeline::{Binding, Pipeline, PipelinePlan, ProducerCall, ResolverBuilder, ResultMemo, compile_pipeline};
pub use producer::{FnProducer, Producer, ProducerInputs, ProducerRegistry, ProducerRegistryBuilder};
pub use registry::{DocumentSchemaExtension, FieldRegistry, FieldRegistryBuilder, Schema, SchemaExtension};
pub use routing::{Route, RouteTable, RouteTableBuilder};

pub use gqlcompose_types::SchemaDocument;

/// Loads a schema document, parsing JSON for `.json` files and YAML otherwise.
///
/// # Errors
///
/// Fails when the file cannot be read or does not describe a `fields` map of
/// pipelines.
pub fn parse_schema_document(file_path: impl AsRef<Path>) -> Result<SchemaDocument> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read schema document: {}", file_path.display()))?;

    let is_json = file_path.extension().and_then(|extension| extension.to_str()) == Some("json");
    let document = if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid schema document JSON: {}", file_path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid schema document YAML: {}", file_path.display()))?
    };
    Ok(document)
}
