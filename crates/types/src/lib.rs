//! Shared data model for gqlcompose.
//!
//! These types are plain serde structures so they can be authored in YAML/JSON
//! schema documents and settings files and shared between the engine, the
//! built-in producers and the CLI.

pub mod document;
pub mod path;
pub mod producer;
pub mod schema_config;
pub mod server;

pub use document::{PipelineSpec, SchemaDocument, StepSpec, split_field_key};
pub use path::select_path;
pub use producer::{BindingSource, BindingSpec, InputSlot, OutputType, ProducerDefinition};
pub use schema_config::{CURRENT_REVISION, DEFAULT_ENTITY_BASE_FIELDS, EntityBaseFields, SchemaConfiguration};
pub use server::{CORE_COMPOSABLE_SCHEMA, EnvironmentIndicator, ServerDefinition};
