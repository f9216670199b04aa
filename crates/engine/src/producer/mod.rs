//! Producers: single-purpose units that turn bound inputs into one output value.
//!
//! Modules:
//! - `registry`: immutable registry of producers collected at schema build time

mod registry;

use std::fmt;

use async_trait::async_trait;
use gqlcompose_types::ProducerDefinition;
use indexmap::IndexMap;
use serde_json::Value;

use crate::{context::FieldContext, error::ProducerError};

pub use registry::{ProducerRegistry, ProducerRegistryBuilder};

/// A unit of computation wired into field pipelines.
///
/// Producers may read external state (load an entity by id) and append cache
/// metadata to the field context, but must not mutate schema-wide state.
/// Expected "not found" conditions return `Value::Null` rather than an error so
/// downstream steps can short-circuit.
#[async_trait]
pub trait Producer: Send + Sync {
    fn definition(&self) -> &ProducerDefinition;

    async fn invoke(&self, inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError>;
}

/// Input values bound for one producer invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerInputs {
    producer: String,
    values: IndexMap<String, Value>,
}

impl ProducerInputs {
    pub fn new(producer: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            values: IndexMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Returns the bound value, treating `null` as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|value| !value.is_null())
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str).filter(|value| !value.is_empty())
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|value| match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn bool(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn string_list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(Value::Array(items)) => items.iter().filter_map(|item| item.as_str().map(str::to_string)).collect(),
            Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    pub fn require(&self, name: &str) -> Result<&Value, ProducerError> {
        self.get(name)
            .ok_or_else(|| ProducerError::invalid_argument(&self.producer, format!("missing input '{name}'")))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ProducerError> {
        self.str(name)
            .ok_or_else(|| ProducerError::invalid_argument(&self.producer, format!("input '{name}' must be a non-empty string")))
    }

    /// Accepts either a string identifier or an object carrying an `id` property.
    pub fn require_identifier(&self, name: &str) -> Result<String, ProducerError> {
        let value = self.require(name)?;
        let identifier = match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Object(map) => map.get("id").and_then(|id| match id {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            }),
            _ => None,
        };
        identifier
            .filter(|identifier| !identifier.is_empty())
            .ok_or_else(|| ProducerError::invalid_argument(&self.producer, format!("input '{name}' does not carry an identifier")))
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }
}

type ProducerFn = dyn Fn(&ProducerInputs, &mut FieldContext) -> Result<Value, ProducerError> + Send + Sync;

/// Producer backed by a synchronous closure.
pub struct FnProducer {
    definition: ProducerDefinition,
    resolve: Box<ProducerFn>,
}

impl FnProducer {
    pub fn new<F>(definition: ProducerDefinition, resolve: F) -> Self
    where
        F: Fn(&ProducerInputs, &mut FieldContext) -> Result<Value, ProducerError> + Send + Sync + 'static,
    {
        Self {
            definition,
            resolve: Box::new(resolve),
        }
    }
}

impl fmt::Debug for FnProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProducer").field("id", &self.definition.id).finish()
    }
}

#[async_trait]
impl Producer for FnProducer {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        (self.resolve)(inputs, context)
    }
}
