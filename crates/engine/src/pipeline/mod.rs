//! Compiled field pipelines.
//!
//! - `builder`: fluent `produce(..).map(..)` composition into a [`PipelineSpec`]
//! - `compile`: validation of a spec against the producer registry
//! - `planning`: dependency ordering and cycle detection
//!
//! A [`Pipeline`] is compiled once per schema build and shared by every request.
//! Steps run in dependency order; a step whose required input resolves to null
//! short-circuits to null without invoking its producer.

mod builder;
mod compile;
mod planning;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use gqlcompose_types::{OutputType, select_path};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value};
use tracing::debug;

use crate::{
    cache::CacheMetadata,
    context::FieldContext,
    error::ProducerError,
    producer::{Producer, ProducerInputs},
};

pub use builder::{Binding, ProducerCall, ResolverBuilder};
pub use compile::compile_pipeline;

/// Where a slot value comes from once compiled.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompiledBinding {
    Literal(Value),
    Step { index: usize, path: Option<String> },
    Context { name: String, path: Option<String> },
    Parent { path: Option<String> },
    Argument { name: String, path: Option<String> },
}

impl CompiledBinding {
    fn resolve(&self, outputs: &[Value], parent: &Value, arguments: &JsonMap<String, Value>, context: &FieldContext) -> Value {
        match self {
            CompiledBinding::Literal(value) => value.clone(),
            CompiledBinding::Step { index, path } => outputs.get(*index).map(|output| selected(output, path)).unwrap_or(Value::Null),
            CompiledBinding::Context { name, path } => selected(&context.context_value(name), path),
            CompiledBinding::Parent { path } => selected(parent, path),
            CompiledBinding::Argument { name, path } => arguments.get(name).map(|argument| selected(argument, path)).unwrap_or(Value::Null),
        }
    }

    fn describe(&self, step_ids: &[String]) -> String {
        let with_path = |label: String, path: &Option<String>| match path {
            Some(path) => format!("{label}.{path}"),
            None => label,
        };
        match self {
            CompiledBinding::Literal(value) => format!("value:{value}"),
            CompiledBinding::Step { index, path } => with_path(format!("step:{}", step_ids[*index]), path),
            CompiledBinding::Context { name, path } => with_path(format!("context:{name}"), path),
            CompiledBinding::Parent { path } => with_path("parent".to_string(), path),
            CompiledBinding::Argument { name, path } => with_path(format!("argument:{name}"), path),
        }
    }
}

fn selected(value: &Value, path: &Option<String>) -> Value {
    select_path(value, path.as_deref()).cloned().unwrap_or(Value::Null)
}

/// Binding of one declared input slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SlotBinding {
    pub(crate) name: String,
    pub(crate) required: bool,
    pub(crate) primary: Option<CompiledBinding>,
    /// Default binding used when the primary is absent or resolves to null.
    pub(crate) fallback: Option<CompiledBinding>,
}

pub(crate) struct CompiledStep {
    pub(crate) id: String,
    pub(crate) producer: Arc<dyn Producer>,
    pub(crate) slots: Vec<SlotBinding>,
}

/// A compiled composition of producers resolving one schema field.
pub struct Pipeline {
    field: String,
    steps: Vec<CompiledStep>,
    output: usize,
    output_type: OutputType,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("field", &self.field)
            .field("steps", &self.resolution_order())
            .field("output_type", &self.output_type)
            .finish()
    }
}

/// Comparable description of a compiled pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelinePlan {
    pub field: String,
    pub steps: Vec<StepPlan>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepPlan {
    pub id: String,
    pub producer: String,
    /// `(slot, binding description)` in slot declaration order.
    pub bindings: Vec<(String, String)>,
}

impl Pipeline {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn output_type(&self) -> &OutputType {
        &self.output_type
    }

    /// Step identifiers in the order they run.
    pub fn resolution_order(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.id.as_str()).collect()
    }

    pub fn plan(&self) -> PipelinePlan {
        let step_ids: Vec<String> = self.steps.iter().map(|step| step.id.clone()).collect();
        let steps = self
            .steps
            .iter()
            .map(|step| StepPlan {
                id: step.id.clone(),
                producer: step.producer.definition().id.clone(),
                bindings: step
                    .slots
                    .iter()
                    .map(|slot| {
                        let description = match (&slot.primary, &slot.fallback) {
                            (Some(primary), Some(fallback)) => {
                                format!("{} | default {}", primary.describe(&step_ids), fallback.describe(&step_ids))
                            }
                            (Some(primary), None) => primary.describe(&step_ids),
                            (None, Some(fallback)) => format!("default {}", fallback.describe(&step_ids)),
                            (None, None) => "unbound".to_string(),
                        };
                        (slot.name.clone(), description)
                    })
                    .collect(),
            })
            .collect();
        PipelinePlan {
            field: self.field.clone(),
            steps,
            output: step_ids[self.output].clone(),
        }
    }

    /// Runs every step against a parent value and the field arguments.
    pub async fn resolve(
        &self,
        parent: &Value,
        arguments: &JsonMap<String, Value>,
        context: &mut FieldContext,
        memo: &ResultMemo,
    ) -> Result<Value, ProducerError> {
        let mut outputs: Vec<Value> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let definition = step.producer.definition();
            let mut inputs = ProducerInputs::new(&definition.id);
            let mut short_circuit = false;

            for slot in &step.slots {
                let mut value = slot
                    .primary
                    .as_ref()
                    .map(|binding| binding.resolve(&outputs, parent, arguments, context))
                    .unwrap_or(Value::Null);
                if value.is_null()
                    && let Some(fallback) = &slot.fallback
                {
                    value = fallback.resolve(&outputs, parent, arguments, context);
                }
                if value.is_null() && slot.required {
                    short_circuit = true;
                }
                inputs.insert(slot.name.clone(), value);
            }

            if short_circuit {
                debug!(
                    field = %self.field,
                    step = %step.id,
                    producer_id = %definition.id,
                    "required input resolved to null, step short-circuited"
                );
                outputs.push(Value::Null);
                continue;
            }

            let output = if definition.memoize {
                memo.invoke(step.producer.as_ref(), &inputs, context).await?
            } else {
                step.producer.invoke(&inputs, context).await?
            };
            outputs.push(output);
        }

        Ok(outputs.swap_remove(self.output))
    }
}

/// Memo entries are keyed by producer id and the serialized inputs.
type MemoKey = (String, String);

/// Per-request cache of memoizable producer results, keyed by producer id and inputs.
///
/// Cache metadata recorded on the first invocation is replayed on every hit so
/// the response cacheability does not depend on which field ran first.
#[derive(Debug, Default)]
pub struct ResultMemo {
    entries: Mutex<HashMap<MemoKey, (Value, CacheMetadata)>>,
}

impl ResultMemo {
    pub fn new() -> Self {
        Self::default()
    }

    async fn invoke(&self, producer: &dyn Producer, inputs: &ProducerInputs, context: &mut FieldContext) -> Result<Value, ProducerError> {
        let Some(key) = memo_key(&producer.definition().id, inputs) else {
            return producer.invoke(inputs, context).await;
        };
        let cached = self.entries.lock().expect("memo lock poisoned").get(&key).cloned();
        if let Some((value, metadata)) = cached {
            debug!(producer_id = %key.0, "producer memo hit");
            context.cache.merge(&metadata);
            return Ok(value);
        }

        let outer = std::mem::take(&mut context.cache);
        let result = producer.invoke(inputs, context).await;
        let recorded = std::mem::replace(&mut context.cache, outer);
        context.cache.merge(&recorded);

        let value = result?;
        self.entries.lock().expect("memo lock poisoned").insert(key, (value.clone(), recorded));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("memo lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn memo_key(producer_id: &str, inputs: &ProducerInputs) -> Option<MemoKey> {
    match serde_json::to_string(inputs.values()) {
        Ok(serialized_inputs) => Some((producer_id.to_string(), serialized_inputs)),
        Err(error) => {
            debug!(producer_id, %error, "inputs not serializable, skipping memo");
            None
        }
    }
}
