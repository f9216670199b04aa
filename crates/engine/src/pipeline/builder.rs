//! Fluent composition of producer calls.
//!
//! ```rust
//! use gqlcompose_engine::pipeline::ResolverBuilder;
//!
//! let builder = ResolverBuilder::new();
//! let spec = builder.compose(
//!     builder
//!         .produce("translatable_config_page")
//!         .map("type", builder.from_value("global"))
//!         .map("language", builder.produce("current_language")),
//! );
//!
//! let ids: Vec<&str> = spec.steps.iter().map(|step| step.id.as_str()).collect();
//! assert_eq!(ids, vec!["current_language", "translatable_config_page"]);
//! ```

use std::collections::HashMap;

use gqlcompose_types::{BindingSpec, PipelineSpec, StepSpec};
use indexmap::IndexMap;
use serde_json::Value;

/// Binding accepted by [`ProducerCall::map`].
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Spec(BindingSpec),
    /// Output of a nested producer call, optionally narrowed by a path.
    Call { call: Box<ProducerCall>, path: Option<String> },
}

impl Binding {
    pub fn with_path(self, path: impl Into<String>) -> Self {
        match self {
            Binding::Spec(spec) => Binding::Spec(spec.with_path(path)),
            Binding::Call { call, .. } => Binding::Call {
                call,
                path: Some(path.into()),
            },
        }
    }
}

impl From<BindingSpec> for Binding {
    fn from(spec: BindingSpec) -> Self {
        Binding::Spec(spec)
    }
}

impl From<ProducerCall> for Binding {
    fn from(call: ProducerCall) -> Self {
        Binding::Call {
            call: Box::new(call),
            path: None,
        }
    }
}

/// One producer invocation with its slot bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerCall {
    producer: String,
    map: IndexMap<String, Binding>,
}

impl ProducerCall {
    pub fn map(mut self, slot: impl Into<String>, binding: impl Into<Binding>) -> Self {
        self.map.insert(slot.into(), binding.into());
        self
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }
}

/// Entry point mirroring the declarative document format in code.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResolverBuilder;

impl ResolverBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn produce(&self, producer_id: impl Into<String>) -> ProducerCall {
        ProducerCall {
            producer: producer_id.into(),
            map: IndexMap::new(),
        }
    }

    pub fn from_value(&self, value: impl Into<Value>) -> Binding {
        Binding::Spec(BindingSpec::value(value))
    }

    pub fn from_context(&self, name: impl Into<String>) -> Binding {
        Binding::Spec(BindingSpec::context(name))
    }

    pub fn from_parent(&self) -> Binding {
        Binding::Spec(BindingSpec::parent())
    }

    pub fn from_argument(&self, name: impl Into<String>) -> Binding {
        Binding::Spec(BindingSpec::argument(name))
    }

    /// Flattens a call tree into named steps; the root call becomes the output.
    ///
    /// Nested calls run before the call consuming them. Step ids are the producer
    /// id, suffixed `_2`, `_3`, ... when a producer appears more than once.
    pub fn compose(&self, call: ProducerCall) -> PipelineSpec {
        let mut steps = Vec::new();
        let mut seen = HashMap::new();
        let output = flatten(call, &mut steps, &mut seen);
        PipelineSpec {
            steps,
            output: Some(output),
        }
    }
}

fn flatten(call: ProducerCall, steps: &mut Vec<StepSpec>, seen: &mut HashMap<String, usize>) -> String {
    let mut map = IndexMap::new();
    for (slot, binding) in call.map {
        let spec = match binding {
            Binding::Spec(spec) => spec,
            Binding::Call { call, path } => {
                let step_id = flatten(*call, steps, seen);
                let spec = BindingSpec::step(step_id);
                match path {
                    Some(path) => spec.with_path(path),
                    None => spec,
                }
            }
        };
        map.insert(slot, spec);
    }

    let occurrence = seen.entry(call.producer.clone()).or_insert(0);
    *occurrence += 1;
    let step_id = if *occurrence == 1 {
        call.producer.clone()
    } else {
        format!("{}_{}", call.producer, occurrence)
    };

    steps.push(StepSpec {
        id: step_id.clone(),
        produce: call.producer,
        map,
    });
    step_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_calls_become_earlier_steps() {
        let builder = ResolverBuilder::new();
        let spec = builder.compose(
            builder
                .produce("translatable_config_page")
                .map("type", builder.from_value("global"))
                .map("language", builder.produce("current_language")),
        );

        assert_eq!(spec.output.as_deref(), Some("translatable_config_page"));
        assert_eq!(spec.steps[0].id, "current_language");
        let page = &spec.steps[1];
        assert_eq!(page.map["type"].value, Some(json!("global")));
        assert_eq!(page.map["language"].from.as_deref(), Some("current_language"));
    }

    #[test]
    fn repeated_producers_get_suffixed_ids() {
        let builder = ResolverBuilder::new();
        let spec = builder.compose(
            builder
                .produce("entity_property")
                .map("entity", builder.produce("entity_load").map("id", builder.from_argument("id")))
                .map(
                    "property",
                    Binding::from(builder.produce("entity_load").map("id", builder.from_value("2"))).with_path("label"),
                ),
        );

        let ids: Vec<&str> = spec.steps.iter().map(|step| step.id.as_str()).collect();
        assert_eq!(ids, vec!["entity_load", "entity_load_2", "entity_property"]);
        assert_eq!(spec.steps[2].map["property"].path.as_deref(), Some("label"));
    }

    #[test]
    fn compose_is_deterministic() {
        let builder = ResolverBuilder::new();
        let call = builder
            .produce("menu_links_with_params")
            .map("menu", builder.from_argument("name"))
            .map("maxDepth", builder.from_value(2));
        assert_eq!(builder.compose(call.clone()), builder.compose(call));
    }
}
