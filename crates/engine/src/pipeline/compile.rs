use gqlcompose_types::{BindingSource, BindingSpec, PipelineSpec};
use indexmap::IndexMap;
use tracing::debug;

use super::{CompiledBinding, CompiledStep, Pipeline, SlotBinding, planning::order_steps};
use crate::{error::ConfigurationError, producer::ProducerRegistry};

/// Compiles a pipeline spec for `parent_type.field_name` against the producer registry.
///
/// Every referenced producer must exist, every binding must name a declared
/// slot and exactly one source, every required slot must be bound (or carry a
/// default), and the step graph must be acyclic. Nothing is invoked here.
pub fn compile_pipeline(
    registry: &ProducerRegistry,
    parent_type: &str,
    field_name: &str,
    spec: &PipelineSpec,
) -> Result<Pipeline, ConfigurationError> {
    let field = format!("{parent_type}.{field_name}");
    let order = order_steps(&field, &spec.steps)?;

    let output_id = spec
        .output_step()
        .ok_or_else(|| ConfigurationError::MissingOutput { field: field.clone() })?;

    // Position of each declared step once ordered for execution.
    let positions: IndexMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(position, index)| (spec.steps[*index].id.as_str(), position))
        .collect();

    let output = *positions
        .get(output_id)
        .ok_or_else(|| ConfigurationError::MissingOutput { field: field.clone() })?;

    let mut steps = Vec::with_capacity(order.len());
    for index in &order {
        let step = &spec.steps[*index];
        let producer = registry.get(&step.produce).ok_or_else(|| ConfigurationError::UnknownProducer {
            field: field.clone(),
            producer: step.produce.clone(),
        })?;
        let definition = producer.definition();

        if let Some(slot) = step.map.keys().find(|slot| definition.slot(slot).is_none()) {
            return Err(ConfigurationError::UnknownSlot {
                field: field.clone(),
                producer: definition.id.clone(),
                slot: slot.clone(),
            });
        }

        let mut slots = Vec::with_capacity(definition.inputs.len());
        for slot in &definition.inputs {
            let invalid = |reason: String| ConfigurationError::InvalidBinding {
                field: field.clone(),
                producer: definition.id.clone(),
                slot: slot.name.clone(),
                reason,
            };

            let primary = step
                .map
                .get(&slot.name)
                .map(|binding| compile_binding(binding, &positions, true))
                .transpose()
                .map_err(invalid)?;
            let fallback = slot
                .default
                .as_ref()
                .map(|binding| compile_binding(binding, &positions, false))
                .transpose()
                .map_err(|reason| ConfigurationError::InvalidBinding {
                    field: field.clone(),
                    producer: definition.id.clone(),
                    slot: slot.name.clone(),
                    reason: format!("default {reason}"),
                })?;

            if slot.required && primary.is_none() && fallback.is_none() {
                return Err(ConfigurationError::UnboundSlot {
                    field: field.clone(),
                    producer: definition.id.clone(),
                    slot: slot.name.clone(),
                });
            }

            slots.push(SlotBinding {
                name: slot.name.clone(),
                required: slot.required,
                primary,
                fallback,
            });
        }

        steps.push(CompiledStep {
            id: step.id.clone(),
            producer: std::sync::Arc::clone(producer),
            slots,
        });
    }

    let output_type = steps[output].producer.definition().output.clone();
    debug!(
        field = %field,
        step_count = steps.len(),
        output = %output_id,
        "pipeline compiled"
    );

    Ok(Pipeline {
        field,
        steps,
        output,
        output_type,
    })
}

fn compile_binding(binding: &BindingSpec, positions: &IndexMap<&str, usize>, allow_steps: bool) -> Result<CompiledBinding, String> {
    let path = binding.path.clone();
    match binding.source()? {
        BindingSource::Value(value) => Ok(CompiledBinding::Literal(value.clone())),
        BindingSource::Step(step_id) => {
            if !allow_steps {
                return Err("cannot reference a pipeline step".into());
            }
            positions
                .get(step_id)
                .map(|index| CompiledBinding::Step { index: *index, path })
                .ok_or_else(|| format!("unknown step '{step_id}'"))
        }
        BindingSource::Context(name) => Ok(CompiledBinding::Context {
            name: name.to_string(),
            path,
        }),
        BindingSource::Parent => Ok(CompiledBinding::Parent { path }),
        BindingSource::Argument(name) => Ok(CompiledBinding::Argument {
            name: name.to_string(),
            path,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::producer::{FnProducer, ProducerRegistryBuilder};
    use gqlcompose_types::{OutputType, ProducerDefinition, StepSpec};
    use serde_json::{Value, json};

    fn registry() -> ProducerRegistry {
        let mut builder = ProducerRegistryBuilder::new();
        let definitions = [
            ProducerDefinition::new("P1").optional_with_default("lang", BindingSpec::value("en")),
            ProducerDefinition::new("P2").required("id").returns(OutputType::object("Item")),
            ProducerDefinition::new("current_language"),
            ProducerDefinition::new("translatable_config_page")
                .required("type")
                .required("language")
                .returns(OutputType::object("ConfigPage")),
            ProducerDefinition::new("bad_default").optional_with_default("x", BindingSpec::step("elsewhere")),
        ];
        for definition in definitions {
            builder
                .register(Arc::new(FnProducer::new(definition, |_, _| Ok(Value::Null))))
                .expect("register");
        }
        builder.build()
    }

    fn single(step: StepSpec) -> PipelineSpec {
        PipelineSpec {
            steps: vec![step],
            output: None,
        }
    }

    #[test]
    fn unbound_required_slot_names_producer_and_slot() {
        let error = compile_pipeline(&registry(), "Query", "item", &single(StepSpec::new("item", "P2"))).expect_err("unbound");
        assert_eq!(
            error,
            ConfigurationError::UnboundSlot {
                field: "Query.item".into(),
                producer: "P2".into(),
                slot: "id".into(),
            }
        );
    }

    #[test]
    fn optional_slot_with_default_compiles_without_binding() {
        let pipeline = compile_pipeline(&registry(), "Query", "greeting", &single(StepSpec::new("greet", "P1"))).expect("compile");
        let plan = pipeline.plan();
        assert_eq!(plan.steps[0].bindings, vec![("lang".to_string(), "default value:\"en\"".to_string())]);
    }

    #[test]
    fn rejects_unknown_producer_and_slot() {
        let unknown_producer = compile_pipeline(&registry(), "Query", "x", &single(StepSpec::new("s", "missing"))).expect_err("unknown");
        assert!(matches!(unknown_producer, ConfigurationError::UnknownProducer { ref producer, .. } if producer == "missing"));

        let unknown_slot = compile_pipeline(
            &registry(),
            "Query",
            "x",
            &single(StepSpec::new("s", "P2").bind("id", BindingSpec::value(1)).bind("nope", BindingSpec::value(2))),
        )
        .expect_err("unknown slot");
        assert!(matches!(unknown_slot, ConfigurationError::UnknownSlot { ref slot, .. } if slot == "nope"));
    }

    #[test]
    fn rejects_binding_with_multiple_sources() {
        let binding = BindingSpec {
            value: Some(json!(1)),
            argument: Some("id".into()),
            ..Default::default()
        };
        let error = compile_pipeline(&registry(), "Query", "x", &single(StepSpec::new("s", "P2").bind("id", binding))).expect_err("invalid");
        assert!(matches!(error, ConfigurationError::InvalidBinding { ref slot, .. } if slot == "id"));
    }

    #[test]
    fn defaults_cannot_reference_steps() {
        let error = compile_pipeline(&registry(), "Query", "x", &single(StepSpec::new("s", "bad_default"))).expect_err("invalid default");
        assert!(matches!(error, ConfigurationError::InvalidBinding { ref reason, .. } if reason.starts_with("default")));
    }

    #[test]
    fn output_type_comes_from_terminal_producer() {
        let spec = PipelineSpec {
            steps: vec![
                StepSpec::new("page", "translatable_config_page")
                    .bind("type", BindingSpec::value("global"))
                    .bind("language", BindingSpec::step("lang")),
                StepSpec::new("lang", "current_language"),
            ],
            output: Some("page".into()),
        };
        let pipeline = compile_pipeline(&registry(), "Query", "globalConfig", &spec).expect("compile");

        assert_eq!(pipeline.resolution_order(), vec!["lang", "page"]);
        assert_eq!(pipeline.output_type().object_type_name(), Some("ConfigPage"));
        assert_eq!(pipeline.plan().output, "page");
    }

    #[test]
    fn missing_output_step_is_rejected() {
        let spec = PipelineSpec {
            steps: vec![StepSpec::new("lang", "current_language")],
            output: Some("page".into()),
        };
        let error = compile_pipeline(&registry(), "Query", "x", &spec).expect_err("missing output");
        assert!(matches!(error, ConfigurationError::MissingOutput { .. }));

        let empty = compile_pipeline(&registry(), "Query", "x", &PipelineSpec::default()).expect_err("empty");
        assert!(matches!(empty, ConfigurationError::MissingOutput { .. }));
    }

    #[test]
    fn compiling_twice_yields_identical_plans() {
        let spec = PipelineSpec {
            steps: vec![
                StepSpec::new("lang", "current_language"),
                StepSpec::new("page", "translatable_config_page")
                    .bind("type", BindingSpec::value("global"))
                    .bind("language", BindingSpec::step("lang")),
            ],
            output: None,
        };
        let registry = registry();
        let first = compile_pipeline(&registry, "Query", "globalConfig", &spec).expect("first");
        let second = compile_pipeline(&registry, "Query", "globalConfig", &spec).expect("second");
        assert_eq!(first.plan(), second.plan());
    }
}
