//! Step ordering and dependency planning for field pipelines.

use std::collections::{HashSet, VecDeque};

use gqlcompose_types::StepSpec;
use indexmap::IndexMap;

use crate::error::ConfigurationError;

/// Build a topologically ordered list of step indices.
///
/// Dependencies are the `from` bindings of each step. Steps without a mutual
/// dependency keep their declaration order, so the same document always
/// produces the same order. Returns an error for duplicate step identifiers,
/// unknown references, self references, or cycles.
pub(crate) fn order_steps(field: &str, steps: &[StepSpec]) -> Result<Vec<usize>, ConfigurationError> {
    let mut lookup: IndexMap<&str, usize> = IndexMap::new();
    for (index, step) in steps.iter().enumerate() {
        if lookup.insert(step.id.as_str(), index).is_some() {
            return Err(ConfigurationError::DuplicateStep {
                field: field.to_string(),
                step: step.id.clone(),
            });
        }
    }

    let mut in_degrees = vec![0usize; steps.len()];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];

    for (index, step) in steps.iter().enumerate() {
        let mut seen_dependencies = HashSet::new();
        for reference in step.map.values().filter_map(|binding| binding.from.as_deref()) {
            let Some(&dependency) = lookup.get(reference) else {
                return Err(ConfigurationError::UnknownStep {
                    field: field.to_string(),
                    step: step.id.clone(),
                    reference: reference.to_string(),
                });
            };
            if dependency == index {
                return Err(ConfigurationError::Cycle {
                    field: field.to_string(),
                    steps: vec![step.id.clone()],
                });
            }
            if !seen_dependencies.insert(dependency) {
                continue;
            }
            in_degrees[index] += 1;
            adjacency[dependency].push(index);
        }
    }

    let mut queue: VecDeque<usize> = (0..steps.len()).filter(|index| in_degrees[*index] == 0).collect();
    let mut ordered = Vec::with_capacity(steps.len());
    while let Some(index) = queue.pop_front() {
        ordered.push(index);
        for &child in &adjacency[index] {
            in_degrees[child] -= 1;
            if in_degrees[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    if ordered.len() != steps.len() {
        let mut remaining: Vec<String> = in_degrees
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(index, _)| steps[index].id.clone())
            .collect();
        remaining.sort();
        return Err(ConfigurationError::Cycle {
            field: field.to_string(),
            steps: remaining,
        });
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::order_steps;
    use crate::error::ConfigurationError;
    use gqlcompose_types::{BindingSpec, StepSpec};

    fn ids(steps: &[StepSpec], order: &[usize]) -> Vec<String> {
        order.iter().map(|index| steps[*index].id.clone()).collect()
    }

    #[test]
    fn respects_dependencies_declared_out_of_order() {
        let steps = vec![
            StepSpec::new("page", "translatable_config_page").bind("language", BindingSpec::step("lang")),
            StepSpec::new("lang", "current_language"),
        ];

        let order = order_steps("Query.globalConfig", &steps).expect("plan");
        assert_eq!(ids(&steps, &order), vec!["lang", "page"]);
    }

    #[test]
    fn independent_steps_keep_declaration_order() {
        let steps = vec![
            StepSpec::new("b", "x"),
            StepSpec::new("a", "x"),
            StepSpec::new("c", "x").bind("left", BindingSpec::step("a")).bind("right", BindingSpec::step("b")),
        ];

        let first = order_steps("Query.f", &steps).expect("plan");
        let second = order_steps("Query.f", &steps).expect("plan");
        assert_eq!(ids(&steps, &first), vec!["b", "a", "c"]);
        assert_eq!(first, second);
    }

    #[test]
    fn errors_on_unknown_reference() {
        let steps = vec![StepSpec::new("only", "x").bind("id", BindingSpec::step("missing"))];

        let error = order_steps("Query.f", &steps).expect_err("should fail");
        assert!(matches!(error, ConfigurationError::UnknownStep { ref reference, .. } if reference == "missing"));
    }

    #[test]
    fn errors_on_duplicate_step() {
        let steps = vec![StepSpec::new("a", "x"), StepSpec::new("a", "y")];
        let error = order_steps("Query.f", &steps).expect_err("should fail");
        assert!(matches!(error, ConfigurationError::DuplicateStep { .. }));
    }

    #[test]
    fn errors_on_cycle() {
        let steps = vec![
            StepSpec::new("first", "x").bind("input", BindingSpec::step("second")),
            StepSpec::new("second", "x").bind("input", BindingSpec::step("first")),
            StepSpec::new("third", "x"),
        ];

        let error = order_steps("Query.f", &steps).expect_err("should detect cycle");
        assert_eq!(
            error,
            ConfigurationError::Cycle {
                field: "Query.f".into(),
                steps: vec!["first".into(), "second".into()],
            }
        );
    }

    #[test]
    fn errors_on_self_reference() {
        let steps = vec![StepSpec::new("loop", "x").bind("input", BindingSpec::step("loop"))];
        let error = order_steps("Query.f", &steps).expect_err("should detect self reference");
        assert!(error.to_string().contains("cycle detected"), "unexpected error: {error}");
    }
}
