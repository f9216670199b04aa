//! Declarative schema documents.
//!
//! A schema document maps `Type.field` keys to pipelines of producer steps:
//!
//! ```yaml
//! fields:
//!   Query.globalConfig:
//!     steps:
//!       - id: lang
//!         produce: current_language
//!       - id: page
//!         produce: translatable_config_page
//!         map:
//!           type: { value: global }
//!           language: { from: lang }
//!     output: page
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::producer::BindingSpec;

/// Collection of field pipelines keyed by `Type.field`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaDocument {
    #[serde(default)]
    pub fields: IndexMap<String, PipelineSpec>,
}

/// Declarative composition of producer steps resolving a single field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineSpec {
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    /// Step whose output becomes the field value. Defaults to the last declared step.
    #[serde(default)]
    pub output: Option<String>,
}

impl PipelineSpec {
    /// Identifier of the terminal step, honoring the explicit `output` when present.
    pub fn output_step(&self) -> Option<&str> {
        self.output
            .as_deref()
            .or_else(|| self.steps.last().map(|step| step.id.as_str()))
    }
}

/// One producer invocation inside a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSpec {
    /// Identifier referenced by `from` bindings of later steps.
    pub id: String,
    /// Producer identifier to invoke.
    pub produce: String,
    /// Input slot bindings keyed by slot name.
    #[serde(default)]
    pub map: IndexMap<String, BindingSpec>,
}

impl StepSpec {
    pub fn new(id: impl Into<String>, produce: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            produce: produce.into(),
            map: IndexMap::new(),
        }
    }

    pub fn bind(mut self, slot: impl Into<String>, binding: BindingSpec) -> Self {
        self.map.insert(slot.into(), binding);
        self
    }
}

/// Splits a `Type.field` key into its parts.
pub fn split_field_key(key: &str) -> Option<(&str, &str)> {
    let (parent_type, field_name) = key.split_once('.')?;
    let parent_type = parent_type.trim();
    let field_name = field_name.trim();
    if parent_type.is_empty() || field_name.is_empty() || field_name.contains('.') {
        return None;
    }
    Some((parent_type, field_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_schema_document() {
        let yaml_text = r#"
fields:
  Query.globalConfig:
    steps:
      - id: lang
        produce: current_language
      - id: page
        produce: translatable_config_page
        map:
          type: { value: global }
          language: { from: lang }
  Query.greeting:
    steps:
      - id: greet
        produce: greeting
"#;
        let document: SchemaDocument = serde_yaml::from_str(yaml_text).expect("parse document");

        assert_eq!(document.fields.len(), 2);
        let pipeline = &document.fields["Query.globalConfig"];
        assert_eq!(pipeline.steps.len(), 2);
        assert_eq!(pipeline.output_step(), Some("page"));
        assert_eq!(pipeline.steps[1].map["language"].from.as_deref(), Some("lang"));
    }

    #[test]
    fn explicit_output_wins_over_last_step() {
        let pipeline = PipelineSpec {
            steps: vec![StepSpec::new("first", "a"), StepSpec::new("second", "b")],
            output: Some("first".into()),
        };
        assert_eq!(pipeline.output_step(), Some("first"));
    }

    #[test]
    fn split_field_key_rejects_malformed_keys() {
        assert_eq!(split_field_key("Query.greeting"), Some(("Query", "greeting")));
        assert_eq!(split_field_key("Query"), None);
        assert_eq!(split_field_key(".greeting"), None);
        assert_eq!(split_field_key("Query.a.b"), None);
    }
}
