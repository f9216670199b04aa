use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata describing a producer's inputs and the shape of the value it returns.
///
/// Definitions are registered once while the schema is built and never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerDefinition {
    /// Unique producer identifier, e.g. `entity_load`.
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Declared input slots in the order the producer consumes them.
    #[serde(default)]
    pub inputs: Vec<InputSlot>,
    /// Type tag for the single output slot.
    #[serde(default)]
    pub output: OutputType,
    /// When true the executor may reuse results for identical inputs within one request.
    #[serde(default)]
    pub memoize: bool,
}

impl ProducerDefinition {
    /// Starts a definition with no inputs and an untyped output.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            inputs: Vec::new(),
            output: OutputType::Any,
            memoize: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a required input slot.
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(InputSlot::required(name));
        self
    }

    /// Adds an optional input slot without a default binding.
    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(InputSlot::optional(name));
        self
    }

    /// Adds an optional input slot that falls back to `default` when unbound or null.
    pub fn optional_with_default(mut self, name: impl Into<String>, default: BindingSpec) -> Self {
        self.inputs.push(InputSlot {
            name: name.into(),
            required: false,
            default: Some(default),
        });
        self
    }

    pub fn returns(mut self, output: OutputType) -> Self {
        self.output = output;
        self
    }

    pub fn memoized(mut self) -> Self {
        self.memoize = true;
        self
    }

    /// Looks up an input slot by name.
    pub fn slot(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|slot| slot.name == name)
    }
}

/// A single declared input of a producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSlot {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Binding used when the slot is left unbound by a pipeline.
    #[serde(default)]
    pub default: Option<BindingSpec>,
}

impl InputSlot {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: None,
        }
    }
}

/// Type tag describing what a producer returns.
///
/// Object tags carry the GraphQL type name used to resolve nested selections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    #[default]
    Any,
    Scalar(String),
    Object(String),
    List(Box<OutputType>),
}

impl OutputType {
    pub fn object(type_name: impl Into<String>) -> Self {
        Self::Object(type_name.into())
    }

    pub fn scalar(type_name: impl Into<String>) -> Self {
        Self::Scalar(type_name.into())
    }

    pub fn list_of(item: OutputType) -> Self {
        Self::List(Box::new(item))
    }

    /// Name of the object type values of this tag resolve as, looking through lists.
    pub fn object_type_name(&self) -> Option<&str> {
        match self {
            OutputType::Object(name) => Some(name.as_str()),
            OutputType::List(item) => item.object_type_name(),
            OutputType::Any | OutputType::Scalar(_) => None,
        }
    }
}

/// Declarative binding for a producer input slot.
///
/// Exactly one of `value`, `from`, `context`, `parent`, or `argument` must be present.
/// `path` optionally narrows the selected value with a dotted path (`items[0].id`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BindingSpec {
    /// Literal value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Output of another step in the same pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Named context variable such as `language` or `user`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// The parent value the field is resolved on.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parent: bool,
    /// A GraphQL argument of the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Validated origin of a [`BindingSpec`].
#[derive(Debug, Clone, PartialEq)]
pub enum BindingSource<'a> {
    Value(&'a Value),
    Step(&'a str),
    Context(&'a str),
    Parent,
    Argument(&'a str),
}

impl BindingSpec {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn step(step_id: impl Into<String>) -> Self {
        Self {
            from: Some(step_id.into()),
            ..Default::default()
        }
    }

    pub fn context(name: impl Into<String>) -> Self {
        Self {
            context: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn parent() -> Self {
        Self {
            parent: true,
            ..Default::default()
        }
    }

    pub fn argument(name: impl Into<String>) -> Self {
        Self {
            argument: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Returns the single declared source, or a message describing why the binding is invalid.
    pub fn source(&self) -> Result<BindingSource<'_>, String> {
        let mut sources = Vec::new();
        if let Some(value) = &self.value {
            sources.push(BindingSource::Value(value));
        }
        if let Some(step_id) = &self.from {
            sources.push(BindingSource::Step(step_id));
        }
        if let Some(name) = &self.context {
            sources.push(BindingSource::Context(name));
        }
        if self.parent {
            sources.push(BindingSource::Parent);
        }
        if let Some(name) = &self.argument {
            sources.push(BindingSource::Argument(name));
        }

        match sources.len() {
            0 => Err("binding is missing a source (value, from, context, parent or argument)".into()),
            1 => Ok(sources.remove(0)),
            _ => Err("binding must declare exactly one source".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_binding_variants_from_yaml() {
        let yaml_text = r#"
type: { value: global }
language: { from: lang }
id: { argument: id }
menu: { parent: true, path: menu.id }
user: { context: user }
"#;
        let bindings: indexmap::IndexMap<String, BindingSpec> = serde_yaml::from_str(yaml_text).expect("parse bindings");

        assert_eq!(bindings["type"].source(), Ok(BindingSource::Value(&json!("global"))));
        assert_eq!(bindings["language"].source(), Ok(BindingSource::Step("lang")));
        assert_eq!(bindings["id"].source(), Ok(BindingSource::Argument("id")));
        assert_eq!(bindings["menu"].source(), Ok(BindingSource::Parent));
        assert_eq!(bindings["menu"].path.as_deref(), Some("menu.id"));
        assert_eq!(bindings["user"].source(), Ok(BindingSource::Context("user")));
    }

    #[test]
    fn rejects_binding_with_two_sources() {
        let binding = BindingSpec {
            value: Some(json!(1)),
            argument: Some("id".into()),
            ..Default::default()
        };
        let message = binding.source().expect_err("two sources");
        assert!(message.contains("exactly one source"), "unexpected message: {message}");
    }

    #[test]
    fn rejects_binding_without_source() {
        let message = BindingSpec::default().source().expect_err("no source");
        assert!(message.contains("missing a source"), "unexpected message: {message}");
    }

    #[test]
    fn object_type_name_looks_through_lists() {
        let output = OutputType::list_of(OutputType::object("MenuLinkTreeElement"));
        assert_eq!(output.object_type_name(), Some("MenuLinkTreeElement"));
        assert_eq!(OutputType::scalar("String").object_type_name(), None);
    }

    #[test]
    fn builder_methods_declare_slots_in_order() {
        let definition = ProducerDefinition::new("entity_load")
            .required("type")
            .required("id")
            .optional_with_default("language", BindingSpec::context("language"))
            .memoized();

        let names: Vec<&str> = definition.inputs.iter().map(|slot| slot.name.as_str()).collect();
        assert_eq!(names, vec!["type", "id", "language"]);
        assert!(definition.slot("type").is_some_and(|slot| slot.required));
        assert!(definition.slot("language").is_some_and(|slot| slot.default.is_some()));
        assert!(definition.memoize);
    }
}
