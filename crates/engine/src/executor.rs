//! Request execution against a built [`Schema`].
//!
//! One request moves through `Received → AccessChecked → Executing → Completed`.
//! A forbidden request completes immediately with a request-level error and no
//! field pipeline is ever invoked. Sibling fields resolve concurrently, each in
//! its own [`FieldContext`]; their cache metadata is merged into the response.

use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, join_all};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use tracing::{debug, warn};

use crate::{
    access::{AccessDecision, AccessGate},
    cache::CacheMetadata,
    context::{FieldContext, RequestContext},
    error::{ProducerError, RequestError, UpstreamError},
    pipeline::ResultMemo,
    registry::Schema,
    routing::Route,
};

/// Root operation type queried when an operation does not name one.
pub const QUERY_ROOT_TYPE: &str = "Query";
const TYPENAME_FIELD: &str = "__typename";

/// An already parsed operation: the root type plus its selection set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    #[serde(default = "default_root_type")]
    pub root_type: String,
    #[serde(default)]
    pub selections: Vec<Selection>,
}

fn default_root_type() -> String {
    QUERY_ROOT_TYPE.to_string()
}

impl Operation {
    pub fn query(selections: Vec<Selection>) -> Self {
        Self {
            root_type: default_root_type(),
            selections,
        }
    }
}

/// One requested field with its arguments and nested selections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Selection {
    pub field: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub arguments: JsonMap<String, Value>,
    #[serde(default)]
    pub selections: Vec<Selection>,
}

impl Selection {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    pub fn select(mut self, selection: Selection) -> Self {
        self.selections.push(selection);
        self
    }

    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    pub message: String,
    /// Response keys and list indices leading to the failed field.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
    pub extensions: CacheMetadata,
}

impl Response {
    pub fn request_error(error: &RequestError) -> Self {
        Self {
            data: None,
            errors: vec![ResponseError {
                message: error.to_string(),
                path: Vec::new(),
            }],
            extensions: CacheMetadata::new(),
        }
    }
}

/// Lifecycle phase of one request, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    AccessChecked(AccessDecision),
    Executing,
    Completed,
}

#[derive(Default)]
struct RequestState {
    memo: ResultMemo,
    errors: Mutex<Vec<ResponseError>>,
}

impl RequestState {
    fn record(&self, error: ResponseError) {
        self.errors.lock().expect("error list lock poisoned").push(error);
    }

    fn into_errors(self) -> Vec<ResponseError> {
        self.errors.into_inner().expect("error list lock poisoned")
    }
}

type Resolved = Result<(JsonMap<String, Value>, CacheMetadata), UpstreamError>;

pub struct Executor {
    schema: Arc<Schema>,
    gate: AccessGate,
}

impl Executor {
    pub fn new(schema: Arc<Schema>, gate: AccessGate) -> Self {
        Self { schema, gate }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Executes an operation after the access gate admits the request.
    pub async fn execute(&self, operation: &Operation, request: RequestContext) -> Response {
        log_phase(RequestPhase::Received, &request);
        let decision = self.gate.check(&request.principal, &request.headers);
        self.run(operation, request, decision).await
    }

    /// Executes an operation after every requirement of `route` passes.
    pub async fn execute_route(&self, route: &Route, operation: &Operation, request: RequestContext) -> Response {
        log_phase(RequestPhase::Received, &request);
        let decision = route.authorize(&request, &self.gate, self.gate.permissions().as_ref());
        self.run(operation, request, decision).await
    }

    async fn run(&self, operation: &Operation, request: RequestContext, decision: AccessDecision) -> Response {
        log_phase(RequestPhase::AccessChecked(decision), &request);
        if !decision.is_allowed() {
            log_phase(RequestPhase::Completed, &request);
            return Response::request_error(&RequestError::Forbidden);
        }

        log_phase(RequestPhase::Executing, &request);
        let request = Arc::new(request);
        let root = FieldContext::new(Arc::clone(&request), Arc::clone(self.gate.permissions()));
        let state = RequestState::default();
        let parent = Value::Object(JsonMap::new());

        let resolved = self
            .resolve_selections(Some(operation.root_type.as_str()), &parent, &operation.selections, &root, &[], &state)
            .await;
        log_phase(RequestPhase::Completed, &request);

        match resolved {
            Ok((data, extensions)) => {
                debug!(memo_entries = state.memo.len(), "request resolved");
                Response {
                    data: Some(Value::Object(data)),
                    errors: state.into_errors(),
                    extensions,
                }
            }
            Err(error) => Response::request_error(&RequestError::Upstream(error)),
        }
    }

    fn resolve_selections<'a>(
        &'a self,
        type_name: Option<&'a str>,
        parent: &'a Value,
        selections: &'a [Selection],
        context: &'a FieldContext,
        path: &'a [Value],
        state: &'a RequestState,
    ) -> BoxFuture<'a, Resolved> {
        async move {
            let fields = join_all(
                selections
                    .iter()
                    .map(|selection| self.resolve_field(type_name, parent, selection, context, path, state)),
            )
            .await;

            let mut object = JsonMap::new();
            let mut cache = CacheMetadata::new();
            for field in fields {
                let (key, value, metadata) = field?;
                cache.merge(&metadata);
                object.insert(key, value);
            }
            Ok((object, cache))
        }
        .boxed()
    }

    async fn resolve_field(
        &self,
        type_name: Option<&str>,
        parent: &Value,
        selection: &Selection,
        context: &FieldContext,
        path: &[Value],
        state: &RequestState,
    ) -> Result<(String, Value, CacheMetadata), UpstreamError> {
        let key = selection.response_key().to_string();
        if selection.field == TYPENAME_FIELD {
            let value = type_name.map(|name| Value::String(name.to_string())).unwrap_or(Value::Null);
            return Ok((key, value, CacheMetadata::new()));
        }

        let mut field_path = path.to_vec();
        field_path.push(Value::String(key.clone()));
        let mut field_context = context.child();

        let pipeline = type_name.and_then(|type_name| self.schema.resolve(type_name, &selection.field));
        let value = match pipeline {
            Some(pipeline) => match pipeline
                .resolve(parent, &selection.arguments, &mut field_context, &state.memo)
                .await
            {
                Ok(value) => value,
                Err(ProducerError::Upstream(error)) => {
                    warn!(field = %pipeline.field(), error = %error, "upstream service failed, aborting request");
                    return Err(error);
                }
                Err(error) => {
                    debug!(field = %pipeline.field(), error = %error, "field resolved to null with error");
                    state.record(ResponseError {
                        message: error.to_string(),
                        path: field_path.clone(),
                    });
                    Value::Null
                }
            },
            None => parent.get(&selection.field).cloned().unwrap_or(Value::Null),
        };

        if selection.selections.is_empty() || value.is_null() {
            return Ok((key, value, field_context.cache));
        }

        let declared = pipeline.and_then(|pipeline| pipeline.output_type().object_type_name());
        let (completed, metadata) = self
            .complete_value(&value, declared, &selection.selections, &field_context, &field_path, state)
            .await?;
        field_context.cache.merge(&metadata);
        Ok((key, completed, field_context.cache))
    }

    /// Applies nested selections to a resolved value, descending into lists.
    fn complete_value<'a>(
        &'a self,
        value: &'a Value,
        declared: Option<&'a str>,
        selections: &'a [Selection],
        context: &'a FieldContext,
        path: &'a [Value],
        state: &'a RequestState,
    ) -> BoxFuture<'a, Result<(Value, CacheMetadata), UpstreamError>> {
        async move {
            match value {
                Value::Array(items) => {
                    let completed = join_all(items.iter().enumerate().map(|(index, item)| async move {
                        let mut item_path = path.to_vec();
                        item_path.push(Value::from(index));
                        self.complete_value(item, declared, selections, context, &item_path, state).await
                    }))
                    .await;

                    let mut list = Vec::with_capacity(completed.len());
                    let mut cache = CacheMetadata::new();
                    for item in completed {
                        let (item, metadata) = item?;
                        cache.merge(&metadata);
                        list.push(item);
                    }
                    Ok((Value::Array(list), cache))
                }
                Value::Object(object) => {
                    let type_name = object.get(TYPENAME_FIELD).and_then(Value::as_str).or(declared);
                    let (object, cache) = self.resolve_selections(type_name, value, selections, context, path, state).await?;
                    Ok((Value::Object(object), cache))
                }
                scalar => Ok((scalar.clone(), CacheMetadata::new())),
            }
        }
        .boxed()
    }
}

fn log_phase(phase: RequestPhase, request: &RequestContext) {
    debug!(phase = ?phase, principal = %request.principal.id, language = %request.language, "request phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_deserializes_with_query_root() {
        let operation: Operation = serde_json::from_value(json!({
            "selections": [
                { "field": "menu", "alias": "main", "arguments": { "name": "main" }, "selections": [{ "field": "title" }] }
            ]
        }))
        .expect("operation");

        assert_eq!(operation.root_type, QUERY_ROOT_TYPE);
        assert_eq!(operation.selections[0].response_key(), "main");
        assert_eq!(operation.selections[0].selections[0].field, "title");
    }

    #[test]
    fn forbidden_response_serializes_without_data() {
        let response = Response::request_error(&RequestError::Forbidden);
        let rendered = serde_json::to_value(&response).expect("serialize");
        assert_eq!(
            rendered,
            json!({
                "errors": [{ "message": "access to the GraphQL endpoint is forbidden" }],
                "extensions": { "cacheContexts": [], "cacheTags": [] }
            })
        );
    }
}
