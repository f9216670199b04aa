//! Stored dates rendered as `DateTime` and `DateRange` objects.
//!
//! Timestamps and stored date-times are UTC. Date-only values resolve to noon
//! UTC so the calendar day survives conversion to most timezones.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use gqlcompose_engine::{FieldContext, Producer, ProducerError, ProducerInputs};
use gqlcompose_types::{BindingSpec, OutputType, ProducerDefinition};
use serde_json::{Value, json};

use crate::entity::collapse_items;

/// Hour a date-only value resolves to.
pub const DATE_ONLY_HOUR: u32 = 12;

const STORED_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parses a timestamp, an RFC 3339 string, a stored UTC date-time or a date.
pub fn parse_stored_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => DateTime::from_timestamp(number.as_i64()?, 0),
        Value::String(text) => parse_date_string(text.trim()),
        _ => None,
    }
}

fn parse_date_string(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = text.parse::<i64>() {
        return DateTime::from_timestamp(timestamp, 0);
    }
    if let Ok(date_time) = DateTime::parse_from_rfc3339(text) {
        return Some(date_time.with_timezone(&Utc));
    }
    for format in STORED_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    Some(date.and_time(NaiveTime::from_hms_opt(DATE_ONLY_HOUR, 0, 0)?).and_utc())
}

pub fn date_time_value(time: DateTime<Utc>) -> Value {
    json!({
        "__typename": "DateTime",
        "timestamp": time.timestamp(),
        "timezone": "UTC",
        "offset": "+00:00",
        "time": time.to_rfc3339_opts(SecondsFormat::Secs, false),
    })
}

/// Converts a timestamp or a date field's items into date objects.
///
/// With `range` each item becomes a `DateRange` of its `value` and
/// `end_value`. Item lists collapse like value fields.
#[derive(Debug)]
pub struct DateTimeValue {
    definition: ProducerDefinition,
}

impl DateTimeValue {
    pub const ID: &'static str = "date_time";

    pub fn new() -> Self {
        Self {
            definition: ProducerDefinition::new(Self::ID)
                .with_description("Renders stored dates in UTC")
                .required("value")
                .optional_with_default("range", BindingSpec::value(false))
                .returns(OutputType::object("DateTime")),
        }
    }

    fn render(&self, stored: &Value) -> Result<Value, ProducerError> {
        match stored {
            Value::Null => Ok(Value::Null),
            stored => parse_stored_date(stored)
                .map(date_time_value)
                .ok_or_else(|| ProducerError::invalid_argument(Self::ID, format!("{stored} is not a stored date"))),
        }
    }

    fn render_item(&self, item: &Value, range: bool) -> Result<Value, ProducerError> {
        let property = |name: &str| match item {
            Value::Object(object) => object.get(name).cloned().unwrap_or(Value::Null),
            scalar if name == "value" => scalar.clone(),
            _ => Value::Null,
        };
        if !range {
            return self.render(&property("value"));
        }
        Ok(json!({
            "__typename": "DateRange",
            "start": self.render(&property("value"))?,
            "end": self.render(&property("end_value"))?,
        }))
    }
}

impl Default for DateTimeValue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for DateTimeValue {
    fn definition(&self) -> &ProducerDefinition {
        &self.definition
    }

    async fn invoke(&self, inputs: &ProducerInputs, _context: &mut FieldContext) -> Result<Value, ProducerError> {
        let range = inputs.bool("range");
        match inputs.require("value")? {
            Value::Array(items) => {
                let rendered = items
                    .iter()
                    .map(|item| self.render_item(item, range))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(collapse_items(rendered))
            }
            single => self.render_item(single, range),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use gqlcompose_engine::{GrantedCapabilities, Principal, RequestContext};

    fn context() -> FieldContext {
        FieldContext::new(Arc::new(RequestContext::new(Principal::anonymous(), "en")), Arc::new(GrantedCapabilities))
    }

    fn time(stored: Value) -> Option<String> {
        parse_stored_date(&stored).map(|parsed| parsed.to_rfc3339_opts(SecondsFormat::Secs, false))
    }

    #[test]
    fn stored_formats_resolve_to_utc() {
        assert_eq!(time(json!("2025-05-25")).as_deref(), Some("2025-05-25T12:00:00+00:00"));
        assert_eq!(time(json!("2025-05-25 09:00:00")).as_deref(), Some("2025-05-25T09:00:00+00:00"));
        assert_eq!(time(json!("2025-05-25T09:00:00")).as_deref(), Some("2025-05-25T09:00:00+00:00"));
        assert_eq!(time(json!("2025-05-25T11:00:00+02:00")).as_deref(), Some("2025-05-25T09:00:00+00:00"));
        assert_eq!(time(json!(1748163600)).as_deref(), Some("2025-05-25T09:00:00+00:00"));
        assert_eq!(time(json!("1748163600")).as_deref(), Some("2025-05-25T09:00:00+00:00"));
        assert_eq!(time(json!("2025-13-45")), None);
        assert_eq!(time(json!(true)), None);
    }

    #[tokio::test]
    async fn range_items_render_start_and_end() {
        let producer = DateTimeValue::new();
        let inputs = ProducerInputs::new(DateTimeValue::ID)
            .with("value", json!([{ "value": "2025-05-25", "end_value": "2025-05-26" }]))
            .with("range", json!(true));

        let range = producer.invoke(&inputs, &mut context()).await.expect("range");
        assert_eq!(range["__typename"], json!("DateRange"));
        assert_eq!(range["start"]["time"], json!("2025-05-25T12:00:00+00:00"));
        assert_eq!(range["end"]["time"], json!("2025-05-26T12:00:00+00:00"));
        assert_eq!(range["end"]["timezone"], json!("UTC"));
    }

    #[tokio::test]
    async fn unparseable_dates_are_invalid_arguments() {
        let producer = DateTimeValue::new();
        let inputs = ProducerInputs::new(DateTimeValue::ID).with("value", json!([{ "value": "soon" }]));

        let error = producer.invoke(&inputs, &mut context()).await.expect_err("bad date");
        assert!(matches!(error, ProducerError::InvalidArgument { .. }));
    }
}
