//! Translation of upstream payloads into canonical records.
//!
//! Every version of the upstream names fields differently (`learner_id`,
//! `LearnerID`, `learnerId`, ...). Rather than per-field conditionals, each
//! canonical field carries an ordered candidate list in the schema table and
//! is resolved once per record here.

use serde_json::{Map, Number, Value};

use super::error::UpstreamError;
use super::routes::Route;
use crate::domain::{canonical_grade, EntityRecord, FieldKind, FieldSpec};

/// Normalizes one raw upstream object against `fields`.
///
/// The output always carries exactly the canonical field set; absent scalars
/// become `null` and absent lists become `[]`.
pub fn normalize_record(fields: &[FieldSpec], raw: &Map<String, Value>) -> EntityRecord {
    let mut record = EntityRecord::new();
    for spec in fields {
        let value = spec
            .sources
            .iter()
            .find_map(|source| raw.get(*source).filter(|value| !value.is_null()))
            .map_or_else(|| spec.kind.missing(), |value| coerce(spec.kind, value));
        record.insert(spec.name, value);
    }
    record
}

/// Extracts the record objects from a response body.
///
/// Accepts a bare array, an object wrapping the array under one of the
/// route's envelope keys, or a single object.
pub fn extract_objects(route: &Route, body: Value) -> Result<Vec<Map<String, Value>>, UpstreamError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            let wrapped = route
                .envelope_keys
                .iter()
                .find_map(|key| match object.get(*key) {
                    Some(Value::Array(_)) | Some(Value::Object(_)) => Some(*key),
                    _ => None,
                });
            match wrapped.and_then(|key| object.remove(key)) {
                Some(Value::Array(items)) => items,
                Some(Value::Object(inner)) => vec![Value::Object(inner)],
                _ => vec![Value::Object(object)],
            }
        }
        Value::Null => Vec::new(),
        other => {
            return Err(UpstreamError::invalid_response(format!(
                "expected a JSON array or object, got {other}"
            )))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(object) => Ok(object),
            other => Err(UpstreamError::invalid_response(format!(
                "expected record objects, got {other}"
            ))),
        })
        .collect()
}

/// Coerces `value` into the canonical representation of `kind`.
///
/// Values that cannot be represented become `null` (or `[]` for lists).
pub fn coerce(kind: FieldKind, value: &Value) -> Value {
    match kind {
        FieldKind::Text => as_text(value).map_or(Value::Null, Value::String),
        FieldKind::Grade => as_text(value)
            .as_deref()
            .and_then(canonical_grade)
            .map_or(Value::Null, |grade| Value::String(grade.to_owned())),
        FieldKind::Integer => as_integer(value).map_or(Value::Null, Value::from),
        FieldKind::Number => as_float(value)
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        FieldKind::Bool => as_bool(value).map_or(Value::Null, Value::Bool),
        FieldKind::TextList => Value::Array(as_text_list(value)),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < 9.0e15)
                .map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    let float = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    float.filter(|float| float.is_finite())
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "active" | "activated" => Some(true),
            "0" | "false" | "no" | "n" | "inactive" | "deactivated" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_text_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(object) => object_identifier(object),
                other => as_text(other),
            })
            .filter(|text| !text.is_empty())
            .map(Value::String)
            .collect(),
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Value::String(part.to_owned()))
            .collect(),
        Value::Null => Vec::new(),
        other => as_text(other).map(Value::String).into_iter().collect(),
    }
}

/// Picks the identifier out of a nested reference such as `{"learner_id": 17}`.
fn object_identifier(object: &Map<String, Value>) -> Option<String> {
    object
        .iter()
        .find(|(key, _)| key.to_ascii_lowercase().ends_with("id"))
        .and_then(|(_, value)| as_text(value))
}
