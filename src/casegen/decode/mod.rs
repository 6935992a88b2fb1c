// SPDX-License-Identifier: MIT

//! Structured decoding of model output
//!
//! [`decode`] strips Markdown fences, parses JSON and conforms the value to a
//! [`Schema`]. A parse failure gets one [`repair`] pass before it is reported;
//! a schema failure is reported as is.

pub mod repair;

use crate::adk::error::DecodeError;
use crate::casegen::types::{Case, Finding, FindingReport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Validates a parsed value and converts it to a domain type
pub trait Schema {
    type Output;

    fn conform(&self, value: Value) -> Result<Self::Output, String>;
}

/// Decode raw model text against `schema`
pub fn decode<S: Schema>(raw: &str, schema: &S) -> Result<S::Output, DecodeError> {
    let text = strip_fences(raw);
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(first) => {
            log::debug!("[Decoder] direct parse failed ({}), repairing", first);
            let repaired = repair::repair(text);
            serde_json::from_str(&repaired)
                .map_err(|e| DecodeError::Syntax(format!("{} (before repair: {})", e, first)))?
        }
    };

    schema.conform(value).map_err(DecodeError::Schema)
}

/// Exchange-format text for a value
pub fn encode<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Body of the first fenced block, or the trimmed text when there is none
fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    let Some(start) = text.find("```") else {
        return text;
    };

    let after = &text[start + 3..];
    let tag_end = after.find('\n').unwrap_or(after.len());
    let body = if after[..tag_end].trim().chars().all(|c| c.is_ascii_alphanumeric()) {
        &after[tag_end..]
    } else {
        after
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Any serde-deserializable type
pub struct Typed<T>(PhantomData<T>);

pub fn typed<T: DeserializeOwned>() -> Typed<T> {
    Typed(PhantomData)
}

impl<T: DeserializeOwned> Schema for Typed<T> {
    type Output = T;

    fn conform(&self, value: Value) -> Result<T, String> {
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

/// A case object that carries every required field
pub struct CaseSchema {
    pub required: Vec<String>,
}

impl CaseSchema {
    pub fn new(required: &[String]) -> Self {
        Self {
            required: required.to_vec(),
        }
    }
}

impl Schema for CaseSchema {
    type Output = Case;

    fn conform(&self, value: Value) -> Result<Case, String> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(format!("expected a case object, got {}", kind(&other))),
        };
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|f| map.get(*f).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(format!("case is missing fields: {}", missing.join(", ")));
        }
        Ok(Case::from(map))
    }
}

/// Critic findings, either wrapped in `inconsistencies` or as a bare list;
/// sorted by field
pub struct FindingsSchema;

impl Schema for FindingsSchema {
    type Output = Vec<Finding>;

    fn conform(&self, value: Value) -> Result<Vec<Finding>, String> {
        let mut findings = match value {
            Value::Array(_) => {
                serde_json::from_value::<Vec<Finding>>(value).map_err(|e| e.to_string())?
            }
            other => {
                serde_json::from_value::<FindingReport>(other)
                    .map_err(|e| e.to_string())?
                    .inconsistencies
            }
        };
        findings.sort_by(|a, b| a.field.cmp(&b.field));
        Ok(findings)
    }
}

/// New value of one case field, either wrapped as `{field: value}` or bare
pub struct FieldSchema {
    pub field: String,
}

impl Schema for FieldSchema {
    type Output = Value;

    fn conform(&self, value: Value) -> Result<Value, String> {
        let value = match value {
            Value::Object(mut map) if map.contains_key(&self.field) => {
                map.remove(&self.field).unwrap_or(Value::Null)
            }
            other => other,
        };
        if value.is_null() {
            return Err(format!("no value for field '{}'", self.field));
        }
        Ok(value)
    }
}

/// Label translations covering every expected source label
pub struct MappingSchema {
    pub expected: Vec<String>,
}

impl Schema for MappingSchema {
    type Output = HashMap<String, String>;

    fn conform(&self, value: Value) -> Result<HashMap<String, String>, String> {
        let mapping: HashMap<String, String> =
            serde_json::from_value(value).map_err(|e| e.to_string())?;
        let missing: Vec<&str> = self
            .expected
            .iter()
            .filter(|label| !mapping.contains_key(*label))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(format!("mapping is missing labels: {}", missing.join(", ")));
        }
        Ok(mapping)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
