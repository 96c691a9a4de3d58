//! Exception normalization
//!
//! Turns any [`RawException`] into either final text or a
//! [`NormalizedRecord`]: a sorted, enumerable property map with `stack`
//! resolved and `name` classified.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::raw::{is_truthy, ExceptionObject, RawException};

/// Canonical record for a non-string exception.
///
/// Keys are kept in a `BTreeMap` so every rendering of logically equal
/// records is byte-identical; the rendering doubles as the dedup key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    fields: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Look up a string field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    pub fn message(&self) -> Option<&str> {
        self.get_str("message")
    }

    pub fn stack(&self) -> Option<&str> {
        self.get_str("stack")
    }

    /// Fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Output of [`normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Normalized {
    /// Strings are final and pass through untouched
    Text(String),
    /// Everything else becomes a record
    Record(NormalizedRecord),
}

impl Normalized {
    pub fn as_record(&self) -> Option<&NormalizedRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Record(_) => None,
        }
    }
}

/// Normalize a raw exception. Never fails: `null` becomes an empty record.
pub fn normalize(raw: &RawException) -> Normalized {
    match raw {
        RawException::Text(text) => Normalized::Text(text.clone()),
        RawException::Primitive(Value::Null) => Normalized::Record(NormalizedRecord::default()),
        // Numbers and booleans keep their value as text rather than vanish.
        RawException::Primitive(value) => Normalized::Text(value.to_string()),
        RawException::Object(object) => Normalized::Record(normalize_object(object)),
    }
}

fn normalize_object(object: &ExceptionObject) -> NormalizedRecord {
    let mut fields = object.properties.clone();

    if !fields.get("stack").map(is_truthy).unwrap_or(false) {
        if let Some(trace) = fields.get("stacktrace").filter(|v| is_truthy(v)).cloned() {
            fields.insert("stack".to_string(), trace);
        }
    }

    if !fields.get("name").map(is_truthy).unwrap_or(false) {
        if let Some(kind) = object.kind {
            fields.insert("name".to_string(), Value::String(kind.label().to_string()));
        }
    }

    // Legacy engines duplicate `message` into `description`; keep it only
    // when it adds something.
    let redundant_description = match fields.get("description") {
        Some(description) => !is_truthy(description) || fields.get("message") == Some(description),
        None => false,
    };
    if redundant_description {
        fields.remove("description");
    }

    NormalizedRecord { fields }
}
