//! Deterministic text rendering of normalized exceptions.
//!
//! The output is both report content and the dedup key, so the same
//! record must always produce the same bytes.

use serde_json::Value;
use std::fmt::Write as _;

use super::normalize::{normalize, Normalized, NormalizedRecord};
use super::raw::RawException;

/// Render a normalized exception. Text passes through unchanged.
pub fn stringify(normalized: &Normalized) -> String {
    match normalized {
        Normalized::Text(text) => text.clone(),
        Normalized::Record(record) => stringify_record(record),
    }
}

/// Render a record as `key:\n  value\n` blocks in key order.
pub fn stringify_record(record: &NormalizedRecord) -> String {
    let mut out = String::new();
    for (key, value) in record.iter() {
        // Writing to a String cannot fail.
        let _ = write!(out, "{}:\n  {}\n", key, render_value(value));
    }
    out
}

/// Normalize then render in one step.
pub fn stringify_raw(raw: &RawException) -> String {
    stringify(&normalize(raw))
}

/// Strings render bare; everything else as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl std::fmt::Display for Normalized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&stringify(self))
    }
}
